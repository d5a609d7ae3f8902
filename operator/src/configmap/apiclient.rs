/*
 * Copyright (c) Huawei Technologies Co., Ltd. 2024. All rights reserved.
 * oploop is licensed under the Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *     http://license.coscl.org.cn/MulanPSL2
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR
 * PURPOSE.
 * See the Mulan PSL v2 for more details.
 */

use std::collections::BTreeMap;

use apiclient_error::Error;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AnnotationsPatch {
    metadata: AnnotationsPatchMeta,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AnnotationsPatchMeta {
    annotations: BTreeMap<String, String>,
}

impl AnnotationsPatch {
    fn new(key: &str, value: &str) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(key.to_string(), value.to_string());
        AnnotationsPatch { metadata: AnnotationsPatchMeta { annotations } }
    }
}

#[derive(Clone)]
pub struct ControllerClient {
    pub client: Client,
}

impl ControllerClient {
    pub fn new(client: Client) -> Self {
        ControllerClient { client }
    }
}

#[async_trait]
pub trait ApplyApi: Clone + Sized + Send + Sync {
    async fn annotate_configmap(&self, name: &str, namespace: &str, key: &str, value: &str) -> Result<(), Error>;
}

#[async_trait]
impl ApplyApi for ControllerClient {
    async fn annotate_configmap(&self, name: &str, namespace: &str, key: &str, value: &str) -> Result<(), Error> {
        let cm_api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let patch = AnnotationsPatch::new(key, value);
        cm_api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }
}

pub mod apiclient_error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Kubernetes reported error: {source}")]
        KubeError {
            #[from]
            source: kube::Error,
        },
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    use super::*;
    use crate::configmap::apiserver_mock::{timeout_after_5s, Testcases};

    fn configmap() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("a".to_string()),
                namespace: Some("ns".to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[tokio::test]
    async fn test_annotate_configmap() {
        let (controller_client, fakeserver) = ControllerClient::test();
        let mocksrv = fakeserver.run(Testcases::AnnotateNormal(configmap(), "3".to_string()));
        controller_client.annotate_configmap("a", "ns", "oploop.openeuler.org/observed-keys", "3").await.unwrap();
        timeout_after_5s(mocksrv).await;
    }

    #[tokio::test]
    async fn test_annotate_configmap_not_found() {
        let (controller_client, fakeserver) = ControllerClient::test();
        let mocksrv = fakeserver.run(Testcases::AnnotateNotFound(configmap()));
        let result = controller_client.annotate_configmap("a", "ns", "oploop.openeuler.org/observed-keys", "3").await;
        match result {
            Err(Error::KubeError { source: kube::Error::Api(error_response) }) => {
                assert_eq!(error_response.code, 404);
                assert_eq!(error_response.reason, "NotFound");
            },
            other => panic!("unexpected result {:?}", other),
        }
        timeout_after_5s(mocksrv).await;
    }

    #[test]
    fn test_annotations_patch_body() {
        let patch = AnnotationsPatch::new("oploop.openeuler.org/observed-keys", "2");
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"metadata": {"annotations": {"oploop.openeuler.org/observed-keys": "2"}}})
        );
    }
}
