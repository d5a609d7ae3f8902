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

use http::{header::CONTENT_TYPE, Request, Response};
use hyper::{body::to_bytes, Body};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{core::ErrorResponse, Client as KubeClient, ResourceExt};
use serde_json::json;

use self::mock_error::Error;
use super::{apiclient::ControllerClient, values::ANNOTATION_OBSERVED_KEYS};

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub struct ApiServerVerifier(ApiServerHandle);

pub enum Testcases {
    // expected value of the observed-keys annotation
    AnnotateNormal(ConfigMap, String),
    AnnotateNotFound(ConfigMap),
}

pub async fn timeout_after_5s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}

impl ApiServerVerifier {
    pub fn run(self, cases: Testcases) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match cases {
                Testcases::AnnotateNormal(configmap, observed) => {
                    self.handler_configmap_patch_annotation(configmap, observed).await
                },
                Testcases::AnnotateNotFound(configmap) => self.handler_configmap_patch_not_found(configmap).await,
            }
            .expect("Case completed without errors");
        })
    }

    async fn handler_configmap_patch_annotation(
        mut self,
        mut configmap: ConfigMap,
        observed: String,
    ) -> Result<Self, Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_patch(&request, &configmap);

        let req_body = to_bytes(request.into_body()).await?;
        let body_json: serde_json::Value = serde_json::from_slice(&req_body)?;
        assert_eq!(body_json, json!({ "metadata": { "annotations": { ANNOTATION_OBSERVED_KEYS: observed } } }));

        configmap.annotations_mut().insert(ANNOTATION_OBSERVED_KEYS.to_string(), observed);
        let response = serde_json::to_vec(&configmap)?;
        send.send_response(Response::builder().body(Body::from(response)).unwrap());
        Ok(self)
    }

    async fn handler_configmap_patch_not_found(mut self, configmap: ConfigMap) -> Result<Self, Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_patch(&request, &configmap);
        let error_response = ErrorResponse {
            status: "Failure".to_string(),
            message: format!("configmaps \"{}\" not found", configmap.name()),
            reason: "NotFound".to_string(),
            code: 404,
        };
        let response_body = json!({
            "status": error_response.status,
            "message": error_response.message,
            "reason": error_response.reason,
            "code": error_response.code,
        });
        let response = serde_json::to_vec(&response_body)?;
        send.send_response(Response::builder().status(404).body(Body::from(response)).unwrap());
        Ok(self)
    }
}

fn assert_patch(request: &Request<Body>, configmap: &ConfigMap) {
    assert_eq!(request.method(), http::Method::PATCH);
    assert_eq!(
        request.uri().to_string(),
        format!("/api/v1/namespaces/{}/configmaps/{}?", configmap.namespace().unwrap_or_default(), configmap.name())
    );
    assert_eq!(request.extensions().get(), Some(&"patch"));
    assert_eq!(
        request.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
        Some("application/merge-patch+json")
    );
}

impl ControllerClient {
    pub fn test() -> (ControllerClient, ApiServerVerifier) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let mock_k8s_client = KubeClient::new(mock_service, "default");
        (ControllerClient::new(mock_k8s_client), ApiServerVerifier(handle))
    }
}

pub mod mock_error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Failed to read request body: {source}")]
        BodyError {
            #[from]
            source: hyper::Error,
        },

        #[error("Failed to decode or encode a document: {source}")]
        JsonError {
            #[from]
            source: serde_json::Error,
        },
    }
}
