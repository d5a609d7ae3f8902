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

use http::{Request, Response};
use hyper::Body;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    core::{ErrorResponse, ListMeta, ObjectList},
    Client as KubeClient,
};
use serde_json::json;

use self::mock_error::Error;

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub struct ApiServerVerifier(ApiServerHandle);

pub const CONFIGMAPS_PATH: &str = "/api/v1/namespaces/ns/configmaps";

pub enum Testcases {
    // failed list, list, watch ended by 410 Gone, relist, watch
    RelistAfterErrors { listed: Vec<ConfigMap>, added: ConfigMap, relisted: Vec<ConfigMap> },
}

pub fn mock_client() -> (KubeClient, ApiServerVerifier) {
    let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (KubeClient::new(mock_service, "ns"), ApiServerVerifier(handle))
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
                Testcases::RelistAfterErrors { listed, added, relisted } => {
                    self.handler_configmap_list_error()
                        .await
                        .unwrap()
                        .handler_configmap_list(listed, "10")
                        .await
                        .unwrap()
                        .handler_configmap_watch_expired(added, "10")
                        .await
                        .unwrap()
                        .handler_configmap_list(relisted, "20")
                        .await
                        .unwrap()
                        .handler_configmap_watch_started("20")
                        .await
                },
            }
            .expect("Case completed without errors");
        })
    }

    async fn handler_configmap_list_error(mut self) -> Result<Self, Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(request.uri().path(), CONFIGMAPS_PATH);
        assert_eq!(request.extensions().get(), Some(&"list"));
        let error_response = ErrorResponse {
            status: "Failure".to_string(),
            message: "etcdserver: request timed out".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        };
        let response_body = json!({
            "status": error_response.status,
            "message": error_response.message,
            "reason": error_response.reason,
            "code": error_response.code,
        });
        let response = serde_json::to_vec(&response_body)?;
        send.send_response(Response::builder().status(500).body(Body::from(response)).unwrap());
        Ok(self)
    }

    async fn handler_configmap_list(mut self, items: Vec<ConfigMap>, resource_version: &str) -> Result<Self, Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(request.uri().path(), CONFIGMAPS_PATH);
        assert_eq!(request.extensions().get(), Some(&"list"));
        let list: ObjectList<ConfigMap> = ObjectList {
            metadata: ListMeta { resource_version: Some(resource_version.to_string()), ..Default::default() },
            items,
        };
        let response = serde_json::to_vec(&list)?;
        send.send_response(Response::builder().body(Body::from(response)).unwrap());
        Ok(self)
    }

    // one ADDED event, then the apiserver reports the resource version as expired
    async fn handler_configmap_watch_expired(
        mut self,
        added: ConfigMap,
        resource_version: &str,
    ) -> Result<Self, Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_watch(&request, resource_version);
        let mut response = serde_json::to_vec(&json!({ "type": "ADDED", "object": added }))?;
        response.push(b'\n');
        response.extend(serde_json::to_vec(&json!({
            "type": "ERROR",
            "object": {
                "status": "Failure",
                "message": format!("too old resource version: {}", resource_version),
                "reason": "Expired",
                "code": 410,
            },
        }))?);
        response.push(b'\n');
        send.send_response(Response::builder().body(Body::from(response)).unwrap());
        Ok(self)
    }

    // the watch is accepted and never answered
    async fn handler_configmap_watch_started(mut self, resource_version: &str) -> Result<Self, Error> {
        let (request, _send) = self.0.next_request().await.expect("service not called");
        assert_watch(&request, resource_version);
        Ok(self)
    }
}

fn assert_watch(request: &Request<Body>, resource_version: &str) {
    assert_eq!(request.method(), http::Method::GET);
    assert_eq!(request.uri().path(), CONFIGMAPS_PATH);
    assert_eq!(request.extensions().get(), Some(&"watch"));
    let query = request.uri().query().unwrap_or_default();
    assert!(query.contains("watch=true"), "not a watch: {}", query);
    assert!(query.contains(&format!("resourceVersion={}", resource_version)), "unexpected watch: {}", query);
}

pub mod mock_error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Failed to encode response: {source}")]
        ResponseError {
            #[from]
            source: serde_json::Error,
        },
    }
}
