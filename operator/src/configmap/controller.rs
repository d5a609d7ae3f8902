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

use anyhow::Result;
use async_trait::async_trait;
use controller::{values::NO_REQUEUE, Action, ObjectKey, Predicates, Reconciler};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use log::{debug, info};
use reconciler_error::Error;

use super::{apiclient::ApplyApi, values::ANNOTATION_OBSERVED_KEYS};

/// Records the number of data keys of every ConfigMap in an annotation.
#[derive(Clone)]
pub struct ConfigMapController<T: ApplyApi> {
    controller_client: T,
}

impl<T: ApplyApi> ConfigMapController<T> {
    pub fn new(controller_client: T) -> Self {
        ConfigMapController { controller_client }
    }

    async fn observe(&self, configmap: &ConfigMap) -> Result<(), Error> {
        let name = configmap.name();
        let namespace = configmap.namespace().ok_or(Error::MissingObjectKey {
            resource: String::from("configmap"),
            value: String::from("namespace"),
        })?;
        let observed = configmap.data.as_ref().map_or(0, BTreeMap::len).to_string();
        if configmap.annotations().get(ANNOTATION_OBSERVED_KEYS) == Some(&observed) {
            debug!("configmap {}/{} already observed with {} key(s)", namespace, name, observed);
            return Ok(());
        }
        self.controller_client.annotate_configmap(&name, &namespace, ANNOTATION_OBSERVED_KEYS, &observed).await?;
        info!("configmap {}/{} observed with {} key(s)", namespace, name, observed);
        Ok(())
    }
}

#[async_trait]
impl<T: ApplyApi> Reconciler<ConfigMap> for ConfigMapController<T> {
    async fn reconcile(&self, key: &ObjectKey, object: Option<ConfigMap>) -> Result<Action> {
        match object {
            Some(configmap) => self.observe(&configmap).await?,
            None => info!("configmap {} is deleted", key),
        }
        Ok(NO_REQUEUE)
    }
}

/// Only changes of the content or of the annotations are worth a reconcile.
pub fn configmap_predicates() -> Predicates<ConfigMap> {
    Predicates::any_of(vec![
        Predicates::new().with_update(|old: &ConfigMap, new: &ConfigMap| old.data != new.data),
        Predicates::annotations_changed(),
    ])
}

pub mod reconciler_error {
    use thiserror::Error;

    use crate::configmap::apiclient::apiclient_error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Applying ConfigMap reported error: {source}")]
        ApplyApiError {
            #[from]
            source: apiclient_error::Error,
        },

        #[error("{}.metadata.{} is not exist", resource, value)]
        MissingObjectKey { resource: String, value: String },
    }
}
