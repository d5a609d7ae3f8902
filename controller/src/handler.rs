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

use std::sync::Arc;

use kube::Resource;
use log::{debug, error, trace};
use workqueue::RateLimitingQueue;

use crate::{
    event::WatchEvent,
    key::{object_key, KeyFunc, ObjectKey},
    predicate::Predicates,
    values::{ANNOTATION_PRIMARY_RESOURCE, ANNOTATION_PRIMARY_RESOURCE_TYPE},
};

/// How the keys to reconcile are derived from the object of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventHandler {
    /// The object itself.
    EnqueueForObject,
    /// Owners of the object with this kind and api group, the version is ignored.
    /// With `controller_only` only the managing owner counts. Keys take the namespace of the
    /// object unless the owner kind is `cluster_scoped`.
    EnqueueForOwner { api_version: String, kind: String, controller_only: bool, cluster_scoped: bool },
    /// The object named by the primary resource annotation, for owners that cannot be set
    /// as owner reference, e.g. cluster scoped objects created for a namespaced one.
    EnqueueForAnnotation { type_name: String },
}

fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// Turns the events of one watch into keys of the controller queue.
pub struct Dispatcher<K> {
    name: String,
    queue: Arc<RateLimitingQueue<ObjectKey>>,
    handler: EventHandler,
    predicates: Vec<Predicates<K>>,
    key_func: KeyFunc<K>,
}

impl<K> Clone for Dispatcher<K> {
    fn clone(&self) -> Self {
        Dispatcher {
            name: self.name.clone(),
            queue: self.queue.clone(),
            handler: self.handler.clone(),
            predicates: self.predicates.clone(),
            key_func: self.key_func.clone(),
        }
    }
}

impl<K> Dispatcher<K>
where
    K: Resource + 'static,
    K::DynamicType: Default,
{
    pub fn new(name: &str, queue: Arc<RateLimitingQueue<ObjectKey>>, handler: EventHandler) -> Self {
        Dispatcher {
            name: name.to_string(),
            queue,
            handler,
            predicates: Vec::new(),
            key_func: Arc::new(object_key::<K>),
        }
    }

    /// Adds a filter, an event is enqueued only if every filter accepts it.
    pub fn with_predicates(mut self, predicates: Predicates<K>) -> Self {
        self.predicates.push(predicates);
        self
    }

    /// Replaces the key function used by [`EventHandler::EnqueueForObject`].
    pub fn with_key_func(mut self, key_func: KeyFunc<K>) -> Self {
        self.key_func = key_func;
        self
    }

    pub fn handle(&self, event: &WatchEvent<K>) {
        let meta = event.object().meta();
        let namespace = meta.namespace.as_deref().unwrap_or_default();
        let name = meta.name.as_deref().unwrap_or_default();
        if !self.predicates.iter().all(|p| p.accepts(event)) {
            trace!("{}: {} event of {}/{} filtered out", self.name, event.event_type(), namespace, name);
            return;
        }
        let keys = self.keys_for(event);
        debug!(
            "{}: {} event of {} {}/{}, enqueue {:?}",
            self.name,
            event.event_type(),
            K::kind(&K::DynamicType::default()),
            namespace,
            name,
            keys.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        for key in keys {
            self.queue.add(key);
        }
    }

    /// Keys an event maps to, an update maps to the keys of both object versions.
    pub fn keys_for(&self, event: &WatchEvent<K>) -> Vec<ObjectKey> {
        match event {
            WatchEvent::Update { old, new } => {
                let mut keys = self.object_keys(old);
                for key in self.object_keys(new) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            },
            _ => self.object_keys(event.object()),
        }
    }

    fn object_keys(&self, obj: &K) -> Vec<ObjectKey> {
        let meta = obj.meta();
        match &self.handler {
            EventHandler::EnqueueForObject => match (self.key_func)(obj) {
                Ok(key) => vec![key],
                Err(e) => {
                    error!("{}: failed to get key of object: {}", self.name, e);
                    vec![]
                },
            },
            EventHandler::EnqueueForOwner { api_version, kind, controller_only, cluster_scoped } => meta
                .owner_references
                .iter()
                .flatten()
                .filter(|owner| {
                    &owner.kind == kind
                        && api_group(&owner.api_version) == api_group(api_version)
                        && (!controller_only || owner.controller == Some(true))
                })
                .map(|owner| ObjectKey {
                    namespace: if *cluster_scoped { None } else { meta.namespace.clone() },
                    name: owner.name.clone(),
                })
                .collect(),
            EventHandler::EnqueueForAnnotation { type_name } => {
                let annotations = match &meta.annotations {
                    Some(annotations) => annotations,
                    None => return vec![],
                };
                if annotations.get(ANNOTATION_PRIMARY_RESOURCE_TYPE) != Some(type_name) {
                    return vec![];
                }
                match annotations.get(ANNOTATION_PRIMARY_RESOURCE).map(|value| value.parse::<ObjectKey>()) {
                    Some(Ok(key)) => vec![key],
                    Some(Err(e)) => {
                        error!("{}: annotation {} of {:?}: {}", self.name, ANNOTATION_PRIMARY_RESOURCE, meta.name, e);
                        vec![]
                    },
                    None => vec![],
                }
            },
        }
    }
}
