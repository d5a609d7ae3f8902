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

use std::hash::Hash;

use cache_error::Error;
use kube::{
    runtime::reflector::{ObjectRef, Store},
    Resource,
};

use crate::key::ObjectKey;

/// Read-only view of the last known state of watched objects.
pub trait Cache<K>: Send + Sync {
    /// `Ok(None)` means the object does not exist (anymore).
    fn get_by_key(&self, key: &ObjectKey) -> Result<Option<K>, Error>;
    fn list(&self) -> Vec<K>;
}

/// [`Cache`] backed by a kube reflector store.
#[derive(Clone)]
pub struct ReflectorCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash,
{
    store: Store<K>,
}

impl<K> ReflectorCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash,
{
    pub fn new(store: Store<K>) -> Self {
        ReflectorCache { store }
    }
}

impl<K> Cache<K> for ReflectorCache<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    fn get_by_key(&self, key: &ObjectKey) -> Result<Option<K>, Error> {
        let obj_ref = match &key.namespace {
            Some(namespace) => ObjectRef::new(&key.name).within(namespace),
            None => ObjectRef::new(&key.name),
        };
        Ok(self.store.get(&obj_ref))
    }

    fn list(&self) -> Vec<K> {
        self.store.state()
    }
}

pub mod cache_error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Get {} from cache reported error: {}", key, reason)]
        Lookup { key: String, reason: String },
    }
}
