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

use std::{fmt, str::FromStr, sync::Arc};

use key_error::Error;
use kube::Resource;

/// Stable identifier of a watched object, `namespace/name` or just `name` for
/// cluster scoped objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(name: &str) -> Self {
        ObjectKey { namespace: None, name: name.to_string() }
    }

    pub fn namespaced(namespace: &str, name: &str) -> Self {
        ObjectKey { namespace: Some(namespace.to_string()), name: name.to_string() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidKey { value: s.to_string() };
        match s.split_once('/') {
            Some((namespace, name)) => {
                if namespace.is_empty() || name.is_empty() || name.contains('/') {
                    return Err(invalid());
                }
                Ok(ObjectKey::namespaced(namespace, name))
            },
            None if s.is_empty() => Err(invalid()),
            None => Ok(ObjectKey::new(s)),
        }
    }
}

/// Maps an object to the key it is queued under.
pub type KeyFunc<K> = Arc<dyn Fn(&K) -> Result<ObjectKey, Error> + Send + Sync>;

/// Default key function: `metadata.namespace` and `metadata.name`.
pub fn object_key<K>(obj: &K) -> Result<ObjectKey, Error>
where
    K: Resource,
    K::DynamicType: Default,
{
    let meta = obj.meta();
    let name = meta.name.as_ref().ok_or_else(|| Error::MissingObjectKey {
        resource: K::kind(&K::DynamicType::default()).to_lowercase(),
        value: String::from("name"),
    })?;
    Ok(ObjectKey { namespace: meta.namespace.clone(), name: name.clone() })
}

pub mod key_error {
    use thiserror::Error;

    #[derive(Error, Debug, PartialEq, Eq)]
    pub enum Error {
        #[error("{}.metadata.{} is not exist", resource, value)]
        MissingObjectKey { resource: String, value: String },

        #[error("'{}' is not a valid object key, expect namespace/name or name", value)]
        InvalidKey { value: String },
    }
}
