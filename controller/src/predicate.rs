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

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use kube::Resource;
use selector_error::Error;

use crate::event::WatchEvent;

type ObjectFn<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;
type UpdateFn<K> = Arc<dyn Fn(&K, &K) -> bool + Send + Sync>;

/// Filter deciding which events of a watch reach the queue.
///
/// Every function is optional, a missing one lets all events of that type through.
pub struct Predicates<K> {
    create: Option<ObjectFn<K>>,
    update: Option<UpdateFn<K>>,
    delete: Option<ObjectFn<K>>,
    generic: Option<ObjectFn<K>>,
}

impl<K> Clone for Predicates<K> {
    fn clone(&self) -> Self {
        Predicates {
            create: self.create.clone(),
            update: self.update.clone(),
            delete: self.delete.clone(),
            generic: self.generic.clone(),
        }
    }
}

impl<K> Default for Predicates<K> {
    fn default() -> Self {
        Predicates { create: None, update: None, delete: None, generic: None }
    }
}

impl<K> Predicates<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.create = Some(Arc::new(f));
        self
    }

    pub fn with_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, &K) -> bool + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn with_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(f));
        self
    }

    pub fn with_generic<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.generic = Some(Arc::new(f));
        self
    }

    pub fn accepts(&self, event: &WatchEvent<K>) -> bool {
        match event {
            WatchEvent::Create(obj) => self.create.as_ref().map_or(true, |f| f(obj)),
            WatchEvent::Update { old, new } => self.update.as_ref().map_or(true, |f| f(old, new)),
            WatchEvent::Delete(obj) => self.delete.as_ref().map_or(true, |f| f(obj)),
            WatchEvent::Generic(obj) => self.generic.as_ref().map_or(true, |f| f(obj)),
        }
    }

    /// Passes an event as soon as one of `predicates` passes it.
    pub fn any_of(predicates: Vec<Predicates<K>>) -> Self
    where
        K: Clone + 'static,
    {
        let predicates = Arc::new(predicates);
        let (create, delete, generic, update) =
            (predicates.clone(), predicates.clone(), predicates.clone(), predicates);
        Predicates::new()
            .with_create(move |obj: &K| create.iter().any(|p| p.accepts(&WatchEvent::Create(obj.clone()))))
            .with_delete(move |obj: &K| delete.iter().any(|p| p.accepts(&WatchEvent::Delete(obj.clone()))))
            .with_generic(move |obj: &K| generic.iter().any(|p| p.accepts(&WatchEvent::Generic(obj.clone()))))
            .with_update(move |old: &K, new: &K| {
                update.iter().any(|p| p.accepts(&WatchEvent::Update { old: old.clone(), new: new.clone() }))
            })
    }

    /// Ignore creations, for dependent resources created by the reconciler itself.
    pub fn skip_create() -> Self {
        Predicates::new().with_create(|_: &K| false)
    }
}

impl<K> Predicates<K>
where
    K: Resource + 'static,
{
    /// Updates pass only when `metadata.generation` changed, i.e. the spec was modified.
    pub fn generation_changed() -> Self {
        Predicates::new().with_update(|old: &K, new: &K| old.meta().generation != new.meta().generation)
    }

    /// Updates pass for objects whose kind does not maintain `metadata.generation`.
    pub fn no_generation() -> Self {
        Predicates::new().with_update(|_: &K, new: &K| new.meta().generation.unwrap_or(0) == 0)
    }

    pub fn annotations_changed() -> Self {
        Predicates::new().with_update(|old: &K, new: &K| old.meta().annotations != new.meta().annotations)
    }

    pub fn labels_changed() -> Self {
        Predicates::new().with_update(|old: &K, new: &K| old.meta().labels != new.meta().labels)
    }

    /// Every event passes only for objects matching `selector`, updates are judged by the
    /// new object.
    pub fn label_selector(selector: LabelSelector) -> Self {
        let selector = Arc::new(selector);
        let (create, update, delete, generic) = (selector.clone(), selector.clone(), selector.clone(), selector);
        Predicates::new()
            .with_create(move |obj: &K| create.matches(obj.meta().labels.as_ref()))
            .with_update(move |_: &K, new: &K| update.matches(new.meta().labels.as_ref()))
            .with_delete(move |obj: &K| delete.matches(obj.meta().labels.as_ref()))
            .with_generic(move |obj: &K| generic.matches(obj.meta().labels.as_ref()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

impl Requirement {
    fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let get = |key: &str| labels.and_then(|labels| labels.get(key));
        match self {
            Requirement::Equals(key, value) => get(key) == Some(value),
            Requirement::NotEquals(key, value) => get(key) != Some(value),
            Requirement::Exists(key) => get(key).is_some(),
            Requirement::NotExists(key) => get(key).is_none(),
        }
    }
}

/// Equality based label selector: `k=v`, `k==v`, `k!=v`, `k` and `!k`, comma separated.
/// An empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(LabelSelector::default());
        }
        let mut requirements = Vec::new();
        for term in s.split(',').map(str::trim) {
            let invalid = || Error::InvalidRequirement { value: term.to_string() };
            let requirement = if let Some(key) = term.strip_prefix('!') {
                Requirement::NotExists(key.trim().to_string())
            } else if let Some((key, value)) = term.split_once("!=") {
                Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = term.split_once("==") {
                Requirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = term.split_once('=') {
                Requirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else {
                Requirement::Exists(term.to_string())
            };
            let key = match &requirement {
                Requirement::Equals(key, _)
                | Requirement::NotEquals(key, _)
                | Requirement::Exists(key)
                | Requirement::NotExists(key) => key,
            };
            if key.is_empty() || key.contains(|c: char| c == '=' || c == '!' || c.is_whitespace()) {
                return Err(invalid());
            }
            requirements.push(requirement);
        }
        Ok(LabelSelector { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .requirements
            .iter()
            .map(|r| match r {
                Requirement::Equals(key, value) => format!("{}={}", key, value),
                Requirement::NotEquals(key, value) => format!("{}!={}", key, value),
                Requirement::Exists(key) => key.clone(),
                Requirement::NotExists(key) => format!("!{}", key),
            })
            .collect();
        write!(f, "{}", terms.join(","))
    }
}

pub mod selector_error {
    use thiserror::Error;

    #[derive(Error, Debug, PartialEq, Eq)]
    pub enum Error {
        #[error("'{}' is not a valid label selector requirement", value)]
        InvalidRequirement { value: String },
    }
}
