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

//! Work queue driven reconciliation loop.
//!
//! Watch events go through [`Dispatcher`]s that turn them into [`ObjectKey`]s on the
//! controller queue. A [`WorkerPool`] takes keys from the queue, looks the object up in a
//! [`Cache`] and hands it to the user's [`Reconciler`]. Failed keys come back with
//! exponential backoff until they fail `max_retries` times in a row.

#[cfg(test)]
mod apiserver_mock;
pub mod cache;
mod controller;
pub mod event;
pub mod handler;
pub mod key;
pub mod predicate;
mod reconciler;
pub mod source;
pub mod values;
mod worker;

pub use cache::{Cache, ReflectorCache};
pub use controller::{Controller, ControllerConfig};
pub use event::WatchEvent;
pub use handler::{Dispatcher, EventHandler};
pub use key::{object_key, ObjectKey};
pub use predicate::{LabelSelector, Predicates};
pub use reconciler::{Action, Reconciler};
pub use source::{Informer, WatchSource};
pub use worker::WorkerPool;
pub use workqueue::RateLimitingQueue;
