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

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Duration;

use crate::key::ObjectKey;

/// What to do with a key after it was reconciled successfully.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Action {
    pub requeue_after: Option<Duration>,
}

impl Action {
    pub fn requeue(duration: Duration) -> Self {
        Action { requeue_after: Some(duration) }
    }

    /// Nothing to do until the next change of the object.
    pub fn await_change() -> Self {
        Action { requeue_after: None }
    }
}

/// User logic converging the actual state of one object toward its desired state.
///
/// `object` is `None` when the object is gone from the cache, so deletions are
/// reconciled with the key alone. Implementations must be idempotent: the same key
/// is reconciled again after every change, every failure and every requeue.
#[async_trait]
pub trait Reconciler<K>: Send + Sync {
    async fn reconcile(&self, key: &ObjectKey, object: Option<K>) -> Result<Action>;
}
