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

/// Change notification delivered to dispatchers.
#[derive(Clone, Debug)]
pub enum WatchEvent<K> {
    Create(K),
    Update { old: K, new: K },
    Delete(K),
    /// Event from outside the cluster, e.g. a periodic trigger.
    Generic(K),
}

impl<K> WatchEvent<K> {
    pub fn event_type(&self) -> &'static str {
        match self {
            WatchEvent::Create(_) => "Create",
            WatchEvent::Update { .. } => "Update",
            WatchEvent::Delete(_) => "Delete",
            WatchEvent::Generic(_) => "Generic",
        }
    }

    /// The object the event is about, the new one for updates.
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Create(obj) | WatchEvent::Delete(obj) | WatchEvent::Generic(obj) => obj,
            WatchEvent::Update { new, .. } => new,
        }
    }
}
