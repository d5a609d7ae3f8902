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

use tokio::time::Duration;

use crate::reconciler::Action;

pub const DEFAULT_MAX_RETRIES: u32 = 15;

pub const ANNOTATION_PRIMARY_RESOURCE: &str = "operator-sdk/primary-resource";
pub const ANNOTATION_PRIMARY_RESOURCE_TYPE: &str = "operator-sdk/primary-resource-type";

pub const NO_REQUEUE: Action = Action { requeue_after: None };

// backoff of the watch stream after an error: 500ms, 1s, 2s, ... capped at 30s, jittered
pub const WATCH_RETRY_BASE_MILLIS: u64 = 2;
pub const WATCH_RETRY_FACTOR: u64 = 250;
pub const WATCH_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
