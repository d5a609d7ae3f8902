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

//! Work queue used by controllers to serialize reconciliation per key.
//!
//! * [`Queue`]: de-duplicating FIFO, at most one in-flight claim per item
//!
//! * [`DelayingQueue`]: adds items back after a delay, driven by one timer task
//!
//! * [`RateLimitingQueue`]: delays computed by a [`RateLimiter`] from the item's failure history

mod delaying;
mod queue;
mod rate_limiter;
mod rate_limiting;
pub mod values;

pub use delaying::DelayingQueue;
pub use queue::Queue;
pub use rate_limiter::{
    default_controller_rate_limiter, BucketRateLimiter, ItemExponentialFailureRateLimiter, ItemFastSlowRateLimiter,
    MaxOfRateLimiter, RateLimiter,
};
pub use rate_limiting::RateLimitingQueue;
