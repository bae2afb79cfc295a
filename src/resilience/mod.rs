// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience utilities.
//!
//! The engine itself never retries: a failed invocation is logged and the
//! un-advanced watermark makes the next scheduled run cover the same
//! window. Callers that want tighter recovery (connection setup, one-off
//! administrative runs) wrap their calls with [`retry::retry`].

pub mod retry;

pub use retry::{retry, RetryConfig};
