//! # Retry Policy Module / 重试策略模块
//!
//! Which channel failures are transient, how often they are retried and how
//! long the worker backs off in between. All of it comes from configuration;
//! the worker holds no device-specific table of its own.
//!
//! 哪些通道故障属于瞬时故障、重试次数以及两次重试之间的退避时长。
//! 所有这些都来自配置；工作线程本身不持有任何设备特定的表。

use crate::infra::channel::{ChannelError, ChannelErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and classification policy for device I/O commands.
/// 设备 I/O 命令的重试与分类策略。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// How many times a transient failure is retried before giving up.
    /// 放弃前瞬时故障的重试次数。
    pub retries: u32,
    /// Delay before the first retry, in milliseconds.
    /// 第一次重试前的延迟（毫秒）。
    pub backoff_ms: u64,
    /// Factor applied to the delay after every retry.
    /// 每次重试后应用于延迟的倍数。
    pub backoff_multiplier: f64,
    /// Upper bound of a single delay, in milliseconds.
    /// 单次延迟的上限（毫秒）。
    pub max_backoff_ms: u64,
    /// Failure classes considered transient. Everything else is unrecoverable.
    /// 被视为瞬时的故障类别。其他所有类别均不可恢复。
    pub transient: Vec<ChannelErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff_ms: 50,
            backoff_multiplier: 2.0,
            max_backoff_ms: 1_000,
            transient: vec![ChannelErrorKind::Busy, ChannelErrorKind::Interrupted],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries and treats every failure as unrecoverable.
    pub fn none() -> Self {
        Self {
            retries: 0,
            transient: Vec::new(),
            ..Self::default()
        }
    }

    pub fn is_transient(&self, error: &ChannelError) -> bool {
        self.transient.contains(&error.kind)
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let factor = if self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier.powi(exponent)
        } else {
            1.0
        };
        let millis = (self.backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}
