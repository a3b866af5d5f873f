//! # Deadline Arithmetic / 截止时间计算
//!
//! Timeouts come from configuration and callers, so any `Duration` is
//! possible, `Duration::MAX` included. Deadlines are computed here without
//! overflowing: a timeout too large to represent means "about 30 years from
//! now", the same substitute `tokio::time` uses.
//!
//! 超时来自配置和调用者，因此可能是任意 `Duration`，包括 `Duration::MAX`。
//! 此处计算截止时间时不会溢出：无法表示的超时被视为“约 30 年之后”，
//! 与 `tokio::time` 使用的替代值相同。

use std::time::{Duration, Instant};

/// Stand-in for a deadline that does not fit into an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + timeout`, clamped to a far-future instant instead of panicking.
pub fn after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// `tokio` flavor of [`after`], for deadlines awaited on the runtime.
pub fn after_async(start: tokio::time::Instant, timeout: Duration) -> tokio::time::Instant {
    tokio::time::Instant::from_std(after(start.into_std(), timeout))
}

/// Adds `grace` to a device timeout, saturating at `Duration::MAX`.
pub fn with_grace(timeout: Duration, grace: Duration) -> Duration {
    timeout.saturating_add(grace)
}

