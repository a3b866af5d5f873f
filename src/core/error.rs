//! # Error Module / 错误模块
//!
//! The error taxonomy of the auxiliary core.
//!
//! Only final outcomes cross the façade boundary: transient channel conditions
//! are retried inside the worker and surface, if at all, as `CommandFailed`
//! once retries are exhausted.
//!
//! 辅助核心的错误分类。
//! 只有最终结果会跨越外观边界：瞬时通道状况在工作线程内部重试，
//! 仅在重试耗尽后才以 `CommandFailed` 的形式出现。

use crate::core::lifecycle::LifecycleState;
use crate::core::message::{CommandKind, CorrelationId};
use crate::infra::channel::ChannelError;
use std::time::Duration;
use thiserror::Error;

pub type AuxResult<T> = Result<T, AuxError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuxError {
    /// No response within the caller's or the device's deadline.
    #[error("auxiliary '{instance}' did not answer {correlation_id} within {timeout:?}")]
    Timeout {
        instance: String,
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    /// A retryable channel condition. Never surfaced while retries remain.
    #[error("transient I/O failure on '{instance}': {source}")]
    TransientIo {
        instance: String,
        #[source]
        source: ChannelError,
    },

    /// Unrecoverable device or link error; the instance is now `FAILED`.
    #[error("channel failure on '{instance}': {source}")]
    ChannelFailure {
        instance: String,
        #[source]
        source: ChannelError,
    },

    /// A response did not match the command it was compared against.
    #[error("auxiliary '{instance}' answered {received} while {expected} was awaited")]
    ProtocolMismatch {
        instance: String,
        expected: CorrelationId,
        received: CorrelationId,
    },

    /// The command is not allowed in the instance's current state.
    #[error("auxiliary '{instance}' cannot accept '{command}' while {state}{}", reason_suffix(.reason))]
    LifecycleViolation {
        instance: String,
        state: LifecycleState,
        command: CommandKind,
        reason: Option<String>,
    },

    /// The worker executed the command and reported an error.
    #[error("auxiliary '{instance}' failed {correlation_id}: {detail}")]
    CommandFailed {
        instance: String,
        correlation_id: CorrelationId,
        detail: String,
    },

    #[error("no auxiliary named '{0}' is registered")]
    UnknownInstance(String),

    #[error("an auxiliary named '{0}' is already registered")]
    DuplicateInstance(String),

    #[error("no channel builder registered for kind '{0}'")]
    UnknownChannelKind(String),

    #[error("invalid auxiliary configuration: {0}")]
    InvalidConfig(String),

    #[error("could not spawn the worker thread for '{instance}': {detail}")]
    Spawn { instance: String, detail: String },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl AuxError {
    /// Whether a higher layer could sensibly try the same operation again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuxError::Timeout { .. } | AuxError::TransientIo { .. })
    }
}
