//! # Message Module / 消息模块
//!
//! Commands travel from the façade to the worker; exactly one response travels
//! back for every command the worker dequeues. Both carry the correlation id
//! that ties them together.
//!
//! 命令从外观对象发送到工作线程；工作线程每取出一条命令，
//! 就恰好返回一条响应。两者都携带将它们关联起来的关联 ID。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique tag linking a command to its response.
///
/// Ids are allocated by one façade, start at 1 and grow monotonically in
/// enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a command placed on the command queue.
/// 放入命令队列的命令类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Open the channel and start accepting device I/O.
    /// 打开通道并开始接受设备 I/O。
    Start,
    /// Keep the channel open but reject device I/O.
    /// 保持通道打开，但拒绝设备 I/O。
    Suspend,
    /// Leave the suspended state.
    /// 退出挂起状态。
    Resume,
    /// Drain, close the channel and terminate the worker.
    /// 排空队列、关闭通道并终止工作线程。
    Stop,
    /// Close the channel at once and mark the instance as failed.
    /// 立即关闭通道并将实例标记为失败。
    Abort,
    /// Write the payload without waiting for an answer.
    /// 写入负载，不等待应答。
    Send,
    /// Write the payload and wait for the device answer.
    /// 写入负载并等待设备应答。
    Query,
    /// Wait for an unsolicited report without writing anything.
    /// 不写入任何内容，等待设备主动上报。
    Listen,
}

impl CommandKind {
    /// Device I/O commands touch the channel; the others only drive the lifecycle.
    pub fn is_device_io(self) -> bool {
        matches!(self, CommandKind::Send | CommandKind::Query | CommandKind::Listen)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Suspend => "suspend",
            CommandKind::Resume => "resume",
            CommandKind::Stop => "stop",
            CommandKind::Abort => "abort",
            CommandKind::Send => "send",
            CommandKind::Query => "query",
            CommandKind::Listen => "listen",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller asks for, before the façade turns it into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: CommandKind,
    pub payload: Vec<u8>,
    /// Device-side deadline. `None` uses the instance default.
    pub device_timeout: Option<Duration>,
}

impl Request {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            payload: Vec::new(),
            device_timeout: None,
        }
    }

    pub fn query(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(CommandKind::Query).with_payload(payload)
    }

    pub fn send(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(CommandKind::Send).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = Some(timeout);
        self
    }
}

/// A command as it sits on the queue. Immutable once enqueued; the worker
/// takes ownership when it dequeues it.
///
/// 队列中的命令。一旦入队即不可变；工作线程取出时获得其所有权。
#[derive(Debug, Clone)]
pub struct Command {
    pub correlation_id: CorrelationId,
    pub kind: CommandKind,
    pub payload: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub device_timeout: Option<Duration>,
}

impl Command {
    pub fn new(correlation_id: CorrelationId, request: Request) -> Self {
        Self {
            correlation_id,
            kind: request.kind,
            payload: request.payload,
            issued_at: Utc::now(),
            device_timeout: request.device_timeout,
        }
    }
}

/// Outcome class of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Timeout,
    Error,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseStatus::Ok => "ok",
            ResponseStatus::Timeout => "timeout",
            ResponseStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// The outcome of one command.
///
/// Produced by the worker for every dequeued command, or locally by the façade
/// when its own wait expires (`attempts == 0` in that case).
///
/// 单条命令的执行结果。
/// 由工作线程为每条已取出的命令生成；当外观对象自身等待超时时，
/// 则由外观对象在本地生成（此时 `attempts == 0`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub correlation_id: CorrelationId,
    pub kind: CommandKind,
    pub status: ResponseStatus,
    pub payload: Option<Vec<u8>>,
    pub error_detail: Option<String>,
    /// Time the worker spent on the command, or the caller's wait for local responses.
    pub elapsed: Duration,
    /// Number of channel attempts, including retries.
    pub attempts: u32,
}

impl Response {
    pub fn ok(correlation_id: CorrelationId, kind: CommandKind, payload: Option<Vec<u8>>) -> Self {
        Self {
            correlation_id,
            kind,
            status: ResponseStatus::Ok,
            payload,
            error_detail: None,
            elapsed: Duration::ZERO,
            attempts: 0,
        }
    }

    pub fn timeout(correlation_id: CorrelationId, kind: CommandKind) -> Self {
        Self {
            correlation_id,
            kind,
            status: ResponseStatus::Timeout,
            payload: None,
            error_detail: None,
            elapsed: Duration::ZERO,
            attempts: 0,
        }
    }

    pub fn error(correlation_id: CorrelationId, kind: CommandKind, detail: impl Into<String>) -> Self {
        Self {
            correlation_id,
            kind,
            status: ResponseStatus::Error,
            payload: None,
            error_detail: Some(detail.into()),
            elapsed: Duration::ZERO,
            attempts: 0,
        }
    }

    pub fn with_timing(mut self, elapsed: Duration, attempts: u32) -> Self {
        self.elapsed = elapsed;
        self.attempts = attempts;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn is_timeout(&self) -> bool {
        self.status == ResponseStatus::Timeout
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// Formats a payload as space separated upper-case hex, e.g. `50 49 4E 47`.
pub fn format_payload(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
