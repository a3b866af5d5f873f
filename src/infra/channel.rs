//! # Channel Capability Module / 通道能力模块
//!
//! The transport abstraction every auxiliary worker owns exclusively.
//! Concrete connectors (CAN, serial, sockets, simulators) implement [`Channel`];
//! the core never assumes a specific transport.
//!
//! 每个辅助工作线程独占的传输抽象。
//! 具体连接器（CAN、串口、套接字、模拟器）实现 [`Channel`]；
//! 核心从不假定特定的传输方式。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Broad classes of channel failures.
///
/// Whether a class is retried is decided by the instance's `RetryPolicy`,
/// never by the channel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelErrorKind {
    /// The device or bus is temporarily unable to take the request.
    Busy,
    /// The operation was interrupted before completing.
    Interrupted,
    /// The link is gone.
    Disconnected,
    /// Any other I/O failure.
    Io,
    Other,
}

impl fmt::Display for ChannelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelErrorKind::Busy => "busy",
            ChannelErrorKind::Interrupted => "interrupted",
            ChannelErrorKind::Disconnected => "disconnected",
            ChannelErrorKind::Io => "io",
            ChannelErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// An error reported by a channel implementation.
/// 通道实现报告的错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    pub message: String,
}

impl ChannelError {
    pub fn new(kind: ChannelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Busy, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Disconnected, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Io, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Other, message)
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy => ChannelErrorKind::Busy,
            io::ErrorKind::Interrupted => ChannelErrorKind::Interrupted,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ChannelErrorKind::Disconnected,
            _ => ChannelErrorKind::Io,
        };
        ChannelError::new(kind, err.to_string())
    }
}

/// The capability a worker needs from its transport.
///
/// All methods are blocking and are only ever called from the worker thread
/// that owns the channel.
///
/// 工作线程对其传输层所需的能力。
/// 所有方法都是阻塞的，并且只会在拥有该通道的工作线程中调用。
pub trait Channel: Send {
    /// Opens the underlying link.
    fn open(&mut self) -> Result<(), ChannelError>;

    /// Closes the underlying link. Closing an already closed channel is not an error.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Writes one raw message.
    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError>;

    /// Waits up to `timeout` for one raw message.
    ///
    /// `Ok(None)` means no data arrived in time. A zero timeout polls.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn open(&mut self) -> Result<(), ChannelError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        (**self).close()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        (**self).send(message)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        (**self).receive(timeout)
    }
}
