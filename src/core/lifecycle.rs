//! # Lifecycle State Machine Module / 生命周期状态机模块
//!
//! This module defines the shared lifecycle vocabulary of an auxiliary instance.
//! The worker applies transitions; the façade only observes them, so both sides
//! agree on when an instance can still accept commands.
//!
//! 此模块定义辅助实例共享的生命周期词汇。
//! 工作线程负责应用状态转换；外观对象只观察状态，
//! 因此双方对实例何时仍可接受命令保持一致。
//!
//! ```text
//! CREATED --start--> RUNNING --suspend--> SUSPENDED
//!                       ^                    |
//!                       +------resume--------+
//! CREATED|RUNNING|SUSPENDED --stop--> STOPPING --drained--> STOPPED
//! any --unrecoverable I/O error--> FAILED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a single auxiliary instance.
/// 单个辅助实例的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Worker spawned, channel not opened yet.
    /// 工作线程已创建，通道尚未打开。
    Created,
    /// Channel open, device I/O accepted.
    /// 通道已打开，接受设备 I/O。
    Running,
    /// Channel open, only lifecycle commands accepted.
    /// 通道已打开，仅接受生命周期命令。
    Suspended,
    /// Stop requested, the worker is draining.
    /// 已请求停止，工作线程正在排空队列。
    Stopping,
    /// Terminal: the channel was closed in an orderly way.
    /// 终态：通道已正常关闭。
    Stopped,
    /// Terminal: an unrecoverable channel error (or an abort) occurred.
    /// 终态：发生了不可恢复的通道错误（或被中止）。
    Failed,
}

/// A lifecycle transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Suspend,
    Resume,
    Stop,
    /// The worker finished draining after a stop.
    DrainComplete,
    /// Unrecoverable failure; allowed from every state.
    Fail,
}

impl LifecycleState {
    /// Returns the state reached by applying `transition`, or `None` when the
    /// transition is not allowed from the current state.
    ///
    /// 返回应用 `transition` 后的状态；若当前状态不允许该转换，则返回 `None`。
    pub fn next(self, transition: Transition) -> Option<LifecycleState> {
        use LifecycleState::*;
        match (self, transition) {
            (_, Transition::Fail) => Some(Failed),
            (Created, Transition::Start) => Some(Running),
            (Running, Transition::Suspend) => Some(Suspended),
            (Suspended, Transition::Resume) => Some(Running),
            (Created | Running | Suspended, Transition::Stop) => Some(Stopping),
            (Stopping, Transition::DrainComplete) => Some(Stopped),
            _ => None,
        }
    }

    /// `Stopped` and `Failed` are terminal: nothing is accepted afterwards.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }

    /// Whether device I/O commands may run in this state.
    pub fn accepts_device_io(self) -> bool {
        self == LifecycleState::Running
    }

    /// Whether the channel is expected to be open in this state.
    pub fn channel_open(self) -> bool {
        matches!(
            self,
            LifecycleState::Running | LifecycleState::Suspended | LifecycleState::Stopping
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Suspended => "SUSPENDED",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of an instance's lifecycle, published by the worker.
///
/// `failure` is set exactly once, when the instance enters `Failed`, and keeps
/// the reason so every later caller can be told why the instance is dead.
///
/// 由工作线程发布的实例生命周期快照。
/// `failure` 只在实例进入 `Failed` 时设置一次，并保留原因，
/// 以便之后的每个调用者都能得知实例失效的原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub state: LifecycleState,
    pub failure: Option<String>,
}

impl InstanceStatus {
    pub fn created() -> Self {
        Self {
            state: LifecycleState::Created,
            failure: None,
        }
    }
}
