//! # Auxiliary Façade Module / 辅助外观模块
//!
//! [`Auxiliary`] is the handle test code works with. It turns synchronous
//! looking calls into commands on the worker's queue, then waits on the
//! response slot for the response carrying its own correlation id.
//!
//! [`Auxiliary`] 是测试代码使用的句柄。它将看似同步的调用转换为工作线程队列上的命令，
//! 然后在响应槽上等待携带自身关联 ID 的响应。
//!
//! ## Guarantees / 保证
//!
//! - Every wait is bounded by the caller's timeout, including the wait for
//!   this handle's turn when other callers share it.
//! - Callers sharing a handle are served in call order: the internal lock is
//!   fair, so enqueue order is first-come first-served.
//! - A response for a command the caller gave up on is discarded, never
//!   delivered to a later caller.
//! - Once the instance is `STOPPED` or `FAILED`, calls fail fast with
//!   [`AuxError::LifecycleViolation`] and nothing is enqueued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::deadline;
use crate::core::error::{AuxError, AuxResult};
use crate::core::lifecycle::{InstanceStatus, LifecycleState};
use crate::core::message::{Command, CommandKind, CorrelationId, Request, Response, ResponseStatus};
use crate::core::queue::{
    Admission, CommandSender, ResponseFilter, SlotReader, command_queue, response_slot,
};
use crate::core::worker::{Worker, WorkerSettings};
use crate::infra::channel::Channel;
use crate::reporting::journal::Journal;

/// Extra caller-side wait on top of a device deadline, so the worker's own
/// timeout response normally arrives before the caller gives up.
pub const RESPONSE_GRACE: Duration = Duration::from_millis(250);

/// Caller-facing handle of one auxiliary instance.
///
/// Cheap to clone; all clones talk to the same worker. When the last clone is
/// dropped the worker closes its channel and exits.
///
/// 一个辅助实例面向调用者的句柄。
/// 克隆开销很小；所有克隆都与同一个工作线程通信。
/// 当最后一个克隆被丢弃时，工作线程会关闭其通道并退出。
#[derive(Clone)]
pub struct Auxiliary {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    settings: WorkerSettings,
    link: Mutex<Link>,
    status: watch::Receiver<InstanceStatus>,
    next_id: AtomicU64,
    worker: StdMutex<Option<JoinHandle<()>>>,
    journal: Journal,
}

/// Everything a caller needs exclusively while it has a command outstanding.
struct Link {
    commands: CommandSender,
    responses: SlotReader,
    filter: ResponseFilter,
}

impl Auxiliary {
    /// Spawns the worker thread for `channel` and returns its façade.
    ///
    /// The instance starts in `CREATED`; the channel is opened by
    /// [`Auxiliary::create_instance`].
    pub fn spawn(
        name: impl Into<String>,
        channel: Box<dyn Channel>,
        settings: WorkerSettings,
        journal: Journal,
    ) -> AuxResult<Self> {
        let name = name.into();
        let (commands, queue_rx) = command_queue();
        let (slot_writer, responses) = response_slot();
        let (status_tx, status) = watch::channel(InstanceStatus::created());

        let worker = Worker::new(
            name.clone(),
            channel,
            queue_rx,
            slot_writer,
            status_tx,
            settings.clone(),
            journal.clone(),
        );
        let handle = worker.spawn()?;
        debug!(instance = %name, "auxiliary spawned");

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                settings,
                link: Mutex::new(Link {
                    commands,
                    responses,
                    filter: ResponseFilter::new(),
                }),
                status,
                next_id: AtomicU64::new(1),
                worker: StdMutex::new(Some(handle)),
                journal,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.status.borrow().state
    }

    pub fn status(&self) -> InstanceStatus {
        self.inner.status.borrow().clone()
    }

    /// Device deadline used by commands that do not carry their own.
    pub fn default_timeout(&self) -> Duration {
        self.inner.settings.default_timeout
    }

    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Number of responses this handle discarded because nobody awaited them.
    pub async fn discarded_responses(&self) -> u64 {
        self.inner.link.lock().await.filter.discarded()
    }

    /// Waits until the instance reaches `state`, at most `timeout`.
    pub async fn wait_for_state(&self, state: LifecycleState, timeout: Duration) -> bool {
        let mut status = self.inner.status.clone();
        tokio::time::timeout(timeout, status.wait_for(|s| s.state == state))
            .await
            .is_ok_and(|res| res.is_ok())
    }

    /// Enqueues `request` and waits at most `timeout` for its response.
    ///
    /// Timeouts and worker-side failures come back as a [`Response`] with the
    /// matching status. `Err` is reserved for commands that were never
    /// enqueued because the instance is terminal.
    ///
    /// 将 `request` 入队，并最多等待 `timeout` 获取其响应。
    /// 超时和工作线程端的失败以带有相应状态的 [`Response`] 返回。
    /// `Err` 仅用于因实例处于终态而从未入队的命令。
    pub async fn run_command(&self, request: Request, timeout: Duration) -> AuxResult<Response> {
        let started = Instant::now();
        let deadline = deadline::after_async(started, timeout);
        let kind = request.kind;

        self.ensure_accepting(kind)?;

        let mut link = match tokio::time::timeout_at(deadline, self.inner.link.lock()).await {
            Ok(link) => link,
            Err(_) => {
                let id = self.allocate_id();
                debug!(instance = %self.name(), correlation_id = %id, "caller wait expired before the command was enqueued");
                return Ok(Response::timeout(id, kind).with_timing(started.elapsed(), 0));
            }
        };

        // The instance may have died while this caller waited for its turn.
        self.ensure_accepting(kind)?;

        let id = self.allocate_id();
        link.responses.mark_seen();
        if link.commands.enqueue(Command::new(id, request)).is_err() {
            return Err(self.violation(kind, Some("worker thread exited".to_string())));
        }
        debug!(instance = %self.name(), correlation_id = %id, %kind, "command enqueued");

        loop {
            match tokio::time::timeout_at(deadline, link.responses.next()).await {
                Ok(Some(response)) => match link.filter.admit(id, response.correlation_id) {
                    Admission::Accept => return Ok(response),
                    Admission::Late => debug!(
                        instance = %self.name(),
                        correlation_id = %response.correlation_id,
                        status = %response.status,
                        "discarding late response of an abandoned command"
                    ),
                    Admission::Stray => {
                        let mismatch = AuxError::ProtocolMismatch {
                            instance: self.inner.name.clone(),
                            expected: id,
                            received: response.correlation_id,
                        };
                        warn!("{mismatch}; discarding it");
                    }
                },
                Ok(None) => {
                    warn!(instance = %self.name(), correlation_id = %id, "worker exited without answering");
                    return Ok(Response::error(id, kind, "worker thread exited")
                        .with_timing(started.elapsed(), 0));
                }
                Err(_) => {
                    link.filter.abandon(id);
                    warn!(
                        instance = %self.name(),
                        correlation_id = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "no response in time, abandoning command"
                    );
                    return Ok(Response::timeout(id, kind).with_timing(started.elapsed(), 0));
                }
            }
        }
    }

    /// Opens the channel and moves the instance to `RUNNING`.
    pub async fn create_instance(&self, timeout: Duration) -> AuxResult<()> {
        self.lifecycle(CommandKind::Start, timeout).await
    }

    /// Drains the queue, closes the channel and moves the instance to `STOPPED`.
    pub async fn delete_instance(&self, timeout: Duration) -> AuxResult<()> {
        self.lifecycle(CommandKind::Stop, timeout).await
    }

    pub async fn suspend(&self, timeout: Duration) -> AuxResult<()> {
        self.lifecycle(CommandKind::Suspend, timeout).await
    }

    pub async fn resume(&self, timeout: Duration) -> AuxResult<()> {
        self.lifecycle(CommandKind::Resume, timeout).await
    }

    /// Closes the channel at once and marks the instance `FAILED`.
    pub async fn abort(&self, timeout: Duration) -> AuxResult<()> {
        self.lifecycle(CommandKind::Abort, timeout).await
    }

    /// Writes `payload` without waiting for an answer.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> AuxResult<()> {
        let timeout = deadline::with_grace(self.default_timeout(), RESPONSE_GRACE);
        let response = self.run_command(Request::send(payload), timeout).await?;
        self.settle(response, timeout).map(|_| ())
    }

    /// Writes `payload` and returns the device answer, using the default deadline.
    pub async fn query(&self, payload: impl Into<Vec<u8>>) -> AuxResult<Vec<u8>> {
        self.query_with_timeout(payload, self.default_timeout()).await
    }

    /// Writes `payload` and returns the device answer received within `timeout`.
    pub async fn query_with_timeout(
        &self,
        payload: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> AuxResult<Vec<u8>> {
        let request = Request::query(payload).with_device_timeout(timeout);
        let response = self
            .run_command(request, deadline::with_grace(timeout, RESPONSE_GRACE))
            .await?;
        Ok(self.settle(response, timeout)?.unwrap_or_default())
    }

    /// Waits for an unsolicited report from the device.
    ///
    /// With `blocking == false` the channel is polled once. Returns `Ok(None)`
    /// when nothing arrived in time, since no report is a normal outcome of a
    /// polling loop.
    ///
    /// 等待设备主动上报的报告。
    /// 当 `blocking == false` 时只轮询一次通道。若未及时收到任何内容则返回 `Ok(None)`，
    /// 因为在轮询循环中没有报告是正常结果。
    pub async fn wait_and_get_report(
        &self,
        blocking: bool,
        timeout: Duration,
    ) -> AuxResult<Option<Vec<u8>>> {
        let device_timeout = if blocking { timeout } else { Duration::ZERO };
        let request = Request::new(CommandKind::Listen).with_device_timeout(device_timeout);
        let response = self
            .run_command(request, deadline::with_grace(device_timeout, RESPONSE_GRACE))
            .await?;
        match response.status {
            ResponseStatus::Timeout => Ok(None),
            _ => self.settle(response, device_timeout),
        }
    }

    /// Waits for the worker thread to exit. Only meaningful once the instance
    /// is terminal or every other handle is gone.
    pub(crate) async fn join(&self) {
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let name = self.inner.name.clone();
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => debug!(instance = %name, "worker joined"),
                Ok(Err(_)) => warn!(instance = %name, "worker thread panicked"),
                Err(e) => warn!(instance = %name, "failed to join worker thread: {e}"),
            }
        }
    }

    async fn lifecycle(&self, kind: CommandKind, timeout: Duration) -> AuxResult<()> {
        let response = self.run_command(Request::new(kind), timeout).await?;
        self.settle(response, timeout).map(|_| ())
    }

    /// Turns a response into the payload it carries, or the matching error.
    fn settle(&self, response: Response, timeout: Duration) -> AuxResult<Option<Vec<u8>>> {
        match response.status {
            ResponseStatus::Ok => Ok(response.payload),
            ResponseStatus::Timeout => Err(AuxError::Timeout {
                instance: self.inner.name.clone(),
                correlation_id: response.correlation_id,
                timeout,
            }),
            ResponseStatus::Error => Err(AuxError::CommandFailed {
                instance: self.inner.name.clone(),
                correlation_id: response.correlation_id,
                detail: response.error_detail.unwrap_or_default(),
            }),
        }
    }

    fn allocate_id(&self) -> CorrelationId {
        CorrelationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ensure_accepting(&self, kind: CommandKind) -> AuxResult<()> {
        let status = self.status();
        if status.state.is_terminal() {
            return Err(self.violation(kind, status.failure));
        }
        Ok(())
    }

    fn violation(&self, kind: CommandKind, reason: Option<String>) -> AuxError {
        let status = self.status();
        AuxError::LifecycleViolation {
            instance: self.inner.name.clone(),
            state: status.state,
            command: kind,
            reason: status.failure.or(reason),
        }
    }
}

impl std::fmt::Debug for Auxiliary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auxiliary")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
