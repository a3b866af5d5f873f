//! # Auxiliary Worker Module / 辅助工作线程模块
//!
//! The per-device control loop. A worker owns its channel exclusively, runs on
//! a dedicated OS thread, and processes commands strictly one at a time in
//! enqueue order. Each dequeued command produces exactly one response, even
//! when the worker is on its way out.
//!
//! 每个设备的控制循环。工作线程独占其通道，运行在专用的操作系统线程上，
//! 并严格按入队顺序逐条处理命令。即使工作线程即将退出，
//! 每条已取出的命令也会恰好产生一条响应。
//!
//! ## Per-command contract / 每条命令的约定
//!
//! - Lifecycle commands (`start`, `suspend`, `resume`, `stop`, `abort`) are
//!   always dequeued, even while suspended.
//! - Device I/O commands only run while `RUNNING`; otherwise they are answered
//!   with `error` right away.
//! - "No data before the deadline" is a `timeout` response, never fatal.
//! - Transient channel failures are retried per [`RetryPolicy`]; exhausted
//!   retries end in `error` while the instance keeps running.
//! - Any other channel failure moves the instance to `FAILED`; every command
//!   still queued then receives an `error` response.
//! - After a query timed out, device data arriving within the late-response
//!   window is discarded before the next device I/O.
//! - A panic while handling a command is contained: the command gets an
//!   `error` response and the instance moves to `FAILED`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn};

use crate::core::deadline;
use crate::core::error::{AuxError, AuxResult};
use crate::core::lifecycle::{InstanceStatus, LifecycleState, Transition};
use crate::core::message::{Command, CommandKind, Response, format_payload};
use crate::core::policy::RetryPolicy;
use crate::core::queue::{CommandReceiver, SlotWriter};
use crate::infra::channel::{Channel, ChannelError};
use crate::reporting::journal::{CommandRecord, Journal};

/// Upper bound of stale frames discarded before a query.
const MAX_STALE_FRAMES: usize = 256;

/// Default time after a query timeout during which device data counts as late.
pub const DEFAULT_LATE_RESPONSE_WINDOW: Duration = Duration::from_millis(100);

/// Resolved runtime settings of one worker.
/// 单个工作线程的已解析运行时设置。
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Device deadline for I/O commands that do not carry their own.
    /// 未携带自身截止时间的 I/O 命令所使用的设备截止时间。
    pub default_timeout: Duration,
    pub retry: RetryPolicy,
    /// Discard frames already waiting on the channel before sending a query.
    /// 在发送查询之前丢弃通道中已等待的帧。
    pub flush_stale_input: bool,
    /// After a query timed out, discard whatever the device sends for this
    /// long before running the next device I/O. Zero disables it.
    /// 查询超时后，在执行下一次设备 I/O 之前丢弃设备在此时长内发送的任何数据。为零时禁用。
    pub late_response_window: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            flush_stale_input: true,
            late_response_window: DEFAULT_LATE_RESPONSE_WINDOW,
        }
    }
}

/// Result of a single channel attempt.
enum Exchange {
    Sent,
    Received(Vec<u8>),
    NoData,
}

pub(crate) struct Worker {
    name: String,
    channel: Box<dyn Channel>,
    commands: CommandReceiver,
    responses: SlotWriter,
    status: watch::Sender<InstanceStatus>,
    settings: WorkerSettings,
    journal: Journal,
    /// End of the window opened by the last query timeout.
    late_until: Option<Instant>,
}

impl Worker {
    pub(crate) fn new(
        name: String,
        channel: Box<dyn Channel>,
        commands: CommandReceiver,
        responses: SlotWriter,
        status: watch::Sender<InstanceStatus>,
        settings: WorkerSettings,
        journal: Journal,
    ) -> Self {
        Self {
            name,
            channel,
            commands,
            responses,
            status,
            settings,
            journal,
            late_until: None,
        }
    }

    /// Moves the worker onto its own named thread.
    pub(crate) fn spawn(self) -> AuxResult<JoinHandle<()>> {
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("aux-{name}"))
            .spawn(move || self.run())
            .map_err(|e| AuxError::Spawn {
                instance: name,
                detail: e.to_string(),
            })
    }

    fn run(mut self) {
        let span = info_span!("auxiliary", instance = %self.name);
        let _entered = span.enter();
        debug!("worker started");

        while let Some(command) = self.commands.next_blocking() {
            let handled = panic::catch_unwind(AssertUnwindSafe(|| self.handle(&command)));
            if let Err(panic) = handled {
                self.contain_panic(&command, panic.as_ref());
            }
            if self.state().is_terminal() {
                break;
            }
        }

        self.finish();
    }

    fn state(&self) -> LifecycleState {
        self.status.borrow().state
    }

    /// Runs one command to completion and publishes its response.
    fn handle(&mut self, command: &Command) {
        let started = Instant::now();
        debug!(correlation_id = %command.correlation_id, kind = %command.kind, "command dequeued");

        let (response, attempts) = match command.kind {
            CommandKind::Start => (self.start(command), 1),
            CommandKind::Suspend => (self.change_state(command, Transition::Suspend), 0),
            CommandKind::Resume => (self.change_state(command, Transition::Resume), 0),
            CommandKind::Stop => (self.stop(command), 0),
            CommandKind::Abort => (self.abort(command), 0),
            CommandKind::Send | CommandKind::Query | CommandKind::Listen => self.device_io(command),
        };

        let response = response.with_timing(started.elapsed(), attempts);
        debug!(
            correlation_id = %response.correlation_id,
            status = %response.status,
            elapsed_ms = response.elapsed.as_millis() as u64,
            "command completed"
        );
        self.respond(command, response);
    }

    /// The command that panicked is answered with `error`, then the instance fails.
    fn contain_panic(&mut self, command: &Command, panic: &(dyn Any + Send)) {
        let message = panic
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown cause");
        let reason = format!("worker panicked while handling {}: {message}", command.kind);
        error!(correlation_id = %command.correlation_id, "{reason}");

        if self.state().channel_open() {
            self.close_channel();
        }
        self.mark_failed(reason.clone());
        self.respond(command, Response::error(command.correlation_id, command.kind, reason));
    }

    fn respond(&self, command: &Command, response: Response) {
        self.journal
            .record(CommandRecord::new(&self.name, command, &response));
        self.responses.publish(response);
    }

    fn rejection(&self, command: &Command) -> Response {
        let status = self.status.borrow().clone();
        let violation = AuxError::LifecycleViolation {
            instance: self.name.clone(),
            state: status.state,
            command: command.kind,
            reason: status.failure,
        };
        debug!(correlation_id = %command.correlation_id, "{violation}");
        Response::error(command.correlation_id, command.kind, violation.to_string())
    }

    fn transition(&mut self, transition: Transition) -> bool {
        let current = self.state();
        match current.next(transition) {
            Some(next) => {
                self.status.send_modify(|status| status.state = next);
                info!(from = %current, to = %next, "lifecycle transition");
                true
            }
            None => false,
        }
    }

    fn start(&mut self, command: &Command) -> Response {
        if self.state() != LifecycleState::Created {
            return self.rejection(command);
        }
        self.late_until = None;
        match self.channel.open() {
            Ok(()) => {
                self.transition(Transition::Start);
                Response::ok(command.correlation_id, command.kind, None)
            }
            Err(err) => {
                let failure = self.fail(err);
                Response::error(command.correlation_id, command.kind, failure.to_string())
            }
        }
    }

    fn change_state(&mut self, command: &Command, transition: Transition) -> Response {
        if self.transition(transition) {
            Response::ok(command.correlation_id, command.kind, None)
        } else {
            self.rejection(command)
        }
    }

    fn stop(&mut self, command: &Command) -> Response {
        let was_open = self.state().channel_open();
        if !self.transition(Transition::Stop) {
            return self.rejection(command);
        }
        if was_open {
            self.close_channel();
        }
        self.transition(Transition::DrainComplete);
        Response::ok(command.correlation_id, command.kind, None)
    }

    fn abort(&mut self, command: &Command) -> Response {
        if self.state().channel_open() {
            self.close_channel();
        }
        warn!(correlation_id = %command.correlation_id, "instance aborted by caller");
        self.mark_failed("aborted by caller".to_string());
        Response::ok(command.correlation_id, command.kind, None)
    }

    /// Executes a device I/O command with the retry policy applied.
    ///
    /// Returns the response and the number of channel attempts made.
    fn device_io(&mut self, command: &Command) -> (Response, u32) {
        if !self.state().accepts_device_io() {
            return (self.rejection(command), 0);
        }

        let timeout = command
            .device_timeout
            .unwrap_or(self.settings.default_timeout);
        let id = command.correlation_id;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.exchange(command, timeout) {
                Ok(Exchange::Sent) => return (Response::ok(id, command.kind, None), attempts),
                Ok(Exchange::Received(payload)) => {
                    debug!(correlation_id = %id, payload = %format_payload(&payload), "device answered");
                    return (Response::ok(id, command.kind, Some(payload)), attempts);
                }
                Ok(Exchange::NoData) => {
                    debug!(correlation_id = %id, timeout_ms = timeout.as_millis() as u64, "no device data before the deadline");
                    if command.kind == CommandKind::Query && !self.settings.late_response_window.is_zero() {
                        self.late_until = Some(deadline::after(
                            Instant::now(),
                            self.settings.late_response_window,
                        ));
                    }
                    return (Response::timeout(id, command.kind), attempts);
                }
                Err(err) if self.settings.retry.is_transient(&err) => {
                    let retry = attempts;
                    if retry > self.settings.retry.retries {
                        let exhausted = AuxError::TransientIo {
                            instance: self.name.clone(),
                            source: err,
                        };
                        warn!(correlation_id = %id, attempts, "retries exhausted: {exhausted}");
                        let detail = format!("retries exhausted after {attempts} attempts: {exhausted}");
                        return (Response::error(id, command.kind, detail), attempts);
                    }
                    let delay = self.settings.retry.backoff(retry);
                    warn!(
                        correlation_id = %id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient channel failure, retrying: {err}"
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    let failure = self.fail(err);
                    return (Response::error(id, command.kind, failure.to_string()), attempts);
                }
            }
        }
    }

    /// One channel attempt for a device I/O command.
    fn exchange(&mut self, command: &Command, timeout: Duration) -> Result<Exchange, ChannelError> {
        self.discard_late_answers()?;
        match command.kind {
            CommandKind::Send => {
                self.channel.send(&command.payload)?;
                Ok(Exchange::Sent)
            }
            CommandKind::Query => {
                if self.settings.flush_stale_input {
                    self.discard_stale_input()?;
                }
                let deadline = deadline::after(Instant::now(), timeout);
                self.channel.send(&command.payload)?;
                self.receive_until(deadline)
            }
            CommandKind::Listen => self.receive_until(deadline::after(Instant::now(), timeout)),
            // Lifecycle commands are handled before any channel exchange.
            _ => Ok(Exchange::NoData),
        }
    }

    fn receive_until(&mut self, deadline: Instant) -> Result<Exchange, ChannelError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(frame) = self.channel.receive(remaining)? {
                return Ok(Exchange::Received(frame));
            }
            if Instant::now() >= deadline {
                return Ok(Exchange::NoData);
            }
        }
    }

    /// Waits out the window opened by the last query timeout, dropping any
    /// device data that shows up meanwhile: it answers a query nobody waits for.
    fn discard_late_answers(&mut self) -> Result<(), ChannelError> {
        let Some(until) = self.late_until.take() else {
            return Ok(());
        };
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            if let Some(frame) = self.channel.receive(remaining)? {
                debug!(payload = %format_payload(&frame), "discarding late device answer");
            }
        }
    }

    /// Drops frames that arrived while nobody was waiting, typically late
    /// answers to commands whose callers already gave up.
    fn discard_stale_input(&mut self) -> Result<(), ChannelError> {
        for _ in 0..MAX_STALE_FRAMES {
            match self.channel.receive(Duration::ZERO)? {
                Some(frame) => {
                    debug!(payload = %format_payload(&frame), "discarding stale device data")
                }
                None => return Ok(()),
            }
        }
        Ok(())
    }

    fn close_channel(&mut self) {
        if let Err(err) = self.channel.close() {
            warn!("closing the channel failed: {err}");
        }
    }

    /// Records an unrecoverable channel failure and moves to `FAILED`.
    fn fail(&mut self, err: ChannelError) -> AuxError {
        let failure = AuxError::ChannelFailure {
            instance: self.name.clone(),
            source: err,
        };
        error!("{failure}");
        if self.state().channel_open() {
            self.close_channel();
        }
        self.mark_failed(failure.to_string());
        failure
    }

    fn mark_failed(&mut self, reason: String) {
        let previous = self.state();
        self.status.send_modify(|status| {
            status.state = LifecycleState::Failed;
            status.failure.get_or_insert(reason);
        });
        info!(from = %previous, to = %LifecycleState::Failed, "lifecycle transition");
    }

    /// Leaves the loop: closes the channel if every handle went away while it
    /// was open, then answers every command still queued.
    fn finish(mut self) {
        if !self.state().is_terminal() {
            debug!("every façade handle is gone, stopping");
            let was_open = self.state().channel_open();
            self.transition(Transition::Stop);
            if was_open {
                self.close_channel();
            }
            self.transition(Transition::DrainComplete);
        }

        let pending = self.commands.close_and_drain();
        if !pending.is_empty() {
            warn!(count = pending.len(), state = %self.state(), "rejecting queued commands");
        }
        for command in pending {
            let response = self.rejection(&command);
            self.respond(&command, response);
        }
        info!(state = %self.state(), "worker exited");
    }
}
