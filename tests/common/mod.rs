// Shared test helpers for integration tests
#![allow(dead_code)]

use aux_runner::core::facade::Auxiliary;
use aux_runner::core::policy::RetryPolicy;
use aux_runner::core::worker::WorkerSettings;
use aux_runner::infra::channel::{Channel, ChannelError};
use aux_runner::reporting::journal::Journal;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Mutable state of a [`ScriptedChannel`], shared with the test through a [`Remote`].
#[derive(Default)]
struct Script {
    open: bool,
    /// Echo every sent frame back after this latency.
    echo: Option<Duration>,
    /// Frames waiting to be received, with the instant they become readable.
    inbox: VecDeque<(Instant, Vec<u8>)>,
    sent: Vec<Vec<u8>>,
    send_delay: Duration,
    open_errors: VecDeque<ChannelError>,
    send_errors: VecDeque<ChannelError>,
    receive_errors: VecDeque<ChannelError>,
    /// Make the next `send` panic with this message.
    send_panic: Option<String>,
    opens: usize,
    closes: usize,
    active: usize,
    max_active: usize,
}

/// A channel double whose behavior is driven, and observed, through a [`Remote`].
pub struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
}

/// The test-side handle of a [`ScriptedChannel`].
#[derive(Clone)]
pub struct Remote {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChannel {
    /// A channel that echoes every frame immediately.
    pub fn echo() -> (Self, Remote) {
        Self::echo_with_latency(Duration::ZERO)
    }

    /// A channel that echoes every frame after `latency`.
    pub fn echo_with_latency(latency: Duration) -> (Self, Remote) {
        let (channel, remote) = Self::silent();
        remote.lock().echo = Some(latency);
        (channel, remote)
    }

    /// A channel that accepts everything and never answers on its own.
    pub fn silent() -> (Self, Remote) {
        let script = Arc::new(Mutex::new(Script::default()));
        (
            Self {
                script: script.clone(),
            },
            Remote { script },
        )
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn enter(&self) {
        let mut script = self.lock();
        script.active += 1;
        script.max_active = script.max_active.max(script.active);
    }

    fn leave(&self) {
        self.lock().active -= 1;
    }
}

impl Channel for ScriptedChannel {
    fn open(&mut self) -> Result<(), ChannelError> {
        let mut script = self.lock();
        script.opens += 1;
        if let Some(err) = script.open_errors.pop_front() {
            return Err(err);
        }
        script.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        let mut script = self.lock();
        script.closes += 1;
        script.open = false;
        Ok(())
    }

    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        self.enter();
        let delay = self.lock().send_delay;
        thread::sleep(delay);

        let panic_message = self.lock().send_panic.take();
        if let Some(message) = panic_message {
            self.leave();
            panic!("{message}");
        }

        let result = {
            let mut script = self.lock();
            if let Some(err) = script.send_errors.pop_front() {
                Err(err)
            } else {
                script.sent.push(message.to_vec());
                if let Some(latency) = script.echo {
                    script
                        .inbox
                        .push_back((Instant::now() + latency, message.to_vec()));
                }
                Ok(())
            }
        };
        self.leave();
        result
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        self.enter();
        let now = Instant::now();
        let deadline = now.checked_add(timeout);

        let ready_at = {
            let mut script = self.lock();
            if let Some(err) = script.receive_errors.pop_front() {
                drop(script);
                self.leave();
                return Err(err);
            }
            script
                .inbox
                .front()
                .map(|(ready_at, _)| *ready_at)
                .filter(|ready_at| deadline.is_none_or(|deadline| *ready_at <= deadline))
        };

        let frame = match ready_at {
            Some(ready_at) => {
                thread::sleep(ready_at.saturating_duration_since(now));
                self.lock().inbox.pop_front().map(|(_, frame)| frame)
            }
            None => {
                thread::sleep(timeout);
                None
            }
        };
        self.leave();
        Ok(frame)
    }
}

impl Remote {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Makes `frame` readable `after` from now, as if the device sent it unsolicited.
    pub fn push_incoming(&self, frame: &[u8], after: Duration) {
        self.lock()
            .inbox
            .push_back((Instant::now() + after, frame.to_vec()));
    }

    pub fn fail_next_open(&self, err: ChannelError) {
        self.lock().open_errors.push_back(err);
    }

    pub fn fail_next_send(&self, err: ChannelError) {
        self.lock().send_errors.push_back(err);
    }

    pub fn fail_next_receive(&self, err: ChannelError) {
        self.lock().receive_errors.push_back(err);
    }

    /// Makes the next `send` panic, as a buggy driver would.
    pub fn panic_next_send(&self, message: &str) {
        self.lock().send_panic = Some(message.to_string());
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.lock().send_delay = delay;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Highest number of channel calls that were ever running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.lock().max_active
    }
}

/// Worker settings with short timings, suited to tests.
pub fn fast_settings(default_timeout: Duration) -> WorkerSettings {
    WorkerSettings {
        default_timeout,
        retry: RetryPolicy {
            retries: 2,
            backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10,
            ..RetryPolicy::default()
        },
        flush_stale_input: true,
        late_response_window: Duration::from_millis(100),
    }
}

/// Spawns an auxiliary over `channel` and starts it.
pub async fn started(name: &str, channel: ScriptedChannel, settings: WorkerSettings) -> Auxiliary {
    let aux = Auxiliary::spawn(name, Box::new(channel), settings, Journal::new())
        .expect("Failed to spawn auxiliary");
    aux.create_instance(Duration::from_secs(2))
        .await
        .expect("Failed to start auxiliary");
    aux
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Writes `content` as a configuration file inside `dir`.
pub fn write_config(dir: &TempDir, file_name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(file_name);
    fs::write(&path, content).expect("Failed to write config file");
    path
}
