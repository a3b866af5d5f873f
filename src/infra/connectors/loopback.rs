//! Loopback connector: every sent frame comes back on a later receive, after
//! an optional latency. Useful for dry runs of a configuration and for
//! exercising the core without hardware.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::ChannelConfig;
use crate::core::deadline;
use crate::infra::channel::{Channel, ChannelError};

#[derive(Debug, Default)]
pub struct LoopbackChannel {
    open: bool,
    /// Echoed frames with the instant they become readable.
    pending: VecDeque<(Instant, Vec<u8>)>,
    latency: Duration,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every echoed frame readable only `latency` after it was sent.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let latency = config.u64_param("latency_ms").unwrap_or(0);
        Ok(Self::with_latency(Duration::from_millis(latency)))
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.open {
            Ok(())
        } else {
            Err(ChannelError::disconnected("loopback channel is closed"))
        }
    }
}

impl Channel for LoopbackChannel {
    fn open(&mut self) -> Result<(), ChannelError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.open = false;
        self.pending.clear();
        Ok(())
    }

    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.pending
            .push_back((deadline::after(Instant::now(), self.latency), message.to_vec()));
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        self.ensure_open()?;
        let now = Instant::now();
        let deadline = deadline::after(now, timeout);
        match self.pending.front() {
            Some((ready_at, _)) if *ready_at <= deadline => {
                thread::sleep(ready_at.saturating_duration_since(now));
                Ok(self.pending.pop_front().map(|(_, frame)| frame))
            }
            _ => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
