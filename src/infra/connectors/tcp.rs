//! TCP connector: raw frames over a client socket.
//!
//! Each `receive` returns whatever one `read` delivers, up to `max_frame`
//! bytes; framing above that is the device protocol's business.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::core::config::ChannelConfig;
use crate::infra::channel::{Channel, ChannelError};
use crate::infra::connectors::required_address;

pub const DEFAULT_MAX_FRAME: usize = 4096;

/// Smallest read timeout handed to the socket; a zero timeout is rejected by the OS API.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct TcpChannel {
    address: String,
    max_frame: usize,
    connect_timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl TcpChannel {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            max_frame: DEFAULT_MAX_FRAME,
            connect_timeout: None,
            stream: None,
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let mut channel = Self::new(required_address(config)?);
        if let Some(max_frame) = config.u64_param("max_frame") {
            channel.max_frame = usize::try_from(max_frame)
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| ChannelError::other("'max_frame' must be a positive size"))?;
        }
        channel.connect_timeout = config.u64_param("connect_timeout_ms").map(Duration::from_millis);
        Ok(channel)
    }

    fn stream(&mut self) -> Result<&mut TcpStream, ChannelError> {
        self.stream
            .as_mut()
            .ok_or_else(|| ChannelError::disconnected(format!("not connected to {}", self.address)))
    }
}

impl Channel for TcpChannel {
    fn open(&mut self) -> Result<(), ChannelError> {
        let stream = match self.connect_timeout {
            Some(timeout) => {
                let addr = self
                    .address
                    .parse()
                    .map_err(|e| ChannelError::other(format!("invalid address '{}': {e}", self.address)))?;
                TcpStream::connect_timeout(&addr, timeout)?
            }
            None => TcpStream::connect(&self.address)?,
        };
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        let stream = self.stream()?;
        stream.write_all(message)?;
        stream.flush()?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        let max_frame = self.max_frame;
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        let mut buffer = vec![0u8; max_frame];
        match stream.read(&mut buffer) {
            Ok(0) => Err(ChannelError::disconnected("peer closed the connection")),
            Ok(read) => {
                buffer.truncate(read);
                Ok(Some(buffer))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
