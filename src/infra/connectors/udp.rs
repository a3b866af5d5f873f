//! UDP connector: one datagram per frame, exchanged with a single remote peer.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;

use crate::core::config::ChannelConfig;
use crate::infra::channel::{Channel, ChannelError};
use crate::infra::connectors::required_address;

const DEFAULT_BIND: &str = "0.0.0.0:0";
const DEFAULT_MAX_DATAGRAM: usize = 65_507;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct UdpChannel {
    remote: String,
    bind: String,
    max_frame: usize,
    socket: Option<UdpSocket>,
}

impl UdpChannel {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            bind: DEFAULT_BIND.to_string(),
            max_frame: DEFAULT_MAX_DATAGRAM,
            socket: None,
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let mut channel = Self::new(required_address(config)?);
        if let Some(bind) = config.str_param("bind") {
            channel.bind = bind.to_string();
        }
        if let Some(max_frame) = config.u64_param("max_frame") {
            channel.max_frame = usize::try_from(max_frame)
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| ChannelError::other("'max_frame' must be a positive size"))?;
        }
        Ok(channel)
    }

    fn socket(&self) -> Result<&UdpSocket, ChannelError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ChannelError::disconnected(format!("socket to {} is not open", self.remote)))
    }
}

impl Channel for UdpChannel {
    fn open(&mut self) -> Result<(), ChannelError> {
        let socket = UdpSocket::bind(&self.bind)?;
        socket.connect(&self.remote)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.socket = None;
        Ok(())
    }

    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        let sent = self.socket()?.send(message)?;
        if sent != message.len() {
            return Err(ChannelError::io(format!(
                "datagram truncated: {sent} of {} bytes sent",
                message.len()
            )));
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        let mut buffer = vec![0u8; self.max_frame];
        let socket = self.socket()?;
        socket.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match socket.recv(&mut buffer) {
            Ok(read) => {
                buffer.truncate(read);
                Ok(Some(buffer))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
