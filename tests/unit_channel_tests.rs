//! # Channel And Connector Unit Tests / 通道与连接器单元测试
//!
//! Error classification of channel failures, the built-in connectors against
//! local sockets, and the channel factory.
//!
//! 通道故障的错误分类、针对本地套接字的内置连接器，以及通道工厂。

use aux_runner::core::config::ChannelConfig;
use aux_runner::core::error::AuxError;
use aux_runner::infra::channel::{Channel, ChannelError, ChannelErrorKind};
use aux_runner::infra::connectors::{ChannelFactory, LoopbackChannel, TcpChannel, UdpChannel};
use std::io::{self, Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(test)]
mod error_mapping_tests {
    use super::*;

    fn kind_of(kind: io::ErrorKind) -> ChannelErrorKind {
        ChannelError::from(io::Error::new(kind, "boom")).kind
    }

    #[test]
    fn test_io_error_classification() {
        assert_eq!(kind_of(io::ErrorKind::WouldBlock), ChannelErrorKind::Busy);
        assert_eq!(kind_of(io::ErrorKind::Interrupted), ChannelErrorKind::Interrupted);
        assert_eq!(kind_of(io::ErrorKind::ConnectionReset), ChannelErrorKind::Disconnected);
        assert_eq!(kind_of(io::ErrorKind::BrokenPipe), ChannelErrorKind::Disconnected);
        assert_eq!(kind_of(io::ErrorKind::UnexpectedEof), ChannelErrorKind::Disconnected);
        assert_eq!(kind_of(io::ErrorKind::PermissionDenied), ChannelErrorKind::Io);
    }

    #[test]
    fn test_error_display() {
        let err = ChannelError::busy("bus arbitration lost");
        assert_eq!(err.to_string(), "busy: bus arbitration lost");
        assert_eq!(ChannelError::other("x").kind, ChannelErrorKind::Other);
    }
}

#[cfg(test)]
mod loopback_tests {
    use super::*;

    #[test]
    fn test_echo() {
        let mut channel = LoopbackChannel::new();
        channel.open().unwrap();
        channel.send(b"PING").unwrap();

        assert_eq!(channel.receive(Duration::ZERO).unwrap(), Some(b"PING".to_vec()));
        assert_eq!(channel.receive(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_frames_keep_their_order() {
        let mut channel = LoopbackChannel::new();
        channel.open().unwrap();
        for frame in [b"A", b"B", b"C"] {
            channel.send(frame).unwrap();
        }

        let received: Vec<_> = (0..3)
            .map(|_| channel.receive(Duration::ZERO).unwrap().unwrap())
            .collect();
        assert_eq!(received, [b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);
    }

    #[test]
    fn test_latency_hides_frame_from_zero_poll() {
        let mut channel = LoopbackChannel::with_latency(Duration::from_millis(50));
        channel.open().unwrap();
        channel.send(b"X").unwrap();

        assert_eq!(channel.receive(Duration::ZERO).unwrap(), None);
        let started = Instant::now();
        assert_eq!(channel.receive(Duration::from_millis(500)).unwrap(), Some(b"X".to_vec()));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_receive_times_out() {
        let mut channel = LoopbackChannel::new();
        channel.open().unwrap();

        let started = Instant::now();
        assert_eq!(channel.receive(Duration::from_millis(30)).unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_closed_channel_is_disconnected() {
        let mut channel = LoopbackChannel::new();
        let err = channel.send(b"X").unwrap_err();
        assert_eq!(err.kind, ChannelErrorKind::Disconnected);

        channel.open().unwrap();
        channel.send(b"X").unwrap();
        channel.close().unwrap();
        channel.close().unwrap();
        assert_eq!(
            channel.receive(Duration::ZERO).unwrap_err().kind,
            ChannelErrorKind::Disconnected
        );
    }

    #[test]
    fn test_from_config() {
        let config = ChannelConfig::new("loopback").with_param("latency_ms", 20);
        let mut channel = LoopbackChannel::from_config(&config).unwrap();
        channel.open().unwrap();
        channel.send(b"X").unwrap();
        assert_eq!(channel.receive(Duration::ZERO).unwrap(), None);
    }
}

#[cfg(test)]
mod tcp_tests {
    use super::*;

    /// Accepts one connection and echoes everything it reads.
    fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buffer = [0u8; 256];
                while let Ok(read) = stream.read(&mut buffer) {
                    if read == 0 || stream.write_all(&buffer[..read]).is_err() {
                        break;
                    }
                }
            }
        });
        address
    }

    #[test]
    fn test_round_trip() {
        let mut channel = TcpChannel::new(echo_server());
        channel.open().unwrap();
        channel.send(b"PING").unwrap();

        assert_eq!(channel.receive(Duration::from_secs(2)).unwrap(), Some(b"PING".to_vec()));
        channel.close().unwrap();
    }

    #[test]
    fn test_silence_is_not_an_error() {
        let mut channel = TcpChannel::new(echo_server());
        channel.open().unwrap();

        assert_eq!(channel.receive(Duration::from_millis(50)).unwrap(), None);
        assert_eq!(channel.receive(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_peer_close_is_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || drop(listener.accept()));

        let mut channel = TcpChannel::new(address);
        channel.open().unwrap();
        server.join().unwrap();

        let err = channel.receive(Duration::from_secs(2)).unwrap_err();
        assert_eq!(err.kind, ChannelErrorKind::Disconnected);
    }

    #[test]
    fn test_send_before_open() {
        let mut channel = TcpChannel::new("127.0.0.1:9");
        assert_eq!(channel.send(b"X").unwrap_err().kind, ChannelErrorKind::Disconnected);
    }

    #[test]
    fn test_from_config_requires_address() {
        let err = TcpChannel::from_config(&ChannelConfig::new("tcp")).unwrap_err();
        assert!(err.message.contains("needs an 'address'"));

        let err = TcpChannel::from_config(
            &ChannelConfig::new("tcp")
                .with_param("address", "127.0.0.1:1")
                .with_param("max_frame", 0),
        )
        .unwrap_err();
        assert!(err.message.contains("max_frame"));
    }

    #[test]
    fn test_connect_timeout_from_config() {
        let config = ChannelConfig::new("tcp")
            .with_param("address", echo_server())
            .with_param("connect_timeout_ms", 500);
        let mut channel = TcpChannel::from_config(&config).unwrap();
        channel.open().unwrap();
        channel.send(b"hi").unwrap();
        assert_eq!(channel.receive(Duration::from_secs(2)).unwrap(), Some(b"hi".to_vec()));
    }
}

#[cfg(test)]
mod udp_tests {
    use super::*;

    #[test]
    fn test_datagram_round_trip() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_address = peer.local_addr().unwrap().to_string();

        let mut channel = UdpChannel::from_config(
            &ChannelConfig::new("udp")
                .with_param("address", peer_address)
                .with_param("bind", "127.0.0.1:0"),
        )
        .unwrap();
        channel.open().unwrap();
        channel.send(b"PING").unwrap();

        let mut buffer = [0u8; 64];
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let (read, from) = peer.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..read], b"PING");
        peer.send_to(b"PONG", from).unwrap();

        assert_eq!(channel.receive(Duration::from_secs(2)).unwrap(), Some(b"PONG".to_vec()));
        assert_eq!(channel.receive(Duration::from_millis(20)).unwrap(), None);
    }

    #[test]
    fn test_closed_socket_is_disconnected() {
        let mut channel = UdpChannel::new("127.0.0.1:9");
        assert_eq!(
            channel.receive(Duration::ZERO).unwrap_err().kind,
            ChannelErrorKind::Disconnected
        );
    }
}

#[cfg(test)]
mod factory_tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let factory = ChannelFactory::with_builtin();
        assert_eq!(factory.kinds().collect::<Vec<_>>(), ["loopback", "tcp", "udp"]);
        assert!(factory.supports("tcp"));
        assert!(!factory.supports("can"));
    }

    #[test]
    fn test_build_loopback() {
        let factory = ChannelFactory::with_builtin();
        let mut channel = factory.build(&ChannelConfig::new("loopback")).unwrap();
        channel.open().unwrap();
        channel.send(b"X").unwrap();
        assert_eq!(channel.receive(Duration::ZERO).unwrap(), Some(b"X".to_vec()));
    }

    #[test]
    fn test_unknown_kind() {
        let factory = ChannelFactory::with_builtin();
        let Err(err) = factory.build(&ChannelConfig::new("can")) else {
            panic!("Expected an unknown kind error");
        };
        assert_eq!(err, AuxError::UnknownChannelKind("can".to_string()));
    }

    #[test]
    fn test_builder_error_becomes_invalid_config() {
        let factory = ChannelFactory::with_builtin();
        let Err(err) = factory.build(&ChannelConfig::new("udp")) else {
            panic!("Expected a builder error");
        };
        assert!(matches!(err, AuxError::InvalidConfig(msg) if msg.contains("cannot build 'udp' channel")));
    }

    #[test]
    fn test_custom_builder() {
        let mut factory = ChannelFactory::new();
        factory.register("sim", |config| {
            let latency = config.u64_param("latency_ms").unwrap_or(0);
            Ok(Box::new(LoopbackChannel::with_latency(Duration::from_millis(latency))) as Box<dyn Channel>)
        });

        assert!(factory.supports("sim"));
        assert!(factory.build(&ChannelConfig::new("sim")).is_ok());
        assert!(factory.build(&ChannelConfig::new("loopback")).is_err());
    }
}
