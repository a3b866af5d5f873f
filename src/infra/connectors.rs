//! # Connectors Module / 连接器模块
//!
//! The channel factory and the built-in connectors. A configuration names a
//! channel `kind`; the factory looks up the builder registered for that kind
//! and hands it the rest of the channel table.
//!
//! 通道工厂与内置连接器。配置中指定通道 `kind`；
//! 工厂查找为该类型注册的构建器，并将通道表的其余部分交给它。

pub mod loopback;
pub mod tcp;
pub mod udp;

use std::collections::BTreeMap;

use crate::core::config::ChannelConfig;
use crate::core::error::{AuxError, AuxResult};
use crate::infra::channel::{Channel, ChannelError};

pub use loopback::LoopbackChannel;
pub use tcp::TcpChannel;
pub use udp::UdpChannel;

/// Builds a channel from its configuration.
pub type ChannelBuilder =
    Box<dyn Fn(&ChannelConfig) -> Result<Box<dyn Channel>, ChannelError> + Send + Sync>;

/// Registry of channel builders keyed by configuration `kind`.
/// 以配置 `kind` 为键的通道构建器注册表。
#[derive(Default)]
pub struct ChannelFactory {
    builders: BTreeMap<String, ChannelBuilder>,
}

impl ChannelFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory with `loopback`, `tcp` and `udp` registered.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register("loopback", |config| {
            Ok(Box::new(LoopbackChannel::from_config(config)?) as Box<dyn Channel>)
        });
        factory.register("tcp", |config| {
            Ok(Box::new(TcpChannel::from_config(config)?) as Box<dyn Channel>)
        });
        factory.register("udp", |config| {
            Ok(Box::new(UdpChannel::from_config(config)?) as Box<dyn Channel>)
        });
        factory
    }

    /// Registers (or replaces) the builder for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, builder: F)
    where
        F: Fn(&ChannelConfig) -> Result<Box<dyn Channel>, ChannelError> + Send + Sync + 'static,
    {
        self.builders.insert(kind.into(), Box::new(builder));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    pub fn build(&self, config: &ChannelConfig) -> AuxResult<Box<dyn Channel>> {
        let builder = self
            .builders
            .get(&config.kind)
            .ok_or_else(|| AuxError::UnknownChannelKind(config.kind.clone()))?;
        builder(config).map_err(|e| {
            AuxError::InvalidConfig(format!("cannot build '{}' channel: {}", config.kind, e.message))
        })
    }
}

impl std::fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("kinds", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads the required `address` parameter of a socket connector.
pub(crate) fn required_address(config: &ChannelConfig) -> Result<String, ChannelError> {
    config
        .str_param("address")
        .map(str::to_string)
        .ok_or_else(|| ChannelError::other(format!("'{}' channel needs an 'address'", config.kind)))
}
