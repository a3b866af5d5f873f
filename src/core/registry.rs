//! # Auxiliary Registry Module / 辅助注册表模块
//!
//! The registry owns every auxiliary instance of a run, keyed by its
//! configured name. It is an explicit object handed to whoever needs to look
//! instances up; there is no process-wide lookup table.
//!
//! 注册表拥有一次运行中的所有辅助实例，以其配置名称为键。
//! 它是一个显式对象，传递给需要查找实例的代码；不存在进程级的全局查找表。

use futures::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::config::AuxiliaryConfig;
use crate::core::error::{AuxError, AuxResult};
use crate::core::deadline;
use crate::core::facade::{Auxiliary, RESPONSE_GRACE};
use crate::infra::connectors::ChannelFactory;
use crate::reporting::journal::Journal;

/// Upper bound on waiting for a worker thread to exit after it was stopped.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Entry {
    auxiliary: Auxiliary,
    config: AuxiliaryConfig,
}

/// Named auxiliary instances plus the factory used to build their channels.
/// 命名的辅助实例，以及用于构建其通道的工厂。
pub struct AuxiliaryRegistry {
    factory: ChannelFactory,
    journal: Journal,
    instances: RwLock<HashMap<String, Entry>>,
}

impl AuxiliaryRegistry {
    pub fn new(factory: ChannelFactory) -> Self {
        Self::with_journal(factory, Journal::new())
    }

    /// A registry whose instances all record into `journal`.
    pub fn with_journal(factory: ChannelFactory, journal: Journal) -> Self {
        Self {
            factory,
            journal,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn factory(&self) -> &ChannelFactory {
        &self.factory
    }

    /// Builds the channel, spawns the worker and registers the instance.
    ///
    /// With `auto_start` the channel is opened before returning; a failed
    /// start leaves the instance registered in `FAILED` so its status stays
    /// observable, and the start error is returned.
    ///
    /// 构建通道、启动工作线程并注册实例。
    /// 若启用 `auto_start`，返回前会打开通道；启动失败时实例以 `FAILED`
    /// 状态保留在注册表中以便观察其状态，并返回启动错误。
    pub async fn create_instance(&self, config: AuxiliaryConfig) -> AuxResult<Auxiliary> {
        config.validate()?;

        let auxiliary = {
            let mut instances = self.instances.write().await;
            if instances.contains_key(&config.name) {
                return Err(AuxError::DuplicateInstance(config.name.clone()));
            }
            let channel = self.factory.build(&config.channel)?;
            let auxiliary = Auxiliary::spawn(
                config.name.clone(),
                channel,
                config.settings(),
                self.journal.clone(),
            )?;
            instances.insert(
                config.name.clone(),
                Entry {
                    auxiliary: auxiliary.clone(),
                    config: config.clone(),
                },
            );
            auxiliary
        };
        info!(instance = %config.name, kind = %config.channel.kind, "auxiliary created");

        if config.auto_start {
            auxiliary
                .create_instance(deadline::with_grace(auxiliary.default_timeout(), RESPONSE_GRACE))
                .await?;
        }
        Ok(auxiliary)
    }

    /// Stops the instance unless it already ended, joins its worker and
    /// removes it from the registry.
    pub async fn delete_instance(&self, name: &str) -> AuxResult<()> {
        let entry = self
            .instances
            .write()
            .await
            .remove(name)
            .ok_or_else(|| AuxError::UnknownInstance(name.to_string()))?;
        teardown(entry.auxiliary).await;
        Ok(())
    }

    /// Tears the instance down and builds it again from its stored configuration.
    pub async fn recreate_instance(&self, name: &str) -> AuxResult<Auxiliary> {
        let config = self
            .instances
            .read()
            .await
            .get(name)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| AuxError::UnknownInstance(name.to_string()))?;
        self.delete_instance(name).await?;
        debug!(instance = %name, "recreating auxiliary");
        self.create_instance(config).await
    }

    /// Returns the façade of instance `name`.
    pub async fn get(&self, name: &str) -> AuxResult<Auxiliary> {
        self.instances
            .read()
            .await
            .get(name)
            .map(|entry| entry.auxiliary.clone())
            .ok_or_else(|| AuxError::UnknownInstance(name.to_string()))
    }

    /// Registered instance names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Tears down every instance concurrently and empties the registry.
    pub async fn shutdown(&self) {
        let entries: Vec<Entry> = self
            .instances
            .write()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        if entries.is_empty() {
            return;
        }
        info!(count = entries.len(), "shutting down auxiliaries");
        join_all(entries.into_iter().map(|entry| teardown(entry.auxiliary))).await;
    }
}

impl std::fmt::Debug for AuxiliaryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxiliaryRegistry")
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

async fn teardown(auxiliary: Auxiliary) {
    if !auxiliary.state().is_terminal() {
        let timeout = deadline::with_grace(auxiliary.default_timeout(), RESPONSE_GRACE);
        if let Err(e) = auxiliary.delete_instance(timeout).await {
            warn!(instance = %auxiliary.name(), "stop during teardown failed: {e}");
        }
    }
    if tokio::time::timeout(JOIN_TIMEOUT, auxiliary.join()).await.is_err() {
        warn!(instance = %auxiliary.name(), "worker thread did not exit in time");
    }
    info!(instance = %auxiliary.name(), state = %auxiliary.state(), "auxiliary deleted");
}
