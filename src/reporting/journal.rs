//! # Command Journal Module / 命令日志模块
//!
//! Structured per-command records for external reporters. Every command a
//! worker dequeues leaves exactly one record: status, timing, correlation id
//! and payloads. The core never formats these into a report itself beyond the
//! JSON export used by the CLI.
//!
//! 面向外部报告器的结构化逐命令记录。工作线程取出的每条命令都会留下恰好一条记录：
//! 状态、耗时、关联 ID 和负载。除 CLI 使用的 JSON 导出外，核心本身不会将其格式化为报告。
//!
//! ## Long-lived registries / 长期运行的注册表
//!
//! An unbounded journal keeps every record until the registry is dropped.
//! Processes that keep a registry for hours should either build it with
//! [`Journal::bounded`], which evicts the oldest records, or periodically
//! call [`Journal::take`] and ship what it returns.
//!
//! 无上限的日志会保留所有记录直到注册表被释放。长期持有注册表的进程应使用
//! [`Journal::bounded`]（淘汰最旧的记录），或定期调用 [`Journal::take`] 导出并清空。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::message::{Command, CommandKind, CorrelationId, Response, ResponseStatus};
use crate::infra::fs::write_file_atomically;

/// One executed command, as seen by the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub instance: String,
    pub correlation_id: CorrelationId,
    pub kind: CommandKind,
    pub status: ResponseStatus,
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", with = "duration_millis")]
    pub elapsed: Duration,
    pub attempts: u32,
    pub request: Vec<u8>,
    pub payload: Option<Vec<u8>>,
    pub error: Option<String>,
}

impl CommandRecord {
    pub fn new(instance: &str, command: &Command, response: &Response) -> Self {
        Self {
            instance: instance.to_string(),
            correlation_id: command.correlation_id,
            kind: command.kind,
            status: response.status,
            issued_at: command.issued_at,
            elapsed: response.elapsed,
            attempts: response.attempts,
            request: command.payload.clone(),
            payload: response.payload.clone(),
            error: response.error_detail.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    records: VecDeque<CommandRecord>,
    limit: Option<usize>,
    dropped: u64,
}

/// A shared list of command records, optionally capped.
///
/// Cloning a journal yields another handle to the same records.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Entries>>,
}

impl Journal {
    /// A journal that keeps every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal that keeps at most `limit` records, evicting the oldest.
    /// A limit of zero keeps nothing and only counts.
    ///
    /// 最多保留 `limit` 条记录的日志，超出时淘汰最旧的记录。
    pub fn bounded(limit: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                limit: Some(limit),
                ..Entries::default()
            })),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.lock().limit
    }

    pub fn record(&self, record: CommandRecord) {
        let mut entries = self.lock();
        entries.records.push_back(record);
        if let Some(limit) = entries.limit {
            while entries.records.len() > limit {
                entries.records.pop_front();
                entries.dropped += 1;
            }
        }
    }

    /// Records evicted by the cap since the journal was created.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// A copy of every retained record, in the order they were produced.
    pub fn snapshot(&self) -> Vec<CommandRecord> {
        self.lock().records.iter().cloned().collect()
    }

    /// Removes and returns every retained record. The eviction count is kept.
    pub fn take(&self) -> Vec<CommandRecord> {
        self.lock().records.drain(..).collect()
    }

    /// Records produced by one instance.
    pub fn for_instance(&self, instance: &str) -> Vec<CommandRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.instance == instance)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.snapshot()).context("Failed to serialize the command journal")
    }

    /// Writes the journal as pretty JSON to `path`.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        write_file_atomically(path, json.as_bytes())
            .with_context(|| format!("Failed to write command journal to {}", path.display()))
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panicking reporter must not take the journal down with it.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_micros() as f64 / 1_000.0)
    }
}
