//! # Configuration Module / 配置模块
//!
//! Parsing and validation of the TOML configuration: global defaults, the
//! auxiliaries to instantiate, and the declarative test cases that drive them.
//!
//! TOML 配置的解析与校验：全局默认值、要实例化的辅助设备，
//! 以及驱动它们的声明式测试用例。

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{AuxError, AuxResult};
use crate::core::message::ResponseStatus;
use crate::core::policy::RetryPolicy;
use crate::core::worker::{DEFAULT_LATE_RESPONSE_WINDOW, WorkerSettings};
use crate::reporting::journal::Journal;

/// Device deadline used when neither the auxiliary nor `[defaults]` set one.
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Selects and parameterises a channel implementation.
///
/// `kind` picks the builder in the channel factory; every other key of the
/// table is handed to that builder untouched.
///
/// 选择并参数化通道实现。
/// `kind` 用于在通道工厂中选择构建器；表中的其他所有键原样传给该构建器。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub kind: String,
    #[serde(flatten)]
    pub params: toml::Table,
}

impl ChannelConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: toml::Table::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(toml::Value::as_str)
    }

    pub fn u64_param(&self, key: &str) -> Option<u64> {
        self.params
            .get(key)
            .and_then(toml::Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
    }
}

/// Configuration of a single auxiliary instance.
/// 单个辅助实例的配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryConfig {
    /// Unique instance name, used by test steps to address it.
    /// 唯一的实例名称，测试步骤通过它来寻址。
    pub name: String,
    /// The channel this instance owns.
    /// 此实例拥有的通道。
    pub channel: ChannelConfig,
    /// Open the channel right after creation.
    /// 创建后立即打开通道。
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Default device deadline in milliseconds.
    /// 默认设备截止时间（毫秒）。
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub flush_stale_input: Option<bool>,
    /// How long after a query timeout device data is treated as a late
    /// answer and dropped. `0` disables it.
    /// 查询超时后，设备数据在多长时间内被视为迟到应答并被丢弃。`0` 表示禁用。
    #[serde(default)]
    pub late_response_window_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl AuxiliaryConfig {
    pub fn new(name: impl Into<String>, channel: ChannelConfig) -> Self {
        Self {
            name: name.into(),
            channel,
            auto_start: true,
            timeout_ms: None,
            retry: None,
            flush_stale_input: None,
            late_response_window_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Resolves the worker settings, falling back to built-in defaults.
    pub fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            default_timeout: Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            retry: self.retry.clone().unwrap_or_default(),
            flush_stale_input: self.flush_stale_input.unwrap_or(true),
            late_response_window: self
                .late_response_window_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LATE_RESPONSE_WINDOW),
        }
    }

    pub fn validate(&self) -> AuxResult<()> {
        if self.name.trim().is_empty() {
            return Err(AuxError::InvalidConfig("auxiliary name must not be empty".into()));
        }
        if self.channel.kind.trim().is_empty() {
            return Err(AuxError::InvalidConfig(format!(
                "auxiliary '{}' has an empty channel kind",
                self.name
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(AuxError::InvalidConfig(format!(
                "auxiliary '{}' has a zero timeout",
                self.name
            )));
        }
        Ok(())
    }
}

/// Values applied to every auxiliary that leaves them unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetryPolicy>,
    pub flush_stale_input: Option<bool>,
    pub late_response_window_ms: Option<u64>,
}

/// What a test step does with its auxiliary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Start,
    Stop,
    Suspend,
    Resume,
    Abort,
    Send,
    Query,
    /// Wait for an unsolicited report.
    Report,
    /// Tear the instance down and build it again from its configuration.
    Recreate,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::Start => "start",
            StepAction::Stop => "stop",
            StepAction::Suspend => "suspend",
            StepAction::Resume => "resume",
            StepAction::Abort => "abort",
            StepAction::Send => "send",
            StepAction::Query => "query",
            StepAction::Report => "report",
            StepAction::Recreate => "recreate",
        }
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step of a test case.
/// 测试用例中的单个步骤。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    /// Name of the auxiliary this step addresses.
    /// 此步骤所针对的辅助设备名称。
    pub auxiliary: String,
    pub action: StepAction,
    /// Payload as UTF-8 text.
    /// 以 UTF-8 文本表示的负载。
    #[serde(default)]
    pub payload: Option<String>,
    /// Payload as raw bytes.
    /// 以原始字节表示的负载。
    #[serde(default)]
    pub payload_bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(default)]
    pub expect_bytes: Option<Vec<u8>>,
    /// Expected response status, `ok` when omitted.
    /// 期望的响应状态，省略时为 `ok`。
    #[serde(default)]
    pub expect_status: Option<ResponseStatus>,
    /// Step deadline in milliseconds; the auxiliary default when omitted.
    /// 步骤截止时间（毫秒）；省略时使用辅助设备的默认值。
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TestStep {
    pub fn new(auxiliary: impl Into<String>, action: StepAction) -> Self {
        Self {
            auxiliary: auxiliary.into(),
            action,
            payload: None,
            payload_bytes: None,
            expect: None,
            expect_bytes: None,
            expect_status: None,
            timeout_ms: None,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match (&self.payload, &self.payload_bytes) {
            (Some(text), _) => text.as_bytes().to_vec(),
            (None, Some(bytes)) => bytes.clone(),
            (None, None) => Vec::new(),
        }
    }

    pub fn expected_payload(&self) -> Option<Vec<u8>> {
        match (&self.expect, &self.expect_bytes) {
            (Some(text), _) => Some(text.as_bytes().to_vec()),
            (None, Some(bytes)) => Some(bytes.clone()),
            (None, None) => None,
        }
    }

    pub fn expected_status(&self) -> ResponseStatus {
        self.expect_status.unwrap_or(ResponseStatus::Ok)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// A declarative test case: metadata attached at registration time plus the
/// ordered steps to execute.
///
/// 声明式测试用例：在注册时附加的元数据以及要执行的有序步骤。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// The unique name for the test case, used for identification in logs.
    /// 测试用例的唯一名称，用于在日志中进行识别。
    pub name: String,
    /// Free-form labels used to select cases from the command line.
    /// 用于从命令行选择用例的自由标签。
    #[serde(default)]
    pub tags: Vec<String>,
    /// Requirement or issue tracker keys this case verifies.
    /// 此用例验证的需求或问题跟踪键。
    #[serde(default)]
    pub test_ids: Vec<String>,
    /// The number of times to retry a failed case. Timeouts are not retried.
    /// 失败用例的重试次数。超时不会重试。
    #[serde(default)]
    pub retries: Option<u8>,
    /// An optional overall timeout in seconds.
    /// 可选的整体超时时间（秒）。
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// If `true`, a failure of this case does not fail the whole run.
    /// 如果为 `true`，此用例失败不会导致整个运行失败。
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

impl Default for TestCase {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            tags: vec![],
            test_ids: vec![],
            retries: None,
            timeout_secs: None,
            allow_failure: false,
            steps: vec![],
        }
    }
}

/// The whole configuration file.
/// 整个配置文件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub defaults: Defaults,
    /// Keep at most this many journal records; unset keeps all.
    /// 最多保留的日志记录数；未设置时全部保留。
    #[serde(default)]
    pub journal_limit: Option<usize>,
    #[serde(default)]
    pub auxiliaries: Vec<AuxiliaryConfig>,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

fn default_language() -> String {
    "en".to_string()
}

impl FrameworkConfig {
    /// Parses, applies `[defaults]` and validates a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: FrameworkConfig =
            toml::from_str(content).context("Failed to parse configuration")?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// The journal every auxiliary of this configuration records into.
    pub fn journal(&self) -> Journal {
        self.journal_limit.map_or_else(Journal::new, Journal::bounded)
    }

    /// Fills every unset auxiliary field from `[defaults]`.
    pub fn apply_defaults(&mut self) {
        let defaults = &self.defaults;
        for aux in &mut self.auxiliaries {
            if aux.timeout_ms.is_none() {
                aux.timeout_ms = defaults.timeout_ms;
            }
            if aux.retry.is_none() {
                aux.retry = defaults.retry.clone();
            }
            if aux.flush_stale_input.is_none() {
                aux.flush_stale_input = defaults.flush_stale_input;
            }
            if aux.late_response_window_ms.is_none() {
                aux.late_response_window_ms = defaults.late_response_window_ms;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for aux in &self.auxiliaries {
            aux.validate()?;
            if !names.insert(aux.name.as_str()) {
                bail!("Duplicate auxiliary name '{}'", aux.name);
            }
        }

        let mut case_names = HashSet::new();
        for case in &self.cases {
            if !case_names.insert(case.name.as_str()) {
                bail!("Duplicate test case name '{}'", case.name);
            }
            for (index, step) in case.steps.iter().enumerate() {
                let position = index + 1;
                if !names.contains(step.auxiliary.as_str()) {
                    bail!(
                        "Step {position} of case '{}' references unknown auxiliary '{}'",
                        case.name,
                        step.auxiliary
                    );
                }
                if step.payload.is_some() && step.payload_bytes.is_some() {
                    bail!(
                        "Step {position} of case '{}' sets both 'payload' and 'payload_bytes'",
                        case.name
                    );
                }
                if step.expect.is_some() && step.expect_bytes.is_some() {
                    bail!(
                        "Step {position} of case '{}' sets both 'expect' and 'expect_bytes'",
                        case.name
                    );
                }
                if step.timeout_ms == Some(0) {
                    bail!("Step {position} of case '{}' has a zero timeout", case.name);
                }
            }
        }
        Ok(())
    }

    pub fn auxiliary(&self, name: &str) -> Option<&AuxiliaryConfig> {
        self.auxiliaries.iter().find(|aux| aux.name == name)
    }
}

/// Reads and validates the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<FrameworkConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    FrameworkConfig::from_toml_str(&content)
        .with_context(|| format!("Invalid configuration file: {}", path.display()))
}
