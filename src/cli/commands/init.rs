//! # Init Command Module / 初始化命令模块
//!
//! This module implements the `init` command, which creates a new
//! `Auxiliaries.toml` either from a commented template or through an
//! interactive wizard.
//!
//! 此模块实现 `init` 命令，通过带注释的模板或交互式向导
//! 创建新的 `Auxiliaries.toml`。
//!
//! ## Features / 功能特性
//!
//! - **Interactive Wizard**: asks for the auxiliaries and their channels
//! - **Sample Case**: optionally adds a ping case per auxiliary
//! - **Overwrite Protection**: an existing file is kept unless confirmed or `--force`
//!
//! - **交互式向导**: 询问辅助设备及其通道
//! - **示例用例**: 可选地为每个辅助设备添加 ping 用例
//! - **覆盖保护**: 除非确认或使用 `--force`，否则保留现有文件

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::path::Path;

use crate::core::config::{
    AuxiliaryConfig, ChannelConfig, DEFAULT_TIMEOUT_MS, FrameworkConfig, StepAction, TestCase,
    TestStep,
};
use crate::infra::{fs, t};

pub const DEFAULT_CONFIG: &str = r#"# Auxiliary Configuration / 辅助设备配置

# Language for runner messages / 运行器消息的语言
language = "en"

# Keep at most this many journal records / 最多保留的命令日志记录数
# journal_limit = 10000

# Values applied to every auxiliary that leaves them unset
# 应用于所有未设置这些值的辅助设备
[defaults]
timeout_ms = 2000          # device deadline / 设备截止时间
flush_stale_input = true   # drop late frames before a query / 查询前丢弃迟到的帧
late_response_window_ms = 100  # after a query timeout, late answers are dropped / 查询超时后丢弃迟到应答

[defaults.retry]
retries = 2
backoff_ms = 50
backoff_multiplier = 2.0
max_backoff_ms = 1000
transient = ["busy", "interrupted"]

# Auxiliaries / 辅助设备
[[auxiliaries]]
name = "dev1"
auto_start = true

[auxiliaries.channel]
kind = "loopback"          # loopback | tcp | udp
latency_ms = 5
# address = "127.0.0.1:5020"   # tcp and udp / tcp 和 udp

# Test Cases / 测试用例
[[cases]]
name = "ping"
tags = ["smoke"]
test_ids = ["REQ-1"]
retries = 1
timeout_secs = 30

[[cases.steps]]
auxiliary = "dev1"
action = "query"           # start|stop|suspend|resume|abort|send|query|report|recreate
payload = "PING"
expect = "PING"

[[cases.steps]]
auxiliary = "dev1"
action = "report"
expect_status = "timeout"  # nothing unsolicited is expected / 不期望有主动上报
timeout_ms = 100
"#;

const CHANNEL_KINDS: [&str; 3] = ["loopback", "tcp", "udp"];

/// Creates the configuration file at `output`.
///
/// # Arguments
/// * `output` - Path for the new configuration file
/// * `language` - Language of the prompts and of the generated file
/// * `non_interactive` - Write the template without asking anything
/// * `force` - Overwrite an existing file without confirmation
pub fn run_init(output: &Path, language: &str, non_interactive: bool, force: bool) -> Result<()> {
    let theme = ColorfulTheme::default();

    if !non_interactive {
        println!("\n{}", t!("init.wizard_welcome", locale = language).cyan().bold());
        println!("{}", t!("init.wizard_description", locale = language));
    }

    if output.exists() && !force {
        if non_interactive {
            println!(
                "{}",
                t!("init.file_exists", locale = language, path = output.display()).red()
            );
            println!("{}", t!("init.use_force", locale = language).yellow());
            return Ok(());
        }
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = language, path = output.display()))
            .default(false)
            .interact()
            .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let contents = if non_interactive {
        DEFAULT_CONFIG.to_string()
    } else {
        let config = run_wizard(&theme, language)?;
        toml::to_string_pretty(&config).context("Failed to serialize the configuration")?
    };

    write_config(output, &contents, language)
}

fn run_wizard(theme: &ColorfulTheme, language: &str) -> Result<FrameworkConfig> {
    let mut auxiliaries: Vec<AuxiliaryConfig> = Vec::new();

    loop {
        let name: String = Input::with_theme(theme)
            .with_prompt(t!("init.auxiliary_name_prompt", locale = language))
            .default(format!("dev{}", auxiliaries.len() + 1))
            .validate_with(|input: &String| -> Result<(), String> {
                if input.trim().is_empty() {
                    Err(t!("init.name_empty", locale = language).to_string())
                } else if auxiliaries.iter().any(|aux| &aux.name == input) {
                    Err(t!("init.name_taken", locale = language).to_string())
                } else {
                    Ok(())
                }
            })
            .interact_text()?;

        let kind = Select::with_theme(theme)
            .with_prompt(t!("init.channel_kind_prompt", locale = language))
            .items(&CHANNEL_KINDS)
            .default(0)
            .interact()?;
        let mut channel = ChannelConfig::new(CHANNEL_KINDS[kind]);
        if channel.kind != "loopback" {
            let address: String = Input::with_theme(theme)
                .with_prompt(t!("init.address_prompt", locale = language))
                .default("127.0.0.1:5020".to_string())
                .interact_text()?;
            channel = channel.with_param("address", address);
        }

        let timeout_ms: u64 = Input::with_theme(theme)
            .with_prompt(t!("init.timeout_prompt", locale = language))
            .default(DEFAULT_TIMEOUT_MS)
            .validate_with(|input: &u64| -> Result<(), String> {
                if *input == 0 {
                    Err(t!("init.timeout_zero", locale = language).to_string())
                } else {
                    Ok(())
                }
            })
            .interact_text()?;

        auxiliaries.push(AuxiliaryConfig::new(name, channel).with_timeout_ms(timeout_ms));

        let more = Confirm::with_theme(theme)
            .with_prompt(t!("init.add_another_prompt", locale = language))
            .default(false)
            .interact()?;
        if !more {
            break;
        }
    }

    let with_samples = Confirm::with_theme(theme)
        .with_prompt(t!("init.sample_cases_prompt", locale = language))
        .default(true)
        .interact()?;
    let cases = if with_samples {
        auxiliaries.iter().map(|aux| ping_case(&aux.name)).collect()
    } else {
        println!("{}", t!("init.no_cases_selected", locale = language).yellow());
        Vec::new()
    };

    Ok(FrameworkConfig {
        language: language.to_string(),
        defaults: Default::default(),
        journal_limit: None,
        auxiliaries,
        cases,
    })
}

/// A query that expects the payload echoed back.
fn ping_case(auxiliary: &str) -> TestCase {
    let mut step = TestStep::new(auxiliary, StepAction::Query);
    step.payload = Some("PING".to_string());
    step.expect = Some("PING".to_string());
    TestCase {
        name: format!("{auxiliary}-ping"),
        tags: vec!["smoke".to_string()],
        timeout_secs: Some(30),
        steps: vec![step],
        ..TestCase::default()
    }
}

fn write_config(path: &Path, contents: &str, language: &str) -> Result<()> {
    fs::ensure_parent_dir(path)
        .with_context(|| t!("init.create_parent_dir_failed", locale = language, path = path.display()))?;
    fs::write_file_atomically(path, contents.as_bytes())
        .with_context(|| t!("init.write_failed", locale = language, path = path.display()))?;

    println!(
        "{}",
        t!("init.success", locale = language, path = path.display()).green()
    );
    println!("{}", t!("init.next_steps", locale = language));
    Ok(())
}
