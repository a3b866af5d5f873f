//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it loads the configuration,
//! brings up every auxiliary, executes the selected test cases one after the
//! other and tears the auxiliaries down again.
//!
//! 此模块实现 `run` 命令：加载配置，启动所有辅助设备，
//! 依次执行选中的测试用例，然后再次关闭这些辅助设备。

use anyhow::{Context, Result};
use colored::*;
use std::{fs, path::PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    core::{
        config::{self, FrameworkConfig, TestCase},
        execution::run_test_case,
        models::{FailureReason, TestResult},
        planner,
        registry::AuxiliaryRegistry,
    },
    infra::{connectors::ChannelFactory, t},
    reporting::console::{print_summary, print_unexpected_failure_details},
};

/// Options of the `run` subcommand.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Path to the configuration file / 配置文件路径
    pub config: PathBuf,
    /// Only run cases carrying one of these tags / 仅运行带有这些标签之一的用例
    pub tags: Vec<String>,
    /// Only run cases with these names / 仅运行这些名称的用例
    pub cases: Vec<String>,
    /// Where to write the command journal / 命令日志的写入位置
    pub journal: Option<PathBuf>,
    /// Skip the remaining cases after the first unexpected failure / 首次意外失败后跳过剩余用例
    pub fail_fast: bool,
}

/// Executes the run command with the provided options.
///
/// `explicit_lang` is the `--lang` value; without it the configuration's
/// `language` is used.
///
/// # Returns
/// An error when the configuration is unusable, the run was cancelled or a
/// case failed unexpectedly.
pub async fn execute(options: RunOptions, explicit_lang: Option<&str>) -> Result<()> {
    let (framework, config_path) = setup_and_parse_config(&options.config)?;
    let locale = crate::resolve_locale(explicit_lang.unwrap_or(&framework.language));
    rust_i18n::set_locale(&locale);

    println!(
        "{}",
        t!("run.loading_config", locale = locale, path = config_path.display())
    );

    let stop_token = setup_signal_handler(&locale);

    let plan = planner::plan_execution(framework.cases.clone(), &options.tags, &options.cases)?;
    if plan.filtered_count > 0 {
        println!(
            "{}",
            t!(
                "run.filtered_cases",
                locale = locale,
                filtered = plan.filtered_count,
                total = plan.cases_to_run.len()
            )
            .cyan()
        );
    }
    if plan.allowed_failure_count > 0 {
        println!(
            "{}",
            t!("run.allowed_failure_cases", locale = locale, count = plan.allowed_failure_count).yellow()
        );
    }

    let registry = AuxiliaryRegistry::with_journal(ChannelFactory::with_builtin(), framework.journal());
    start_auxiliaries(&registry, &framework, &locale).await;

    let results = if plan.cases_to_run.is_empty() {
        println!("{}", t!("run.no_cases_to_run", locale = locale).green());
        Vec::new()
    } else {
        run_tests(plan.cases_to_run, &registry, &stop_token, options.fail_fast).await
    };

    registry.shutdown().await;

    if let Some(journal_path) = &options.journal {
        registry
            .journal()
            .export_json(journal_path)
            .with_context(|| t!("run.journal_write_failed", locale = locale, path = journal_path.display()))?;
        println!(
            "{}",
            t!(
                "run.journal_written",
                locale = locale,
                count = registry.journal().len(),
                path = journal_path.display()
            )
        );
    }

    if results.is_empty() {
        return Ok(());
    }

    print_summary(&results, &locale);

    let unexpected_failures: Vec<&TestResult> =
        results.iter().filter(|r| r.is_unexpected_failure()).collect();
    if !unexpected_failures.is_empty() {
        print_unexpected_failure_details(&unexpected_failures, &locale);
        anyhow::bail!(t!("run.failed_unexpectedly", locale = locale, count = unexpected_failures.len()));
    }
    if stop_token.is_cancelled() {
        anyhow::bail!(t!("run.cancelled", locale = locale));
    }

    println!("\n{}", t!("run.all_tests_passed", locale = locale).green().bold());
    Ok(())
}

/// Sets up and parses the configuration file.
fn setup_and_parse_config(config_path_arg: &PathBuf) -> Result<(FrameworkConfig, PathBuf)> {
    // Configuration errors are reported before the run locale is known.
    let locale = "en";
    let config_path = fs::canonicalize(config_path_arg)
        .with_context(|| t!("run.config_read_failed", locale = locale, path = config_path_arg.display()))?;

    let framework = config::load_config(&config_path)
        .with_context(|| t!("run.config_parse_failed", locale = locale))?;

    Ok((framework, config_path))
}

/// Creates every configured auxiliary. A failing auxiliary is reported and
/// left out (or left `FAILED`); the steps addressing it fail on their own.
async fn start_auxiliaries(registry: &AuxiliaryRegistry, framework: &FrameworkConfig, locale: &str) {
    for aux in &framework.auxiliaries {
        match registry.create_instance(aux.clone()).await {
            Ok(auxiliary) => println!(
                "{}",
                t!(
                    "run.auxiliary_ready",
                    locale = locale,
                    name = aux.name,
                    kind = aux.channel.kind,
                    state = auxiliary.state()
                )
            ),
            Err(e) => println!(
                "{}",
                t!("run.auxiliary_failed", locale = locale, name = aux.name, error = e).red()
            ),
        }
    }
}

/// Ctrl-C cancels the cases that have not started yet; running ones finish.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => warn!("failed to listen for Ctrl-C: {e}"),
        }
    });

    token
}

/// Runs the cases one after the other.
///
/// Cases share the auxiliaries, so they never run concurrently. After a
/// cancellation, or after an unexpected failure with `fail_fast`, the remaining
/// cases are skipped.
///
/// 逐个运行用例。
/// 用例共享辅助设备，因此从不并发运行。取消之后，
/// 或在启用 `fail_fast` 时出现意外失败之后，剩余用例会被跳过。
async fn run_tests(
    cases_to_run: Vec<TestCase>,
    registry: &AuxiliaryRegistry,
    stop_token: &CancellationToken,
    fail_fast: bool,
) -> Vec<TestResult> {
    let mut results = Vec::with_capacity(cases_to_run.len());
    let mut failed_unexpectedly = false;

    for case in cases_to_run {
        if stop_token.is_cancelled() || (fail_fast && failed_unexpectedly) {
            results.push(TestResult::Skipped { case });
            continue;
        }

        let fallback = case.clone();
        let result = tokio::select! {
            biased;
            _ = stop_token.cancelled() => TestResult::Skipped { case: fallback },
            res = run_test_case(case, registry) => match res {
                Ok(result) => result,
                Err(e) => TestResult::Failed {
                    case: fallback,
                    steps: Vec::new(),
                    output: format!("Critical error during test execution: {e:#}"),
                    reason: FailureReason::Auxiliary,
                    duration: Default::default(),
                },
            },
        };

        failed_unexpectedly |= result.is_unexpected_failure();
        results.push(result);
    }

    results
}
