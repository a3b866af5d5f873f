//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints test outcomes to the console: a colored summary table
//! and, for unexpected failures, the step transcript that led to them.
//!
//! 此模块将测试结果打印到控制台：彩色摘要表格，
//! 以及对于意外失败，打印导致失败的步骤记录。

use crate::core::models::TestResult;
use colored::*;
use crate::infra::t;

/// One line per case: colored status, name, duration, requirement ids and
/// the number of extra attempts, followed by the pass/fail/skip totals.
///
/// 每个用例一行：带颜色的状态、名称、耗时、需求编号以及额外尝试次数，
/// 最后打印通过/失败/跳过的总数。
///
/// ## Example / 示例
/// ```text
/// --- Test Summary ---
///   - Status           | Test Name                      | Duration   Ids
///   - Passed           | ping                           |    12.30ms REQ-12
///   - Failed           | report                         |     2.01s
///   - Skipped          | teardown                       |       N/A
/// ```
pub fn print_summary(results: &[TestResult], locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for result in results {
        let duration = match result.get_duration() {
            Some(elapsed) => format!("{elapsed:.2?}"),
            None => "N/A".into(),
        };
        let extra_attempts = match result.get_retries() {
            0 | 1 => String::new(),
            attempt => format!(" ({} retries)", attempt - 1),
        };

        let label = result.get_status_str(locale);
        let label = if result.is_passed() {
            label.green()
        } else if result.is_allowed_failure() {
            label.yellow()
        } else if result.is_failure() {
            label.red()
        } else {
            label.dimmed()
        };

        println!(
            "  - {:<18} | {:<30} | {:>10} {}{}",
            label,
            result.case_name(),
            duration,
            result.test_ids().join(",").dimmed(),
            extra_attempts
        );
    }

    let passed = results.iter().filter(|r| r.is_passed()).count();
    let failed = results.iter().filter(|r| r.is_failure()).count();
    let skipped = results.iter().filter(|r| r.is_skipped()).count();
    println!(
        "\n{}",
        t!(
            "report.totals",
            locale = locale,
            passed = passed,
            failed = failed,
            skipped = skipped
        )
    );
}

/// Dumps the step transcript of every case that failed without being allowed to.
///
/// 打印每个不允许失败却失败了的用例的步骤记录。
pub fn print_unexpected_failure_details(failures: &[&TestResult], locale: &str) {
    if failures.is_empty() {
        return;
    }
    let rule = "-".repeat(80);

    println!("\n{}", t!("report.unexpected_failure_banner", locale = locale).red().bold());
    println!("{rule}");

    for (position, result) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'",
            position + 1,
            failures.len(),
            t!("report.header_failure", locale = locale).red(),
            result.case_name().cyan()
        );

        if let TestResult::Failed { reason, .. } = result {
            println!("{}: {}", t!("report.reason", locale = locale).yellow(), reason);
            println!("\n--- {} ---\n", t!("report.step_log", locale = locale).yellow());
            println!("{}", result.get_output());
            println!("\n{rule}");
        }
    }
}
