//! # Data Models Module / 数据模型模块
//!
//! This module defines the result types produced by test-case execution:
//! the outcome of each step, the reason a case failed and the final result of
//! a case.
//!
//! 此模块定义测试用例执行所产生的结果类型：
//! 每个步骤的结果、用例失败的原因以及用例的最终结果。

use crate::core::config::{StepAction, TestCase};
use crate::core::message::{CorrelationId, ResponseStatus, format_payload};
use crate::infra::t;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::time::Duration;

/// Why a case ended in failure. The first failing step decides it, unless
/// the whole case ran out of time.
/// 用例失败的原因。由第一个失败的步骤决定，除非整个用例超时。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The test case exceeded its configured overall timeout.
    /// 测试用例超出了其配置的整体超时时间。
    Timeout,
    /// A step got the expected status but not the expected payload.
    /// 步骤得到了期望的状态，但负载与期望不符。
    UnexpectedResponse,
    /// A step's response status differs from the expected one.
    /// 步骤的响应状态与期望的不同。
    UnexpectedStatus,
    /// The auxiliary could not be reached: unknown instance, terminal state or
    /// failed re-creation.
    /// 无法访问辅助设备：实例未知、处于终态或重新创建失败。
    Auxiliary,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::UnexpectedResponse => "unexpected response",
            FailureReason::UnexpectedStatus => "unexpected status",
            FailureReason::Auxiliary => "auxiliary error",
        };
        out.write_str(text)
    }
}

/// What happened when a single step ran.
/// 单个步骤运行时发生的情况。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 1-based position of the step in its case.
    pub index: usize,
    pub auxiliary: String,
    pub action: StepAction,
    /// Correlation id of the command, absent when nothing was enqueued.
    pub correlation_id: Option<CorrelationId>,
    /// Observed status; a call rejected before enqueue counts as `error`.
    pub status: ResponseStatus,
    pub payload: Option<Vec<u8>>,
    pub detail: Option<String>,
    pub elapsed: Duration,
    /// `None` when the step met its expectations.
    pub failure: Option<FailureReason>,
}

impl StepOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// One transcript line, e.g. `#2 dev1 query -> ok [50 49 4E 47] (12 ms)`.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "#{} {} {} -> {}",
            self.index, self.auxiliary, self.action, self.status
        );
        if let Some(payload) = &self.payload {
            line.push_str(&format!(" [{}]", format_payload(payload)));
        }
        if let Some(detail) = &self.detail {
            line.push_str(&format!(": {detail}"));
        }
        line.push_str(&format!(" ({} ms)", self.elapsed.as_millis()));
        line
    }
}

/// Renders the step transcript of an attempt.
pub fn transcript(steps: &[StepOutcome]) -> String {
    steps
        .iter()
        .map(StepOutcome::summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Verdict for one case after all of its attempts ran against the auxiliaries.
///
/// 一个用例在其所有尝试针对辅助设备运行完毕后的判定。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TestResult {
    /// Some attempt met every step expectation.
    /// 某次尝试满足了所有步骤的期望。
    Passed {
        case: TestCase,
        /// Outcome of every step of the passing attempt / 通过的那次尝试中每个步骤的结果
        steps: Vec<StepOutcome>,
        /// Wall time of every attempt together / 所有尝试的总耗时
        duration: Duration,
        /// Attempt that passed, counting from 1 / 通过的那次尝试序号，从 1 开始
        retries: u8,
    },
    /// The test case failed.
    /// 测试用例失败。
    Failed {
        case: TestCase,
        /// Steps run by the last attempt, the failing one included / 最后一次尝试所运行的步骤，包括失败的步骤
        steps: Vec<StepOutcome>,
        /// Human readable failure description / 人类可读的失败描述
        output: String,
        reason: FailureReason,
        /// Wall time up to the verdict / 直到判定为止的耗时
        duration: Duration,
    },
    /// The test case was not run because the run was cancelled first.
    /// 由于运行先被取消，测试用例未被执行。
    Skipped { case: TestCase },
}

impl TestResult {
    /// A failure is "unexpected" unless the case allows failure.
    pub fn is_unexpected_failure(&self) -> bool {
        match self {
            TestResult::Failed { case, .. } => !case.allow_failure,
            _ => false,
        }
    }

    pub fn is_allowed_failure(&self) -> bool {
        match self {
            TestResult::Failed { case, .. } => case.allow_failure,
            _ => false,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.reason().is_some()
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, TestResult::Passed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TestResult::Skipped { .. })
    }

    pub fn is_timeout(&self) -> bool {
        self.reason() == Some(FailureReason::Timeout)
    }

    pub fn case(&self) -> &TestCase {
        match self {
            TestResult::Passed { case, .. }
            | TestResult::Failed { case, .. }
            | TestResult::Skipped { case } => case,
        }
    }

    /// Gets the name of the test case.
    /// 获取测试用例的名称。
    pub fn case_name(&self) -> &str {
        &self.case().name
    }

    /// Requirement keys the case verifies.
    /// 该用例所验证的需求键。
    pub fn test_ids(&self) -> &[String] {
        &self.case().test_ids
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            TestResult::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Localized status label; a case timeout wins over `allow_failure`.
    /// 本地化的状态标签；用例超时优先于 `allow_failure`。
    pub fn get_status_str(&self, locale: &str) -> String {
        match self {
            TestResult::Passed { .. } => t!("report.status_passed", locale = locale).into(),
            TestResult::Failed { reason: FailureReason::Timeout, .. } => {
                t!("report.status_timeout", locale = locale).to_string()
            }
            TestResult::Failed { case, .. } if case.allow_failure => {
                t!("report.status_allowed_failure", locale = locale).to_string()
            }
            TestResult::Failed { .. } => t!("report.status_failed", locale = locale).to_string(),
            TestResult::Skipped { .. } => t!("report.status_skipped", locale = locale).to_string(),
        }
    }

    /// Step transcript, followed by the failure description for failed cases.
    /// 步骤记录；对于失败的用例，后接失败描述。
    pub fn get_output(&self) -> String {
        match self {
            TestResult::Passed { steps, .. } => transcript(steps),
            TestResult::Failed { steps, output, .. } => {
                let steps = transcript(steps);
                if steps.is_empty() {
                    output.clone()
                } else {
                    format!("{steps}\n{output}")
                }
            }
            TestResult::Skipped { .. } => String::new(),
        }
    }

    pub fn steps(&self) -> &[StepOutcome] {
        match self {
            TestResult::Passed { steps, .. } | TestResult::Failed { steps, .. } => steps,
            TestResult::Skipped { .. } => &[],
        }
    }

    /// Skipped cases never ran, so they have no duration.
    pub fn get_duration(&self) -> Option<Duration> {
        match self {
            TestResult::Skipped { .. } => None,
            TestResult::Passed { duration, .. } | TestResult::Failed { duration, .. } => Some(*duration),
        }
    }

    /// The passing attempt number, or 0 when the case did not pass.
    /// 通过的尝试序号；未通过时为 0。
    pub fn get_retries(&self) -> u8 {
        if let TestResult::Passed { retries, .. } = self { *retries } else { 0 }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResult::Passed { case, retries, .. } => {
                write!(f, "{}: passed (attempt {retries})", case.name)
            }
            TestResult::Failed { case, reason, output, .. } => {
                write!(f, "{}: failed, {reason}: {output}", case.name)
            }
            TestResult::Skipped { case } => write!(f, "{}: skipped", case.name),
        }
    }
}
