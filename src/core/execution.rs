//! # Test Execution Engine Module / 测试执行引擎模块
//!
//! This module runs declarative test cases against the auxiliaries of a
//! registry. Each step becomes one command on the addressed auxiliary; its
//! response is compared with the step's expectations. Whole cases are retried
//! and bounded by an overall timeout.
//!
//! 此模块针对注册表中的辅助设备运行声明式测试用例。
//! 每个步骤成为所指定辅助设备上的一条命令；其响应与步骤的期望进行比较。
//! 整个用例可重试，并受整体超时限制。

use anyhow::Result;
use colored::*;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{
    core::{
        config::{StepAction, TestCase, TestStep},
        deadline,
        facade::RESPONSE_GRACE,
        message::{CommandKind, Request, ResponseStatus, format_payload},
        models::{FailureReason, StepOutcome, TestResult},
        registry::AuxiliaryRegistry,
    },
    infra::t,
};

/// Runs the steps of `case` against `registry` until one attempt passes or
/// `retries` extra attempts have failed. Each attempt is bounded by
/// `timeout_secs`; a case that times out is not retried.
///
/// 针对 `registry` 运行 `case` 的步骤，直到某次尝试通过或额外的 `retries` 次尝试均失败。
/// 每次尝试受 `timeout_secs` 限制；超时的用例不会重试。
pub async fn run_test_case(case: TestCase, registry: &AuxiliaryRegistry) -> Result<TestResult> {
    let max_attempts = 1u8.saturating_add(case.retries.unwrap_or(0));
    let mut last_result: Option<TestResult> = None;

    for attempt in 1..=max_attempts {
        let case_name = case.name.clone();
        let timeout_dur = case.timeout_secs.map(Duration::from_secs);
        let started = Instant::now();

        let execution_future = run_steps(case.clone(), registry);

        let result = if let Some(duration) = timeout_dur {
            match tokio::time::timeout(duration, execution_future).await {
                Ok(res) => res,
                Err(_) => {
                    println!(
                        "{}",
                        t!("run.test_timeout", name = case_name, timeout = duration.as_secs()).red()
                    );
                    TestResult::Failed {
                        case: case.clone(),
                        steps: Vec::new(),
                        output: t!("run.test_timeout_message").to_string(),
                        reason: FailureReason::Timeout,
                        duration: started.elapsed(),
                    }
                }
            }
        } else {
            execution_future.await
        };

        match result {
            TestResult::Passed {
                case,
                steps,
                duration,
                ..
            } => {
                if attempt > 1 {
                    println!(
                        "{}",
                        t!("run.test_passed_on_retry", name = case_name, retries = attempt - 1).green()
                    );
                }
                return Ok(TestResult::Passed {
                    case,
                    steps,
                    duration,
                    retries: attempt,
                });
            }
            res => {
                if res.is_timeout() {
                    return Ok(res);
                }
                if attempt < max_attempts {
                    println!(
                        "{}",
                        t!("run.test_retrying", name = case_name, attempt = attempt, retries = max_attempts - 1).yellow()
                    );
                } else if max_attempts > 1 {
                    println!(
                        "{}",
                        t!("run.test_failed_after_retries", name = case_name, retries = max_attempts - 1).red()
                    );
                }
                last_result = Some(res);
            }
        }
    }
    Ok(last_result.unwrap_or(TestResult::Skipped { case }))
}

/// Runs the steps of one attempt in order, stopping at the first failing step.
async fn run_steps(case: TestCase, registry: &AuxiliaryRegistry) -> TestResult {
    println!("{}", t!("run.running_test", name = case.name).blue());

    let started = Instant::now();
    let mut steps = Vec::with_capacity(case.steps.len());

    for (index, step) in case.steps.iter().enumerate() {
        let outcome = execute_step(index + 1, step, registry).await;
        debug!(case = %case.name, step = outcome.index, status = %outcome.status, "step finished");

        if let Some(reason) = outcome.failure {
            let output = describe_failure(step, &outcome);
            steps.push(outcome);
            return TestResult::Failed {
                case,
                steps,
                output,
                reason,
                duration: started.elapsed(),
            };
        }
        steps.push(outcome);
    }

    TestResult::Passed {
        case,
        steps,
        duration: started.elapsed(),
        retries: 1,
    }
}

/// Runs one step and checks it against its expectations.
///
/// 运行一个步骤并根据其期望进行检查。
pub async fn execute_step(index: usize, step: &TestStep, registry: &AuxiliaryRegistry) -> StepOutcome {
    let started = Instant::now();
    let mut outcome = StepOutcome {
        index,
        auxiliary: step.auxiliary.clone(),
        action: step.action,
        correlation_id: None,
        status: ResponseStatus::Error,
        payload: None,
        detail: None,
        elapsed: Duration::ZERO,
        failure: None,
    };

    let rejected = if step.action == StepAction::Recreate {
        registry.recreate_instance(&step.auxiliary).await.err()
    } else {
        match registry.get(&step.auxiliary).await {
            Ok(auxiliary) => {
                let timeout = step.timeout().unwrap_or_else(|| auxiliary.default_timeout());
                let request = request_for(step, timeout);
                let wait = deadline::with_grace(timeout, RESPONSE_GRACE);
                match auxiliary.run_command(request, wait).await {
                    Ok(response) => {
                        outcome.correlation_id = Some(response.correlation_id);
                        outcome.status = response.status;
                        outcome.payload = response.payload;
                        outcome.detail = response.error_detail;
                        None
                    }
                    Err(e) => Some(e),
                }
            }
            Err(e) => Some(e),
        }
    };

    let expected = step.expected_status();
    match rejected {
        Some(e) => {
            outcome.status = ResponseStatus::Error;
            outcome.detail = Some(e.to_string());
            if expected != ResponseStatus::Error {
                outcome.failure = Some(FailureReason::Auxiliary);
            }
        }
        None if step.action == StepAction::Recreate => {
            outcome.status = ResponseStatus::Ok;
            if expected != ResponseStatus::Ok {
                outcome.failure = Some(FailureReason::UnexpectedStatus);
            }
        }
        None => {
            if outcome.status != expected {
                outcome.failure = Some(FailureReason::UnexpectedStatus);
            } else if let Some(want) = step.expected_payload() {
                if outcome.payload.as_deref().unwrap_or_default() != want.as_slice() {
                    outcome.failure = Some(FailureReason::UnexpectedResponse);
                }
            }
        }
    }

    outcome.elapsed = started.elapsed();
    outcome
}

fn request_for(step: &TestStep, timeout: Duration) -> Request {
    let request = match step.action {
        StepAction::Start => Request::new(CommandKind::Start),
        StepAction::Stop => Request::new(CommandKind::Stop),
        StepAction::Suspend => Request::new(CommandKind::Suspend),
        StepAction::Resume => Request::new(CommandKind::Resume),
        StepAction::Abort => Request::new(CommandKind::Abort),
        StepAction::Send => Request::send(step.payload()),
        StepAction::Query => Request::query(step.payload()),
        StepAction::Report => Request::new(CommandKind::Listen),
        // Handled by the registry before a request is built.
        StepAction::Recreate => Request::new(CommandKind::Start),
    };
    request.with_device_timeout(timeout)
}

fn describe_failure(step: &TestStep, outcome: &StepOutcome) -> String {
    let expected = step.expected_status();
    match outcome.failure {
        Some(FailureReason::UnexpectedResponse) => t!(
            "run.step_unexpected_response",
            index = outcome.index,
            auxiliary = outcome.auxiliary,
            expected = format_payload(&step.expected_payload().unwrap_or_default()),
            actual = format_payload(outcome.payload.as_deref().unwrap_or_default())
        )
        .to_string(),
        _ => t!(
            "run.step_unexpected_status",
            index = outcome.index,
            auxiliary = outcome.auxiliary,
            action = outcome.action,
            expected = expected,
            actual = outcome.status,
            detail = outcome.detail.as_deref().unwrap_or("-")
        )
        .to_string(),
    }
}
