//! # Test Case Execution Integration Tests / 测试用例执行集成测试
//!
//! Runs declarative cases against loopback and scripted auxiliaries and
//! checks step verdicts, case retries and the overall case timeout.
//!
//! 针对回环和脚本化辅助设备运行声明式用例，
//! 检查步骤判定、用例重试以及用例整体超时。

mod common;

use aux_runner::core::config::{AuxiliaryConfig, ChannelConfig, StepAction, TestCase, TestStep};
use aux_runner::core::execution::{execute_step, run_test_case};
use aux_runner::core::message::{CommandKind, ResponseStatus};
use aux_runner::core::models::{FailureReason, TestResult};
use aux_runner::core::registry::AuxiliaryRegistry;
use aux_runner::infra::channel::{Channel, ChannelError};
use aux_runner::infra::connectors::ChannelFactory;
use common::{Remote, ScriptedChannel};
use std::sync::Mutex;
use std::time::Duration;

fn query(aux: &str, payload: &str, expect: &str) -> TestStep {
    let mut step = TestStep::new(aux, StepAction::Query);
    step.payload = Some(payload.to_string());
    step.expect = Some(expect.to_string());
    step
}

fn action(aux: &str, action: StepAction) -> TestStep {
    TestStep::new(aux, action)
}

fn expecting(mut step: TestStep, status: ResponseStatus) -> TestStep {
    step.expect_status = Some(status);
    step
}

fn case(name: &str, steps: Vec<TestStep>) -> TestCase {
    TestCase {
        name: name.to_string(),
        steps,
        ..TestCase::default()
    }
}

async fn loopback_registry() -> AuxiliaryRegistry {
    let registry = AuxiliaryRegistry::new(ChannelFactory::with_builtin());
    registry
        .create_instance(AuxiliaryConfig::new("dev1", ChannelConfig::new("loopback")).with_timeout_ms(100))
        .await
        .unwrap();
    registry
}

/// A registry whose `dev1` runs over a silent scripted channel driven by the returned remote.
async fn scripted_registry(timeout_ms: u64) -> (AuxiliaryRegistry, Remote) {
    let (channel, remote) = ScriptedChannel::silent();
    let slot = Mutex::new(Some(channel));
    let mut factory = ChannelFactory::new();
    factory.register("scripted", move |_| {
        slot.lock()
            .unwrap()
            .take()
            .map(|channel| Box::new(channel) as Box<dyn Channel>)
            .ok_or_else(|| ChannelError::other("scripted channel already used"))
    });

    let registry = AuxiliaryRegistry::new(factory);
    registry
        .create_instance(AuxiliaryConfig::new("dev1", ChannelConfig::new("scripted")).with_timeout_ms(timeout_ms))
        .await
        .unwrap();
    (registry, remote)
}

#[cfg(test)]
mod step_tests {
    use super::*;

    #[tokio::test]
    async fn test_matching_query_passes() {
        let registry = loopback_registry().await;
        let outcome = execute_step(1, &query("dev1", "PING", "PING"), &registry).await;

        assert!(outcome.passed());
        assert_eq!(outcome.status, ResponseStatus::Ok);
        assert_eq!(outcome.payload.as_deref(), Some(b"PING".as_slice()));
        assert!(outcome.correlation_id.is_some());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_payload_mismatch() {
        let registry = loopback_registry().await;
        let outcome = execute_step(1, &query("dev1", "PING", "PONG"), &registry).await;

        assert_eq!(outcome.failure, Some(FailureReason::UnexpectedResponse));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_expected_timeout() {
        let registry = loopback_registry().await;
        let step = expecting(action("dev1", StepAction::Report), ResponseStatus::Timeout);
        let outcome = execute_step(1, &step, &registry).await;

        assert!(outcome.passed());
        assert_eq!(outcome.status, ResponseStatus::Timeout);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_mismatch() {
        let registry = loopback_registry().await;
        let outcome = execute_step(3, &action("dev1", StepAction::Report), &registry).await;

        assert_eq!(outcome.index, 3);
        assert_eq!(outcome.status, ResponseStatus::Timeout);
        assert_eq!(outcome.failure, Some(FailureReason::UnexpectedStatus));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_auxiliary() {
        let registry = loopback_registry().await;
        let outcome = execute_step(1, &query("dev9", "PING", "PING"), &registry).await;

        assert_eq!(outcome.status, ResponseStatus::Error);
        assert_eq!(outcome.failure, Some(FailureReason::Auxiliary));
        assert!(outcome.correlation_id.is_none());
        assert!(outcome.detail.unwrap().contains("dev9"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_timeout_overrides_default() {
        let registry = loopback_registry().await;
        let mut step = expecting(action("dev1", StepAction::Report), ResponseStatus::Timeout);
        step.timeout_ms = Some(300);

        let outcome = execute_step(1, &step, &registry).await;
        assert!(outcome.elapsed >= Duration::from_millis(290));
        registry.shutdown().await;
    }
}

#[cfg(test)]
mod case_tests {
    use super::*;

    #[tokio::test]
    async fn test_passing_case() {
        let registry = loopback_registry().await;
        let steps = vec![
            query("dev1", "PING", "PING"),
            action("dev1", StepAction::Send),
            expecting(action("dev1", StepAction::Report), ResponseStatus::Ok),
        ];

        let result = run_test_case(case("ping", steps), &registry).await.unwrap();

        // The report picks up the echo of the preceding send.
        assert!(result.is_passed(), "{}", result.get_output());
        assert_eq!(result.get_retries(), 1);
        assert_eq!(result.steps().len(), 3);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_first_failing_step_ends_the_case() {
        let registry = loopback_registry().await;
        let steps = vec![
            query("dev1", "A", "A"),
            query("dev1", "B", "C"),
            query("dev1", "D", "D"),
        ];

        let result = run_test_case(case("mismatch", steps), &registry).await.unwrap();

        assert_eq!(result.reason(), Some(FailureReason::UnexpectedResponse));
        assert!(result.is_unexpected_failure());
        assert_eq!(result.steps().len(), 2);
        let journal = registry.journal().snapshot();
        assert_eq!(journal.iter().filter(|r| r.kind == CommandKind::Query).count(), 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_lifecycle_steps() {
        let registry = loopback_registry().await;
        let steps = vec![
            action("dev1", StepAction::Suspend),
            expecting(action("dev1", StepAction::Query), ResponseStatus::Error),
            action("dev1", StepAction::Resume),
            query("dev1", "X", "X"),
            action("dev1", StepAction::Abort),
            expecting(action("dev1", StepAction::Query), ResponseStatus::Error),
            action("dev1", StepAction::Recreate),
            query("dev1", "Z", "Z"),
            action("dev1", StepAction::Stop),
        ];

        let result = run_test_case(case("lifecycle", steps), &registry).await.unwrap();

        assert!(result.is_passed(), "{}", result.get_output());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_case_is_retried() {
        let registry = loopback_registry().await;
        let mut failing = case("always-wrong", vec![query("dev1", "A", "B")]);
        failing.retries = Some(2);

        let result = run_test_case(failing, &registry).await.unwrap();

        assert!(result.is_failure());
        let queries = registry.journal().snapshot();
        assert_eq!(queries.iter().filter(|r| r.kind == CommandKind::Query).count(), 3);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_case_passes_on_retry() {
        let (registry, remote) = scripted_registry(200).await;
        // Readable only after the first attempt's 200 ms deadline and the
        // 100 ms late-answer window that follows it.
        remote.push_incoming(b"OK", Duration::from_millis(400));

        let mut flaky = case("flaky", vec![query("dev1", "STATUS?", "OK")]);
        flaky.retries = Some(1);

        let result = run_test_case(flaky, &registry).await.unwrap();

        assert!(result.is_passed(), "{}", result.get_output());
        assert_eq!(result.get_retries(), 2);
        assert_eq!(remote.sent().len(), 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_case_timeout_is_not_retried() {
        let (registry, remote) = scripted_registry(5_000).await;
        let mut slow = case("slow", vec![action("dev1", StepAction::Report)]);
        slow.timeout_secs = Some(1);
        slow.retries = Some(3);

        let result = run_test_case(slow, &registry).await.unwrap();

        assert!(result.is_timeout());
        assert!(result.get_duration().unwrap() < Duration::from_secs(2));
        assert!(remote.sent().is_empty());
    }

    #[tokio::test]
    async fn test_allowed_failure() {
        let registry = loopback_registry().await;
        let mut allowed = case("allowed", vec![query("dev1", "A", "B")]);
        allowed.allow_failure = true;

        let result = run_test_case(allowed, &registry).await.unwrap();

        assert!(result.is_allowed_failure());
        assert!(!result.is_unexpected_failure());
        assert!(matches!(result, TestResult::Failed { .. }));
        registry.shutdown().await;
    }
}
