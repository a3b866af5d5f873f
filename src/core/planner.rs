//! # Test Execution Planner Module / 测试执行计划模块
//!
//! This module selects the test cases of a run. Cases keep the order in which
//! they are declared, since later steps commonly depend on device state left
//! behind by earlier cases.
//!
//! 此模块选择一次运行中的测试用例。用例保持其声明顺序，
//! 因为后续步骤通常依赖于先前用例留下的设备状态。

use crate::core::config::TestCase;
use anyhow::{Result, bail};

/// Represents the selected cases of a run.
/// 表示一次运行中被选中的用例。
#[derive(Debug)]
pub struct ExecutionPlan {
    /// The cases to execute, in declaration order.
    /// 要执行的用例，按声明顺序排列。
    pub cases_to_run: Vec<TestCase>,
    /// The number of cases left out by the tag and name filters.
    /// 被标签和名称过滤器排除的用例数量。
    pub filtered_count: usize,
    /// The number of selected cases that are allowed to fail.
    /// 被选中的用例中允许失败的数量。
    pub allowed_failure_count: usize,
}

/// Creates an execution plan for the given cases.
///
/// A case is selected when it carries any of `tags` (or `tags` is empty) and
/// its name is in `names` (or `names` is empty). Naming a case that does not
/// exist is an error, so that a typo does not silently run nothing.
///
/// 为给定的用例创建执行计划。
/// 当用例带有 `tags` 中的任一标签（或 `tags` 为空）且其名称在 `names` 中
/// （或 `names` 为空）时被选中。指定不存在的用例名称会报错，以免拼写错误导致什么都不运行。
///
/// # Arguments
/// * `cases` - Every case declared in the configuration
/// * `tags` - Tag filter from `--tag`
/// * `names` - Name filter from `--case`
pub fn plan_execution(cases: Vec<TestCase>, tags: &[String], names: &[String]) -> Result<ExecutionPlan> {
    for name in names {
        if !cases.iter().any(|case| &case.name == name) {
            bail!("Unknown test case '{}'", name);
        }
    }

    let total = cases.len();
    let cases_to_run: Vec<TestCase> = cases
        .into_iter()
        .filter(|case| tags.is_empty() || case.tags.iter().any(|tag| tags.contains(tag)))
        .filter(|case| names.is_empty() || names.contains(&case.name))
        .collect();

    Ok(ExecutionPlan {
        filtered_count: total - cases_to_run.len(),
        allowed_failure_count: cases_to_run.iter().filter(|case| case.allow_failure).count(),
        cases_to_run,
    })
}
