//! # Core Module / 核心模块
//!
//! This module contains the auxiliary execution core (lifecycle, messages,
//! queue plumbing, the per-device worker and its façade, the registry) and
//! the declarative test-case layer built on top of it (configuration,
//! planning, execution).
//!
//! 此模块包含辅助执行核心（生命周期、消息、队列管道、每设备工作线程及其外观、注册表），
//! 以及构建于其上的声明式测试用例层（配置、计划、执行）。

pub mod config;
pub mod deadline;
pub mod error;
pub mod execution;
pub mod facade;
pub mod lifecycle;
pub mod message;
pub mod models;
pub mod planner;
pub mod policy;
pub mod queue;
pub mod registry;
pub mod worker;

// Re-exports
pub use error::{AuxError, AuxResult};
pub use execution::run_test_case;
pub use facade::Auxiliary;
pub use lifecycle::LifecycleState;
pub use models::TestResult;
pub use registry::AuxiliaryRegistry;
