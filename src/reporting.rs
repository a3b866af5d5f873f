//! # Reporting Module / 报告模块
//!
//! This module records what the auxiliaries did and presents test outcomes:
//! the per-command journal for external reporters and the colored console
//! summary.
//!
//! 此模块记录辅助设备的操作并呈现测试结果：
//! 面向外部报告器的逐命令日志，以及彩色控制台摘要。

pub mod console;
pub mod journal;

// Re-export common reporting functions
pub use console::{print_summary, print_unexpected_failure_details};
pub use journal::{CommandRecord, Journal};
