//! # Infrastructure Module / 基础设施模块
//!
//! This module provides the device-facing infrastructure: the channel
//! capability, the connectors behind it, logging setup and file output.
//!
//! 此模块提供面向设备的基础设施：通道能力、其背后的连接器、日志设置和文件输出。

pub mod channel;
pub mod connectors;
pub mod fs;
pub mod logging;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
