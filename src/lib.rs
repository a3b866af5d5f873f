//! # Aux Runner Library / Aux Runner 库
//!
//! This library drives hardware auxiliaries from integration tests. Every
//! auxiliary is served by its own worker thread that owns the device channel;
//! test code talks to it through a cloneable façade that enqueues commands
//! and waits, with a bound, for the matching response.
//!
//! 此库用于在集成测试中驱动硬件辅助设备。每个辅助设备由拥有设备通道的独立工作线程提供服务；
//! 测试代码通过可克隆的外观与其通信，外观将命令入队并在有限时间内等待匹配的响应。
//!
//! ## Modules / 模块
//!
//! - `core` - Lifecycle, worker, façade, registry and test-case execution
//! - `infra` - Channel capability, connectors, logging and file output
//! - `reporting` - Command journal and console summaries
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 生命周期、工作线程、外观、注册表和测试用例执行
//! - `infra` - 通道能力、连接器、日志和文件输出
//! - `reporting` - 命令日志和控制台摘要
//! - `cli` - 命令行接口和命令

pub mod core;
pub mod infra;
pub mod reporting;
pub mod cli;

// Re-export commonly used items
pub use core::config;
pub use core::models;
pub use core::{Auxiliary, AuxiliaryRegistry, AuxError, AuxResult, LifecycleState};
pub use infra::channel::{Channel, ChannelError, ChannelErrorKind};
pub use infra::connectors::ChannelFactory;

/// Maps a requested locale onto the bundled translations: the exact locale
/// (e.g. "zh-CN") when available, then its language part (e.g. "en" from
/// "en-US"), finally "en".
///
/// 将请求的区域设置映射到内置翻译：优先精确匹配（如 "zh-CN"），
/// 其次匹配语言部分（如 "en-US" 中的 "en"），最后回退到 "en"。
pub fn resolve_locale(requested: &str) -> String {
    let available = rust_i18n::available_locales!();
    let requested = requested.replace('_', "-");

    if let Some(exact) = available.iter().find(|l| l.eq_ignore_ascii_case(&requested)) {
        return exact.to_string();
    }
    requested
        .split('-')
        .next()
        .and_then(|lang| available.iter().find(|l| l.eq_ignore_ascii_case(lang)))
        .map(|l| l.to_string())
        .unwrap_or_else(|| "en".to_string())
}

/// Initializes i18n from the system locale.
pub fn init() {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    rust_i18n::set_locale(&resolve_locale(&locale));
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
