//! Diagnostic logging setup.
//!
//! User-facing output stays on colored `println!`; `tracing` carries the
//! diagnostic events of the workers and façades to stderr.
//!
//! 面向用户的输出仍使用彩色 `println!`；`tracing` 将工作线程和外观的诊断事件输出到 stderr。

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor `--log-level` is given.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(DEFAULT_LOG_LEVEL)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}
