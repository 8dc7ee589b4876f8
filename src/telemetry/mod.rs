//! 日志初始化

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing，`RUST_LOG` 优先于配置文件中的级别
///
/// 重复调用时忽略（测试中可能已初始化）。
pub fn init_logging(config: &LoggingConfig) {
    let filter = build_filter(config);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|e| {
            eprintln!("[CONFIG] 无效的日志级别 {:?}: {}，使用 info", config.level, e);
            EnvFilter::new("info")
        })
    })
}
