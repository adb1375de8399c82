//! 日志初始化
//!
//! 基于 `tracing-subscriber`，同时通过 `tracing-log` 接管 `log` 宏的输出。
//! `RUST_LOG` 优先于代码中给出的默认过滤规则。

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_LOG_FILTER: &str = "ranger_sdk=info,ranger_driver=info,ranger_can=info";

static INIT: Once = Once::new();

/// 使用默认过滤规则初始化日志
pub fn init_logger() {
    init_logger_with_filter(DEFAULT_LOG_FILTER);
}

/// 初始化全局日志订阅者
///
/// 多次调用只有第一次生效。如果进程里已经有别的全局订阅者，保持原样不报错。
pub fn init_logger_with_filter(default_filter: &str) {
    INIT.call_once(|| {
        let _ = tracing_log::LogTracer::init();

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            tracing::debug!("Global tracing subscriber already set, keeping it");
        }
    });
}
