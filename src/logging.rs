//! 日志初始化
//!
//! 控制台与重试日志文件双路输出。控制台面向交互使用；
//! `retry.log` 持久记录重试相关事件，便于事后排查队列行为。
//! 两路都读取 `RUST_LOG` 环境变量，未设置时默认 `info`。

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// 初始化双路日志：stdout + `<log_dir>/retry.log`
///
/// 进程生命周期内只应调用一次。
pub fn init_logging(log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref();
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::never(log_dir, "retry.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let file_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(console_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .init();

    // 保持文件写入端存活到进程结束
    std::mem::forget(guard);
}
