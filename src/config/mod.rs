//! 配置管理模块
//!
//! 提供统一的配置接口：默认值 → 配置文件 → 环境变量，三层叠加。
//! 环境变量沿用既有部署习惯的命名（`deepseek_api_key`、
//! `RETRY_MAX_CONCURRENCY` 等）。

pub mod manager;

pub use manager::{AppConfig, ConfigManager};

/// 配置常量
pub mod constants {
    /// 默认 API 地址
    pub const DEFAULT_API_BASE: &str = "https://api.deepseek.com/";
    /// 默认模型
    pub const DEFAULT_MODEL: &str = "deepseek-chat";
    /// 单次请求超时（秒）
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    // 重试工作器
    /// 轮询间隔，同时也是派发节流间隔（秒）
    pub const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 1.0;
    /// 工作池并发上限
    pub const DEFAULT_MAX_CONCURRENCY: usize = 1;
    /// 持久重试次数上限；0 表示不设上限
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 0;
    /// 每轮取出的到期条目数
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    /// 停机时等待在飞任务的宽限（秒）
    pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

    // 同步路径
    /// 立即重试次数上限
    pub const DEFAULT_MAX_IMMEDIATE_ATTEMPTS: u32 = 40;
    /// 指数退避上限（秒）
    pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 3600;
    /// 传输异常后的固定等待（秒）
    pub const TRANSPORT_RETRY_DELAY_SECS: u64 = 2;

    /// 词典提示词的字符上限
    pub const DEFAULT_LEXICON_MAX_CHARS: usize = 1500;

    // 数据路径
    pub const DEFAULT_DB_PATH: &str = "data/cache_db/translation_cache.redb";
    pub const DEFAULT_LEXICON_PATH: &str = "data/lexicon/lexicon.toml";
    pub const DEFAULT_LOG_DIR: &str = "data/logs";

    /// 配置文件搜索路径，命中第一个即停止
    pub const CONFIG_PATHS: &[&str] = &[
        "subtrans-config.toml",
        "config.toml",
        "~/.config/subtrans/config.toml",
    ];
}

/// 检查是否存在任一配置文件
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS.iter().any(|path| {
        let expanded = shellexpand::tilde(path);
        std::path::Path::new(expanded.as_ref()).exists()
    })
}
