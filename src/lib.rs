//! # Subtrans Library
//!
//! 字幕文本翻译库：词典 → 持久缓存 → 远程翻译。远程调用失败不会
//! 被丢弃，而是交给持久化的重试队列，由限速的后台工作器慢慢消化，
//! 进程重启后队列依然存在。
//!
//! ## 模块组织
//!
//! - `api` - 远程翻译 API 客户端与 `Translator` 能力接口
//! - `config` - 配置管理（默认值 → 配置文件 → 环境变量）
//! - `error` - 错误分类（瞬时/永久/存储）
//! - `lexicon` - 用户可编辑的精确匹配词典
//! - `logging` - 控制台 + 重试日志文件的双路日志
//! - `service` - 同步路径的翻译编排器
//! - `storage` - 持久缓存与重试队列（共享一个嵌入式数据库）
//! - `worker` - 后台重试工作器
//!
//! ## 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subtrans::{
//!     AppConfig, DeepSeekClient, RetryWorker, TranslationDb, TranslationService, WorkerConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let db = TranslationDb::open(config.db_path())?;
//! let client = Arc::new(DeepSeekClient::new(&config)?);
//!
//! let service = TranslationService::new(&db, Arc::clone(&client), &config);
//! let worker = RetryWorker::new(&db, client, WorkerConfig::from_config(&config));
//! worker.start();
//!
//! // 同步路径：失败时立即返回哨兵值，后台工作器负责最终解决
//! let translated = service.translate("こんにちは", None, None).await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod logging;
pub mod service;
pub mod storage;
pub mod worker;

// Re-export commonly used items for convenience
pub use api::{DeepSeekClient, Translator};
pub use config::{AppConfig, ConfigManager};
pub use error::{ApiError, StorageError, TranslationError, TranslationResult};
pub use lexicon::Lexicon;
pub use service::{TranslateOptions, TranslationService, FAILED_SENTINEL};
pub use storage::{
    CacheEntry, CacheStats, CacheStore, RetryItem, RetryQueueStore, TranslationDb,
};
pub use worker::{RetryWorker, WorkerConfig};
