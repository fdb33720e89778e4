//! 翻译服务 - 同步路径的编排器
//!
//! 这是调用方使用的主要入口，负责协调各个子系统：
//!
//! - **词典**: 权威的人工覆盖，命中即返回，完全绕过缓存
//! - **缓存**: 持久化的译文存储，命中时累计命中计数
//! - **远程 API**: 有界的立即重试，按结果分类退避
//! - **重试队列**: 立即重试耗尽后的持久化兜底
//!
//! [`translate`](TranslationService::translate) 从不失败：调用方
//! 总能拿到一个字符串，最坏情况是哨兵值 [`FAILED_SENTINEL`]，
//! 表示"尚未翻译、将异步解决或已永久失败"。调用方之后通过再次
//! 查询缓存来区分这两种情况。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::api::Translator;
use crate::config::{constants, AppConfig};
use crate::error::{ApiError, StorageError};
use crate::lexicon::Lexicon;
use crate::storage::{CacheStats, CacheStore, RetryItem, RetryQueueStore, TranslationDb};

/// 哨兵失败值：重试次数永久耗尽后写入缓存的占位译文
pub const FAILED_SENTINEL: &str = "[翻译失败]";

/// 同步路径的调节参数
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// 立即重试次数上限
    pub max_immediate_attempts: u32,
    /// 限流退避的基础时长，第 n 次等待 `base * 2^n`
    pub rate_limit_base: Duration,
    /// 退避上限，同时约束立即路径与持久队列的排程
    pub backoff_cap: Duration,
    /// 传输异常后的固定等待
    pub transport_retry_delay: Duration,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            max_immediate_attempts: constants::DEFAULT_MAX_IMMEDIATE_ATTEMPTS,
            rate_limit_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(constants::DEFAULT_BACKOFF_CAP_SECS),
            transport_retry_delay: Duration::from_secs(constants::TRANSPORT_RETRY_DELAY_SECS),
        }
    }
}

impl TranslateOptions {
    /// 从应用配置派生
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_immediate_attempts: config.max_immediate_attempts,
            backoff_cap: Duration::from_secs(config.backoff_cap_seconds),
            ..Self::default()
        }
    }
}

/// 翻译服务
pub struct TranslationService<T: Translator> {
    cache: CacheStore,
    queue: RetryQueueStore,
    translator: Arc<T>,
    options: TranslateOptions,
    stats: ServiceStats,
}

impl<T: Translator> TranslationService<T> {
    /// 按应用配置创建服务
    pub fn new(db: &TranslationDb, translator: Arc<T>, config: &AppConfig) -> Self {
        Self::with_options(db, translator, TranslateOptions::from_config(config))
    }

    /// 使用显式参数创建服务
    pub fn with_options(
        db: &TranslationDb,
        translator: Arc<T>,
        options: TranslateOptions,
    ) -> Self {
        Self {
            cache: db.cache_store(),
            queue: db.retry_queue_with_cap(options.backoff_cap.as_secs()),
            translator,
            options,
            stats: ServiceStats::default(),
        }
    }

    /// 翻译一段文本
    ///
    /// 查询顺序：词典 → 缓存 → 远程 API（有界立即重试）。立即
    /// 重试耗尽后将键交给持久重试队列并返回 [`FAILED_SENTINEL`]；
    /// 此时译文**不会**写入缓存，哨兵只在后台工作器耗尽持久
    /// 重试后才落盘，后续成功的重试因此总能干净地覆盖。
    ///
    /// 存储失败在此路径上高声记录但不中断流程：读失败降级为
    /// 未命中，写失败不影响已取得的译文。
    pub async fn translate(
        &self,
        text: &str,
        lexicon: Option<&Lexicon>,
        context: Option<&str>,
    ) -> String {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }

        // 词典命中绕过缓存与队列：人工覆盖不参与学习
        if let Some(lex) = lexicon {
            if let Some(hit) = lex.lookup(text) {
                self.stats.lexicon_hits.fetch_add(1, Ordering::Relaxed);
                return hit.to_string();
            }
        }

        match self.cache.get(text) {
            Ok(Some(cached)) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return cached;
            }
            Ok(None) => {}
            Err(e) => tracing::error!("缓存查询失败，按未命中继续: {}", e),
        }

        let mut last_error = "立即重试次数耗尽".to_string();
        for attempt in 0..self.options.max_immediate_attempts {
            match self.translator.translate_once(text, lexicon, context).await {
                Ok(translated) => {
                    self.stats.remote_successes.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.cache.put(text, &translated) {
                        tracing::error!("缓存写入失败: {}", e);
                    }
                    return translated;
                }
                Err(ApiError::RateLimited) => {
                    last_error = ApiError::RateLimited.to_string();
                    let wait = self.rate_limit_backoff(attempt);
                    tracing::warn!("请求过于频繁，等待 {:?} 后重试", wait);
                    sleep(wait).await;
                }
                Err(err @ ApiError::Api { .. }) => {
                    // 非限流的 API 错误：立即重试到此为止，交给持久队列
                    last_error = err.to_string();
                    tracing::error!("{}", last_error);
                    break;
                }
                Err(ApiError::Transport(msg)) => {
                    last_error = format!("连接异常: {}", msg);
                    tracing::warn!("{}", last_error);
                    sleep(self.options.transport_retry_delay).await;
                }
            }
        }

        match self.queue.enqueue(text, &last_error) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                tracing::info!("已将文本加入重试队列（持久化）: {}", text);
            }
            Err(e) => tracing::error!("加入重试队列失败: {}", e),
        }
        FAILED_SENTINEL.to_string()
    }

    fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.options
            .rate_limit_base
            .checked_mul(factor)
            .unwrap_or(self.options.backoff_cap)
            .min(self.options.backoff_cap)
    }

    /// 缓存统计：条目数与总命中次数
    pub fn cache_stats(&self) -> Result<CacheStats, StorageError> {
        self.cache.stats()
    }

    /// 当前到期的重试条目（运维可见性）
    pub fn due_items(&self, limit: usize) -> Result<Vec<RetryItem>, StorageError> {
        self.queue.due_items(limit)
    }

    /// 重试队列中的条目总数
    pub fn queue_len(&self) -> Result<u64, StorageError> {
        self.queue.len()
    }

    /// 服务统计信息
    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }
}

/// 翻译服务统计信息（线程安全）
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// 词典命中次数
    pub lexicon_hits: AtomicU64,
    /// 缓存命中次数
    pub cache_hits: AtomicU64,
    /// 远程翻译成功次数
    pub remote_successes: AtomicU64,
    /// 转入持久重试队列的次数
    pub enqueued: AtomicU64,
}

impl ServiceStats {
    /// 获取统计数据的一致性快照
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            lexicon_hits: self.lexicon_hits.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_successes: self.remote_successes.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy)]
pub struct ServiceStatsSnapshot {
    pub lexicon_hits: u64,
    pub cache_hits: u64,
    pub remote_successes: u64,
    pub enqueued: u64,
}
