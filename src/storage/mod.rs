//! 存储管理模块 - 持久化缓存与重试队列
//!
//! 两个独立的存储（翻译缓存、重试队列）共享同一个嵌入式 redb
//! 数据库，各占一张表。每次读改写都是一个以单键为范围的写事务，
//! 由 redb 的单写者模型保证不丢失更新。

pub mod cache;
pub mod retry_queue;

pub use cache::{CacheEntry, CacheStats, CacheStore};
pub use retry_queue::{RetryItem, RetryQueueStore, DEFAULT_BACKOFF_CAP_SECS};

use std::fs;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};

use crate::error::StorageError;

/// 翻译缓存表：键为修剪后的原文，值为 JSON 编码的 [`CacheEntry`]
pub(crate) const CACHE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("translation_cache");

/// 重试队列表：键为原文，值为 JSON 编码的 [`RetryItem`]
pub(crate) const RETRY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("retry_queue");

/// 翻译数据库
///
/// 打开（必要时创建）磁盘上的数据库文件并预建两张表，
/// 之后通过 [`cache_store`](Self::cache_store) 和
/// [`retry_queue`](Self::retry_queue) 取得各自的存储句柄。
/// 句柄共享同一个数据库，可在线程间自由克隆传递。
pub struct TranslationDb {
    db: Arc<Database>,
}

impl TranslationDb {
    /// 打开或创建数据库
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;

        // 预先建表，后续的只读事务不必处理"表不存在"
        let wtx = db.begin_write()?;
        {
            wtx.open_table(CACHE_TABLE)?;
            wtx.open_table(RETRY_TABLE)?;
        }
        wtx.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// 取得翻译缓存存储
    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(Arc::clone(&self.db))
    }

    /// 取得重试队列存储（默认退避上限）
    pub fn retry_queue(&self) -> RetryQueueStore {
        RetryQueueStore::new(Arc::clone(&self.db), DEFAULT_BACKOFF_CAP_SECS)
    }

    /// 取得重试队列存储，并指定退避上限（秒）
    pub fn retry_queue_with_cap(&self, backoff_cap_secs: u64) -> RetryQueueStore {
        RetryQueueStore::new(Arc::clone(&self.db), backoff_cap_secs)
    }
}
