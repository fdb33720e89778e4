//! 翻译缓存存储
//!
//! 持久化的 原文 → 译文 映射，带命中计数。命中计数只增不减，
//! `created_at` 一经写入不再变化；覆盖写入保留原有的计数与创建
//! 时间。任何底层存储失败都作为 [`StorageError`] 向上传播。

use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};

use super::CACHE_TABLE;
use crate::error::StorageError;

/// 缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 修剪后的原文，同时是表键
    pub key: String,
    /// 译文
    pub translation: String,
    /// 命中次数，首次写入为 1，此后只增
    pub hit_count: u64,
    /// 创建时间（epoch 秒），一经写入不再变化
    pub created_at: i64,
    /// 最近一次命中或覆盖的时间（epoch 秒）
    pub updated_at: i64,
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 条目总数
    pub entries: u64,
    /// 总命中次数
    pub total_hits: u64,
}

/// 翻译缓存存储
pub struct CacheStore {
    db: Arc<Database>,
}

impl CacheStore {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 查询译文
    ///
    /// 命中时在同一个写事务内将 `hit_count` 加一并刷新
    /// `updated_at`。未命中返回 `Ok(None)`，不是错误。
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let wtx = self.db.begin_write()?;
        let translation = {
            let mut table = wtx.open_table(CACHE_TABLE)?;
            let existing = match table.get(key)? {
                Some(raw) => Some(serde_json::from_slice::<CacheEntry>(raw.value())?),
                None => None,
            };
            match existing {
                Some(mut entry) => {
                    entry.hit_count += 1;
                    entry.updated_at = Utc::now().timestamp();
                    let encoded = serde_json::to_vec(&entry)?;
                    table.insert(key, encoded.as_slice())?;
                    Some(entry.translation)
                }
                None => None,
            }
        };
        wtx.commit()?;
        Ok(translation)
    }

    /// 写入译文（upsert）
    ///
    /// 键已存在时替换译文、刷新 `updated_at`，保留 `hit_count`
    /// 与 `created_at`；新键以 `hit_count = 1` 创建。
    pub fn put(&self, key: &str, translation: &str) -> Result<(), StorageError> {
        let now = Utc::now().timestamp();
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(CACHE_TABLE)?;
            let previous = match table.get(key)? {
                Some(raw) => Some(serde_json::from_slice::<CacheEntry>(raw.value())?),
                None => None,
            };
            let entry = match previous {
                Some(prev) => CacheEntry {
                    key: prev.key,
                    translation: translation.to_string(),
                    hit_count: prev.hit_count,
                    created_at: prev.created_at,
                    updated_at: now,
                },
                None => CacheEntry {
                    key: key.to_string(),
                    translation: translation.to_string(),
                    hit_count: 1,
                    created_at: now,
                    updated_at: now,
                },
            };
            let encoded = serde_json::to_vec(&entry)?;
            table.insert(key, encoded.as_slice())?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// 读取完整条目，不改变命中计数
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(CACHE_TABLE)?;
        match table.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(raw.value())?)),
            None => Ok(None),
        }
    }

    /// 统计条目总数与总命中次数，只读不修改
    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(CACHE_TABLE)?;
        let mut stats = CacheStats::default();
        for row in table.iter()? {
            let (_, value) = row?;
            let entry: CacheEntry = serde_json::from_slice(value.value())?;
            stats.entries += 1;
            stats.total_hits += entry.hit_count;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::TranslationDb;

    fn open_db() -> (tempfile::TempDir, TranslationDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = TranslationDb::open(dir.path().join("cache.redb")).unwrap();
        (dir, db)
    }

    #[test]
    fn miss_returns_none_without_side_effects() {
        let (_dir, db) = open_db();
        let cache = db.cache_store();

        assert_eq!(cache.get("こんにちは").unwrap(), None);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_hits, 0);
    }

    #[test]
    fn hit_increments_count() {
        let (_dir, db) = open_db();
        let cache = db.cache_store();

        cache.put("こんにちは", "你好").unwrap();
        assert_eq!(cache.get("こんにちは").unwrap(), Some("你好".to_string()));
        assert_eq!(cache.get("こんにちは").unwrap(), Some("你好".to_string()));

        let entry = cache.entry("こんにちは").unwrap().unwrap();
        assert_eq!(entry.hit_count, 3); // 初始 1 + 两次命中
        assert!(entry.updated_at >= entry.created_at);
    }

    #[test]
    fn put_overwrites_preserving_hits_and_created_at() {
        let (_dir, db) = open_db();
        let cache = db.cache_store();

        cache.put("ありがとう", "谢谢").unwrap();
        cache.get("ありがとう").unwrap();
        let first = cache.entry("ありがとう").unwrap().unwrap();

        cache.put("ありがとう", "多谢").unwrap();
        let second = cache.entry("ありがとう").unwrap().unwrap();

        assert_eq!(second.translation, "多谢");
        assert_eq!(second.hit_count, first.hit_count);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        // 覆盖不是重建：条目数不变
        assert_eq!(cache.stats().unwrap().entries, 1);
    }

    #[test]
    fn stats_aggregates_entries_and_hits() {
        let (_dir, db) = open_db();
        let cache = db.cache_store();

        cache.put("一", "one").unwrap();
        cache.put("二", "two").unwrap();
        cache.get("一").unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_hits, 3); // 1 + 1 初始，再加一次命中
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        {
            let db = TranslationDb::open(&path).unwrap();
            db.cache_store().put("こんにちは", "你好").unwrap();
        }
        let db = TranslationDb::open(&path).unwrap();
        assert_eq!(
            db.cache_store().get("こんにちは").unwrap(),
            Some("你好".to_string())
        );
    }
}
