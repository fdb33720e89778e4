//! 持久重试队列
//!
//! 记录远程翻译失败的键、累计尝试次数与下次重试时间。队列在进程
//! 重启后仍然存在，由后台工作器按到期顺序逐步消化。退避按
//! `min(2^attempts, cap)` 指数增长，`attempts` 单调不减，
//! `next_try_at` 随每次失败严格后移（直到达到上限）。

use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};

use super::RETRY_TABLE;
use crate::error::StorageError;

/// 默认退避上限：一小时
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 3600;

/// 重试队列条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryItem {
    /// 原文，与缓存键同域
    pub key: String,
    /// 已记录的失败尝试次数，单调不减
    pub attempts: u32,
    /// 下次允许重试的时间（epoch 秒）；`None` 表示立即到期
    pub next_try_at: Option<i64>,
    /// 最近一次失败的错误描述
    pub last_error: String,
    /// 入队时间（epoch 秒），一经写入不再变化
    pub added_at: i64,
}

/// 重试队列存储
pub struct RetryQueueStore {
    db: Arc<Database>,
    backoff_cap_secs: u64,
}

impl RetryQueueStore {
    pub(crate) fn new(db: Arc<Database>, backoff_cap_secs: u64) -> Self {
        Self {
            db,
            backoff_cap_secs,
        }
    }

    /// 入队一个失败的键
    ///
    /// 新键以 `attempts = 0`、`next_try_at = now` 入队。键已存在时
    /// 只刷新 `last_error`：重复的同步路径失败不会重置尝试计数、
    /// 入队时间或已排定的退避时间，入队因此是幂等的。
    pub fn enqueue(&self, key: &str, error: &str) -> Result<(), StorageError> {
        let now = Utc::now().timestamp();
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(RETRY_TABLE)?;
            let existing = match table.get(key)? {
                Some(raw) => Some(serde_json::from_slice::<RetryItem>(raw.value())?),
                None => None,
            };
            let item = match existing {
                Some(mut prev) => {
                    prev.last_error = error.to_string();
                    prev
                }
                None => RetryItem {
                    key: key.to_string(),
                    attempts: 0,
                    next_try_at: Some(now),
                    last_error: error.to_string(),
                    added_at: now,
                },
            };
            let encoded = serde_json::to_vec(&item)?;
            table.insert(key, encoded.as_slice())?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// 返回当前到期的条目，按 `next_try_at` 升序，键名决出平局
    pub fn due_items(&self, limit: usize) -> Result<Vec<RetryItem>, StorageError> {
        self.due_items_at(Utc::now().timestamp(), limit)
    }

    /// 返回在 `now` 时刻到期的条目，只读不修改
    ///
    /// 显式传入时间戳，测试与运维检查可以在不等待真实时钟的情况
    /// 下观察退避排程。
    pub fn due_items_at(&self, now: i64, limit: usize) -> Result<Vec<RetryItem>, StorageError> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(RETRY_TABLE)?;
        let mut due = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            let item: RetryItem = serde_json::from_slice(value.value())?;
            if item.next_try_at.map_or(true, |ts| ts <= now) {
                due.push(item);
            }
        }
        due.sort_by(|a, b| {
            let ta = a.next_try_at.unwrap_or(i64::MIN);
            let tb = b.next_try_at.unwrap_or(i64::MIN);
            ta.cmp(&tb).then_with(|| a.key.cmp(&b.key))
        });
        due.truncate(limit);
        Ok(due)
    }

    /// 记录一次失败尝试并排定下次重试时间
    ///
    /// `attempts` 加一后计算退避：优先使用 `backoff_override`，否则
    /// `min(2^attempts, cap)` 秒。行不存在时以 `attempts = 1` 创建。
    pub fn record_failure(
        &self,
        key: &str,
        error: &str,
        backoff_override: Option<u64>,
    ) -> Result<(), StorageError> {
        let now = Utc::now().timestamp();
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(RETRY_TABLE)?;
            let existing = match table.get(key)? {
                Some(raw) => Some(serde_json::from_slice::<RetryItem>(raw.value())?),
                None => None,
            };
            let (attempts, added_at) = match &existing {
                Some(prev) => (prev.attempts + 1, prev.added_at),
                None => (1, now),
            };
            let backoff = backoff_override
                .unwrap_or_else(|| 2u64.saturating_pow(attempts).min(self.backoff_cap_secs));
            let item = RetryItem {
                key: key.to_string(),
                attempts,
                next_try_at: Some(now + backoff as i64),
                last_error: error.to_string(),
                added_at,
            };
            let encoded = serde_json::to_vec(&item)?;
            table.insert(key, encoded.as_slice())?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// 删除条目；不存在时为无操作
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(RETRY_TABLE)?;
            table.remove(key)?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// 读取单个条目
    pub fn get(&self, key: &str) -> Result<Option<RetryItem>, StorageError> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(RETRY_TABLE)?;
        match table.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(raw.value())?)),
            None => Ok(None),
        }
    }

    /// 队列中的条目总数（含未到期的）
    pub fn len(&self) -> Result<u64, StorageError> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(RETRY_TABLE)?;
        let mut count = 0;
        for row in table.iter()? {
            row?;
            count += 1;
        }
        Ok(count)
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::storage::{RetryQueueStore, TranslationDb};

    fn open_queue() -> (tempfile::TempDir, RetryQueueStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = TranslationDb::open(dir.path().join("cache.redb")).unwrap();
        let queue = db.retry_queue();
        (dir, queue)
    }

    #[test]
    fn enqueue_then_remove_never_due() {
        let (_dir, queue) = open_queue();

        queue.enqueue("A", "timeout").unwrap();
        assert!(queue.due_items(10).unwrap().iter().any(|i| i.key == "A"));

        queue.remove("A").unwrap();
        assert!(queue.due_items(10).unwrap().is_empty());

        // 幂等删除
        queue.remove("A").unwrap();
        assert_eq!(queue.len().unwrap(), 0);
    }

    #[test]
    fn enqueue_is_idempotent_for_existing_rows() {
        let (_dir, queue) = open_queue();

        queue.enqueue("A", "timeout").unwrap();
        queue.record_failure("A", "timeout", None).unwrap();
        let first = queue.get("A").unwrap().unwrap();

        queue.enqueue("A", "connection reset").unwrap();
        let second = queue.get("A").unwrap().unwrap();

        assert_eq!(second.attempts, first.attempts);
        assert_eq!(second.added_at, first.added_at);
        assert_eq!(second.next_try_at, first.next_try_at);
        assert_eq!(second.last_error, "connection reset");
    }

    #[test]
    fn record_failure_schedules_backoff() {
        let (_dir, queue) = open_queue();
        let now = Utc::now().timestamp();

        queue.enqueue("A", "timeout").unwrap();
        assert!(queue.due_items(10).unwrap().iter().any(|i| i.key == "A"));

        queue.record_failure("A", "timeout", None).unwrap();
        // 第一次失败：退避 2 秒，当前不再到期
        assert!(queue.due_items(10).unwrap().is_empty());
        // 时钟越过退避后重新到期
        let due = queue.due_items_at(now + 3, 10).unwrap();
        assert!(due.iter().any(|i| i.key == "A"));
    }

    #[test]
    fn backoff_is_monotonic_until_cap() {
        let dir = tempfile::tempdir().unwrap();
        let db = TranslationDb::open(dir.path().join("cache.redb")).unwrap();
        let queue = db.retry_queue_with_cap(16);

        queue.enqueue("A", "timeout").unwrap();
        let mut prev_next_try = 0;
        let mut prev_attempts = 0;
        for round in 1..=8 {
            queue.record_failure("A", "timeout", None).unwrap();
            let item = queue.get("A").unwrap().unwrap();
            assert_eq!(item.attempts, round);
            assert!(item.attempts > prev_attempts);
            let next_try = item.next_try_at.unwrap();
            assert!(next_try >= prev_next_try);
            prev_next_try = next_try;
            prev_attempts = item.attempts;
        }
        // 2^8 远超上限 16：排程被截断在 now + cap 附近
        let item = queue.get("A").unwrap().unwrap();
        let lead = item.next_try_at.unwrap() - Utc::now().timestamp();
        assert!(lead <= 16 + 1);
    }

    #[test]
    fn record_failure_creates_missing_row() {
        let (_dir, queue) = open_queue();

        queue.record_failure("B", "HTTP 500", None).unwrap();
        let item = queue.get("B").unwrap().unwrap();
        assert_eq!(item.attempts, 1);
        assert_eq!(item.last_error, "HTTP 500");
    }

    #[test]
    fn backoff_override_takes_precedence() {
        let (_dir, queue) = open_queue();

        queue.record_failure("A", "timeout", Some(0)).unwrap();
        // 覆盖为 0 秒：立即到期
        assert!(queue.due_items(10).unwrap().iter().any(|i| i.key == "A"));
    }

    #[test]
    fn due_items_ordered_and_limited() {
        let (_dir, queue) = open_queue();
        let now = Utc::now().timestamp();

        queue.enqueue("b", "e1").unwrap();
        queue.enqueue("a", "e2").unwrap();
        queue.enqueue("c", "e3").unwrap();
        queue.record_failure("c", "e3", Some(1)).unwrap();

        // 全部到期；c 的退避排程使其排在最后
        let due = queue.due_items_at(now + 2, 10).unwrap();
        assert_eq!(due.len(), 3);
        assert_eq!(due.last().unwrap().key, "c");
        // 序列满足 (next_try_at, key) 升序
        for pair in due.windows(2) {
            let ta = pair[0].next_try_at.unwrap_or(i64::MIN);
            let tb = pair[1].next_try_at.unwrap_or(i64::MIN);
            assert!((ta, pair[0].key.as_str()) <= (tb, pair[1].key.as_str()));
        }

        let due = queue.due_items_at(now + 2, 2).unwrap();
        assert_eq!(due.len(), 2);
    }
}
