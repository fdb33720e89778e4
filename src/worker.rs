//! 后台重试工作器
//!
//! 单个轮询循环：POLL（取到期条目）→ DISPATCH（派发进有界工作
//! 池）→ SLEEP（一个间隔），如此往复直到收到停止信号。派发之间
//! 还会按同一间隔节流：节流限制对远端的突发请求率，与并发上限
//! 各自独立。工作器与同步路径共享持久存储，彼此解耦，同步路径
//! 失败后立刻返回，最终一致性由这里保证。
//!
//! 工作器是显式持有的对象：`start()` 幂等（原子初始化检查），
//! `stop()` 发出停止信号并限时等待在飞任务，测试可以确定性地
//! 启停。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::api::Translator;
use crate::config::{constants, AppConfig};
use crate::error::StorageError;
use crate::service::FAILED_SENTINEL;
use crate::storage::{CacheStore, RetryItem, RetryQueueStore, TranslationDb};

/// 工作器配置
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// 轮询间隔，同时是派发节流间隔
    pub poll_interval: Duration,
    /// 工作池并发上限
    pub max_concurrency: usize,
    /// 持久重试次数上限；0 表示不设上限
    pub max_attempts: u32,
    /// 每轮取出的到期条目数
    pub batch_size: usize,
    /// 退避上限（秒）
    pub backoff_cap_secs: u64,
    /// 停机时等待在飞任务的宽限
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(constants::DEFAULT_POLL_INTERVAL_SECONDS),
            max_concurrency: constants::DEFAULT_MAX_CONCURRENCY,
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            backoff_cap_secs: constants::DEFAULT_BACKOFF_CAP_SECS,
            shutdown_grace: Duration::from_secs(constants::DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl WorkerConfig {
    /// 从应用配置派生
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_concurrency: config.max_concurrency.max(1),
            max_attempts: config.max_attempts,
            batch_size: config.batch_size,
            backoff_cap_secs: config.backoff_cap_seconds,
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// 后台重试工作器
pub struct RetryWorker<T: Translator + 'static> {
    inner: Arc<WorkerInner<T>>,
    started: AtomicBool,
    control: Mutex<Option<WorkerControl>>,
}

struct WorkerControl {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct WorkerInner<T> {
    cache: CacheStore,
    queue: RetryQueueStore,
    translator: Arc<T>,
    config: WorkerConfig,
    /// 正在处理中的键：同一键在上一次尝试完成前不重复派发
    in_flight: DashSet<String>,
}

impl<T: Translator + 'static> RetryWorker<T> {
    /// 创建工作器（不启动）
    pub fn new(db: &TranslationDb, translator: Arc<T>, config: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                cache: db.cache_store(),
                queue: db.retry_queue_with_cap(config.backoff_cap_secs),
                translator,
                config,
                in_flight: DashSet::new(),
            }),
            started: AtomicBool::new(false),
            control: Mutex::new(None),
        }
    }

    /// 启动后台循环（幂等）
    ///
    /// 必须在 tokio 运行时内调用。已在运行时返回 `false`。
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("重试工作器已在运行，忽略重复启动");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_loop(inner, shutdown_rx));

        *self.control.lock().unwrap() = Some(WorkerControl {
            shutdown_tx,
            handle,
        });
        true
    }

    /// 停止后台循环
    ///
    /// 发出停止信号，循环在下一个检查点退出；在飞任务在宽限期内
    /// 被等待而不是被丢弃。停止后可以再次 `start()`。
    pub async fn stop(&self) {
        let control = self.control.lock().unwrap().take();
        let Some(control) = control else {
            return;
        };

        let _ = control.shutdown_tx.send(true);

        // 循环自身还会用宽限期等待在飞任务，再留一个轮询间隔的余量
        let wait = self.inner.config.shutdown_grace
            + self.inner.config.poll_interval
            + Duration::from_millis(100);
        if timeout(wait, control.handle).await.is_err() {
            tracing::warn!("重试工作器未在宽限期内退出");
        }
        self.started.store(false, Ordering::SeqCst);
    }

    /// 工作器是否已启动
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// 轮询主循环
async fn run_loop<T: Translator + 'static>(
    inner: Arc<WorkerInner<T>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let max_attempts_display = if inner.config.max_attempts == 0 {
        "∞".to_string()
    } else {
        inner.config.max_attempts.to_string()
    };
    tracing::info!(
        "重试工作线程已启动 (间隔 {:?}, max_attempts={}, concurrency={})",
        inner.config.poll_interval,
        max_attempts_display,
        inner.config.max_concurrency
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let due = match inner.queue.due_items(inner.config.batch_size) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("读取重试队列失败: {}", e);
                if wait_or_shutdown(&mut shutdown, inner.config.poll_interval).await {
                    break;
                }
                continue;
            }
        };

        if due.is_empty() {
            if wait_or_shutdown(&mut shutdown, inner.config.poll_interval).await {
                break;
            }
            continue;
        }

        for item in due {
            if *shutdown.borrow() {
                break;
            }

            // 清理已完成的任务句柄后检查并发额度；额度用尽时其余
            // 到期条目顺延到下一轮，不会丢失
            tasks.retain(|t| !t.is_finished());
            if tasks.len() >= inner.config.max_concurrency {
                break;
            }

            // 上一次尝试尚未完成的键不重复派发
            if !inner.in_flight.insert(item.key.clone()) {
                continue;
            }

            let task_inner = Arc::clone(&inner);
            tasks.push(tokio::spawn(async move {
                process_item(&task_inner, item).await;
            }));

            // 派发节流，限制对远端的突发请求率
            if wait_or_shutdown(&mut shutdown, inner.config.poll_interval).await {
                break;
            }
        }

        if wait_or_shutdown(&mut shutdown, inner.config.poll_interval).await {
            break;
        }
    }

    // 停机：限时等待在飞任务而不是丢弃
    let deadline = Instant::now() + inner.config.shutdown_grace;
    for task in tasks {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if timeout(remaining, task).await.is_err() {
            tracing::warn!("停机宽限已到，仍有重试任务未完成");
            break;
        }
    }
    tracing::info!("重试工作线程已退出");
}

/// 处理单个到期条目（在工作池任务内运行）
async fn process_item<T: Translator>(inner: &WorkerInner<T>, item: RetryItem) {
    let key = item.key.clone();
    if let Err(e) = handle_item(inner, &item).await {
        // 存储错误高声记录，条目留待下一轮，绝不当作翻译失败
        tracing::error!("处理重试项时存储出错: {} ({})", e, key);
    }
    inner.in_flight.remove(&key);
}

async fn handle_item<T: Translator>(
    inner: &WorkerInner<T>,
    item: &RetryItem,
) -> Result<(), StorageError> {
    if inner.config.max_attempts > 0 && item.attempts >= inner.config.max_attempts {
        // 持久重试次数耗尽：写入哨兵并出队，终态
        tracing::warn!("重试次数已达上限，放弃: {}", item.key);
        inner.cache.put(&item.key, FAILED_SENTINEL)?;
        inner.queue.remove(&item.key)?;
        return Ok(());
    }

    // 重试路径按设计跳过词典
    match inner.translator.translate_once(&item.key, None, None).await {
        Ok(translated) => {
            tracing::info!("重试成功，保存翻译: {}", item.key);
            inner.cache.put(&item.key, &translated)?;
            inner.queue.remove(&item.key)?;
        }
        Err(err) => {
            tracing::info!("重试失败（将安排下一次尝试）: {} -> {}", item.key, err);
            inner.queue.record_failure(&item.key, &err.to_string(), None)?;
        }
    }
    Ok(())
}

/// 睡眠一个间隔；期间收到停止信号则提前返回 `true`
///
/// 通道上只会发送停止信号，`changed()` 返回（含发送端销毁）即
/// 视为停止。
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = sleep(interval) => false,
        _ = shutdown.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_from_app_config() {
        let mut app = AppConfig::default();
        app.poll_interval_seconds = 0.25;
        app.max_concurrency = 0; // 非法值提升到 1
        app.max_attempts = 7;

        let config = WorkerConfig::from_config(&app);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.batch_size, constants::DEFAULT_BATCH_SIZE);
    }
}
