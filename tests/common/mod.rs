#![allow(dead_code)]

//! 集成测试公共辅助
//!
//! 提供临时数据库环境与脚本化的翻译器替身。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use subtrans::{ApiError, Lexicon, Translator, TranslationDb};

/// 临时数据库环境，随测试结束一起清理
pub struct TestEnvironment {
    pub db: TranslationDb,
    _dir: tempfile::TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = TranslationDb::open(dir.path().join("cache.redb")).unwrap();
        Self { db, _dir: dir }
    }
}

/// 按脚本逐次返回预设结果的翻译器
///
/// 脚本耗尽后返回固定的兜底结果，调用次数可查询。
pub struct ScriptedTranslator {
    script: Mutex<VecDeque<Result<String, ApiError>>>,
    fallback: Result<String, ApiError>,
    calls: AtomicU32,
}

impl ScriptedTranslator {
    pub fn new(script: Vec<Result<String, ApiError>>) -> Arc<Self> {
        Self::with_fallback(script, Err(ApiError::Transport("脚本耗尽".to_string())))
    }

    /// 每次调用都返回同一结果
    pub fn always(result: Result<String, ApiError>) -> Arc<Self> {
        Self::with_fallback(Vec::new(), result)
    }

    pub fn with_fallback(
        script: Vec<Result<String, ApiError>>,
        fallback: Result<String, ApiError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate_once(
        &self,
        _text: &str,
        _lexicon: Option<&Lexicon>,
        _context: Option<&str>,
    ) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// 轮询等待条件成立，约两秒后超时失败
pub async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("等待超时: {}", description);
}
