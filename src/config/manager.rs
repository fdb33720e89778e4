//! 配置加载与环境变量覆盖

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::error::{TranslationError, TranslationResult};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // 远程 API
    pub api_key: String,
    pub api_base: String,
    pub model: String,

    // 同步路径
    pub max_immediate_attempts: u32,
    pub backoff_cap_seconds: u64,
    pub lexicon_max_chars: usize,

    // 重试工作器
    pub poll_interval_seconds: f64,
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub batch_size: usize,
    pub shutdown_grace_seconds: u64,

    // 数据路径
    pub db_path: String,
    pub lexicon_path: String,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: constants::DEFAULT_API_BASE.to_string(),
            model: constants::DEFAULT_MODEL.to_string(),

            max_immediate_attempts: constants::DEFAULT_MAX_IMMEDIATE_ATTEMPTS,
            backoff_cap_seconds: constants::DEFAULT_BACKOFF_CAP_SECS,
            lexicon_max_chars: constants::DEFAULT_LEXICON_MAX_CHARS,

            poll_interval_seconds: constants::DEFAULT_POLL_INTERVAL_SECONDS,
            max_concurrency: constants::DEFAULT_MAX_CONCURRENCY,
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            shutdown_grace_seconds: constants::DEFAULT_SHUTDOWN_GRACE_SECS,

            db_path: constants::DEFAULT_DB_PATH.to_string(),
            lexicon_path: constants::DEFAULT_LEXICON_PATH.to_string(),
            log_dir: constants::DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl AppConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.max_concurrency == 0 {
            return Err(TranslationError::ConfigError(
                "最大并发数不能为0".to_string(),
            ));
        }
        if self.poll_interval_seconds <= 0.0 {
            return Err(TranslationError::ConfigError(
                "轮询间隔必须大于0".to_string(),
            ));
        }
        if self.backoff_cap_seconds == 0 {
            return Err(TranslationError::ConfigError(
                "退避上限必须大于0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TranslationError::ConfigError(
                "批次大小不能为0".to_string(),
            ));
        }
        Ok(())
    }

    /// 应用环境变量覆盖
    ///
    /// 变量名沿用既有部署：`deepseek_api_key`、`deepseek_api_url`、
    /// `deepseek_model`、`RETRY_REQUEST_INTERVAL_SECONDS`、
    /// `RETRY_MAX_CONCURRENCY`、`RETRY_MAX_ATTEMPTS`、
    /// `LEXICON_MAX_CHARS`；路径类用 `SUBTRANS_` 前缀。
    /// 无法解析的数值保留原值。
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("deepseek_api_key") {
            self.api_key = key;
        }
        if let Ok(url) = std::env::var("deepseek_api_url") {
            tracing::info!("环境变量覆盖 API 地址: {}", url);
            self.api_base = url;
        }
        if let Ok(model) = std::env::var("deepseek_model") {
            self.model = model;
        }

        if let Some(interval) = parse_env::<f64>("RETRY_REQUEST_INTERVAL_SECONDS") {
            self.poll_interval_seconds = interval;
        }
        if let Some(concurrency) = parse_env::<usize>("RETRY_MAX_CONCURRENCY") {
            self.max_concurrency = concurrency;
        }
        if let Some(attempts) = parse_env::<u32>("RETRY_MAX_ATTEMPTS") {
            self.max_attempts = attempts;
        }
        if let Some(max_chars) = parse_env::<usize>("LEXICON_MAX_CHARS") {
            self.lexicon_max_chars = max_chars;
        }

        if let Ok(path) = std::env::var("SUBTRANS_DB_PATH") {
            self.db_path = path;
        }
        if let Ok(path) = std::env::var("SUBTRANS_LEXICON_PATH") {
            self.lexicon_path = path;
        }
        if let Ok(dir) = std::env::var("SUBTRANS_LOG_DIR") {
            self.log_dir = dir;
        }
    }

    /// 轮询/节流间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_seconds)
    }

    /// 停机宽限
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// 数据库文件路径（展开 `~`）
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).as_ref())
    }

    /// 词典文件路径（展开 `~`）
    pub fn lexicon_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.lexicon_path).as_ref())
    }

    /// 日志目录（展开 `~`）
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.log_dir).as_ref())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("环境变量 {} 的值无法解析，忽略: {}", name, raw);
                None
            }
        },
        Err(_) => None,
    }
}

/// 配置管理器
///
/// 构造时依次：加载 `.env` 文件、按搜索路径读取配置文件、应用
/// 环境变量覆盖、验证。
pub struct ConfigManager {
    config: AppConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 按搜索路径加载配置文件，没有命中时使用默认配置
    fn load_config() -> TranslationResult<AppConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded);
                return Self::load_from_file(expanded.as_ref());
            }
        }
        tracing::info!("未找到配置文件，使用默认配置");
        Ok(AppConfig::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &str) -> TranslationResult<AppConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(path)))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// 加载 `.env` 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];
        for env_file in &env_files {
            if Path::new(env_file).exists() {
                if dotenv::from_filename(env_file).is_ok() {
                    tracing::info!("已加载环境变量文件: {}", env_file);
                    break;
                }
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let config = AppConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval_seconds, 1.0);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.max_attempts, 0);
        assert_eq!(config.backoff_cap_seconds, 3600);
        assert_eq!(config.max_immediate_attempts, 40);
        assert_eq!(config.api_base, "https://api.deepseek.com/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subtrans-config.toml");
        std::fs::write(&path, "max_concurrency = 4\npoll_interval_seconds = 0.5\n").unwrap();

        let loaded = ConfigManager::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.max_concurrency, 4);
        assert_eq!(loaded.poll_interval_seconds, 0.5);
        // 未写入的字段回落到默认值
        assert_eq!(loaded.max_attempts, 0);
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        std::env::set_var("RETRY_MAX_CONCURRENCY", "8");
        std::env::set_var("RETRY_MAX_ATTEMPTS", "not-a-number");

        let mut config = AppConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.max_attempts, 0); // 解析失败保留默认

        std::env::remove_var("RETRY_MAX_CONCURRENCY");
        std::env::remove_var("RETRY_MAX_ATTEMPTS");
    }
}
