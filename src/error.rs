//! 统一错误处理
//!
//! 提供结构化错误类型：远程 API 调用结果的分类（瞬时/永久）、
//! 存储层错误以及顶层错误类型。

use thiserror::Error;

/// 远程翻译 API 的失败分类
///
/// 瞬时错误（限流、网络异常）在同步路径上本地退避重试，
/// 永久错误（非 2xx 的客户端错误）中止本地重试；两类最终都会
/// 进入持久重试队列，由后台工作器统一处理。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 请求过于频繁（HTTP 429）
    #[error("429 Too Many Requests")]
    RateLimited,

    /// 非限流的 API 错误响应
    #[error("API 错误 [{status}]: {body}")]
    Api { status: u16, body: String },

    /// 连接/传输异常
    #[error("连接异常: {0}")]
    Transport(String),
}

impl ApiError {
    /// 检查错误是否为瞬时错误（值得立即本地重试）
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited => true,
            ApiError::Transport(_) => true,
            ApiError::Api { .. } => false,
        }
    }
}

/// 存储层错误
///
/// 缓存或重试队列的底层数据库失败。此类错误必须向上传播并高声
/// 记录，绝不能与"翻译失败"混为一谈。
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("打开数据库失败: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("数据库事务失败: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("打开数据表失败: {0}")]
    Table(#[from] redb::TableError),

    #[error("数据库读写失败: {0}")]
    Backend(#[from] redb::StorageError),

    #[error("提交事务失败: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("记录编码失败: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 顶层错误类型
#[derive(Error, Debug)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 远程 API 错误
    #[error("翻译 API 错误: {0}")]
    Api(#[from] ApiError),
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML 解析错误: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ApiError::RateLimited.is_transient());
        assert!(ApiError::Transport("connection reset".into()).is_transient());
        assert!(!ApiError::Api {
            status: 400,
            body: "bad request".into()
        }
        .is_transient());
    }
}
