//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。配额用尽不是错误：它是一个正常的
//! `allowed = false` 结果，只有配置错误和存储故障才会走错误通道。

use thiserror::Error;

/// UsageGuard 错误类型
#[derive(Error, Debug)]
pub enum UsageGuardError {
    /// 配置错误（启动时致命，请求时不可恢复）
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 存储错误
    #[error("存储错误: {0}")]
    StorageError(#[from] StorageError),

    /// 验证错误
    #[error("验证错误: {0}")]
    ValidationError(String),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl UsageGuardError {
    /// 判断错误是否可重试
    ///
    /// 瞬时存储故障（连接、超时）可以重试，调用方应向用户展示
    /// “请稍后重试”而不是“请升级套餐”。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UsageGuardError::StorageError(
                StorageError::ConnectionError(_) | StorageError::TimeoutError(_)
            )
        )
    }
}

/// 存储错误
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 未找到
    #[error("未找到: {0}")]
    NotFound(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StorageError::QueryError(db_err.to_string()),
            sqlx::Error::PoolTimedOut => StorageError::TimeoutError("连接池超时".to_string()),
            sqlx::Error::PoolClosed => StorageError::ConnectionError("连接池已关闭".to_string()),
            sqlx::Error::RowNotFound => StorageError::NotFound("记录未找到".to_string()),
            _ => StorageError::QueryError(err.to_string()),
        }
    }
}

/// 配额消费结果
///
/// `consume` 无条件记账，`success = false` 仅表示存储层确认失败；
/// 调用方不得把失败的 `consume` 当作被门控动作已经成功。
#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    /// 是否成功记账
    pub success: bool,
    /// 记账后的剩余配额（-1 表示不限量）
    pub remaining: i64,
}
