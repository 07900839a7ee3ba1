// ==========================================
// 柔性制造单元自动排产系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将仓储/引擎/提供者错误转换为调用方可处理的错误
// 约定: 错误信息必须包含显式原因
// ==========================================

use crate::engine::EngineError;
use crate::provider::ProviderError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方错误
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("状态冲突: {0}")]
    Conflict(String),

    // ==========================================
    // 外部依赖错误
    // ==========================================
    #[error("数据提供者不可用: {message}")]
    ProviderUnavailable { message: String, retryable: bool },

    // ==========================================
    // 配置错误
    // ==========================================
    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    /// 调用方是否可以稍后重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::ProviderUnavailable { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { entity, id, message } => {
                ApiError::Conflict(format!("{}(id={}) {}", entity, id, message))
            }
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::Conflict(format!("唯一约束违反: {}", msg))
            }

            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::DatabaseError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }

            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 ProviderError 转换
// ==========================================
impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::ProviderUnavailable {
            message: err.to_string(),
            retryable: true,
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(msg) => ApiError::ConfigError(msg),
            EngineError::Validation(msg) => ApiError::ValidationError(msg),
            EngineError::Provider(e) => e.into(),
            EngineError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
