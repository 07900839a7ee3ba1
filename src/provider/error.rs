// ==========================================
// 柔性制造单元自动排产系统 - 数据提供者错误类型
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("数据提供者超时: {provider} ({timeout_ms}ms)")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("数据提供者不可用: {provider}: {message}")]
    Unavailable { provider: String, message: String },
}

impl ProviderError {
    pub fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Unavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider, .. } => provider,
            ProviderError::Unavailable { provider, .. } => provider,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
