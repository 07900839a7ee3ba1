// ==========================================
// 柔性制造单元自动排产系统 - 引擎层错误类型
// ==========================================

use crate::provider::ProviderError;
use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// 班次表或配置不合法（启动即失败）
    #[error("配置错误: {0}")]
    Config(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type EngineResult<T> = Result<T, EngineError>;
