// ==========================================
// 柔性制造单元自动排产系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供命令行与外部触发器调用
// ==========================================

pub mod autopilot_api;
pub mod error;

// 重导出核心类型
pub use autopilot_api::{AutopilotApi, CurrentPlan, MachineAvailability, DEFAULT_SETUP_TYPE};
pub use error::{ApiError, ApiResult};
