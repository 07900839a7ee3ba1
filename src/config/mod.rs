// ==========================================
// 柔性制造单元自动排产系统 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod autopilot_config;
pub mod config_manager;

// 重导出核心配置管理器
pub use autopilot_config::{AutopilotConfig, SetupCostModel, ToolPolicy, MAX_IGNORE_TTL_HOURS};
pub use config_manager::{config_keys, ConfigManager};
