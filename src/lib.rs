// ==========================================
// 柔性制造单元自动排产系统 - 核心库
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 滚动排产与派工决策支持（人工最终控制权）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 外部数据提供者层 - 只读接口与超时门面
pub mod provider;

// 引擎层 - 排产与派工规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    ActionPlan, BacklogJob, Decision, JobIgnore, JobRef, MachineStatus, NextSuggestion, PlanBatch,
    PlannedJob, SetupSession, ShiftWindow,
};

// 引擎
pub use engine::{CandidateGenerator, CandidateScorer, Dispatcher, Planner, ShiftWindowTable};

// API
pub use api::{ApiError, ApiResult, AutopilotApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "柔性制造单元自动排产系统";
