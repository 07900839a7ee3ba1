// ==========================================
// 柔性制造单元自动排产系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 所有仓储共享同一 Arc<Mutex<Connection>>
// ==========================================

pub mod decision_repo;
pub mod error;
pub mod ignore_repo;
pub mod machine_status_repo;
pub mod plan_batch_repo;
pub mod setup_session_repo;
pub mod shift_window_repo;

// 重导出核心仓储
pub use decision_repo::DecisionRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use ignore_repo::JobIgnoreRepository;
pub use machine_status_repo::MachineStatusRepository;
pub use plan_batch_repo::PlanBatchRepository;
pub use setup_session_repo::SetupSessionRepository;
pub use shift_window_repo::ShiftWindowRepository;
