// ==========================================
// 柔性制造单元自动排产系统 - 引擎层
// ==========================================
// 职责: 实现排产与派工规则，不拼 SQL
// 红线: Engine 不拼 SQL, 所有排除必须输出 reason
// ==========================================

pub mod action_plan;
pub mod candidate;
pub mod dispatcher;
pub mod error;
pub mod planner;
pub mod repositories;
pub mod scoring;
pub mod shift_window;

// 重导出核心引擎
pub use candidate::{CandidateGenerator, GenerationResult};
pub use dispatcher::Dispatcher;
pub use error::{EngineError, EngineResult};
pub use planner::{MachineQueueSummary, Planner, RefreshSummary};
pub use repositories::AutopilotRepositories;
pub use scoring::{compare_scored, CandidateScorer, ScoringCosts};
pub use shift_window::{default_shift_windows, ShiftWindowResolver, ShiftWindowTable};
