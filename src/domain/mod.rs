// ==========================================
// 柔性制造单元自动排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod control;
pub mod decision;
pub mod job;
pub mod plan;
pub mod resource;
pub mod shift;
pub mod types;

// 重导出核心类型
pub use control::{
    IgnoreSet, JobIgnore, MachineStatus, NewJobIgnore, NewSetupSession, SetupSession,
};
pub use decision::{
    ActionPlan, ActionPlanStep, Alternative, Decision, DroppedCandidate, FixtureHardware,
    NewDecision, NextSuggestion, Suggestion,
};
pub use job::{BacklogJob, JobRef};
pub use plan::{
    BlockedJob, Candidate, NewPlannedJob, PlanBatch, PlannedJob, ScoreBreakdown, ScoredCandidate,
};
pub use resource::{
    ConstraintSnapshot, FixtureOption, FixtureStock, MachinePalletState, MaterialPalletState,
    NcProgram, ToolRequirement, ToolState,
};
pub use shift::{ShiftWeights, ShiftWindow};
pub use types::{
    ActionStepType, CompletionOutcome, FixtureChange, NoSuggestionReason, PalletPhase,
    PlanBatchStatus, PlannedJobStatus, RefuseScope,
};
