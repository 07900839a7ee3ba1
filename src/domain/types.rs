// ==========================================
// 柔性制造单元自动排产系统 - 领域类型定义
// ==========================================
// 职责: 定义状态枚举与分类枚举
// 序列化格式: 与数据库存储值一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 计划作业状态 (Planned Job Status)
// ==========================================
// 状态流转:
// planned -> dispatched -> done/cancelled
// planned -> skipped (操作员拒绝)
// planned -> cancelled (批次退役)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedJobStatus {
    Planned,    // 已计划
    Dispatched, // 已派工
    Done,       // 已完成
    Skipped,    // 已跳过
    Cancelled,  // 已取消
}

impl PlannedJobStatus {
    /// 转换为数据库存储值
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlannedJobStatus::Planned => "planned",
            PlannedJobStatus::Dispatched => "dispatched",
            PlannedJobStatus::Done => "done",
            PlannedJobStatus::Skipped => "skipped",
            PlannedJobStatus::Cancelled => "cancelled",
        }
    }

    /// 从数据库存储值解析（未知值按 cancelled 处理，不参与派工）
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "planned" => PlannedJobStatus::Planned,
            "dispatched" => PlannedJobStatus::Dispatched,
            "done" => PlannedJobStatus::Done,
            "skipped" => PlannedJobStatus::Skipped,
            _ => PlannedJobStatus::Cancelled,
        }
    }
}

impl fmt::Display for PlannedJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 计划批次状态 (Plan Batch Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanBatchStatus {
    Current, // 当前生效
    Retired, // 已退役
}

impl PlanBatchStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanBatchStatus::Current => "CURRENT",
            PlanBatchStatus::Retired => "RETIRED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "CURRENT" => PlanBatchStatus::Current,
            _ => PlanBatchStatus::Retired,
        }
    }
}

impl fmt::Display for PlanBatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 托盘加工阶段 (Pallet Phase)
// ==========================================
// Machining 阶段的托盘不可用于新作业
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PalletPhase {
    #[default]
    Idle,      // 空闲
    Machining, // 加工中
    Finished,  // 加工完成，待卸件
}

impl fmt::Display for PalletPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PalletPhase::Idle => write!(f, "IDLE"),
            PalletPhase::Machining => write!(f, "MACHINING"),
            PalletPhase::Finished => write!(f, "FINISHED"),
        }
    }
}

// ==========================================
// 夹具变更类型 (Fixture Change)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixtureChange {
    Keep,  // 已安装所需夹具，仅核对
    Mount, // 托盘无夹具，直接安装
    Swap,  // 拆除现有夹具后安装
}

impl fmt::Display for FixtureChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureChange::Keep => write!(f, "KEEP"),
            FixtureChange::Mount => write!(f, "MOUNT"),
            FixtureChange::Swap => write!(f, "SWAP"),
        }
    }
}

// ==========================================
// 操作步骤类型 (Action Step Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStepType {
    UnloadPart,      // 卸下成品
    VerifyFixture,   // 核对夹具
    UnmountFixture,  // 拆除夹具
    MountFixture,    // 安装夹具
    LoadRawMaterial, // 装载毛坯
}

impl fmt::Display for ActionStepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStepType::UnloadPart => write!(f, "UNLOAD_PART"),
            ActionStepType::VerifyFixture => write!(f, "VERIFY_FIXTURE"),
            ActionStepType::UnmountFixture => write!(f, "UNMOUNT_FIXTURE"),
            ActionStepType::MountFixture => write!(f, "MOUNT_FIXTURE"),
            ActionStepType::LoadRawMaterial => write!(f, "LOAD_RAW_MATERIAL"),
        }
    }
}

// ==========================================
// 拒绝范围 (Refuse Scope)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefuseScope {
    #[default]
    Job,    // 屏蔽该作业的所有托盘组合
    Pallet, // 仅屏蔽该作业与该机床托盘的组合
}

// ==========================================
// 作业完成结果 (Completion Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionOutcome {
    Done,
    Cancelled,
}

impl CompletionOutcome {
    pub fn to_status(&self) -> PlannedJobStatus {
        match self {
            CompletionOutcome::Done => PlannedJobStatus::Done,
            CompletionOutcome::Cancelled => PlannedJobStatus::Cancelled,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "done" => Some(CompletionOutcome::Done),
            "cancelled" | "canceled" => Some(CompletionOutcome::Cancelled),
            _ => None,
        }
    }
}

// ==========================================
// 无建议原因 (No Suggestion Reason)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoSuggestionReason {
    NoCurrentPlan,       // 尚无生效计划批次
    NoMachinesAvailable, // 所有机床不可用
    NoFeasibleJob,       // 有机床可用但无可行作业
}

impl fmt::Display for NoSuggestionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoSuggestionReason::NoCurrentPlan => write!(f, "NO_CURRENT_PLAN"),
            NoSuggestionReason::NoMachinesAvailable => write!(f, "NO_MACHINES_AVAILABLE"),
            NoSuggestionReason::NoFeasibleJob => write!(f, "NO_FEASIBLE_JOB"),
        }
    }
}
