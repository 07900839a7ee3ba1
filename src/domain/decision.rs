// ==========================================
// 柔性制造单元自动排产系统 - 派工决策模型
// ==========================================
// 职责: 决策记录、操作计划、派工结果
// 红线: Decision 创建后不可修改（仅追加）
// ==========================================

use crate::domain::job::JobRef;
use crate::domain::plan::ScoreBreakdown;
use crate::domain::types::{ActionStepType, NoSuggestionReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// 操作计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanStep {
    pub step_type: ActionStepType,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// 夹具硬件清单条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureHardware {
    pub fixture_code: String,
    pub description: Option<String>,
    pub storage_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub steps: Vec<ActionPlanStep>,
    pub fixture_hardware: Vec<FixtureHardware>,
}

impl ActionPlan {
    pub fn step_types(&self) -> Vec<ActionStepType> {
        self.steps.iter().map(|s| s.step_type).collect()
    }
}

// ==========================================
// Decision - 派工决策记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: i64,
    pub created_at: DateTime<Utc>,
    pub plan_batch_id: String,
    pub planned_job_id: i64,
    pub machine_id: String,
    pub job: JobRef,
    pub machine_pallet_id: String,
    pub material_pallet_id: String,
    pub estimated_setup_minutes: f64,
    pub estimated_cycle_minutes: f64,
    pub score: ScoreBreakdown,
    pub shift_window_id: Option<i64>,
    pub action_plan: ActionPlan,
}

/// 待写入的决策（id 由数据库分配）
#[derive(Debug, Clone, PartialEq)]
pub struct NewDecision {
    pub created_at: DateTime<Utc>,
    pub plan_batch_id: String,
    pub planned_job_id: i64,
    pub machine_id: String,
    pub job: JobRef,
    pub machine_pallet_id: String,
    pub material_pallet_id: String,
    pub estimated_setup_minutes: f64,
    pub estimated_cycle_minutes: f64,
    pub score: ScoreBreakdown,
    pub shift_window_id: Option<i64>,
    pub action_plan: ActionPlan,
}

// ==========================================
// 派工结果
// ==========================================

/// 备选方案（不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub planned_job_id: i64,
    pub machine_id: String,
    pub job: JobRef,
    pub machine_pallet_id: String,
    pub material_pallet_id: String,
    pub score: ScoreBreakdown,
}

/// 派工时被剔除的计划作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub planned_job_id: i64,
    pub machine_id: String,
    pub job: JobRef,
    pub reason: String,
}

/// 建议详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub decision: Decision,
    pub alternatives: Vec<Alternative>,
    pub dropped: Vec<DroppedCandidate>,
    /// 需从中央刀库装载的刀具
    pub tools_to_load: Vec<String>,
}

/// GetNextSuggestion 的结果（无建议不是错误）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextSuggestion {
    Suggested(Box<Suggestion>),
    NoSuggestion {
        reason: NoSuggestionReason,
        dropped: Vec<DroppedCandidate>,
    },
}

impl NextSuggestion {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            NextSuggestion::Suggested(s) => Some(&s.decision),
            NextSuggestion::NoSuggestion { .. } => None,
        }
    }

    pub fn no_suggestion_reason(&self) -> Option<NoSuggestionReason> {
        match self {
            NextSuggestion::Suggested(_) => None,
            NextSuggestion::NoSuggestion { reason, .. } => Some(*reason),
        }
    }
}
