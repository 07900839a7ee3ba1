// ==========================================
// 柔性制造单元自动排产系统 - 计划领域模型
// ==========================================
// 职责: 计划批次、计划作业、候选与评分明细
// 红线: 计划批次发布后不可变，仅计划作业状态可迁移
// ==========================================

use crate::domain::job::JobRef;
use crate::domain::types::{FixtureChange, PlanBatchStatus, PlannedJobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// PlanBatch - 计划批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBatch {
    pub plan_batch_id: String, // UUID
    pub created_at: DateTime<Utc>,
    pub status: PlanBatchStatus,
    pub shift_window_id: Option<i64>,
}

// ==========================================
// PlannedJob - 计划作业
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedJob {
    pub planned_job_id: i64,
    pub plan_batch_id: String,
    pub machine_id: String,
    pub sequence_index: i32, // 每机床从 1 开始
    pub job: JobRef,
    pub machine_pallet_id: String,
    pub material_pallet_id: String,
    pub estimated_setup_minutes: f64,
    pub estimated_cycle_minutes: f64,
    pub score_total: f64,
    pub status: PlannedJobStatus,
    pub decision_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的计划作业（id 由数据库分配）
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlannedJob {
    pub machine_id: String,
    pub sequence_index: i32,
    pub job: JobRef,
    pub machine_pallet_id: String,
    pub material_pallet_id: String,
    pub estimated_setup_minutes: f64,
    pub estimated_cycle_minutes: f64,
    pub score_total: f64,
}

// ==========================================
// Candidate - 通过全部硬约束的候选
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub machine_id: String,
    pub job: JobRef,
    pub program_id: String,
    pub machine_pallet_id: String,
    pub material_pallet_id: String,

    /// 选用的夹具
    pub fixture_code: String,
    pub fixture_change: FixtureChange,

    /// 需从中央刀库装载的刀具
    pub tools_to_load: Vec<String>,

    /// 换型时间（夹具拆装 + 零件找正 + 卸件，分钟）
    pub setup_minutes: f64,
    pub cycle_minutes: f64,
    /// 物料搬运次数
    pub handling_moves: u32,
}

impl Candidate {
    pub fn tool_loads(&self) -> usize {
        self.tools_to_load.len()
    }
}

// ==========================================
// ScoreBreakdown - 评分明细（越低越好）
// ==========================================
// 各分量为加权后的贡献值，total 为其和
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub tool_penalty: f64,
    pub setup_penalty: f64,
    pub material_penalty: f64,
    pub balance_penalty: f64,
    /// 长周期奖励（≤ 0）
    pub run_adjustment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: ScoreBreakdown,
}

// ==========================================
// BlockedJob - 无任何可行机床的作业
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedJob {
    pub job: JobRef,
    /// 各机床的阻断原因（形如 "DMC1: 缺少刀具 T12"）
    pub reasons: Vec<String>,
}
