// ==========================================
// 柔性制造单元自动排产系统 - 现场控制模型
// ==========================================
// 职责: 作业屏蔽、机床状态、换型会话
// ==========================================

use crate::domain::job::JobRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// JobIgnore - 作业屏蔽（冷却期）
// ==========================================
// 仅追加，读取时按 ignore_until 过滤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobIgnore {
    pub ignore_id: i64,
    pub created_at: DateTime<Utc>,
    pub job: JobRef,
    /// 指定时仅屏蔽该托盘组合
    pub machine_pallet_id: Option<String>,
    pub ignore_until: DateTime<Utc>,
    pub reason: Option<String>,
    pub decision_id: Option<i64>,
}

impl JobIgnore {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.ignore_until > now
    }

    /// 是否命中 (作业, 托盘) 组合
    pub fn matches(&self, job: &JobRef, machine_pallet_id: &str) -> bool {
        if &self.job != job {
            return false;
        }
        match &self.machine_pallet_id {
            Some(p) => p == machine_pallet_id,
            None => true,
        }
    }
}

/// 待写入的屏蔽条目
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobIgnore {
    pub created_at: DateTime<Utc>,
    pub job: JobRef,
    pub machine_pallet_id: Option<String>,
    pub ignore_until: DateTime<Utc>,
    pub reason: Option<String>,
    pub decision_id: Option<i64>,
}

/// 一组生效中的屏蔽条目
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    entries: Vec<JobIgnore>,
}

impl IgnoreSet {
    pub fn new(entries: Vec<JobIgnore>) -> Self {
        Self { entries }
    }

    pub fn blocks(&self, job: &JobRef, machine_pallet_id: &str) -> bool {
        self.entries.iter().any(|e| e.matches(job, machine_pallet_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==========================================
// MachineStatus - 机床状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub machine_id: String,
    pub is_available: bool,
    pub status: String,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// SetupSession - 换型会话
// ==========================================

/// 换型开始参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSetupSession {
    pub machine_id: String,
    pub machine_pallet_id: String,
    pub job: Option<JobRef>,
    pub setup_type: String,
    pub decision_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupSession {
    pub setup_id: i64,
    pub machine_id: String,
    pub machine_pallet_id: String,
    pub job: Option<JobRef>,
    pub setup_type: String,
    pub decision_id: Option<i64>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
}

impl SetupSession {
    pub fn duration_minutes(&self) -> Option<f64> {
        self.end_ts
            .map(|end| (end - self.start_ts).num_milliseconds() as f64 / 60_000.0)
    }
}
