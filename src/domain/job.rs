// ==========================================
// 柔性制造单元自动排产系统 - 作业领域模型
// ==========================================
// 职责: 作业标识与积压作业定义
// 红线: 作业由外部系统拥有，本系统仅引用
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// JobRef - 作业标识三元组
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobRef {
    pub work_order: String,   // 工单号
    pub part_id: String,      // 零件号
    pub operation_id: String, // 工序号
}

impl JobRef {
    pub fn new(
        work_order: impl Into<String>,
        part_id: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            work_order: work_order.into(),
            part_id: part_id.into(),
            operation_id: operation_id.into(),
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.work_order, self.part_id, self.operation_id)
    }
}

// ==========================================
// BacklogJob - 积压作业
// ==========================================
// 来源: JobBacklogProvider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogJob {
    pub job: JobRef,

    /// 工序描述
    #[serde(default)]
    pub description: Option<String>,

    /// 工艺路线允许的机床（为空表示不限）
    #[serde(default)]
    pub allowed_machines: Vec<String>,

    /// 预计单件加工时长（分钟）
    #[serde(default)]
    pub estimated_cycle_minutes: f64,

    #[serde(default)]
    pub required_quantity: i64,

    #[serde(default)]
    pub completed_quantity: i64,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl BacklogJob {
    /// 剩余数量（不小于 0）
    pub fn remaining_quantity(&self) -> i64 {
        (self.required_quantity - self.completed_quantity).max(0)
    }

    /// 机床是否在工艺路线允许范围内（大小写不敏感）
    pub fn allows_machine(&self, machine_id: &str) -> bool {
        self.allowed_machines.is_empty()
            || self
                .allowed_machines
                .iter()
                .any(|m| m.eq_ignore_ascii_case(machine_id))
    }
}
