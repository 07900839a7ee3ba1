// ==========================================
// 柔性制造单元自动排产系统 - 单元资源模型
// ==========================================
// 职责: NC程序、刀具、夹具、托盘、物料的只读快照
// 来源: 外部数据提供者 (provider 层)
// ==========================================

use crate::domain::job::JobRef;
use crate::domain::types::PalletPhase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// NC 程序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NcProgram {
    pub program_id: String,

    /// 可运行该程序的机床（为空表示所有机床）
    #[serde(default)]
    pub machine_ids: Vec<String>,
}

impl NcProgram {
    pub fn runs_on(&self, machine_id: &str) -> bool {
        self.machine_ids.is_empty()
            || self
                .machine_ids
                .iter()
                .any(|m| m.eq_ignore_ascii_case(machine_id))
    }
}

// ==========================================
// 刀具需求 / 刀具状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub tool_id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 程序对该刀具的切削时间（秒）
    #[serde(default)]
    pub usage_time_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    pub tool_id: String,
    /// 剩余寿命（秒，None 表示未管理寿命）
    #[serde(default)]
    pub remaining_life_seconds: Option<i64>,
    #[serde(default)]
    pub usage_status: Option<String>,
}

impl ToolState {
    /// 剩余寿命是否足以覆盖该需求
    pub fn covers(&self, requirement: &ToolRequirement) -> bool {
        match (self.remaining_life_seconds, requirement.usage_time_seconds) {
            (Some(life), Some(usage)) => life as f64 >= usage,
            _ => true,
        }
    }
}

// ==========================================
// 夹具
// ==========================================

/// 作业可用的夹具方案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureOption {
    pub fixture_code: String,
    /// 夹具所需的托盘底板型号
    #[serde(default)]
    pub plaque_model: Option<String>,
}

/// 夹具库存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureStock {
    pub fixture_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub storage_location: Option<String>,
    #[serde(default)]
    pub quantity_total: Option<i64>,
    #[serde(default)]
    pub quantity_in_use: Option<i64>,
}

impl FixtureStock {
    /// 可用数量（None 表示库存未管理）
    pub fn quantity_available(&self) -> Option<i64> {
        self.quantity_total
            .map(|total| (total - self.quantity_in_use.unwrap_or(0)).max(0))
    }

    pub fn has_free_unit(&self) -> bool {
        self.quantity_available().map_or(true, |q| q > 0)
    }
}

// ==========================================
// 机床托盘
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachinePalletState {
    pub pallet_id: String,

    /// 所属机床（None 表示共享托盘）
    #[serde(default)]
    pub machine_id: Option<String>,

    /// 当前安装的夹具
    #[serde(default)]
    pub fixture_code: Option<String>,

    #[serde(default)]
    pub plaque_model: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub phase: PalletPhase,

    /// 托盘上尚未卸下的成品零件
    #[serde(default)]
    pub part_on_pallet: Option<String>,
}

fn default_true() -> bool {
    true
}

impl MachinePalletState {
    /// 托盘是否可服务该机床（专属或共享）
    pub fn serves(&self, machine_id: &str) -> bool {
        match &self.machine_id {
            Some(m) => m.eq_ignore_ascii_case(machine_id),
            None => true,
        }
    }
}

// ==========================================
// 物料托盘
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialPalletState {
    pub pallet_id: String,
    pub part_id: String,
    /// 可用数量（None 表示未知，视为可用）
    #[serde(default)]
    pub quantity_available: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    /// 送达装载站所需的搬运次数
    #[serde(default)]
    pub handling_moves: u32,
}

impl MaterialPalletState {
    pub fn has_stock(&self) -> bool {
        self.quantity_available.map_or(true, |q| q > 0)
    }
}

// ==========================================
// ConstraintSnapshot - 约束快照
// ==========================================
// 候选生成的唯一输入（纯数据，不含数据访问）
#[derive(Debug, Clone, Default)]
pub struct ConstraintSnapshot {
    /// 作业 → 可用程序
    pub programs: HashMap<JobRef, Vec<NcProgram>>,
    /// 程序 → 刀具需求
    pub tool_requirements: HashMap<String, Vec<ToolRequirement>>,
    /// 机床 → 刀库中的刀具
    pub machine_tools: HashMap<String, Vec<ToolState>>,
    /// 中央刀库中可装载的刀具
    pub store_tools: Vec<ToolState>,
    /// 作业 → 夹具方案
    pub fixture_options: HashMap<JobRef, Vec<FixtureOption>>,
    /// 夹具编码 → 库存
    pub fixture_stock: HashMap<String, FixtureStock>,
    pub machine_pallets: Vec<MachinePalletState>,
    /// 零件 → 物料托盘
    pub material_pallets: HashMap<String, Vec<MaterialPalletState>>,
}
