// ==========================================
// 柔性制造单元自动排产系统 - 自动排产配置
// ==========================================
// 职责: 配置结构体与默认值、合法性校验
// 存储: config_kv 表 (scope_id='global', key='autopilot/*')
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 拒绝冷却时长上限（一年）
pub const MAX_IGNORE_TTL_HOURS: i64 = 24 * 365;

/// 刀具装载策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// 是否允许从中央刀库装载缺失刀具
    pub allow_loading: bool,
    /// 单个作业允许装载的刀具上限（None 不限）
    pub max_tool_loads: Option<u32>,
    /// 每把装载刀具的惩罚值
    pub tool_load_cost: f64,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            allow_loading: true,
            max_tool_loads: None,
            tool_load_cost: 5.0,
        }
    }
}

/// 换型时间模型（分钟）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupCostModel {
    pub fixture_mount_minutes: f64,
    pub fixture_unmount_minutes: f64,
    /// 零件装夹找正
    pub part_fitting_minutes: f64,
    /// 卸下托盘上的成品
    pub unload_part_minutes: f64,
}

impl Default for SetupCostModel {
    fn default() -> Self {
        Self {
            fixture_mount_minutes: 13.0,
            fixture_unmount_minutes: 10.0,
            part_fitting_minutes: 12.0,
            unload_part_minutes: 5.0,
        }
    }
}

/// 自动排产配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutopilotConfig {
    /// 单元内机床
    pub machine_ids: Vec<String>,
    /// 每台机床的计划深度 K
    pub jobs_per_machine: usize,
    /// 拒绝后的冷却时长（小时）
    pub ignore_ttl_hours: i64,
    /// 单次数据提供者调用超时（毫秒）
    pub provider_timeout_ms: u64,
    /// 单元本地时间相对 UTC 的偏移（分钟）
    pub shift_utc_offset_minutes: i32,
    /// 派工备选方案上限
    pub max_alternatives: usize,
    pub tool_policy: ToolPolicy,
    pub setup_costs: SetupCostModel,
    /// 每次物料搬运的惩罚值
    pub material_move_cost: f64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            machine_ids: vec![
                "DMC1".to_string(),
                "DMC2".to_string(),
                "DMC3".to_string(),
                "DMC4".to_string(),
            ],
            jobs_per_machine: 3,
            ignore_ttl_hours: 24,
            provider_timeout_ms: 5_000,
            shift_utc_offset_minutes: 0,
            max_alternatives: 5,
            tool_policy: ToolPolicy::default(),
            setup_costs: SetupCostModel::default(),
            material_move_cost: 1.0,
        }
    }
}

impl AutopilotConfig {
    /// 校验配置合法性
    ///
    /// # 返回
    /// - Ok(()) 配置合法
    /// - Err(String) 首个不合法项的说明
    pub fn validate(&self) -> Result<(), String> {
        if self.machine_ids.is_empty() {
            return Err("machine_ids 不能为空".to_string());
        }
        if self.machine_ids.iter().any(|m| m.trim().is_empty()) {
            return Err("machine_ids 含空机床号".to_string());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self
            .machine_ids
            .iter()
            .find(|m| !seen.insert(m.trim().to_ascii_uppercase()))
        {
            return Err(format!("machine_ids 含重复机床号 {}", dup));
        }
        if self.jobs_per_machine == 0 {
            return Err("jobs_per_machine 必须大于 0".to_string());
        }
        if self.ignore_ttl_hours <= 0 || self.ignore_ttl_hours > MAX_IGNORE_TTL_HOURS {
            return Err(format!(
                "ignore_ttl_hours 必须在 1..={} 之间",
                MAX_IGNORE_TTL_HOURS
            ));
        }
        if self.provider_timeout_ms == 0 {
            return Err("provider_timeout_ms 必须大于 0".to_string());
        }
        if self.shift_utc_offset_minutes.abs() >= 24 * 60 {
            return Err("shift_utc_offset_minutes 超出 ±24h".to_string());
        }
        let costs = [
            self.tool_policy.tool_load_cost,
            self.setup_costs.fixture_mount_minutes,
            self.setup_costs.fixture_unmount_minutes,
            self.setup_costs.part_fitting_minutes,
            self.setup_costs.unload_part_minutes,
            self.material_move_cost,
        ];
        if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err("成本参数必须为非负有限数".to_string());
        }
        Ok(())
    }

    /// 规范化为配置中的机床号写法（大小写不敏感，未知机床返回 None）
    pub fn canonical_machine_id(&self, machine_id: &str) -> Option<String> {
        self.machine_ids
            .iter()
            .find(|m| m.eq_ignore_ascii_case(machine_id.trim()))
            .cloned()
    }
}
