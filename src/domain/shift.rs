// ==========================================
// 柔性制造单元自动排产系统 - 班次窗口模型
// ==========================================
// 职责: 时段权重配置
// 说明: mode 仅作说明用途，行为完全由权重决定
// ==========================================

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// 评分权重向量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftWeights {
    pub short_setup: f64,
    pub long_run: f64,
    pub tool_penalty: f64,
    pub material_penalty: f64,
    pub machine_balance: f64,
}

impl Default for ShiftWeights {
    fn default() -> Self {
        Self {
            short_setup: 1.0,
            long_run: 1.0,
            tool_penalty: 1.0,
            material_penalty: 1.0,
            machine_balance: 1.0,
        }
    }
}

/// 班次窗口 [start_time, end_time)，可跨午夜
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub shift_window_id: i64,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub mode: String,
    pub weights: ShiftWeights,
}
