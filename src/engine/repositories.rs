// ==========================================
// 柔性制造单元自动排产系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合计划器、派工器与 API 所需的全部 Repository
// 约定: 所有仓储共享同一个 Arc<Mutex<Connection>>
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    DecisionRepository, JobIgnoreRepository, MachineStatusRepository, PlanBatchRepository,
    SetupSessionRepository, ShiftWindowRepository,
};

/// 自动排产仓储集合
///
/// # 包含的仓储
/// - `plan_batch_repo`: 计划批次与计划作业
/// - `decision_repo`: 派工决策（仅追加）
/// - `ignore_repo`: 拒绝冷却
/// - `machine_status_repo`: 机床状态
/// - `setup_session_repo`: 换型会话
/// - `shift_window_repo`: 班次表
#[derive(Clone)]
pub struct AutopilotRepositories {
    pub plan_batch_repo: Arc<PlanBatchRepository>,
    pub decision_repo: Arc<DecisionRepository>,
    pub ignore_repo: Arc<JobIgnoreRepository>,
    pub machine_status_repo: Arc<MachineStatusRepository>,
    pub setup_session_repo: Arc<SetupSessionRepository>,
    pub shift_window_repo: Arc<ShiftWindowRepository>,
}

impl AutopilotRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            plan_batch_repo: Arc::new(PlanBatchRepository::new(conn.clone())),
            decision_repo: Arc::new(DecisionRepository::new(conn.clone())),
            ignore_repo: Arc::new(JobIgnoreRepository::new(conn.clone())),
            machine_status_repo: Arc::new(MachineStatusRepository::new(conn.clone())),
            setup_session_repo: Arc::new(SetupSessionRepository::new(conn.clone())),
            shift_window_repo: Arc::new(ShiftWindowRepository::new(conn)),
        }
    }
}
