// ==========================================
// 柔性制造单元自动排产系统 - 自动排产 API
// ==========================================
// 职责: 对外操作面（计划刷新、派工、拒绝、机床状态、换型、完工、查询）
// 约定: 与时间相关的操作均提供 *_at(now) 版本，便于测试与回放
// 红线: 参数校验在任何写入之前完成
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::config::AutopilotConfig;
use crate::domain::control::{JobIgnore, MachineStatus, NewJobIgnore, NewSetupSession, SetupSession};
use crate::domain::decision::{Decision, NextSuggestion};
use crate::domain::job::JobRef;
use crate::domain::plan::{PlanBatch, PlannedJob};
use crate::domain::shift::ShiftWindow;
use crate::domain::types::{CompletionOutcome, RefuseScope};
use crate::engine::{
    AutopilotRepositories, Dispatcher, Planner, RefreshSummary, ShiftWindowResolver,
    ShiftWindowTable,
};

/// 未指定时的换型类型
pub const DEFAULT_SETUP_TYPE: &str = "auto_detected";

/// 最近决策查询上限
const MAX_DECISION_LIMIT: usize = 500;

// ==========================================
// 查询结果 DTO
// ==========================================

/// 机床可用性视图（未登记的机床视为可用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineAvailability {
    pub machine_id: String,
    pub is_available: bool,
    pub status: Option<String>,
    pub reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 当前计划批次及其全部计划作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPlan {
    pub batch: PlanBatch,
    pub planned_jobs: Vec<PlannedJob>,
}

// ==========================================
// AutopilotApi - 自动排产 API
// ==========================================
pub struct AutopilotApi {
    planner: Arc<Planner>,
    dispatcher: Arc<Dispatcher>,
    repos: AutopilotRepositories,
    shift_windows: Arc<ShiftWindowResolver>,
    config: Arc<AutopilotConfig>,
}

impl AutopilotApi {
    pub fn new(
        planner: Arc<Planner>,
        dispatcher: Arc<Dispatcher>,
        repos: AutopilotRepositories,
        shift_windows: Arc<ShiftWindowResolver>,
        config: Arc<AutopilotConfig>,
    ) -> Self {
        Self {
            planner,
            dispatcher,
            repos,
            shift_windows,
            config,
        }
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    // ==========================================
    // 计划与派工
    // ==========================================

    /// 刷新计划（RefreshPlan）
    pub async fn refresh_plan(&self) -> ApiResult<RefreshSummary> {
        self.refresh_plan_at(Utc::now()).await
    }

    pub async fn refresh_plan_at(&self, now: DateTime<Utc>) -> ApiResult<RefreshSummary> {
        Ok(self.planner.refresh(now).await?)
    }

    /// 取下一条派工建议（GetNextSuggestion）
    pub async fn get_next_suggestion(&self, max_alternatives: usize) -> ApiResult<NextSuggestion> {
        self.get_next_suggestion_at(max_alternatives, Utc::now()).await
    }

    pub async fn get_next_suggestion_at(
        &self,
        max_alternatives: usize,
        now: DateTime<Utc>,
    ) -> ApiResult<NextSuggestion> {
        Ok(self.dispatcher.next(max_alternatives, now).await?)
    }

    /// 当前批次（含所有状态的计划作业）
    pub fn current_plan(&self) -> ApiResult<Option<CurrentPlan>> {
        let batch = match self.repos.plan_batch_repo.find_current()? {
            Some(b) => b,
            None => return Ok(None),
        };
        let planned_jobs = self.repos.plan_batch_repo.list_by_batch(&batch.plan_batch_id)?;
        Ok(Some(CurrentPlan {
            batch,
            planned_jobs,
        }))
    }

    // ==========================================
    // 拒绝 / 冷却
    // ==========================================

    /// 操作员拒绝决策（作业级屏蔽）
    pub fn refuse_decision(&self, decision_id: i64, reason: Option<String>) -> ApiResult<JobIgnore> {
        self.refuse_decision_at(decision_id, reason, Utc::now())
    }

    pub fn refuse_decision_at(
        &self,
        decision_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<JobIgnore> {
        self.refuse_decision_with_scope(decision_id, reason, RefuseScope::Job, now)
    }

    /// 操作员拒绝决策
    ///
    /// # 参数
    /// - `scope`: Job 屏蔽作业全部托盘组合；Pallet 仅屏蔽决策所用托盘
    ///
    /// # 错误
    /// - `ApiError::NotFound`: 决策不存在
    /// - `ApiError::ConfigError`: 冷却截止时间超出可表示范围
    pub fn refuse_decision_with_scope(
        &self,
        decision_id: i64,
        reason: Option<String>,
        scope: RefuseScope,
        now: DateTime<Utc>,
    ) -> ApiResult<JobIgnore> {
        let decision = self.load_decision(decision_id)?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let machine_pallet_id = match scope {
            RefuseScope::Job => None,
            RefuseScope::Pallet => Some(decision.machine_pallet_id.clone()),
        };

        let ignore_until = Duration::try_hours(self.config.ignore_ttl_hours)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                ApiError::ConfigError(format!(
                    "ignore_ttl_hours={} 超出时间范围",
                    self.config.ignore_ttl_hours
                ))
            })?;

        let entry = NewJobIgnore {
            created_at: now,
            job: decision.job.clone(),
            machine_pallet_id,
            ignore_until,
            reason,
            decision_id: Some(decision_id),
        };
        let ignore_id = self
            .repos
            .ignore_repo
            .record_refusal(&entry, decision.planned_job_id)?;

        info!(
            decision_id,
            ignore_id,
            job = %entry.job,
            scope = ?scope,
            ignore_until = %entry.ignore_until,
            "决策已被拒绝"
        );

        Ok(JobIgnore {
            ignore_id,
            created_at: entry.created_at,
            job: entry.job,
            machine_pallet_id: entry.machine_pallet_id,
            ignore_until: entry.ignore_until,
            reason: entry.reason,
            decision_id: entry.decision_id,
        })
    }

    // ==========================================
    // 机床状态
    // ==========================================

    pub fn set_machine_status(
        &self,
        machine_id: &str,
        is_available: bool,
        status: &str,
        reason: Option<String>,
    ) -> ApiResult<MachineStatus> {
        self.set_machine_status_at(machine_id, is_available, status, reason, Utc::now())
    }

    /// 登记机床状态（立即生效）
    ///
    /// # 错误
    /// - `ApiError::ValidationError`: 未知机床或状态为空
    pub fn set_machine_status_at(
        &self,
        machine_id: &str,
        is_available: bool,
        status: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<MachineStatus> {
        let machine_id = self.require_machine(machine_id)?;
        let status = status.trim();
        if status.is_empty() {
            return Err(ApiError::ValidationError("status 不能为空".to_string()));
        }

        let record = MachineStatus {
            machine_id,
            is_available,
            status: status.to_string(),
            reason: reason.filter(|r| !r.trim().is_empty()),
            updated_at: now,
        };
        self.repos.machine_status_repo.upsert(&record)?;

        info!(
            machine_id = %record.machine_id,
            is_available,
            status = %record.status,
            "机床状态已更新"
        );
        Ok(record)
    }

    /// 所有配置机床的有效可用性
    pub fn list_machine_statuses(&self) -> ApiResult<Vec<MachineAvailability>> {
        let rows = self.repos.machine_status_repo.list_all()?;
        Ok(self
            .config
            .machine_ids
            .iter()
            .map(|machine_id| match rows.iter().find(|r| &r.machine_id == machine_id) {
                Some(r) => MachineAvailability {
                    machine_id: machine_id.clone(),
                    is_available: r.is_available,
                    status: Some(r.status.clone()),
                    reason: r.reason.clone(),
                    updated_at: Some(r.updated_at),
                },
                None => MachineAvailability {
                    machine_id: machine_id.clone(),
                    is_available: true,
                    status: None,
                    reason: None,
                    updated_at: None,
                },
            })
            .collect())
    }

    // ==========================================
    // 换型会话
    // ==========================================

    pub fn start_setup_session(
        &self,
        machine_id: &str,
        machine_pallet_id: &str,
        job: Option<JobRef>,
        setup_type: Option<&str>,
        decision_id: Option<i64>,
    ) -> ApiResult<i64> {
        self.start_setup_session_at(
            machine_id,
            machine_pallet_id,
            job,
            setup_type,
            decision_id,
            Utc::now(),
        )
    }

    /// 开始换型，返回 setup_id
    ///
    /// # 错误
    /// - `ApiError::ValidationError`: 未知机床或托盘为空
    pub fn start_setup_session_at(
        &self,
        machine_id: &str,
        machine_pallet_id: &str,
        job: Option<JobRef>,
        setup_type: Option<&str>,
        decision_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> ApiResult<i64> {
        let machine_id = self.require_machine(machine_id)?;
        let machine_pallet_id = machine_pallet_id.trim();
        if machine_pallet_id.is_empty() {
            return Err(ApiError::ValidationError("machine_pallet_id 不能为空".to_string()));
        }
        let setup_type = setup_type
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SETUP_TYPE);

        let session = NewSetupSession {
            machine_id,
            machine_pallet_id: machine_pallet_id.to_string(),
            job,
            setup_type: setup_type.to_string(),
            decision_id,
        };
        let setup_id = self.repos.setup_session_repo.start(&session, now)?;

        info!(
            setup_id,
            machine_id = %session.machine_id,
            pallet = %session.machine_pallet_id,
            setup_type = %session.setup_type,
            "换型开始"
        );
        Ok(setup_id)
    }

    pub fn end_setup_session(&self, setup_id: i64) -> ApiResult<SetupSession> {
        self.end_setup_session_at(setup_id, Utc::now())
    }

    /// 结束换型
    ///
    /// # 错误
    /// - `ApiError::NotFound`: setup_id 不存在
    /// - `ApiError::Conflict`: 已结束
    pub fn end_setup_session_at(&self, setup_id: i64, now: DateTime<Utc>) -> ApiResult<SetupSession> {
        let session = self.repos.setup_session_repo.end(setup_id, now)?;
        info!(
            setup_id,
            machine_id = %session.machine_id,
            minutes = session.duration_minutes().unwrap_or(0.0),
            "换型结束"
        );
        Ok(session)
    }

    // ==========================================
    // 完工反馈
    // ==========================================

    pub fn record_job_completion(
        &self,
        planned_job_id: i64,
        outcome: CompletionOutcome,
    ) -> ApiResult<()> {
        self.record_job_completion_at(planned_job_id, outcome, Utc::now())
    }

    /// 记录在制作业完成（仅 dispatched 可完成）
    pub fn record_job_completion_at(
        &self,
        planned_job_id: i64,
        outcome: CompletionOutcome,
        now: DateTime<Utc>,
    ) -> ApiResult<()> {
        self.repos
            .plan_batch_repo
            .complete(planned_job_id, outcome, now)?;
        info!(planned_job_id, outcome = ?outcome, "在制作业已完成");
        Ok(())
    }

    // ==========================================
    // 决策查询
    // ==========================================

    pub fn get_decision(&self, decision_id: i64) -> ApiResult<Decision> {
        self.load_decision(decision_id)
    }

    pub fn list_recent_decisions(&self, limit: usize) -> ApiResult<Vec<Decision>> {
        if limit == 0 || limit > MAX_DECISION_LIMIT {
            return Err(ApiError::ValidationError(format!(
                "limit 必须在 1..={} 之间",
                MAX_DECISION_LIMIT
            )));
        }
        Ok(self.repos.decision_repo.list_recent(limit)?)
    }

    // ==========================================
    // 班次表
    // ==========================================

    pub fn list_shift_windows(&self) -> ApiResult<Vec<ShiftWindow>> {
        let table = self.shift_windows.table()?;
        Ok(table.windows().to_vec())
    }

    /// 替换班次表：先校验，再持久化，最后切换内存表
    ///
    /// # 错误
    /// - `ApiError::ConfigError`: 班次表不合法（旧表保持生效）
    pub fn replace_shift_windows(&self, windows: Vec<ShiftWindow>) -> ApiResult<()> {
        let table = ShiftWindowTable::new(windows)?;
        self.repos.shift_window_repo.replace_all(table.windows())?;
        self.shift_windows.replace(table)?;
        Ok(())
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn require_machine(&self, machine_id: &str) -> ApiResult<String> {
        self.config
            .canonical_machine_id(machine_id)
            .ok_or_else(|| ApiError::ValidationError(format!("未知机床: {}", machine_id)))
    }

    fn load_decision(&self, decision_id: i64) -> ApiResult<Decision> {
        self.repos
            .decision_repo
            .find_by_id(decision_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Decision(id={})不存在", decision_id)))
    }
}
