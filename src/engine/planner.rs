// ==========================================
// 柔性制造单元自动排产系统 - 滚动计划器
// ==========================================
// 职责: RefreshPlan: 生成并原子发布新的计划批次
// 流程: 读取状态 → 生成候选 → 评分 → 全局贪心分配 → 原子发布
// 红线: 任一数据提供者失败即中止，旧批次保持生效
// 红线: 同一作业一轮只分配给一台机床；机床托盘不跨机床复用
// ==========================================

use crate::config::AutopilotConfig;
use crate::domain::control::IgnoreSet;
use crate::domain::job::{BacklogJob, JobRef};
use crate::domain::plan::{BlockedJob, NewPlannedJob, PlanBatch, ScoredCandidate};
use crate::domain::types::PlanBatchStatus;
use crate::engine::candidate::CandidateGenerator;
use crate::engine::error::EngineResult;
use crate::engine::repositories::AutopilotRepositories;
use crate::engine::scoring::{CandidateScorer, ScoringCosts};
use crate::engine::shift_window::ShiftWindowResolver;
use crate::provider::DataProviders;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 单台机床的队列摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineQueueSummary {
    pub machine_id: String,
    pub available: bool,
    pub planned: usize,
}

/// RefreshPlan 结果摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub plan_batch_id: String,
    pub previous_batch_id: Option<String>,
    pub shift_window_id: i64,
    pub machines: Vec<MachineQueueSummary>,
    pub total_planned: usize,
    pub blocked: Vec<BlockedJob>,
}

impl RefreshSummary {
    pub fn planned_on(&self, machine_id: &str) -> usize {
        self.machines
            .iter()
            .find(|m| m.machine_id == machine_id)
            .map(|m| m.planned)
            .unwrap_or(0)
    }
}

// ==========================================
// Planner - 滚动计划器
// ==========================================
pub struct Planner {
    providers: DataProviders,
    repos: AutopilotRepositories,
    shift_windows: Arc<ShiftWindowResolver>,
    config: Arc<AutopilotConfig>,
}

impl Planner {
    pub fn new(
        providers: DataProviders,
        repos: AutopilotRepositories,
        shift_windows: Arc<ShiftWindowResolver>,
        config: Arc<AutopilotConfig>,
    ) -> Self {
        Self {
            providers,
            repos,
            shift_windows,
            config,
        }
    }

    /// 刷新计划
    ///
    /// # 返回
    /// - Ok(RefreshSummary): 新批次已发布
    /// - Err(EngineError::Provider): 数据提供者失败/超时，旧批次不变
    pub async fn refresh(&self, now: DateTime<Utc>) -> EngineResult<RefreshSummary> {
        // ===== Step 1: 读取本地状态 =====
        let window = self.shift_windows.resolve(now)?;
        let availability = self.repos.machine_status_repo.availability_map()?;
        let available: Vec<String> = self
            .config
            .machine_ids
            .iter()
            .filter(|m| availability.get(*m).copied().unwrap_or(true))
            .cloned()
            .collect();

        let ignores = IgnoreSet::new(self.repos.ignore_repo.list_active(now)?);
        let in_flight = self.repos.plan_batch_repo.list_in_flight()?;
        let in_flight_jobs: HashSet<JobRef> = in_flight.iter().map(|p| p.job.clone()).collect();

        let mut depths: HashMap<String, usize> = available.iter().map(|m| (m.clone(), 0)).collect();
        for pj in &in_flight {
            if let Some(depth) = depths.get_mut(&pj.machine_id) {
                *depth += 1;
            }
        }

        // ===== Step 2: 读取外部数据（失败即中止） =====
        let backlog = self.providers.load_backlog().await?;
        let jobs: Vec<BacklogJob> = backlog
            .into_iter()
            .filter(|j| !in_flight_jobs.contains(&j.job))
            .collect();
        let snapshot = self.providers.load_snapshot(&jobs, &available).await?;

        // ===== Step 3: 候选生成 + 屏蔽过滤 + 评分 =====
        let generator = CandidateGenerator::new(
            self.config.tool_policy.clone(),
            self.config.setup_costs.clone(),
        );
        let generated = generator.generate(&jobs, &snapshot, &available);

        let total_candidates = generated.candidates.len();
        let candidates: Vec<_> = generated
            .candidates
            .into_iter()
            .filter(|c| !ignores.blocks(&c.job, &c.machine_pallet_id))
            .collect();
        let ignored = total_candidates - candidates.len();

        let scorer = CandidateScorer::new(
            window.weights,
            ScoringCosts {
                tool_load_cost: self.config.tool_policy.tool_load_cost,
                material_move_cost: self.config.material_move_cost,
            },
        );
        let scored = scorer.score_all(candidates, &depths);

        // ===== Step 4: 全局贪心分配 =====
        let queues = assign_queues(scored, &available, self.config.jobs_per_machine);

        let mut rows = Vec::new();
        for (machine_id, queue) in &queues {
            for (idx, sc) in queue.iter().enumerate() {
                let c = &sc.candidate;
                debug!(
                    machine_id = %machine_id,
                    seq = idx + 1,
                    job = %c.job,
                    score = sc.score.total,
                    "计划作业"
                );
                rows.push(NewPlannedJob {
                    machine_id: machine_id.clone(),
                    sequence_index: (idx + 1) as i32,
                    job: c.job.clone(),
                    machine_pallet_id: c.machine_pallet_id.clone(),
                    material_pallet_id: c.material_pallet_id.clone(),
                    estimated_setup_minutes: c.setup_minutes,
                    estimated_cycle_minutes: c.cycle_minutes,
                    score_total: sc.score.total,
                });
            }
        }

        // ===== Step 5: 原子发布 =====
        let batch = PlanBatch {
            plan_batch_id: Uuid::new_v4().to_string(),
            created_at: now,
            status: PlanBatchStatus::Current,
            shift_window_id: Some(window.shift_window_id),
        };
        let previous_batch_id = self.repos.plan_batch_repo.publish(&batch, &rows)?;

        if !generated.blocked.is_empty() {
            warn!(blocked = generated.blocked.len(), "部分作业无可行机床");
        }
        info!(
            plan_batch_id = %batch.plan_batch_id,
            previous = ?previous_batch_id,
            shift_window = %window.name,
            jobs = jobs.len(),
            candidates = total_candidates,
            ignored,
            planned = rows.len(),
            "计划批次已发布"
        );

        let machines = self
            .config
            .machine_ids
            .iter()
            .map(|m| MachineQueueSummary {
                machine_id: m.clone(),
                available: depths.contains_key(m),
                planned: queues.get(m).map(|q| q.len()).unwrap_or(0),
            })
            .collect();

        Ok(RefreshSummary {
            plan_batch_id: batch.plan_batch_id,
            previous_batch_id,
            shift_window_id: window.shift_window_id,
            machines,
            total_planned: rows.len(),
            blocked: generated.blocked,
        })
    }
}

/// 全局贪心分配
///
/// 按分值升序遍历候选：机床队列未满、作业未被占用、托盘未被其他机床占用时入队
fn assign_queues(
    scored: Vec<ScoredCandidate>,
    available: &[String],
    jobs_per_machine: usize,
) -> BTreeMap<String, Vec<ScoredCandidate>> {
    let mut queues: BTreeMap<String, Vec<ScoredCandidate>> =
        available.iter().map(|m| (m.clone(), Vec::new())).collect();
    let mut claimed_jobs: HashSet<JobRef> = HashSet::new();
    let mut pallet_owner: HashMap<String, String> = HashMap::new();

    for sc in scored {
        let machine_id = sc.candidate.machine_id.clone();
        let queue = match queues.get_mut(&machine_id) {
            Some(q) => q,
            None => continue,
        };
        if queue.len() >= jobs_per_machine || claimed_jobs.contains(&sc.candidate.job) {
            continue;
        }
        if let Some(owner) = pallet_owner.get(&sc.candidate.machine_pallet_id) {
            if owner != &machine_id {
                continue;
            }
        }

        claimed_jobs.insert(sc.candidate.job.clone());
        pallet_owner.insert(sc.candidate.machine_pallet_id.clone(), machine_id);
        queue.push(sc);
    }

    queues
}
