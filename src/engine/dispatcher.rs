// ==========================================
// 柔性制造单元自动排产系统 - 派工器
// ==========================================
// 职责: GetNextSuggestion: 在所有机床中选出全局最优的下一项作业
// 流程: 读当前批次 → 屏蔽/在制过滤 → 实时复核 → 重新评分 → 取全局最小 → 写决策
// 红线: 派工调用经 dispatch_lock 串行化
// 红线: 决策写入与计划作业状态迁移在同一事务内完成
// 红线: 无建议是正常结果，不是错误
// ==========================================

use crate::config::AutopilotConfig;
use crate::domain::control::IgnoreSet;
use crate::domain::decision::{
    Alternative, DroppedCandidate, NewDecision, NextSuggestion, Suggestion,
};
use crate::domain::job::{BacklogJob, JobRef};
use crate::domain::plan::{PlannedJob, ScoredCandidate};
use crate::domain::resource::ConstraintSnapshot;
use crate::domain::types::NoSuggestionReason;
use crate::engine::action_plan;
use crate::engine::candidate::CandidateGenerator;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::AutopilotRepositories;
use crate::engine::scoring::{compare_scored, CandidateScorer, ScoringCosts};
use crate::engine::shift_window::ShiftWindowResolver;
use crate::provider::DataProviders;
use crate::repository::RepositoryError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 通过复核的机床首选作业
struct Verified {
    planned: PlannedJob,
    scored: ScoredCandidate,
    snapshot: ConstraintSnapshot,
}

// ==========================================
// Dispatcher - 派工器
// ==========================================
pub struct Dispatcher {
    providers: DataProviders,
    repos: AutopilotRepositories,
    shift_windows: Arc<ShiftWindowResolver>,
    config: Arc<AutopilotConfig>,
    dispatch_lock: Mutex<()>,
}

impl Dispatcher {
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
            dispatch_lock: Mutex::new(()),
        }
    }

    /// 取下一条派工建议
    ///
    /// # 参数
    /// - `max_alternatives`: 返回的备选方案上限（≤ 配置的 max_alternatives）
    ///
    /// # 错误
    /// - `EngineError::Validation`: max_alternatives 超限
    /// - `EngineError::Repository(Conflict)`: 计划作业在派工瞬间被其他操作修改
    pub async fn next(
        &self,
        max_alternatives: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<NextSuggestion> {
        if max_alternatives > self.config.max_alternatives {
            return Err(EngineError::Validation(format!(
                "max_alternatives={} 超过上限 {}",
                max_alternatives, self.config.max_alternatives
            )));
        }

        let _guard = self.dispatch_lock.lock().await;

        // 计划批次在读取与写入之间被刷新时重试一次
        match self.next_once(max_alternatives, now).await {
            Err(EngineError::Repository(RepositoryError::Conflict { id, .. })) => {
                warn!(planned_job_id = %id, "派工冲突，按最新批次重试");
                self.next_once(max_alternatives, now).await
            }
            other => other,
        }
    }

    async fn next_once(
        &self,
        max_alternatives: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<NextSuggestion> {
        // ===== Step 1: 当前批次 =====
        let (batch, planned) = match self.repos.plan_batch_repo.load_current_planned()? {
            Some(current) => current,
            None => {
                return Ok(NextSuggestion::NoSuggestion {
                    reason: NoSuggestionReason::NoCurrentPlan,
                    dropped: Vec::new(),
                })
            }
        };

        let availability = self.repos.machine_status_repo.availability_map()?;
        let available: Vec<String> = self
            .config
            .machine_ids
            .iter()
            .filter(|m| availability.get(*m).copied().unwrap_or(true))
            .cloned()
            .collect();
        if available.is_empty() {
            return Ok(NextSuggestion::NoSuggestion {
                reason: NoSuggestionReason::NoMachinesAvailable,
                dropped: Vec::new(),
            });
        }

        let ignores = IgnoreSet::new(self.repos.ignore_repo.list_active(now)?);
        let in_flight = self.repos.plan_batch_repo.list_in_flight()?;
        let in_flight_jobs: HashSet<JobRef> = in_flight.iter().map(|p| p.job.clone()).collect();
        let mut depths: HashMap<String, usize> = available.iter().map(|m| (m.clone(), 0)).collect();
        for pj in &in_flight {
            if let Some(depth) = depths.get_mut(&pj.machine_id) {
                *depth += 1;
            }
        }

        let window = self.shift_windows.resolve(now)?;
        let generator = CandidateGenerator::new(
            self.config.tool_policy.clone(),
            self.config.setup_costs.clone(),
        );
        let scorer = CandidateScorer::new(
            window.weights,
            ScoringCosts {
                tool_load_cost: self.config.tool_policy.tool_load_cost,
                material_move_cost: self.config.material_move_cost,
            },
        );
        let min_depth = depths.values().copied().min().unwrap_or(0);

        // ===== Step 2-3: 各机床并行复核 =====
        let per_machine = join_all(available.iter().map(|machine_id| {
            let queue: Vec<&PlannedJob> = planned
                .iter()
                .filter(|p| &p.machine_id == machine_id)
                .collect();
            self.first_eligible(queue, &ignores, &in_flight_jobs, &generator)
        }))
        .await;

        let mut dropped = Vec::new();
        let mut survivors = Vec::new();
        for (verified, mut machine_dropped) in per_machine {
            dropped.append(&mut machine_dropped);
            if let Some(mut v) = verified {
                let depth = depths.get(&v.planned.machine_id).copied().unwrap_or(0);
                v.scored.score = scorer.score(&v.scored.candidate, depth, min_depth);
                survivors.push(v);
            }
        }

        if survivors.is_empty() {
            info!(dropped = dropped.len(), "无可派工作业");
            return Ok(NextSuggestion::NoSuggestion {
                reason: NoSuggestionReason::NoFeasibleJob,
                dropped,
            });
        }

        // ===== Step 4: 全局最小 =====
        survivors.sort_by(|a, b| compare_scored(&a.scored, &b.scored));
        let mut survivors = survivors.into_iter();
        let best = match survivors.next() {
            Some(v) => v,
            None => {
                return Ok(NextSuggestion::NoSuggestion {
                    reason: NoSuggestionReason::NoFeasibleJob,
                    dropped,
                })
            }
        };

        // ===== Step 5-6: 操作计划 + 决策写入 =====
        let candidate = &best.scored.candidate;
        let new_decision = NewDecision {
            created_at: now,
            plan_batch_id: batch.plan_batch_id.clone(),
            planned_job_id: best.planned.planned_job_id,
            machine_id: candidate.machine_id.clone(),
            job: candidate.job.clone(),
            machine_pallet_id: candidate.machine_pallet_id.clone(),
            material_pallet_id: candidate.material_pallet_id.clone(),
            estimated_setup_minutes: candidate.setup_minutes,
            estimated_cycle_minutes: candidate.cycle_minutes,
            score: best.scored.score,
            shift_window_id: Some(window.shift_window_id),
            action_plan: action_plan::build(candidate, &best.snapshot),
        };
        let decision = self.repos.decision_repo.dispatch(&new_decision)?;

        info!(
            decision_id = decision.decision_id,
            machine_id = %decision.machine_id,
            job = %decision.job,
            score = decision.score.total,
            shift_window = %window.name,
            "派工决策已记录"
        );

        // ===== Step 7: 备选 =====
        let alternatives = survivors
            .take(max_alternatives)
            .map(|v| Alternative {
                planned_job_id: v.planned.planned_job_id,
                machine_id: v.scored.candidate.machine_id,
                job: v.scored.candidate.job,
                machine_pallet_id: v.scored.candidate.machine_pallet_id,
                material_pallet_id: v.scored.candidate.material_pallet_id,
                score: v.scored.score,
            })
            .collect();

        Ok(NextSuggestion::Suggested(Box::new(Suggestion {
            tools_to_load: best.scored.candidate.tools_to_load.clone(),
            decision,
            alternatives,
            dropped,
        })))
    }

    /// 按序号依次复核，返回首个通过者与被剔除的条目
    async fn first_eligible(
        &self,
        queue: Vec<&PlannedJob>,
        ignores: &IgnoreSet,
        in_flight: &HashSet<JobRef>,
        generator: &CandidateGenerator,
    ) -> (Option<Verified>, Vec<DroppedCandidate>) {
        let mut dropped = Vec::new();

        for pj in queue {
            let reason = if in_flight.contains(&pj.job) {
                "作业已在制".to_string()
            } else if ignores.blocks(&pj.job, &pj.machine_pallet_id) {
                "作业处于拒绝冷却期".to_string()
            } else {
                match self.reverify(pj, generator).await {
                    Ok(verified) => return (Some(verified), dropped),
                    Err(reason) => reason,
                }
            };

            warn!(
                planned_job_id = pj.planned_job_id,
                machine_id = %pj.machine_id,
                job = %pj.job,
                reason = %reason,
                "计划作业被剔除"
            );
            dropped.push(DroppedCandidate {
                planned_job_id: pj.planned_job_id,
                machine_id: pj.machine_id.clone(),
                job: pj.job.clone(),
                reason,
            });
        }

        (None, dropped)
    }

    /// 以实时数据复核计划作业的硬约束
    async fn reverify(
        &self,
        pj: &PlannedJob,
        generator: &CandidateGenerator,
    ) -> Result<Verified, String> {
        let snapshot = self
            .providers
            .load_for_job(&pj.job, &pj.machine_id)
            .await
            .map_err(|e| e.to_string())?;

        // 工艺路线已在计划阶段校验
        let job = BacklogJob {
            job: pj.job.clone(),
            description: None,
            allowed_machines: Vec::new(),
            estimated_cycle_minutes: pj.estimated_cycle_minutes,
            required_quantity: 0,
            completed_quantity: 0,
            priority: 0,
            due_date: None,
        };

        let candidate = generator
            .candidates_for(&job, &pj.machine_id, &snapshot)?
            .into_iter()
            .find(|c| c.machine_pallet_id == pj.machine_pallet_id)
            .ok_or_else(|| format!("托盘 {} 已不可用", pj.machine_pallet_id))?;

        Ok(Verified {
            planned: pj.clone(),
            scored: ScoredCandidate {
                candidate,
                score: Default::default(),
            },
            snapshot,
        })
    }
}
