// ==========================================
// 柔性制造单元自动排产系统 - 派工决策仓储
// ==========================================
// 职责: 决策日志（仅追加）与派工事务
// 红线: 决策写入与计划作业 planned -> dispatched 必须在同一事务
// ==========================================

use crate::db::{format_ts, get_ts};
use crate::domain::decision::{ActionPlan, Decision, NewDecision};
use crate::domain::job::JobRef;
use crate::domain::plan::ScoreBreakdown;
use crate::domain::types::PlannedJobStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const DECISION_COLUMNS: &str = r#"decision_id, created_at, plan_batch_id, planned_job_id, machine_id,
       work_order, part_id, operation_id, machine_pallet_id, material_pallet_id,
       estimated_setup_minutes, estimated_cycle_minutes,
       score_total, tool_penalty, setup_penalty, material_penalty, balance_penalty, run_adjustment,
       shift_window_id, action_plan_json"#;

// ==========================================
// DecisionRepository - 派工决策仓储
// ==========================================
pub struct DecisionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DecisionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 派工：写入决策并将计划作业置为 dispatched
    ///
    /// # 并发控制
    /// 条件更新 `status = 'planned'` 且所属批次仍为 CURRENT；
    /// 影响行数为 0 时整个事务回滚
    ///
    /// # 错误
    /// - `RepositoryError::Conflict`: 计划作业已不处于可派工状态
    pub fn dispatch(&self, decision: &NewDecision) -> RepositoryResult<Decision> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let action_plan_json = serde_json::to_string(&decision.action_plan)?;

        tx.execute(
            r#"INSERT INTO decision (
                created_at, plan_batch_id, planned_job_id, machine_id,
                work_order, part_id, operation_id, machine_pallet_id, material_pallet_id,
                estimated_setup_minutes, estimated_cycle_minutes,
                score_total, tool_penalty, setup_penalty, material_penalty, balance_penalty, run_adjustment,
                shift_window_id, action_plan_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                format_ts(&decision.created_at),
                &decision.plan_batch_id,
                &decision.planned_job_id,
                &decision.machine_id,
                &decision.job.work_order,
                &decision.job.part_id,
                &decision.job.operation_id,
                &decision.machine_pallet_id,
                &decision.material_pallet_id,
                &decision.estimated_setup_minutes,
                &decision.estimated_cycle_minutes,
                &decision.score.total,
                &decision.score.tool_penalty,
                &decision.score.setup_penalty,
                &decision.score.material_penalty,
                &decision.score.balance_penalty,
                &decision.score.run_adjustment,
                &decision.shift_window_id,
                &action_plan_json,
            ],
        )?;
        let decision_id = tx.last_insert_rowid();

        let rows_affected = tx.execute(
            r#"UPDATE planned_job
               SET status = ?, decision_id = ?, updated_at = ?
               WHERE planned_job_id = ?
                 AND status = ?
                 AND plan_batch_id IN (SELECT plan_batch_id FROM plan_batch WHERE status = 'CURRENT')"#,
            params![
                PlannedJobStatus::Dispatched.to_db_str(),
                decision_id,
                format_ts(&decision.created_at),
                &decision.planned_job_id,
                PlannedJobStatus::Planned.to_db_str(),
            ],
        )?;

        if rows_affected == 0 {
            // tx 被 drop 时自动回滚
            return Err(RepositoryError::conflict(
                "PlannedJob",
                decision.planned_job_id,
                "已不处于可派工状态",
            ));
        }

        tx.commit()?;

        Ok(Decision {
            decision_id,
            created_at: decision.created_at,
            plan_batch_id: decision.plan_batch_id.clone(),
            planned_job_id: decision.planned_job_id,
            machine_id: decision.machine_id.clone(),
            job: decision.job.clone(),
            machine_pallet_id: decision.machine_pallet_id.clone(),
            material_pallet_id: decision.material_pallet_id.clone(),
            estimated_setup_minutes: decision.estimated_setup_minutes,
            estimated_cycle_minutes: decision.estimated_cycle_minutes,
            score: decision.score,
            shift_window_id: decision.shift_window_id,
            action_plan: decision.action_plan.clone(),
        })
    }

    /// 按ID查询决策
    pub fn find_by_id(&self, decision_id: i64) -> RepositoryResult<Option<Decision>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM decision WHERE decision_id = ?", DECISION_COLUMNS);
        let decision = conn
            .query_row(&sql, params![decision_id], map_decision_row)
            .optional()?;
        Ok(decision)
    }

    /// 查询最近的决策（按时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<Decision>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM decision ORDER BY decision_id DESC LIMIT ?",
            DECISION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let decisions = stmt
            .query_map(params![limit as i64], map_decision_row)?
            .collect::<Result<Vec<Decision>, _>>()?;
        Ok(decisions)
    }
}

fn map_decision_row(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
    let action_plan_json: String = row.get(19)?;
    let action_plan: ActionPlan = serde_json::from_str(&action_plan_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(19, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Decision {
        decision_id: row.get(0)?,
        created_at: get_ts(row, 1)?,
        plan_batch_id: row.get(2)?,
        planned_job_id: row.get(3)?,
        machine_id: row.get(4)?,
        job: JobRef {
            work_order: row.get(5)?,
            part_id: row.get(6)?,
            operation_id: row.get(7)?,
        },
        machine_pallet_id: row.get(8)?,
        material_pallet_id: row.get(9)?,
        estimated_setup_minutes: row.get(10)?,
        estimated_cycle_minutes: row.get(11)?,
        score: ScoreBreakdown {
            total: row.get(12)?,
            tool_penalty: row.get(13)?,
            setup_penalty: row.get(14)?,
            material_penalty: row.get(15)?,
            balance_penalty: row.get(16)?,
            run_adjustment: row.get(17)?,
        },
        shift_window_id: row.get(18)?,
        action_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::plan::{NewPlannedJob, PlanBatch};
    use crate::domain::types::PlanBatchStatus;
    use crate::repository::plan_batch_repo::PlanBatchRepository;
    use chrono::Utc;

    fn setup() -> (DecisionRepository, PlanBatchRepository, i64) {
        let conn = Arc::new(Mutex::new(open_in_memory().unwrap()));
        let plans = PlanBatchRepository::new(conn.clone());
        plans
            .publish(
                &PlanBatch {
                    plan_batch_id: "B1".to_string(),
                    created_at: Utc::now(),
                    status: PlanBatchStatus::Current,
                    shift_window_id: None,
                },
                &[NewPlannedJob {
                    machine_id: "DMC1".to_string(),
                    sequence_index: 1,
                    job: JobRef::new("WO1", "P1", "10"),
                    machine_pallet_id: "MP1".to_string(),
                    material_pallet_id: "MAT1".to_string(),
                    estimated_setup_minutes: 12.0,
                    estimated_cycle_minutes: 30.0,
                    score_total: 9.0,
                }],
            )
            .unwrap();
        let planned_job_id = plans.list_by_batch("B1").unwrap()[0].planned_job_id;
        (DecisionRepository::new(conn), plans, planned_job_id)
    }

    fn new_decision(planned_job_id: i64) -> NewDecision {
        NewDecision {
            created_at: Utc::now(),
            plan_batch_id: "B1".to_string(),
            planned_job_id,
            machine_id: "DMC1".to_string(),
            job: JobRef::new("WO1", "P1", "10"),
            machine_pallet_id: "MP1".to_string(),
            material_pallet_id: "MAT1".to_string(),
            estimated_setup_minutes: 12.0,
            estimated_cycle_minutes: 30.0,
            score: ScoreBreakdown {
                total: 9.0,
                setup_penalty: 9.0,
                ..Default::default()
            },
            shift_window_id: Some(1),
            action_plan: ActionPlan::default(),
        }
    }

    #[test]
    fn test_dispatch_links_planned_job() {
        let (repo, plans, planned_job_id) = setup();
        let decision = repo.dispatch(&new_decision(planned_job_id)).unwrap();

        let planned = plans.find_planned_job(planned_job_id).unwrap().unwrap();
        assert_eq!(planned.status, PlannedJobStatus::Dispatched);
        assert_eq!(planned.decision_id, Some(decision.decision_id));

        let loaded = repo.find_by_id(decision.decision_id).unwrap().unwrap();
        assert_eq!(loaded.score.total, 9.0);
        assert_eq!(loaded.job, JobRef::new("WO1", "P1", "10"));
    }

    #[test]
    fn test_second_dispatch_conflicts_and_rolls_back() {
        let (repo, _plans, planned_job_id) = setup();
        repo.dispatch(&new_decision(planned_job_id)).unwrap();

        let err = repo.dispatch(&new_decision(planned_job_id)).unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        // 冲突的决策不应落库
        assert_eq!(repo.list_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_decision_rows_are_append_only() {
        let (repo, _plans, planned_job_id) = setup();
        let decision = repo.dispatch(&new_decision(planned_job_id)).unwrap();

        let conn = repo.get_conn().unwrap();
        let result = conn.execute(
            "UPDATE decision SET machine_id = 'DMC9' WHERE decision_id = ?",
            params![decision.decision_id],
        );
        assert!(result.is_err());
    }
}
