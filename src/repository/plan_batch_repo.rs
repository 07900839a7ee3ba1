// ==========================================
// 柔性制造单元自动排产系统 - 计划批次仓储
// ==========================================
// 职责: 计划批次发布/退役、计划作业读取与状态迁移
// 红线: 批次发布为单事务（插入新批次+作业、退役旧批次、取消旧批次未派工作业）
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::{format_ts, get_ts};
use crate::domain::job::JobRef;
use crate::domain::plan::{NewPlannedJob, PlanBatch, PlannedJob};
use crate::domain::types::{CompletionOutcome, PlanBatchStatus, PlannedJobStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const PLANNED_JOB_COLUMNS: &str = r#"pj.planned_job_id, pj.plan_batch_id, pj.machine_id, pj.sequence_index,
       pj.work_order, pj.part_id, pj.operation_id,
       pj.machine_pallet_id, pj.material_pallet_id,
       pj.estimated_setup_minutes, pj.estimated_cycle_minutes, pj.score_total,
       pj.status, pj.decision_id, pj.created_at"#;

// ==========================================
// PlanBatchRepository - 计划批次仓储
// ==========================================
pub struct PlanBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanBatchRepository {
    /// 创建新的PlanBatchRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 原子发布新批次
    ///
    /// # 参数
    /// - `batch`: 新批次（status 将被写为 CURRENT）
    /// - `jobs`: 新批次的全部计划作业
    ///
    /// # 返回
    /// - `Ok(Some(old_batch_id))`: 发布成功并退役了旧批次
    /// - `Ok(None)`: 发布成功，此前无生效批次
    pub fn publish(
        &self,
        batch: &PlanBatch,
        jobs: &[NewPlannedJob],
    ) -> RepositoryResult<Option<String>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = format_ts(&batch.created_at);

        let previous: Option<String> = tx
            .query_row(
                "SELECT plan_batch_id FROM plan_batch WHERE status = 'CURRENT'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(old_id) = &previous {
            tx.execute(
                "UPDATE plan_batch SET status = ?, retired_at = ? WHERE plan_batch_id = ?",
                params![PlanBatchStatus::Retired.to_db_str(), &now, old_id],
            )?;
            tx.execute(
                r#"UPDATE planned_job SET status = ?, updated_at = ?
                   WHERE plan_batch_id = ? AND status = ?"#,
                params![
                    PlannedJobStatus::Cancelled.to_db_str(),
                    &now,
                    old_id,
                    PlannedJobStatus::Planned.to_db_str(),
                ],
            )?;
        }

        tx.execute(
            r#"INSERT INTO plan_batch (plan_batch_id, created_at, status, shift_window_id)
               VALUES (?, ?, ?, ?)"#,
            params![
                &batch.plan_batch_id,
                &now,
                PlanBatchStatus::Current.to_db_str(),
                &batch.shift_window_id,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO planned_job (
                    plan_batch_id, machine_id, sequence_index,
                    work_order, part_id, operation_id,
                    machine_pallet_id, material_pallet_id,
                    estimated_setup_minutes, estimated_cycle_minutes, score_total,
                    status, decision_id, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)"#,
            )?;
            for job in jobs {
                stmt.execute(params![
                    &batch.plan_batch_id,
                    &job.machine_id,
                    &job.sequence_index,
                    &job.job.work_order,
                    &job.job.part_id,
                    &job.job.operation_id,
                    &job.machine_pallet_id,
                    &job.material_pallet_id,
                    &job.estimated_setup_minutes,
                    &job.estimated_cycle_minutes,
                    &job.score_total,
                    PlannedJobStatus::Planned.to_db_str(),
                    &now,
                    &now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(previous)
    }

    /// 查询当前生效批次
    pub fn find_current(&self) -> RepositoryResult<Option<PlanBatch>> {
        let conn = self.get_conn()?;
        Self::query_current(&conn)
    }

    fn query_current(conn: &Connection) -> RepositoryResult<Option<PlanBatch>> {
        let batch = conn
            .query_row(
                r#"SELECT plan_batch_id, created_at, status, shift_window_id
                   FROM plan_batch WHERE status = 'CURRENT'"#,
                [],
                map_batch_row,
            )
            .optional()?;
        Ok(batch)
    }

    /// 按ID查询批次
    pub fn find_by_id(&self, plan_batch_id: &str) -> RepositoryResult<Option<PlanBatch>> {
        let conn = self.get_conn()?;
        let batch = conn
            .query_row(
                r#"SELECT plan_batch_id, created_at, status, shift_window_id
                   FROM plan_batch WHERE plan_batch_id = ?"#,
                params![plan_batch_id],
                map_batch_row,
            )
            .optional()?;
        Ok(batch)
    }

    /// 读取当前批次及其 planned 状态的作业（一次加锁内完成，读到的要么是旧批次要么是新批次）
    ///
    /// # 返回
    /// - `Ok(None)`: 尚无生效批次
    /// - `Ok(Some((batch, jobs)))`: jobs 按 (machine_id, sequence_index) 升序
    pub fn load_current_planned(&self) -> RepositoryResult<Option<(PlanBatch, Vec<PlannedJob>)>> {
        let conn = self.get_conn()?;

        let batch = match Self::query_current(&conn)? {
            Some(b) => b,
            None => return Ok(None),
        };

        let sql = format!(
            r#"SELECT {}
               FROM planned_job pj
               WHERE pj.plan_batch_id = ? AND pj.status = ?
               ORDER BY pj.machine_id, pj.sequence_index"#,
            PLANNED_JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(
                params![&batch.plan_batch_id, PlannedJobStatus::Planned.to_db_str()],
                map_planned_job_row,
            )?
            .collect::<Result<Vec<PlannedJob>, _>>()?;

        Ok(Some((batch, jobs)))
    }

    /// 查询批次的全部计划作业（任意状态）
    pub fn list_by_batch(&self, plan_batch_id: &str) -> RepositoryResult<Vec<PlannedJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {}
               FROM planned_job pj
               WHERE pj.plan_batch_id = ?
               ORDER BY pj.machine_id, pj.sequence_index"#,
            PLANNED_JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![plan_batch_id], map_planned_job_row)?
            .collect::<Result<Vec<PlannedJob>, _>>()?;
        Ok(jobs)
    }

    /// 查询在制作业（已派工未完成，跨批次）
    pub fn list_in_flight(&self) -> RepositoryResult<Vec<PlannedJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {}
               FROM planned_job pj
               WHERE pj.status = ?
               ORDER BY pj.machine_id, pj.planned_job_id"#,
            PLANNED_JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(
                params![PlannedJobStatus::Dispatched.to_db_str()],
                map_planned_job_row,
            )?
            .collect::<Result<Vec<PlannedJob>, _>>()?;
        Ok(jobs)
    }

    /// 按ID查询计划作业
    pub fn find_planned_job(&self, planned_job_id: i64) -> RepositoryResult<Option<PlannedJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planned_job pj WHERE pj.planned_job_id = ?",
            PLANNED_JOB_COLUMNS
        );
        let job = conn
            .query_row(&sql, params![planned_job_id], map_planned_job_row)
            .optional()?;
        Ok(job)
    }

    /// 记录在制作业完成（dispatched -> done/cancelled）
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: planned_job_id 不存在
    /// - `RepositoryError::Conflict`: 作业不处于 dispatched 状态
    pub fn complete(
        &self,
        planned_job_id: i64,
        outcome: CompletionOutcome,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE planned_job SET status = ?, updated_at = ?
               WHERE planned_job_id = ? AND status = ?"#,
            params![
                outcome.to_status().to_db_str(),
                format_ts(&now),
                planned_job_id,
                PlannedJobStatus::Dispatched.to_db_str(),
            ],
        )?;

        if rows_affected == 0 {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM planned_job WHERE planned_job_id = ?",
                    params![planned_job_id],
                    |row| row.get(0),
                )
                .optional()?;

            return match status {
                Some(s) => Err(RepositoryError::conflict(
                    "PlannedJob",
                    planned_job_id,
                    format!("当前状态为 {}，仅 dispatched 可完成", s),
                )),
                None => Err(RepositoryError::not_found("PlannedJob", planned_job_id)),
            };
        }

        Ok(())
    }
}

fn map_batch_row(row: &rusqlite::Row) -> rusqlite::Result<PlanBatch> {
    let status_str: String = row.get(2)?;
    Ok(PlanBatch {
        plan_batch_id: row.get(0)?,
        created_at: get_ts(row, 1)?,
        status: PlanBatchStatus::from_str(&status_str),
        shift_window_id: row.get(3)?,
    })
}

/// 计划作业行映射（列顺序见 PLANNED_JOB_COLUMNS）
pub(crate) fn map_planned_job_row(row: &rusqlite::Row) -> rusqlite::Result<PlannedJob> {
    let status_str: String = row.get(12)?;
    Ok(PlannedJob {
        planned_job_id: row.get(0)?,
        plan_batch_id: row.get(1)?,
        machine_id: row.get(2)?,
        sequence_index: row.get(3)?,
        job: JobRef {
            work_order: row.get(4)?,
            part_id: row.get(5)?,
            operation_id: row.get(6)?,
        },
        machine_pallet_id: row.get(7)?,
        material_pallet_id: row.get(8)?,
        estimated_setup_minutes: row.get(9)?,
        estimated_cycle_minutes: row.get(10)?,
        score_total: row.get(11)?,
        status: PlannedJobStatus::from_str(&status_str),
        decision_id: row.get(13)?,
        created_at: get_ts(row, 14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::TimeZone;

    fn repo() -> PlanBatchRepository {
        PlanBatchRepository::new(Arc::new(Mutex::new(open_in_memory().unwrap())))
    }

    fn batch(id: &str, minute: u32) -> PlanBatch {
        PlanBatch {
            plan_batch_id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 8, minute, 0).unwrap(),
            status: PlanBatchStatus::Current,
            shift_window_id: Some(1),
        }
    }

    fn job(machine: &str, seq: i32, wo: &str) -> NewPlannedJob {
        NewPlannedJob {
            machine_id: machine.to_string(),
            sequence_index: seq,
            job: JobRef::new(wo, "P1", "10"),
            machine_pallet_id: format!("MP-{}", wo),
            material_pallet_id: "MAT1".to_string(),
            estimated_setup_minutes: 12.0,
            estimated_cycle_minutes: 30.0,
            score_total: 9.0,
        }
    }

    #[test]
    fn test_publish_retires_previous_batch_and_cancels_planned_rows() {
        let repo = repo();
        assert!(repo.publish(&batch("B1", 0), &[job("DMC1", 1, "WO1")]).unwrap().is_none());

        let retired = repo
            .publish(&batch("B2", 5), &[job("DMC1", 1, "WO2")])
            .unwrap();
        assert_eq!(retired.as_deref(), Some("B1"));

        let current = repo.find_current().unwrap().unwrap();
        assert_eq!(current.plan_batch_id, "B2");
        assert_eq!(
            repo.find_by_id("B1").unwrap().unwrap().status,
            PlanBatchStatus::Retired
        );

        let old_jobs = repo.list_by_batch("B1").unwrap();
        assert_eq!(old_jobs[0].status, PlannedJobStatus::Cancelled);
    }

    #[test]
    fn test_load_current_planned_orders_by_machine_and_sequence() {
        let repo = repo();
        assert!(repo.load_current_planned().unwrap().is_none());

        repo.publish(
            &batch("B1", 0),
            &[job("DMC2", 1, "WO3"), job("DMC1", 2, "WO2"), job("DMC1", 1, "WO1")],
        )
        .unwrap();

        let (current, jobs) = repo.load_current_planned().unwrap().unwrap();
        assert_eq!(current.plan_batch_id, "B1");
        let order: Vec<(String, i32)> = jobs
            .iter()
            .map(|j| (j.machine_id.clone(), j.sequence_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("DMC1".to_string(), 1),
                ("DMC1".to_string(), 2),
                ("DMC2".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_complete_requires_dispatched() {
        let repo = repo();
        repo.publish(&batch("B1", 0), &[job("DMC1", 1, "WO1")]).unwrap();
        let planned = repo.list_by_batch("B1").unwrap().remove(0);
        let now = Utc::now();

        let err = repo
            .complete(planned.planned_job_id, CompletionOutcome::Done, now)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));

        let err = repo.complete(9999, CompletionOutcome::Done, now).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
