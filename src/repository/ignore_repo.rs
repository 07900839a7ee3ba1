// ==========================================
// 柔性制造单元自动排产系统 - 作业屏蔽仓储
// ==========================================
// 职责: 冷却期屏蔽条目的追加与按时间过滤读取
// 红线: 拒绝记录（屏蔽条目 + 计划作业 skipped）同一事务
// ==========================================

use crate::db::{format_ts, get_ts};
use crate::domain::control::{JobIgnore, NewJobIgnore};
use crate::domain::job::JobRef;
use crate::domain::types::PlannedJobStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// JobIgnoreRepository - 作业屏蔽仓储
// ==========================================
pub struct JobIgnoreRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobIgnoreRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加屏蔽条目
    pub fn insert(&self, entry: &NewJobIgnore) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::insert_with(&conn, entry)
    }

    fn insert_with(conn: &Connection, entry: &NewJobIgnore) -> RepositoryResult<i64> {
        conn.execute(
            r#"INSERT INTO job_ignore (
                created_at, work_order, part_id, operation_id,
                machine_pallet_id, ignore_until, reason, decision_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                format_ts(&entry.created_at),
                &entry.job.work_order,
                &entry.job.part_id,
                &entry.job.operation_id,
                &entry.machine_pallet_id,
                format_ts(&entry.ignore_until),
                &entry.reason,
                &entry.decision_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 记录操作员拒绝
    ///
    /// 同一事务内：
    /// 1. 追加屏蔽条目
    /// 2. 将来源计划作业置为 skipped（已是终态时不变，重复拒绝安全）
    pub fn record_refusal(
        &self,
        entry: &NewJobIgnore,
        planned_job_id: i64,
    ) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let ignore_id = Self::insert_with(&tx, entry)?;

        tx.execute(
            r#"UPDATE planned_job SET status = ?, updated_at = ?
               WHERE planned_job_id = ? AND status IN (?, ?)"#,
            params![
                PlannedJobStatus::Skipped.to_db_str(),
                format_ts(&entry.created_at),
                planned_job_id,
                PlannedJobStatus::Planned.to_db_str(),
                PlannedJobStatus::Dispatched.to_db_str(),
            ],
        )?;

        tx.commit()?;
        Ok(ignore_id)
    }

    /// 查询在 now 时刻仍生效的屏蔽条目（ignore_until > now）
    pub fn list_active(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<JobIgnore>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT ignore_id, created_at, work_order, part_id, operation_id,
                      machine_pallet_id, ignore_until, reason, decision_id
               FROM job_ignore
               WHERE ignore_until > ?
               ORDER BY ignore_id"#,
        )?;
        let entries = stmt
            .query_map(params![format_ts(&now)], map_ignore_row)?
            .collect::<Result<Vec<JobIgnore>, _>>()?;
        Ok(entries)
    }
}

fn map_ignore_row(row: &rusqlite::Row) -> rusqlite::Result<JobIgnore> {
    Ok(JobIgnore {
        ignore_id: row.get(0)?,
        created_at: get_ts(row, 1)?,
        job: JobRef {
            work_order: row.get(2)?,
            part_id: row.get(3)?,
            operation_id: row.get(4)?,
        },
        machine_pallet_id: row.get(5)?,
        ignore_until: get_ts(row, 6)?,
        reason: row.get(7)?,
        decision_id: row.get(8)?,
    })
}
