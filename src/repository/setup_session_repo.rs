// ==========================================
// 柔性制造单元自动排产系统 - 换型会话仓储
// ==========================================
// 职责: 换型遥测（开始/结束）
// 约定: end = max(now, start)；重复结束返回 Conflict
// ==========================================

use crate::db::{format_ts, get_opt_ts, get_ts};
use crate::domain::control::{NewSetupSession, SetupSession};
use crate::domain::job::JobRef;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const SESSION_COLUMNS: &str = r#"setup_id, machine_id, machine_pallet_id,
       work_order, part_id, operation_id, setup_type, decision_id, start_ts, end_ts"#;

// ==========================================
// SetupSessionRepository - 换型会话仓储
// ==========================================
pub struct SetupSessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SetupSessionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 开始换型，返回 setup_id
    pub fn start(&self, session: &NewSetupSession, now: DateTime<Utc>) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let job = session.job.as_ref();
        conn.execute(
            r#"INSERT INTO setup_session (
                machine_id, machine_pallet_id, work_order, part_id, operation_id,
                setup_type, decision_id, start_ts, end_ts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
            params![
                &session.machine_id,
                &session.machine_pallet_id,
                job.map(|j| j.work_order.as_str()),
                job.map(|j| j.part_id.as_str()),
                job.map(|j| j.operation_id.as_str()),
                &session.setup_type,
                &session.decision_id,
                format_ts(&now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 结束换型
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: setup_id 不存在
    /// - `RepositoryError::Conflict`: 会话已结束
    pub fn end(&self, setup_id: i64, now: DateTime<Utc>) -> RepositoryResult<SetupSession> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let sql = format!("SELECT {} FROM setup_session WHERE setup_id = ?", SESSION_COLUMNS);
        let mut session = tx
            .query_row(&sql, params![setup_id], map_session_row)
            .optional()?
            .ok_or_else(|| RepositoryError::not_found("SetupSession", setup_id))?;

        if session.end_ts.is_some() {
            return Err(RepositoryError::conflict("SetupSession", setup_id, "会话已结束"));
        }

        // 时钟回拨时不允许出现负时长
        let end_ts = now.max(session.start_ts);

        let rows_affected = tx.execute(
            "UPDATE setup_session SET end_ts = ? WHERE setup_id = ? AND end_ts IS NULL",
            params![format_ts(&end_ts), setup_id],
        )?;
        if rows_affected == 0 {
            return Err(RepositoryError::conflict("SetupSession", setup_id, "会话已结束"));
        }

        tx.commit()?;
        session.end_ts = Some(end_ts);
        Ok(session)
    }

    pub fn find_by_id(&self, setup_id: i64) -> RepositoryResult<Option<SetupSession>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM setup_session WHERE setup_id = ?", SESSION_COLUMNS);
        let session = conn
            .query_row(&sql, params![setup_id], map_session_row)
            .optional()?;
        Ok(session)
    }
}

fn map_session_row(row: &rusqlite::Row) -> rusqlite::Result<SetupSession> {
    let work_order: Option<String> = row.get(3)?;
    let part_id: Option<String> = row.get(4)?;
    let operation_id: Option<String> = row.get(5)?;
    let job = match (work_order, part_id, operation_id) {
        (Some(work_order), Some(part_id), Some(operation_id)) => Some(JobRef {
            work_order,
            part_id,
            operation_id,
        }),
        _ => None,
    };

    Ok(SetupSession {
        setup_id: row.get(0)?,
        machine_id: row.get(1)?,
        machine_pallet_id: row.get(2)?,
        job,
        setup_type: row.get(6)?,
        decision_id: row.get(7)?,
        start_ts: get_ts(row, 8)?,
        end_ts: get_opt_ts(row, 9)?,
    })
}
