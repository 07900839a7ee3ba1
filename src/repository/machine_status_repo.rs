// ==========================================
// 柔性制造单元自动排产系统 - 机床状态仓储
// ==========================================
// 职责: 机床可用性登记（按 machine_id upsert）
// 约定: 无记录的机床视为可用
// ==========================================

use crate::db::{format_ts, get_ts};
use crate::domain::control::MachineStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// MachineStatusRepository - 机床状态仓储
// ==========================================
pub struct MachineStatusRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineStatusRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入或覆盖机床状态
    pub fn upsert(&self, status: &MachineStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO machine_status (machine_id, is_available, status, reason, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(machine_id) DO UPDATE SET
                   is_available = ?2, status = ?3, reason = ?4, updated_at = ?5"#,
            params![
                &status.machine_id,
                status.is_available,
                &status.status,
                &status.reason,
                format_ts(&status.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, machine_id: &str) -> RepositoryResult<Option<MachineStatus>> {
        let conn = self.get_conn()?;
        let status = conn
            .query_row(
                r#"SELECT machine_id, is_available, status, reason, updated_at
                   FROM machine_status WHERE machine_id = ?"#,
                params![machine_id],
                map_status_row,
            )
            .optional()?;
        Ok(status)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<MachineStatus>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT machine_id, is_available, status, reason, updated_at
               FROM machine_status ORDER BY machine_id"#,
        )?;
        let rows = stmt
            .query_map([], map_status_row)?
            .collect::<Result<Vec<MachineStatus>, _>>()?;
        Ok(rows)
    }

    /// 机床 → 是否可用
    pub fn availability_map(&self) -> RepositoryResult<HashMap<String, bool>> {
        Ok(self
            .list_all()?
            .into_iter()
            .map(|s| (s.machine_id, s.is_available))
            .collect())
    }
}

fn map_status_row(row: &rusqlite::Row) -> rusqlite::Result<MachineStatus> {
    Ok(MachineStatus {
        machine_id: row.get(0)?,
        is_available: row.get(1)?,
        status: row.get(2)?,
        reason: row.get(3)?,
        updated_at: get_ts(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::Utc;

    #[test]
    fn test_upsert_overwrites() {
        let repo = MachineStatusRepository::new(Arc::new(Mutex::new(open_in_memory().unwrap())));
        let mut status = MachineStatus {
            machine_id: "DMC2".to_string(),
            is_available: false,
            status: "MAINTENANCE".to_string(),
            reason: Some("主轴保养".to_string()),
            updated_at: Utc::now(),
        };
        repo.upsert(&status).unwrap();

        status.is_available = true;
        status.status = "RUNNING".to_string();
        status.reason = None;
        repo.upsert(&status).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_available);
        assert_eq!(all[0].status, "RUNNING");
        assert_eq!(repo.availability_map().unwrap().get("DMC2"), Some(&true));
    }
}
