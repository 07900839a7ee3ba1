// ==========================================
// 柔性制造单元自动排产系统 - 班次窗口仓储
// ==========================================
// 职责: 班次窗口配置的读取与整体替换
// 红线: 仓储不做覆盖性校验（由 ShiftWindowTable 负责）
// ==========================================

use crate::domain::shift::{ShiftWeights, ShiftWindow};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TIME_FORMAT: &str = "%H:%M:%S";

// ==========================================
// ShiftWindowRepository - 班次窗口仓储
// ==========================================
pub struct ShiftWindowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ShiftWindowRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<ShiftWindow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT shift_window_id, name, start_time, end_time, mode,
                      weight_short_setup, weight_long_run, weight_tool_penalty,
                      weight_material_penalty, weight_machine_balance
               FROM shift_window
               ORDER BY start_time, shift_window_id"#,
        )?;
        let windows = stmt
            .query_map([], map_window_row)?
            .collect::<Result<Vec<ShiftWindow>, _>>()?;
        Ok(windows)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM shift_window", [], |row| row.get(0))?;
        Ok(n)
    }

    /// 整体替换班次窗口（单事务）
    pub fn replace_all(&self, windows: &[ShiftWindow]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM shift_window", [])?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO shift_window (
                    shift_window_id, name, start_time, end_time, mode,
                    weight_short_setup, weight_long_run, weight_tool_penalty,
                    weight_material_penalty, weight_machine_balance
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )?;
            for w in windows {
                stmt.execute(params![
                    &w.shift_window_id,
                    &w.name,
                    w.start_time.format(TIME_FORMAT).to_string(),
                    w.end_time.format(TIME_FORMAT).to_string(),
                    &w.mode,
                    &w.weights.short_setup,
                    &w.weights.long_run,
                    &w.weights.tool_penalty,
                    &w.weights.material_penalty,
                    &w.weights.machine_balance,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn map_window_row(row: &rusqlite::Row) -> rusqlite::Result<ShiftWindow> {
    Ok(ShiftWindow {
        shift_window_id: row.get(0)?,
        name: row.get(1)?,
        start_time: parse_time(2, &row.get::<_, String>(2)?)?,
        end_time: parse_time(3, &row.get::<_, String>(3)?)?,
        mode: row.get(4)?,
        weights: ShiftWeights {
            short_setup: row.get(5)?,
            long_run: row.get(6)?,
            tool_penalty: row.get(7)?,
            material_penalty: row.get(8)?,
            machine_balance: row.get(9)?,
        },
    })
}
