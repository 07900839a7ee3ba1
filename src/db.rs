// ==========================================
// 柔性制造单元自动排产系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 统一建表 (ensure_schema) 与时间戳存储格式
// ==========================================

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式（UTC，固定毫秒位数，保证按字符串比较即按时间比较）
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存数据库并建表（单元测试使用）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
///
/// 说明：
/// - plan_batch 上的部分唯一索引保证同一时刻至多一个 CURRENT 批次
/// - decision 表通过触发器禁止 UPDATE/DELETE（仅追加）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS plan_batch (
            plan_batch_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            status TEXT NOT NULL,
            shift_window_id INTEGER,
            retired_at TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_plan_batch_single_current
            ON plan_batch(status) WHERE status = 'CURRENT';

        CREATE TABLE IF NOT EXISTS planned_job (
            planned_job_id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_batch_id TEXT NOT NULL REFERENCES plan_batch(plan_batch_id),
            machine_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            work_order TEXT NOT NULL,
            part_id TEXT NOT NULL,
            operation_id TEXT NOT NULL,
            machine_pallet_id TEXT NOT NULL,
            material_pallet_id TEXT NOT NULL,
            estimated_setup_minutes REAL NOT NULL,
            estimated_cycle_minutes REAL NOT NULL,
            score_total REAL NOT NULL,
            status TEXT NOT NULL,
            decision_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (plan_batch_id, machine_id, sequence_index)
        );
        CREATE INDEX IF NOT EXISTS idx_planned_job_batch ON planned_job(plan_batch_id, machine_id, sequence_index);
        CREATE INDEX IF NOT EXISTS idx_planned_job_status ON planned_job(status);

        CREATE TABLE IF NOT EXISTS decision (
            decision_id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            plan_batch_id TEXT NOT NULL,
            planned_job_id INTEGER NOT NULL REFERENCES planned_job(planned_job_id),
            machine_id TEXT NOT NULL,
            work_order TEXT NOT NULL,
            part_id TEXT NOT NULL,
            operation_id TEXT NOT NULL,
            machine_pallet_id TEXT NOT NULL,
            material_pallet_id TEXT NOT NULL,
            estimated_setup_minutes REAL NOT NULL,
            estimated_cycle_minutes REAL NOT NULL,
            score_total REAL NOT NULL,
            tool_penalty REAL NOT NULL,
            setup_penalty REAL NOT NULL,
            material_penalty REAL NOT NULL,
            balance_penalty REAL NOT NULL,
            run_adjustment REAL NOT NULL,
            shift_window_id INTEGER,
            action_plan_json TEXT NOT NULL
        );
        CREATE TRIGGER IF NOT EXISTS trg_decision_no_update
            BEFORE UPDATE ON decision
            BEGIN SELECT RAISE(ABORT, 'decision is append-only'); END;
        CREATE TRIGGER IF NOT EXISTS trg_decision_no_delete
            BEFORE DELETE ON decision
            BEGIN SELECT RAISE(ABORT, 'decision is append-only'); END;

        CREATE TABLE IF NOT EXISTS shift_window (
            shift_window_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            mode TEXT NOT NULL,
            weight_short_setup REAL NOT NULL,
            weight_long_run REAL NOT NULL,
            weight_tool_penalty REAL NOT NULL,
            weight_material_penalty REAL NOT NULL,
            weight_machine_balance REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_ignore (
            ignore_id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            work_order TEXT NOT NULL,
            part_id TEXT NOT NULL,
            operation_id TEXT NOT NULL,
            machine_pallet_id TEXT,
            ignore_until TEXT NOT NULL,
            reason TEXT,
            decision_id INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_job_ignore_until ON job_ignore(ignore_until);

        CREATE TABLE IF NOT EXISTS machine_status (
            machine_id TEXT PRIMARY KEY,
            is_available INTEGER NOT NULL,
            status TEXT NOT NULL,
            reason TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS setup_session (
            setup_id INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id TEXT NOT NULL,
            machine_pallet_id TEXT NOT NULL,
            work_order TEXT,
            part_id TEXT,
            operation_id TEXT,
            setup_type TEXT NOT NULL,
            decision_id INTEGER,
            start_ts TEXT NOT NULL,
            end_ts TEXT
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

// ==========================================
// 时间戳编解码
// ==========================================

/// 格式化为存储格式
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 从存储格式解析（供 map_row 使用，错误映射为列转换失败）
pub fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// 读取时间戳列
pub fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

/// 读取可空时间戳列
pub fn get_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(idx, &raw).map(Some),
        None => Ok(None),
    }
}
