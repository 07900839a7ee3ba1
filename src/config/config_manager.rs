// ==========================================
// 柔性制造单元自动排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约定: 缺失键取默认值；存在但无法解析的键返回错误（不静默回退）
// ==========================================

use crate::config::autopilot_config::AutopilotConfig;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值，缺失时返回默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(key)? {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| format!("配置项 {} 格式错误 (value={}): {}", key, raw, e).into()),
            None => Ok(default),
        }
    }

    /// 加载自动排产配置
    ///
    /// # 返回
    /// - Ok(AutopilotConfig): 已通过 validate 的配置
    /// - Err: 配置值无法解析或不合法
    pub fn load_autopilot_config(&self) -> Result<AutopilotConfig, Box<dyn Error>> {
        let defaults = AutopilotConfig::default();

        let machine_ids = match self.get_config_value(config_keys::MACHINE_IDS)? {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.machine_ids.clone(),
        };

        let max_tool_loads = match self.get_config_value(config_keys::MAX_TOOL_LOADS)? {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|e| {
                format!("配置项 {} 格式错误 (value={}): {}", config_keys::MAX_TOOL_LOADS, raw, e)
            })?),
            None => defaults.tool_policy.max_tool_loads,
        };

        let config = AutopilotConfig {
            machine_ids,
            jobs_per_machine: self
                .get_parsed_or(config_keys::JOBS_PER_MACHINE, defaults.jobs_per_machine)?,
            ignore_ttl_hours: self
                .get_parsed_or(config_keys::IGNORE_TTL_HOURS, defaults.ignore_ttl_hours)?,
            provider_timeout_ms: self
                .get_parsed_or(config_keys::PROVIDER_TIMEOUT_MS, defaults.provider_timeout_ms)?,
            shift_utc_offset_minutes: self.get_parsed_or(
                config_keys::SHIFT_UTC_OFFSET_MINUTES,
                defaults.shift_utc_offset_minutes,
            )?,
            max_alternatives: self
                .get_parsed_or(config_keys::MAX_ALTERNATIVES, defaults.max_alternatives)?,
            tool_policy: crate::config::ToolPolicy {
                allow_loading: self.get_parsed_or(
                    config_keys::ALLOW_TOOL_LOADING,
                    defaults.tool_policy.allow_loading,
                )?,
                max_tool_loads,
                tool_load_cost: self.get_parsed_or(
                    config_keys::TOOL_LOAD_COST,
                    defaults.tool_policy.tool_load_cost,
                )?,
            },
            setup_costs: crate::config::SetupCostModel {
                fixture_mount_minutes: self.get_parsed_or(
                    config_keys::FIXTURE_MOUNT_MINUTES,
                    defaults.setup_costs.fixture_mount_minutes,
                )?,
                fixture_unmount_minutes: self.get_parsed_or(
                    config_keys::FIXTURE_UNMOUNT_MINUTES,
                    defaults.setup_costs.fixture_unmount_minutes,
                )?,
                part_fitting_minutes: self.get_parsed_or(
                    config_keys::PART_FITTING_MINUTES,
                    defaults.setup_costs.part_fitting_minutes,
                )?,
                unload_part_minutes: self.get_parsed_or(
                    config_keys::UNLOAD_PART_MINUTES,
                    defaults.setup_costs.unload_part_minutes,
                )?,
            },
            material_move_cost: self
                .get_parsed_or(config_keys::MATERIAL_MOVE_COST, defaults.material_move_cost)?,
        };

        config.validate()?;

        tracing::debug!(
            machines = ?config.machine_ids,
            jobs_per_machine = config.jobs_per_machine,
            ignore_ttl_hours = config.ignore_ttl_hours,
            "自动排产配置加载完成"
        );
        Ok(config)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 单元
    pub const MACHINE_IDS: &str = "autopilot/machine_ids";
    pub const SHIFT_UTC_OFFSET_MINUTES: &str = "autopilot/shift_utc_offset_minutes";

    // 计划与派工
    pub const JOBS_PER_MACHINE: &str = "autopilot/jobs_per_machine";
    pub const MAX_ALTERNATIVES: &str = "autopilot/max_alternatives";
    pub const IGNORE_TTL_HOURS: &str = "autopilot/ignore_ttl_hours";
    pub const PROVIDER_TIMEOUT_MS: &str = "autopilot/provider_timeout_ms";

    // 刀具
    pub const ALLOW_TOOL_LOADING: &str = "autopilot/allow_tool_loading";
    pub const MAX_TOOL_LOADS: &str = "autopilot/max_tool_loads";
    pub const TOOL_LOAD_COST: &str = "autopilot/tool_load_cost";

    // 换型时间
    pub const FIXTURE_MOUNT_MINUTES: &str = "autopilot/fixture_mount_minutes";
    pub const FIXTURE_UNMOUNT_MINUTES: &str = "autopilot/fixture_unmount_minutes";
    pub const PART_FITTING_MINUTES: &str = "autopilot/part_fitting_minutes";
    pub const UNLOAD_PART_MINUTES: &str = "autopilot/unload_part_minutes";

    // 物料
    pub const MATERIAL_MOVE_COST: &str = "autopilot/material_move_cost";
}
