// ==========================================
// 柔性制造单元自动排产系统 - 应用状态
// ==========================================
// 职责: 打开共享连接、加载配置与班次表、装配引擎与 API
// 红线: 配置或班次表不合法时启动失败（不带病运行）
// ==========================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{ApiError, ApiResult, AutopilotApi};
use crate::config::{AutopilotConfig, ConfigManager};
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{
    default_shift_windows, AutopilotRepositories, Dispatcher, Planner, ShiftWindowResolver,
    ShiftWindowTable,
};
use crate::provider::{
    DataProviders, FixtureInventoryProvider, JobBacklogProvider, MachinePalletProvider,
    MaterialAvailabilityProvider, NcProgramProvider, ToolInventoryProvider,
    ToolRequirementProvider,
};

/// 应用状态
///
/// 包含 API 实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 已校验的自动排产配置
    pub config: Arc<AutopilotConfig>,

    /// 配置管理器（读写 config_kv）
    pub config_manager: Arc<ConfigManager>,

    /// 自动排产 API
    pub autopilot_api: Arc<AutopilotApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - build_providers: 按配置的超时构造数据提供者集合
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开共享连接并建表
    /// 2. 加载并校验配置
    /// 3. 加载班次表（空表时写入默认班次）
    /// 4. 装配计划器、派工器与 API
    pub fn new<F>(db_path: String, build_providers: F) -> ApiResult<Self>
    where
        F: FnOnce(Duration) -> DataProviders,
    {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| ApiError::DatabaseError(format!("无法打开数据库: {}", e)))?;
        ensure_schema(&conn).map_err(|e| ApiError::DatabaseError(format!("建表失败: {}", e)))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| ApiError::ConfigError(format!("无法创建ConfigManager: {}", e)))?,
        );
        let config = Arc::new(
            config_manager
                .load_autopilot_config()
                .map_err(|e| ApiError::ConfigError(e.to_string()))?,
        );

        // ==========================================
        // Repository 层
        // ==========================================
        let repos = AutopilotRepositories::from_connection(conn);

        // ==========================================
        // 班次表（fail closed）
        // ==========================================
        if repos.shift_window_repo.count()? == 0 {
            tracing::warn!("班次表为空，写入默认白班/夜班");
            repos
                .shift_window_repo
                .replace_all(&default_shift_windows())?;
        }
        let table = ShiftWindowTable::new(repos.shift_window_repo.list_all()?)?;
        let shift_windows = Arc::new(ShiftWindowResolver::new(
            table,
            config.shift_utc_offset_minutes,
        ));

        // ==========================================
        // Engine 层
        // ==========================================
        let providers = build_providers(Duration::from_millis(config.provider_timeout_ms));

        let planner = Arc::new(Planner::new(
            providers.clone(),
            repos.clone(),
            shift_windows.clone(),
            config.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            providers,
            repos.clone(),
            shift_windows.clone(),
            config.clone(),
        ));

        // ==========================================
        // API 层
        // ==========================================
        let autopilot_api = Arc::new(AutopilotApi::new(
            planner,
            dispatcher,
            repos,
            shift_windows,
            config.clone(),
        ));

        tracing::info!(machines = ?config.machine_ids, "AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            config_manager,
            autopilot_api,
        })
    }

    /// 用同一个实现提供全部数据接口（如内存快照）
    pub fn with_provider<P>(db_path: String, provider: Arc<P>) -> ApiResult<Self>
    where
        P: JobBacklogProvider
            + NcProgramProvider
            + ToolInventoryProvider
            + ToolRequirementProvider
            + FixtureInventoryProvider
            + MachinePalletProvider
            + MaterialAvailabilityProvider
            + 'static,
    {
        Self::new(db_path, move |timeout| {
            DataProviders::from_single(provider, timeout)
        })
    }
}

// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 FMS_AUTOPILOT_DB_PATH（非空时）
/// - 用户数据目录/fms-autopilot/fms_autopilot.db
/// - 无法获取数据目录时: ./fms_autopilot.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("FMS_AUTOPILOT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./fms_autopilot.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("fms-autopilot");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("fms_autopilot.db");
        }
    }

    path.to_string_lossy().to_string()
}
