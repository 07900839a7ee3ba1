// ==========================================
// 柔性制造单元自动排产系统 - 应用层
// ==========================================
// 职责: 装配共享状态，连接命令行与 API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
