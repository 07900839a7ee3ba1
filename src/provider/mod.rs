// ==========================================
// 柔性制造单元自动排产系统 - 外部数据提供者层
// ==========================================
// 职责: 外部系统（ERP/刀具/夹具/托盘/物料）的只读接口与超时门面
// 红线: 引擎只通过 DataProviders 访问外部数据
// ==========================================

pub mod error;
pub mod facade;
pub mod snapshot;
pub mod traits;

pub use error::{ProviderError, ProviderResult};
pub use facade::DataProviders;
pub use snapshot::{CellSnapshot, JobFixtures, JobPrograms, SnapshotProvider};
pub use traits::{
    FixtureInventoryProvider, JobBacklogProvider, MachinePalletProvider,
    MaterialAvailabilityProvider, NcProgramProvider, ToolInventoryProvider,
    ToolRequirementProvider,
};
