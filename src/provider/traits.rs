// ==========================================
// 柔性制造单元自动排产系统 - 外部数据提供者接口
// ==========================================
// 职责: 定义引擎所需的只读接口（不包含实现）
// 红线: 只读，不写外部系统
// ==========================================

use crate::domain::job::{BacklogJob, JobRef};
use crate::domain::resource::{
    FixtureOption, FixtureStock, MachinePalletState, MaterialPalletState, NcProgram,
    ToolRequirement, ToolState,
};
use crate::provider::error::ProviderResult;
use async_trait::async_trait;

/// 积压作业
#[async_trait]
pub trait JobBacklogProvider: Send + Sync {
    /// 当前可排产的作业
    async fn active_jobs(&self) -> ProviderResult<Vec<BacklogJob>>;
}

/// NC 程序
#[async_trait]
pub trait NcProgramProvider: Send + Sync {
    /// 作业可用的程序（可多个，按机床区分）
    async fn programs_for(&self, job: &JobRef) -> ProviderResult<Vec<NcProgram>>;
}

/// 刀具库存
#[async_trait]
pub trait ToolInventoryProvider: Send + Sync {
    /// 机床刀库中的刀具
    async fn machine_tools(&self, machine_id: &str) -> ProviderResult<Vec<ToolState>>;

    /// 中央刀库中可装载的刀具
    async fn store_tools(&self) -> ProviderResult<Vec<ToolState>>;
}

/// 刀具需求
#[async_trait]
pub trait ToolRequirementProvider: Send + Sync {
    async fn requirements_for(&self, program_id: &str) -> ProviderResult<Vec<ToolRequirement>>;
}

/// 夹具
#[async_trait]
pub trait FixtureInventoryProvider: Send + Sync {
    /// 作业可用的夹具方案（为空表示无可用夹具）
    async fn fixture_options(&self, job: &JobRef) -> ProviderResult<Vec<FixtureOption>>;

    async fn fixture_stock(&self) -> ProviderResult<Vec<FixtureStock>>;
}

/// 机床托盘
#[async_trait]
pub trait MachinePalletProvider: Send + Sync {
    async fn machine_pallets(&self) -> ProviderResult<Vec<MachinePalletState>>;
}

/// 物料
#[async_trait]
pub trait MaterialAvailabilityProvider: Send + Sync {
    async fn material_pallets(&self, part_id: &str) -> ProviderResult<Vec<MaterialPalletState>>;
}
