// ==========================================
// 柔性制造单元自动排产系统 - 内存快照数据提供者
// ==========================================
// 职责: 以 JSON 快照实现全部 7 个提供者接口
// 用途: 命令行演示、集成测试、现场数据回放
// ==========================================

use crate::domain::job::{BacklogJob, JobRef};
use crate::domain::resource::{
    FixtureOption, FixtureStock, MachinePalletState, MaterialPalletState, NcProgram,
    ToolRequirement, ToolState,
};
use crate::provider::error::{ProviderError, ProviderResult};
use crate::provider::traits::{
    FixtureInventoryProvider, JobBacklogProvider, MachinePalletProvider,
    MaterialAvailabilityProvider, NcProgramProvider, ToolInventoryProvider,
    ToolRequirementProvider,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

// ==========================================
// CellSnapshot - 单元快照（JSON 格式）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    #[serde(default)]
    pub jobs: Vec<BacklogJob>,
    #[serde(default)]
    pub programs: Vec<JobPrograms>,
    /// 程序 → 刀具需求
    #[serde(default)]
    pub tool_requirements: HashMap<String, Vec<ToolRequirement>>,
    /// 机床 → 刀库
    #[serde(default)]
    pub machine_tools: HashMap<String, Vec<ToolState>>,
    #[serde(default)]
    pub store_tools: Vec<ToolState>,
    #[serde(default)]
    pub fixture_options: Vec<JobFixtures>,
    #[serde(default)]
    pub fixture_stock: Vec<FixtureStock>,
    #[serde(default)]
    pub machine_pallets: Vec<MachinePalletState>,
    #[serde(default)]
    pub material_pallets: Vec<MaterialPalletState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPrograms {
    pub job: JobRef,
    pub programs: Vec<NcProgram>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFixtures {
    pub job: JobRef,
    pub options: Vec<FixtureOption>,
}

impl CellSnapshot {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json_str(&raw)?)
    }
}

// ==========================================
// SnapshotProvider - 内存快照提供者
// ==========================================
// 支持运行时替换快照与故障注入（不可用/延迟）
pub struct SnapshotProvider {
    snapshot: RwLock<CellSnapshot>,
    unavailable: RwLock<Option<String>>,
    latency: RwLock<Option<Duration>>,
}

impl SnapshotProvider {
    pub fn new(snapshot: CellSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            unavailable: RwLock::new(None),
            latency: RwLock::new(None),
        }
    }

    /// 修改快照（模拟现场状态变化）
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut CellSnapshot),
    {
        if let Ok(mut guard) = self.snapshot.write() {
            f(&mut guard);
        }
    }

    /// 标记某个提供者不可用（None 恢复）
    pub fn set_unavailable(&self, provider: Option<&str>) {
        if let Ok(mut guard) = self.unavailable.write() {
            *guard = provider.map(|s| s.to_string());
        }
    }

    /// 为每次调用注入延迟（None 取消）
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.write() {
            *guard = latency;
        }
    }

    /// 调用前置：延迟 + 可用性检查
    async fn enter(&self, provider: &str) -> ProviderResult<()> {
        let latency = self.latency.read().ok().and_then(|g| *g);
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        let down = self
            .unavailable
            .read()
            .map_err(|e| ProviderError::unavailable(provider, e.to_string()))?
            .clone();
        match down {
            Some(p) if p == provider || p == "*" => {
                Err(ProviderError::unavailable(provider, "故障注入"))
            }
            _ => Ok(()),
        }
    }

    fn read<T>(&self, provider: &str, f: impl FnOnce(&CellSnapshot) -> T) -> ProviderResult<T> {
        let guard = self
            .snapshot
            .read()
            .map_err(|e| ProviderError::unavailable(provider, e.to_string()))?;
        Ok(f(&guard))
    }
}

#[async_trait]
impl JobBacklogProvider for SnapshotProvider {
    async fn active_jobs(&self) -> ProviderResult<Vec<BacklogJob>> {
        self.enter("job_backlog").await?;
        self.read("job_backlog", |s| s.jobs.clone())
    }
}

#[async_trait]
impl NcProgramProvider for SnapshotProvider {
    async fn programs_for(&self, job: &JobRef) -> ProviderResult<Vec<NcProgram>> {
        self.enter("nc_program").await?;
        self.read("nc_program", |s| {
            s.programs
                .iter()
                .filter(|p| &p.job == job)
                .flat_map(|p| p.programs.iter().cloned())
                .collect()
        })
    }
}

#[async_trait]
impl ToolInventoryProvider for SnapshotProvider {
    async fn machine_tools(&self, machine_id: &str) -> ProviderResult<Vec<ToolState>> {
        self.enter("tool_inventory").await?;
        self.read("tool_inventory", |s| {
            s.machine_tools.get(machine_id).cloned().unwrap_or_default()
        })
    }

    async fn store_tools(&self) -> ProviderResult<Vec<ToolState>> {
        self.enter("tool_inventory").await?;
        self.read("tool_inventory", |s| s.store_tools.clone())
    }
}

#[async_trait]
impl ToolRequirementProvider for SnapshotProvider {
    async fn requirements_for(&self, program_id: &str) -> ProviderResult<Vec<ToolRequirement>> {
        self.enter("tool_requirement").await?;
        self.read("tool_requirement", |s| {
            s.tool_requirements.get(program_id).cloned().unwrap_or_default()
        })
    }
}

#[async_trait]
impl FixtureInventoryProvider for SnapshotProvider {
    async fn fixture_options(&self, job: &JobRef) -> ProviderResult<Vec<FixtureOption>> {
        self.enter("fixture_inventory").await?;
        self.read("fixture_inventory", |s| {
            s.fixture_options
                .iter()
                .filter(|f| &f.job == job)
                .flat_map(|f| f.options.iter().cloned())
                .collect()
        })
    }

    async fn fixture_stock(&self) -> ProviderResult<Vec<FixtureStock>> {
        self.enter("fixture_inventory").await?;
        self.read("fixture_inventory", |s| s.fixture_stock.clone())
    }
}

#[async_trait]
impl MachinePalletProvider for SnapshotProvider {
    async fn machine_pallets(&self) -> ProviderResult<Vec<MachinePalletState>> {
        self.enter("machine_pallet").await?;
        self.read("machine_pallet", |s| s.machine_pallets.clone())
    }
}

#[async_trait]
impl MaterialAvailabilityProvider for SnapshotProvider {
    async fn material_pallets(&self, part_id: &str) -> ProviderResult<Vec<MaterialPalletState>> {
        self.enter("material_availability").await?;
        self.read("material_availability", |s| {
            s.material_pallets
                .iter()
                .filter(|m| m.part_id == part_id)
                .cloned()
                .collect()
        })
    }
}
