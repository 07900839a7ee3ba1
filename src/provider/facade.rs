// ==========================================
// 柔性制造单元自动排产系统 - 数据提供者门面
// ==========================================
// 职责: 聚合 7 个只读提供者，统一超时控制，组装约束快照
// 红线: 每次调用都受 provider_timeout 约束，超时即 ProviderError::Timeout
// ==========================================

use crate::domain::job::{BacklogJob, JobRef};
use crate::domain::resource::{ConstraintSnapshot, FixtureStock};
use crate::provider::error::{ProviderError, ProviderResult};
use crate::provider::traits::{
    FixtureInventoryProvider, JobBacklogProvider, MachinePalletProvider,
    MaterialAvailabilityProvider, NcProgramProvider, ToolInventoryProvider,
    ToolRequirementProvider,
};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 数据提供者集合
///
/// # 包含的提供者
/// - `backlog`: 积压作业
/// - `programs`: NC 程序
/// - `tools`: 机床刀库与中央刀库
/// - `tool_requirements`: 程序刀具需求
/// - `fixtures`: 夹具方案与库存
/// - `pallets`: 机床托盘
/// - `materials`: 物料托盘
#[derive(Clone)]
pub struct DataProviders {
    pub backlog: Arc<dyn JobBacklogProvider>,
    pub programs: Arc<dyn NcProgramProvider>,
    pub tools: Arc<dyn ToolInventoryProvider>,
    pub tool_requirements: Arc<dyn ToolRequirementProvider>,
    pub fixtures: Arc<dyn FixtureInventoryProvider>,
    pub pallets: Arc<dyn MachinePalletProvider>,
    pub materials: Arc<dyn MaterialAvailabilityProvider>,
    timeout: Duration,
}

impl DataProviders {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backlog: Arc<dyn JobBacklogProvider>,
        programs: Arc<dyn NcProgramProvider>,
        tools: Arc<dyn ToolInventoryProvider>,
        tool_requirements: Arc<dyn ToolRequirementProvider>,
        fixtures: Arc<dyn FixtureInventoryProvider>,
        pallets: Arc<dyn MachinePalletProvider>,
        materials: Arc<dyn MaterialAvailabilityProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            backlog,
            programs,
            tools,
            tool_requirements,
            fixtures,
            pallets,
            materials,
            timeout,
        }
    }

    /// 用同一个实现提供全部 7 个接口（内存快照、测试替身）
    pub fn from_single<P>(provider: Arc<P>, timeout: Duration) -> Self
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
        Self::new(
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider,
            timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 带超时执行一次提供者调用
    async fn guarded<T, F>(&self, provider: &str, fut: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(provider, error = %e, "数据提供者调用失败");
                }
                result
            }
            Err(_) => {
                warn!(provider, timeout_ms = self.timeout.as_millis() as u64, "数据提供者调用超时");
                Err(ProviderError::Timeout {
                    provider: provider.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// 读取积压作业
    pub async fn load_backlog(&self) -> ProviderResult<Vec<BacklogJob>> {
        self.guarded("job_backlog", self.backlog.active_jobs()).await
    }

    /// 组装完整约束快照（任一调用失败则整体失败）
    ///
    /// # 参数
    /// - `jobs`: 参与排产的作业
    /// - `machine_ids`: 需要读取刀库的机床
    pub async fn load_snapshot(
        &self,
        jobs: &[BacklogJob],
        machine_ids: &[String],
    ) -> ProviderResult<ConstraintSnapshot> {
        let job_refs: Vec<&JobRef> = jobs.iter().map(|j| &j.job).collect();
        self.load_for(&job_refs, machine_ids).await
    }

    /// 组装单个 (作业, 机床) 的约束快照，用于派工前复核
    pub async fn load_for_job(
        &self,
        job: &JobRef,
        machine_id: &str,
    ) -> ProviderResult<ConstraintSnapshot> {
        self.load_for(&[job], &[machine_id.to_string()]).await
    }

    async fn load_for(
        &self,
        jobs: &[&JobRef],
        machine_ids: &[String],
    ) -> ProviderResult<ConstraintSnapshot> {
        // 1. 作业级数据：程序 + 夹具方案
        let programs = try_join_all(jobs.iter().map(|job| async move {
            let list = self.guarded("nc_program", self.programs.programs_for(job)).await?;
            Ok::<_, ProviderError>(((*job).clone(), list))
        }));
        let fixture_options = try_join_all(jobs.iter().map(|job| async move {
            let list = self
                .guarded("fixture_inventory", self.fixtures.fixture_options(job))
                .await?;
            Ok::<_, ProviderError>(((*job).clone(), list))
        }));

        // 2. 单元级数据：刀库、托盘、夹具库存
        let machine_tools = try_join_all(machine_ids.iter().map(|machine_id| async move {
            let list = self
                .guarded("tool_inventory", self.tools.machine_tools(machine_id))
                .await?;
            Ok::<_, ProviderError>((machine_id.clone(), list))
        }));
        let store_tools = self.guarded("tool_inventory", self.tools.store_tools());
        let fixture_stock = self.guarded("fixture_inventory", self.fixtures.fixture_stock());
        let pallets = self.guarded("machine_pallet", self.pallets.machine_pallets());

        // 3. 物料按零件去重读取
        let part_ids: BTreeSet<&str> = jobs.iter().map(|j| j.part_id.as_str()).collect();
        let materials = try_join_all(part_ids.into_iter().map(|part_id| async move {
            let list = self
                .guarded("material_availability", self.materials.material_pallets(part_id))
                .await?;
            Ok::<_, ProviderError>((part_id.to_string(), list))
        }));

        let (programs, fixture_options, machine_tools, store_tools, fixture_stock, pallets, materials) =
            futures::try_join!(
                programs,
                fixture_options,
                machine_tools,
                store_tools,
                fixture_stock,
                pallets,
                materials
            )?;

        // 4. 刀具需求依赖程序列表，按程序去重读取
        let program_ids: BTreeSet<String> = programs
            .iter()
            .flat_map(|(_, list)| list.iter().map(|p| p.program_id.clone()))
            .collect();
        let tool_requirements = try_join_all(program_ids.into_iter().map(|program_id| async move {
            let list = self
                .guarded(
                    "tool_requirement",
                    self.tool_requirements.requirements_for(&program_id),
                )
                .await?;
            Ok::<_, ProviderError>((program_id, list))
        }))
        .await?;

        let snapshot = ConstraintSnapshot {
            programs: programs.into_iter().collect(),
            tool_requirements: tool_requirements.into_iter().collect(),
            machine_tools: machine_tools.into_iter().collect(),
            store_tools,
            fixture_options: fixture_options.into_iter().collect(),
            fixture_stock: fixture_stock
                .into_iter()
                .map(|s| (s.fixture_code.clone(), s))
                .collect::<HashMap<String, FixtureStock>>(),
            machine_pallets: pallets,
            material_pallets: materials.into_iter().collect(),
        };

        debug!(
            jobs = jobs.len(),
            machines = machine_ids.len(),
            pallets = snapshot.machine_pallets.len(),
            "约束快照组装完成"
        );
        Ok(snapshot)
    }
}
