// ==========================================
// 柔性制造单元自动排产系统 - 候选生成引擎
// ==========================================
// 职责: 对 (作业, 机床) 组合做硬约束检查，输出可行候选
// 硬约束: 工艺路线、NC程序、刀具（在库/可装载）、夹具+托盘、物料
// 红线: 任一硬约束不满足即整体排除，不产生部分候选
// 红线: 所有排除必须输出 reason
// 红线: Engine 不拼 SQL，不访问外部系统（输入为 ConstraintSnapshot）
// ==========================================

use crate::config::{SetupCostModel, ToolPolicy};
use crate::domain::job::BacklogJob;
use crate::domain::plan::{BlockedJob, Candidate};
use crate::domain::resource::{
    ConstraintSnapshot, FixtureOption, MachinePalletState, MaterialPalletState, NcProgram,
};
use crate::domain::types::{FixtureChange, PalletPhase};
use tracing::debug;


/// 候选生成结果
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub candidates: Vec<Candidate>,
    /// 无任何可行机床的作业
    pub blocked: Vec<BlockedJob>,
}

// ==========================================
// CandidateGenerator - 候选生成器
// ==========================================
pub struct CandidateGenerator {
    tool_policy: ToolPolicy,
    setup_costs: SetupCostModel,
}

impl CandidateGenerator {
    pub fn new(tool_policy: ToolPolicy, setup_costs: SetupCostModel) -> Self {
        Self {
            tool_policy,
            setup_costs,
        }
    }

    /// 批量生成候选
    ///
    /// # 参数
    /// - `jobs`: 积压作业
    /// - `snapshot`: 约束快照
    /// - `available_machines`: 当前可用机床（不可用机床不参与）
    ///
    /// # 返回
    /// - candidates: 每个 (作业, 机床, 可行托盘) 一条
    /// - blocked: 所有机床均不可行的作业及原因
    pub fn generate(
        &self,
        jobs: &[BacklogJob],
        snapshot: &ConstraintSnapshot,
        available_machines: &[String],
    ) -> GenerationResult {
        let mut result = GenerationResult::default();

        for job in jobs {
            if job.required_quantity > 0 && job.remaining_quantity() == 0 {
                result.blocked.push(BlockedJob {
                    job: job.job.clone(),
                    reasons: vec!["剩余数量为 0".to_string()],
                });
                continue;
            }

            if available_machines.is_empty() {
                result.blocked.push(BlockedJob {
                    job: job.job.clone(),
                    reasons: vec!["无可用机床".to_string()],
                });
                continue;
            }

            let mut reasons = Vec::new();
            let before = result.candidates.len();
            for machine_id in available_machines {
                match self.candidates_for(job, machine_id, snapshot) {
                    Ok(mut list) => result.candidates.append(&mut list),
                    Err(reason) => reasons.push(format!("{}: {}", machine_id, reason)),
                }
            }

            if result.candidates.len() == before {
                debug!(job = %job.job, reasons = ?reasons, "作业无可行机床");
                result.blocked.push(BlockedJob {
                    job: job.job.clone(),
                    reasons,
                });
            }
        }

        result
    }

    /// 单个 (作业, 机床) 的可行候选（每个可行托盘一条）
    ///
    /// # 返回
    /// - Ok(Vec<Candidate>): 非空
    /// - Err(String): 首个不满足的硬约束
    pub fn candidates_for(
        &self,
        job: &BacklogJob,
        machine_id: &str,
        snapshot: &ConstraintSnapshot,
    ) -> Result<Vec<Candidate>, String> {
        // 1. 工艺路线
        if !job.allows_machine(machine_id) {
            return Err("工艺路线不允许该机床".to_string());
        }

        // 2. NC 程序 + 3. 刀具
        let (program_id, tools_to_load) = self.select_program(job, machine_id, snapshot)?;

        // 4. 夹具 + 托盘
        let pallets = self.feasible_pallets(job, machine_id, snapshot)?;

        // 5. 物料
        let material = select_material(&job.job.part_id, snapshot)
            .ok_or_else(|| format!("零件 {} 无可用物料", job.job.part_id))?;

        Ok(pallets
            .into_iter()
            .map(|(pallet, option, change)| Candidate {
                machine_id: machine_id.to_string(),
                job: job.job.clone(),
                program_id: program_id.clone(),
                machine_pallet_id: pallet.pallet_id.clone(),
                material_pallet_id: material.pallet_id.clone(),
                fixture_code: option.fixture_code.clone(),
                fixture_change: change,
                tools_to_load: tools_to_load.clone(),
                setup_minutes: self.setup_minutes(change, pallet),
                cycle_minutes: job.estimated_cycle_minutes.max(0.0),
                handling_moves: material.handling_moves,
            })
            .collect())
    }

    /// 选择装载刀具最少的可行程序
    fn select_program(
        &self,
        job: &BacklogJob,
        machine_id: &str,
        snapshot: &ConstraintSnapshot,
    ) -> Result<(String, Vec<String>), String> {
        let programs: Vec<&NcProgram> = snapshot
            .programs
            .get(&job.job)
            .map(|list| list.iter().filter(|p| p.runs_on(machine_id)).collect())
            .unwrap_or_default();

        if programs.is_empty() {
            return Err("无适用 NC 程序".to_string());
        }

        let mut best: Option<(String, Vec<String>)> = None;
        let mut first_error: Option<String> = None;
        for program in programs {
            match self.check_tools(&program.program_id, machine_id, snapshot) {
                Ok(loads) => {
                    let better = match &best {
                        None => true,
                        Some((best_id, best_loads)) => {
                            (loads.len(), &program.program_id) < (best_loads.len(), best_id)
                        }
                    };
                    if better {
                        best = Some((program.program_id.clone(), loads));
                    }
                }
                Err(reason) => {
                    if first_error.is_none() {
                        first_error = Some(reason);
                    }
                }
            }
        }

        best.ok_or_else(|| first_error.unwrap_or_else(|| "刀具不满足".to_string()))
    }

    /// 刀具检查
    ///
    /// # 返回
    /// - Ok(需装载刀具列表)：所有刀具在刀库且寿命足够，或可按策略从中央刀库装载
    /// - Err(原因)
    fn check_tools(
        &self,
        program_id: &str,
        machine_id: &str,
        snapshot: &ConstraintSnapshot,
    ) -> Result<Vec<String>, String> {
        let requirements = snapshot
            .tool_requirements
            .get(program_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let magazine = snapshot
            .machine_tools
            .get(machine_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        let mut to_load = Vec::new();
        for req in requirements {
            let loaded = magazine
                .iter()
                .any(|t| t.tool_id == req.tool_id && t.covers(req));
            if loaded {
                continue;
            }

            let in_store = snapshot
                .store_tools
                .iter()
                .any(|t| t.tool_id == req.tool_id && t.covers(req));
            if !in_store {
                return Err(format!("缺少刀具 {}", req.tool_id));
            }
            if !to_load.contains(&req.tool_id) {
                to_load.push(req.tool_id.clone());
            }
        }

        if !to_load.is_empty() {
            if !self.tool_policy.allow_loading {
                return Err(format!("需装载刀具 {:?}，策略禁止装载", to_load));
            }
            if let Some(max) = self.tool_policy.max_tool_loads {
                if to_load.len() > max as usize {
                    return Err(format!(
                        "需装载 {} 把刀具，超过上限 {}",
                        to_load.len(),
                        max
                    ));
                }
            }
        }

        Ok(to_load)
    }

    /// 可行托盘（每个托盘取换型最少的夹具方案）
    fn feasible_pallets<'s>(
        &self,
        job: &BacklogJob,
        machine_id: &str,
        snapshot: &'s ConstraintSnapshot,
    ) -> Result<Vec<(&'s MachinePalletState, &'s FixtureOption, FixtureChange)>, String> {
        let options = snapshot
            .fixture_options
            .get(&job.job)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        if options.is_empty() {
            return Err("无可用夹具方案".to_string());
        }

        let mut feasible = Vec::new();
        let mut saw_pallet = false;
        for pallet in &snapshot.machine_pallets {
            if !pallet.is_active || pallet.phase == PalletPhase::Machining || !pallet.serves(machine_id) {
                continue;
            }
            saw_pallet = true;

            let best = options
                .iter()
                .filter_map(|option| {
                    fixture_change_for(pallet, option, snapshot).map(|change| (option, change))
                })
                .min_by_key(|(option, change)| (change_rank(*change), option.fixture_code.clone()));

            if let Some((option, change)) = best {
                feasible.push((pallet, option, change));
            }
        }

        if feasible.is_empty() {
            return Err(if saw_pallet {
                "无托盘可安装所需夹具".to_string()
            } else {
                "无空闲机床托盘".to_string()
            });
        }
        Ok(feasible)
    }

    /// 换型时间（分钟）
    pub fn setup_minutes(&self, change: FixtureChange, pallet: &MachinePalletState) -> f64 {
        let c = &self.setup_costs;
        let fixture = match change {
            FixtureChange::Keep => 0.0,
            FixtureChange::Mount => c.fixture_mount_minutes,
            FixtureChange::Swap => c.fixture_unmount_minutes + c.fixture_mount_minutes,
        };
        let unload = if pallet.part_on_pallet.is_some() {
            c.unload_part_minutes
        } else {
            0.0
        };
        fixture + c.part_fitting_minutes + unload
    }
}

/// 托盘能否承载该夹具方案
fn fixture_change_for(
    pallet: &MachinePalletState,
    option: &FixtureOption,
    snapshot: &ConstraintSnapshot,
) -> Option<FixtureChange> {
    if pallet.fixture_code.as_deref() == Some(option.fixture_code.as_str()) {
        return Some(FixtureChange::Keep);
    }

    let plaque_ok = match option.plaque_model.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(required) => pallet
            .plaque_model
            .as_deref()
            .map(|p| p.trim().eq_ignore_ascii_case(required))
            .unwrap_or(false),
    };
    if !plaque_ok {
        return None;
    }

    // 夹具必须在库且有空闲
    let stock_ok = snapshot
        .fixture_stock
        .get(&option.fixture_code)
        .map(|s| s.has_free_unit())
        .unwrap_or(false);
    if !stock_ok {
        return None;
    }

    Some(if pallet.fixture_code.is_some() {
        FixtureChange::Swap
    } else {
        FixtureChange::Mount
    })
}

fn change_rank(change: FixtureChange) -> u8 {
    match change {
        FixtureChange::Keep => 0,
        FixtureChange::Mount => 1,
        FixtureChange::Swap => 2,
    }
}

/// 选择搬运次数最少的有料托盘
fn select_material<'s>(part_id: &str, snapshot: &'s ConstraintSnapshot) -> Option<&'s MaterialPalletState> {
    snapshot
        .material_pallets
        .get(part_id)?
        .iter()
        .filter(|m| m.has_stock())
        .min_by(|a, b| {
            a.handling_moves
                .cmp(&b.handling_moves)
                .then_with(|| a.pallet_id.cmp(&b.pallet_id))
        })
}
