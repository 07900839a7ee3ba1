// ==========================================
// 柔性制造单元自动排产系统 - 操作计划生成
// ==========================================
// 职责: 为选中的候选生成装载站操作步骤与夹具硬件清单
// 步骤顺序: 卸件 → 核对/拆装夹具 → 装载毛坯
// ==========================================

use crate::domain::decision::{ActionPlan, ActionPlanStep, FixtureHardware};
use crate::domain::job::JobRef;
use crate::domain::plan::Candidate;
use crate::domain::resource::{ConstraintSnapshot, MachinePalletState};
use crate::domain::types::ActionStepType;
use serde_json::json;

/// 硬件清单最多列出的夹具数
const MAX_FIXTURE_HARDWARE: usize = 3;

/// 生成操作计划
///
/// # 参数
/// - `candidate`: 已复核的候选
/// - `snapshot`: 复核时使用的约束快照（托盘当前状态、夹具库存、夹具方案）
pub fn build(candidate: &Candidate, snapshot: &ConstraintSnapshot) -> ActionPlan {
    let pallet = snapshot
        .machine_pallets
        .iter()
        .find(|p| p.pallet_id == candidate.machine_pallet_id);

    let mut steps = Vec::new();

    // 1. 卸下托盘上的成品
    if let Some(part) = pallet.and_then(|p| p.part_on_pallet.as_ref()) {
        steps.push(ActionPlanStep {
            step_type: ActionStepType::UnloadPart,
            description: format!("从托盘 {} 卸下零件 {}", candidate.machine_pallet_id, part),
            metadata: json!({
                "machine_pallet_id": candidate.machine_pallet_id,
                "part_id": part,
            }),
        });
    }

    // 2. 夹具
    steps.extend(fixture_steps(candidate, pallet));

    // 3. 装载毛坯
    steps.push(ActionPlanStep {
        step_type: ActionStepType::LoadRawMaterial,
        description: format!(
            "从物料托盘 {} 取零件 {} 装夹到托盘 {}",
            candidate.material_pallet_id, candidate.job.part_id, candidate.machine_pallet_id
        ),
        metadata: json!({
            "material_pallet_id": candidate.material_pallet_id,
            "machine_pallet_id": candidate.machine_pallet_id,
            "part_id": candidate.job.part_id,
            "program_id": candidate.program_id,
            "tools_to_load": candidate.tools_to_load,
        }),
    });

    ActionPlan {
        steps,
        fixture_hardware: fixture_hardware(&candidate.fixture_code, &candidate.job, snapshot),
    }
}

fn fixture_steps(candidate: &Candidate, pallet: Option<&MachinePalletState>) -> Vec<ActionPlanStep> {
    let installed = pallet.and_then(|p| p.fixture_code.as_deref());

    if installed == Some(candidate.fixture_code.as_str()) {
        return vec![ActionPlanStep {
            step_type: ActionStepType::VerifyFixture,
            description: format!(
                "核对托盘 {} 上的夹具 {}",
                candidate.machine_pallet_id, candidate.fixture_code
            ),
            metadata: json!({
                "machine_pallet_id": candidate.machine_pallet_id,
                "fixture_code": candidate.fixture_code,
            }),
        }];
    }

    let mut steps = Vec::new();
    if let Some(old) = installed {
        steps.push(ActionPlanStep {
            step_type: ActionStepType::UnmountFixture,
            description: format!("从托盘 {} 拆除夹具 {}", candidate.machine_pallet_id, old),
            metadata: json!({
                "machine_pallet_id": candidate.machine_pallet_id,
                "fixture_code": old,
            }),
        });
    }
    steps.push(ActionPlanStep {
        step_type: ActionStepType::MountFixture,
        description: format!(
            "在托盘 {} 安装夹具 {}",
            candidate.machine_pallet_id, candidate.fixture_code
        ),
        metadata: json!({
            "machine_pallet_id": candidate.machine_pallet_id,
            "fixture_code": candidate.fixture_code,
        }),
    });
    steps
}

/// 硬件清单：所选夹具在前，其余夹具方案按顺序补足
fn fixture_hardware(selected: &str, job: &JobRef, snapshot: &ConstraintSnapshot) -> Vec<FixtureHardware> {
    let mut codes: Vec<&str> = vec![selected];
    if let Some(options) = snapshot.fixture_options.get(job) {
        for option in options {
            if !codes.contains(&option.fixture_code.as_str()) {
                codes.push(option.fixture_code.as_str());
            }
        }
    }

    codes
        .into_iter()
        .take(MAX_FIXTURE_HARDWARE)
        .map(|code| {
            let stock = snapshot.fixture_stock.get(code);
            FixtureHardware {
                fixture_code: code.to_string(),
                description: stock.and_then(|s| s.description.clone()),
                storage_location: stock.and_then(|s| s.storage_location.clone()),
            }
        })
        .collect()
}
