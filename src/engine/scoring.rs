// ==========================================
// 柔性制造单元自动排产系统 - 候选评分引擎
// ==========================================
// 职责: 按当前班次权重计算候选分值（越低越好）
// 分量: 刀具装载、换型时长、物料搬运、机床均衡、长周期奖励
// 红线: 纯函数，相同输入得到相同输出
// ==========================================

use crate::domain::plan::{Candidate, ScoreBreakdown, ScoredCandidate};
use crate::domain::shift::ShiftWeights;
use std::cmp::Ordering;
use std::collections::HashMap;

/// 评分参数（来自配置）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringCosts {
    pub tool_load_cost: f64,
    pub material_move_cost: f64,
}

// ==========================================
// CandidateScorer - 候选评分器
// ==========================================
pub struct CandidateScorer {
    weights: ShiftWeights,
    costs: ScoringCosts,
}

impl CandidateScorer {
    pub fn new(weights: ShiftWeights, costs: ScoringCosts) -> Self {
        Self { weights, costs }
    }

    /// 计算单个候选的评分
    ///
    /// # 参数
    /// - `queue_depth`: 该机床的在制作业数（分配前统计，本轮分配不计入）
    /// - `min_depth`: 所有可用机床的最小队列深度
    pub fn score(&self, candidate: &Candidate, queue_depth: usize, min_depth: usize) -> ScoreBreakdown {
        let w = &self.weights;

        let tool_penalty = candidate.tool_loads() as f64 * self.costs.tool_load_cost * w.tool_penalty;
        let setup_penalty = candidate.setup_minutes * w.short_setup;
        let material_penalty =
            candidate.handling_moves as f64 * self.costs.material_move_cost * w.material_penalty;
        let balance_penalty = queue_depth.saturating_sub(min_depth) as f64 * w.machine_balance;
        let run_adjustment = -(candidate.cycle_minutes / 60.0) * w.long_run;

        ScoreBreakdown {
            total: tool_penalty + setup_penalty + material_penalty + balance_penalty + run_adjustment,
            tool_penalty,
            setup_penalty,
            material_penalty,
            balance_penalty,
            run_adjustment,
        }
    }

    /// 批量评分并排序（按 compare_scored）
    pub fn score_all(
        &self,
        candidates: Vec<Candidate>,
        depths: &HashMap<String, usize>,
    ) -> Vec<ScoredCandidate> {
        let min_depth = depths.values().copied().min().unwrap_or(0);

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let depth = depths.get(&candidate.machine_id).copied().unwrap_or(0);
                let score = self.score(&candidate, depth, min_depth);
                ScoredCandidate { candidate, score }
            })
            .collect();

        scored.sort_by(compare_scored);
        scored
    }
}

/// 候选全序比较
///
/// 规则: 总分升序 → 工单号 → 工序号 → 机床号 → 零件号 → 机床托盘 → 物料托盘
pub fn compare_scored(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    a.score
        .total
        .total_cmp(&b.score.total)
        .then_with(|| a.candidate.job.work_order.cmp(&b.candidate.job.work_order))
        .then_with(|| a.candidate.job.operation_id.cmp(&b.candidate.job.operation_id))
        .then_with(|| a.candidate.machine_id.cmp(&b.candidate.machine_id))
        .then_with(|| a.candidate.job.part_id.cmp(&b.candidate.job.part_id))
        .then_with(|| a.candidate.machine_pallet_id.cmp(&b.candidate.machine_pallet_id))
        .then_with(|| a.candidate.material_pallet_id.cmp(&b.candidate.material_pallet_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobRef;
    use crate::domain::types::FixtureChange;

    fn candidate(machine: &str, wo: &str, setup: f64, cycle: f64) -> Candidate {
        Candidate {
            machine_id: machine.to_string(),
            job: JobRef::new(wo, "P1", "10"),
            program_id: "O1".to_string(),
            machine_pallet_id: format!("MP-{}", machine),
            material_pallet_id: "RM1".to_string(),
            fixture_code: "FX-A".to_string(),
            fixture_change: FixtureChange::Keep,
            tools_to_load: vec!["T1".to_string()],
            setup_minutes: setup,
            cycle_minutes: cycle,
            handling_moves: 2,
        }
    }

    fn scorer() -> CandidateScorer {
        CandidateScorer::new(
            ShiftWeights::default(),
            ScoringCosts {
                tool_load_cost: 5.0,
                material_move_cost: 1.0,
            },
        )
    }

    #[test]
    fn test_score_components() {
        let score = scorer().score(&candidate("DMC1", "WO1", 12.0, 120.0), 2, 0);
        assert_eq!(score.tool_penalty, 5.0);
        assert_eq!(score.setup_penalty, 12.0);
        assert_eq!(score.material_penalty, 2.0);
        assert_eq!(score.balance_penalty, 2.0);
        assert_eq!(score.run_adjustment, -2.0);
        assert_eq!(score.total, 19.0);
    }

    #[test]
    fn test_weights_change_ranking() {
        let short = candidate("DMC1", "WO1", 5.0, 30.0);
        let long = candidate("DMC1", "WO2", 25.0, 600.0);

        let day = scorer();
        assert!(day.score(&short, 0, 0).total < day.score(&long, 0, 0).total);

        let night = CandidateScorer::new(
            ShiftWeights {
                short_setup: 0.2,
                long_run: 3.0,
                ..Default::default()
            },
            ScoringCosts {
                tool_load_cost: 5.0,
                material_move_cost: 1.0,
            },
        );
        assert!(night.score(&long, 0, 0).total < night.score(&short, 0, 0).total);
    }

    #[test]
    fn test_ties_break_by_work_order_then_machine() {
        let mut depths = HashMap::new();
        depths.insert("DMC1".to_string(), 0);
        depths.insert("DMC2".to_string(), 0);

        let scored = scorer().score_all(
            vec![
                candidate("DMC2", "WO2", 10.0, 60.0),
                candidate("DMC2", "WO1", 10.0, 60.0),
                candidate("DMC1", "WO1", 10.0, 60.0),
            ],
            &depths,
        );

        let order: Vec<(String, String)> = scored
            .iter()
            .map(|s| (s.candidate.job.work_order.clone(), s.candidate.machine_id.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("WO1".to_string(), "DMC1".to_string()),
                ("WO1".to_string(), "DMC2".to_string()),
                ("WO2".to_string(), "DMC2".to_string()),
            ]
        );
    }
}
