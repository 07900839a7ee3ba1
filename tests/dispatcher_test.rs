// ==========================================
// 派工器集成测试
// ==========================================
// 职责: 验证 GetNextSuggestion 的全局最优、班次权重、复核剔除与无建议原因
// ==========================================


#[cfg(test)]
mod dispatcher_test {
    use crate::test_helpers::*;
    use chrono::Duration;
    use fms_autopilot::api::ApiError;
    use fms_autopilot::domain::decision::NextSuggestion;
    use fms_autopilot::domain::types::{
        ActionStepType, CompletionOutcome, NoSuggestionReason, PlannedJobStatus,
    };

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "actual={} expected={}",
            actual,
            expected
        );
    }

    #[tokio::test]
    async fn test_global_minimum_across_machines() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        let next = api.get_next_suggestion_at(2, day_time()).await.unwrap();
        let suggestion = match next {
            NextSuggestion::Suggested(s) => s,
            other => panic!("应有建议: {:?}", other),
        };

        // B(23.5) 优于 A(28.5)
        assert_eq!(suggestion.decision.machine_id, "DMC3");
        assert_eq!(suggestion.decision.job.work_order, "WO-B");
        assert_close(suggestion.decision.score.total, 23.5);
        assert_close(suggestion.decision.score.setup_penalty, 24.0);
        assert_eq!(suggestion.decision.shift_window_id, Some(1));
        assert!(suggestion.tools_to_load.is_empty());

        assert_eq!(suggestion.alternatives.len(), 1);
        assert_eq!(suggestion.alternatives[0].job.work_order, "WO-A");
        assert_close(suggestion.alternatives[0].score.total, 28.5);
        assert!(suggestion.dropped.is_empty());

        let plan = api.current_plan().unwrap().unwrap();
        let dispatched = plan
            .planned_jobs
            .iter()
            .find(|p| p.planned_job_id == suggestion.decision.planned_job_id)
            .unwrap();
        assert_eq!(dispatched.status, PlannedJobStatus::Dispatched);
        assert_eq!(dispatched.decision_id, Some(suggestion.decision.decision_id));

        let stored = api.get_decision(suggestion.decision.decision_id).unwrap();
        assert_eq!(stored, suggestion.decision);
    }

    #[tokio::test]
    async fn test_night_window_uses_night_weights() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(night_time()).await.unwrap();

        let next = api.get_next_suggestion_at(1, night_time()).await.unwrap();
        let suggestion = match next {
            NextSuggestion::Suggested(s) => s,
            other => panic!("应有建议: {:?}", other),
        };
        assert_eq!(suggestion.decision.shift_window_id, Some(2));
        assert_close(suggestion.decision.score.total, 4.0);
        assert_close(suggestion.decision.score.run_adjustment, -2.0);
        assert_close(suggestion.alternatives[0].score.total, 9.0);
    }

    #[tokio::test]
    async fn test_shift_weights_change_ranking() {
        // 同一机床两项作业：短换型短周期 vs 需换夹具的长周期
        let snapshot = SnapshotBuilder::new()
            .job("WO-S", "PS", 30.0, &["DMC1"], "FX-S")
            .job("WO-L", "PL", 600.0, &["DMC1"], "FX-L")
            .pallet("MP1", Some("DMC1"), Some("FX-S"))
            .pallet("MP1B", Some("DMC1"), Some("FX-S"))
            .fixture_stock("FX-L", 1)
            .material("RM-S", "PS", 0)
            .material("RM-L", "PL", 0)
            .build();

        // 白班: S = 24 - 0.25 = 23.75，L = (23 + 12) * 2 - 5 = 65
        let env = create_test_env(snapshot.clone());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        assert_eq!(next.decision().unwrap().job.work_order, "WO-S");

        // 夜班: S = 6 - 1 = 5，L = 35 * 0.5 - 20 = -2.5
        let env = create_test_env(snapshot);
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(night_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, night_time()).await.unwrap();
        let decision = next.decision().unwrap();
        assert_eq!(decision.job.work_order, "WO-L");
        assert_eq!(
            decision.action_plan.step_types(),
            vec![
                ActionStepType::UnmountFixture,
                ActionStepType::MountFixture,
                ActionStepType::LoadRawMaterial
            ]
        );
        assert_eq!(decision.action_plan.fixture_hardware[0].fixture_code, "FX-L");
    }

    #[tokio::test]
    async fn test_no_current_plan() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        let next = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        assert_eq!(next.no_suggestion_reason(), Some(NoSuggestionReason::NoCurrentPlan));
        assert!(api.list_recent_decisions(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_machines_available() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        for machine in ["DMC1", "DMC2", "DMC3", "DMC4"] {
            api.set_machine_status_at(machine, false, "停机", None, day_time())
                .unwrap();
        }

        let next = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        assert_eq!(
            next.no_suggestion_reason(),
            Some(NoSuggestionReason::NoMachinesAvailable)
        );
    }

    #[tokio::test]
    async fn test_max_alternatives_is_validated() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        let limit = api.config().max_alternatives;
        let err = api
            .get_next_suggestion_at(limit + 1, day_time())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        // 校验失败不产生决策
        assert!(api.list_recent_decisions(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_planned_job_dispatched_once() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        let first = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        let second = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        let third = api.get_next_suggestion_at(1, day_time()).await.unwrap();

        assert_eq!(first.decision().unwrap().job.work_order, "WO-B");
        let second = second.decision().unwrap();
        assert_eq!(second.job.work_order, "WO-A");
        assert_eq!(second.machine_id, "DMC1");
        assert_eq!(third.no_suggestion_reason(), Some(NoSuggestionReason::NoFeasibleJob));

        let decisions = api.list_recent_decisions(10).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].job.work_order, "WO-A");
    }

    #[tokio::test]
    async fn test_reverification_drops_stale_entry() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        // 计划后 T3 被取走
        env.provider.update(|s| {
            s.machine_tools.insert("DMC3".to_string(), Vec::new());
        });

        let next = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        let suggestion = match next {
            NextSuggestion::Suggested(s) => s,
            other => panic!("应有建议: {:?}", other),
        };
        assert_eq!(suggestion.decision.job.work_order, "WO-A");
        assert_eq!(suggestion.tools_to_load, vec!["T2".to_string()]);
        assert_eq!(
            suggestion.decision.action_plan.step_types(),
            vec![ActionStepType::VerifyFixture, ActionStepType::LoadRawMaterial]
        );

        assert_eq!(suggestion.dropped.len(), 1);
        assert_eq!(suggestion.dropped[0].job.work_order, "WO-B");
        assert_eq!(suggestion.dropped[0].reason, "缺少刀具 T3");

        // 被剔除的计划作业保持 planned，恢复后可再次派工
        env.provider.update(|s| {
            s.machine_tools
                .insert("DMC3".to_string(), vec![fms_autopilot::domain::resource::ToolState {
                    tool_id: "T3".to_string(),
                    remaining_life_seconds: None,
                    usage_status: None,
                }]);
        });
        let next = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        assert_eq!(next.decision().unwrap().job.work_order, "WO-B");
    }

    #[tokio::test]
    async fn test_falls_through_to_next_queue_entry() {
        let snapshot = SnapshotBuilder::new()
            .job("WO-1", "P1", 120.0, &["DMC1"], "FX-1")
            .job("WO-2", "P2", 60.0, &["DMC1"], "FX-1")
            .pallet("MP1", Some("DMC1"), Some("FX-1"))
            .material("RM-1", "P1", 0)
            .material("RM-2", "P2", 0)
            .build();
        let env = create_test_env(snapshot);
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        // 队首作业物料耗尽
        env.provider.update(|s| {
            s.material_pallets.retain(|m| m.part_id != "P1");
        });

        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        match next {
            NextSuggestion::Suggested(s) => {
                assert_eq!(s.decision.job.work_order, "WO-2");
                assert_eq!(s.dropped.len(), 1);
                assert_eq!(s.dropped[0].reason, "零件 P1 无可用物料");
            }
            other => panic!("应有建议: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refusal_blocks_replanned_job_without_refresh() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        let t = day_time();
        api.refresh_plan_at(t).await.unwrap();

        let first = api.get_next_suggestion_at(0, t).await.unwrap();
        let first = first.decision().unwrap().clone();
        assert_eq!(first.job.work_order, "WO-B");

        // 完工后重新计划，WO-B 再次进入 DMC3 队列
        api.record_job_completion_at(
            first.planned_job_id,
            CompletionOutcome::Done,
            t + Duration::minutes(90),
        )
        .unwrap();
        let summary = api
            .refresh_plan_at(t + Duration::minutes(91))
            .await
            .unwrap();
        assert_eq!(summary.planned_on("DMC3"), 1);

        // 拒绝旧决策后不刷新计划，屏蔽由派工器自身生效
        api.refuse_decision_at(first.decision_id, None, t + Duration::minutes(92))
            .unwrap();
        let next = api
            .get_next_suggestion_at(1, t + Duration::minutes(93))
            .await
            .unwrap();
        let suggestion = match next {
            NextSuggestion::Suggested(s) => s,
            other => panic!("应有建议: {:?}", other),
        };
        assert_eq!(suggestion.decision.job.work_order, "WO-A");
        assert!(suggestion.alternatives.is_empty());
        assert_eq!(suggestion.dropped.len(), 1);
        assert_eq!(suggestion.dropped[0].job.work_order, "WO-B");
        assert_eq!(suggestion.dropped[0].machine_id, "DMC3");
        assert_eq!(suggestion.dropped[0].reason, "作业处于拒绝冷却期");

        // 被屏蔽的计划作业仍为 planned，冷却期内不会被派工
        let plan = api.current_plan().unwrap().unwrap();
        let replanned = plan
            .planned_jobs
            .iter()
            .find(|p| p.job.work_order == "WO-B")
            .unwrap();
        assert_eq!(replanned.status, PlannedJobStatus::Planned);

        let next = api
            .get_next_suggestion_at(1, t + Duration::minutes(94))
            .await
            .unwrap();
        assert_eq!(next.no_suggestion_reason(), Some(NoSuggestionReason::NoFeasibleJob));
    }

    #[tokio::test]
    async fn test_provider_failure_during_reverify_drops_entry() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        api.refresh_plan_at(day_time()).await.unwrap();

        env.provider.set_unavailable(Some("machine_pallet"));
        let next = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        match next {
            NextSuggestion::NoSuggestion { reason, dropped } => {
                assert_eq!(reason, NoSuggestionReason::NoFeasibleJob);
                assert_eq!(dropped.len(), 2);
                assert!(dropped.iter().all(|d| d.reason.contains("machine_pallet")));
            }
            other => panic!("不应有建议: {:?}", other),
        }
    }
}
