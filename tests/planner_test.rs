// ==========================================
// 滚动计划器集成测试
// ==========================================
// 职责: 验证 RefreshPlan 的分配、机床可用性、幂等性与失败语义
// ==========================================


#[cfg(test)]
mod planner_test {
    use crate::test_helpers::*;
    use chrono::Duration;
    use fms_autopilot::api::ApiError;
    use fms_autopilot::config::config_keys;
    use fms_autopilot::domain::types::PlannedJobStatus;
    use fms_autopilot::domain::types::NoSuggestionReason;

    #[tokio::test]
    async fn test_refresh_plans_each_machine() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        let summary = api.refresh_plan_at(day_time()).await.unwrap();

        assert_eq!(summary.previous_batch_id, None);
        assert_eq!(summary.shift_window_id, 1);
        assert_eq!(summary.total_planned, 2);
        assert_eq!(summary.planned_on("DMC1"), 1);
        assert_eq!(summary.planned_on("DMC3"), 1);
        assert_eq!(summary.planned_on("DMC2"), 0);
        assert!(summary.blocked.is_empty());

        let plan = api.current_plan().unwrap().unwrap();
        assert_eq!(plan.batch.plan_batch_id, summary.plan_batch_id);
        assert_eq!(plan.planned_jobs.len(), 2);
        for pj in &plan.planned_jobs {
            assert_eq!(pj.sequence_index, 1);
            assert_eq!(pj.status, PlannedJobStatus::Planned);
        }

        let a = plan
            .planned_jobs
            .iter()
            .find(|p| p.job.work_order == "WO-A")
            .unwrap();
        assert_eq!(a.machine_id, "DMC1");
        assert_eq!(a.machine_pallet_id, "MP1");
        assert_eq!(a.material_pallet_id, "RM-A");
        assert!((a.score_total - 28.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unavailable_machine_gets_empty_queue_and_is_never_suggested() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        api.set_machine_status_at("DMC3", false, "维修", Some("主轴报警".to_string()), day_time())
            .unwrap();

        let summary = api.refresh_plan_at(day_time()).await.unwrap();
        assert_eq!(summary.planned_on("DMC3"), 0);
        let dmc3 = summary.machines.iter().find(|m| m.machine_id == "DMC3").unwrap();
        assert!(!dmc3.available);

        // WO-B 只能在 DMC3 上加工，应被阻断
        let blocked = summary
            .blocked
            .iter()
            .find(|b| b.job.work_order == "WO-B")
            .unwrap();
        assert!(blocked.reasons.iter().all(|r| !r.starts_with("DMC3")));

        let next = api.get_next_suggestion_at(3, day_time()).await.unwrap();
        let decision = next.decision().unwrap();
        assert_eq!(decision.machine_id, "DMC1");
        assert_eq!(decision.job.work_order, "WO-A");
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_for_unchanged_inputs() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        let first = api.refresh_plan_at(day_time()).await.unwrap();
        let first_plan = api.current_plan().unwrap().unwrap();

        let second = api.refresh_plan_at(day_time()).await.unwrap();
        let second_plan = api.current_plan().unwrap().unwrap();

        assert_ne!(first.plan_batch_id, second.plan_batch_id);
        assert_eq!(second.previous_batch_id, Some(first.plan_batch_id.clone()));
        assert_eq!(second_plan.batch.plan_batch_id, second.plan_batch_id);

        let key = |plan: &fms_autopilot::api::CurrentPlan| {
            let mut rows: Vec<_> = plan
                .planned_jobs
                .iter()
                .map(|p| {
                    (
                        p.machine_id.clone(),
                        p.sequence_index,
                        p.job.clone(),
                        p.machine_pallet_id.clone(),
                        p.material_pallet_id.clone(),
                        p.score_total.to_bits(),
                    )
                })
                .collect();
            rows.sort();
            rows
        };
        assert_eq!(key(&first_plan), key(&second_plan));
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_previous_batch() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        let first = api.refresh_plan_at(day_time()).await.unwrap();

        env.provider.set_unavailable(Some("tool_inventory"));
        let err = api.refresh_plan_at(day_time()).await.unwrap_err();
        assert!(matches!(err, ApiError::ProviderUnavailable { .. }));
        assert!(err.is_retryable());

        let plan = api.current_plan().unwrap().unwrap();
        assert_eq!(plan.batch.plan_batch_id, first.plan_batch_id);
        assert_eq!(plan.planned_jobs.len(), 2);

        env.provider.set_unavailable(None);
        let recovered = api.refresh_plan_at(day_time()).await.unwrap();
        assert_eq!(recovered.previous_batch_id, Some(first.plan_batch_id));
    }

    #[tokio::test]
    async fn test_provider_timeout_is_retryable() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::PROVIDER_TIMEOUT_MS, "50");
        let env = create_test_env_at(temp_file, db_path, two_machine_snapshot());
        let api = &env.state.autopilot_api;

        env.provider
            .set_latency(Some(std::time::Duration::from_millis(300)));
        let err = api.refresh_plan_at(day_time()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(api.current_plan().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_flight_job_is_not_replanned() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        api.refresh_plan_at(day_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        let decision = next.decision().unwrap().clone();
        assert_eq!(decision.job.work_order, "WO-B");

        let summary = api
            .refresh_plan_at(day_time() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(summary.total_planned, 1);
        assert_eq!(summary.planned_on("DMC3"), 0);

        // 完工后不再在制，但仍在积压中则重新参与计划
        api.record_job_completion_at(
            decision.planned_job_id,
            fms_autopilot::domain::types::CompletionOutcome::Done,
            day_time() + Duration::minutes(90),
        )
        .unwrap();
        let summary = api
            .refresh_plan_at(day_time() + Duration::minutes(91))
            .await
            .unwrap();
        assert_eq!(summary.planned_on("DMC3"), 1);
    }

    #[tokio::test]
    async fn test_jobs_per_machine_caps_queue() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::JOBS_PER_MACHINE, "2");

        let snapshot = SnapshotBuilder::new()
            .job("WO-1", "P1", 30.0, &["DMC1"], "FX-1")
            .job("WO-2", "P1", 40.0, &["DMC1"], "FX-1")
            .job("WO-3", "P1", 50.0, &["DMC1"], "FX-1")
            .pallet("MP1", Some("DMC1"), Some("FX-1"))
            .material("RM-1", "P1", 1)
            .build();
        let env = create_test_env_at(temp_file, db_path, snapshot);
        let api = &env.state.autopilot_api;

        let summary = api.refresh_plan_at(day_time()).await.unwrap();
        assert_eq!(summary.planned_on("DMC1"), 2);

        // 周期越长奖励越大，WO-3 排在最前
        let plan = api.current_plan().unwrap().unwrap();
        let mut queue: Vec<_> = plan.planned_jobs.iter().collect();
        queue.sort_by_key(|p| p.sequence_index);
        assert_eq!(queue[0].job.work_order, "WO-3");
        assert_eq!(queue[1].job.work_order, "WO-2");
        assert_eq!(queue[1].sequence_index, 2);
    }

    #[tokio::test]
    async fn test_blocked_job_reports_reasons() {
        let snapshot = SnapshotBuilder::new()
            .job("WO-X", "PX", 30.0, &["DMC2"], "FX-X")
            .tools("WO-X", &["T99"])
            .pallet("MP2", Some("DMC2"), Some("FX-X"))
            .material("RM-X", "PX", 0)
            .build();
        let env = create_test_env(snapshot);
        let api = &env.state.autopilot_api;

        let summary = api.refresh_plan_at(day_time()).await.unwrap();
        assert_eq!(summary.total_planned, 0);
        assert_eq!(summary.blocked.len(), 1);
        assert!(summary.blocked[0]
            .reasons
            .iter()
            .any(|r| r == "DMC2: 缺少刀具 T99"));
        assert!(summary.blocked[0]
            .reasons
            .iter()
            .any(|r| r == "DMC1: 工艺路线不允许该机床"));

        let next = api.get_next_suggestion_at(1, day_time()).await.unwrap();
        assert_eq!(next.no_suggestion_reason(), Some(NoSuggestionReason::NoFeasibleJob));
    }

    #[tokio::test]
    async fn test_refused_job_is_excluded_from_refresh() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        api.refresh_plan_at(day_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        let decision_id = next.decision().unwrap().decision_id;
        api.refuse_decision_at(decision_id, Some("夹具松动".to_string()), day_time())
            .unwrap();

        api.refresh_plan_at(day_time() + Duration::minutes(1))
            .await
            .unwrap();
        let plan = api.current_plan().unwrap().unwrap();
        assert!(plan.planned_jobs.iter().all(|p| p.job.work_order != "WO-B"));
        assert_eq!(plan.planned_jobs.len(), 1);
    }
}
