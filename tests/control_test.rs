// ==========================================
// 现场控制集成测试
// ==========================================
// 职责: 验证拒绝冷却、换型会话、完工反馈、机床状态、班次表与配置校验
// ==========================================


#[cfg(test)]
mod control_test {
    use crate::test_helpers::*;
    use chrono::{Duration, NaiveTime};
    use fms_autopilot::api::{ApiError, DEFAULT_SETUP_TYPE};
    use fms_autopilot::app::AppState;
    use fms_autopilot::config::{config_keys, MAX_IGNORE_TTL_HOURS};
    use fms_autopilot::domain::job::JobRef;
    use fms_autopilot::domain::shift::{ShiftWeights, ShiftWindow};
    use fms_autopilot::domain::types::{CompletionOutcome, PlannedJobStatus, RefuseScope};
    use fms_autopilot::provider::SnapshotProvider;
    use std::sync::Arc;

    // ==========================================
    // 拒绝 / 冷却
    // ==========================================

    #[tokio::test]
    async fn test_refusal_cooldown_expires_after_ttl() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        let t = day_time();

        api.refresh_plan_at(t).await.unwrap();
        let next = api.get_next_suggestion_at(0, t).await.unwrap();
        let decision = next.decision().unwrap().clone();
        assert_eq!(decision.job.work_order, "WO-B");

        let ignore = api
            .refuse_decision_at(decision.decision_id, Some("  毛坯尺寸不符 ".to_string()), t)
            .unwrap();
        assert_eq!(ignore.ignore_until, t + Duration::hours(24));
        assert_eq!(ignore.reason.as_deref(), Some("毛坯尺寸不符"));
        assert_eq!(ignore.machine_pallet_id, None);
        assert_eq!(ignore.decision_id, Some(decision.decision_id));

        // 来源计划作业被置为 skipped
        let plan = api.current_plan().unwrap().unwrap();
        let source = plan
            .planned_jobs
            .iter()
            .find(|p| p.planned_job_id == decision.planned_job_id)
            .unwrap();
        assert_eq!(source.status, PlannedJobStatus::Skipped);

        // T+1h: 仍在冷却期
        let summary = api.refresh_plan_at(t + Duration::hours(1)).await.unwrap();
        assert_eq!(summary.planned_on("DMC3"), 0);

        // T+25h: 冷却结束，重新参与计划
        let summary = api.refresh_plan_at(t + Duration::hours(25)).await.unwrap();
        assert_eq!(summary.planned_on("DMC3"), 1);
        let next = api
            .get_next_suggestion_at(0, t + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(next.decision().unwrap().job.work_order, "WO-B");
    }

    #[tokio::test]
    async fn test_pallet_scoped_refusal_only_blocks_that_pallet() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        let t = day_time();

        api.refresh_plan_at(t).await.unwrap();
        let next = api.get_next_suggestion_at(0, t).await.unwrap();
        let decision = next.decision().unwrap().clone();

        let ignore = api
            .refuse_decision_with_scope(decision.decision_id, None, RefuseScope::Pallet, t)
            .unwrap();
        assert_eq!(ignore.machine_pallet_id.as_deref(), Some("MP3"));
        assert_eq!(ignore.reason, None);

        // 新增一个已装 FX-B 的 DMC3 托盘
        env.provider.update(|s| {
            let mut pallet = s.machine_pallets[1].clone();
            pallet.pallet_id = "MP3B".to_string();
            s.machine_pallets.push(pallet);
        });

        api.refresh_plan_at(t + Duration::minutes(1)).await.unwrap();
        let plan = api.current_plan().unwrap().unwrap();
        let b = plan
            .planned_jobs
            .iter()
            .find(|p| p.job.work_order == "WO-B")
            .unwrap();
        assert_eq!(b.machine_pallet_id, "MP3B");
    }

    #[tokio::test]
    async fn test_refuse_unknown_decision_is_not_found() {
        let env = create_test_env(two_machine_snapshot());
        let err = env
            .state
            .autopilot_api
            .refuse_decision_at(999, None, day_time())
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 换型会话
    // ==========================================

    #[test]
    fn test_setup_session_lifecycle() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        let t = day_time();

        let setup_id = api
            .start_setup_session_at(
                "dmc1",
                "MP1",
                Some(JobRef::new("WO-A", "PA", "10")),
                None,
                None,
                t,
            )
            .unwrap();

        let session = api
            .end_setup_session_at(setup_id, t + Duration::minutes(20))
            .unwrap();
        assert_eq!(session.machine_id, "DMC1");
        assert_eq!(session.setup_type, DEFAULT_SETUP_TYPE);
        assert_eq!(session.start_ts, t);
        assert_eq!(session.end_ts, Some(t + Duration::minutes(20)));
        assert_eq!(session.duration_minutes(), Some(20.0));

        let err = api
            .end_setup_session_at(setup_id, t + Duration::minutes(30))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = api.end_setup_session_at(9_999, t).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_setup_end_never_precedes_start() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        let t = day_time();

        let setup_id = api
            .start_setup_session_at("DMC3", "MP3", None, Some("fixture_swap"), None, t)
            .unwrap();
        let session = api
            .end_setup_session_at(setup_id, t - Duration::minutes(5))
            .unwrap();
        assert_eq!(session.setup_type, "fixture_swap");
        assert_eq!(session.end_ts, Some(t));
        assert_eq!(session.duration_minutes(), Some(0.0));
    }

    #[test]
    fn test_setup_start_validates_input() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        let err = api
            .start_setup_session_at("DMC9", "MP1", None, None, None, day_time())
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = api
            .start_setup_session_at("DMC1", "  ", None, None, None, day_time())
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    // ==========================================
    // 完工反馈
    // ==========================================

    #[tokio::test]
    async fn test_job_completion_feed() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;
        let t = day_time();

        api.refresh_plan_at(t).await.unwrap();
        let next = api.get_next_suggestion_at(0, t).await.unwrap();
        let decision = next.decision().unwrap().clone();

        // 尚未派工的计划作业不可完成
        let plan = api.current_plan().unwrap().unwrap();
        let undispatched = plan
            .planned_jobs
            .iter()
            .find(|p| p.status == PlannedJobStatus::Planned)
            .unwrap();
        let err = api
            .record_job_completion_at(undispatched.planned_job_id, CompletionOutcome::Done, t)
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        api.record_job_completion_at(
            decision.planned_job_id,
            CompletionOutcome::Cancelled,
            t + Duration::minutes(10),
        )
        .unwrap();
        let plan = api.current_plan().unwrap().unwrap();
        let completed = plan
            .planned_jobs
            .iter()
            .find(|p| p.planned_job_id == decision.planned_job_id)
            .unwrap();
        assert_eq!(completed.status, PlannedJobStatus::Cancelled);

        let err = api
            .record_job_completion_at(decision.planned_job_id, CompletionOutcome::Done, t)
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = api
            .record_job_completion_at(424_242, CompletionOutcome::Done, t)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 机床状态
    // ==========================================

    #[test]
    fn test_machine_status_registry() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        let statuses = api.list_machine_statuses().unwrap();
        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|s| s.is_available && s.status.is_none()));

        let record = api
            .set_machine_status_at("dmc2", false, "保养", Some("季度保养".to_string()), day_time())
            .unwrap();
        assert_eq!(record.machine_id, "DMC2");

        let statuses = api.list_machine_statuses().unwrap();
        let dmc2 = statuses.iter().find(|s| s.machine_id == "DMC2").unwrap();
        assert!(!dmc2.is_available);
        assert_eq!(dmc2.status.as_deref(), Some("保养"));
        assert_eq!(dmc2.reason.as_deref(), Some("季度保养"));
        assert_eq!(dmc2.updated_at, Some(day_time()));

        let err = api
            .set_machine_status_at("DMC9", true, "运行", None, day_time())
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        let err = api
            .set_machine_status_at("DMC1", true, " ", None, day_time())
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    // ==========================================
    // 决策查询
    // ==========================================

    #[tokio::test]
    async fn test_decision_queries() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        assert!(matches!(
            api.list_recent_decisions(0).unwrap_err(),
            ApiError::ValidationError(_)
        ));
        assert!(matches!(
            api.list_recent_decisions(501).unwrap_err(),
            ApiError::ValidationError(_)
        ));
        assert!(matches!(api.get_decision(1).unwrap_err(), ApiError::NotFound(_)));

        api.refresh_plan_at(day_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        let decision = next.decision().unwrap();

        let recent = api.list_recent_decisions(500).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(&recent[0], decision);
    }

    // ==========================================
    // 班次表
    // ==========================================

    fn window(id: i64, start: (u32, u32), end: (u32, u32)) -> ShiftWindow {
        ShiftWindow {
            shift_window_id: id,
            name: format!("班次{}", id),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            mode: "balanced".to_string(),
            weights: ShiftWeights::default(),
        }
    }

    #[tokio::test]
    async fn test_invalid_shift_table_keeps_previous() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        assert_eq!(api.list_shift_windows().unwrap().len(), 2);

        // 14:00-18:00 未覆盖
        let err = api
            .replace_shift_windows(vec![window(1, (6, 0), (14, 0)), window(2, (18, 0), (6, 0))])
            .unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));
        assert_eq!(api.list_shift_windows().unwrap().len(), 2);

        // 重叠
        let err = api
            .replace_shift_windows(vec![window(1, (6, 0), (20, 0)), window(2, (18, 0), (6, 0))])
            .unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));

        let summary = api.refresh_plan_at(day_time()).await.unwrap();
        assert_eq!(summary.shift_window_id, 1);
    }

    #[tokio::test]
    async fn test_replace_shift_table_takes_effect_and_persists() {
        let env = create_test_env(two_machine_snapshot());
        let api = &env.state.autopilot_api;

        api.replace_shift_windows(vec![
            window(10, (0, 0), (12, 0)),
            window(11, (12, 0), (0, 0)),
        ])
        .unwrap();

        let summary = api.refresh_plan_at(day_time()).await.unwrap();
        assert_eq!(summary.shift_window_id, 10);
        let summary = api.refresh_plan_at(night_time()).await.unwrap();
        assert_eq!(summary.shift_window_id, 11);

        // 重启后从数据库加载
        let provider = Arc::new(SnapshotProvider::new(two_machine_snapshot()));
        let reopened = AppState::with_provider(env.db_path.clone(), provider).unwrap();
        let ids: Vec<i64> = reopened
            .autopilot_api
            .list_shift_windows()
            .unwrap()
            .iter()
            .map(|w| w.shift_window_id)
            .collect();
        assert_eq!(ids, vec![10, 11]);
    }

    // ==========================================
    // 配置
    // ==========================================

    #[test]
    fn test_invalid_config_fails_startup() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::JOBS_PER_MACHINE, "0");

        let provider = Arc::new(SnapshotProvider::new(two_machine_snapshot()));
        let err = AppState::with_provider(db_path, provider).err().unwrap();
        assert!(matches!(err, ApiError::ConfigError(_)));
        drop(temp_file);
    }

    #[test]
    fn test_unparsable_config_fails_startup() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::IGNORE_TTL_HOURS, "一天");

        let provider = Arc::new(SnapshotProvider::new(two_machine_snapshot()));
        let err = AppState::with_provider(db_path, provider).err().unwrap();
        assert!(matches!(err, ApiError::ConfigError(_)));
        drop(temp_file);
    }

    #[test]
    fn test_oversized_ignore_ttl_fails_startup() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::IGNORE_TTL_HOURS, "10000000000");

        let provider = Arc::new(SnapshotProvider::new(two_machine_snapshot()));
        let err = AppState::with_provider(db_path, provider).err().unwrap();
        assert!(matches!(err, ApiError::ConfigError(_)));
        drop(temp_file);
    }

    #[tokio::test]
    async fn test_max_ignore_ttl_is_accepted_and_applied() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(
            &db_path,
            config_keys::IGNORE_TTL_HOURS,
            &MAX_IGNORE_TTL_HOURS.to_string(),
        );
        let env = create_test_env_at(temp_file, db_path, two_machine_snapshot());
        let api = &env.state.autopilot_api;

        api.refresh_plan_at(day_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        let ignore = api
            .refuse_decision_at(next.decision().unwrap().decision_id, None, day_time())
            .unwrap();
        assert_eq!(
            ignore.ignore_until,
            day_time() + Duration::hours(MAX_IGNORE_TTL_HOURS)
        );
    }

    #[test]
    fn test_duplicate_machine_ids_fail_startup() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::MACHINE_IDS, "DMC1, DMC3, dmc1");

        let provider = Arc::new(SnapshotProvider::new(two_machine_snapshot()));
        let err = AppState::with_provider(db_path, provider).err().unwrap();
        assert!(matches!(err, ApiError::ConfigError(_)));
        drop(temp_file);
    }

    #[tokio::test]
    async fn test_configured_ttl_and_machines_apply() {
        let (temp_file, db_path) = create_test_db().unwrap();
        set_config(&db_path, config_keys::IGNORE_TTL_HOURS, "2");
        set_config(&db_path, config_keys::MACHINE_IDS, "dmc1, dmc3");
        let env = create_test_env_at(temp_file, db_path, two_machine_snapshot());
        let api = &env.state.autopilot_api;

        assert_eq!(api.config().machine_ids, vec!["DMC1".to_string(), "DMC3".to_string()]);
        assert_eq!(api.list_machine_statuses().unwrap().len(), 2);

        api.refresh_plan_at(day_time()).await.unwrap();
        let next = api.get_next_suggestion_at(0, day_time()).await.unwrap();
        let ignore = api
            .refuse_decision_at(next.decision().unwrap().decision_id, None, day_time())
            .unwrap();
        assert_eq!(ignore.ignore_until, day_time() + Duration::hours(2));
    }
}
