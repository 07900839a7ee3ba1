// ==========================================
// 柔性制造单元自动排产系统 - 命令行入口
// ==========================================
// 用法:
//   fms-autopilot <db_path|-> <snapshot.json> <command> [args...]
//
// 命令:
//   refresh                                       刷新计划
//   next [max_alternatives]                       取下一条派工建议
//   refuse <decision_id> [reason] [--pallet]      拒绝决策
//   status <machine_id> <up|down> <label> [reason]
//   setup-start <machine_id> <pallet_id> [setup_type] [decision_id]
//   setup-end <setup_id>
//   complete <planned_job_id> <done|cancelled>
//   plan                                          查看当前批次
//   decisions [limit]                             最近决策
//
// db_path 为 "-" 时使用默认路径（见 get_default_db_path）
// ==========================================

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use fms_autopilot::app::{get_default_db_path, AppState};
use fms_autopilot::domain::types::{CompletionOutcome, RefuseScope};
use fms_autopilot::logging;
use fms_autopilot::provider::{CellSnapshot, SnapshotProvider};
use serde::Serialize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("用法: fms-autopilot <db_path|-> <snapshot.json> <command> [args...]");
    }

    let db_path = match args[0].as_str() {
        "-" => get_default_db_path(),
        path => path.to_string(),
    };
    let snapshot = CellSnapshot::from_file(&args[1])
        .with_context(|| format!("无法读取快照文件 {}", args[1]))?;
    let command = args[2].as_str();
    let rest = &args[3..];

    tracing::info!("==================================================");
    tracing::info!("{} {}", fms_autopilot::APP_NAME, fms_autopilot::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let state = AppState::with_provider(db_path, Arc::new(SnapshotProvider::new(snapshot)))?;
    let api = state.autopilot_api.clone();

    match command {
        "refresh" => print_json(&api.refresh_plan().await?),
        "next" => {
            let max_alternatives = match rest.first() {
                Some(raw) => raw.parse().context("max_alternatives 必须为整数")?,
                None => api.config().max_alternatives,
            };
            print_json(&api.get_next_suggestion(max_alternatives).await?)
        }
        "refuse" => {
            let decision_id: i64 = arg(rest, 0, "decision_id")?
                .parse()
                .context("decision_id 必须为整数")?;
            let scope = if rest.iter().any(|a| a == "--pallet") {
                RefuseScope::Pallet
            } else {
                RefuseScope::Job
            };
            let reason = rest
                .get(1)
                .filter(|a| a.as_str() != "--pallet")
                .cloned();
            print_json(&api.refuse_decision_with_scope(decision_id, reason, scope, chrono::Utc::now())?)
        }
        "status" => {
            let machine_id = arg(rest, 0, "machine_id")?;
            let available = match arg(rest, 1, "up|down")? {
                "up" => true,
                "down" => false,
                other => bail!("可用性必须为 up 或 down，实际为 {}", other),
            };
            let label = arg(rest, 2, "label")?;
            print_json(&api.set_machine_status(machine_id, available, label, rest.get(3).cloned())?)
        }
        "setup-start" => {
            let machine_id = arg(rest, 0, "machine_id")?;
            let pallet_id = arg(rest, 1, "pallet_id")?;
            let setup_type = rest.get(2).map(|s| s.as_str());
            let decision_id = match rest.get(3) {
                Some(raw) => Some(raw.parse::<i64>().context("decision_id 必须为整数")?),
                None => None,
            };
            let setup_id =
                api.start_setup_session(machine_id, pallet_id, None, setup_type, decision_id)?;
            print_json(&serde_json::json!({ "setup_id": setup_id }))
        }
        "setup-end" => {
            let setup_id: i64 = arg(rest, 0, "setup_id")?
                .parse()
                .context("setup_id 必须为整数")?;
            print_json(&api.end_setup_session(setup_id)?)
        }
        "complete" => {
            let planned_job_id: i64 = arg(rest, 0, "planned_job_id")?
                .parse()
                .context("planned_job_id 必须为整数")?;
            let outcome = CompletionOutcome::from_str(arg(rest, 1, "done|cancelled")?)
                .ok_or_else(|| anyhow!("完工结果必须为 done 或 cancelled"))?;
            api.record_job_completion(planned_job_id, outcome)?;
            print_json(&serde_json::json!({ "planned_job_id": planned_job_id, "outcome": outcome }))
        }
        "plan" => print_json(&api.current_plan()?),
        "decisions" => {
            let limit = match rest.first() {
                Some(raw) => raw.parse().context("limit 必须为整数")?,
                None => 20,
            };
            print_json(&api.list_recent_decisions(limit)?)
        }
        other => bail!("未知命令: {}", other),
    }
}

fn arg<'a>(rest: &'a [String], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    rest.get(idx)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("缺少参数 {}", name))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
