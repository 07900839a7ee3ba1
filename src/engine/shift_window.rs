// ==========================================
// 柔性制造单元自动排产系统 - 班次窗口解析
// ==========================================
// 职责: 校验班次表并按时刻解析当前窗口
// 红线: 班次表必须无重叠、无空隙地覆盖 24 小时，否则加载失败
// 红线: 窗口区间为 [start, end)，end < start 表示跨午夜
// ==========================================

use crate::domain::shift::{ShiftWeights, ShiftWindow};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use std::sync::{Arc, RwLock};
use tracing::info;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// 一天内的连续区间 [start, end)，单位秒
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: u32,
    end: u32,
    window: usize,
}

// ==========================================
// ShiftWindowTable - 已校验的班次表（不可变）
// ==========================================
#[derive(Debug, Clone)]
pub struct ShiftWindowTable {
    windows: Vec<ShiftWindow>,
    segments: Vec<Segment>,
}

impl ShiftWindowTable {
    /// 校验并构建班次表
    ///
    /// # 错误
    /// - `EngineError::Config`: 空表、重叠、空隙、权重非法
    pub fn new(windows: Vec<ShiftWindow>) -> EngineResult<Self> {
        if windows.is_empty() {
            return Err(EngineError::Config("班次表为空".to_string()));
        }

        let mut segments = Vec::new();
        for (idx, w) in windows.iter().enumerate() {
            validate_weights(w)?;

            let start = w.start_time.num_seconds_from_midnight();
            let end = w.end_time.num_seconds_from_midnight();

            if start == end {
                // 全天窗口只能单独存在
                if windows.len() != 1 {
                    return Err(EngineError::Config(format!(
                        "班次 {} 起止时间相同，仅允许作为唯一窗口",
                        w.name
                    )));
                }
                segments.push(Segment {
                    start: 0,
                    end: SECONDS_PER_DAY,
                    window: idx,
                });
            } else if end > start {
                segments.push(Segment {
                    start,
                    end,
                    window: idx,
                });
            } else {
                // 跨午夜拆为两段
                segments.push(Segment {
                    start,
                    end: SECONDS_PER_DAY,
                    window: idx,
                });
                if end > 0 {
                    segments.push(Segment {
                        start: 0,
                        end,
                        window: idx,
                    });
                }
            }
        }

        segments.sort_by_key(|s| (s.start, s.end));

        let mut cursor = 0u32;
        for seg in &segments {
            if seg.start < cursor {
                return Err(EngineError::Config(format!(
                    "班次 {} 与其他窗口重叠",
                    windows[seg.window].name
                )));
            }
            if seg.start > cursor {
                return Err(EngineError::Config(format!(
                    "班次表存在空隙: {} 起未被覆盖",
                    format_seconds(cursor)
                )));
            }
            cursor = seg.end;
        }
        if cursor != SECONDS_PER_DAY {
            return Err(EngineError::Config(format!(
                "班次表存在空隙: {} 起未被覆盖",
                format_seconds(cursor)
            )));
        }

        Ok(Self { windows, segments })
    }

    pub fn windows(&self) -> &[ShiftWindow] {
        &self.windows
    }

    /// 解析 now 所在的班次窗口
    ///
    /// # 参数
    /// - `utc_offset_minutes`: 单元本地时间相对 UTC 的偏移
    pub fn resolve(&self, now: DateTime<Utc>, utc_offset_minutes: i32) -> &ShiftWindow {
        let local = now + Duration::minutes(utc_offset_minutes as i64);
        let secs = local.time().num_seconds_from_midnight();

        // 分段覆盖全天，必定命中
        let idx = self
            .segments
            .iter()
            .find(|s| s.start <= secs && secs < s.end)
            .map(|s| s.window)
            .unwrap_or(0);
        &self.windows[idx]
    }
}

fn validate_weights(w: &ShiftWindow) -> EngineResult<()> {
    let ShiftWeights {
        short_setup,
        long_run,
        tool_penalty,
        material_penalty,
        machine_balance,
    } = w.weights;
    let all = [short_setup, long_run, tool_penalty, material_penalty, machine_balance];
    if all.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(EngineError::Config(format!(
            "班次 {} 的权重必须为非负有限数",
            w.name
        )));
    }
    Ok(())
}

fn format_seconds(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// 默认班次表：白班偏好短换型，夜班偏好长周期
pub fn default_shift_windows() -> Vec<ShiftWindow> {
    vec![
        ShiftWindow {
            shift_window_id: 1,
            name: "白班".to_string(),
            start_time: hm(6, 0),
            end_time: hm(18, 0),
            mode: "short_setup".to_string(),
            weights: ShiftWeights {
                short_setup: 2.0,
                long_run: 0.5,
                ..Default::default()
            },
        },
        ShiftWindow {
            shift_window_id: 2,
            name: "夜班".to_string(),
            start_time: hm(18, 0),
            end_time: hm(6, 0),
            mode: "long_run".to_string(),
            weights: ShiftWeights {
                short_setup: 0.5,
                long_run: 2.0,
                ..Default::default()
            },
        },
    ]
}

// ==========================================
// ShiftWindowResolver - 可热替换的班次表持有者
// ==========================================
// 读方拿到 Arc 快照后不受替换影响
pub struct ShiftWindowResolver {
    table: RwLock<Arc<ShiftWindowTable>>,
    utc_offset_minutes: i32,
}

impl ShiftWindowResolver {
    pub fn new(table: ShiftWindowTable, utc_offset_minutes: i32) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            utc_offset_minutes,
        }
    }

    /// 当前班次表快照
    pub fn table(&self) -> EngineResult<Arc<ShiftWindowTable>> {
        self.table
            .read()
            .map(|t| Arc::clone(&*t))
            .map_err(|e| EngineError::Config(format!("班次表锁获取失败: {}", e)))
    }

    /// 解析 now 所在窗口（返回副本）
    pub fn resolve(&self, now: DateTime<Utc>) -> EngineResult<ShiftWindow> {
        let table = self.table()?;
        Ok(table.resolve(now, self.utc_offset_minutes).clone())
    }

    /// 替换班次表（调用方需先持久化）
    pub fn replace(&self, table: ShiftWindowTable) -> EngineResult<()> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| EngineError::Config(format!("班次表锁获取失败: {}", e)))?;
        *guard = Arc::new(table);
        info!(windows = guard.windows().len(), "班次表已替换");
        Ok(())
    }
}
