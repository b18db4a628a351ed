use chrono::{DateTime, Utc};
use shingo_core::common::SignalType;
use shingo_core::common::time::TimeProvider;
use shingo_core::signal::entity::{
    DivergenceType, ExitReason, OrderflowTag, Outcome, PatternResult, PerformanceSummary,
    SignalPattern, SignalRecord, SignalStatus, SummaryFilter, parse_components,
};
use shingo_core::signal::error::StoreError;
use shingo_core::signal::port::{CloseUpdate, ExcursionUpdate, OpenUpdate, SignalStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// 汇总回溯窗口的默认天数
const DEFAULT_SUMMARY_DAYS: i64 = 30;

/// # Summary
/// 追踪器层的统一错误类型。
/// 预期内的失败 (行缺失、非法转移、入场价不可解析) 均有独立变体，
/// 调用方据此决定日志级别与 HTTP 状态码，永不以 panic 中断交易循环。
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Signal not found: {0}")]
    NotFound(String),
    #[error("Invalid transition for {signal_id}: status is {status}")]
    InvalidTransition {
        signal_id: String,
        status: SignalStatus,
    },
    #[error("No resolvable entry price for {0}")]
    MissingEntryPrice(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// # Summary
/// open 操作的入参。未提供的字段保持行内原值 (部分更新)，
/// 预期用法是创建方带完整分类元数据一次性调用。
#[derive(Debug, Clone, Default)]
pub struct OpenRequest {
    // 确认入场价
    pub confirmed_price: Option<f64>,
    // 形态分类
    pub pattern: Option<SignalPattern>,
    // 背离方向
    pub divergence_type: Option<DivergenceType>,
    // 订单流标签
    pub orderflow_tags: Option<Vec<OrderflowTag>>,
    // 触发分量
    pub trigger_component: Option<String>,
    // 验证组标记
    pub is_validation_cohort: Option<bool>,
    // 评分权重配置标签
    pub orderflow_config: Option<String>,
}

impl OpenRequest {
    /// 将分类器输出并入请求体
    pub fn with_pattern(mut self, result: PatternResult) -> Self {
        self.pattern = Some(result.pattern);
        self.divergence_type = result.divergence_type;
        self.orderflow_tags = Some(result.orderflow_tags);
        self.trigger_component = result.trigger_component;
        self
    }
}

/// # Summary
/// close 操作计算出的结局快照，供调用方 (API / 监控循环) 直接回显。
#[derive(Debug, Clone)]
pub struct CloseResult {
    pub outcome: Outcome,
    pub pnl_pct: f64,
    pub r_multiple: Option<f64>,
    pub duration_hours: Option<f64>,
}

/// # Summary
/// 信号绩效追踪器，pending -> active -> closed 状态机的唯一执行者。
///
/// # Invariants
/// - 生命周期/超额偏移/分类字段的全部写入都经过本类型，且一律
///   通过存储端口的原子条件更新落库，并发转移的后到者被拒绝。
/// - 盈亏符号约定: Long 在 exit > entry 时为正，Short 相反；
///   两种方向的即时超额偏移在价格有利时同为正数。
pub struct SignalTracker {
    // 信号行存储端口
    store: Arc<dyn SignalStore>,
    // 时间供给器 (测试中注入虚拟时钟)
    clock: Arc<dyn TimeProvider>,
}

impl SignalTracker {
    pub fn new(store: Arc<dyn SignalStore>, clock: Arc<dyn TimeProvider>) -> Arc<Self> {
        Arc::new(Self { store, clock })
    }

    /// # Summary
    /// 将 pending 信号确认入场并写入分类元数据。
    ///
    /// # Logic
    /// 1. 以 `WHERE status = 'pending'` 的条件更新尝试转移。
    /// 2. 未命中时回读行以区分"行缺失"与"状态非法" (双重 open 被拒绝)。
    ///
    /// # Arguments
    /// * `signal_id`: 信号标识。
    /// * `req`: 确认价与分类元数据。
    ///
    /// # Returns
    /// 成功返回 Ok，预期内失败返回对应的 `TrackerError` 变体。
    pub async fn open(&self, signal_id: &str, req: OpenRequest) -> Result<(), TrackerError> {
        let update = OpenUpdate {
            opened_at: self.clock.now(),
            confirmed_price: req.confirmed_price,
            signal_pattern: req.pattern,
            divergence_type: req.divergence_type,
            orderflow_tags: req.orderflow_tags,
            trigger_component: req.trigger_component,
            is_validation_cohort: req.is_validation_cohort,
            orderflow_config: req.orderflow_config,
        };

        if self.store.mark_opened(signal_id, &update).await? {
            info!("Signal {} opened", signal_id);
            return Ok(());
        }

        Err(self.transition_failure(signal_id).await?)
    }

    /// # Summary
    /// 按现价刷新活跃信号的 MFE/MAE。
    ///
    /// # Logic
    /// 1. 读取行；非 active 状态直接返回 `Ok(false)` (无操作)。
    /// 2. 计算方向感知的即时偏移百分比。
    /// 3. 仅当突破已存量值 (MFE 取更大 / MAE 取更小，默认 0) 时携带该侧。
    /// 4. 两侧均未突破时完全跳过落库，避免无意义写放大。
    ///
    /// # Returns
    /// 发生了数据库写入返回 `Ok(true)`，否则 `Ok(false)`。
    pub async fn update_excursion(
        &self,
        signal_id: &str,
        current_price: f64,
    ) -> Result<bool, TrackerError> {
        let record = self
            .store
            .get(signal_id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(signal_id.to_string()))?;

        if record.status != SignalStatus::Active {
            return Ok(false);
        }

        let entry = resolve_entry_price(&record)?;
        let excursion = excursion_pct(record.signal_type, entry, current_price);
        let now = self.clock.now();

        let mut update = ExcursionUpdate::default();
        if excursion > record.mfe_pct.unwrap_or(0.0) {
            update.mfe = Some((excursion, current_price, now));
        }
        if excursion < record.mae_pct.unwrap_or(0.0) {
            update.mae = Some((excursion, current_price, now));
        }

        if update.is_empty() {
            return Ok(false);
        }

        Ok(self.store.apply_excursion(signal_id, &update).await?)
    }

    /// # Summary
    /// 平仓并一次性推导全部结局字段。
    ///
    /// # Logic
    /// 1. 读取行；已平仓的行拒绝 (`InvalidTransition`)，从未 open 的
    ///    pending 行允许直接平仓 (此时持续时长为 None)。
    /// 2. 解析入场价: `entry_price` 缺失时回退 `confirmed_price`。
    /// 3. 推导 pnl / outcome / r_multiple / duration。
    /// 4. 以 `WHERE status != 'closed'` 的条件更新落库；并发平仓的
    ///    后到者在此处被拒绝而不是覆盖先到者的结果。
    ///
    /// # Arguments
    /// * `signal_id`: 信号标识。
    /// * `exit_price`: 成交出场价。
    /// * `exit_reason`: 平仓原因代码。
    /// * `notes`: 可选的绩效备注。
    ///
    /// # Returns
    /// 成功返回计算出的 `CloseResult`。
    pub async fn close(
        &self,
        signal_id: &str,
        exit_price: f64,
        exit_reason: ExitReason,
        notes: Option<String>,
    ) -> Result<CloseResult, TrackerError> {
        let record = self
            .store
            .get(signal_id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(signal_id.to_string()))?;

        if record.status == SignalStatus::Closed {
            return Err(TrackerError::InvalidTransition {
                signal_id: signal_id.to_string(),
                status: record.status,
            });
        }

        let entry = resolve_entry_price(&record)?;
        let pnl_pct = pnl_pct(record.signal_type, entry, exit_price);
        let outcome = derive_outcome(exit_reason, pnl_pct);
        let r_multiple = r_multiple(pnl_pct, entry, record.stop_loss);
        let now = self.clock.now();
        let duration_hours = record.opened_at.map(|opened| hours_between(opened, now));

        let update = CloseUpdate {
            closed_at: now,
            exit_price,
            exit_reason,
            outcome,
            pnl_pct,
            r_multiple,
            duration_hours,
            performance_notes: notes,
        };

        if !self.store.mark_closed(signal_id, &update).await? {
            // 条件更新未命中：另一个调用方赢得了平仓竞争
            warn!("Signal {} was closed concurrently", signal_id);
            return Err(TrackerError::InvalidTransition {
                signal_id: signal_id.to_string(),
                status: SignalStatus::Closed,
            });
        }

        info!(
            "Signal {} closed: {} pnl={:.2}% reason={}",
            signal_id, outcome, pnl_pct, exit_reason
        );

        Ok(CloseResult {
            outcome,
            pnl_pct,
            r_multiple,
            duration_hours,
        })
    }

    /// # Summary
    /// 形态分类便捷入口：宽松解码原始分量载荷后委托给分类器。
    /// 不触碰信号行本身，调用方负责将结果喂给 `open`。
    pub fn classify_pattern(
        &self,
        components: &serde_json::Value,
        signal_type: SignalType,
    ) -> PatternResult {
        let parsed = parse_components(components);
        crate::pattern::classify(&parsed, signal_type)
    }

    /// # Summary
    /// 聚合回溯窗口内已平仓信号的绩效统计。
    ///
    /// # Logic
    /// 1. 计算窗口起点 (days <= 0 时取默认 30 天)。
    /// 2. 从存储取回 outcome 属于 {win, loss, stopped_out} 的已平仓行。
    /// 3. 在内存中完成全部聚合算术；零匹配返回 `Ok(None)` 而非错误。
    pub async fn performance_summary(
        &self,
        filter: &SummaryFilter,
    ) -> Result<Option<PerformanceSummary>, TrackerError> {
        let days = if filter.days > 0 {
            filter.days
        } else {
            DEFAULT_SUMMARY_DAYS
        };
        let cutoff = self.clock.now() - chrono::Duration::days(days);

        let rows = self
            .store
            .list_closed_since(cutoff, filter.signal_type, filter.pattern)
            .await?;

        Ok(compute_summary(&rows))
    }

    /// 区分条件转移失败的两种情形
    async fn transition_failure(&self, signal_id: &str) -> Result<TrackerError, TrackerError> {
        match self.store.get(signal_id).await? {
            None => Ok(TrackerError::NotFound(signal_id.to_string())),
            Some(record) => Ok(TrackerError::InvalidTransition {
                signal_id: signal_id.to_string(),
                status: record.status,
            }),
        }
    }
}

/// 入场价解析: `entry_price` 缺失时回退确认价
fn resolve_entry_price(record: &SignalRecord) -> Result<f64, TrackerError> {
    record
        .entry_price
        .or(record.confirmed_price)
        .filter(|p| *p > 0.0)
        .ok_or_else(|| TrackerError::MissingEntryPrice(record.signal_id.clone()))
}

/// # Summary
/// 方向感知的即时偏移百分比。
/// 两种方向在价格向信号有利方向运动时同为正数。
fn excursion_pct(signal_type: SignalType, entry: f64, price: f64) -> f64 {
    match signal_type {
        SignalType::Long => (price - entry) / entry * 100.0,
        SignalType::Short => (entry - price) / entry * 100.0,
    }
}

/// # Summary
/// 方向感知的已实现盈亏百分比，与 `excursion_pct` 同一套符号约定。
fn pnl_pct(signal_type: SignalType, entry: f64, exit: f64) -> f64 {
    excursion_pct(signal_type, entry, exit)
}

/// # Summary
/// 由平仓原因与盈亏推导结局。
/// 止损原因无条件推导为 stopped_out —— 跳空行情下止损也可能以小幅
/// 盈利成交，但原因代码优先于盈亏符号。
fn derive_outcome(exit_reason: ExitReason, pnl_pct: f64) -> Outcome {
    match exit_reason {
        ExitReason::StopLoss => Outcome::StoppedOut,
        ExitReason::TimeExit | ExitReason::Expired => Outcome::Expired,
        _ => {
            if pnl_pct > 0.0 {
                Outcome::Win
            } else {
                Outcome::Loss
            }
        }
    }
}

/// R 倍数: pnl / 初始风险百分比。止损缺失或风险为零时不产出。
fn r_multiple(pnl_pct: f64, entry: f64, stop_loss: Option<f64>) -> Option<f64> {
    let stop = stop_loss?;
    let risk_pct = (stop - entry).abs() / entry * 100.0;
    if risk_pct > 0.0 {
        Some(pnl_pct / risk_pct)
    } else {
        None
    }
}

/// 两个时间戳之间的小时数 (时序倒挂时取 0)
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .to_std()
        .map(|d| d.as_secs_f64() / 3600.0)
        .unwrap_or(0.0)
}

fn count_f64(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / count_f64(values.len()))
}

/// # Summary
/// 在内存中完成绩效聚合。输入行已由存储层按窗口与结局过滤。
fn compute_summary(rows: &[SignalRecord]) -> Option<PerformanceSummary> {
    if rows.is_empty() {
        return None;
    }

    let pnls: Vec<f64> = rows.iter().filter_map(|r| r.pnl_pct).collect();
    let win_pnls: Vec<f64> = rows
        .iter()
        .filter(|r| r.outcome == Some(Outcome::Win))
        .filter_map(|r| r.pnl_pct)
        .collect();
    let loss_pnls: Vec<f64> = rows
        .iter()
        .filter(|r| r.outcome == Some(Outcome::Loss))
        .filter_map(|r| r.pnl_pct)
        .collect();

    let wins = win_pnls.len();
    let losses = loss_pnls.len();
    let stopped = rows
        .iter()
        .filter(|r| r.outcome == Some(Outcome::StoppedOut))
        .count();

    let avg_win_pct = mean(&win_pnls);
    let avg_loss_pct = mean(&loss_pnls);

    // 盈亏比 |avg_win * wins / (avg_loss * losses)|，无亏损单时无定义
    let profit_factor = match avg_loss_pct {
        Some(avg_loss) if losses > 0 && avg_loss != 0.0 => Some(
            (avg_win_pct.unwrap_or(0.0) * count_f64(wins) / (avg_loss * count_f64(losses))).abs(),
        ),
        _ => None,
    };

    let r_values: Vec<f64> = rows.iter().filter_map(|r| r.r_multiple).collect();
    let durations: Vec<f64> = rows.iter().filter_map(|r| r.duration_hours).collect();
    let mfes: Vec<f64> = rows.iter().filter_map(|r| r.mfe_pct).collect();
    let maes: Vec<f64> = rows.iter().filter_map(|r| r.mae_pct).collect();

    Some(PerformanceSummary {
        total_signals: u32::try_from(rows.len()).unwrap_or(u32::MAX),
        wins: u32::try_from(wins).unwrap_or(u32::MAX),
        losses: u32::try_from(losses).unwrap_or(u32::MAX),
        stopped_out: u32::try_from(stopped).unwrap_or(u32::MAX),
        win_rate_pct: count_f64(wins) / count_f64(rows.len()) * 100.0,
        avg_pnl_pct: mean(&pnls).unwrap_or(0.0),
        max_pnl_pct: pnls.iter().copied().fold(f64::MIN, f64::max),
        min_pnl_pct: pnls.iter().copied().fold(f64::MAX, f64::min),
        avg_win_pct,
        avg_loss_pct,
        profit_factor,
        avg_r_multiple: mean(&r_values),
        avg_duration_hours: mean(&durations),
        avg_mfe_pct: mean(&mfes),
        avg_mae_pct: mean(&maes),
    })
}
