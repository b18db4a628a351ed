use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shingo_core::common::SignalType;
use shingo_core::config::MonitorConfig;
use shingo_core::market::port::MarketDataProvider;
use shingo_core::signal::entity::{ExitReason, SignalRecord};
use shingo_core::signal::port::SignalStore;
use shingo_tracker::tracker::{CloseResult, SignalTracker, TrackerError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// # Summary
/// 监控器运行状态快照，供 API 层直接回显。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStats {
    // 轮询任务是否在运行
    pub running: bool,
    // 轮询周期 (秒)
    pub poll_interval_secs: u64,
    // 自动平仓是否启用
    pub auto_close: bool,
    // 已完成的轮询次数
    pub cycles_completed: u64,
    // 最近一次轮询完成时间
    pub last_cycle_at: Option<DateTime<Utc>>,
    // 当前追踪中的活跃信号
    pub active_signals: Vec<ActiveSignalSnapshot>,
}

/// # Summary
/// 单个活跃信号的追踪快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSignalSnapshot {
    pub signal_id: String,
    pub symbol: String,
    pub signal_type: SignalType,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    // 自动止盈触发位 (targets[0])
    pub first_target: Option<f64>,
    pub mfe_pct: Option<f64>,
    pub mae_pct: Option<f64>,
    pub opened_at: Option<DateTime<Utc>>,
}

impl From<&SignalRecord> for ActiveSignalSnapshot {
    fn from(record: &SignalRecord) -> Self {
        Self {
            signal_id: record.signal_id.clone(),
            symbol: record.symbol.clone(),
            signal_type: record.signal_type,
            entry_price: record.entry_price.or(record.confirmed_price),
            stop_loss: record.stop_loss,
            first_target: record.targets.first().map(|t| t.price),
            mfe_pct: record.mfe_pct,
            mae_pct: record.mae_pct,
            opened_at: record.opened_at,
        }
    }
}

/// # Summary
/// 仓位监控器。单个后台协程按固定周期执行轮询，
/// 是系统中唯一无人值守的写入触发方。
///
/// # Invariants
/// - 任意时刻至多一个轮询周期在途 (循环串行保证单飞)。
/// - 单个信号的失败绝不中断同一周期内其余信号的处理。
/// - 停止是优雅的：在途周期执行完毕后不再开启下一轮；支持重启。
pub struct PositionMonitor {
    // 追踪器 (所有行变更的唯一通道)
    tracker: Arc<SignalTracker>,
    // 信号行存储 (只读枚举)
    store: Arc<dyn SignalStore>,
    // 现价数据源
    provider: Arc<dyn MarketDataProvider>,
    // 轮询配置
    config: MonitorConfig,
    // 运行标志
    running: AtomicBool,
    // 完成周期计数
    cycles: AtomicU64,
    // 最近一次周期完成时间
    last_cycle_at: RwLock<Option<DateTime<Utc>>>,
    // 在运行的轮询任务句柄与停止信号发送端
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl PositionMonitor {
    pub fn new(
        tracker: Arc<SignalTracker>,
        store: Arc<dyn SignalStore>,
        provider: Arc<dyn MarketDataProvider>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            store,
            provider,
            config,
            running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            last_cycle_at: RwLock::new(None),
            task: Mutex::new(None),
        })
    }

    /// # Summary
    /// 启动轮询协程。已在运行时为无操作。
    ///
    /// # Logic
    /// 1. 创建 watch 通道作为停止信号。
    /// 2. 协程持有监控器的弱引用：每轮升级失败 (宿主销毁) 即退出。
    /// 3. 周期执行完毕后在"休眠"与"停止信号"之间 select，
    ///    保证停止及时打断休眠但从不打断在途周期。
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Position monitor already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(self);
        let interval = std::time::Duration::from_secs(self.config.poll_interval_secs);

        let handle = tokio::spawn(run_loop(weak, stop_rx, interval));
        *task = Some((stop_tx, handle));
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Position monitor started (interval={}s, auto_close={})",
            self.config.poll_interval_secs, self.config.auto_close
        );
    }

    /// # Summary
    /// 优雅停止：发出停止信号并等待在途周期执行完毕。可随后重启。
    pub async fn stop(&self) {
        let Some((stop_tx, handle)) = self.task.lock().await.take() else {
            return;
        };

        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            error!("Monitor task join failed: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Position monitor stopped");
    }

    /// # Summary
    /// 人工平仓入口，API 层的直通通道。
    pub async fn close_signal_manually(
        &self,
        signal_id: &str,
        exit_price: f64,
        notes: Option<String>,
    ) -> Result<CloseResult, TrackerError> {
        self.tracker
            .close(signal_id, exit_price, ExitReason::Manual, notes)
            .await
    }

    /// # Summary
    /// 运行状态快照 + 当前追踪中的活跃行。
    pub async fn monitoring_stats(&self) -> Result<MonitoringStats, TrackerError> {
        let active = self.store.list_active().await?;
        let last_cycle_at = *self
            .last_cycle_at
            .read()
            .unwrap_or_else(|e| e.into_inner());

        Ok(MonitoringStats {
            running: self.running.load(Ordering::SeqCst),
            poll_interval_secs: self.config.poll_interval_secs,
            auto_close: self.config.auto_close,
            cycles_completed: self.cycles.load(Ordering::SeqCst),
            last_cycle_at,
            active_signals: active.iter().map(ActiveSignalSnapshot::from).collect(),
        })
    }

    /// # Summary
    /// 执行一个完整轮询周期。
    ///
    /// # Logic
    /// 1. 枚举全部 active 行 (存储失败时记录日志并放弃本轮)。
    /// 2. 逐信号处理，单个信号的失败只记日志不中断其余信号。
    /// 3. 周期末尾推进计数与完成时间。
    pub async fn run_cycle(&self) {
        let records = match self.store.list_active().await {
            Ok(records) => records,
            Err(e) => {
                error!("Monitor cycle aborted, failed to list active signals: {}", e);
                return;
            }
        };

        debug!("Monitor cycle: {} active signal(s)", records.len());
        for record in &records {
            self.process_signal(record).await;
        }

        self.cycles.fetch_add(1, Ordering::SeqCst);
        *self
            .last_cycle_at
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
    }

    /// # Summary
    /// 单个信号的周期处理：取价 -> 刷新偏移 -> 评估自动平仓。
    /// 每一步的失败都被就地吸收。
    async fn process_signal(&self, record: &SignalRecord) {
        let price = match self.provider.get_current_price(&record.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    "Price unavailable for {} ({}), skipping this cycle: {}",
                    record.symbol, record.signal_id, e
                );
                return;
            }
        };

        if let Err(e) = self.tracker.update_excursion(&record.signal_id, price).await {
            warn!(
                "Excursion update failed for {}: {}",
                record.signal_id, e
            );
        }

        if self.config.auto_close
            && let Err(e) = self.evaluate_auto_close(record, price).await
        {
            warn!(
                "Auto-close evaluation failed for {}: {}",
                record.signal_id, e
            );
        }
    }

    /// # Summary
    /// 自动平仓判定。
    ///
    /// # Logic
    /// 1. 止损优先：命中即平仓并提前返回，本轮不再评估目标位。
    /// 2. 止盈只由 `targets[0]` 触发，后续目标位仅作展示
    ///    (既定策略，改变它会改变交易行为)。
    async fn evaluate_auto_close(
        &self,
        record: &SignalRecord,
        price: f64,
    ) -> Result<(), TrackerError> {
        if let Some(stop) = record.stop_loss {
            let breached = match record.signal_type {
                SignalType::Long => price <= stop,
                SignalType::Short => price >= stop,
            };
            if breached {
                info!(
                    "Stop loss breached for {} at {} (stop {})",
                    record.signal_id, price, stop
                );
                self.tracker
                    .close(
                        &record.signal_id,
                        price,
                        ExitReason::StopLoss,
                        Some(format!("auto: stop loss {} breached", stop)),
                    )
                    .await?;
                return Ok(());
            }
        }

        if let Some(target) = record.targets.first() {
            let hit = match record.signal_type {
                SignalType::Long => price >= target.price,
                SignalType::Short => price <= target.price,
            };
            if hit {
                info!(
                    "First target hit for {} at {} (target {})",
                    record.signal_id, price, target.price
                );
                self.tracker
                    .close(
                        &record.signal_id,
                        price,
                        ExitReason::TargetHit,
                        Some(format!("auto: target {} hit", target.name)),
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

/// 后台轮询循环体。持弱引用，宿主销毁后自动退出。
async fn run_loop(
    weak: Weak<PositionMonitor>,
    mut stop_rx: watch::Receiver<bool>,
    interval: std::time::Duration,
) {
    loop {
        let Some(monitor) = weak.upgrade() else {
            break;
        };
        monitor.run_cycle().await;
        // 休眠前释放强引用，避免阻碍宿主销毁
        drop(monitor);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => {
                debug!("Monitor loop received stop signal");
                break;
            }
        }
    }
}
