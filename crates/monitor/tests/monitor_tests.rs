use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use shingo_core::common::SignalType;
use shingo_core::common::time::FakeClockProvider;
use shingo_core::config::MonitorConfig;
use shingo_core::market::error::MarketError;
use shingo_core::market::port::MarketDataProvider;
use shingo_core::signal::entity::{
    ExitReason, NewSignal, Outcome, SignalStatus, Target,
};
use shingo_core::signal::memory::MemorySignalStore;
use shingo_core::signal::port::SignalStore;
use shingo_monitor::position::PositionMonitor;
use shingo_tracker::tracker::{OpenRequest, SignalTracker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 可编程的现价桩：未配置的交易对一律返回不可用
struct MockProvider {
    prices: Mutex<HashMap<String, f64>>,
}

impl MockProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            prices: Mutex::new(HashMap::new()),
        })
    }

    fn set_price(&self, symbol: &str, price: f64) {
        self.prices
            .lock()
            .expect("mutex poisoned")
            .insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn get_current_price(&self, symbol: &str) -> Result<f64, MarketError> {
        self.prices
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketError::Unavailable(symbol.to_string()))
    }
}

struct Harness {
    store: Arc<MemorySignalStore>,
    tracker: Arc<SignalTracker>,
    provider: Arc<MockProvider>,
}

fn harness() -> Harness {
    let store = Arc::new(MemorySignalStore::new());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(FakeClockProvider::new(t0));
    let tracker = SignalTracker::new(store.clone(), clock);
    Harness {
        store,
        tracker,
        provider: MockProvider::new(),
    }
}

fn monitor_of(h: &Harness, auto_close: bool) -> Arc<PositionMonitor> {
    PositionMonitor::new(
        h.tracker.clone(),
        h.store.clone(),
        h.provider.clone(),
        MonitorConfig {
            poll_interval_secs: 60,
            auto_close,
        },
    )
}

async fn seed_active(
    h: &Harness,
    symbol: &str,
    signal_type: SignalType,
    entry: f64,
    stop: Option<f64>,
    first_target: Option<f64>,
) -> String {
    let targets = first_target
        .map(|price| {
            vec![Target {
                name: "T1".to_string(),
                price,
                size: 1.0,
            }]
        })
        .unwrap_or_default();

    let id = h
        .store
        .create(&NewSignal {
            symbol: symbol.to_string(),
            signal_type,
            confluence_score: 80.0,
            reliability: 0.75,
            entry_price: Some(entry),
            stop_loss: stop,
            targets,
            components: json!({}),
            trade_params: json!(null),
            report_json_path: None,
            report_pdf_path: None,
            sent: false,
        })
        .await
        .unwrap()
        .expect("insert");

    h.tracker
        .open(&id, OpenRequest::default())
        .await
        .expect("open");
    id
}

#[tokio::test]
async fn test_cycle_updates_excursions() {
    let h = harness();
    let monitor = monitor_of(&h, false);
    let id = seed_active(&h, "BTCUSDT", SignalType::Long, 100.0, Some(90.0), None).await;

    h.provider.set_price("BTCUSDT", 102.0);
    monitor.run_cycle().await;
    h.provider.set_price("BTCUSDT", 99.0);
    monitor.run_cycle().await;

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Active);
    assert!((record.mfe_pct.unwrap() - 2.0).abs() < 1e-9);
    assert!((record.mae_pct.unwrap() + 1.0).abs() < 1e-9);

    // 自动平仓关闭时，即使止损被击穿也只刷新偏移
    h.provider.set_price("BTCUSDT", 89.0);
    monitor.run_cycle().await;
    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Active);
}

#[tokio::test]
async fn test_auto_close_on_stop_loss() {
    let h = harness();
    let monitor = monitor_of(&h, true);
    let id = seed_active(
        &h,
        "BTCUSDT",
        SignalType::Long,
        100.0,
        Some(98.0),
        Some(103.0),
    )
    .await;

    h.provider.set_price("BTCUSDT", 97.5);
    monitor.run_cycle().await;

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Closed);
    assert_eq!(record.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(record.outcome, Some(Outcome::StoppedOut));
    assert_eq!(record.exit_price, Some(97.5));
}

#[tokio::test]
async fn test_auto_close_on_first_target() {
    let h = harness();
    let monitor = monitor_of(&h, true);
    // SHORT: 目标位在下方
    let id = seed_active(
        &h,
        "ETHUSDT",
        SignalType::Short,
        100.0,
        Some(102.0),
        Some(97.0),
    )
    .await;

    h.provider.set_price("ETHUSDT", 96.5);
    monitor.run_cycle().await;

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Closed);
    assert_eq!(record.exit_reason, Some(ExitReason::TargetHit));
    assert_eq!(record.outcome, Some(Outcome::Win));
}

#[tokio::test]
async fn test_stop_loss_takes_priority_over_target() {
    let h = harness();
    let monitor = monitor_of(&h, true);
    // 畸形配置: 目标位低于止损位，单个报价可同时满足两个条件。
    // 止损优先，目标位在该轮不再评估。
    let id = seed_active(
        &h,
        "BTCUSDT",
        SignalType::Long,
        100.0,
        Some(98.0),
        Some(97.0),
    )
    .await;

    h.provider.set_price("BTCUSDT", 97.5);
    monitor.run_cycle().await;

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.exit_reason, Some(ExitReason::StopLoss));
}

#[tokio::test]
async fn test_one_bad_symbol_does_not_abort_cycle() {
    let h = harness();
    let monitor = monitor_of(&h, true);

    // NOPRICE 无现价可用，BTCUSDT 正常
    let bad = seed_active(&h, "NOPRICE", SignalType::Long, 100.0, Some(98.0), None).await;
    let good = seed_active(
        &h,
        "BTCUSDT",
        SignalType::Long,
        100.0,
        Some(98.0),
        Some(103.0),
    )
    .await;

    h.provider.set_price("BTCUSDT", 103.5);
    monitor.run_cycle().await;

    // 取价失败的信号本轮被跳过，保持 active
    let record = h.store.get(&bad).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Active);
    assert!(record.mfe_pct.is_none());

    // 其余信号正常处理并完成止盈
    let record = h.store.get(&good).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Closed);
    assert_eq!(record.exit_reason, Some(ExitReason::TargetHit));
}

#[tokio::test]
async fn test_manual_close_passthrough() {
    let h = harness();
    let monitor = monitor_of(&h, true);
    let id = seed_active(&h, "BTCUSDT", SignalType::Long, 100.0, Some(98.0), None).await;

    let result = monitor
        .close_signal_manually(&id, 104.0, Some("operator exit".to_string()))
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Win);

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.exit_reason, Some(ExitReason::Manual));
    assert_eq!(record.performance_notes.as_deref(), Some("operator exit"));
}

#[tokio::test]
async fn test_monitoring_stats_snapshot() {
    let h = harness();
    let monitor = monitor_of(&h, true);
    seed_active(
        &h,
        "BTCUSDT",
        SignalType::Long,
        100.0,
        Some(98.0),
        Some(103.0),
    )
    .await;

    h.provider.set_price("BTCUSDT", 101.0);
    monitor.run_cycle().await;

    let stats = monitor.monitoring_stats().await.unwrap();
    assert!(!stats.running);
    assert!(stats.auto_close);
    assert_eq!(stats.poll_interval_secs, 60);
    assert_eq!(stats.cycles_completed, 1);
    assert!(stats.last_cycle_at.is_some());
    assert_eq!(stats.active_signals.len(), 1);
    assert_eq!(stats.active_signals[0].symbol, "BTCUSDT");
    assert_eq!(stats.active_signals[0].first_target, Some(103.0));
}

#[tokio::test]
async fn test_graceful_stop_and_restart() {
    let h = harness();
    let monitor = PositionMonitor::new(
        h.tracker.clone(),
        h.store.clone(),
        h.provider.clone(),
        MonitorConfig {
            poll_interval_secs: 1,
            auto_close: false,
        },
    );

    monitor.start().await;
    // 重复 start 是无操作
    monitor.start().await;
    assert!(monitor.monitoring_stats().await.unwrap().running);

    // 等待首个周期完成
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    monitor.stop().await;

    let stats = monitor.monitoring_stats().await.unwrap();
    assert!(!stats.running);
    assert!(stats.cycles_completed >= 1);
    let cycles_after_stop = stats.cycles_completed;

    // 停止后不再产生新周期
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(
        monitor.monitoring_stats().await.unwrap().cycles_completed,
        cycles_after_stop
    );

    // 可安全重启
    monitor.start().await;
    assert!(monitor.monitoring_stats().await.unwrap().running);
    monitor.stop().await;
}
