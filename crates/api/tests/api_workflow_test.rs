use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use shingo_api::server::{AppState, build_router};
use shingo_api::types::{
    ApiResponse, CloseSignalRequest, CloseSignalResponse, CreateSignalRequest,
    CreateSignalResponse, MonitorStatusResponse, PerformanceSummaryResponse, SignalResponse,
    TargetDto,
};
use shingo_core::config::MonitorConfig;
use shingo_core::market::error::MarketError;
use shingo_core::market::port::MarketDataProvider;
use shingo_core::signal::port::SignalStore;
use shingo_monitor::position::PositionMonitor;
use shingo_store::signal::SqliteSignalStore;
use shingo_tracker::tracker::SignalTracker;
use std::sync::Arc;
use tokio::net::TcpListener;

/// 固定报价桩：集成测试不触网
struct FixedPriceProvider;

#[async_trait]
impl MarketDataProvider for FixedPriceProvider {
    async fn get_current_price(&self, symbol: &str) -> Result<f64, MarketError> {
        match symbol {
            "BTCUSDT" => Ok(50500.0),
            _ => Err(MarketError::Unavailable(symbol.to_string())),
        }
    }
}

// 帮助函数：在随机端口启动测试服务器
async fn spawn_test_server() -> (String, tempfile::TempDir) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    shingo_store::config::set_root_dir(tmp_dir.path().to_path_buf());

    let store: Arc<dyn SignalStore> = Arc::new(SqliteSignalStore::new().await.unwrap());
    let clock = Arc::new(shingo_core::common::time::RealTimeProvider);
    let tracker = SignalTracker::new(store.clone(), clock);
    let monitor = PositionMonitor::new(
        tracker.clone(),
        store.clone(),
        Arc::new(FixedPriceProvider),
        MonitorConfig {
            poll_interval_secs: 3600,
            auto_close: false,
        },
    );

    let state = AppState {
        store,
        tracker,
        monitor,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let addr = format!("http://127.0.0.1:{}", port);

    let router = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // 稍微等待服务器启动
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    (addr, tmp_dir)
}

#[tokio::test]
async fn test_full_api_workflow() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (base_url, _tmp) = spawn_test_server().await;
    let client = reqwest::Client::new();

    // ============================================
    // Case 1: 录入信号
    // ============================================
    let create_req = CreateSignalRequest {
        symbol: "BTC/USDT".to_string(),
        signal_type: "LONG".to_string(),
        confluence_score: 85.0,
        reliability: 0.8,
        entry_price: Some(50000.0),
        stop_loss: Some(49000.0),
        targets: vec![TargetDto {
            name: "T1".to_string(),
            price: 51500.0,
            size: 1.0,
        }],
        components: json!({
            "technical": {"score": 30.0},
            "orderflow": {"score": 75.0, "buyer_aggression": 0.9},
            "volume": {"score": 50.0},
        }),
        trade_params: json!(null),
        report_json_path: None,
        report_pdf_path: None,
        sent: false,
    };

    let resp = client
        .post(format!("{}/api/v1/signals", base_url))
        .json(&create_req)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<CreateSignalResponse> = resp.json().await.unwrap();
    let created = body.data.expect("create payload");
    assert!(!created.duplicate);
    let signal_id = created.signal_id.expect("signal id");
    assert!(signal_id.starts_with("SIG-BTCUSDT-LONG-85-"));

    // 同秒重复提交命中幂等去重
    let resp = client
        .post(format!("{}/api/v1/signals", base_url))
        .json(&create_req)
        .send()
        .await
        .unwrap();
    let body: ApiResponse<CreateSignalResponse> = resp.json().await.unwrap();
    assert!(body.data.expect("duplicate payload").duplicate);

    // ============================================
    // Case 2: 非法方向被拒绝 (400)
    // ============================================
    let resp = client
        .post(format!("{}/api/v1/signals", base_url))
        .json(&json!({
            "symbol": "ETHUSDT",
            "signal_type": "SIDEWAYS",
            "confluence_score": 70.0,
            "reliability": 0.5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // ============================================
    // Case 3: 确认入场 (服务端形态分类)
    // ============================================
    let resp = client
        .post(format!("{}/api/v1/signals/{}/open", base_url, signal_id))
        .json(&json!({
            "confirmed_price": 50100.0,
            "components": create_req.components.clone(),
            "orderflow_config": "baseline",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<SignalResponse> = resp.json().await.unwrap();
    let opened = body.data.expect("opened signal");
    assert_eq!(opened.status, "active");
    assert_eq!(opened.signal_pattern.as_deref(), Some("divergence"));
    assert_eq!(opened.divergence_type.as_deref(), Some("bullish_divergence"));
    assert!(
        opened
            .orderflow_tags
            .contains(&"high_buyer_aggression".to_string())
    );

    // 重复 open 返回 409
    let resp = client
        .post(format!("{}/api/v1/signals/{}/open", base_url, signal_id))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // ============================================
    // Case 4: 活跃列表与监控状态
    // ============================================
    let resp = client
        .get(format!("{}/api/v1/signals/active", base_url))
        .send()
        .await
        .unwrap();
    let body: ApiResponse<Vec<SignalResponse>> = resp.json().await.unwrap();
    assert_eq!(body.data.expect("active list").len(), 1);

    let resp = client
        .get(format!("{}/api/v1/monitor/status", base_url))
        .send()
        .await
        .unwrap();
    let body: ApiResponse<MonitorStatusResponse> = resp.json().await.unwrap();
    let status = body.data.expect("monitor status");
    assert!(!status.running);
    assert_eq!(status.active_signals.len(), 1);
    assert_eq!(status.active_signals[0].first_target, Some(51500.0));

    // ============================================
    // Case 5: 平仓 (缺省人工) 与重复平仓 409
    // ============================================
    let resp = client
        .post(format!("{}/api/v1/signals/{}/close", base_url, signal_id))
        .json(&CloseSignalRequest {
            exit_price: 51500.0,
            exit_reason: None,
            notes: Some("dashboard exit".to_string()),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<CloseSignalResponse> = resp.json().await.unwrap();
    let closed = body.data.expect("close payload");
    assert_eq!(closed.outcome, "win");
    assert!((closed.pnl_pct - 3.0).abs() < 1e-9);

    let resp = client
        .post(format!("{}/api/v1/signals/{}/close", base_url, signal_id))
        .json(&CloseSignalRequest {
            exit_price: 50000.0,
            exit_reason: Some("manual".to_string()),
            notes: None,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // ============================================
    // Case 6: 详情回读与绩效汇总
    // ============================================
    let resp = client
        .get(format!("{}/api/v1/signals/{}", base_url, signal_id))
        .send()
        .await
        .unwrap();
    let body: ApiResponse<SignalResponse> = resp.json().await.unwrap();
    let detail = body.data.expect("detail");
    assert_eq!(detail.status, "closed");
    assert_eq!(detail.exit_reason.as_deref(), Some("manual"));
    assert_eq!(detail.performance_notes.as_deref(), Some("dashboard exit"));

    let resp = client
        .get(format!("{}/api/v1/performance/summary", base_url))
        .send()
        .await
        .unwrap();
    let body: ApiResponse<PerformanceSummaryResponse> = resp.json().await.unwrap();
    let summary = body.data.expect("summary");
    assert_eq!(summary.total_signals, 1);
    assert_eq!(summary.wins, 1);
    assert_eq!(summary.win_rate_pct, 100.0);

    // 过滤到零匹配 -> data 为 null 的无数据哨兵
    let resp = client
        .get(format!(
            "{}/api/v1/performance/summary?signal_type=SHORT",
            base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<PerformanceSummaryResponse> = resp.json().await.unwrap();
    assert!(body.success);
    assert!(body.data.is_none());

    // ============================================
    // Case 7: 不存在的信号 (404)
    // ============================================
    let resp = client
        .get(format!("{}/api/v1/signals/SIG-NONE", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
