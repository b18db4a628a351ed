use chrono::Utc;
use serde_json::json;
use shingo_core::common::SignalType;
use shingo_core::signal::entity::{
    ExitReason, NewSignal, Outcome, SignalPattern, SignalStatus, Target,
};
use shingo_core::signal::port::{CloseUpdate, ExcursionUpdate, OpenUpdate, SignalStore};
use shingo_store::config::set_root_dir;
use shingo_store::signal::SqliteSignalStore;
use tempfile::tempdir;

fn sample_signal(symbol: &str, signal_type: SignalType) -> NewSignal {
    NewSignal {
        symbol: symbol.to_string(),
        signal_type,
        confluence_score: 85.0,
        reliability: 0.8,
        entry_price: Some(50000.0),
        stop_loss: Some(49000.0),
        targets: vec![
            Target {
                name: "T1".to_string(),
                price: 51500.0,
                size: 0.5,
            },
            Target {
                name: "T2".to_string(),
                price: 53000.0,
                size: 0.5,
            },
        ],
        components: json!({
            "technical": {"score": 75.0},
            "orderflow": {"score": 82.0, "buyer_aggression": 0.8},
            "volume": {"score": 70.0},
        }),
        trade_params: json!({"leverage": 3}),
        report_json_path: Some("reports/sig.json".to_string()),
        report_pdf_path: None,
        sent: true,
    }
}

#[tokio::test]
async fn test_store_full_lifecycle() {
    // 1. 初始化临时测试环境
    let tmp_dir = tempdir().expect("Failed to create temp dir");
    set_root_dir(tmp_dir.path().to_path_buf());

    let store = SqliteSignalStore::new()
        .await
        .expect("Failed to create signal store");

    // 2. 创建：归一化 symbol 并派生确定性 ID
    let id = store
        .create(&sample_signal("btc/usdt", SignalType::Long))
        .await
        .unwrap()
        .expect("First create should insert");
    assert!(id.starts_with("SIG-BTCUSDT-LONG-85-"));

    // 同秒内的重复创建被静默吸收，表中只有一行
    let dup = store
        .create(&sample_signal("BTC/USDT", SignalType::Long))
        .await
        .unwrap();
    assert!(dup.is_none());

    let record = store.get(&id).await.unwrap().expect("Row should exist");
    assert_eq!(record.symbol, "BTCUSDT");
    assert_eq!(record.status, SignalStatus::Pending);
    assert_eq!(record.targets.len(), 2);
    assert_eq!(record.targets[0].price, 51500.0);
    assert_eq!(record.components["orderflow"]["buyer_aggression"], 0.8);
    assert!(record.sent);

    // 3. 条件入场转移
    let opened = store
        .mark_opened(
            &id,
            &OpenUpdate {
                opened_at: Utc::now(),
                confirmed_price: Some(50100.0),
                signal_pattern: Some(SignalPattern::Momentum),
                divergence_type: None,
                orderflow_tags: Some(vec![]),
                trigger_component: Some("orderflow".to_string()),
                is_validation_cohort: Some(false),
                orderflow_config: Some("baseline".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(opened);

    // 已激活的行再次 open 被前置条件拒绝
    let reopened = store
        .mark_opened(
            &id,
            &OpenUpdate {
                opened_at: Utc::now(),
                confirmed_price: Some(1.0),
                signal_pattern: None,
                divergence_type: None,
                orderflow_tags: None,
                trigger_component: None,
                is_validation_cohort: None,
                orderflow_config: None,
            },
        )
        .await
        .unwrap();
    assert!(!reopened);

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Active);
    assert_eq!(record.confirmed_price, Some(50100.0));
    assert_eq!(record.signal_pattern, Some(SignalPattern::Momentum));

    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 1);

    // 4. 超额偏移写入
    let now = Utc::now();
    let written = store
        .apply_excursion(
            &id,
            &ExcursionUpdate {
                mfe: Some((2.0, 51000.0, now)),
                mae: Some((-0.5, 49750.0, now)),
            },
        )
        .await
        .unwrap();
    assert!(written);

    // 空载荷不触发任何写入
    let noop = store
        .apply_excursion(&id, &ExcursionUpdate::default())
        .await
        .unwrap();
    assert!(!noop);

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.mfe_pct, Some(2.0));
    assert_eq!(record.mae_pct, Some(-0.5));

    // 5. 条件平仓转移
    let close = CloseUpdate {
        closed_at: Utc::now(),
        exit_price: 51500.0,
        exit_reason: ExitReason::TargetHit,
        outcome: Outcome::Win,
        pnl_pct: 3.0,
        r_multiple: Some(1.5),
        duration_hours: Some(6.5),
        performance_notes: Some("first target".to_string()),
    };
    assert!(store.mark_closed(&id, &close).await.unwrap());

    // 重复平仓被拒绝，先到者的结局字段不被覆盖
    let second = CloseUpdate {
        pnl_pct: -99.0,
        ..close
    };
    assert!(!store.mark_closed(&id, &second).await.unwrap());

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SignalStatus::Closed);
    assert_eq!(record.outcome, Some(Outcome::Win));
    assert_eq!(record.pnl_pct, Some(3.0));
    assert!(store.list_active().await.unwrap().is_empty());

    // 6. 汇总窗口查询
    let cutoff = Utc::now() - chrono::Duration::days(30);
    let closed = store
        .list_closed_since(cutoff, Some(SignalType::Long), None)
        .await
        .unwrap();
    assert_eq!(closed.len(), 1);
    let closed = store
        .list_closed_since(cutoff, Some(SignalType::Short), None)
        .await
        .unwrap();
    assert!(closed.is_empty());
    let closed = store
        .list_closed_since(cutoff, None, Some(SignalPattern::Momentum))
        .await
        .unwrap();
    assert_eq!(closed.len(), 1);
}
