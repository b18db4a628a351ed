use std::path::PathBuf;
use std::sync::Arc;

use shingo_api::server::AppState;
use shingo_core::common::time::RealTimeProvider;
use shingo_core::config::AppConfig;
use shingo_feed::binance::BinanceProvider;
use shingo_monitor::position::PositionMonitor;
use shingo_store::signal::SqliteSignalStore;
use shingo_tracker::tracker::SignalTracker;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// # Summary
/// 加载分层配置：内置默认值 <- 可选的 shingo.toml <- SHINGO_* 环境变量。
/// 任何一层解析失败都退化到默认配置并告警，启动流程不因配置中断。
fn load_config() -> AppConfig {
    let defaults = AppConfig::default();

    let loaded = config::Config::builder()
        .add_source(config::Config::try_from(&defaults).unwrap_or_default())
        .add_source(config::File::with_name("shingo").required(false))
        .add_source(
            config::Environment::with_prefix("SHINGO")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize::<AppConfig>());

    match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed, falling back to defaults: {}", e);
            defaults
        }
    }
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 逐层注入。
///
/// # Logic
/// 1. 初始化全局日志。
/// 2. 加载分层配置并设置存储根目录。
/// 3. 实例化基础设施层 (Store、Feed)。
/// 4. 构造领域服务层 (Tracker、Monitor) 并启动监控循环。
/// 5. 启动 API 服务，挂起等待外部信号退出。
/// 6. 收到退出信号后优雅停止监控循环。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("Shingo signal tracking engine starting...");

    // 2. 加载配置
    let app_config = load_config();
    shingo_store::config::set_root_dir(PathBuf::from(&app_config.database.data_dir));

    // 3. 实例化基础设施层
    let store = Arc::new(SqliteSignalStore::new().await?);
    let provider = Arc::new(BinanceProvider::new()?);

    // 4. 实例化领域服务层
    let clock = Arc::new(RealTimeProvider);
    let tracker = SignalTracker::new(store.clone(), clock);
    let monitor = PositionMonitor::new(
        tracker.clone(),
        store.clone(),
        provider,
        app_config.monitor.clone(),
    );
    monitor.start().await;

    // 5. 启动 API 服务并等待退出信号
    let state = AppState {
        store,
        tracker,
        monitor: monitor.clone(),
    };
    let bind_addr = format!("{}:{}", app_config.server.host, app_config.server.port);

    tokio::select! {
        result = shingo_api::server::start_server(state, &bind_addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting...");
        }
    }

    // 6. 优雅停止监控循环 (在途周期执行完毕后退出)
    monitor.stop().await;

    Ok(())
}
