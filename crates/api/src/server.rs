//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 的 DI 容器持有并调用。
//! `build_router` 与 `start_server` 分离，集成测试可自行绑定随机端口。

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use shingo_core::signal::port::SignalStore;
use shingo_monitor::position::PositionMonitor;
use shingo_tracker::tracker::SignalTracker;

use crate::routes::{monitor, performance, signals};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有字段在服务启动前由 DI 容器注入，生命周期与进程等同。
/// - `store` 仅用于创建与读取；生命周期转移一律经由 `tracker`。
#[derive(Clone)]
pub struct AppState {
    /// 信号行存储 (创建与读取)
    pub store: Arc<dyn SignalStore>,
    /// 生命周期追踪器 (open / close / 汇总)
    pub tracker: Arc<SignalTracker>,
    /// 仓位监控器 (状态快照与人工平仓直通)
    pub monitor: Arc<PositionMonitor>,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shingo 信号追踪 API",
        version = "0.1.0",
        description = "合流信号绩效追踪引擎的 RESTful API 网关。提供信号录入、生命周期管理、绩效汇总与监控状态查询。",
        contact(name = "Shingo Team"),
        license(name = "MIT")
    ),
    tags(
        (name = "信号 (Signals)", description = "信号录入、查询与生命周期转移"),
        (name = "绩效 (Performance)", description = "已平仓信号的聚合绩效统计"),
        (name = "监控 (Monitor)", description = "仓位监控循环的运行状态")
    )
)]
pub struct ApiDoc;

// ============================================================
//  服务构建与启动
// ============================================================

/// 构建完整的 axum 应用 (路由树 + Swagger UI + CORS)。
///
/// # Arguments
/// * `state` - 由外部 DI 容器注入的共享状态
pub fn build_router(state: AppState) -> Router {
    // 1. 业务路由与自动收集的 OpenAPI Doc
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(signals::create_signal))
        .routes(routes!(signals::list_signals))
        .routes(routes!(signals::list_active_signals))
        .routes(routes!(signals::get_signal))
        .routes(routes!(signals::open_signal))
        .routes(routes!(signals::close_signal))
        .routes(routes!(performance::get_performance_summary))
        .routes(routes!(monitor::get_monitor_status))
        .with_state(state)
        .split_for_parts();

    // 2. 配置 CORS (内部仪表盘服务，允许所有来源)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 3. 合并 Swagger UI 路由并应用中间件
    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// 绑定 TCP 端口并启动 HTTP 监听。
///
/// # Arguments
/// * `state` - 共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"0.0.0.0:8080"`
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);

    tracing::info!("🚀 Shingo API Server listening on {}", bind_addr);
    tracing::info!("📖 Swagger UI: http://{}/swagger-ui/", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
