//! # 监控路由控制器
//!
//! 暴露仓位监控循环的运行状态快照。

use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, MonitorStatusResponse};

/// 查询监控器状态
///
/// 返回轮询任务的运行标志、周期计数与当前追踪中的活跃信号快照。
#[utoipa::path(
    get,
    path = "/api/v1/monitor/status",
    tag = "监控 (Monitor)",
    responses(
        (status = 200, description = "状态获取成功", body = ApiResponse<MonitorStatusResponse>)
    )
)]
pub async fn get_monitor_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MonitorStatusResponse>>, ApiError> {
    let stats = state.monitor.monitoring_stats().await?;
    Ok(Json(ApiResponse::ok(MonitorStatusResponse::from(stats))))
}
