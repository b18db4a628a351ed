//! # 绩效路由控制器
//!
//! 实现 `/api/v1/performance` 路径下的汇总查询接口。

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, PerformanceSummaryResponse};
use shingo_core::common::SignalType;
use shingo_core::signal::entity::{SignalPattern, SummaryFilter};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct SummaryQuery {
    pub signal_type: Option<String>,
    pub pattern: Option<String>,
    pub days: Option<i64>,
}

/// 查询绩效汇总
///
/// 聚合回溯窗口内已平仓信号的胜率、盈亏与偏移统计。
/// 零匹配时返回 `data: null` (无数据哨兵)，而非错误。
#[utoipa::path(
    get,
    path = "/api/v1/performance/summary",
    tag = "绩效 (Performance)",
    params(
        ("signal_type" = Option<String>, Query, description = "方向过滤 (LONG/SHORT)"),
        ("pattern" = Option<String>, Query, description = "形态过滤 (divergence/confirmation/momentum/other)"),
        ("days" = Option<i64>, Query, description = "回溯窗口天数，默认 30")
    ),
    responses(
        (status = 200, description = "汇总获取成功 (零匹配时 data 为 null)", body = ApiResponse<PerformanceSummaryResponse>),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn get_performance_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<ApiResponse<PerformanceSummaryResponse>>, ApiError> {
    let signal_type = query
        .signal_type
        .as_deref()
        .map(str::parse::<SignalType>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let pattern = query
        .pattern
        .as_deref()
        .map(str::parse::<SignalPattern>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = SummaryFilter {
        signal_type,
        pattern,
        days: query.days.unwrap_or(0),
    };

    let summary = state.tracker.performance_summary(&filter).await?;
    Ok(Json(ApiResponse::maybe(
        summary.map(PerformanceSummaryResponse::from),
    )))
}
