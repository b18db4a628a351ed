//! # 信号路由控制器
//!
//! 实现 `/api/v1/signals` 路径下的 REST 接口。
//! 每个接口 1:1 映射到存储或追踪器的一个公开操作。

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    ApiResponse, CloseSignalRequest, CloseSignalResponse, CreateSignalRequest,
    CreateSignalResponse, OpenSignalRequest, SignalResponse,
};
use shingo_core::common::SignalType;
use shingo_core::signal::entity::{ExitReason, NewSignal};
use shingo_tracker::tracker::OpenRequest;

// ============================================================
//  Handler 实现
// ============================================================

/// 录入一条新信号
///
/// 接收上游信号生成方的创建载荷，归一化后幂等落库。
/// 同一秒内相同 (symbol, 方向, 评分) 的重复提交命中去重，
/// 返回 `duplicate: true` 而非错误。
#[utoipa::path(
    post,
    path = "/api/v1/signals",
    tag = "信号 (Signals)",
    request_body = CreateSignalRequest,
    responses(
        (status = 200, description = "创建完成 (可能命中去重)", body = ApiResponse<CreateSignalResponse>),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn create_signal(
    State(state): State<AppState>,
    Json(req): Json<CreateSignalRequest>,
) -> Result<Json<ApiResponse<CreateSignalResponse>>, ApiError> {
    let signal_type: SignalType = req.signal_type.parse().map_err(ApiError::BadRequest)?;

    let new_signal = NewSignal {
        symbol: req.symbol,
        signal_type,
        confluence_score: req.confluence_score,
        reliability: req.reliability,
        entry_price: req.entry_price,
        stop_loss: req.stop_loss,
        targets: req.targets.into_iter().map(Into::into).collect(),
        components: req.components,
        trade_params: req.trade_params,
        report_json_path: req.report_json_path,
        report_pdf_path: req.report_pdf_path,
        sent: req.sent,
    };

    let signal_id = state.store.create(&new_signal).await?;
    let duplicate = signal_id.is_none();

    Ok(Json(ApiResponse::ok(CreateSignalResponse {
        signal_id,
        duplicate,
    })))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ListSignalsQuery {
    pub limit: Option<u32>,
    pub symbol: Option<String>,
    pub signal_type: Option<String>,
}

/// 列出最近的信号
///
/// 按创建时间倒序返回，支持交易对与方向过滤。
/// 对应仪表盘的信号流页面。
#[utoipa::path(
    get,
    path = "/api/v1/signals",
    tag = "信号 (Signals)",
    params(
        ("limit" = Option<u32>, Query, description = "返回数量限制，默认 50"),
        ("symbol" = Option<String>, Query, description = "交易对过滤"),
        ("signal_type" = Option<String>, Query, description = "方向过滤 (LONG/SHORT)")
    ),
    responses(
        (status = 200, description = "信号列表获取成功", body = ApiResponse<Vec<SignalResponse>>),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<ListSignalsQuery>,
) -> Result<Json<ApiResponse<Vec<SignalResponse>>>, ApiError> {
    let signal_type = query
        .signal_type
        .as_deref()
        .map(str::parse::<SignalType>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let records = state
        .store
        .list_recent(query.limit.unwrap_or(50), query.symbol.as_deref(), signal_type)
        .await?;

    let responses: Vec<SignalResponse> = records.iter().map(SignalResponse::from).collect();
    Ok(Json(ApiResponse::ok(responses)))
}

/// 列出所有活跃信号
///
/// 返回监控循环当前追踪中的全部 active 行。
#[utoipa::path(
    get,
    path = "/api/v1/signals/active",
    tag = "信号 (Signals)",
    responses(
        (status = 200, description = "活跃信号列表获取成功", body = ApiResponse<Vec<SignalResponse>>)
    )
)]
pub async fn list_active_signals(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SignalResponse>>>, ApiError> {
    let records = state.store.list_active().await?;
    let responses: Vec<SignalResponse> = records.iter().map(SignalResponse::from).collect();
    Ok(Json(ApiResponse::ok(responses)))
}

/// 获取指定信号的详情
#[utoipa::path(
    get,
    path = "/api/v1/signals/{signal_id}",
    tag = "信号 (Signals)",
    params(
        ("signal_id" = String, Path, description = "信号唯一标识")
    ),
    responses(
        (status = 200, description = "信号详情获取成功", body = ApiResponse<SignalResponse>),
        (status = 404, description = "信号不存在")
    )
)]
pub async fn get_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<String>,
) -> Result<Json<ApiResponse<SignalResponse>>, ApiError> {
    let record = state
        .store
        .get(&signal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Signal not found: {}", signal_id)))?;

    Ok(Json(ApiResponse::ok(SignalResponse::from(&record))))
}

/// 确认信号入场
///
/// 将 pending 信号转移为 active。请求携带分量载荷时，
/// 服务端先执行形态分类再随行写入分类元数据。
/// 已激活或已平仓的信号返回 409。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{signal_id}/open",
    tag = "信号 (Signals)",
    params(
        ("signal_id" = String, Path, description = "信号唯一标识")
    ),
    request_body = OpenSignalRequest,
    responses(
        (status = 200, description = "入场确认成功，返回刷新后的信号", body = ApiResponse<SignalResponse>),
        (status = 404, description = "信号不存在"),
        (status = 409, description = "状态不允许该转移")
    )
)]
pub async fn open_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<String>,
    Json(req): Json<OpenSignalRequest>,
) -> Result<Json<ApiResponse<SignalResponse>>, ApiError> {
    let record = state
        .store
        .get(&signal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Signal not found: {}", signal_id)))?;

    let mut open_req = OpenRequest {
        confirmed_price: req.confirmed_price,
        is_validation_cohort: req.is_validation_cohort,
        orderflow_config: req.orderflow_config,
        ..OpenRequest::default()
    };

    // 分量载荷在场时执行服务端形态分类
    if let Some(components) = &req.components {
        let result = state
            .tracker
            .classify_pattern(components, record.signal_type);
        open_req = open_req.with_pattern(result);
    }

    state.tracker.open(&signal_id, open_req).await?;

    let refreshed = state
        .store
        .get(&signal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Signal not found: {}", signal_id)))?;
    Ok(Json(ApiResponse::ok(SignalResponse::from(&refreshed))))
}

/// 平仓指定信号
///
/// 缺省按人工平仓处理 (监控器的直通通道)；显式给出
/// 平仓原因时按该原因推导结局。重复平仓返回 409。
#[utoipa::path(
    post,
    path = "/api/v1/signals/{signal_id}/close",
    tag = "信号 (Signals)",
    params(
        ("signal_id" = String, Path, description = "信号唯一标识")
    ),
    request_body = CloseSignalRequest,
    responses(
        (status = 200, description = "平仓成功，返回计算出的结局", body = ApiResponse<CloseSignalResponse>),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "信号不存在"),
        (status = 409, description = "信号已平仓")
    )
)]
pub async fn close_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<String>,
    Json(req): Json<CloseSignalRequest>,
) -> Result<Json<ApiResponse<CloseSignalResponse>>, ApiError> {
    let result = match req.exit_reason.as_deref() {
        None => {
            state
                .monitor
                .close_signal_manually(&signal_id, req.exit_price, req.notes)
                .await?
        }
        Some(raw) => {
            let reason: ExitReason = raw.parse().map_err(ApiError::BadRequest)?;
            state
                .tracker
                .close(&signal_id, req.exit_price, reason, req.notes)
                .await?
        }
    };

    Ok(Json(ApiResponse::ok(CloseSignalResponse::from(result))))
}
