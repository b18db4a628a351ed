//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use shingo_core::signal::entity::{PerformanceSummary, SignalRecord, Target};
use shingo_monitor::position::{ActiveSignalSnapshot, MonitoringStats};
use shingo_tracker::tracker::CloseResult;

// ============================================================
//  信号相关 DTO
// ============================================================

/// 目标位 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TargetDto {
    /// 目标位名称
    #[schema(example = "T1")]
    pub name: String,
    /// 触发价格
    #[schema(example = 51500.0)]
    pub price: f64,
    /// 建议减仓比例 (0.0 - 1.0)
    #[schema(example = 0.5)]
    pub size: f64,
}

impl From<&Target> for TargetDto {
    fn from(t: &Target) -> Self {
        Self {
            name: t.name.clone(),
            price: t.price,
            size: t.size,
        }
    }
}

impl From<TargetDto> for Target {
    fn from(t: TargetDto) -> Self {
        Self {
            name: t.name,
            price: t.price,
            size: t.size,
        }
    }
}

/// 信号行 DTO - 对应仪表盘的信号卡片与详情页
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignalResponse {
    /// 信号唯一标识
    #[schema(example = "SIG-BTCUSDT-LONG-85-20260301120000")]
    pub signal_id: String,
    /// 交易对
    #[schema(example = "BTCUSDT")]
    pub symbol: String,
    /// 方向 (LONG/SHORT)
    #[schema(example = "LONG")]
    pub signal_type: String,
    /// 合流评分 (0-100)
    #[schema(example = 85.0)]
    pub confluence_score: f64,
    /// 可靠度评级
    #[schema(example = 0.8)]
    pub reliability: f64,
    /// 建议入场价
    pub entry_price: Option<f64>,
    /// 止损价
    pub stop_loss: Option<f64>,
    /// 创建时间 (ISO 8601)
    #[schema(example = "2026-03-01T12:00:00Z")]
    pub created_at: String,
    /// 生命周期状态 (pending/active/closed)
    #[schema(example = "active")]
    pub status: String,
    /// 确认入场价
    pub confirmed_price: Option<f64>,
    /// 入场确认时间
    pub opened_at: Option<String>,
    /// 平仓时间
    pub closed_at: Option<String>,
    /// 出场价
    pub exit_price: Option<f64>,
    /// 平仓原因
    pub exit_reason: Option<String>,
    /// 结局 (win/loss/stopped_out/expired)
    pub outcome: Option<String>,
    /// 已实现盈亏 (百分比)
    pub pnl_pct: Option<f64>,
    /// R 倍数
    pub r_multiple: Option<f64>,
    /// 持续时长 (小时)
    pub duration_hours: Option<f64>,
    /// 绩效备注
    pub performance_notes: Option<String>,
    /// 最大有利偏移 (百分比)
    pub mfe_pct: Option<f64>,
    /// 最大不利偏移 (百分比)
    pub mae_pct: Option<f64>,
    /// 形态分类
    pub signal_pattern: Option<String>,
    /// 背离方向
    pub divergence_type: Option<String>,
    /// 订单流标签
    pub orderflow_tags: Vec<String>,
    /// 触发分量
    pub trigger_component: Option<String>,
    /// 验证组标记
    pub is_validation_cohort: bool,
    /// 评分权重配置标签
    pub orderflow_config: Option<String>,
    /// 有序目标位列表
    pub targets: Vec<TargetDto>,
}

impl From<&SignalRecord> for SignalResponse {
    fn from(r: &SignalRecord) -> Self {
        Self {
            signal_id: r.signal_id.clone(),
            symbol: r.symbol.clone(),
            signal_type: r.signal_type.to_string(),
            confluence_score: r.confluence_score,
            reliability: r.reliability,
            entry_price: r.entry_price,
            stop_loss: r.stop_loss,
            created_at: r.created_at.to_rfc3339(),
            status: r.status.to_string(),
            confirmed_price: r.confirmed_price,
            opened_at: r.opened_at.map(|t| t.to_rfc3339()),
            closed_at: r.closed_at.map(|t| t.to_rfc3339()),
            exit_price: r.exit_price,
            exit_reason: r.exit_reason.map(|e| e.to_string()),
            outcome: r.outcome.map(|o| o.to_string()),
            pnl_pct: r.pnl_pct,
            r_multiple: r.r_multiple,
            duration_hours: r.duration_hours,
            performance_notes: r.performance_notes.clone(),
            mfe_pct: r.mfe_pct,
            mae_pct: r.mae_pct,
            signal_pattern: r.signal_pattern.map(|p| p.to_string()),
            divergence_type: r.divergence_type.map(|d| d.to_string()),
            orderflow_tags: r.orderflow_tags.iter().map(ToString::to_string).collect(),
            trigger_component: r.trigger_component.clone(),
            is_validation_cohort: r.is_validation_cohort,
            orderflow_config: r.orderflow_config.clone(),
            targets: r.targets.iter().map(TargetDto::from).collect(),
        }
    }
}

/// 创建信号请求体 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSignalRequest {
    /// 交易对 (任意写法，存储前归一化)
    #[schema(example = "BTC/USDT")]
    pub symbol: String,
    /// 方向 (LONG/SHORT)
    #[schema(example = "LONG")]
    pub signal_type: String,
    /// 合流评分 (0-100)
    #[schema(example = 85.0)]
    pub confluence_score: f64,
    /// 可靠度评级
    #[schema(example = 0.8)]
    pub reliability: f64,
    /// 建议入场价
    pub entry_price: Option<f64>,
    /// 止损价
    pub stop_loss: Option<f64>,
    /// 有序目标位列表 (首位是自动止盈触发位)
    #[serde(default)]
    pub targets: Vec<TargetDto>,
    /// 上游分量评分载荷 (不透明)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub components: serde_json::Value,
    /// 交易参数载荷 (不透明)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub trade_params: serde_json::Value,
    /// 报告产物路径 (JSON)
    pub report_json_path: Option<String>,
    /// 报告产物路径 (PDF)
    pub report_pdf_path: Option<String>,
    /// 是否已向外推送
    #[serde(default)]
    pub sent: bool,
}

/// 创建信号响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSignalResponse {
    /// 新行的信号 ID (重复创建时为 null)
    pub signal_id: Option<String>,
    /// 是否命中同秒幂等去重
    pub duplicate: bool,
}

/// 确认入场请求体 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenSignalRequest {
    /// 确认入场价
    pub confirmed_price: Option<f64>,
    /// 上游分量评分载荷；提供时服务端执行形态分类并随行写入
    #[schema(value_type = Object)]
    pub components: Option<serde_json::Value>,
    /// 验证组标记
    pub is_validation_cohort: Option<bool>,
    /// 评分权重配置标签
    pub orderflow_config: Option<String>,
}

/// 平仓请求体 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CloseSignalRequest {
    /// 成交出场价
    #[schema(example = 51500.0)]
    pub exit_price: f64,
    /// 平仓原因 (缺省为 manual)
    #[schema(example = "manual")]
    pub exit_reason: Option<String>,
    /// 绩效备注
    pub notes: Option<String>,
}

/// 平仓结局 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CloseSignalResponse {
    /// 结局 (win/loss/stopped_out/expired)
    #[schema(example = "win")]
    pub outcome: String,
    /// 已实现盈亏 (百分比)
    #[schema(example = 3.0)]
    pub pnl_pct: f64,
    /// R 倍数
    pub r_multiple: Option<f64>,
    /// 持续时长 (小时)
    pub duration_hours: Option<f64>,
}

impl From<CloseResult> for CloseSignalResponse {
    fn from(r: CloseResult) -> Self {
        Self {
            outcome: r.outcome.to_string(),
            pnl_pct: r.pnl_pct,
            r_multiple: r.r_multiple,
            duration_hours: r.duration_hours,
        }
    }
}

// ============================================================
//  绩效相关 DTO
// ============================================================

/// 绩效汇总 DTO - 对应仪表盘顶部 Key Metrics 区域
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PerformanceSummaryResponse {
    pub total_signals: u32,
    pub wins: u32,
    pub losses: u32,
    pub stopped_out: u32,
    /// 胜率 (百分比)
    #[schema(example = 62.5)]
    pub win_rate_pct: f64,
    pub avg_pnl_pct: f64,
    pub max_pnl_pct: f64,
    pub min_pnl_pct: f64,
    pub avg_win_pct: Option<f64>,
    pub avg_loss_pct: Option<f64>,
    /// 盈亏比 (无亏损单时为 null)
    pub profit_factor: Option<f64>,
    pub avg_r_multiple: Option<f64>,
    pub avg_duration_hours: Option<f64>,
    pub avg_mfe_pct: Option<f64>,
    pub avg_mae_pct: Option<f64>,
}

impl From<PerformanceSummary> for PerformanceSummaryResponse {
    fn from(s: PerformanceSummary) -> Self {
        Self {
            total_signals: s.total_signals,
            wins: s.wins,
            losses: s.losses,
            stopped_out: s.stopped_out,
            win_rate_pct: s.win_rate_pct,
            avg_pnl_pct: s.avg_pnl_pct,
            max_pnl_pct: s.max_pnl_pct,
            min_pnl_pct: s.min_pnl_pct,
            avg_win_pct: s.avg_win_pct,
            avg_loss_pct: s.avg_loss_pct,
            profit_factor: s.profit_factor,
            avg_r_multiple: s.avg_r_multiple,
            avg_duration_hours: s.avg_duration_hours,
            avg_mfe_pct: s.avg_mfe_pct,
            avg_mae_pct: s.avg_mae_pct,
        }
    }
}

// ============================================================
//  监控相关 DTO
// ============================================================

/// 活跃信号追踪快照 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActiveSignalDto {
    pub signal_id: String,
    pub symbol: String,
    /// 方向 (LONG/SHORT)
    pub signal_type: String,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    /// 自动止盈触发位 (targets[0])
    pub first_target: Option<f64>,
    pub mfe_pct: Option<f64>,
    pub mae_pct: Option<f64>,
    pub opened_at: Option<String>,
}

impl From<&ActiveSignalSnapshot> for ActiveSignalDto {
    fn from(s: &ActiveSignalSnapshot) -> Self {
        Self {
            signal_id: s.signal_id.clone(),
            symbol: s.symbol.clone(),
            signal_type: s.signal_type.to_string(),
            entry_price: s.entry_price,
            stop_loss: s.stop_loss,
            first_target: s.first_target,
            mfe_pct: s.mfe_pct,
            mae_pct: s.mae_pct,
            opened_at: s.opened_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// 监控器状态 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MonitorStatusResponse {
    /// 轮询任务是否在运行
    pub running: bool,
    /// 轮询周期 (秒)
    pub poll_interval_secs: u64,
    /// 自动平仓是否启用
    pub auto_close: bool,
    /// 已完成的轮询次数
    pub cycles_completed: u64,
    /// 最近一次轮询完成时间
    pub last_cycle_at: Option<String>,
    /// 当前追踪中的活跃信号
    pub active_signals: Vec<ActiveSignalDto>,
}

impl From<MonitoringStats> for MonitorStatusResponse {
    fn from(s: MonitoringStats) -> Self {
        Self {
            running: s.running,
            poll_interval_secs: s.poll_interval_secs,
            auto_close: s.auto_close,
            cycles_completed: s.cycles_completed,
            last_cycle_at: s.last_cycle_at.map(|t| t.to_rfc3339()),
            active_signals: s.active_signals.iter().map(ActiveSignalDto::from).collect(),
        }
    }
}

// ============================================================
//  通用响应 DTO
// ============================================================

/// 统一 API 响应包装器
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    /// 是否成功
    pub success: bool,
    /// 数据载荷 (成功时)
    pub data: Option<T>,
    /// 错误信息 (失败时)
    pub error: Option<String>,
}

impl<T: Serialize + ToSchema> ApiResponse<T> {
    /// 构建成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// 构建成功但可能无数据的响应 (例如零匹配的汇总查询)
    pub fn maybe(data: Option<T>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// 构建失败响应 (不含泛型载荷)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 错误描述信息
    pub error: String,
}

impl ApiErrorResponse {
    /// 从错误信息构建
    pub fn from_msg(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}
