use crate::common::SignalType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// # Summary
/// 信号的生命周期状态。
///
/// # Invariants
/// - 状态只允许单向流转 pending -> active -> closed，closed 为终态。
/// - 任何已关闭的行不得被重新打开或再次关闭。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// 已落库，尚未确认入场
    Pending,
    /// 入场确认，处于持续追踪中
    Active,
    /// 已平仓 (终态)
    Closed,
}

impl FromStr for SignalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SignalStatus::Pending),
            "active" => Ok(SignalStatus::Active),
            "closed" => Ok(SignalStatus::Closed),
            _ => Err(format!("Unknown SignalStatus: {}", s)),
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "pending"),
            SignalStatus::Active => write!(f, "active"),
            SignalStatus::Closed => write!(f, "closed"),
        }
    }
}

/// # Summary
/// 平仓原因代码，由平仓调用方给出。
///
/// # Invariants
/// - `StopLoss` 无条件推导出 `Outcome::StoppedOut`，与实际盈亏符号无关。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    // 止损触发
    StopLoss,
    // 第一目标位触发
    TargetHit,
    // 按时间退出
    TimeExit,
    // 信号过期
    Expired,
    // 人工平仓
    Manual,
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stop_loss" => Ok(ExitReason::StopLoss),
            "target_hit" => Ok(ExitReason::TargetHit),
            "time_exit" => Ok(ExitReason::TimeExit),
            "expired" => Ok(ExitReason::Expired),
            "manual" => Ok(ExitReason::Manual),
            _ => Err(format!("Unknown ExitReason: {}", s)),
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TargetHit => write!(f, "target_hit"),
            ExitReason::TimeExit => write!(f, "time_exit"),
            ExitReason::Expired => write!(f, "expired"),
            ExitReason::Manual => write!(f, "manual"),
        }
    }
}

/// # Summary
/// 平仓结局分类，仅在 close 时刻由 `exit_reason` 与 `pnl_pct` 推导一次。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    StoppedOut,
    Expired,
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "win" => Ok(Outcome::Win),
            "loss" => Ok(Outcome::Loss),
            "stopped_out" => Ok(Outcome::StoppedOut),
            "expired" => Ok(Outcome::Expired),
            _ => Err(format!("Unknown Outcome: {}", s)),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
            Outcome::StoppedOut => write!(f, "stopped_out"),
            Outcome::Expired => write!(f, "expired"),
        }
    }
}

/// # Summary
/// 信号形态分类结果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalPattern {
    // 订单流与技术面背离
    Divergence,
    // 各分量一致确认
    Confirmation,
    // 全分量同向强势
    Momentum,
    // 无法归类
    Other,
}

impl FromStr for SignalPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "divergence" => Ok(SignalPattern::Divergence),
            "confirmation" => Ok(SignalPattern::Confirmation),
            "momentum" => Ok(SignalPattern::Momentum),
            "other" => Ok(SignalPattern::Other),
            _ => Err(format!("Unknown SignalPattern: {}", s)),
        }
    }
}

impl std::fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalPattern::Divergence => write!(f, "divergence"),
            SignalPattern::Confirmation => write!(f, "confirmation"),
            SignalPattern::Momentum => write!(f, "momentum"),
            SignalPattern::Other => write!(f, "other"),
        }
    }
}

/// # Summary
/// 背离方向，仅在 `SignalPattern::Divergence` 时有意义。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceType {
    // 订单流吸筹而技术结构尚弱 (做多的逆向解读)
    BullishDivergence,
    // 订单流派发而技术结构尚强 (做空的逆向解读)
    BearishDivergence,
}

impl FromStr for DivergenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bullish_divergence" => Ok(DivergenceType::BullishDivergence),
            "bearish_divergence" => Ok(DivergenceType::BearishDivergence),
            _ => Err(format!("Unknown DivergenceType: {}", s)),
        }
    }
}

impl std::fmt::Display for DivergenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivergenceType::BullishDivergence => write!(f, "bullish_divergence"),
            DivergenceType::BearishDivergence => write!(f, "bearish_divergence"),
        }
    }
}

/// # Summary
/// 订单流特征标签，独立于形态分类累积，单个信号可携带多个。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderflowTag {
    HighBuyerAggression,
    HighSellerAggression,
    AbsorptionDetected,
    LargeOrders,
    IcebergDetected,
}

impl FromStr for OrderflowTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high_buyer_aggression" => Ok(OrderflowTag::HighBuyerAggression),
            "high_seller_aggression" => Ok(OrderflowTag::HighSellerAggression),
            "absorption_detected" => Ok(OrderflowTag::AbsorptionDetected),
            "large_orders" => Ok(OrderflowTag::LargeOrders),
            "iceberg_detected" => Ok(OrderflowTag::IcebergDetected),
            _ => Err(format!("Unknown OrderflowTag: {}", s)),
        }
    }
}

impl std::fmt::Display for OrderflowTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderflowTag::HighBuyerAggression => write!(f, "high_buyer_aggression"),
            OrderflowTag::HighSellerAggression => write!(f, "high_seller_aggression"),
            OrderflowTag::AbsorptionDetected => write!(f, "absorption_detected"),
            OrderflowTag::LargeOrders => write!(f, "large_orders"),
            OrderflowTag::IcebergDetected => write!(f, "iceberg_detected"),
        }
    }
}

/// # Summary
/// 有序目标位条目。
///
/// # Invariants
/// - 列表中第一个条目 (`targets[0]`) 是自动平仓的唯一止盈触发位，
///   后续条目仅作为展示信息，这是既定策略而非实现细节。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    // 目标位名称 (例如: T1, T2)
    pub name: String,
    // 触发价格
    pub price: f64,
    // 建议减仓比例 (0.0 - 1.0)
    pub size: f64,
}

fn default_component_score() -> f64 {
    50.0
}

/// # Summary
/// 单个上游分析分量的子评分记录。
///
/// # Invariants
/// - 所有字段缺省时必须能安全落到默认值，解码永不失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    // 分量评分 (0-100)，缺失时默认 50
    #[serde(default = "default_component_score")]
    pub score: f64,
    // 买方侵略性 (0.0 - 1.0)
    #[serde(default)]
    pub buyer_aggression: Option<f64>,
    // 卖方侵略性 (0.0 - 1.0)
    #[serde(default)]
    pub seller_aggression: Option<f64>,
    // 是否检测到吸收
    #[serde(default)]
    pub absorption_detected: bool,
    // 是否存在大单
    #[serde(default)]
    pub large_orders: bool,
    // 是否检测到冰山单
    #[serde(default)]
    pub iceberg_detected: bool,
}

impl Default for ComponentScore {
    fn default() -> Self {
        Self {
            score: default_component_score(),
            buyer_aggression: None,
            seller_aggression: None,
            absorption_detected: false,
            large_orders: false,
            iceberg_detected: false,
        }
    }
}

/// # Summary
/// 将上游产出的不透明分量载荷宽松解码为评分映射。
/// 单个条目解码失败只记录日志并退化为默认值，整体永不报错。
///
/// # Arguments
/// * `components`: 上游 JSON 载荷 (`{component_name: {score, ...}}`)。
///
/// # Returns
/// 按分量名排序的评分映射 (BTreeMap 保证遍历顺序确定)。
pub fn parse_components(components: &serde_json::Value) -> BTreeMap<String, ComponentScore> {
    let mut out = BTreeMap::new();
    let Some(map) = components.as_object() else {
        if !components.is_null() {
            tracing::warn!("Component payload is not an object, using empty map");
        }
        return out;
    };

    for (name, value) in map {
        let score = match serde_json::from_value::<ComponentScore>(value.clone()) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Malformed component '{}': {}, using defaults", name, e);
                ComponentScore::default()
            }
        };
        out.insert(name.clone(), score);
    }
    out
}

/// # Summary
/// 形态分类器的输出结果，在 open 时刻一次性写入信号行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternResult {
    // 形态分类
    pub pattern: SignalPattern,
    // 背离方向 (仅 Divergence 形态)
    pub divergence_type: Option<DivergenceType>,
    // 订单流特征标签集合
    pub orderflow_tags: Vec<OrderflowTag>,
    // 评分最高的触发分量名
    pub trigger_component: Option<String>,
}

/// # Summary
/// 信号创建载荷，由上游信号生成方提交给存储层。
///
/// # Invariants
/// - `components` / `trade_params` 对本子系统不透明，仅序列化存储。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignal {
    // 交易对 (存储前归一化)
    pub symbol: String,
    // 持仓方向
    pub signal_type: SignalType,
    // 上游合流评分 (0-100)
    pub confluence_score: f64,
    // 信号可靠度评级
    pub reliability: f64,
    // 建议入场价
    pub entry_price: Option<f64>,
    // 止损价
    pub stop_loss: Option<f64>,
    // 有序目标位列表
    pub targets: Vec<Target>,
    // 上游分量评分载荷 (不透明)
    pub components: serde_json::Value,
    // 交易参数载荷 (不透明)
    pub trade_params: serde_json::Value,
    // 报告产物路径 (JSON)
    pub report_json_path: Option<String>,
    // 报告产物路径 (PDF)
    pub report_pdf_path: Option<String>,
    // 是否已向外推送
    pub sent: bool,
}

/// # Summary
/// 一行信号记录，数据库中的持久化形态即系统的权威状态。
///
/// # Invariants
/// - 静态属性在创建后不可变；生命周期/超额偏移/分类字段只允许追踪器写入。
/// - `mfe_pct` 单调不减，`mae_pct` 单调不增。
/// - 盈亏符号约定: Long 在 exit > entry 时为正，Short 在 exit < entry 时为正。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    // --- 身份 ---
    pub signal_id: String,

    // --- 静态属性 (创建时写入) ---
    pub symbol: String,
    pub signal_type: SignalType,
    pub confluence_score: f64,
    pub reliability: f64,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub created_at: DateTime<Utc>,

    // --- 生命周期属性 (仅追踪器写入) ---
    pub status: SignalStatus,
    pub confirmed_price: Option<f64>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub outcome: Option<Outcome>,
    pub pnl_pct: Option<f64>,
    pub r_multiple: Option<f64>,
    pub duration_hours: Option<f64>,
    pub performance_notes: Option<String>,

    // --- 超额偏移属性 (单调改善) ---
    pub mfe_pct: Option<f64>,
    pub mfe_price: Option<f64>,
    pub mfe_at: Option<DateTime<Utc>>,
    pub mae_pct: Option<f64>,
    pub mae_price: Option<f64>,
    pub mae_at: Option<DateTime<Utc>>,

    // --- 分类属性 (open 时刻写入一次) ---
    pub signal_pattern: Option<SignalPattern>,
    pub divergence_type: Option<DivergenceType>,
    pub orderflow_tags: Vec<OrderflowTag>,
    pub trigger_component: Option<String>,
    pub is_validation_cohort: bool,
    pub orderflow_config: Option<String>,

    // --- 辅助载荷 ---
    pub targets: Vec<Target>,
    pub components: serde_json::Value,
    pub trade_params: serde_json::Value,
    pub report_json_path: Option<String>,
    pub report_pdf_path: Option<String>,
    pub sent: bool,
}

/// # Summary
/// 绩效汇总查询的过滤条件。
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    // 仅统计指定方向
    pub signal_type: Option<SignalType>,
    // 仅统计指定形态
    pub pattern: Option<SignalPattern>,
    // 回溯窗口 (天)，0 或负数视为 30
    pub days: i64,
}

/// # Summary
/// 已平仓信号的聚合绩效统计。
///
/// # Invariants
/// - 仅聚合 outcome 属于 {win, loss, stopped_out} 的已平仓行。
/// - 零匹配时整个结构不产出 (以 None 表达"无数据")。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_signals: u32,
    pub wins: u32,
    pub losses: u32,
    pub stopped_out: u32,
    // 胜率 (百分比)
    pub win_rate_pct: f64,
    pub avg_pnl_pct: f64,
    pub max_pnl_pct: f64,
    pub min_pnl_pct: f64,
    // 盈利单均值 (无盈利单时为 None)
    pub avg_win_pct: Option<f64>,
    // 亏损单均值 (无亏损单时为 None)
    pub avg_loss_pct: Option<f64>,
    // 盈亏比 |avg_win * wins / (avg_loss * losses)|，无亏损单时为 None
    pub profit_factor: Option<f64>,
    pub avg_r_multiple: Option<f64>,
    pub avg_duration_hours: Option<f64>,
    pub avg_mfe_pct: Option<f64>,
    pub avg_mae_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_components_defaults_on_malformed() {
        let payload = json!({
            "technical": {"score": 72.0},
            "orderflow": {"score": "not-a-number"},
            "volume": 17,
        });
        let parsed = parse_components(&payload);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["technical"].score, 72.0);
        // 畸形条目退化为默认评分
        assert_eq!(parsed["orderflow"].score, 50.0);
        assert_eq!(parsed["volume"].score, 50.0);
    }

    #[test]
    fn test_parse_components_non_object() {
        assert!(parse_components(&json!(null)).is_empty());
        assert!(parse_components(&json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn test_wire_roundtrip_enums() {
        for reason in [
            ExitReason::StopLoss,
            ExitReason::TargetHit,
            ExitReason::TimeExit,
            ExitReason::Expired,
            ExitReason::Manual,
        ] {
            assert_eq!(reason.to_string().parse::<ExitReason>().unwrap(), reason);
        }
        assert_eq!(
            "bullish_divergence".parse::<DivergenceType>().unwrap(),
            DivergenceType::BullishDivergence
        );
        assert_eq!(SignalStatus::Active.to_string(), "active");
    }
}
