use super::entity::{
    DivergenceType, ExitReason, NewSignal, OrderflowTag, Outcome, SignalPattern, SignalRecord,
};
use super::error::StoreError;
use crate::common::SignalType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// open 操作的条件更新载荷。`None` 字段保持行内原值不变 (部分更新)。
#[derive(Debug, Clone)]
pub struct OpenUpdate {
    // 入场确认时间戳
    pub opened_at: DateTime<Utc>,
    // 确认入场价
    pub confirmed_price: Option<f64>,
    // 形态分类
    pub signal_pattern: Option<SignalPattern>,
    // 背离方向
    pub divergence_type: Option<DivergenceType>,
    // 订单流标签 (None = 不写入)
    pub orderflow_tags: Option<Vec<OrderflowTag>>,
    // 触发分量
    pub trigger_component: Option<String>,
    // 验证组标记
    pub is_validation_cohort: Option<bool>,
    // 评分权重配置标签
    pub orderflow_config: Option<String>,
}

/// # Summary
/// 超额偏移的条件更新载荷，只携带确实被突破的一侧。
#[derive(Debug, Clone, Default)]
pub struct ExcursionUpdate {
    // 新的最大有利偏移 (pct, price, at)
    pub mfe: Option<(f64, f64, DateTime<Utc>)>,
    // 新的最大不利偏移 (pct, price, at)
    pub mae: Option<(f64, f64, DateTime<Utc>)>,
}

impl ExcursionUpdate {
    /// 两侧均未突破时无需落库
    pub fn is_empty(&self) -> bool {
        self.mfe.is_none() && self.mae.is_none()
    }
}

/// # Summary
/// close 操作的条件更新载荷，所有字段由追踪器一次性计算完成。
#[derive(Debug, Clone)]
pub struct CloseUpdate {
    pub closed_at: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub outcome: Outcome,
    pub pnl_pct: f64,
    pub r_multiple: Option<f64>,
    pub duration_hours: Option<f64>,
    pub performance_notes: Option<String>,
}

/// # Summary
/// 信号行存储接口，`trading_signals` 表的唯一门户。
///
/// # Invariants
/// - 行创建与原始字段读取只经过本接口；生命周期字段的变更只允许
///   通过下方的条件更新方法执行，保证并发转移不会互相覆盖。
/// - 所有条件更新必须是原子的单行 UPDATE (先读后写不可接受)。
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// # Summary
    /// 幂等插入一行新信号。
    ///
    /// # Logic
    /// 1. 归一化 symbol 并由 (symbol, 方向, 取整评分, 秒级时间戳) 派生确定性 ID。
    /// 2. 执行 `INSERT OR IGNORE`；同秒内的重复创建命中已有主键。
    ///
    /// # Arguments
    /// * `signal`: 创建载荷。
    ///
    /// # Returns
    /// 新行返回 `Some(signal_id)`，重复创建返回 `None` (非错误路径)。
    async fn create(&self, signal: &NewSignal) -> Result<Option<String>, StoreError>;

    /// # Summary
    /// 按 ID 读取单行并反序列化全部载荷字段。
    async fn get(&self, signal_id: &str) -> Result<Option<SignalRecord>, StoreError>;

    /// # Summary
    /// 按创建时间倒序列出最近的信号行。
    ///
    /// # Arguments
    /// * `limit`: 返回数量上限。
    /// * `symbol`: 可选的交易对过滤。
    /// * `signal_type`: 可选的方向过滤。
    async fn list_recent(
        &self,
        limit: u32,
        symbol: Option<&str>,
        signal_type: Option<SignalType>,
    ) -> Result<Vec<SignalRecord>, StoreError>;

    /// # Summary
    /// 列出所有处于 active 状态的信号行，供监控循环逐一处理。
    async fn list_active(&self) -> Result<Vec<SignalRecord>, StoreError>;

    /// # Summary
    /// 条件入场转移: `UPDATE ... WHERE status = 'pending'`。
    ///
    /// # Returns
    /// 行被更新返回 `true`；行不存在或状态不满足前置条件返回 `false`。
    async fn mark_opened(&self, signal_id: &str, update: &OpenUpdate)
    -> Result<bool, StoreError>;

    /// # Summary
    /// 条件超额偏移写入: `UPDATE ... WHERE status = 'active'`，
    /// 只写入载荷中实际携带的一侧。
    ///
    /// # Returns
    /// 行被更新返回 `true`，否则 `false`。
    async fn apply_excursion(
        &self,
        signal_id: &str,
        update: &ExcursionUpdate,
    ) -> Result<bool, StoreError>;

    /// # Summary
    /// 条件平仓转移: `UPDATE ... WHERE status != 'closed'`。
    /// pending 行允许直接平仓 (从未确认入场的信号)；重复平仓被拒绝，
    /// 并发平仓的后到者拿到 `false` 而不是覆盖先到者的结果。
    ///
    /// # Returns
    /// 行被更新返回 `true`，否则 `false`。
    async fn mark_closed(&self, signal_id: &str, update: &CloseUpdate)
    -> Result<bool, StoreError>;

    /// # Summary
    /// 列出回溯窗口内已平仓且有结局的行，作为绩效汇总的输入。
    ///
    /// # Arguments
    /// * `cutoff`: 窗口起点，`closed_at >= cutoff`。
    /// * `signal_type`: 可选的方向过滤。
    /// * `pattern`: 可选的形态过滤。
    async fn list_closed_since(
        &self,
        cutoff: DateTime<Utc>,
        signal_type: Option<SignalType>,
        pattern: Option<SignalPattern>,
    ) -> Result<Vec<SignalRecord>, StoreError>;
}
