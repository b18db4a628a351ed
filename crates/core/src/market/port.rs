use super::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 最新报价提供者接口，监控循环据此获取活跃信号标的的现价。
///
/// # Invariants
/// - 实现必须是异步且线程安全的 (`Send + Sync`)。
/// - 瞬时失败 (网络抖动、限流) 以 `Err` 表达，调用方按"本轮跳过该标的"处理，
///   绝不允许实现内部 panic 中断轮询。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 获取指定交易对的最新成交价。
    ///
    /// # Arguments
    /// * `symbol`: 归一化后的交易对代码 (如 `BTCUSDT`)。
    ///
    /// # Returns
    /// 成功返回现价，报价缺失或网络失败返回 `MarketError`。
    async fn get_current_price(&self, symbol: &str) -> Result<f64, MarketError>;
}
