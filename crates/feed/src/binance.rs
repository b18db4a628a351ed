use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shingo_core::common::normalize_symbol;
use shingo_core::market::error::MarketError;
use shingo_core::market::port::MarketDataProvider;
use std::time::Duration;
use tracing::debug;

/// Binance 公共行情接口基址
const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// # Summary
/// Binance 最新价提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，固定 10 秒超时。
/// - 任何失败都以 `MarketError` 表达，调用方按"本轮跳过"处理。
#[derive(Clone)]
pub struct BinanceProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    /// 接口基址 (测试中可指向本地桩服务)
    base_url: String,
}

impl BinanceProvider {
    /// # Summary
    /// 创建一个新的 BinanceProvider 实例。
    ///
    /// # Logic
    /// 1. 配置 10 秒超时，约束监控循环单次外呼的最长阻塞时间。
    /// 2. 初始化 reqwest 客户端。
    ///
    /// # Returns
    /// 成功返回初始化后的 BinanceProvider。
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// 使用自定义基址创建实例 (测试桩接入点)。
    pub fn with_base_url(base_url: &str) -> Result<Self, MarketError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MarketError::Unknown(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// # Summary
/// Binance `/api/v3/ticker/price` 响应结构。
///
/// # Invariants
/// - `price` 以字符串形式下发，需要显式解析为数值。
#[derive(Deserialize, Debug)]
struct TickerResponse {
    price: String,
}

impl TickerResponse {
    fn parse_price(&self) -> Result<f64, MarketError> {
        self.price
            .parse::<f64>()
            .map_err(|e| MarketError::Parse(format!("price '{}': {}", self.price, e)))
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    /// # Summary
    /// 获取指定交易对的最新成交价。
    ///
    /// # Logic
    /// 1. 归一化 symbol 为 Binance 形式 (无分隔符大写)。
    /// 2. 请求 `/api/v3/ticker/price` 接口。
    /// 3. 4xx 响应视为报价缺失 (`Unavailable`)，其余非 2xx 视为网络错误。
    /// 4. 解析字符串形式的价格字段。
    ///
    /// # Arguments
    /// * `symbol`: 交易对代码。
    ///
    /// # Returns
    /// 成功返回现价，失败返回 `MarketError`。
    async fn get_current_price(&self, symbol: &str) -> Result<f64, MarketError> {
        let symbol = normalize_symbol(symbol);
        let url = format!("{}/api/v3/ticker/price", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        if resp.status().is_client_error() {
            return Err(MarketError::Unavailable(symbol));
        }
        if !resp.status().is_success() {
            return Err(MarketError::Network(format!("HTTP {}", resp.status())));
        }

        let ticker: TickerResponse = resp
            .json()
            .await
            .map_err(|e| MarketError::Parse(e.to_string()))?;

        let price = ticker.parse_price()?;
        debug!("Ticker {} = {}", symbol, price);
        Ok(price)
    }
}
