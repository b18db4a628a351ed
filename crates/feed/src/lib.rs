//! # `shingo-feed` - 行情数据适配层
//!
//! 实现 `shingo-core` 中的 `MarketDataProvider` 端口，
//! 通过 Binance 公共行情接口获取交易对的最新成交价。

pub mod binance;
