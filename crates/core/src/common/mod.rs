use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod time;

/// # Summary
/// 信号的持仓方向，决定盈亏与超额偏移 (Excursion) 的符号约定。
///
/// # Invariants
/// - Long 方向在价格上涨时盈利，Short 方向在价格下跌时盈利。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    // 做多
    Long,
    // 做空
    Short,
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Ok(SignalType::Long),
            "SHORT" | "SELL" => Ok(SignalType::Short),
            _ => Err(format!("Unknown SignalType: {}", s)),
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Long => write!(f, "LONG"),
            SignalType::Short => write!(f, "SHORT"),
        }
    }
}

/// # Summary
/// 归一化交易对代码：统一大写并去除分隔符 (`BTC/USDT` -> `BTCUSDT`)。
///
/// # Logic
/// 1. 去除 `/` 分隔符。
/// 2. 转换为大写。
///
/// # Arguments
/// * `symbol`: 外部传入的任意写法交易对。
///
/// # Returns
/// 归一化后的代码字符串。
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("btc/usdt"), "BTCUSDT");
        assert_eq!(normalize_symbol("ETHUSDT"), "ETHUSDT");
    }

    #[test]
    fn test_signal_type_roundtrip() {
        assert_eq!("long".parse::<SignalType>().unwrap(), SignalType::Long);
        assert_eq!("SHORT".parse::<SignalType>().unwrap(), SignalType::Short);
        assert_eq!(SignalType::Long.to_string(), "LONG");
        assert!("sideways".parse::<SignalType>().is_err());
    }
}
