//! # `shingo-monitor` - 仓位监控循环
//!
//! 以固定周期枚举所有 active 信号，拉取现价刷新超额偏移，
//! 并按策略对止损/止盈触发执行自动平仓。
//! 监控器自身从不直接写信号行，所有变更经由追踪器操作。

pub mod position;
