//! # `shingo-tracker` - 信号生命周期追踪核心
//!
//! 包含两个纯粹的领域构件：
//! - `pattern`: 无状态的形态分类器，在 open 时刻消费上游分量评分。
//! - `tracker`: pending -> active -> closed 状态机，独占所有
//!   生命周期/超额偏移/分类字段的写入权，并承载盈亏、R 倍数、
//!   持续时长与绩效汇总的全部算术。

pub mod pattern;
pub mod tracker;
