pub mod monitor;
pub mod performance;
pub mod signals;
