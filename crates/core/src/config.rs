use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

/// 仓位监控循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    // 轮询周期 (秒)
    pub poll_interval_secs: u64,
    // 是否在止损/止盈触发时自动平仓
    pub auto_close: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                data_dir: "data".to_string(),
            },
            monitor: MonitorConfig {
                poll_interval_secs: 60,
                auto_close: true,
            },
        }
    }
}
