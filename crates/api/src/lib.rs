//! # `shingo-api` - HTTP API 网关
//!
//! 本 crate 是信号追踪引擎的 HTTP/REST 服务入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收来自仪表盘或脚本工具的 HTTP 请求
//! - 将请求 1:1 映射到存储/追踪器/监控器的公开操作
//! - 将领域模型转换为 DTO 返回给前端
//! - 把追踪器的预期内失败翻译为合适的 HTTP 状态码，请求处理器永不崩溃

pub mod error;
pub mod routes;
pub mod server;
pub mod types;
