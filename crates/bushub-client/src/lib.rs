//! # BusHub Client
//!
//! 消息总线客户端的在线状态层：向枢纽上报上线、心跳与下线事件，
//! 并把每条入站消息的处理过程包裹在消息作用域内。
//!
//! ## 核心组件
//!
//! - [`BusHubClient`] - 客户端本体，驱动作业并分发入站消息
//! - [`Job`] - 后台作业接口（上线通知、心跳、下线通知）
//! - [`HubTransport`] - 枢纽传输连接的抽象接缝
//! - [`BusHubMessage`] - 出站消息信封

pub mod client;
pub mod config;
pub mod jobs;
pub mod messages;
pub mod transport;

pub use client::*;
pub use config::*;
pub use jobs::*;
pub use messages::*;
pub use transport::*;
