//! # BusHub Common
//!
//! 这个 crate 提供 BusHub 客户端各层共享的错误类型。
//!
//! ## 错误分类
//!
//! - [`ScopeError`] - 消息作用域生命周期错误
//! - [`ResolveError`] - 按消息解析错误
//! - [`ClientError`] - 客户端传输与作业错误
//!
//! ## 设计原则
//!
//! - 作用域与解析错误属于调用方缺陷，立即上抛，不做本地恢复
//! - 每个关注点一个错误枚举，便于调用方精确匹配

pub mod errors;

pub use errors::*;
