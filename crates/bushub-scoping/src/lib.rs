//! # BusHub Scoping
//!
//! 按消息作用域核心：把依赖实例的生命周期限定在单条在途消息的处理过程内。
//!
//! ## 核心组件
//!
//! - [`MessageContext`] - 一个工作单元（一条入站消息）的标识与环境数据
//! - [`MessageScopeRegistry`] - 进程级线程到上下文的绑定关系，提供作用域的打开、查询与关闭
//! - [`PerMessageLifestyle`] - 作用域解析适配器，按（上下文，类型）缓存实例
//! - [`ScopedLifestyle`] - 通用容器接入的类型擦除策略接口
//!
//! ## 保证
//!
//! - 同一消息处理过程内解析得到同一实例
//! - 并发处理的不同消息各自得到独立实例
//! - 没有活动作用域时解析立即失败，绝不退化为进程级单例

pub mod context;
pub mod lifestyle;
pub mod registry;

pub use context::*;
pub use lifestyle::*;
pub use registry::*;
