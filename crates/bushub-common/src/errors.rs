//! 错误类型定义

use thiserror::Error;
use uuid::Uuid;

/// 消息作用域错误类型
///
/// 全部属于调用方缺陷，不可重试：工作线程必须先关闭当前工作单元
/// 才能开始下一个。
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("线程 {thread} 已存在活动的消息上下文: {context_id}")]
    ReentrantScope { thread: String, context_id: Uuid },

    #[error("消息作用域已关闭: {context_id}")]
    ScopeAlreadyClosed { context_id: Uuid },
}

/// 按消息解析错误类型
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("当前线程没有活动的消息作用域，无法解析: {type_name}")]
    NoActiveScope { type_name: String },

    #[error("作用域实例类型不匹配: {type_name}")]
    InstanceTypeMismatch { type_name: String },
}

impl ResolveError {
    /// 创建无活动作用域错误
    pub fn no_active_scope(type_name: impl Into<String>) -> Self {
        Self::NoActiveScope {
            type_name: type_name.into(),
        }
    }

    /// 创建类型不匹配错误
    pub fn instance_type_mismatch(type_name: impl Into<String>) -> Self {
        Self::InstanceTypeMismatch {
            type_name: type_name.into(),
        }
    }
}

/// 客户端错误类型
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("消息信封编解码失败: {source}")]
    EnvelopeError {
        #[from]
        source: serde_json::Error,
    },

    #[error("向枢纽发送消息失败: {message}")]
    TransportError { message: String },

    #[error("作业 {job} 执行失败: {message}")]
    JobError { job: String, message: String },

    #[error("消息处理失败: {message}")]
    HandlerError { message: String },

    #[error("作用域错误: {source}")]
    ScopeError {
        #[from]
        source: ScopeError,
    },
}

impl ClientError {
    /// 创建传输错误
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    /// 创建作业错误
    pub fn job_error(job: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JobError {
            job: job.into(),
            message: message.into(),
        }
    }

    /// 创建消息处理错误
    pub fn handler_error(message: impl Into<String>) -> Self {
        Self::HandlerError {
            message: message.into(),
        }
    }
}

/// 结果类型别名
pub type ScopeResult<T> = Result<T, ScopeError>;
pub type ResolveResult<T> = Result<T, ResolveError>;
pub type ClientResult<T> = Result<T, ClientError>;
