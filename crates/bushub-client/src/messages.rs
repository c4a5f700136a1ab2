//! 消息定义
//!
//! 出站信封携带发送方客户端标识；消息体以 `type` 标签区分种类，
//! 便于枢纽端按类型分发。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 出站消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusHubMessage {
    /// 发送方客户端标识
    pub client_id: Uuid,
    /// 消息体
    #[serde(flatten)]
    pub body: BusHubMessageBody,
}

/// 出站消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusHubMessageBody {
    /// 客户端上线通知
    ClientOnline {
        /// 客户端输入队列地址
        input_queue_address: String,
    },
    /// 心跳
    Heartbeat {
        /// 发送时间
        sent_at: DateTime<Utc>,
    },
    /// 客户端下线通知
    ClientOffline,
}

impl BusHubMessageBody {
    /// 消息种类名（用于日志）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientOnline { .. } => "ClientOnline",
            Self::Heartbeat { .. } => "Heartbeat",
            Self::ClientOffline => "ClientOffline",
        }
    }
}

/// 入站消息
///
/// 枢纽推送给客户端的消息：消息头作为打开消息作用域的初始数据，
/// 消息体由各处理器自行解释。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// 消息头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 消息体
    pub body: serde_json::Value,
}
