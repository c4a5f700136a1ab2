//! 枢纽传输抽象
//!
//! 连接建立、重连与握手属于外部协作方；客户端只依赖这里的发送接缝。

use crate::messages::{BusHubMessage, BusHubMessageBody};
use async_trait::async_trait;
use bushub_common::ClientResult;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 枢纽传输连接
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// 向枢纽发送一帧已序列化的消息
    async fn send_to_hub(&self, payload: String) -> ClientResult<()>;
}

/// 出站消息发送句柄
///
/// 作业与客户端共用：统一盖上客户端标识并序列化后交给传输层。
#[derive(Clone)]
pub struct MessageSender {
    client_id: Uuid,
    transport: Arc<dyn HubTransport>,
}

impl MessageSender {
    /// 创建发送句柄
    pub fn new(client_id: Uuid, transport: Arc<dyn HubTransport>) -> Self {
        Self {
            client_id,
            transport,
        }
    }

    /// 发送一条消息体
    pub async fn send(&self, body: BusHubMessageBody) -> ClientResult<()> {
        let message = BusHubMessage {
            client_id: self.client_id,
            body,
        };
        debug!("发送总线枢纽消息: {}", message.body.kind());
        let payload = serde_json::to_string(&message)?;
        self.transport.send_to_hub(payload).await
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// 进程内传输实现
///
/// 把出站消息收集在内存里，供演示应用与测试检视。
#[derive(Debug, Default)]
pub struct InMemoryHubTransport {
    sent: parking_lot::Mutex<Vec<String>>,
}

impl InMemoryHubTransport {
    /// 创建空的进程内传输
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送的消息帧
    pub fn sent_payloads(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// 已发送并反序列化的消息
    pub fn sent_messages(&self) -> Vec<BusHubMessage> {
        self.sent
            .lock()
            .iter()
            .filter_map(|payload| serde_json::from_str(payload).ok())
            .collect()
    }
}

#[async_trait]
impl HubTransport for InMemoryHubTransport {
    async fn send_to_hub(&self, payload: String) -> ClientResult<()> {
        self.sent.lock().push(payload);
        Ok(())
    }
}
