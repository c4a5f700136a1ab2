//! 客户端后台作业
//!
//! 简单的事件生产者：上线通知在启动时发送一次，心跳按固定间隔发送，
//! 下线通知在关闭时发送一次。作业通过 [`MessageSender`] 上报，
//! 不直接触碰传输层。

use crate::config::BusHubClientConfig;
use crate::messages::BusHubMessageBody;
use crate::transport::MessageSender;
use async_trait::async_trait;
use bushub_common::ClientResult;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 客户端后台作业
#[async_trait]
pub trait Job: Send + Sync {
    /// 作业名称
    fn name(&self) -> &'static str;

    /// 客户端初始化时启动
    async fn start(&self, sender: MessageSender, config: &BusHubClientConfig) -> ClientResult<()>;

    /// 客户端关闭时停止
    async fn stop(&self, sender: MessageSender) -> ClientResult<()>;
}

/// 上线通知作业
#[derive(Debug, Default)]
pub struct NotifyClientIsOnline;

#[async_trait]
impl Job for NotifyClientIsOnline {
    fn name(&self) -> &'static str {
        "NotifyClientIsOnline"
    }

    async fn start(&self, sender: MessageSender, config: &BusHubClientConfig) -> ClientResult<()> {
        sender
            .send(BusHubMessageBody::ClientOnline {
                input_queue_address: config.input_queue_address.clone(),
            })
            .await
    }

    async fn stop(&self, _sender: MessageSender) -> ClientResult<()> {
        Ok(())
    }
}

/// 心跳作业
///
/// 启动后按配置的间隔周期性发送心跳，停止时取消后台任务。
#[derive(Debug, Default)]
pub struct SendHeartbeat {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SendHeartbeat {
    /// 创建心跳作业
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Job for SendHeartbeat {
    fn name(&self) -> &'static str {
        "SendHeartbeat"
    }

    async fn start(&self, sender: MessageSender, config: &BusHubClientConfig) -> ClientResult<()> {
        let interval = config.heartbeat_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，跳过以避免与上线通知同时到达
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("发送心跳");
                if let Err(error) = sender
                    .send(BusHubMessageBody::Heartbeat { sent_at: Utc::now() })
                    .await
                {
                    warn!("心跳发送失败: {}", error);
                }
            }
        });
        *self.task.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self, _sender: MessageSender) -> ClientResult<()> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        Ok(())
    }
}

/// 下线通知作业
#[derive(Debug, Default)]
pub struct NotifyClientIsOffline;

#[async_trait]
impl Job for NotifyClientIsOffline {
    fn name(&self) -> &'static str {
        "NotifyClientIsOffline"
    }

    async fn start(&self, _sender: MessageSender, _config: &BusHubClientConfig) -> ClientResult<()> {
        Ok(())
    }

    async fn stop(&self, sender: MessageSender) -> ClientResult<()> {
        sender.send(BusHubMessageBody::ClientOffline).await
    }
}
