//! 总线枢纽客户端
//!
//! 驱动后台作业的启停，并把每条入站消息的分发包裹在消息作用域内：
//! 处理器在作用域内可以读取消息头环境数据，解析按消息缓存的依赖。

use crate::config::BusHubClientConfig;
use crate::jobs::{Job, NotifyClientIsOffline, NotifyClientIsOnline, SendHeartbeat};
use crate::messages::{BusHubMessageBody, InboundMessage};
use crate::transport::{HubTransport, MessageSender};
use bushub_common::{ClientError, ClientResult};
use bushub_scoping::{ContextItem, MessageContext, MessageScopeRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 入站消息处理器
///
/// 在打开的消息作用域内被调用；同一消息内解析的作用域依赖保证一致。
/// 扇出工作通过 [`MessageScopeRegistry::run_with_context`] 显式携带
/// 上下文，处理保持在本工作线程上同步完成。
pub trait MessageHandler: Send + Sync {
    /// 处理一条入站消息
    fn handle(&self, context: &MessageContext, message: &InboundMessage) -> ClientResult<()>;
}

/// 总线枢纽客户端
pub struct BusHubClient {
    client_id: Uuid,
    config: BusHubClientConfig,
    transport: Arc<dyn HubTransport>,
    registry: MessageScopeRegistry,
    jobs: Vec<Arc<dyn Job>>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl BusHubClient {
    /// 创建客户端
    ///
    /// 客户端标识在创建时生成；作业集固定为上线通知、心跳与下线通知。
    pub fn new(
        config: BusHubClientConfig,
        transport: Arc<dyn HubTransport>,
        registry: MessageScopeRegistry,
    ) -> Self {
        let client_id = Uuid::new_v4();
        info!("创建总线枢纽客户端: {} (枢纽 {})", client_id, config.hub_uri);

        Self {
            client_id,
            config,
            transport,
            registry,
            jobs: vec![
                Arc::new(NotifyClientIsOnline) as Arc<dyn Job>,
                Arc::new(SendHeartbeat::new()),
                Arc::new(NotifyClientIsOffline),
            ],
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// 客户端标识
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// 输入队列地址
    pub fn input_queue_address(&self) -> &str {
        &self.config.input_queue_address
    }

    /// 出站消息发送句柄
    pub fn sender(&self) -> MessageSender {
        MessageSender::new(self.client_id, Arc::clone(&self.transport))
    }

    /// 注册入站消息处理器
    pub fn add_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().push(handler);
    }

    /// 启动客户端
    ///
    /// 按顺序启动全部作业；任一作业启动失败立即上抛。
    pub async fn initialize(&self) -> ClientResult<()> {
        info!("启动总线枢纽客户端");
        for job in &self.jobs {
            debug!("初始化作业: {}", job.name());
            job.start(self.sender(), &self.config)
                .await
                .map_err(|error| ClientError::job_error(job.name(), error.to_string()))?;
        }
        Ok(())
    }

    /// 发送一条消息体
    pub async fn send(&self, body: BusHubMessageBody) -> ClientResult<()> {
        self.sender().send(body).await
    }

    /// 接收并分发一条入站消息
    ///
    /// 以消息头为初始数据打开消息作用域，在作用域内同步分发给全部
    /// 处理器，随后关闭作用域。处理器出错时作用域同样被关闭，按消息
    /// 缓存的实例照常释放。
    pub fn receive_message(&self, raw: &str) -> ClientResult<()> {
        let message: InboundMessage = serde_json::from_str(raw)?;

        let mut initial: HashMap<String, ContextItem> = HashMap::new();
        for (key, value) in &message.headers {
            initial.insert(key.clone(), Arc::new(value.clone()) as ContextItem);
        }

        let handle = self.registry.open_scope(initial)?;
        debug!(
            "分发入站消息 (上下文 {}, {} 个消息头)",
            handle.context().id(),
            message.headers.len()
        );

        let outcome = self.dispatch(handle.context(), &message);
        let closed = handle.close().map_err(ClientError::from);
        outcome.and(closed)
    }

    fn dispatch(&self, context: &MessageContext, message: &InboundMessage) -> ClientResult<()> {
        let handlers: Vec<_> = self.handlers.read().clone();
        for handler in handlers {
            handler.handle(context, message)?;
        }
        Ok(())
    }

    /// 关闭客户端
    ///
    /// 逆序停止全部作业（最后注册的下线通知最先执行发送）。
    pub async fn shutdown(&self) -> ClientResult<()> {
        info!("关闭总线枢纽客户端");
        for job in self.jobs.iter().rev() {
            debug!("停止作业: {}", job.name());
            job.stop(self.sender())
                .await
                .map_err(|error| ClientError::job_error(job.name(), error.to_string()))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for BusHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHubClient")
            .field("client_id", &self.client_id)
            .field("hub_uri", &self.config.hub_uri)
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}
