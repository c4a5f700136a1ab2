//! # 示例应用程序
//!
//! 演示 BusHub 客户端的在线状态上报与按消息作用域解析

use anyhow::Result;
use bushub_client::{
    BusHubClient, BusHubClientConfig, InMemoryHubTransport, InboundMessage, MessageHandler,
};
use bushub_common::ClientResult;
use bushub_scoping::{MessageContext, MessageScopeRegistry, PerMessageLifestyle, ScopedService};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "BusHub 客户端示例应用")]
struct Args {
    /// 枢纽地址
    #[arg(long, default_value = "http://localhost:8080/bushub")]
    hub_uri: String,

    /// 输入队列地址
    #[arg(long, default_value = "demo.input")]
    input_queue: String,

    /// 心跳间隔（秒）
    #[arg(long, default_value_t = 2)]
    heartbeat_secs: u64,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// 按消息缓存的审计轨迹
#[derive(Debug)]
struct AuditTrail {
    context_id: uuid::Uuid,
}

impl ScopedService for AuditTrail {
    fn release(&self) {
        info!("审计轨迹释放 (上下文 {})", self.context_id);
    }
}

/// 演示处理器：读取消息头并解析作用域依赖
struct DemoHandler {
    lifestyle: Arc<PerMessageLifestyle>,
}

impl MessageHandler for DemoHandler {
    fn handle(&self, context: &MessageContext, message: &InboundMessage) -> ClientResult<()> {
        let correlation = context
            .item_as::<String>("correlation-id")
            .map_or_else(|| "<无>".to_string(), |value| value.as_ref().clone());

        let context_id = context.id();
        let first = self
            .lifestyle
            .resolve(|| AuditTrail { context_id })
            .map_err(|error| bushub_common::ClientError::handler_error(error.to_string()))?;
        let second = self
            .lifestyle
            .resolve(|| AuditTrail { context_id })
            .map_err(|error| bushub_common::ClientError::handler_error(error.to_string()))?;

        info!(
            "处理消息: correlation-id={}, body={}, 同一实例={}",
            correlation,
            message.body,
            Arc::ptr_eq(&first, &second)
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("启动 BusHub 示例应用");

    let config = BusHubClientConfig {
        hub_uri: args.hub_uri,
        input_queue_address: args.input_queue,
        heartbeat_interval_secs: args.heartbeat_secs,
    };

    let registry = MessageScopeRegistry::global().clone();
    let lifestyle = PerMessageLifestyle::attach(registry.clone());

    let transport = Arc::new(InMemoryHubTransport::new());
    let client = BusHubClient::new(config, transport.clone(), registry);
    client.add_handler(Arc::new(DemoHandler { lifestyle }));

    // 启动：上线通知 + 心跳
    client.initialize().await?;

    // 模拟一条来自枢纽的入站消息
    let inbound = serde_json::json!({
        "headers": { "correlation-id": "demo-42" },
        "body": { "greeting": "hello" }
    });
    client.receive_message(&inbound.to_string())?;

    // 等两个心跳周期
    tokio::time::sleep(std::time::Duration::from_secs(args.heartbeat_secs * 2 + 1)).await;

    // 关闭：下线通知
    client.shutdown().await?;

    for message in transport.sent_messages() {
        info!("已上报: {}", message.body.kind());
    }

    info!("示例应用结束");
    Ok(())
}
