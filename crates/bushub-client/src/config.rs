//! 客户端配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 总线枢纽客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusHubClientConfig {
    /// 枢纽地址
    pub hub_uri: String,
    /// 本客户端的输入队列地址
    pub input_queue_address: String,
    /// 心跳间隔（秒）
    pub heartbeat_interval_secs: u64,
}

impl Default for BusHubClientConfig {
    fn default() -> Self {
        Self {
            hub_uri: "http://localhost:8080/bushub".to_string(),
            input_queue_address: "client.input".to_string(),
            heartbeat_interval_secs: 30,
        }
    }
}

impl BusHubClientConfig {
    /// 心跳间隔
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
