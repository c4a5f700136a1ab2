//! 消息上下文定义
//!
//! 一条在途消息对应一个 [`MessageContext`]，携带消息头等环境数据

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 上下文条目值类型
pub type ContextItem = Arc<dyn Any + Send + Sync>;

/// 消息上下文
///
/// 代表一个正在处理的工作单元。标识在创建时生成，生命周期内不可变；
/// 条目表在作用域打开期间可被协作方读写。
pub struct MessageContext {
    /// 上下文标识
    id: Uuid,
    /// 消息头与环境数据
    items: RwLock<HashMap<String, ContextItem>>,
    /// 创建时间（仅用于诊断）
    created_at: chrono::DateTime<chrono::Utc>,
}

impl MessageContext {
    /// 以初始数据创建新上下文
    pub(crate) fn new(initial: HashMap<String, ContextItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            items: RwLock::new(initial),
            created_at: chrono::Utc::now(),
        }
    }

    /// 上下文标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 上下文创建时间
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    /// 写入条目
    pub fn set_item(&self, key: impl Into<String>, value: ContextItem) {
        self.items.write().insert(key.into(), value);
    }

    /// 读取条目
    pub fn item(&self, key: &str) -> Option<ContextItem> {
        self.items.read().get(key).cloned()
    }

    /// 以具体类型读取条目
    pub fn item_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.item(key).and_then(|value| value.downcast::<T>().ok())
    }

    /// 是否包含条目
    pub fn contains_item(&self, key: &str) -> bool {
        self.items.read().contains_key(key)
    }

    /// 当前条目数量
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("items", &self.items.read().len())
            .finish()
    }
}
