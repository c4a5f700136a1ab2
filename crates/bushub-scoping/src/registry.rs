//! 消息作用域注册表
//!
//! 进程级设施：按线程维护“当前工作单元”的绑定关系。一个线程在任意
//! 时刻最多绑定一个活动上下文，同一线程上的嵌套打开会立即失败。

use crate::context::{ContextItem, MessageContext};
use bushub_common::{ScopeError, ScopeResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// 作用域关闭监听器
///
/// 上下文销毁时收到一次通知，用于释放按上下文缓存的资源
pub trait ScopeCloseListener: Send + Sync {
    /// 上下文即将销毁
    fn on_scope_closed(&self, context: &MessageContext);
}

/// 进程级注册表实例
static GLOBAL_SCOPE_REGISTRY: Lazy<MessageScopeRegistry> = Lazy::new(MessageScopeRegistry::new);

/// 消息作用域注册表
///
/// 线程到上下文的绑定关系存放在并发映射中，互不相关的在途消息之间
/// 不产生锁竞争。克隆共享同一份内部状态。
#[derive(Clone)]
pub struct MessageScopeRegistry {
    /// 线程到活动上下文的绑定关系
    bindings: Arc<DashMap<ThreadId, Arc<MessageContext>>>,
    /// 关闭监听器
    listeners: Arc<RwLock<Vec<Arc<dyn ScopeCloseListener>>>>,
}

impl MessageScopeRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 进程级注册表
    pub fn global() -> &'static Self {
        &GLOBAL_SCOPE_REGISTRY
    }

    /// 打开消息作用域
    ///
    /// 以初始数据创建新上下文并绑定到调用线程。调用线程已有活动上下文时
    /// 返回 [`ScopeError::ReentrantScope`]。返回的句柄在所有退出路径上
    /// 保证作用域被关闭：显式 [`ScopeHandle::close`] 或 Drop 兜底。
    pub fn open_scope(
        &self,
        initial: HashMap<String, ContextItem>,
    ) -> ScopeResult<ScopeHandle> {
        let thread_id = thread::current().id();
        let context = Arc::new(MessageContext::new(initial));

        match self.bindings.entry(thread_id) {
            Entry::Occupied(existing) => Err(ScopeError::ReentrantScope {
                thread: format!("{thread_id:?}"),
                context_id: existing.get().id(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&context));
                debug!("打开消息作用域: {} (线程 {:?})", context.id(), thread_id);
                Ok(ScopeHandle {
                    context,
                    thread_id,
                    closed: AtomicBool::new(false),
                    registry: self.clone(),
                })
            }
        }
    }

    /// 当前线程的活动上下文
    ///
    /// 没有打开的作用域时返回 `None`。从不阻塞，可与其他线程的
    /// 打开/关闭并发调用。
    pub fn current(&self) -> Option<Arc<MessageContext>> {
        self.bindings
            .get(&thread::current().id())
            .map(|bound| Arc::clone(bound.value()))
    }

    /// 关闭消息作用域
    ///
    /// 解除上下文与其绑定线程的关系，通知所有关闭监听器释放按上下文
    /// 资源，随后丢弃上下文。同一句柄的第二次关闭返回
    /// [`ScopeError::ScopeAlreadyClosed`]，绝不静默成功。
    ///
    /// 只能经由 [`ScopeHandle::close`] 调用：句柄持有打开它的注册表，
    /// 经其他注册表实例关闭会让绑定关系与句柄状态脱节。
    pub(crate) fn close_scope(&self, handle: &ScopeHandle) -> ScopeResult<()> {
        if handle.closed.swap(true, Ordering::SeqCst) {
            return Err(ScopeError::ScopeAlreadyClosed {
                context_id: handle.context.id(),
            });
        }

        // 只解除本句柄绑定的条目，避免误伤同线程上后续打开的作用域
        self.bindings
            .remove_if(&handle.thread_id, |_, bound| {
                bound.id() == handle.context.id()
            });

        // 回调期间不持有监听器锁
        let listeners: Vec<_> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_scope_closed(&handle.context);
        }

        debug!("关闭消息作用域: {}", handle.context.id());
        Ok(())
    }

    /// 在指定上下文下运行闭包
    ///
    /// 为同一消息的扇出辅助线程提供显式入口：把给定上下文临时绑定到
    /// 当前线程，闭包返回（或 panic）后解除绑定。当前线程已有绑定时
    /// 返回 [`ScopeError::ReentrantScope`]。
    pub fn run_with_context<R>(
        &self,
        context: Arc<MessageContext>,
        work: impl FnOnce() -> R,
    ) -> ScopeResult<R> {
        let thread_id = thread::current().id();
        match self.bindings.entry(thread_id) {
            Entry::Occupied(existing) => {
                return Err(ScopeError::ReentrantScope {
                    thread: format!("{thread_id:?}"),
                    context_id: existing.get().id(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(context);
            }
        }

        let _unbind = BoundThreadGuard {
            bindings: Arc::clone(&self.bindings),
            thread_id,
        };
        Ok(work())
    }

    /// 注册作用域关闭监听器
    pub fn add_close_listener(&self, listener: Arc<dyn ScopeCloseListener>) {
        self.listeners.write().push(listener);
    }

    /// 当前活动作用域数量（仅用于诊断）
    pub fn active_scope_count(&self) -> usize {
        self.bindings.len()
    }
}

impl Default for MessageScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageScopeRegistry")
            .field("active_scopes", &self.bindings.len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

/// 临时绑定守卫，panic 时同样解除绑定
struct BoundThreadGuard {
    bindings: Arc<DashMap<ThreadId, Arc<MessageContext>>>,
    thread_id: ThreadId,
}

impl Drop for BoundThreadGuard {
    fn drop(&mut self) {
        self.bindings.remove(&self.thread_id);
    }
}

/// 作用域句柄
///
/// 打开作用域时返回，持有期间上下文保持活动。未显式关闭时由 Drop
/// 兜底回收，保证所有退出路径（正常返回、错误、提前放弃）都会释放。
pub struct ScopeHandle {
    context: Arc<MessageContext>,
    thread_id: ThreadId,
    closed: AtomicBool,
    registry: MessageScopeRegistry,
}

impl ScopeHandle {
    /// 本作用域的上下文
    pub fn context(&self) -> &Arc<MessageContext> {
        &self.context
    }

    /// 显式关闭本作用域
    ///
    /// 总是经由打开本作用域的注册表执行。第二次调用返回
    /// [`ScopeError::ScopeAlreadyClosed`]。
    pub fn close(&self) -> ScopeResult<()> {
        self.registry.close_scope(self)
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!("作用域未显式关闭，Drop 时回收: {}", self.context.id());
            let registry = self.registry.clone();
            let _ = registry.close_scope(self);
        }
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("context_id", &self.context.id())
            .field("thread_id", &self.thread_id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
