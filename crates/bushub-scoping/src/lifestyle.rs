//! 按消息生命周期的作用域解析适配器
//!
//! 通用容器把“作用域”生命周期策略委托到这里：以活动上下文标识派生
//! 缓存键，按（上下文，类型）记忆化实例，上下文销毁时统一释放。

use crate::context::MessageContext;
use crate::registry::{MessageScopeRegistry, ScopeCloseListener};
use bushub_common::{ResolveError, ResolveResult};
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 作用域服务 trait
///
/// 任何按消息作用域缓存的实例都实现此 trait。所属上下文销毁时
/// [`ScopedService::release`] 被调用恰好一次，默认实现为空操作，
/// 需要清理的服务自行重写。
pub trait ScopedService: Send + Sync + 'static {
    /// 所属上下文销毁时的释放钩子
    fn release(&self) {}
}

/// 缓存实例句柄
///
/// 同一实例的两个指针：`Any` 指针用于类型化取回，[`ScopedService`]
/// 指针用于销毁时调用释放钩子。
#[derive(Clone)]
pub struct ScopedHandle {
    instance: Arc<dyn Any + Send + Sync>,
    hook: Arc<dyn ScopedService>,
}

impl ScopedHandle {
    /// 包装一个作用域服务实例
    pub fn wrap<T: ScopedService>(service: T) -> Self {
        let service = Arc::new(service);
        Self {
            instance: Arc::clone(&service) as Arc<dyn Any + Send + Sync>,
            hook: service as Arc<dyn ScopedService>,
        }
    }

    /// 以具体类型取回实例
    pub fn downcast<T: ScopedService>(&self) -> ResolveResult<Arc<T>> {
        Arc::clone(&self.instance)
            .downcast::<T>()
            .map_err(|_| ResolveError::instance_type_mismatch(std::any::type_name::<T>()))
    }

    /// 调用释放钩子
    pub(crate) fn release(&self) {
        self.hook.release();
    }
}

impl std::fmt::Debug for ScopedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedHandle").finish_non_exhaustive()
    }
}

/// 作用域生命周期策略 trait
///
/// 通用依赖容器的接入点：容器以“作用域”生命周期注册的类型，其实例
/// 获取回调到此接口，由策略决定返回缓存实例还是调用工厂新建。
pub trait ScopedLifestyle: Send + Sync {
    /// 解析活动上下文中 `type_id` 对应的实例，必要时调用工厂创建
    fn resolve_erased(
        &self,
        type_id: TypeId,
        type_name: &str,
        factory: &dyn Fn() -> ScopedHandle,
    ) -> ResolveResult<ScopedHandle>;
}

/// 每上下文的实例缓存单元
///
/// 可重入锁允许工厂在创建期间于同一线程继续解析依赖；跨线程互斥
/// 保证同一（上下文，类型）的工厂只被调用一次。
type InstanceCell = Arc<ReentrantMutex<RefCell<HashMap<TypeId, ScopedHandle>>>>;

/// 按消息生命周期策略
///
/// 以上下文标识分片的实例缓存：互不相关的在途消息各自持有独立的
/// 缓存单元，解析期间不存在全局锁。
pub struct PerMessageLifestyle {
    registry: MessageScopeRegistry,
    instances: DashMap<Uuid, InstanceCell>,
}

impl PerMessageLifestyle {
    /// 创建适配器并注册为注册表的关闭监听器
    pub fn attach(registry: MessageScopeRegistry) -> Arc<Self> {
        let lifestyle = Arc::new(Self {
            registry: registry.clone(),
            instances: DashMap::new(),
        });
        registry.add_close_listener(Arc::clone(&lifestyle) as Arc<dyn ScopeCloseListener>);
        lifestyle
    }

    /// 解析当前消息作用域中的 `T` 实例
    ///
    /// 当前线程没有活动上下文时返回 [`ResolveError::NoActiveScope`]，
    /// 绝不退化为共享实例。首次解析调用 `factory` 恰好一次，同一
    /// 上下文内的后续解析返回同一实例。
    pub fn resolve<T, F>(&self, factory: F) -> ResolveResult<Arc<T>>
    where
        T: ScopedService,
        F: FnOnce() -> T,
    {
        self.resolve_with(TypeId::of::<T>(), std::any::type_name::<T>(), || {
            ScopedHandle::wrap(factory())
        })?
        .downcast()
    }

    /// 当前缓存的上下文数量（仅用于诊断）
    pub fn tracked_context_count(&self) -> usize {
        self.instances.len()
    }

    fn resolve_with(
        &self,
        type_id: TypeId,
        type_name: &str,
        make: impl FnOnce() -> ScopedHandle,
    ) -> ResolveResult<ScopedHandle> {
        let context = self
            .registry
            .current()
            .ok_or_else(|| ResolveError::no_active_scope(type_name))?;

        // 不跨工厂调用持有分片守卫，嵌套解析走克隆出的缓存单元
        let cell = Arc::clone(
            self.instances
                .entry(context.id())
                .or_insert_with(|| Arc::new(ReentrantMutex::new(RefCell::new(HashMap::new()))))
                .value(),
        );

        let guard = cell.lock();
        if let Some(existing) = guard.borrow().get(&type_id).cloned() {
            return Ok(existing);
        }

        // 锁可重入：工厂可以在同一线程内继续解析其他作用域依赖
        let handle = make();
        guard.borrow_mut().insert(type_id, handle.clone());
        debug!("创建作用域实例: {} (上下文 {})", type_name, context.id());
        Ok(handle)
    }
}

impl ScopedLifestyle for PerMessageLifestyle {
    fn resolve_erased(
        &self,
        type_id: TypeId,
        type_name: &str,
        factory: &dyn Fn() -> ScopedHandle,
    ) -> ResolveResult<ScopedHandle> {
        self.resolve_with(type_id, type_name, factory)
    }
}

impl ScopeCloseListener for PerMessageLifestyle {
    fn on_scope_closed(&self, context: &MessageContext) {
        // remove 是原子的，释放钩子对每个实例只会执行一次
        if let Some((_, cell)) = self.instances.remove(&context.id()) {
            let handles: Vec<ScopedHandle> = {
                let guard = cell.lock();
                let mut cached = guard.borrow_mut();
                cached.drain().map(|(_, handle)| handle).collect()
            };
            debug!(
                "释放 {} 个作用域实例 (上下文 {})",
                handles.len(),
                context.id()
            );
            for handle in handles {
                handle.release();
            }
        }
    }
}

impl std::fmt::Debug for PerMessageLifestyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerMessageLifestyle")
            .field("tracked_contexts", &self.instances.len())
            .finish()
    }
}
