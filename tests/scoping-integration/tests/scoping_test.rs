//! 消息作用域核心的集中集成测试
//!
//! 覆盖按消息解析的全部保证：同一上下文内实例一致、并发上下文实例
//! 隔离、无作用域时解析失败、作用域生命周期错误以及释放钩子语义。

use bushub_common::{ResolveError, ScopeError};
use bushub_scoping::{
    MessageScopeRegistry, PerMessageLifestyle, ScopedHandle, ScopedLifestyle, ScopedService,
};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;

/// 测试用作用域服务
#[derive(Debug)]
struct ScopedWidget {
    releases: Arc<AtomicUsize>,
}

impl ScopedWidget {
    fn factory(releases: &Arc<AtomicUsize>) -> impl FnOnce() -> Self {
        let releases = Arc::clone(releases);
        move || Self { releases }
    }
}

impl ScopedService for ScopedWidget {
    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup() -> (MessageScopeRegistry, Arc<PerMessageLifestyle>, Arc<AtomicUsize>) {
    let registry = MessageScopeRegistry::new();
    let lifestyle = PerMessageLifestyle::attach(registry.clone());
    (registry, lifestyle, Arc::new(AtomicUsize::new(0)))
}

#[test]
fn same_message_context_results_in_same_service() {
    let (registry, lifestyle, releases) = setup();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let service1 = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    let service2 = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    assert!(Arc::ptr_eq(&service1, &service2));
    handle.close().unwrap();
}

#[test]
fn different_message_contexts_result_in_different_services() {
    let (registry, lifestyle, releases) = setup();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let service1 = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    handle.close().unwrap();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let service2 = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    handle.close().unwrap();

    assert!(!Arc::ptr_eq(&service1, &service2));
}

#[test]
fn concurrent_message_contexts_result_in_different_services() {
    let (registry, lifestyle, releases) = setup();
    let barrier = Arc::new(Barrier::new(2));
    let (collect, collected) = mpsc::channel::<Arc<ScopedWidget>>();

    let mut workers = Vec::new();
    for _ in 0..2 {
        let registry = registry.clone();
        let lifestyle = Arc::clone(&lifestyle);
        let releases = Arc::clone(&releases);
        let barrier = Arc::clone(&barrier);
        let collect = collect.clone();

        workers.push(thread::spawn(move || {
            let handle = registry.open_scope(HashMap::new()).unwrap();
            // 两个作用域都打开后才开始解析
            barrier.wait();
            let service = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
            collect.send(service).unwrap();
            // 对方也解析完毕后再关闭各自的作用域
            barrier.wait();
            handle.close().unwrap();
        }));
    }
    drop(collect);

    let first = collected.recv().unwrap();
    let second = collected.recv().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn cannot_resolve_service_outside_scope() {
    let (_registry, lifestyle, releases) = setup();

    let error = lifestyle
        .resolve(ScopedWidget::factory(&releases))
        .unwrap_err();
    assert!(matches!(error, ResolveError::NoActiveScope { .. }));
}

#[test]
fn reentrant_open_on_same_thread_fails() {
    let (registry, _lifestyle, _releases) = setup();

    let _handle = registry.open_scope(HashMap::new()).unwrap();
    let error = registry.open_scope(HashMap::new()).unwrap_err();
    assert!(matches!(error, ScopeError::ReentrantScope { .. }));
}

#[test]
fn second_close_of_same_handle_fails() {
    let (registry, _lifestyle, _releases) = setup();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    handle.close().unwrap();
    let error = handle.close().unwrap_err();
    assert!(matches!(error, ScopeError::ScopeAlreadyClosed { .. }));
}

#[test]
fn close_releases_instances_and_new_scope_never_sees_stale_ones() {
    let (registry, lifestyle, releases) = setup();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let stale = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    handle.close().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 1);

    // 新上下文绝不返回已释放的旧实例
    let handle = registry.open_scope(HashMap::new()).unwrap();
    let fresh = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    assert!(!Arc::ptr_eq(&stale, &fresh));
    handle.close().unwrap();

    assert_eq!(releases.load(Ordering::SeqCst), 2);
}

#[test]
fn interleaved_scopes_on_two_threads_stay_isolated() {
    let (registry, lifestyle, releases) = setup();
    let (from_a, a_events) = mpsc::channel::<Arc<ScopedWidget>>();
    let (signal_a, a_wait) = mpsc::channel::<()>();

    // 线程 A：打开作用域、解析 W1，等 B 解析完再复核并关闭
    let worker_a = thread::spawn({
        let registry = registry.clone();
        let lifestyle = Arc::clone(&lifestyle);
        let releases = Arc::clone(&releases);
        move || {
            let handle = registry.open_scope(HashMap::new()).unwrap();
            let w1 = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
            from_a.send(Arc::clone(&w1)).unwrap();

            a_wait.recv().unwrap();
            let w1_again = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
            assert!(Arc::ptr_eq(&w1, &w1_again));
            handle.close().unwrap();
            from_a.send(w1).unwrap();
        }
    });

    // 线程 B（当前线程）：并发打开自己的作用域
    let w1 = a_events.recv().unwrap();
    let handle_b = registry.open_scope(HashMap::new()).unwrap();
    assert_eq!(registry.active_scope_count(), 2);
    let w2 = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    assert!(!Arc::ptr_eq(&w1, &w2));

    signal_a.send(()).unwrap();
    let _ = a_events.recv().unwrap();

    // A 关闭后 B 的实例不受影响
    let w2_again = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    assert!(Arc::ptr_eq(&w2, &w2_again));
    handle_b.close().unwrap();

    worker_a.join().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 2);
    assert_eq!(registry.active_scope_count(), 0);
}

#[test]
fn racing_helpers_on_shared_context_invoke_factory_once() {
    let (registry, lifestyle, releases) = setup();
    let creations = Arc::new(AtomicUsize::new(0));

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let context = Arc::clone(handle.context());
    let barrier = Arc::new(Barrier::new(8));

    let mut workers = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let lifestyle = Arc::clone(&lifestyle);
        let releases = Arc::clone(&releases);
        let creations = Arc::clone(&creations);
        let context = Arc::clone(&context);
        let barrier = Arc::clone(&barrier);

        workers.push(thread::spawn(move || {
            registry
                .run_with_context(context, || {
                    // 所有辅助线程同时冲向同一（上下文，类型）的解析
                    barrier.wait();
                    lifestyle
                        .resolve(move || {
                            creations.fetch_add(1, Ordering::SeqCst);
                            // 拉长创建窗口，让竞争真正落在工厂调用期间
                            thread::sleep(std::time::Duration::from_millis(20));
                            ScopedWidget { releases }
                        })
                        .unwrap()
                })
                .unwrap()
        }));
    }

    let instances: Vec<Arc<ScopedWidget>> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    assert_eq!(creations.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }

    handle.close().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn helper_thread_shares_instance_via_explicit_context() {
    let (registry, lifestyle, releases) = setup();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let owner_instance = lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap();
    let context = Arc::clone(handle.context());

    let helper_instance = thread::spawn({
        let registry = registry.clone();
        let lifestyle = Arc::clone(&lifestyle);
        let releases = Arc::clone(&releases);
        move || {
            registry
                .run_with_context(context, || {
                    lifestyle.resolve(ScopedWidget::factory(&releases)).unwrap()
                })
                .unwrap()
        }
    })
    .join()
    .unwrap();

    assert!(Arc::ptr_eq(&owner_instance, &helper_instance));
    handle.close().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

/// 最小容器测试替身
///
/// 通过类型擦除的策略接口接入作用域生命周期，模拟通用依赖容器的
/// “作用域”注册能力。
struct TestContainer {
    lifestyle: Arc<PerMessageLifestyle>,
    factories: HashMap<TypeId, (&'static str, Arc<dyn Fn() -> ScopedHandle + Send + Sync>)>,
}

impl TestContainer {
    fn new(lifestyle: Arc<PerMessageLifestyle>) -> Self {
        Self {
            lifestyle,
            factories: HashMap::new(),
        }
    }

    fn register_scoped<T, F>(&mut self, factory: F)
    where
        T: ScopedService,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factories.insert(
            TypeId::of::<T>(),
            (
                std::any::type_name::<T>(),
                Arc::new(move || ScopedHandle::wrap(factory())),
            ),
        );
    }

    fn resolve<T: ScopedService>(&self) -> Result<Arc<T>, ResolveError> {
        let (type_name, factory) = self
            .factories
            .get(&TypeId::of::<T>())
            .expect("类型未注册");
        self.lifestyle
            .resolve_erased(TypeId::of::<T>(), type_name, factory.as_ref())?
            .downcast()
    }
}

#[test]
fn container_plugs_into_lifestyle_policy() {
    let registry = MessageScopeRegistry::new();
    let lifestyle = PerMessageLifestyle::attach(registry.clone());
    let releases = Arc::new(AtomicUsize::new(0));

    let mut container = TestContainer::new(lifestyle);
    let factory_releases = Arc::clone(&releases);
    container.register_scoped(move || ScopedWidget {
        releases: Arc::clone(&factory_releases),
    });

    // 无作用域时容器解析同样立即失败
    let error = container.resolve::<ScopedWidget>().unwrap_err();
    assert!(matches!(error, ResolveError::NoActiveScope { .. }));

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let first = container.resolve::<ScopedWidget>().unwrap();
    let second = container.resolve::<ScopedWidget>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    handle.close().unwrap();

    let handle = registry.open_scope(HashMap::new()).unwrap();
    let third = container.resolve::<ScopedWidget>().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    handle.close().unwrap();

    assert_eq!(releases.load(Ordering::SeqCst), 2);
}
