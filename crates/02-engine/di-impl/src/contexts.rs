//! 作用域上下文
//!
//! [`InstanceStore`] 保证同一个 Bean 在一个上下文中只创建一次：第一个调用者负责创建，
//! 其他线程等待结果。创建失败时等待者得到错误，槽位被移除，下一次调用重新创建。

use di_abstractions::{Context, ContextualInstance, InstanceFactory};
use di_common::{builtin, BeanId, CreationError, CreationResult};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};
use uuid::Uuid;

enum SlotState {
    Creating(ThreadId),
    Ready(ContextualInstance),
    Failed(String),
}

struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn creating() -> Self {
        Self {
            state: Mutex::new(SlotState::Creating(thread::current().id())),
            ready: Condvar::new(),
        }
    }
}

/// 上下文实例存储
#[derive(Default)]
pub struct InstanceStore {
    slots: Mutex<HashMap<BeanId, Arc<Slot>>>,
    order: Mutex<Vec<BeanId>>,
}

/// 创建过程中断（包括 panic）时把槽位标记为失败并唤醒等待者
struct CreationGuard<'a> {
    store: &'a InstanceStore,
    bean: BeanId,
    slot: Arc<Slot>,
    completed: bool,
}

impl CreationGuard<'_> {
    fn finish(mut self, result: &CreationResult<ContextualInstance>) {
        match result {
            Ok(instance) => {
                *self.slot.state.lock() = SlotState::Ready(Arc::clone(instance));
                self.store.order.lock().push(self.bean);
            }
            Err(error) => {
                *self.slot.state.lock() = SlotState::Failed(error.to_string());
                self.store.release(self.bean, &self.slot);
            }
        }
        self.slot.ready.notify_all();
        self.completed = true;
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!("实例创建中断: Bean {}", self.bean);
        *self.slot.state.lock() = SlotState::Failed("创建过程中断".to_string());
        self.store.release(self.bean, &self.slot);
        self.slot.ready.notify_all();
    }
}

impl InstanceStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    fn release(&self, bean: BeanId, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock();
        if slots.get(&bean).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(&bean);
        }
    }

    /// 获取已创建的实例
    pub fn get(&self, bean: BeanId) -> Option<ContextualInstance> {
        let slot = self.slots.lock().get(&bean).cloned()?;
        let state = slot.state.lock();
        match &*state {
            SlotState::Ready(instance) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    /// 获取实例，不存在时调用 `create` 创建
    pub fn get_or_create(
        &self,
        bean: BeanId,
        create: InstanceFactory<'_>,
    ) -> CreationResult<ContextualInstance> {
        let slot = {
            let mut slots = self.slots.lock();
            match slots.get(&bean) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Arc::new(Slot::creating());
                    slots.insert(bean, Arc::clone(&slot));
                    drop(slots);
                    let guard = CreationGuard {
                        store: self,
                        bean,
                        slot,
                        completed: false,
                    };
                    let result = create();
                    guard.finish(&result);
                    return result;
                }
            }
        };

        let mut state = slot.state.lock();
        loop {
            let owner = match &*state {
                SlotState::Ready(instance) => return Ok(Arc::clone(instance)),
                SlotState::Failed(message) => {
                    return Err(CreationError::ConcurrentCreationFailed {
                        type_name: format!("Bean {}", bean),
                        message: message.clone(),
                    })
                }
                SlotState::Creating(owner) => *owner,
            };
            if owner == thread::current().id() {
                return Err(CreationError::CircularConstruction {
                    chain: format!("Bean {} -> Bean {}", bean, bean),
                });
            }
            slot.ready.wait(&mut state);
        }
    }

    /// 移除实例，不销毁
    pub fn remove(&self, bean: BeanId) -> Option<ContextualInstance> {
        let instance = self.get(bean)?;
        self.slots.lock().remove(&bean);
        self.order.lock().retain(|id| *id != bean);
        Some(instance)
    }

    /// 取出所有实例，按创建顺序
    pub fn drain(&self) -> Vec<ContextualInstance> {
        let order = std::mem::take(&mut *self.order.lock());
        let mut slots = self.slots.lock();
        let mut instances = Vec::with_capacity(order.len());
        for bean in order {
            if let Some(slot) = slots.remove(&bean) {
                if let SlotState::Ready(instance) = &*slot.state.lock() {
                    instances.push(Arc::clone(instance));
                }
            }
        }
        instances
    }

    /// 已创建的实例个数
    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 单例和应用作用域上下文，在容器的整个生命周期内有效
pub struct SingletonContext {
    scope: String,
    normal: bool,
    store: InstanceStore,
}

impl SingletonContext {
    /// 创建上下文
    pub fn new(scope: impl Into<String>, normal: bool) -> Self {
        Self {
            scope: scope.into(),
            normal,
            store: InstanceStore::new(),
        }
    }

    /// 单例上下文
    pub fn singleton() -> Self {
        Self::new(builtin::SINGLETON, false)
    }

    /// 应用作用域上下文
    pub fn application() -> Self {
        Self::new(builtin::APPLICATION_SCOPED, true)
    }
}

impl Context for SingletonContext {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn is_normal(&self) -> bool {
        self.normal
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get(&self, bean: BeanId) -> Option<ContextualInstance> {
        self.store.get(bean)
    }

    fn get_or_create(
        &self,
        bean: BeanId,
        create: InstanceFactory<'_>,
    ) -> CreationResult<ContextualInstance> {
        self.store.get_or_create(bean, create)
    }

    fn remove(&self, bean: BeanId) -> Option<ContextualInstance> {
        self.store.remove(bean)
    }

    fn drain(&self) -> Vec<ContextualInstance> {
        self.store.drain()
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

struct RequestState {
    id: Uuid,
    store: InstanceStore,
}

/// 请求作用域上下文
///
/// 每个线程独立激活；守卫释放时销毁该线程的请求实例
#[derive(Default)]
pub struct RequestContext {
    states: DashMap<ThreadId, Arc<RequestState>>,
}

impl RequestContext {
    /// 创建上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 在当前线程激活请求上下文
    ///
    /// 已经激活时返回的守卫不拥有请求，释放时不会结束外层请求
    pub fn activate(self: &Arc<Self>) -> RequestContextGuard {
        let thread = thread::current().id();
        let owner = !self.states.contains_key(&thread);
        if owner {
            let id = Uuid::new_v4();
            debug!("激活请求上下文: {}", id);
            self.states.insert(
                thread,
                Arc::new(RequestState {
                    id,
                    store: InstanceStore::new(),
                }),
            );
        }
        RequestContextGuard {
            context: Arc::clone(self),
            owner,
            _not_send: PhantomData,
        }
    }

    /// 当前线程的请求标识
    pub fn request_id(&self) -> Option<Uuid> {
        self.current().map(|state| state.id)
    }

    fn current(&self) -> Option<Arc<RequestState>> {
        self.states
            .get(&thread::current().id())
            .map(|state| Arc::clone(state.value()))
    }

    fn deactivate(&self) {
        if let Some((_, state)) = self.states.remove(&thread::current().id()) {
            let instances = state.store.drain();
            debug!("结束请求上下文: {}, 销毁 {} 个实例", state.id, instances.len());
            for instance in instances.iter().rev() {
                instance.destroy();
            }
        }
    }
}

impl Context for RequestContext {
    fn scope(&self) -> &str {
        builtin::REQUEST_SCOPED
    }

    fn is_active(&self) -> bool {
        self.states.contains_key(&thread::current().id())
    }

    fn get(&self, bean: BeanId) -> Option<ContextualInstance> {
        self.current()?.store.get(bean)
    }

    fn get_or_create(
        &self,
        bean: BeanId,
        create: InstanceFactory<'_>,
    ) -> CreationResult<ContextualInstance> {
        let state = self.current().ok_or_else(|| CreationError::ContextNotActive {
            scope: builtin::REQUEST_SCOPED.to_string(),
        })?;
        state.store.get_or_create(bean, create)
    }

    fn remove(&self, bean: BeanId) -> Option<ContextualInstance> {
        self.current()?.store.remove(bean)
    }

    fn drain(&self) -> Vec<ContextualInstance> {
        let threads: Vec<ThreadId> = self.states.iter().map(|entry| *entry.key()).collect();
        let mut instances = Vec::new();
        for thread in threads {
            if let Some((_, state)) = self.states.remove(&thread) {
                instances.extend(state.store.drain());
            }
        }
        instances
    }

    fn len(&self) -> usize {
        self.current().map(|state| state.store.len()).unwrap_or(0)
    }
}

/// 请求上下文守卫，只能在激活它的线程上释放
pub struct RequestContextGuard {
    context: Arc<RequestContext>,
    owner: bool,
    _not_send: PhantomData<*const ()>,
}

impl RequestContextGuard {
    /// 请求标识
    pub fn request_id(&self) -> Option<Uuid> {
        self.context.request_id()
    }
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        if self.owner {
            self.context.deactivate();
        }
    }
}
