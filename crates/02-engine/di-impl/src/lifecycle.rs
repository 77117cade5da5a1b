//! 注入与生命周期引擎
//!
//! 托管 Bean 的创建顺序固定：
//!
//! 1. 解析构造参数，通过 `AroundConstruct` 链调用构造函数
//! 2. 按祖先优先的顺序注入字段
//! 3. 按祖先优先的顺序调用初始化方法
//! 4. 通过 `PostConstruct` 链执行初始化回调
//! 5. 冻结实例，套上装饰器，发布到上下文
//!
//! 销毁时按相反方向：销毁回调，装饰器，依赖实例（逆序），拦截器实例。
//! 依赖（Dependent）实例由注入它的实例拥有，随所有者一起销毁。

use crate::bean::{Bean, ConstructionStrategy, InjectionPoint, MemberKind, SyntheticCreate, SyntheticDestroy};
use crate::contexts::{RequestContext, RequestContextGuard, SingletonContext};
use crate::interception::{run_chain, InterceptionHandler, InterceptorProvider};
use crate::registry::TypeDescriptor;
use crate::resolution::{ResolvedInterceptor, Resolver};
use di_abstractions::{
    terminal, Arguments, BusinessMethodInvoker, Context, ContextualInstance, FieldMember,
    InstanceHandle, InterceptionKind, InvocationContext, InvocationTarget, Lazy, LazyResolver,
    LifecycleCallback, Link, ProducerMember,
};
use di_common::{
    BeanId, BoxError, BoxedValue, ContainerConfig, CreationError, CreationResult, InvocationError,
    LifecycleState, Marker, SharedInstance, TypeKey,
};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

thread_local! {
    static CREATION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// 当前线程的嵌套创建深度
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> CreationResult<Self> {
        CREATION_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(CreationError::DepthExceeded { depth: limit });
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CREATION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// 一次解析过程中正在创建的 Bean 路径
#[derive(Debug, Default)]
pub struct ResolutionContext {
    path: Vec<(BeanId, String)>,
    detect_cycles: bool,
}

impl ResolutionContext {
    /// 创建解析上下文
    pub fn new(detect_cycles: bool) -> Self {
        Self {
            path: Vec::new(),
            detect_cycles,
        }
    }

    /// 当前路径深度
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    fn check(&self, bean: &Bean) -> CreationResult<()> {
        if !self.detect_cycles {
            return Ok(());
        }
        if let Some(start) = self.path.iter().position(|(id, _)| *id == bean.id()) {
            let mut chain: Vec<&str> = self.path[start..].iter().map(|(_, name)| name.as_str()).collect();
            chain.push(bean.type_name());
            return Err(CreationError::CircularConstruction {
                chain: chain.join(" -> "),
            });
        }
        Ok(())
    }

    fn enter(&mut self, bean: &Bean) -> CreationResult<()> {
        self.check(bean)?;
        self.path.push((bean.id(), bean.type_name().to_string()));
        Ok(())
    }

    fn leave(&mut self) {
        self.path.pop();
    }
}

/// 装饰器委托的来源：按请求类型返回内层引用
type DelegateSource<'a> = &'a dyn Fn(TypeKey) -> Option<BoxedValue>;

fn log_transition(type_name: &str, from: LifecycleState, to: LifecycleState, verbose: bool) {
    if verbose {
        debug!("生命周期状态转换: {} {} -> {}", type_name, from, to);
    } else {
        trace!("生命周期状态转换: {} {} -> {}", type_name, from, to);
    }
}

struct StateTracker<'a> {
    type_name: &'a str,
    state: LifecycleState,
    verbose: bool,
}

impl<'a> StateTracker<'a> {
    fn new(type_name: &'a str, verbose: bool) -> Self {
        Self {
            type_name,
            state: LifecycleState::Uncreated,
            verbose,
        }
    }

    fn advance(&mut self, to: LifecycleState) -> CreationResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(CreationError::IllegalTransition {
                type_name: self.type_name.to_string(),
                from: self.state,
                to,
            });
        }
        log_transition(self.type_name, self.state, to, self.verbose);
        self.state = to;
        Ok(())
    }

    fn advance_through(&mut self, to: LifecycleState) -> CreationResult<()> {
        while self.state < to {
            let next = self.state.next().ok_or(CreationError::IllegalTransition {
                type_name: self.type_name.to_string(),
                from: self.state,
                to,
            })?;
            self.advance(next)?;
        }
        Ok(())
    }
}

enum InstanceKind {
    Managed {
        handler: Arc<InterceptionHandler>,
        intercepts: bool,
    },
    Produced {
        member: ProducerMember,
        declaring: Option<ContextualInstance>,
        owns_declaring: bool,
    },
    Synthetic {
        destroy: Option<SyntheticDestroy>,
    },
}

/// 容器创建的上下文实例
pub struct ManagedInstance {
    bean: Arc<Bean>,
    raw: SharedInstance,
    kind: InstanceKind,
    decorators: OnceCell<Vec<ContextualInstance>>,
    dependents: Mutex<Vec<ContextualInstance>>,
    state: Mutex<LifecycleState>,
    destroyed: AtomicBool,
    destroyed_count: Arc<AtomicUsize>,
    verbose: bool,
}

impl ManagedInstance {
    /// 所属 Bean
    pub fn bean_metadata(&self) -> &Arc<Bean> {
        &self.bean
    }

    /// 业务方法调用是否经过拦截器
    pub fn is_intercepted(&self) -> bool {
        matches!(self.kind, InstanceKind::Managed { intercepts: true, .. })
    }

    /// 装饰器个数
    pub fn decorator_count(&self) -> usize {
        self.decorators.get().map(Vec::len).unwrap_or(0)
    }

    /// 拥有的依赖实例个数
    pub fn dependent_count(&self) -> usize {
        self.dependents.lock().len()
    }

    fn undecorated_reference(&self, key: TypeKey) -> Option<BoxedValue> {
        let binding = self.bean.binding(key)?;
        match &self.kind {
            InstanceKind::Managed {
                handler,
                intercepts: true,
            } if binding.is_interceptable() => {
                let invoker: Arc<dyn BusinessMethodInvoker> = Arc::clone(handler) as Arc<dyn BusinessMethodInvoker>;
                binding.proxy(&self.raw, invoker)
            }
            _ => binding.view(&self.raw),
        }
    }

    fn transition(&self, to: LifecycleState) {
        let mut state = self.state.lock();
        if state.can_transition_to(to) {
            log_transition(self.bean.type_name(), *state, to, self.verbose);
            *state = to;
        } else {
            warn!("忽略非法的生命周期状态转换: {} {} -> {}", self.bean.type_name(), *state, to);
        }
    }

    fn pre_destroy(&self, handler: &InterceptionHandler) {
        let Some(annotated) = self.bean.annotated() else {
            return;
        };
        let callbacks: Vec<&LifecycleCallback> = annotated.levels().pre_destroy_callbacks().collect();
        let chain = match handler.chain(InterceptionKind::PreDestroy, "preDestroy", None) {
            Ok(chain) => chain,
            Err(err) => {
                warn!("组装销毁拦截器链失败: {}, 原因: {}", self.bean.type_name(), err);
                Vec::<Link>::new().into()
            }
        };

        if chain.is_empty() {
            for callback in &callbacks {
                if let Err(err) = callback.invoke(&*self.raw) {
                    error!("销毁回调失败: {}::{}, 原因: {}", self.bean.type_name(), callback.name(), err);
                }
            }
            return;
        }

        let type_name = self.bean.type_name();
        let end = terminal(|ctx: &mut InvocationContext<'_>| {
            let target = ctx.target_any().ok_or_else(|| {
                Box::new(InvocationError::TargetUnavailable {
                    method: "preDestroy".to_string(),
                }) as BoxError
            })?;
            for callback in &callbacks {
                if let Err(err) = callback.invoke(target) {
                    error!("销毁回调失败: {}::{}, 原因: {}", type_name, callback.name(), err);
                }
            }
            Ok(Box::new(()) as BoxedValue)
        });
        let (result, _) = run_chain(
            InterceptionKind::PreDestroy,
            "preDestroy",
            InvocationTarget::Shared(Arc::clone(&self.raw)),
            Vec::new(),
            chain,
            end,
        );
        if let Err(err) = result {
            error!("销毁拦截器链失败: {}, 原因: {}", type_name, err);
        }
    }
}

impl InstanceHandle for ManagedInstance {
    fn bean(&self) -> BeanId {
        self.bean.id()
    }

    fn raw(&self) -> &SharedInstance {
        &self.raw
    }

    fn reference(&self, key: TypeKey) -> Option<BoxedValue> {
        if !key.is_object() {
            if let Some(decorators) = self.decorators.get() {
                if let Some(decorated) = decorators.iter().find_map(|decorator| decorator.reference(key)) {
                    return Some(decorated);
                }
            }
        }
        self.undecorated_reference(key)
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transition(LifecycleState::PreDestroyed);

        match &self.kind {
            InstanceKind::Managed { handler, .. } => self.pre_destroy(handler),
            InstanceKind::Produced {
                member, declaring, ..
            } => {
                let declaring_raw = declaring.as_ref().map(|instance| instance.raw());
                if let Err(err) = member.dispose(declaring_raw, &self.raw) {
                    error!("销毁方法失败: {}, 原因: {}", self.bean.type_name(), err);
                }
            }
            InstanceKind::Synthetic { destroy } => {
                if let Some(destroy) = destroy {
                    destroy(&self.raw);
                }
            }
        }

        if let Some(decorators) = self.decorators.get() {
            for decorator in decorators {
                decorator.destroy();
            }
        }
        let dependents = std::mem::take(&mut *self.dependents.lock());
        for dependent in dependents.iter().rev() {
            dependent.destroy();
        }
        match &self.kind {
            InstanceKind::Managed { handler, .. } => handler.destroy(),
            InstanceKind::Produced {
                declaring: Some(declaring),
                owns_declaring: true,
                ..
            } => declaring.destroy(),
            _ => {}
        }

        self.transition(LifecycleState::Destroyed);
        self.destroyed_count.fetch_add(1, Ordering::SeqCst);
        debug!("销毁实例: {}", self.bean);
    }
}

/// 注入与生命周期引擎
pub struct LifecycleEngine {
    config: ContainerConfig,
    resolver: Arc<Resolver>,
    contexts: RwLock<Vec<Arc<dyn Context>>>,
    request: Arc<RequestContext>,
    detached: Mutex<Vec<ContextualInstance>>,
    created: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
    self_ref: Weak<LifecycleEngine>,
}

impl LifecycleEngine {
    /// 创建引擎并注册内置上下文
    pub fn new(config: ContainerConfig, resolver: Arc<Resolver>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| {
            let request = Arc::new(RequestContext::new());
            let contexts: Vec<Arc<dyn Context>> = vec![
                Arc::new(SingletonContext::singleton()),
                Arc::new(SingletonContext::application()),
                Arc::clone(&request) as Arc<dyn Context>,
            ];
            Self {
                config,
                resolver,
                contexts: RwLock::new(contexts),
                request,
                detached: Mutex::new(Vec::new()),
                created: AtomicUsize::new(0),
                destroyed: Arc::new(AtomicUsize::new(0)),
                self_ref: self_ref.clone(),
            }
        })
    }

    /// 解析引擎
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// 注册自定义作用域上下文，同名作用域会被替换
    pub fn add_context(&self, context: Arc<dyn Context>) {
        let mut contexts = self.contexts.write();
        if let Some(existing) = contexts.iter_mut().find(|existing| existing.scope() == context.scope()) {
            warn!("替换作用域上下文: {}", context.scope());
            *existing = context;
        } else {
            info!("注册作用域上下文: {}", context.scope());
            contexts.push(context);
        }
    }

    /// 获取作用域上下文
    pub fn context(&self, scope: &str) -> Option<Arc<dyn Context>> {
        self.contexts
            .read()
            .iter()
            .find(|context| context.scope() == scope)
            .cloned()
    }

    /// 已注册的作用域
    pub fn scopes(&self) -> Vec<String> {
        self.contexts
            .read()
            .iter()
            .map(|context| context.scope().to_string())
            .collect()
    }

    /// 请求上下文
    pub fn request_context(&self) -> &Arc<RequestContext> {
        &self.request
    }

    /// 在当前线程激活请求上下文
    pub fn activate_request(&self) -> RequestContextGuard {
        self.request.activate()
    }

    /// 已创建的实例个数
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 已销毁的实例个数
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// 作用域中的实例个数
    pub fn active_instances(&self, scope: &str) -> usize {
        self.context(scope).map(|context| context.len()).unwrap_or(0)
    }

    fn provider(&self) -> Weak<dyn InterceptorProvider> {
        self.self_ref.clone()
    }

    fn resolution_context(&self) -> ResolutionContext {
        ResolutionContext::new(self.config.enable_circular_dependency_detection)
    }

    /// 获取 Bean 的上下文实例
    ///
    /// 依赖作用域每次创建新实例，由调用者负责销毁
    pub fn instance(&self, bean: &Arc<Bean>) -> CreationResult<ContextualInstance> {
        let mut resolution = self.resolution_context();
        self.instance_of(bean, &mut resolution)
    }

    /// 获取 Bean 对指定类型的引用
    ///
    /// 依赖作用域的实例在容器关闭时销毁
    pub fn reference(&self, bean: &Arc<Bean>, key: TypeKey) -> CreationResult<BoxedValue> {
        let instance = self.instance(bean)?;
        let reference = instance
            .reference(key)
            .ok_or_else(|| CreationError::type_mismatch(key.name(), bean.type_name()))?;
        if bean.is_dependent() {
            self.detached.lock().push(instance);
        }
        Ok(reference)
    }

    /// 按类型和限定符查找引用
    pub fn lookup(&self, key: TypeKey, qualifiers: &[Marker]) -> CreationResult<BoxedValue> {
        let bean = self.resolver.resolve(key, qualifiers)?;
        self.reference(&bean, key)
    }

    /// 延迟引用，第一次调用 `get` 时才查找
    pub fn lazy<T: ?Sized + Send + Sync + 'static>(&self, qualifiers: &[Marker]) -> Lazy<T> {
        Lazy::new(self.lazy_resolver(TypeKey::of::<T>(), qualifiers.to_vec()))
    }

    fn lazy_resolver(&self, key: TypeKey, qualifiers: Vec<Marker>) -> LazyResolver {
        let engine = self.self_ref.clone();
        Arc::new(move || {
            let engine = engine.upgrade().ok_or(CreationError::ContainerDropped)?;
            engine.lookup(key, &qualifiers)
        })
    }

    fn instance_of(&self, bean: &Arc<Bean>, resolution: &mut ResolutionContext) -> CreationResult<ContextualInstance> {
        if bean.is_dependent() {
            return self.create(bean, resolution, None);
        }
        let context = self.context(bean.scope()).ok_or_else(|| CreationError::UnknownScope {
            scope: bean.scope().to_string(),
        })?;
        if !context.is_active() {
            return Err(CreationError::ContextNotActive {
                scope: bean.scope().to_string(),
            });
        }
        if let Some(existing) = context.get(bean.id()) {
            return Ok(existing);
        }
        resolution.check(bean)?;
        context.get_or_create(bean.id(), &mut || self.create(bean, resolution, None))
    }

    fn create(
        &self,
        bean: &Arc<Bean>,
        resolution: &mut ResolutionContext,
        delegate: Option<DelegateSource<'_>>,
    ) -> CreationResult<ContextualInstance> {
        let _depth = DepthGuard::enter(self.config.max_resolution_depth)?;
        resolution.enter(bean)?;
        let result = match bean.strategy() {
            ConstructionStrategy::Managed {
                descriptor,
                constructor,
            } => self.create_managed(bean, descriptor, *constructor, resolution, delegate),
            ConstructionStrategy::ProducerMethod { declaring, member }
            | ConstructionStrategy::ProducerField { declaring, member } => {
                self.create_produced(bean, *declaring, member, resolution)
            }
            ConstructionStrategy::Synthetic { create, destroy } => self.create_synthetic(bean, create, destroy),
        };
        resolution.leave();
        if result.is_ok() {
            self.created.fetch_add(1, Ordering::SeqCst);
            debug!("创建实例: {}", bean);
        }
        result
    }

    fn resolve_injection_point(
        &self,
        point: &InjectionPoint,
        resolution: &mut ResolutionContext,
        dependents: &mut Vec<ContextualInstance>,
        delegate: Option<DelegateSource<'_>>,
    ) -> CreationResult<BoxedValue> {
        if point.is_delegate() {
            return delegate
                .and_then(|source| source(point.key()))
                .ok_or_else(|| CreationError::InjectionFailed {
                    type_name: point.owner().to_string(),
                    member: point.member().to_string(),
                    source: "委托注入点只能在装饰器创建时解析".into(),
                });
        }
        if point.is_lazy() {
            let resolver = self.lazy_resolver(point.key(), point.qualifiers().to_vec());
            return point.dependency().wrap_lazy(resolver).ok_or_else(|| {
                CreationError::type_mismatch(format!("Lazy<{}>", point.key()), point.key().name())
            });
        }

        let target = self.resolver.resolve(point.key(), point.qualifiers())?;
        let instance = self.instance_of(&target, resolution)?;
        let reference = instance
            .reference(point.key())
            .ok_or_else(|| CreationError::type_mismatch(point.key().name(), target.type_name()))?;
        if target.is_dependent() {
            dependents.push(instance);
        }
        Ok(reference)
    }

    fn resolve_all(
        &self,
        points: impl Iterator<Item = InjectionPoint>,
        resolution: &mut ResolutionContext,
        dependents: &mut Vec<ContextualInstance>,
        delegate: Option<DelegateSource<'_>>,
    ) -> CreationResult<Vec<BoxedValue>> {
        let mut values = Vec::new();
        for point in points {
            values.push(self.resolve_injection_point(&point, resolution, dependents, delegate)?);
        }
        Ok(values)
    }

    fn create_managed(
        &self,
        bean: &Arc<Bean>,
        descriptor: &Arc<TypeDescriptor>,
        constructor: usize,
        resolution: &mut ResolutionContext,
        delegate: Option<DelegateSource<'_>>,
    ) -> CreationResult<ContextualInstance> {
        let mut dependents = Vec::new();
        let handler = Arc::new(InterceptionHandler::new(Arc::clone(bean), self.provider()));
        let built = self.build_managed(bean, descriptor, constructor, resolution, delegate, &handler, &mut dependents);
        let raw = match built {
            Ok(raw) => raw,
            Err(err) => {
                for dependent in dependents.iter().rev() {
                    dependent.destroy();
                }
                handler.destroy();
                return Err(err);
            }
        };

        let instance = Arc::new(ManagedInstance {
            bean: Arc::clone(bean),
            raw,
            kind: InstanceKind::Managed {
                handler,
                intercepts: self.resolver.intercepts_business_methods(bean),
            },
            decorators: OnceCell::new(),
            dependents: Mutex::new(dependents),
            state: Mutex::new(LifecycleState::PostConstructed),
            destroyed: AtomicBool::new(false),
            destroyed_count: Arc::clone(&self.destroyed),
            verbose: self.config.log_lifecycle_transitions,
        });

        let decorators = self.resolver.resolve_decorators(bean);
        if !decorators.is_empty() {
            match self.decorate(&instance, &decorators, resolution) {
                Ok(chain) => {
                    let installed = instance.decorators.set(chain).is_ok();
                    debug_assert!(installed, "装饰器链只能设置一次");
                }
                Err(err) => {
                    instance.destroy();
                    return Err(err);
                }
            }
        }

        instance.transition(LifecycleState::InUse);
        Ok(instance)
    }

    /// 从最内层开始创建装饰器，返回的列表最外层在前
    fn decorate(
        &self,
        instance: &Arc<ManagedInstance>,
        decorators: &[Arc<Bean>],
        resolution: &mut ResolutionContext,
    ) -> CreationResult<Vec<ContextualInstance>> {
        let mut chain: Vec<ContextualInstance> = Vec::new();
        for decorator in decorators.iter().rev() {
            let inner = chain.last().cloned();
            let source = |key: TypeKey| match &inner {
                Some(inner) => inner.reference(key),
                None => instance.undecorated_reference(key),
            };
            match self.create(decorator, resolution, Some(&source)) {
                Ok(created) => chain.push(created),
                Err(err) => {
                    for created in chain.iter().rev() {
                        created.destroy();
                    }
                    return Err(err);
                }
            }
        }
        chain.reverse();
        debug!("装饰实例: {} ({} 个装饰器)", instance.bean, chain.len());
        Ok(chain)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_managed(
        &self,
        bean: &Arc<Bean>,
        descriptor: &Arc<TypeDescriptor>,
        constructor: usize,
        resolution: &mut ResolutionContext,
        delegate: Option<DelegateSource<'_>>,
        handler: &InterceptionHandler,
        dependents: &mut Vec<ContextualInstance>,
    ) -> CreationResult<SharedInstance> {
        let annotated = descriptor.annotated();
        let type_name = bean.type_name();
        let mut tracker = StateTracker::new(type_name, self.config.log_lifecycle_transitions);
        let points_of = |kind: MemberKind| bean.injection_points_of(kind).cloned().collect::<Vec<_>>();

        let values = self.resolve_all(
            points_of(MemberKind::ConstructorParameter).into_iter(),
            resolution,
            dependents,
            delegate,
        )?;
        let constructor = annotated.constructors()[constructor].clone();
        let construct_chain = handler.chain(InterceptionKind::AroundConstruct, "new", None)?;
        let mut instance: BoxedValue = if construct_chain.is_empty() {
            constructor
                .construct(&mut Arguments::new(values))
                .map_err(|err| CreationError::construction_failed(type_name, err))?
        } else {
            // 构造后参数放回上下文，再次构造返回错误
            let end = terminal(move |ctx: &mut InvocationContext<'_>| {
                if ctx.target_any().is_some() {
                    return Err(Box::new(InvocationError::AlreadyConstructed {
                        method: ctx.method().to_string(),
                    }) as BoxError);
                }
                let mut args = Arguments::new(std::mem::take(ctx.parameters_mut()));
                let built = constructor.construct(&mut args);
                *ctx.parameters_mut() = args.into_values();
                ctx.set_target(InvocationTarget::Owned(built?));
                Ok(Box::new(()) as BoxedValue)
            });
            let (result, target) = run_chain(
                InterceptionKind::AroundConstruct,
                "new",
                InvocationTarget::Empty,
                values,
                construct_chain,
                end,
            );
            result.map_err(|err| CreationError::construction_failed(type_name, err))?;
            match target {
                InvocationTarget::Owned(built) => built,
                _ => {
                    return Err(CreationError::construction_failed(
                        type_name,
                        "构造函数拦截器没有完成构造",
                    ))
                }
            }
        };
        tracker.advance(LifecycleState::Constructed)?;

        let fields: Vec<&FieldMember> = annotated.levels().fields().collect();
        for point in points_of(MemberKind::Field) {
            let value = self.resolve_injection_point(&point, resolution, dependents, delegate)?;
            let field = fields.get(point.member_index()).ok_or_else(|| CreationError::InjectionFailed {
                type_name: type_name.to_string(),
                member: point.member().to_string(),
                source: "字段不存在".into(),
            })?;
            field
                .inject(&mut *instance, value)
                .map_err(|err| CreationError::InjectionFailed {
                    type_name: type_name.to_string(),
                    member: point.member().to_string(),
                    source: Box::new(err),
                })?;
        }
        tracker.advance(LifecycleState::FieldsInjected)?;

        let initializer_points = points_of(MemberKind::InitializerParameter);
        for (index, initializer) in annotated.levels().initializers().enumerate() {
            let points = initializer_points
                .iter()
                .filter(|point| point.member_index() == index)
                .cloned();
            let values = self.resolve_all(points, resolution, dependents, delegate)?;
            initializer
                .invoke(&mut *instance, &mut Arguments::new(values))
                .map_err(|err| CreationError::InjectionFailed {
                    type_name: type_name.to_string(),
                    member: initializer.name().to_string(),
                    source: err,
                })?;
        }
        tracker.advance(LifecycleState::MethodsInjected)?;

        let callbacks: Vec<&LifecycleCallback> = annotated.levels().post_construct_callbacks().collect();
        let post_chain = handler.chain(InterceptionKind::PostConstruct, "postConstruct", None)?;
        if post_chain.is_empty() {
            for callback in &callbacks {
                callback
                    .invoke_mut(&mut *instance)
                    .map_err(|err| CreationError::CallbackFailed {
                        type_name: type_name.to_string(),
                        callback: callback.name().to_string(),
                        source: err,
                    })?;
            }
        } else {
            let end = terminal(|ctx: &mut InvocationContext<'_>| {
                let target = ctx.target_any_mut().ok_or_else(|| {
                    Box::new(InvocationError::TargetUnavailable {
                        method: "postConstruct".to_string(),
                    }) as BoxError
                })?;
                for callback in &callbacks {
                    callback.invoke_mut(&mut *target)?;
                }
                Ok(Box::new(()) as BoxedValue)
            });
            let (result, _) = run_chain(
                InterceptionKind::PostConstruct,
                "postConstruct",
                InvocationTarget::Exclusive(&mut *instance),
                Vec::new(),
                post_chain,
                end,
            );
            result.map_err(|err| CreationError::CallbackFailed {
                type_name: type_name.to_string(),
                callback: "postConstruct".to_string(),
                source: err,
            })?;
        }
        tracker.advance(LifecycleState::PostConstructed)?;

        Ok(Arc::from(instance))
    }

    fn create_produced(
        &self,
        bean: &Arc<Bean>,
        declaring: BeanId,
        member: &ProducerMember,
        resolution: &mut ResolutionContext,
    ) -> CreationResult<ContextualInstance> {
        let mut tracker = StateTracker::new(bean.type_name(), self.config.log_lifecycle_transitions);
        let mut dependents = Vec::new();

        let (declaring_instance, declaring_dependent) = if member.is_static() {
            (None, false)
        } else {
            let declaring_bean = self.resolver.bean(declaring).ok_or_else(|| {
                CreationError::construction_failed(bean.type_name(), format!("声明生产者的 Bean 不存在: {}", declaring))
            })?;
            (
                Some(self.instance_of(&declaring_bean, resolution)?),
                declaring_bean.is_dependent(),
            )
        };

        let values = match self.resolve_all(bean.injection_points().iter().cloned(), resolution, &mut dependents, None) {
            Ok(values) => values,
            Err(err) => {
                release_produced(declaring_instance.as_ref(), declaring_dependent, &dependents);
                return Err(err);
            }
        };
        let produced = member.produce(
            declaring_instance.as_ref().map(|instance| instance.raw()),
            &mut Arguments::new(values),
        );
        let raw = match produced {
            Ok(raw) => raw,
            Err(err) => {
                release_produced(declaring_instance.as_ref(), declaring_dependent, &dependents);
                return Err(CreationError::construction_failed(bean.type_name(), err));
            }
        };

        let declaring_instance = if declaring_dependent && !member.disposer_needs_instance() {
            if let Some(instance) = &declaring_instance {
                instance.destroy();
            }
            None
        } else {
            declaring_instance
        };
        tracker.advance_through(LifecycleState::InUse)?;

        Ok(Arc::new(ManagedInstance {
            bean: Arc::clone(bean),
            raw,
            kind: InstanceKind::Produced {
                member: member.clone(),
                owns_declaring: declaring_dependent && declaring_instance.is_some(),
                declaring: declaring_instance,
            },
            decorators: OnceCell::new(),
            dependents: Mutex::new(dependents),
            state: Mutex::new(LifecycleState::InUse),
            destroyed: AtomicBool::new(false),
            destroyed_count: Arc::clone(&self.destroyed),
            verbose: self.config.log_lifecycle_transitions,
        }))
    }

    fn create_synthetic(
        &self,
        bean: &Arc<Bean>,
        create: &SyntheticCreate,
        destroy: &Option<SyntheticDestroy>,
    ) -> CreationResult<ContextualInstance> {
        let mut tracker = StateTracker::new(bean.type_name(), self.config.log_lifecycle_transitions);
        let raw = create().map_err(|err| CreationError::construction_failed(bean.type_name(), err))?;
        tracker.advance_through(LifecycleState::InUse)?;
        Ok(Arc::new(ManagedInstance {
            bean: Arc::clone(bean),
            raw,
            kind: InstanceKind::Synthetic {
                destroy: destroy.clone(),
            },
            decorators: OnceCell::new(),
            dependents: Mutex::new(Vec::new()),
            state: Mutex::new(LifecycleState::InUse),
            destroyed: AtomicBool::new(false),
            destroyed_count: Arc::clone(&self.destroyed),
            verbose: self.config.log_lifecycle_transitions,
        }))
    }

    /// 销毁作用域中的所有实例，返回销毁个数
    pub fn destroy_context(&self, scope: &str) -> usize {
        let Some(context) = self.context(scope) else {
            return 0;
        };
        let instances = context.drain();
        for instance in instances.iter().rev() {
            instance.destroy();
        }
        debug!("销毁作用域上下文: {}, {} 个实例", scope, instances.len());
        instances.len()
    }

    /// 销毁所有实例：先销毁查找得到的依赖实例，再按注册的逆序销毁各作用域
    pub fn shutdown(&self) {
        let detached = std::mem::take(&mut *self.detached.lock());
        for instance in detached.iter().rev() {
            instance.destroy();
        }
        let scopes: Vec<String> = self.scopes().into_iter().rev().collect();
        let mut total = detached.len();
        for scope in scopes {
            total += self.destroy_context(&scope);
        }
        info!("生命周期引擎已关闭, 销毁 {} 个实例", total);
    }
}

fn release_produced(
    declaring: Option<&ContextualInstance>,
    declaring_dependent: bool,
    dependents: &[ContextualInstance],
) {
    for dependent in dependents.iter().rev() {
        dependent.destroy();
    }
    if declaring_dependent {
        if let Some(declaring) = declaring {
            declaring.destroy();
        }
    }
}

impl InterceptorProvider for LifecycleEngine {
    fn interceptors(
        &self,
        bean: &Bean,
        kind: InterceptionKind,
        method: Option<&str>,
    ) -> Arc<[ResolvedInterceptor]> {
        self.resolver.resolve_interceptors(bean, method, kind)
    }

    fn create_interceptor(&self, interceptor: &Arc<Bean>) -> CreationResult<ContextualInstance> {
        let mut resolution = self.resolution_context();
        self.create(interceptor, &mut resolution, None)
    }
}
