//! 容器
//!
//! [`ContainerBuilder::build`] 按固定顺序执行启动流水线，每个阶段都是同步屏障：
//!
//! ```text
//! BeforeDiscovery -> TypeDiscovery -> AfterTypeDiscovery -> BeanDiscovery
//!   -> AfterBeanDiscovery -> Validation -> AfterDeploymentValidation -> Running
//! ```
//!
//! 发现和验证过程中的问题全部累积，只在部署验证检查点统一报告一次。

use crate::bean::{Bean, SyntheticBean};
use crate::contexts::RequestContextGuard;
use crate::events::{EventDispatcher, ObserverInstances};
use crate::extension::{
    AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery, BeforeBeanDiscovery,
    BeforeShutdown, Extension, ProcessType,
};
use crate::lifecycle::LifecycleEngine;
use crate::problems::ProblemCollector;
use crate::registry::{MarkerTypeRegistry, MetadataRegistry, TypeDescriptor, TypeRole};
use crate::resolution::{Enablement, Resolver};
use crate::validation::DeploymentValidator;
use di_abstractions::{
    unbox_reference, AnnotatedType, BeansDescriptor, Context, Event, Lazy, ObserverMember,
    StaticEnvironment, TypeFilter,
};
use di_common::{
    builtin, BoxError, ContainerConfig, ContainerError, ContainerPhase, ContainerResult,
    CreationError, DefinitionError, Marker, MarkerDefinition, MarkerLiteral, TypeKey,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 容器构建器
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    descriptor: BeansDescriptor,
    environment: Option<StaticEnvironment>,
    types: Vec<Arc<dyn AnnotatedType>>,
    markers: Vec<MarkerDefinition>,
    synthetic: Vec<SyntheticBean>,
    observers: Vec<ObserverMember>,
    extensions: Vec<Arc<dyn Extension>>,
    contexts: Vec<Arc<dyn Context>>,
    default_interceptors: Vec<String>,
    filters: Vec<Arc<dyn TypeFilter>>,
}

impl ContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置 Bean 描述
    pub fn with_descriptor(mut self, descriptor: BeansDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// 设置排除条件的求值环境
    ///
    /// 未设置时使用所有待发现类型的名称和进程环境变量
    pub fn with_environment(mut self, environment: StaticEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// 声明标记类型
    pub fn declare_marker(mut self, definition: MarkerDefinition) -> Self {
        self.markers.push(definition);
        self
    }

    /// 声明由派生宏生成的标记类型
    pub fn declare_literal<M: MarkerLiteral>(self) -> Self {
        self.declare_marker(M::definition())
    }

    /// 添加待发现的类型
    pub fn add_type(mut self, annotated: Arc<dyn AnnotatedType>) -> Self {
        self.types.push(annotated);
        self
    }

    /// 添加一组待发现的类型
    pub fn add_types(mut self, types: impl IntoIterator<Item = Arc<dyn AnnotatedType>>) -> Self {
        self.types.extend(types);
        self
    }

    /// 注册合成 Bean
    pub fn add_bean(mut self, bean: SyntheticBean) -> Self {
        self.synthetic.push(bean);
        self
    }

    /// 注册同步观察者
    pub fn observe<E, F>(self, qualifiers: Vec<Marker>, observer: F) -> Self
    where
        E: ?Sized + Send + Sync + 'static,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let member = qualifiers.into_iter().fold(
            ObserverMember::new_static::<E, _>(observer_name::<E>(), observer),
            ObserverMember::qualified,
        );
        self.add_observer(member)
    }

    /// 注册异步观察者
    pub fn observe_async<E, F>(self, qualifiers: Vec<Marker>, observer: F) -> Self
    where
        E: ?Sized + Send + Sync + 'static,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let member = qualifiers.into_iter().fold(
            ObserverMember::new_static::<E, _>(observer_name::<E>(), observer).asynchronous(),
            ObserverMember::qualified,
        );
        self.add_observer(member)
    }

    /// 注册观察者成员
    pub fn add_observer(mut self, observer: ObserverMember) -> Self {
        self.observers.push(observer);
        self
    }

    /// 注册扩展
    pub fn add_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// 添加默认拦截器
    pub fn add_default_interceptor(mut self, name: impl Into<String>) -> Self {
        self.default_interceptors.push(name.into());
        self
    }

    /// 注册自定义作用域上下文
    pub fn add_context(mut self, context: Arc<dyn Context>) -> Self {
        self.contexts.push(context);
        self
    }

    /// 添加类型过滤器，被拒绝的类型不会注册
    pub fn with_type_filter(mut self, filter: Arc<dyn TypeFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// 执行启动流水线
    pub fn build(mut self) -> ContainerResult<Container> {
        let extensions = std::mem::take(&mut self.extensions);
        let container = Container::new(self.config.clone(), extensions);
        container.boot(self)?;
        Ok(container)
    }
}

fn observer_name<E: ?Sized>() -> String {
    format!("observe<{}>", std::any::type_name::<E>())
}

/// 容器统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStats {
    /// 当前阶段
    pub phase: ContainerPhase,
    /// 注册的类型个数
    pub registered_types: usize,
    /// Bean 个数（包括拦截器和装饰器）
    pub beans: usize,
    /// 拦截器个数
    pub interceptors: usize,
    /// 装饰器个数
    pub decorators: usize,
    /// 观察者个数
    pub observers: usize,
    /// 已创建的实例个数
    pub created_instances: usize,
    /// 已销毁的实例个数
    pub destroyed_instances: usize,
    /// 单例和应用作用域中的存活实例个数
    pub active_singletons: usize,
    /// 运行期解析失败次数
    pub resolution_errors: usize,
}

/// 依赖注入容器
pub struct Container {
    config: ContainerConfig,
    markers: Arc<MarkerTypeRegistry>,
    problems: Arc<ProblemCollector>,
    registry: MetadataRegistry,
    resolver: Arc<Resolver>,
    engine: Arc<LifecycleEngine>,
    events: EventDispatcher,
    extensions: Vec<Arc<dyn Extension>>,
    phase: RwLock<ContainerPhase>,
    resolution_errors: AtomicUsize,
}

impl Container {
    /// 创建构建器
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn new(config: ContainerConfig, extensions: Vec<Arc<dyn Extension>>) -> Self {
        let markers = Arc::new(MarkerTypeRegistry::new());
        let problems = Arc::new(ProblemCollector::new());
        let resolver = Arc::new(Resolver::new(Arc::clone(&markers)));
        Self {
            registry: MetadataRegistry::new(Arc::clone(&markers), Arc::clone(&problems)),
            engine: LifecycleEngine::new(config.clone(), Arc::clone(&resolver)),
            events: EventDispatcher::new(Arc::clone(&markers)),
            config,
            markers,
            problems,
            resolver,
            extensions,
            phase: RwLock::new(ContainerPhase::BeforeDiscovery),
            resolution_errors: AtomicUsize::new(0),
        }
    }

    fn boot(&self, builder: ContainerBuilder) -> ContainerResult<()> {
        let ContainerBuilder {
            descriptor,
            environment,
            types,
            markers,
            synthetic,
            observers,
            contexts,
            default_interceptors,
            filters,
            ..
        } = builder;

        info!("容器启动: {} 个待发现类型, {} 个扩展", types.len(), self.extensions.len());
        for definition in markers {
            self.markers.declare(definition);
        }
        self.registry
            .set_discovery_mode(descriptor.discovery_mode.unwrap_or(self.config.discovery_mode));

        let mut event = BeforeBeanDiscovery::new(&self.registry);
        for extension in &self.extensions {
            if let Err(error) = extension.before_bean_discovery(&mut event, self) {
                self.extension_failed(extension.as_ref(), error);
            }
        }
        let mut pending = types;
        pending.extend(event.into_added());

        self.enter(ContainerPhase::TypeDiscovery);
        let environment = environment.unwrap_or_else(|| {
            StaticEnvironment::new(pending.iter().map(|annotated| annotated.name().to_string()))
                .with_process_properties()
        });
        let mut discovered = Vec::new();
        self.discover_types(pending, &descriptor, &environment, &filters, &mut discovered);

        self.enter(ContainerPhase::AfterTypeDiscovery);
        let mut enablement = Enablement {
            alternatives: descriptor.alternatives.clone(),
            interceptors: descriptor.interceptors.clone(),
            decorators: descriptor.decorators.clone(),
            default_interceptors: descriptor.default_interceptors.clone(),
        };
        enablement.default_interceptors.extend(default_interceptors);
        let mut event = AfterTypeDiscovery::new(enablement, discovered.clone());
        for extension in &self.extensions {
            if let Err(error) = extension.after_type_discovery(&mut event, self) {
                self.extension_failed(extension.as_ref(), error);
            }
        }
        let (enablement, added) = event.into_parts();
        self.discover_types(added, &descriptor, &environment, &filters, &mut discovered);
        self.resolver.set_enablement(enablement);

        self.enter(ContainerPhase::BeanDiscovery);
        self.discover_beans();
        for bean in synthetic {
            self.add_synthetic(bean);
        }
        for observer in observers {
            self.events.add_observer(observer, None);
        }
        for context in contexts {
            self.engine.add_context(context);
        }

        self.enter(ContainerPhase::AfterBeanDiscovery);
        let mut event = AfterBeanDiscovery::new(self.resolver.beans());
        for extension in &self.extensions {
            if let Err(error) = extension.after_bean_discovery(&mut event, self) {
                self.extension_failed(extension.as_ref(), error);
            }
        }
        let AfterBeanDiscovery {
            beans,
            observers,
            contexts,
            errors,
            ..
        } = event;
        for bean in beans {
            self.add_synthetic(bean);
        }
        for observer in observers {
            self.events.add_observer(observer, None);
        }
        for context in contexts {
            self.engine.add_context(context);
        }
        for error in errors {
            self.problems.add_definition(error);
        }
        self.resolver.close();

        self.enter(ContainerPhase::Validation);
        if self.config.enable_validation {
            let scopes = self.engine.scopes();
            DeploymentValidator::new(
                &self.resolver,
                &self.problems,
                &scopes,
                self.config.enable_circular_dependency_detection,
            )
            .validate();
        } else {
            warn!("部署验证已关闭");
        }

        self.enter(ContainerPhase::AfterDeploymentValidation);
        let mut event = AfterDeploymentValidation::new();
        for extension in &self.extensions {
            if let Err(error) = extension.after_deployment_validation(&mut event, self) {
                event.add_problem(format!("{}: {}", extension.name(), error));
            }
        }
        for problem in event.into_problems() {
            self.problems.add(problem);
        }
        let problems = self.problems.take();
        if !problems.is_empty() {
            error!("部署失败, 共 {} 个问题", problems.len());
            for problem in &problems {
                error!("部署问题: {}", problem);
            }
            return Err(ContainerError::DeploymentFailed { problems });
        }

        self.enter(ContainerPhase::Running);
        if self.config.eager_singletons {
            if let Err(error) = self.instantiate_eager() {
                error!("立即实例化失败: {}", error);
                self.engine.shutdown();
                self.enter(ContainerPhase::Shutdown);
                return Err(error.into());
            }
        }
        info!(
            "容器启动完成: {} 个类型, {} 个 Bean, {} 个观察者",
            self.registry.len(),
            self.resolver.len(),
            self.events.len()
        );
        Ok(())
    }

    fn enter(&self, phase: ContainerPhase) {
        let previous = std::mem::replace(&mut *self.phase.write(), phase);
        info!("容器阶段: {} -> {}", previous, phase);
    }

    fn extension_failed(&self, extension: &dyn Extension, error: BoxError) {
        warn!("扩展执行失败: {}, 原因: {}", extension.name(), error);
        self.problems
            .add_definition(DefinitionError::extension(format!("{}: {}", extension.name(), error)));
    }

    fn discover_types(
        &self,
        types: Vec<Arc<dyn AnnotatedType>>,
        descriptor: &BeansDescriptor,
        environment: &StaticEnvironment,
        filters: &[Arc<dyn TypeFilter>],
        discovered: &mut Vec<TypeKey>,
    ) {
        for annotated in types {
            let name = annotated.name();
            if !filters.iter().all(|filter| filter.accept(annotated.as_ref())) {
                debug!("类型被过滤: {}", name);
                continue;
            }
            if descriptor.is_excluded(name, environment) {
                debug!("类型被描述文件排除: {}", name);
                continue;
            }

            let mut event = ProcessType::new(&annotated);
            for extension in &self.extensions {
                if let Err(error) = extension.process_type(&mut event) {
                    self.extension_failed(extension.as_ref(), error);
                }
            }
            let key = annotated.type_key();
            if event.is_vetoed() {
                debug!("类型被扩展否决: {}", name);
                self.registry.veto(key);
                continue;
            }

            let registered = self.registry.register(Arc::clone(&annotated));
            if descriptor.trim && !self.survives_trim(&registered) {
                debug!("裁剪类型: {}", name);
                self.registry.veto(key);
                continue;
            }
            if !discovered.contains(&key) {
                discovered.push(key);
            }
        }
    }

    fn survives_trim(&self, descriptor: &TypeDescriptor) -> bool {
        let levels = descriptor.annotated().levels();
        self.registry.has_bean_defining_marker(descriptor)
            || levels.producers().next().is_some()
            || levels.observers().next().is_some()
    }

    fn discover_beans(&self) {
        let classification = self.registry.classify(&self.registry.types());
        let groups = [
            (classification.interceptor_types, TypeRole::Interceptor),
            (classification.decorator_types, TypeRole::Decorator),
            (classification.bean_types, TypeRole::Bean),
        ];
        for (descriptors, role) in groups {
            for descriptor in descriptors {
                match Bean::managed(self.resolver.next_id(), descriptor, role) {
                    Ok(bean) => {
                        let bean = self.resolver.add_bean(bean);
                        if role == TypeRole::Bean {
                            self.discover_members(&bean);
                        }
                    }
                    Err(error) => self.problems.add_definition(error),
                }
            }
        }
    }

    /// 注册 Bean 声明的生产者和观察者
    fn discover_members(&self, bean: &Arc<Bean>) {
        let Some(annotated) = bean.annotated().cloned() else {
            return;
        };
        if !self.resolver.is_enabled(bean) {
            debug!("Bean 未启用, 忽略成员: {}", bean.type_name());
            return;
        }
        for producer in annotated.levels().producers() {
            let (produced, errors) =
                Bean::producer(self.resolver.next_id(), bean, producer.clone(), &self.markers);
            for error in errors {
                self.problems.add_definition(error);
            }
            self.resolver.add_bean(produced);
        }
        for observer in annotated.levels().observers() {
            self.events.add_observer(observer.clone(), Some(Arc::clone(bean)));
        }
    }

    fn add_synthetic(&self, synthetic: SyntheticBean) {
        let (bean, errors) = Bean::synthetic(
            self.resolver.next_id(),
            synthetic,
            &self.markers,
            self.registry.len() + self.resolver.len(),
        );
        for error in errors {
            self.problems.add_definition(error);
        }
        self.resolver.add_bean(bean);
    }

    fn instantiate_eager(&self) -> Result<(), CreationError> {
        for bean in self.resolver.beans() {
            let long_lived = matches!(bean.scope(), builtin::SINGLETON | builtin::APPLICATION_SCOPED);
            if bean.role() == TypeRole::Bean
                && bean.is_eager()
                && long_lived
                && self.resolver.is_enabled(&bean)
            {
                debug!("立即实例化: {}", bean.type_name());
                self.engine.instance(&bean)?;
            }
        }
        Ok(())
    }

    /// 当前阶段
    pub fn phase(&self) -> ContainerPhase {
        *self.phase.read()
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 元数据注册表
    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// 解析引擎
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// 生命周期引擎
    pub fn lifecycle(&self) -> &Arc<LifecycleEngine> {
        &self.engine
    }

    /// 事件分发器
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// 所有 Bean
    pub fn beans(&self) -> Vec<Arc<Bean>> {
        self.resolver.beans()
    }

    fn ensure_running(&self, operation: &str) -> ContainerResult<()> {
        let phase = self.phase();
        if matches!(phase, ContainerPhase::Running | ContainerPhase::ShuttingDown) {
            Ok(())
        } else {
            Err(ContainerError::PhaseViolation {
                operation: operation.to_string(),
                required: ContainerPhase::Running,
                current: phase,
            })
        }
    }

    fn creation_failed(&self, error: CreationError) -> ContainerError {
        match error {
            CreationError::Resolution(source) => ContainerError::Resolution(self.resolution_failed(source)),
            other => ContainerError::Creation(other),
        }
    }

    fn resolution_failed(&self, error: di_common::ResolutionError) -> di_common::ResolutionError {
        self.resolution_errors.fetch_add(1, Ordering::SeqCst);
        warn!("解析失败: {}", error);
        error
    }

    /// 解析唯一的 Bean
    ///
    /// Bean 发现结束之前调用返回阶段错误
    pub fn resolve(&self, key: TypeKey, qualifiers: &[Marker]) -> ContainerResult<Arc<Bean>> {
        let phase = self.phase();
        if !phase.allows_resolution() {
            return Err(ContainerError::PhaseViolation {
                operation: format!("resolve {}", key),
                required: ContainerPhase::AfterBeanDiscovery,
                current: phase,
            });
        }
        self.resolver
            .resolve(key, qualifiers)
            .map_err(|error| ContainerError::Resolution(self.resolution_failed(error)))
    }

    /// 获取类型 `T` 的引用
    pub fn select<T: ?Sized + Send + Sync + 'static>(&self, qualifiers: &[Marker]) -> ContainerResult<Arc<T>> {
        self.ensure_running("select")?;
        let key = TypeKey::of::<T>();
        let value = self
            .engine
            .lookup(key, qualifiers)
            .map_err(|error| self.creation_failed(error))?;
        unbox_reference::<T>(value)
            .ok_or_else(|| CreationError::type_mismatch(key.name(), "unknown").into())
    }

    /// 获取类型 `T` 的所有已启用 Bean 的引用
    pub fn select_all<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifiers: &[Marker],
    ) -> ContainerResult<Vec<Arc<T>>> {
        self.ensure_running("select_all")?;
        let key = TypeKey::of::<T>();
        self.resolver
            .resolve_all(key, qualifiers)
            .iter()
            .map(|bean| self.typed_reference::<T>(bean))
            .collect()
    }

    /// 按名称获取引用
    pub fn select_by_name<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.ensure_running("select_by_name")?;
        let bean = self
            .resolver
            .resolve_by_name(name)
            .map_err(|error| ContainerError::Resolution(self.resolution_failed(error)))?;
        self.typed_reference::<T>(&bean)
    }

    fn typed_reference<T: ?Sized + Send + Sync + 'static>(&self, bean: &Arc<Bean>) -> ContainerResult<Arc<T>> {
        let key = TypeKey::of::<T>();
        let value = self
            .engine
            .reference(bean, key)
            .map_err(|error| self.creation_failed(error))?;
        unbox_reference::<T>(value)
            .ok_or_else(|| CreationError::type_mismatch(key.name(), bean.type_name()).into())
    }

    /// 延迟引用，第一次调用 `get` 时才解析
    pub fn lazy<T: ?Sized + Send + Sync + 'static>(&self, qualifiers: &[Marker]) -> Lazy<T> {
        self.engine.lazy::<T>(qualifiers)
    }

    /// 同步触发事件，返回通知的观察者个数
    pub fn fire<E: Event>(&self, event: E, qualifiers: &[Marker]) -> ContainerResult<usize> {
        if self.phase() != ContainerPhase::Running {
            return Err(ContainerError::PhaseViolation {
                operation: "fire".to_string(),
                required: ContainerPhase::Running,
                current: self.phase(),
            });
        }
        Ok(self.events.fire(self.engine.as_ref(), Arc::new(event), qualifiers)?)
    }

    /// 异步触发事件，返回通知的观察者个数
    pub async fn fire_async<E: Event>(&self, event: E, qualifiers: &[Marker]) -> ContainerResult<usize> {
        if self.phase() != ContainerPhase::Running {
            return Err(ContainerError::PhaseViolation {
                operation: "fire_async".to_string(),
                required: ContainerPhase::Running,
                current: self.phase(),
            });
        }
        let instances: Arc<dyn ObserverInstances> = Arc::clone(&self.engine) as Arc<dyn ObserverInstances>;
        Ok(self
            .events
            .fire_async(instances, Arc::new(event), qualifiers)
            .await?)
    }

    /// 在当前线程激活请求上下文，守卫释放时销毁请求作用域的实例
    pub fn activate_request_context(&self) -> RequestContextGuard {
        self.engine.activate_request()
    }

    /// 销毁作用域中的所有实例，返回销毁个数
    pub fn destroy_context(&self, scope: &str) -> usize {
        self.engine.destroy_context(scope)
    }

    /// 关闭容器
    ///
    /// 通知扩展和 `BeforeShutdown` 观察者，然后销毁所有上下文中的实例；重复调用无效
    pub fn shutdown(&self) {
        {
            let mut phase = self.phase.write();
            if *phase != ContainerPhase::Running {
                return;
            }
            *phase = ContainerPhase::ShuttingDown;
        }
        info!("容器关闭中");
        for extension in &self.extensions {
            extension.before_shutdown(&BeforeShutdown, self);
        }
        if let Err(error) = self
            .events
            .fire(self.engine.as_ref(), Arc::new(BeforeShutdown), &[])
        {
            warn!("关闭事件观察者执行失败: {}", error);
        }
        self.engine.shutdown();
        self.enter(ContainerPhase::Shutdown);
    }

    /// 统计信息
    pub fn stats(&self) -> ContainerStats {
        let beans = self.resolver.beans();
        let count_role = |role: TypeRole| beans.iter().filter(|bean| bean.role() == role).count();
        ContainerStats {
            phase: self.phase(),
            registered_types: self.registry.len(),
            beans: beans.len(),
            interceptors: count_role(TypeRole::Interceptor),
            decorators: count_role(TypeRole::Decorator),
            observers: self.events.len(),
            created_instances: self.engine.created_count(),
            destroyed_instances: self.engine.destroyed_count(),
            active_singletons: self.engine.active_instances(builtin::SINGLETON)
                + self.engine.active_instances(builtin::APPLICATION_SCOPED),
            resolution_errors: self.resolution_errors.load(Ordering::SeqCst),
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{ComponentType, Dependency, ExcludeFilter};
    use di_common::{DeploymentProblem, ResolutionError};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    #[derive(Default)]
    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            42
        }
    }

    struct Reporter {
        clock: Arc<dyn Clock>,
    }

    impl std::fmt::Debug for Reporter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Reporter").finish_non_exhaustive()
        }
    }

    #[derive(Default)]
    struct Warmup;

    #[derive(Default)]
    struct Unmarked;

    fn clock_type() -> Arc<dyn AnnotatedType> {
        ComponentType::builder::<FixedClock>()
            .marker(Marker::application_scoped())
            .implements::<dyn Clock>(|clock| clock as Arc<dyn Clock>)
            .with_default()
            .build()
    }

    fn reporter_type() -> Arc<dyn AnnotatedType> {
        ComponentType::builder::<Reporter>()
            .marker(Marker::dependent())
            .inject_constructor(vec![Dependency::of::<dyn Clock>()], |args| {
                Ok(Reporter {
                    clock: args.reference::<dyn Clock>(0)?,
                })
            })
            .build()
    }

    #[derive(Default)]
    struct PhaseProbe {
        seen: Mutex<Vec<(ContainerPhase, bool)>>,
    }

    impl Extension for PhaseProbe {
        fn after_type_discovery(
            &self,
            _event: &mut AfterTypeDiscovery,
            container: &Container,
        ) -> Result<(), BoxError> {
            let result = container.resolve(TypeKey::of::<dyn Clock>(), &[]);
            self.seen.lock().push((
                container.phase(),
                matches!(result, Err(ContainerError::PhaseViolation { .. })),
            ));
            Ok(())
        }

        fn after_bean_discovery(
            &self,
            event: &mut AfterBeanDiscovery,
            container: &Container,
        ) -> Result<(), BoxError> {
            let result = container.resolve(TypeKey::of::<dyn Clock>(), &[]);
            self.seen.lock().push((container.phase(), result.is_ok()));
            event.add_bean(SyntheticBean::from_instance(Arc::new(Warmup)));
            Ok(())
        }
    }

    #[test]
    fn test_boot_and_select() {
        let container = Container::builder()
            .add_type(clock_type())
            .add_type(reporter_type())
            .build()
            .unwrap();

        assert_eq!(container.phase(), ContainerPhase::Running);
        let reporter = container.select::<Reporter>(&[]).unwrap();
        assert_eq!(reporter.clock.now(), 42);
        let clocks = container.select_all::<dyn Clock>(&[]).unwrap();
        assert_eq!(clocks.len(), 1);

        let stats = container.stats();
        assert_eq!(stats.registered_types, 2);
        assert_eq!(stats.beans, 2);
        assert_eq!(stats.active_singletons, 1);
    }

    #[test]
    fn test_resolution_is_phase_checked() {
        let probe = Arc::new(PhaseProbe::default());
        let container = Container::builder()
            .add_type(clock_type())
            .add_extension(Arc::clone(&probe) as Arc<dyn Extension>)
            .build()
            .unwrap();

        assert_eq!(
            *probe.seen.lock(),
            vec![
                (ContainerPhase::AfterTypeDiscovery, true),
                (ContainerPhase::AfterBeanDiscovery, true)
            ]
        );
        assert!(container.select::<Warmup>(&[]).is_ok());
    }

    #[test]
    fn test_deployment_failure_reports_all_problems_once() {
        let result = Container::builder()
            .add_type(reporter_type())
            .add_type(
                ComponentType::builder::<Warmup>()
                    .marker(Marker::application_scoped())
                    .inject_constructor(vec![Dependency::of::<dyn Clock>()], |_| Ok(Warmup))
                    .build(),
            )
            .build();

        let error = match result {
            Err(error) => error,
            Ok(_) => panic!("deployment should fail"),
        };
        let problems = error.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|problem| matches!(
            problem,
            DeploymentProblem::Resolution { source, .. } if source.is_unsatisfied()
        )));
    }

    #[test]
    fn test_runtime_resolution_errors_are_counted() {
        let container = Container::builder().add_type(clock_type()).build().unwrap();

        let error = container.select::<Reporter>(&[]).unwrap_err();
        assert!(matches!(
            error,
            ContainerError::Resolution(ResolutionError::Unsatisfied { .. })
        ));
        assert_eq!(container.stats().resolution_errors, 1);
    }

    #[test]
    fn test_eager_singletons_start_with_container() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let container = Container::builder()
            .add_type(
                ComponentType::builder::<Warmup>()
                    .marker(Marker::singleton())
                    .marker(Marker::new(builtin::EAGER))
                    .no_args(|| {
                        BUILT.fetch_add(1, Ordering::SeqCst);
                        Warmup
                    })
                    .build(),
            )
            .build()
            .unwrap();

        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        container.select::<Warmup>(&[]).unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_notifies_and_blocks_further_lookups() {
        let notified = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&notified);
        let container = Container::builder()
            .add_type(clock_type())
            .observe::<BeforeShutdown, _>(Vec::new(), move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();
        container.select::<dyn Clock>(&[]).unwrap();

        container.shutdown();
        container.shutdown();

        assert!(notified.load(Ordering::SeqCst));
        assert_eq!(container.phase(), ContainerPhase::Shutdown);
        assert_eq!(container.stats().destroyed_instances, 1);
        assert!(matches!(
            container.select::<dyn Clock>(&[]),
            Err(ContainerError::PhaseViolation { .. })
        ));
        assert!(matches!(
            container.fire("late".to_string(), &[]),
            Err(ContainerError::PhaseViolation { .. })
        ));
    }

    #[test]
    fn test_descriptor_excludes_and_trim() {
        let container = Container::builder()
            .with_config(ContainerConfig::default().with_discovery_mode(di_common::DiscoveryMode::All))
            .with_descriptor(
                BeansDescriptor::new()
                    .with_trim(true)
                    .exclude(ExcludeFilter::new(std::any::type_name::<Warmup>())),
            )
            .add_type(clock_type())
            .add_type(ComponentType::builder::<Warmup>().with_default().build())
            .add_type(ComponentType::builder::<Unmarked>().with_default().build())
            .build()
            .unwrap();

        assert!(container.select::<dyn Clock>(&[]).is_ok());
        assert!(container.select::<Warmup>(&[]).is_err());
        assert!(container.select::<Unmarked>(&[]).is_err());
        assert_eq!(container.stats().registered_types, 2);
    }

    #[test]
    fn test_type_filter_rejects_types() {
        let container = Container::builder()
            .add_type(clock_type())
            .with_type_filter(Arc::new(|annotated: &dyn AnnotatedType| {
                !annotated.name().ends_with("FixedClock")
            }))
            .build()
            .unwrap();

        assert_eq!(container.stats().registered_types, 0);
    }
}
