//! 拦截器链
//!
//! 每个被拦截的实例持有一个 [`InterceptionHandler`]：拦截器实例随目标实例创建和销毁，
//! 每个（拦截类型，方法）的链接列表在第一次调用时组装并缓存。

use crate::bean::Bean;
use crate::registry::TypeRole;
use crate::resolution::ResolvedInterceptor;
use dashmap::DashMap;
use di_abstractions::{
    BusinessMethodInvoker, ContextualInstance, InterceptionKind, InvocationContext, InvocationResult,
    InvocationTarget, Link, Terminal,
};
use di_common::{BeanId, BoxError, BoxedValue, CreationError, CreationResult, SharedInstance};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// 拦截器链的链接列表
pub type InterceptorChain = Arc<[Link]>;

/// 拦截器的来源
///
/// 由生命周期引擎实现：解析有效拦截器并创建拦截器实例
pub trait InterceptorProvider: Send + Sync {
    /// 调用的有效拦截器，按执行顺序
    fn interceptors(
        &self,
        bean: &Bean,
        kind: InterceptionKind,
        method: Option<&str>,
    ) -> Arc<[ResolvedInterceptor]>;

    /// 为被拦截的实例创建一个拦截器实例
    fn create_interceptor(&self, interceptor: &Arc<Bean>) -> CreationResult<ContextualInstance>;
}

/// 执行拦截器链，返回结果和链结束时的调用目标
pub fn run_chain<'a>(
    kind: InterceptionKind,
    method: &str,
    target: InvocationTarget<'a>,
    parameters: Vec<BoxedValue>,
    links: InterceptorChain,
    terminal: Terminal<'a>,
) -> (InvocationResult, InvocationTarget<'a>) {
    trace!("执行拦截器链: {} {} ({} 个链接)", kind, method, links.len());
    let mut ctx = InvocationContext::new(kind, method, target, parameters, links, terminal);
    let result = ctx.proceed();
    let target = ctx.take_target();
    (result, target)
}

/// 被拦截实例的拦截处理器
pub struct InterceptionHandler {
    bean: Arc<Bean>,
    provider: Weak<dyn InterceptorProvider>,
    instances: Mutex<HashMap<BeanId, ContextualInstance>>,
    order: Mutex<Vec<BeanId>>,
    chains: DashMap<(InterceptionKind, String), InterceptorChain>,
    destroyed: AtomicBool,
}

impl InterceptionHandler {
    /// 创建拦截处理器
    pub fn new(bean: Arc<Bean>, provider: Weak<dyn InterceptorProvider>) -> Self {
        Self {
            bean,
            provider,
            instances: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            chains: DashMap::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// 被拦截的 Bean
    pub fn bean(&self) -> &Arc<Bean> {
        &self.bean
    }

    /// 组装（或从缓存获取）拦截器链
    ///
    /// 业务方法拦截时，目标类自身声明的拦截方法排在最后，`target` 为目标实例
    pub fn chain(
        &self,
        kind: InterceptionKind,
        method: &str,
        target: Option<&SharedInstance>,
    ) -> CreationResult<InterceptorChain> {
        self.ensure_live()?;
        let cache_key = (kind, method.to_string());
        if let Some(chain) = self.chains.get(&cache_key) {
            return Ok(Arc::clone(&chain));
        }

        let provider = self.provider.upgrade().ok_or(CreationError::ContainerDropped)?;
        let member = match kind {
            InterceptionKind::AroundInvoke | InterceptionKind::AroundTimeout => Some(method),
            _ => None,
        };
        let mut links = Vec::new();
        for resolved in provider.interceptors(&self.bean, kind, member).iter() {
            let instance = self.interceptor_instance(provider.as_ref(), &resolved.bean)?;
            for interceptor_method in &resolved.methods {
                links.push(Link::new(
                    format!("{}::{}", resolved.bean.type_name(), interceptor_method.name()),
                    Arc::clone(instance.raw()),
                    Arc::clone(interceptor_method.handler()),
                ));
            }
        }

        if let (Some(target), Some(annotated)) = (target, self.bean.annotated()) {
            if self.bean.role() == TypeRole::Bean
                && matches!(kind, InterceptionKind::AroundInvoke | InterceptionKind::AroundTimeout)
            {
                for own in annotated
                    .levels()
                    .interceptor_methods()
                    .filter(|own| own.kind() == kind)
                {
                    links.push(Link::new(
                        format!("{}::{}", self.bean.type_name(), own.name()),
                        Arc::clone(target),
                        Arc::clone(own.handler()),
                    ));
                }
            }
        }

        let chain: InterceptorChain = links.into();
        debug!(
            "组装拦截器链: {} {} {} -> {:?}",
            self.bean.type_name(),
            kind,
            method,
            chain.iter().map(Link::name).collect::<Vec<_>>()
        );
        self.chains.insert(cache_key, Arc::clone(&chain));
        Ok(chain)
    }

    fn interceptor_instance(
        &self,
        provider: &dyn InterceptorProvider,
        interceptor: &Arc<Bean>,
    ) -> CreationResult<ContextualInstance> {
        if let Some(instance) = self.instances.lock().get(&interceptor.id()) {
            return Ok(Arc::clone(instance));
        }
        let created = provider.create_interceptor(interceptor)?;
        let mut instances = self.instances.lock();
        if self.is_destroyed() {
            drop(instances);
            created.destroy();
            return Err(self.destroyed_error());
        }
        if let Some(existing) = instances.get(&interceptor.id()) {
            let existing = Arc::clone(existing);
            drop(instances);
            created.destroy();
            return Ok(existing);
        }
        instances.insert(interceptor.id(), Arc::clone(&created));
        self.order.lock().push(interceptor.id());
        Ok(created)
    }

    /// 已创建的拦截器实例个数
    pub fn interceptor_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// 是否已销毁
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn destroyed_error(&self) -> CreationError {
        CreationError::InstanceDestroyed {
            type_name: self.bean.type_name().to_string(),
        }
    }

    fn ensure_live(&self) -> CreationResult<()> {
        if self.is_destroyed() {
            return Err(self.destroyed_error());
        }
        Ok(())
    }

    /// 销毁拦截器实例，按创建的逆序
    ///
    /// 销毁后组装链或调用业务方法返回 [`CreationError::InstanceDestroyed`]
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        let (order, mut instances) = {
            let mut instances = self.instances.lock();
            (
                std::mem::take(&mut *self.order.lock()),
                std::mem::take(&mut *instances),
            )
        };
        for id in order.iter().rev() {
            if let Some(instance) = instances.remove(id) {
                instance.destroy();
            }
        }
        self.chains.clear();
    }
}

impl BusinessMethodInvoker for InterceptionHandler {
    fn invoke(
        &self,
        target: &SharedInstance,
        kind: InterceptionKind,
        method: &str,
        parameters: Vec<BoxedValue>,
        terminal: Terminal<'_>,
    ) -> InvocationResult {
        let links = self
            .chain(kind, method, Some(target))
            .map_err(|error| Box::new(error) as BoxError)?;
        let (result, _) = run_chain(
            kind,
            method,
            InvocationTarget::Shared(Arc::clone(target)),
            parameters,
            links,
            terminal,
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::SyntheticBean;
    use crate::registry::MarkerTypeRegistry;
    use di_abstractions::{terminal, InstanceHandle, InterceptorMethod};
    use di_common::{LifecycleState, TypeKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Audit {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    struct Handle {
        bean: BeanId,
        raw: SharedInstance,
        destroyed: Arc<AtomicUsize>,
    }

    impl InstanceHandle for Handle {
        fn bean(&self) -> BeanId {
            self.bean
        }

        fn raw(&self) -> &SharedInstance {
            &self.raw
        }

        fn reference(&self, _key: TypeKey) -> Option<BoxedValue> {
            None
        }

        fn state(&self) -> LifecycleState {
            LifecycleState::InUse
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeProvider {
        resolved: Arc<[ResolvedInterceptor]>,
        log: Arc<Mutex<Vec<String>>>,
        created: AtomicUsize,
        destroyed: Arc<AtomicUsize>,
    }

    impl InterceptorProvider for FakeProvider {
        fn interceptors(
            &self,
            _bean: &Bean,
            _kind: InterceptionKind,
            _method: Option<&str>,
        ) -> Arc<[ResolvedInterceptor]> {
            Arc::clone(&self.resolved)
        }

        fn create_interceptor(&self, interceptor: &Arc<Bean>) -> CreationResult<ContextualInstance> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let label = if interceptor.id() == BeanId(1) { "outer" } else { "inner" };
            Ok(Arc::new(Handle {
                bean: interceptor.id(),
                raw: Arc::new(Audit {
                    label,
                    log: Arc::clone(&self.log),
                }),
                destroyed: Arc::clone(&self.destroyed),
            }))
        }
    }

    fn bean(id: usize) -> Arc<Bean> {
        let markers = MarkerTypeRegistry::new();
        let (bean, _) = Bean::synthetic(
            BeanId(id),
            SyntheticBean::from_instance(Arc::new(id)),
            &markers,
            id,
        );
        Arc::new(bean)
    }

    fn audit_method() -> InterceptorMethod {
        InterceptorMethod::new::<Audit, _>(InterceptionKind::AroundInvoke, "audit", |audit, ctx| {
            audit.log.lock().push(format!("{}:{}", audit.label, ctx.method()));
            ctx.proceed()
        })
    }

    #[test]
    fn test_chain_runs_interceptors_in_order_and_caches_instances() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let provider: Arc<dyn InterceptorProvider> = Arc::new(FakeProvider {
            resolved: vec![
                ResolvedInterceptor {
                    bean: bean(1),
                    methods: vec![audit_method()],
                },
                ResolvedInterceptor {
                    bean: bean(2),
                    methods: vec![audit_method()],
                },
            ]
            .into(),
            log: Arc::clone(&log),
            created: AtomicUsize::new(0),
            destroyed: Arc::clone(&destroyed),
        });
        let handler = InterceptionHandler::new(bean(0), Arc::downgrade(&provider));
        let target: SharedInstance = Arc::new(0_usize);

        for _ in 0..2 {
            let result = handler
                .invoke(
                    &target,
                    InterceptionKind::AroundInvoke,
                    "work",
                    Vec::new(),
                    terminal(|_| Ok(Box::new(7_i32))),
                )
                .unwrap();
            assert_eq!(*result.downcast::<i32>().unwrap(), 7);
        }

        assert_eq!(
            *log.lock(),
            vec!["outer:work", "inner:work", "outer:work", "inner:work"]
        );
        assert_eq!(handler.interceptor_count(), 2);

        handler.destroy();
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(handler.interceptor_count(), 0);
    }

    #[test]
    fn test_destroyed_handler_rejects_invocation() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(FakeProvider {
            resolved: vec![ResolvedInterceptor {
                bean: bean(1),
                methods: vec![audit_method()],
            }]
            .into(),
            log: Arc::new(Mutex::new(Vec::new())),
            created: AtomicUsize::new(0),
            destroyed: Arc::clone(&destroyed),
        });
        let shared: Arc<dyn InterceptorProvider> = provider.clone();
        let handler = InterceptionHandler::new(bean(0), Arc::downgrade(&shared));
        let target: SharedInstance = Arc::new(0_usize);
        let work = |handler: &InterceptionHandler| {
            handler.invoke(
                &target,
                InterceptionKind::AroundInvoke,
                "work",
                Vec::new(),
                terminal(|_| Ok(Box::new(()))),
            )
        };

        work(&handler).unwrap();
        handler.destroy();
        assert!(handler.is_destroyed());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        let error = work(&handler).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CreationError>(),
            Some(CreationError::InstanceDestroyed { .. })
        ));
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
        assert_eq!(handler.interceptor_count(), 0);
    }

    #[test]
    fn test_dropped_provider_fails_invocation() {
        let provider: Arc<dyn InterceptorProvider> = Arc::new(FakeProvider {
            resolved: Vec::new().into(),
            log: Arc::new(Mutex::new(Vec::new())),
            created: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
        });
        let handler = InterceptionHandler::new(bean(0), Arc::downgrade(&provider));
        drop(provider);

        let target: SharedInstance = Arc::new(0_usize);
        let error = handler
            .invoke(
                &target,
                InterceptionKind::AroundInvoke,
                "work",
                Vec::new(),
                terminal(|_| Ok(Box::new(()))),
            )
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CreationError>(),
            Some(CreationError::ContainerDropped)
        ));
    }
}
