//! 类型安全解析
//!
//! 按（类型，限定符集合）选择唯一的 Bean，按 Bean 和调用成员选择有序的拦截器，
//! 按 Bean 选择装饰器。Bean 发现结束后（[`Resolver::close`]）结果会被缓存。

use crate::bean::Bean;
use crate::registry::{MarkerTypeRegistry, TypeRole};
use dashmap::DashMap;
use di_abstractions::{InterceptionKind, InterceptorMethod};
use di_common::{builtin, format_markers, BeanId, Marker, ResolutionError, TypeKey};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 启用配置
///
/// 名称可以是类型全名或简短名称；备选列表中也可以写构造型名称
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enablement {
    /// 启用的备选
    pub alternatives: Vec<String>,
    /// 启用的拦截器，按列表顺序排在优先级拦截器之后
    pub interceptors: Vec<String>,
    /// 启用的装饰器
    pub decorators: Vec<String>,
    /// 默认拦截器，作用于所有 Bean
    pub default_interceptors: Vec<String>,
}

/// 已解析的拦截器
#[derive(Debug, Clone)]
pub struct ResolvedInterceptor {
    /// 拦截器 Bean
    pub bean: Arc<Bean>,
    /// 该拦截类型的处理方法，祖先优先
    pub methods: Vec<InterceptorMethod>,
}

type ResolutionKey = (TypeKey, Vec<Marker>);
type InterceptorKey = (BeanId, Option<String>, InterceptionKind);

#[derive(Default)]
struct BeanTable {
    beans: Vec<Arc<Bean>>,
    by_type: HashMap<TypeKey, Vec<usize>>,
}

/// 解析引擎
pub struct Resolver {
    markers: Arc<MarkerTypeRegistry>,
    table: RwLock<BeanTable>,
    enablement: RwLock<Enablement>,
    closed: AtomicBool,
    cache: DashMap<ResolutionKey, Result<Arc<Bean>, ResolutionError>>,
    interceptor_cache: DashMap<InterceptorKey, Arc<[ResolvedInterceptor]>>,
    decorator_cache: DashMap<BeanId, Arc<[Arc<Bean>]>>,
}

impl Resolver {
    /// 创建解析引擎
    pub fn new(markers: Arc<MarkerTypeRegistry>) -> Self {
        Self {
            markers,
            table: RwLock::new(BeanTable::default()),
            enablement: RwLock::new(Enablement::default()),
            closed: AtomicBool::new(false),
            cache: DashMap::new(),
            interceptor_cache: DashMap::new(),
            decorator_cache: DashMap::new(),
        }
    }

    /// 标记类型注册表
    pub fn markers(&self) -> &Arc<MarkerTypeRegistry> {
        &self.markers
    }

    /// 下一个 Bean 标识
    pub fn next_id(&self) -> BeanId {
        BeanId(self.table.read().beans.len())
    }

    /// 添加 Bean，返回共享引用
    pub fn add_bean(&self, bean: Bean) -> Arc<Bean> {
        let bean = Arc::new(bean);
        let mut table = self.table.write();
        let position = table.beans.len();
        for binding in bean.types() {
            table.by_type.entry(binding.key()).or_default().push(position);
        }
        debug!("添加 Bean: {}", bean);
        table.beans.push(Arc::clone(&bean));
        bean
    }

    /// 设置启用配置
    pub fn set_enablement(&self, enablement: Enablement) {
        *self.enablement.write() = enablement;
    }

    /// 当前启用配置
    pub fn enablement(&self) -> Enablement {
        self.enablement.read().clone()
    }

    /// 结束 Bean 发现，之后的解析结果会被缓存
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Bean 发现是否已结束
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 所有 Bean，按添加顺序
    pub fn beans(&self) -> Vec<Arc<Bean>> {
        self.table.read().beans.clone()
    }

    /// 按标识获取 Bean
    pub fn bean(&self, id: BeanId) -> Option<Arc<Bean>> {
        self.table.read().beans.get(id.0).cloned()
    }

    /// Bean 个数
    pub fn len(&self) -> usize {
        self.table.read().beans.len()
    }

    /// 是否没有 Bean
    pub fn is_empty(&self) -> bool {
        self.table.read().beans.is_empty()
    }

    /// Bean 是否已启用
    ///
    /// 备选需要优先级或出现在启用列表中；拦截器和装饰器同理，
    /// 默认拦截器总是启用
    pub fn is_enabled(&self, bean: &Bean) -> bool {
        let enablement = self.enablement.read();
        let listed = |names: &[String]| names.iter().any(|name| bean.matches_name(name));
        match bean.role() {
            TypeRole::Bean => {
                !bean.is_alternative()
                    || bean.priority().is_some()
                    || listed(&enablement.alternatives)
                    || bean.stereotypes().iter().any(|stereotype| {
                        enablement
                            .alternatives
                            .iter()
                            .any(|name| name.as_str() == stereotype.kind())
                    })
            }
            TypeRole::Interceptor => {
                bean.priority().is_some()
                    || listed(&enablement.interceptors)
                    || listed(&enablement.default_interceptors)
            }
            TypeRole::Decorator => bean.priority().is_some() || listed(&enablement.decorators),
        }
    }

    /// 解析唯一的 Bean
    ///
    /// 限定符为空时要求 `Default`
    pub fn resolve(&self, key: TypeKey, qualifiers: &[Marker]) -> Result<Arc<Bean>, ResolutionError> {
        let required = normalize(qualifiers);
        if self.is_closed() {
            let cache_key = (key, required.clone());
            if let Some(cached) = self.cache.get(&cache_key) {
                return cached.clone();
            }
            let result = self.resolve_uncached(key, &required);
            self.cache.insert(cache_key, result.clone());
            return result;
        }
        self.resolve_uncached(key, &required)
    }

    fn resolve_uncached(&self, key: TypeKey, required: &[Marker]) -> Result<Arc<Bean>, ResolutionError> {
        let candidates = self.candidates(key, required);
        let result = self.disambiguate(candidates, || key.name().to_string(), required);
        if let Err(error) = &result {
            warn!("依赖解析失败: {}", error);
        }
        result
    }

    fn candidates(&self, key: TypeKey, required: &[Marker]) -> Vec<Arc<Bean>> {
        let table = self.table.read();
        let Some(positions) = table.by_type.get(&key) else {
            return Vec::new();
        };
        positions
            .iter()
            .map(|position| &table.beans[*position])
            .filter(|bean| bean.role() == TypeRole::Bean)
            .filter(|bean| self.markers.is_subset(required, bean.qualifiers()))
            .filter(|bean| self.is_enabled(bean))
            .cloned()
            .collect()
    }

    fn disambiguate(
        &self,
        mut candidates: Vec<Arc<Bean>>,
        required_type: impl Fn() -> String,
        required: &[Marker],
    ) -> Result<Arc<Bean>, ResolutionError> {
        if candidates.len() > 1 {
            let alternatives: Vec<Arc<Bean>> = candidates
                .iter()
                .filter(|bean| bean.is_alternative())
                .cloned()
                .collect();
            if !alternatives.is_empty() {
                candidates = alternatives;
            }
        }
        if candidates.len() > 1 {
            if let Some(highest) = candidates.iter().filter_map(|bean| bean.priority()).max() {
                let top: Vec<Arc<Bean>> = candidates
                    .iter()
                    .filter(|bean| bean.is_alternative() && bean.priority() == Some(highest))
                    .cloned()
                    .collect();
                if top.len() == 1 {
                    candidates = top;
                }
            }
        }
        match candidates.len() {
            0 => Err(ResolutionError::Unsatisfied {
                required_type: required_type(),
                qualifiers: format_markers(required),
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(ResolutionError::Ambiguous {
                required_type: required_type(),
                qualifiers: format_markers(required),
                candidates: candidates.iter().map(|bean| bean.type_name().to_string()).collect(),
            }),
        }
    }

    /// 所有匹配的已启用 Bean，按添加顺序
    pub fn resolve_all(&self, key: TypeKey, qualifiers: &[Marker]) -> Vec<Arc<Bean>> {
        self.candidates(key, &normalize(qualifiers))
    }

    /// 按名称解析
    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<Bean>, ResolutionError> {
        let candidates: Vec<Arc<Bean>> = self
            .table
            .read()
            .beans
            .iter()
            .filter(|bean| bean.role() == TypeRole::Bean && bean.name() == Some(name))
            .filter(|bean| self.is_enabled(bean))
            .cloned()
            .collect();
        self.disambiguate(candidates, || name.to_string(), &[Marker::named(name)])
    }

    /// 调用的有效拦截器，按执行顺序
    ///
    /// `member` 为业务方法名称；构造函数拦截使用选中的构造函数上的标记
    pub fn resolve_interceptors(
        &self,
        bean: &Bean,
        member: Option<&str>,
        kind: InterceptionKind,
    ) -> Arc<[ResolvedInterceptor]> {
        let cache_key = (bean.id(), member.map(str::to_string), kind);
        if let Some(cached) = self.interceptor_cache.get(&cache_key) {
            return Arc::clone(&cached);
        }
        let resolved: Arc<[ResolvedInterceptor]> = self.resolve_interceptors_uncached(bean, member, kind).into();
        if self.is_closed() {
            self.interceptor_cache.insert(cache_key, Arc::clone(&resolved));
        }
        resolved
    }

    fn resolve_interceptors_uncached(
        &self,
        bean: &Bean,
        member: Option<&str>,
        kind: InterceptionKind,
    ) -> Vec<ResolvedInterceptor> {
        if bean.role() != TypeRole::Bean {
            return Vec::new();
        }
        let Some(annotated) = bean.annotated() else {
            return Vec::new();
        };

        let member_markers: Vec<Marker> = match kind {
            InterceptionKind::AroundInvoke | InterceptionKind::AroundTimeout => member
                .and_then(|name| annotated.levels().business_method(name))
                .map(|method| method.markers().to_vec())
                .unwrap_or_default(),
            InterceptionKind::AroundConstruct => match bean.strategy() {
                crate::bean::ConstructionStrategy::Managed { constructor, .. } => annotated
                    .constructors()
                    .get(*constructor)
                    .map(|constructor| constructor.markers().to_vec())
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
            InterceptionKind::PostConstruct | InterceptionKind::PreDestroy => Vec::new(),
        };
        let has = |kind: &str| member_markers.iter().any(|marker| marker.is(kind));
        let exclude_class = has(builtin::EXCLUDE_CLASS_INTERCEPTORS);
        let exclude_default =
            has(builtin::EXCLUDE_DEFAULT_INTERCEPTORS) || annotated.has_marker(builtin::EXCLUDE_DEFAULT_INTERCEPTORS);

        let mut effective: Vec<Marker> = if exclude_class {
            Vec::new()
        } else {
            bean.interceptor_bindings().to_vec()
        };
        for binding in self.markers.interceptor_bindings(&member_markers) {
            if !self.markers.contains_equivalent(&effective, &binding) {
                effective.push(binding);
            }
        }

        let enablement = self.enablement();
        let interceptors: Vec<Arc<Bean>> = self
            .table
            .read()
            .beans
            .iter()
            .filter(|candidate| candidate.role() == TypeRole::Interceptor)
            .cloned()
            .collect();
        let handles = |interceptor: &Arc<Bean>| -> Option<ResolvedInterceptor> {
            let methods: Vec<InterceptorMethod> = interceptor
                .annotated()?
                .levels()
                .interceptor_methods()
                .filter(|method| method.kind() == kind)
                .cloned()
                .collect();
            if methods.is_empty() {
                None
            } else {
                Some(ResolvedInterceptor {
                    bean: Arc::clone(interceptor),
                    methods,
                })
            }
        };
        let binds = |interceptor: &Arc<Bean>| {
            !interceptor.interceptor_bindings().is_empty()
                && self
                    .markers
                    .is_subset(interceptor.interceptor_bindings(), &effective)
        };

        let mut ordered: Vec<Arc<Bean>> = Vec::new();
        if !exclude_default {
            for name in &enablement.default_interceptors {
                ordered.extend(
                    interceptors
                        .iter()
                        .filter(|interceptor| interceptor.matches_name(name))
                        .cloned(),
                );
            }
        }

        let mut prioritized: Vec<Arc<Bean>> = interceptors
            .iter()
            .filter(|interceptor| interceptor.priority().is_some() && binds(interceptor))
            .cloned()
            .collect();
        prioritized.sort_by_key(|interceptor| (interceptor.priority(), interceptor.discovery_index()));
        ordered.extend(prioritized);

        for name in &enablement.interceptors {
            ordered.extend(
                interceptors
                    .iter()
                    .filter(|interceptor| {
                        interceptor.priority().is_none()
                            && interceptor.matches_name(name)
                            && binds(interceptor)
                    })
                    .cloned(),
            );
        }

        let mut seen = HashSet::new();
        let resolved: Vec<ResolvedInterceptor> = ordered
            .iter()
            .filter(|interceptor| seen.insert(interceptor.id()))
            .filter_map(handles)
            .collect();
        if !resolved.is_empty() {
            debug!(
                "解析拦截器: {} {} {:?} -> {:?}",
                bean.type_name(),
                kind,
                member,
                resolved
                    .iter()
                    .map(|interceptor| interceptor.bean.type_name())
                    .collect::<Vec<_>>()
            );
        }
        resolved
    }

    /// Bean 的业务方法是否会被拦截
    pub fn intercepts_business_methods(&self, bean: &Bean) -> bool {
        let Some(annotated) = bean.annotated() else {
            return false;
        };
        if bean.role() != TypeRole::Bean {
            return false;
        }
        let has_target_methods = annotated.levels().interceptor_methods().any(|method| {
            matches!(
                method.kind(),
                InterceptionKind::AroundInvoke | InterceptionKind::AroundTimeout
            )
        });
        if has_target_methods {
            return true;
        }
        let mut members: Vec<Option<&str>> = vec![None];
        members.extend(annotated.levels().business_methods().map(|method| Some(method.name())));
        members.into_iter().any(|member| {
            [InterceptionKind::AroundInvoke, InterceptionKind::AroundTimeout]
                .into_iter()
                .any(|kind| !self.resolve_interceptors(bean, member, kind).is_empty())
        })
    }

    /// 作用于 Bean 的装饰器，第一个在最外层
    pub fn resolve_decorators(&self, bean: &Bean) -> Arc<[Arc<Bean>]> {
        if let Some(cached) = self.decorator_cache.get(&bean.id()) {
            return Arc::clone(&cached);
        }
        let resolved: Arc<[Arc<Bean>]> = self.resolve_decorators_uncached(bean).into();
        if self.is_closed() {
            self.decorator_cache.insert(bean.id(), Arc::clone(&resolved));
        }
        resolved
    }

    fn resolve_decorators_uncached(&self, bean: &Bean) -> Vec<Arc<Bean>> {
        if bean.role() != TypeRole::Bean {
            return Vec::new();
        }
        let enablement = self.enablement();
        let applies = |decorator: &Arc<Bean>| {
            let mut delegates = decorator.delegate_points();
            match (delegates.next(), delegates.next()) {
                (Some(delegate), None) => {
                    bean.has_type(delegate.key())
                        && self.markers.is_subset(delegate.qualifiers(), bean.qualifiers())
                }
                _ => false,
            }
        };
        let decorators: Vec<Arc<Bean>> = self
            .table
            .read()
            .beans
            .iter()
            .filter(|candidate| candidate.role() == TypeRole::Decorator)
            .filter(|candidate| applies(candidate))
            .cloned()
            .collect();

        let mut ordered: Vec<Arc<Bean>> = decorators
            .iter()
            .filter(|decorator| decorator.priority().is_some())
            .cloned()
            .collect();
        ordered.sort_by_key(|decorator| (decorator.priority(), decorator.discovery_index()));
        for name in &enablement.decorators {
            ordered.extend(
                decorators
                    .iter()
                    .filter(|decorator| decorator.priority().is_none() && decorator.matches_name(name))
                    .cloned(),
            );
        }
        let mut seen = HashSet::new();
        ordered.retain(|decorator| seen.insert(decorator.id()));
        ordered
    }
}

fn normalize(qualifiers: &[Marker]) -> Vec<Marker> {
    if qualifiers.is_empty() {
        return vec![Marker::default_qualifier()];
    }
    let mut normalized = qualifiers.to_vec();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::SyntheticBean;
    use di_abstractions::TypeBinding;
    use di_common::MarkerDefinition;

    trait Logger: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct ConsoleLogger;

    impl Logger for ConsoleLogger {
        fn name(&self) -> &'static str {
            "console"
        }
    }

    struct FileLogger;

    impl Logger for FileLogger {
        fn name(&self) -> &'static str {
            "file"
        }
    }

    fn resolver() -> Resolver {
        let markers = Arc::new(MarkerTypeRegistry::new());
        markers.declare(MarkerDefinition::qualifier("Fast"));
        Resolver::new(markers)
    }

    fn add(resolver: &Resolver, synthetic: SyntheticBean) -> Arc<Bean> {
        let id = resolver.next_id();
        let (bean, errors) = Bean::synthetic(id, synthetic, resolver.markers(), id.0);
        assert!(errors.is_empty());
        resolver.add_bean(bean)
    }

    fn console() -> SyntheticBean {
        SyntheticBean::from_instance(Arc::new(ConsoleLogger))
            .with_binding(TypeBinding::upcast::<ConsoleLogger, dyn Logger>(|logger| logger as Arc<dyn Logger>))
    }

    fn file() -> SyntheticBean {
        SyntheticBean::from_instance(Arc::new(FileLogger))
            .with_binding(TypeBinding::upcast::<FileLogger, dyn Logger>(|logger| logger as Arc<dyn Logger>))
    }

    #[test]
    fn test_unsatisfied_and_ambiguous() {
        let resolver = resolver();
        let key = TypeKey::of::<dyn Logger>();
        assert!(resolver.resolve(key, &[]).unwrap_err().is_unsatisfied());

        add(&resolver, console());
        assert_eq!(resolver.resolve(key, &[]).unwrap().id(), BeanId(0));

        add(&resolver, file());
        match resolver.resolve(key, &[]) {
            Err(ResolutionError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected result: {:?}", other.map(|bean| bean.id())),
        }
        assert_eq!(resolver.resolve_all(key, &[]).len(), 2);
    }

    #[test]
    fn test_qualifier_superset_required() {
        let resolver = resolver();
        let key = TypeKey::of::<dyn Logger>();
        add(&resolver, console());
        let fast = add(&resolver, file().qualifier(Marker::new("Fast")));

        assert_eq!(resolver.resolve(key, &[Marker::new("Fast")]).unwrap().id(), fast.id());
        assert_eq!(resolver.resolve(key, &[]).unwrap().id(), BeanId(0));
        assert!(resolver.resolve(key, &[Marker::any()]).unwrap_err().is_ambiguous());
    }

    #[test]
    fn test_enabled_alternative_wins() {
        let resolver = resolver();
        let key = TypeKey::of::<dyn Logger>();
        add(&resolver, console());
        let alternative = add(&resolver, file().alternative());

        assert_eq!(resolver.resolve(key, &[]).unwrap().id(), BeanId(0));

        resolver.set_enablement(Enablement {
            alternatives: vec!["FileLogger".to_string()],
            ..Enablement::default()
        });
        assert_eq!(resolver.resolve(key, &[]).unwrap().id(), alternative.id());
    }

    #[test]
    fn test_highest_priority_alternative_wins() {
        let resolver = resolver();
        let key = TypeKey::of::<dyn Logger>();
        add(&resolver, console().alternative().priority(10));
        let high = add(&resolver, file().alternative().priority(20));
        assert_eq!(resolver.resolve(key, &[]).unwrap().id(), high.id());
    }

    #[test]
    fn test_results_cached_after_close() {
        let resolver = resolver();
        let key = TypeKey::of::<dyn Logger>();
        add(&resolver, console());
        resolver.close();
        let first = resolver.resolve(key, &[]).unwrap();
        let second = resolver.resolve(key, &[Marker::default_qualifier()]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cache.len(), 1);
    }

    #[test]
    fn test_resolve_by_name() {
        let resolver = resolver();
        add(&resolver, console().named("console"));
        assert!(resolver.resolve_by_name("console").is_ok());
        assert!(resolver.resolve_by_name("missing").unwrap_err().is_unsatisfied());
    }
}
