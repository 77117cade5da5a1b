//! 元数据注册表
//!
//! 保存发现的类型描述和派生事实，提供分类判断。注册是幂等的：
//! 重复注册已知类型不会产生任何变化。

mod descriptor;
mod markers;

pub use descriptor::*;
pub use markers::*;

use crate::problems::ProblemCollector;
use di_abstractions::{AnnotatedType, InterceptionKind};
use di_common::{builtin, DefinitionError, DiscoveryMode, TypeKey};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// 类型的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRole {
    /// 普通 Bean
    Bean,
    /// 拦截器
    Interceptor,
    /// 装饰器
    Decorator,
}

/// 分类结果
#[derive(Debug, Default, Clone)]
pub struct Classification {
    /// 普通 Bean 类型
    pub bean_types: Vec<Arc<TypeDescriptor>>,
    /// 拦截器类型
    pub interceptor_types: Vec<Arc<TypeDescriptor>>,
    /// 装饰器类型
    pub decorator_types: Vec<Arc<TypeDescriptor>>,
}

impl Classification {
    /// 分类后的类型总数
    pub fn len(&self) -> usize {
        self.bean_types.len() + self.interceptor_types.len() + self.decorator_types.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct TypeTable {
    descriptors: Vec<Arc<TypeDescriptor>>,
    index: HashMap<TypeKey, usize>,
}

/// 元数据注册表
pub struct MetadataRegistry {
    markers: Arc<MarkerTypeRegistry>,
    problems: Arc<ProblemCollector>,
    types: RwLock<TypeTable>,
    role_overrides: RwLock<HashMap<TypeKey, TypeRole>>,
    vetoed: RwLock<HashSet<TypeKey>>,
    discovery_mode: RwLock<DiscoveryMode>,
}

impl MetadataRegistry {
    /// 创建注册表
    pub fn new(markers: Arc<MarkerTypeRegistry>, problems: Arc<ProblemCollector>) -> Self {
        Self {
            markers,
            problems,
            types: RwLock::new(TypeTable::default()),
            role_overrides: RwLock::new(HashMap::new()),
            vetoed: RwLock::new(HashSet::new()),
            discovery_mode: RwLock::new(DiscoveryMode::default()),
        }
    }

    /// 标记类型注册表
    pub fn markers(&self) -> &Arc<MarkerTypeRegistry> {
        &self.markers
    }

    /// 设置发现模式
    pub fn set_discovery_mode(&self, mode: DiscoveryMode) {
        *self.discovery_mode.write() = mode;
    }

    /// 当前发现模式
    pub fn discovery_mode(&self) -> DiscoveryMode {
        *self.discovery_mode.read()
    }

    /// 以编程方式指定类型的角色
    pub fn override_role(&self, key: TypeKey, role: TypeRole) {
        debug!("覆盖类型角色: {} -> {:?}", key, role);
        self.role_overrides.write().insert(key, role);
    }

    /// 否决类型，被否决的类型不会成为 Bean
    pub fn veto(&self, key: TypeKey) {
        debug!("否决类型: {}", key);
        self.vetoed.write().insert(key);
    }

    /// 注册类型
    ///
    /// 已知类型直接返回已有描述；定义错误记录到问题收集器
    pub fn register(&self, annotated: Arc<dyn AnnotatedType>) -> Arc<TypeDescriptor> {
        let key = annotated.type_key();
        if let Some(existing) = self.get(key) {
            debug!("类型已注册, 忽略: {}", key);
            return existing;
        }

        let mut table = self.types.write();
        if let Some(position) = table.index.get(&key) {
            return Arc::clone(&table.descriptors[*position]);
        }

        let inherited: Vec<_> = annotated
            .levels()
            .ancestors()
            .flat_map(|level| level.markers().iter().cloned())
            .collect();
        let (facts, errors) = BeanFacts::derive(
            &self.markers,
            annotated.name(),
            annotated.simple_name(),
            annotated.markers(),
            &inherited,
        );
        for error in errors.into_iter().chain(check_members(annotated.as_ref())) {
            self.problems.add_definition(error);
        }

        let position = table.descriptors.len();
        let descriptor = Arc::new(TypeDescriptor::new(annotated, facts, position));
        info!("注册类型: {} (作用域: {})", key, descriptor.scope());
        table.descriptors.push(Arc::clone(&descriptor));
        table.index.insert(key, position);
        descriptor
    }

    /// 获取已注册的类型描述
    pub fn get(&self, key: TypeKey) -> Option<Arc<TypeDescriptor>> {
        let table = self.types.read();
        table
            .index
            .get(&key)
            .map(|position| Arc::clone(&table.descriptors[*position]))
    }

    /// 所有已注册的类型，按发现顺序
    pub fn types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.types.read().descriptors.clone()
    }

    /// 已注册的类型个数
    pub fn len(&self) -> usize {
        self.types.read().descriptors.len()
    }

    /// 是否没有注册任何类型
    pub fn is_empty(&self) -> bool {
        self.types.read().descriptors.is_empty()
    }

    fn role_override(&self, key: TypeKey) -> Option<TypeRole> {
        self.role_overrides.read().get(&key).copied()
    }

    /// 类型是否被否决
    pub fn is_vetoed(&self, descriptor: &TypeDescriptor) -> bool {
        descriptor.annotated().has_marker(builtin::VETOED)
            || self.vetoed.read().contains(&descriptor.key())
    }

    /// 类型是否带有 Bean 定义标记
    pub fn has_bean_defining_marker(&self, descriptor: &TypeDescriptor) -> bool {
        let annotated = descriptor.annotated();
        annotated.markers().iter().any(|marker| {
            self.markers.is_scope(marker.kind()) || self.markers.is_stereotype(marker.kind())
        }) || annotated.has_marker(builtin::INTERCEPTOR)
            || annotated.has_marker(builtin::DECORATOR)
    }

    /// 是否为 Bean 类型
    pub fn is_bean_type(&self, descriptor: &TypeDescriptor) -> bool {
        if self.is_vetoed(descriptor) || !descriptor.annotated().is_concrete() {
            return false;
        }
        if self.role_override(descriptor.key()).is_some() {
            return true;
        }
        match self.discovery_mode() {
            DiscoveryMode::None => false,
            DiscoveryMode::All => {
                self.has_bean_defining_marker(descriptor) || descriptor.has_usable_constructor()
            }
            DiscoveryMode::Annotated => self.has_bean_defining_marker(descriptor),
        }
    }

    /// 是否为拦截器类型
    pub fn is_interceptor_type(&self, descriptor: &TypeDescriptor) -> bool {
        match self.role_override(descriptor.key()) {
            Some(role) => role == TypeRole::Interceptor,
            None => descriptor.annotated().has_marker(builtin::INTERCEPTOR),
        }
    }

    /// 是否为装饰器类型
    pub fn is_decorator_type(&self, descriptor: &TypeDescriptor) -> bool {
        match self.role_override(descriptor.key()) {
            Some(role) => role == TypeRole::Decorator,
            None => descriptor.annotated().has_marker(builtin::DECORATOR),
        }
    }

    /// 是否为限定符
    pub fn is_qualifier(&self, kind: &str) -> bool {
        self.markers.is_qualifier(kind)
    }

    /// 是否为作用域
    pub fn is_scope(&self, kind: &str) -> bool {
        self.markers.is_scope(kind)
    }

    /// 是否为构造型
    pub fn is_stereotype(&self, kind: &str) -> bool {
        self.markers.is_stereotype(kind)
    }

    /// 是否为拦截器绑定
    pub fn is_interceptor_binding(&self, kind: &str) -> bool {
        self.markers.is_interceptor_binding(kind)
    }

    /// 类型的角色；不是 Bean 类型时返回 `None`
    pub fn role_of(&self, descriptor: &TypeDescriptor) -> Option<TypeRole> {
        if !self.is_bean_type(descriptor) {
            None
        } else if self.is_interceptor_type(descriptor) {
            Some(TypeRole::Interceptor)
        } else if self.is_decorator_type(descriptor) {
            Some(TypeRole::Decorator)
        } else {
            Some(TypeRole::Bean)
        }
    }

    /// 对一组类型分类，拦截器和装饰器优先于普通 Bean
    pub fn classify(&self, types: &[Arc<TypeDescriptor>]) -> Classification {
        let mut classification = Classification::default();
        for descriptor in types {
            match self.role_of(descriptor) {
                Some(TypeRole::Interceptor) => {
                    classification.interceptor_types.push(Arc::clone(descriptor))
                }
                Some(TypeRole::Decorator) => {
                    classification.decorator_types.push(Arc::clone(descriptor))
                }
                Some(TypeRole::Bean) => classification.bean_types.push(Arc::clone(descriptor)),
                None => debug!("类型不是 Bean: {}", descriptor.name()),
            }
        }
        info!(
            "类型分类完成: {} 个 Bean, {} 个拦截器, {} 个装饰器",
            classification.bean_types.len(),
            classification.interceptor_types.len(),
            classification.decorator_types.len()
        );
        classification
    }
}

/// 检查成员声明，返回发现的定义错误
fn check_members(annotated: &dyn AnnotatedType) -> Vec<DefinitionError> {
    let type_name = annotated.name().to_string();
    let mut errors = Vec::new();

    let injectable = annotated
        .constructors()
        .iter()
        .filter(|constructor| constructor.is_injectable())
        .count();
    if injectable > 1 {
        errors.push(DefinitionError::MultipleInjectConstructors {
            type_name: type_name.clone(),
        });
    }

    for producer in annotated.levels().producers() {
        for marker in [builtin::INJECT, builtin::DISPOSES] {
            if producer.has_marker(marker) {
                errors.push(DefinitionError::InvalidProducer {
                    type_name: type_name.clone(),
                    member: producer.name().to_string(),
                    marker: marker.to_string(),
                });
            }
        }
    }

    let callbacks = annotated
        .levels()
        .post_construct_callbacks()
        .chain(annotated.levels().pre_destroy_callbacks());
    for callback in callbacks {
        let reason = if callback.is_static() {
            Some("回调不能是静态方法".to_string())
        } else if callback.param_count() > 0 {
            Some(format!("回调不能有参数, 实际为 {} 个", callback.param_count()))
        } else {
            None
        };
        if let Some(reason) = reason {
            errors.push(DefinitionError::InvalidLifecycleCallback {
                type_name: type_name.clone(),
                method: callback.name().to_string(),
                reason,
            });
        }
    }

    for level in annotated.levels().iter() {
        let mut seen: HashSet<InterceptionKind> = HashSet::new();
        for method in level.interceptor_methods() {
            if !seen.insert(method.kind()) {
                errors.push(DefinitionError::DuplicateInterceptorMethod {
                    type_name: type_name.clone(),
                    kind: method.kind().to_string(),
                });
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{ComponentType, LifecycleCallback, ProducerMember};
    use di_common::{Marker, MarkerDefinition};

    #[derive(Default)]
    struct Plain;

    #[derive(Default)]
    struct Scoped;

    #[derive(Default)]
    struct Audit;

    #[derive(Default)]
    struct Broken;

    fn registry() -> (MetadataRegistry, Arc<ProblemCollector>) {
        let markers = Arc::new(MarkerTypeRegistry::new());
        markers.declare(MarkerDefinition::interceptor_binding("Logged"));
        let problems = Arc::new(ProblemCollector::new());
        (MetadataRegistry::new(markers, Arc::clone(&problems)), problems)
    }

    #[test]
    fn test_register_is_idempotent() {
        let (registry, _) = registry();
        let first = registry.register(ComponentType::builder::<Plain>().with_default().build());
        let second = registry.register(ComponentType::builder::<Plain>().with_default().build());
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_discovery_modes() {
        let (registry, _) = registry();
        let plain = registry.register(ComponentType::builder::<Plain>().with_default().build());
        let scoped = registry.register(
            ComponentType::builder::<Scoped>()
                .marker(Marker::application_scoped())
                .with_default()
                .build(),
        );

        registry.set_discovery_mode(DiscoveryMode::Annotated);
        assert!(!registry.is_bean_type(&plain));
        assert!(registry.is_bean_type(&scoped));

        registry.set_discovery_mode(DiscoveryMode::All);
        assert!(registry.is_bean_type(&plain));

        registry.set_discovery_mode(DiscoveryMode::None);
        assert!(!registry.is_bean_type(&scoped));

        registry.set_discovery_mode(DiscoveryMode::All);
        registry.veto(TypeKey::of::<Plain>());
        assert!(!registry.is_bean_type(&plain));
    }

    #[test]
    fn test_classify_prefers_interceptor_role() {
        let (registry, _) = registry();
        let audit = registry.register(
            ComponentType::builder::<Audit>()
                .marker(Marker::interceptor())
                .marker(Marker::new("Logged"))
                .marker(Marker::application_scoped())
                .with_default()
                .build(),
        );
        let plain = registry.register(ComponentType::builder::<Plain>().with_default().build());
        registry.override_role(TypeKey::of::<Plain>(), TypeRole::Decorator);

        let classification = registry.classify(&[audit, plain]);
        assert_eq!(classification.interceptor_types.len(), 1);
        assert_eq!(classification.decorator_types.len(), 1);
        assert!(classification.bean_types.is_empty());
    }

    #[test]
    fn test_member_errors_are_recorded_not_thrown() {
        let (registry, problems) = registry();
        registry.register(
            ComponentType::builder::<Broken>()
                .marker(Marker::singleton())
                .with_default()
                .members(|level| {
                    level
                        .producer(
                            ProducerMember::static_method::<String, _>("value", Vec::new(), |_| {
                                Ok(Arc::new("x".to_string()))
                            })
                            .marker(Marker::inject()),
                        )
                        .callback(
                            LifecycleCallback::post_construct::<Broken, _>("init", |_| Ok(()))
                                .with_param_count(1),
                        )
                })
                .build(),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(problems.len(), 2);
    }
}
