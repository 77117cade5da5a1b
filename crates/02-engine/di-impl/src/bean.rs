//! Bean 模型
//!
//! 注册表发现的类型、生产者成员和扩展注册的合成 Bean 统一表示为 [`Bean`]

use crate::registry::{decapitalize, BeanFacts, MarkerTypeRegistry, TypeDescriptor, TypeRole};
use di_abstractions::{AnnotatedType, Dependency, ProducerKind, ProducerMember, TypeBinding};
use di_common::{
    builtin, BeanId, BoxError, DefinitionError, Marker, SharedInstance, TypeKey,
};
use std::fmt;
use std::sync::Arc;

/// 注入点所在的成员类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// 构造函数参数
    ConstructorParameter,
    /// 注入字段
    Field,
    /// 初始化方法参数
    InitializerParameter,
    /// 生产者方法参数
    ProducerParameter,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConstructorParameter => "构造参数",
            Self::Field => "字段",
            Self::InitializerParameter => "初始化参数",
            Self::ProducerParameter => "生产者参数",
        };
        f.write_str(name)
    }
}

/// 注入点
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    dependency: Dependency,
    qualifiers: Vec<Marker>,
    owner: String,
    member: String,
    kind: MemberKind,
    member_index: usize,
    index: usize,
}

impl InjectionPoint {
    /// 创建注入点
    ///
    /// 没有声明限定符时要求 `Default`
    pub fn new(
        dependency: Dependency,
        owner: impl Into<String>,
        member: impl Into<String>,
        kind: MemberKind,
        member_index: usize,
        index: usize,
    ) -> Self {
        let mut qualifiers = dependency.qualifiers().to_vec();
        if qualifiers.is_empty() {
            qualifiers.push(Marker::default_qualifier());
        }
        Self {
            dependency,
            qualifiers,
            owner: owner.into(),
            member: member.into(),
            kind,
            member_index,
            index,
        }
    }

    /// 依赖声明
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// 请求的类型
    pub fn key(&self) -> TypeKey {
        self.dependency.key()
    }

    /// 请求的限定符
    pub fn qualifiers(&self) -> &[Marker] {
        &self.qualifiers
    }

    /// 所属类型名称
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 成员名称
    pub fn member(&self) -> &str {
        &self.member
    }

    /// 成员类型
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// 成员在同类成员中的位置（祖先优先）
    pub fn member_index(&self) -> usize {
        self.member_index
    }

    /// 参数位置
    pub fn index(&self) -> usize {
        self.index
    }

    /// 是否为延迟依赖
    pub fn is_lazy(&self) -> bool {
        self.dependency.is_lazy()
    }

    /// 是否为装饰器委托注入点
    pub fn is_delegate(&self) -> bool {
        self.dependency.is_delegate()
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Field => write!(f, "{}::{}", self.owner, self.member),
            _ => write!(f, "{}::{}[{}]", self.owner, self.member, self.index),
        }
    }
}

/// 合成 Bean 的创建函数
pub type SyntheticCreate = Arc<dyn Fn() -> Result<SharedInstance, BoxError> + Send + Sync>;

/// 合成 Bean 的销毁函数
pub type SyntheticDestroy = Arc<dyn Fn(&SharedInstance) + Send + Sync>;

/// 实例构造方式
#[derive(Clone)]
pub enum ConstructionStrategy {
    /// 托管 Bean：调用构造函数，注入字段和初始化方法，执行回调
    Managed {
        /// 类型描述
        descriptor: Arc<TypeDescriptor>,
        /// 选中的构造函数
        constructor: usize,
    },
    /// 生产者方法
    ProducerMethod {
        /// 声明生产者的 Bean
        declaring: BeanId,
        /// 生产者成员
        member: ProducerMember,
    },
    /// 生产者字段
    ProducerField {
        /// 声明生产者的 Bean
        declaring: BeanId,
        /// 生产者成员
        member: ProducerMember,
    },
    /// 以编程方式注册的 Bean
    Synthetic {
        /// 创建函数
        create: SyntheticCreate,
        /// 销毁函数
        destroy: Option<SyntheticDestroy>,
    },
}

impl ConstructionStrategy {
    /// 生产者信息
    pub fn producer(&self) -> Option<(BeanId, &ProducerMember)> {
        match self {
            Self::ProducerMethod { declaring, member } | Self::ProducerField { declaring, member } => {
                Some((*declaring, member))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ConstructionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed { descriptor, constructor } => f
                .debug_struct("Managed")
                .field("type", &descriptor.name())
                .field("constructor", constructor)
                .finish(),
            Self::ProducerMethod { declaring, member } => f
                .debug_struct("ProducerMethod")
                .field("declaring", declaring)
                .field("member", &member.name())
                .finish(),
            Self::ProducerField { declaring, member } => f
                .debug_struct("ProducerField")
                .field("declaring", declaring)
                .field("member", &member.name())
                .finish(),
            Self::Synthetic { .. } => f.write_str("Synthetic"),
        }
    }
}

/// Bean
#[derive(Debug)]
pub struct Bean {
    id: BeanId,
    type_name: String,
    types: Vec<TypeBinding>,
    facts: BeanFacts,
    role: TypeRole,
    strategy: ConstructionStrategy,
    injection_points: Vec<InjectionPoint>,
    discovery_index: usize,
}

impl Bean {
    /// 由注册表中的类型创建托管 Bean
    ///
    /// 没有可用构造函数时返回定义错误
    pub fn managed(
        id: BeanId,
        descriptor: Arc<TypeDescriptor>,
        role: TypeRole,
    ) -> Result<Self, DefinitionError> {
        let annotated = Arc::clone(descriptor.annotated());
        let constructor = select_constructor(annotated.as_ref()).ok_or_else(|| {
            DefinitionError::NoUsableConstructor {
                type_name: descriptor.name().to_string(),
            }
        })?;
        let owner = descriptor.name();
        let mut injection_points = Vec::new();

        for (index, dependency) in annotated.constructors()[constructor].params().iter().enumerate() {
            injection_points.push(InjectionPoint::new(
                dependency.clone(),
                owner,
                "new",
                MemberKind::ConstructorParameter,
                constructor,
                index,
            ));
        }
        for (member_index, field) in annotated.levels().fields().enumerate() {
            injection_points.push(InjectionPoint::new(
                field.dependency().clone(),
                owner,
                field.name(),
                MemberKind::Field,
                member_index,
                0,
            ));
        }
        for (member_index, initializer) in annotated.levels().initializers().enumerate() {
            for (index, dependency) in initializer.params().iter().enumerate() {
                injection_points.push(InjectionPoint::new(
                    dependency.clone(),
                    owner,
                    initializer.name(),
                    MemberKind::InitializerParameter,
                    member_index,
                    index,
                ));
            }
        }

        Ok(Self {
            id,
            type_name: owner.to_string(),
            types: annotated.type_closure().to_vec(),
            facts: descriptor.facts().clone(),
            role,
            discovery_index: descriptor.discovery_index(),
            strategy: ConstructionStrategy::Managed {
                descriptor,
                constructor,
            },
            injection_points,
        })
    }

    /// 由生产者成员创建 Bean
    pub fn producer(
        id: BeanId,
        declaring: &Bean,
        member: ProducerMember,
        markers: &MarkerTypeRegistry,
    ) -> (Self, Vec<DefinitionError>) {
        let type_name = format!("{}::{}", declaring.type_name(), member.name());
        let (facts, errors) =
            BeanFacts::derive(markers, &type_name, member.name(), member.markers(), &[]);
        let injection_points = member
            .params()
            .iter()
            .enumerate()
            .map(|(index, dependency)| {
                InjectionPoint::new(
                    dependency.clone(),
                    declaring.type_name(),
                    member.name(),
                    MemberKind::ProducerParameter,
                    0,
                    index,
                )
            })
            .collect();
        let strategy = match member.kind() {
            ProducerKind::Method => ConstructionStrategy::ProducerMethod {
                declaring: declaring.id(),
                member: member.clone(),
            },
            ProducerKind::Field => ConstructionStrategy::ProducerField {
                declaring: declaring.id(),
                member: member.clone(),
            },
        };
        let bean = Self {
            id,
            type_name,
            types: member.type_closure().to_vec(),
            facts,
            role: TypeRole::Bean,
            strategy,
            injection_points,
            discovery_index: declaring.discovery_index(),
        };
        (bean, errors)
    }

    /// 由合成 Bean 声明创建 Bean
    pub fn synthetic(
        id: BeanId,
        synthetic: SyntheticBean,
        markers: &MarkerTypeRegistry,
        discovery_index: usize,
    ) -> (Self, Vec<DefinitionError>) {
        let mut declared = synthetic.markers;
        if let Some(scope) = synthetic.scope {
            declared.push(Marker::new(scope));
        }
        let simple_name = synthetic.key.simple_name();
        let (facts, errors) =
            BeanFacts::derive(markers, synthetic.key.name(), simple_name, &declared, &[]);
        let bean = Self {
            id,
            type_name: synthetic.key.name().to_string(),
            types: synthetic.types,
            facts,
            role: TypeRole::Bean,
            strategy: ConstructionStrategy::Synthetic {
                create: synthetic.create,
                destroy: synthetic.destroy,
            },
            injection_points: Vec::new(),
            discovery_index,
        };
        (bean, errors)
    }

    /// Bean 标识
    pub fn id(&self) -> BeanId {
        self.id
    }

    /// 类型名称（生产者 Bean 为 `声明类型::成员`）
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 类型闭包
    pub fn types(&self) -> &[TypeBinding] {
        &self.types
    }

    /// 类型闭包中的指定类型
    pub fn binding(&self, key: TypeKey) -> Option<&TypeBinding> {
        self.types.iter().find(|binding| binding.key() == key)
    }

    /// 类型闭包是否包含指定类型
    pub fn has_type(&self, key: TypeKey) -> bool {
        self.binding(key).is_some()
    }

    /// 派生事实
    pub fn facts(&self) -> &BeanFacts {
        &self.facts
    }

    /// 限定符
    pub fn qualifiers(&self) -> &[Marker] {
        &self.facts.qualifiers
    }

    /// 作用域
    pub fn scope(&self) -> &str {
        &self.facts.scope
    }

    /// 是否为 `Dependent` 作用域
    pub fn is_dependent(&self) -> bool {
        self.facts.scope == builtin::DEPENDENT
    }

    /// Bean 名称
    pub fn name(&self) -> Option<&str> {
        self.facts.name.as_deref()
    }

    /// 构造型
    pub fn stereotypes(&self) -> &[Marker] {
        &self.facts.stereotypes
    }

    /// 是否为备选
    pub fn is_alternative(&self) -> bool {
        self.facts.alternative
    }

    /// 优先级
    pub fn priority(&self) -> Option<i64> {
        self.facts.priority
    }

    /// 是否在启动时立即实例化
    pub fn is_eager(&self) -> bool {
        self.facts.eager
    }

    /// 角色
    pub fn role(&self) -> TypeRole {
        self.role
    }

    /// 类级拦截器绑定
    pub fn interceptor_bindings(&self) -> &[Marker] {
        &self.facts.interceptor_bindings
    }

    /// 构造方式
    pub fn strategy(&self) -> &ConstructionStrategy {
        &self.strategy
    }

    /// 托管 Bean 的类型描述
    pub fn descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        match &self.strategy {
            ConstructionStrategy::Managed { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    /// 托管 Bean 的类型能力查询接口
    pub fn annotated(&self) -> Option<&Arc<dyn AnnotatedType>> {
        self.descriptor().map(|descriptor| descriptor.annotated())
    }

    /// 注入点
    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    /// 指定成员类型的注入点
    pub fn injection_points_of(&self, kind: MemberKind) -> impl Iterator<Item = &InjectionPoint> {
        self.injection_points
            .iter()
            .filter(move |point| point.kind() == kind)
    }

    /// 装饰器的委托注入点
    pub fn delegate_points(&self) -> impl Iterator<Item = &InjectionPoint> {
        self.injection_points.iter().filter(|point| point.is_delegate())
    }

    /// 发现顺序
    pub fn discovery_index(&self) -> usize {
        self.discovery_index
    }

    /// 名称是否指向该 Bean（类型全名或简短名称）
    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.trim().replace('.', "::");
        if self.type_name == name {
            return true;
        }
        match &self.strategy {
            ConstructionStrategy::Managed { descriptor, .. } => descriptor.key().matches_name(&name),
            _ => self
                .types
                .first()
                .map(|binding| binding.key().matches_name(&name))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.type_name, self.facts.scope, self.id)
    }
}

/// 选择构造函数：唯一的注入构造函数，否则无参构造函数
fn select_constructor(annotated: &dyn AnnotatedType) -> Option<usize> {
    let constructors = annotated.constructors();
    constructors
        .iter()
        .position(|constructor| constructor.is_injectable())
        .or_else(|| constructors.iter().position(|constructor| constructor.is_no_args()))
}

/// 合成 Bean 声明
pub struct SyntheticBean {
    key: TypeKey,
    types: Vec<TypeBinding>,
    markers: Vec<Marker>,
    scope: Option<String>,
    create: SyntheticCreate,
    destroy: Option<SyntheticDestroy>,
}

impl SyntheticBean {
    /// 每次创建时调用 `create` 的合成 Bean
    pub fn new<C, F>(create: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn() -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<C>(),
            types: vec![TypeBinding::identity::<C>(), TypeBinding::object()],
            markers: Vec::new(),
            scope: None,
            create: Arc::new(move || -> Result<SharedInstance, BoxError> {
                let instance: SharedInstance = Arc::new(create()?);
                Ok(instance)
            }),
            destroy: None,
        }
    }

    /// 包装已有实例的单例 Bean
    pub fn from_instance<C: Send + Sync + 'static>(instance: Arc<C>) -> Self {
        Self {
            key: TypeKey::of::<C>(),
            types: vec![TypeBinding::identity::<C>(), TypeBinding::object()],
            markers: Vec::new(),
            scope: Some(builtin::SINGLETON.to_string()),
            create: Arc::new(move || -> Result<SharedInstance, BoxError> {
                let shared: SharedInstance = Arc::clone(&instance) as SharedInstance;
                Ok(shared)
            }),
            destroy: None,
        }
    }

    /// 包装已有 trait object 的单例 Bean
    pub fn shared<P: ?Sized + Send + Sync + 'static>(value: Arc<P>) -> Self {
        Self {
            key: TypeKey::of::<P>(),
            types: vec![TypeBinding::product::<P>(), TypeBinding::object()],
            markers: Vec::new(),
            scope: Some(builtin::SINGLETON.to_string()),
            create: Arc::new(move || -> Result<SharedInstance, BoxError> {
                let shared: SharedInstance = Arc::new(Arc::clone(&value));
                Ok(shared)
            }),
            destroy: None,
        }
    }

    /// 添加类型闭包条目
    pub fn with_binding(mut self, binding: TypeBinding) -> Self {
        self.types.push(binding);
        self
    }

    /// 添加标记
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 添加限定符
    pub fn qualifier(self, qualifier: Marker) -> Self {
        self.marker(qualifier)
    }

    /// 设置作用域
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// 设置名称
    pub fn named(self, name: impl Into<String>) -> Self {
        self.marker(Marker::named(name))
    }

    /// 声明为备选
    pub fn alternative(self) -> Self {
        self.marker(Marker::alternative())
    }

    /// 设置优先级
    pub fn priority(self, priority: i64) -> Self {
        self.marker(Marker::priority(priority))
    }

    /// 销毁函数
    pub fn on_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&SharedInstance) + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(destroy));
        self
    }

    /// 类型标识
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// 默认名称
    pub fn default_name(&self) -> String {
        decapitalize(self.key.simple_name())
    }
}

impl fmt::Debug for SyntheticBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticBean")
            .field("key", &self.key)
            .field("markers", &self.markers)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::ProblemCollector;
    use crate::registry::MetadataRegistry;
    use di_abstractions::{ComponentType, FieldMember, InitializerMember};

    trait Logger: Send + Sync {}

    #[derive(Default)]
    struct ConsoleLogger;

    impl Logger for ConsoleLogger {}

    #[derive(Default)]
    struct Greeter {
        logger: Option<Arc<dyn Logger>>,
    }

    fn greeter_type() -> Arc<dyn AnnotatedType> {
        ComponentType::builder::<Greeter>()
            .marker(Marker::application_scoped())
            .inject_constructor(vec![Dependency::of::<String>()], |_| Ok(Greeter::default()))
            .members(|level| {
                level
                    .field(FieldMember::new::<Greeter, dyn Logger>("logger", |greeter| {
                        &mut greeter.logger
                    }))
                    .initializer(InitializerMember::new::<Greeter, _>(
                        "configure",
                        vec![Dependency::of::<u32>(), Dependency::of::<u64>()],
                        |_, _| Ok(()),
                    ))
            })
            .build()
    }

    #[test]
    fn test_managed_bean_collects_injection_points() {
        let registry =
            MetadataRegistry::new(Arc::new(MarkerTypeRegistry::new()), Arc::new(ProblemCollector::new()));
        let descriptor = registry.register(greeter_type());
        let bean = Bean::managed(BeanId(0), descriptor, TypeRole::Bean).unwrap();

        assert_eq!(bean.injection_points().len(), 4);
        assert_eq!(bean.injection_points_of(MemberKind::ConstructorParameter).count(), 1);
        assert_eq!(bean.injection_points_of(MemberKind::InitializerParameter).count(), 2);
        let field = bean.injection_points_of(MemberKind::Field).next().unwrap();
        assert_eq!(field.key(), TypeKey::of::<dyn Logger>());
        assert_eq!(field.qualifiers(), &[Marker::default_qualifier()]);
        assert!(field.to_string().ends_with("Greeter::logger"));
        assert_eq!(bean.scope(), builtin::APPLICATION_SCOPED);
        assert!(bean.matches_name("Greeter"));
    }

    #[test]
    fn test_type_without_constructor_is_rejected() {
        let registry =
            MetadataRegistry::new(Arc::new(MarkerTypeRegistry::new()), Arc::new(ProblemCollector::new()));
        let descriptor = registry.register(
            ComponentType::builder::<ConsoleLogger>()
                .marker(Marker::singleton())
                .build(),
        );
        assert!(matches!(
            Bean::managed(BeanId(0), descriptor, TypeRole::Bean),
            Err(DefinitionError::NoUsableConstructor { .. })
        ));
    }

    #[test]
    fn test_synthetic_trait_object_bean() {
        let markers = MarkerTypeRegistry::new();
        let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger);
        let (bean, errors) = Bean::synthetic(
            BeanId(3),
            SyntheticBean::shared(logger).named("console"),
            &markers,
            0,
        );
        assert!(errors.is_empty());
        assert!(bean.has_type(TypeKey::of::<dyn Logger>()));
        assert_eq!(bean.name(), Some("console"));
        assert_eq!(bean.scope(), builtin::SINGLETON);
    }
}
