//! 类型能力查询接口
//!
//! 容器的所有调用点只依赖 [`AnnotatedType`]，不关心类型元数据从哪里来。
//! [`ComponentType`] 是基于构建器的实现：由扫描器、派生宏或测试直接构造。

use crate::binding::TypeBinding;
use crate::dependency::{Arguments, Dependency};
use crate::intercepted::Intercepted;
use crate::members::{ConstructorMember, HierarchyLevel, HierarchyLevels};
use di_common::{BoxError, Marker, TypeKey};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 带声明式标记的类型
pub trait AnnotatedType: Send + Sync {
    /// 类型标识
    fn type_key(&self) -> TypeKey;

    /// 类型上声明的标记（与顺序无关）
    fn markers(&self) -> &[Marker];

    /// 类型闭包：该类型可以满足的所有请求类型
    fn type_closure(&self) -> &[TypeBinding];

    /// 构造函数
    fn constructors(&self) -> &[ConstructorMember];

    /// 祖先优先排序的层级
    fn levels(&self) -> &HierarchyLevels;

    /// 是否为可实例化的具体类型
    fn is_concrete(&self) -> bool {
        true
    }

    /// 完整类型名称
    fn name(&self) -> &'static str {
        self.type_key().name()
    }

    /// 简短类型名称
    fn simple_name(&self) -> &'static str {
        self.type_key().simple_name()
    }

    /// 是否带有指定类型的标记
    fn has_marker(&self, kind: &str) -> bool {
        self.markers().iter().any(|marker| marker.is(kind))
    }

    /// 获取指定类型的标记
    fn marker(&self, kind: &str) -> Option<&Marker> {
        self.markers().iter().find(|marker| marker.is(kind))
    }
}

/// 基于构建器的类型描述
pub struct ComponentType {
    key: TypeKey,
    markers: Vec<Marker>,
    type_closure: Vec<TypeBinding>,
    constructors: Vec<ConstructorMember>,
    levels: HierarchyLevels,
    concrete: bool,
}

impl ComponentType {
    /// 为类型 `C` 创建构建器
    pub fn builder<C: Send + Sync + 'static>() -> ComponentTypeBuilder<C> {
        ComponentTypeBuilder::new()
    }
}

impl AnnotatedType for ComponentType {
    fn type_key(&self) -> TypeKey {
        self.key
    }

    fn markers(&self) -> &[Marker] {
        &self.markers
    }

    fn type_closure(&self) -> &[TypeBinding] {
        &self.type_closure
    }

    fn constructors(&self) -> &[ConstructorMember] {
        &self.constructors
    }

    fn levels(&self) -> &HierarchyLevels {
        &self.levels
    }

    fn is_concrete(&self) -> bool {
        self.concrete
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("key", &self.key)
            .field("markers", &self.markers)
            .field("type_closure", &self.type_closure)
            .field("constructors", &self.constructors.len())
            .field("levels", &self.levels.len())
            .finish()
    }
}

/// 类型描述构建器
pub struct ComponentTypeBuilder<C> {
    markers: Vec<Marker>,
    type_closure: Vec<TypeBinding>,
    constructors: Vec<ConstructorMember>,
    own: HierarchyLevel,
    ancestors: Vec<HierarchyLevel>,
    concrete: bool,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ComponentTypeBuilder<C> {
    fn new() -> Self {
        let key = TypeKey::of::<C>();
        Self {
            markers: Vec::new(),
            type_closure: vec![TypeBinding::identity::<C>(), TypeBinding::object()],
            constructors: Vec::new(),
            own: HierarchyLevel::new(0, key.simple_name()),
            ancestors: Vec::new(),
            concrete: true,
            _marker: PhantomData,
        }
    }

    /// 添加类型标记
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 添加多个类型标记
    pub fn markers(mut self, markers: impl IntoIterator<Item = Marker>) -> Self {
        self.markers.extend(markers);
        self
    }

    /// 声明实现的类型
    pub fn implements<T>(mut self, cast: fn(Arc<C>) -> Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.type_closure.push(TypeBinding::upcast::<C, T>(cast));
        self
    }

    /// 声明可被拦截的实现类型
    pub fn intercepted_as<T>(
        mut self,
        cast: fn(Arc<C>) -> Arc<T>,
        proxy: fn(Intercepted<C>) -> Arc<T>,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.type_closure
            .push(TypeBinding::intercepted::<C, T>(cast, proxy));
        self
    }

    /// 添加构造函数
    pub fn constructor(mut self, constructor: ConstructorMember) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// 添加注入构造函数
    pub fn inject_constructor<F>(self, params: Vec<Dependency>, factory: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        self.constructor(ConstructorMember::inject(params, factory))
    }

    /// 添加无参构造函数
    pub fn no_args<F>(self, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.constructor(ConstructorMember::no_args(factory))
    }

    /// 使用 `Default` 作为无参构造函数
    pub fn with_default(self) -> Self
    where
        C: Default,
    {
        self.no_args(C::default)
    }

    /// 配置类型自身层级的成员
    pub fn members(mut self, configure: impl FnOnce(HierarchyLevel) -> HierarchyLevel) -> Self {
        self.own = configure(self.own);
        self
    }

    /// 添加祖先层级，`depth` 从 1 开始，数值越大离根越近
    pub fn ancestor(
        mut self,
        depth: usize,
        name: impl Into<String>,
        configure: impl FnOnce(HierarchyLevel) -> HierarchyLevel,
    ) -> Self {
        self.ancestors
            .push(configure(HierarchyLevel::new(depth.max(1), name)));
        self
    }

    /// 标记为抽象类型，不能直接实例化
    pub fn abstract_type(mut self) -> Self {
        self.concrete = false;
        self
    }

    /// 构建类型描述
    pub fn build(self) -> Arc<dyn AnnotatedType> {
        Arc::new(self.build_type())
    }

    /// 构建具体的类型描述
    pub fn build_type(self) -> ComponentType {
        let mut levels = self.ancestors;
        levels.push(self.own);
        ComponentType {
            key: TypeKey::of::<C>(),
            markers: self.markers,
            type_closure: self.type_closure,
            constructors: self.constructors,
            levels: HierarchyLevels::new(levels),
            concrete: self.concrete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::unbox_reference;
    use di_common::SharedInstance;

    trait Speaker: Send + Sync {
        fn speak(&self) -> String;
    }

    #[derive(Default)]
    struct Parrot;

    impl Speaker for Parrot {
        fn speak(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_builder_collects_closure_and_levels() {
        let ty = ComponentType::builder::<Parrot>()
            .marker(Marker::application_scoped())
            .implements::<dyn Speaker>(|parrot| parrot)
            .with_default()
            .ancestor(1, "Bird", |level| level.marker(Marker::new("Logged")))
            .build();

        assert!(ty.has_marker(di_common::builtin::APPLICATION_SCOPED));
        assert_eq!(ty.simple_name(), "Parrot");
        assert_eq!(ty.type_closure().len(), 3);
        assert_eq!(ty.levels().len(), 2);
        assert_eq!(ty.levels().iter().next().map(HierarchyLevel::name), Some("Bird"));

        let raw: SharedInstance = Arc::from(
            ty.constructors()[0]
                .construct(&mut Arguments::default())
                .unwrap(),
        );
        let speaker = unbox_reference::<dyn Speaker>(ty.type_closure()[2].view(&raw).unwrap()).unwrap();
        assert_eq!(speaker.speak(), "hello");
    }
}
