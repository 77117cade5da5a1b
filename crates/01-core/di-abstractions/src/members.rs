//! 成员声明
//!
//! 构造函数、注入字段、初始化方法、生命周期回调、业务方法、拦截器方法、
//! 生产者和观察者方法。每个成员都是带类型的闭包，在声明处擦除为
//! `dyn Any`，由容器按层级顺序调用。

use crate::binding::{unbox_reference, TypeBinding};
use crate::dependency::{Arguments, Dependency, Lazy};
use crate::invocation::{handler, InterceptionKind, InterceptorHandler, InvocationContext, InvocationResult};
use di_common::{BoxError, BoxedValue, InvocationError, Marker, SharedInstance, TypeKey};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type ConstructFn = Arc<dyn Fn(&mut Arguments) -> Result<BoxedValue, BoxError> + Send + Sync>;
type FieldSetter =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), BoxedValue) -> Result<bool, InvocationError> + Send + Sync>;
type InitializerFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &mut Arguments) -> Result<(), BoxError> + Send + Sync>;
type ProduceFn =
    Arc<dyn Fn(Option<&SharedInstance>, &mut Arguments) -> Result<SharedInstance, BoxError> + Send + Sync>;
type DisposeFn =
    Arc<dyn Fn(Option<&SharedInstance>, &SharedInstance) -> Result<(), BoxError> + Send + Sync>;
type NotifyFn =
    Arc<dyn Fn(Option<&SharedInstance>, BoxedValue) -> Result<(), BoxError> + Send + Sync>;

fn target_unavailable(member: &str) -> BoxError {
    Box::new(InvocationError::TargetUnavailable {
        method: member.to_string(),
    })
}

fn same_object<T: ?Sized>(left: &Arc<T>, right: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(left).cast::<()>(), Arc::as_ptr(right).cast::<()>())
}

/// 构造函数
#[derive(Clone)]
pub struct ConstructorMember {
    injectable: bool,
    params: Vec<Dependency>,
    markers: Vec<Marker>,
    factory: ConstructFn,
}

impl ConstructorMember {
    /// 注入构造函数，参数按声明顺序解析
    pub fn inject<C, F>(params: Vec<Dependency>, factory: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Self {
            injectable: true,
            params,
            markers: vec![Marker::inject()],
            factory: Arc::new(move |args: &mut Arguments| {
                factory(args).map(|instance| Box::new(instance) as BoxedValue)
            }),
        }
    }

    /// 无参构造函数
    pub fn no_args<C, F>(factory: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            injectable: false,
            params: Vec::new(),
            markers: Vec::new(),
            factory: Arc::new(move |_: &mut Arguments| Ok(Box::new(factory()) as BoxedValue)),
        }
    }

    /// 添加成员标记（例如构造函数级拦截器绑定）
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 是否为注入构造函数
    pub fn is_injectable(&self) -> bool {
        self.injectable
    }

    /// 是否可作为默认构造函数
    pub fn is_no_args(&self) -> bool {
        !self.injectable && self.params.is_empty()
    }

    /// 参数依赖
    pub fn params(&self) -> &[Dependency] {
        &self.params
    }

    /// 成员标记
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// 调用构造函数
    pub fn construct(&self, args: &mut Arguments) -> Result<BoxedValue, BoxError> {
        (self.factory)(args)
    }
}

impl fmt::Debug for ConstructorMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorMember")
            .field("injectable", &self.injectable)
            .field("params", &self.params)
            .finish()
    }
}

/// 注入字段
#[derive(Clone)]
pub struct FieldMember {
    name: String,
    dependency: Dependency,
    setter: FieldSetter,
}

impl FieldMember {
    /// 引用字段，注入值为 `Arc<T>`
    ///
    /// 字段已经持有同一个对象时不会被覆盖
    pub fn new<C, T>(name: impl Into<String>, access: fn(&mut C) -> &mut Option<Arc<T>>) -> Self
    where
        C: Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            dependency: Dependency::of::<T>(),
            setter: Arc::new(
                move |target: &mut (dyn Any + Send + Sync),
                      value: BoxedValue|
                      -> Result<bool, InvocationError> {
                    let target = target
                        .downcast_mut::<C>()
                        .ok_or_else(|| InvocationError::TargetUnavailable {
                            method: member.clone(),
                        })?;
                    let value = unbox_reference::<T>(value).ok_or_else(|| {
                        InvocationError::ParameterTypeMismatch {
                            index: 0,
                            expected: std::any::type_name::<T>().to_string(),
                        }
                    })?;
                    let slot = access(target);
                    if slot.as_ref().is_some_and(|current| same_object(current, &value)) {
                        return Ok(false);
                    }
                    *slot = Some(value);
                    Ok(true)
                },
            ),
        }
    }

    /// 延迟引用字段，字段为空时才写入
    pub fn lazy<C, T>(name: impl Into<String>, access: fn(&mut C) -> &mut Option<Lazy<T>>) -> Self
    where
        C: Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            dependency: Dependency::lazy::<T>(),
            setter: Arc::new(
                move |target: &mut (dyn Any + Send + Sync),
                      value: BoxedValue|
                      -> Result<bool, InvocationError> {
                    let target = target
                        .downcast_mut::<C>()
                        .ok_or_else(|| InvocationError::TargetUnavailable {
                            method: member.clone(),
                        })?;
                    let value = value.downcast::<Lazy<T>>().map_err(|_| {
                        InvocationError::ParameterTypeMismatch {
                            index: 0,
                            expected: std::any::type_name::<Lazy<T>>().to_string(),
                        }
                    })?;
                    let slot = access(target);
                    if slot.is_some() {
                        return Ok(false);
                    }
                    *slot = Some(*value);
                    Ok(true)
                },
            ),
        }
    }

    /// 添加限定符
    pub fn qualified(mut self, qualifier: Marker) -> Self {
        self.dependency = self.dependency.qualified(qualifier);
        self
    }

    /// 标记为装饰器委托注入点
    pub fn delegate(mut self) -> Self {
        self.dependency = self.dependency.delegate();
        self
    }

    /// 字段名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 字段依赖
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// 写入字段，返回是否发生了改变
    pub fn inject(
        &self,
        target: &mut (dyn Any + Send + Sync),
        value: BoxedValue,
    ) -> Result<bool, InvocationError> {
        (self.setter)(target, value)
    }
}

impl fmt::Debug for FieldMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMember")
            .field("name", &self.name)
            .field("dependency", &self.dependency)
            .finish()
    }
}

/// 初始化方法，所有参数一起解析后调用一次
#[derive(Clone)]
pub struct InitializerMember {
    name: String,
    params: Vec<Dependency>,
    invoke: InitializerFn,
}

impl InitializerMember {
    /// 创建初始化方法
    pub fn new<C, F>(name: impl Into<String>, params: Vec<Dependency>, method: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&mut C, &mut Arguments) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            params,
            invoke: Arc::new(
                move |target: &mut (dyn Any + Send + Sync),
                      args: &mut Arguments|
                      -> Result<(), BoxError> {
                    let target = target
                        .downcast_mut::<C>()
                        .ok_or_else(|| target_unavailable(&member))?;
                    method(target, args)
                },
            ),
        }
    }

    /// 方法名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 参数依赖
    pub fn params(&self) -> &[Dependency] {
        &self.params
    }

    /// 调用初始化方法
    pub fn invoke(
        &self,
        target: &mut (dyn Any + Send + Sync),
        args: &mut Arguments,
    ) -> Result<(), BoxError> {
        (self.invoke)(target, args)
    }
}

impl fmt::Debug for InitializerMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializerMember")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// 生命周期回调类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackKind {
    /// 初始化回调
    PostConstruct,
    /// 销毁回调
    PreDestroy,
}

#[derive(Clone)]
enum CallbackFn {
    Mutable(Arc<dyn Fn(&mut (dyn Any + Send + Sync)) -> Result<(), BoxError> + Send + Sync>),
    Shared(Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), BoxError> + Send + Sync>),
}

/// 生命周期回调
///
/// `is_static` 和 `param_count` 描述扫描到的方法签名，不合法的回调在验证时
/// 记录为定义错误
#[derive(Clone)]
pub struct LifecycleCallback {
    name: String,
    kind: CallbackKind,
    is_static: bool,
    param_count: usize,
    callback: CallbackFn,
}

impl LifecycleCallback {
    /// 初始化回调，在实例发布前以可变借用调用
    pub fn post_construct<C, F>(name: impl Into<String>, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&mut C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            kind: CallbackKind::PostConstruct,
            is_static: false,
            param_count: 0,
            callback: CallbackFn::Mutable(Arc::new(move |target: &mut (dyn Any + Send + Sync)| -> Result<(), BoxError> {
                let target = target
                    .downcast_mut::<C>()
                    .ok_or_else(|| target_unavailable(&member))?;
                callback(target)
            })),
        }
    }

    /// 销毁回调
    pub fn pre_destroy<C, F>(name: impl Into<String>, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            kind: CallbackKind::PreDestroy,
            is_static: false,
            param_count: 0,
            callback: CallbackFn::Shared(Arc::new(move |target: &(dyn Any + Send + Sync)| -> Result<(), BoxError> {
                let target = target
                    .downcast_ref::<C>()
                    .ok_or_else(|| target_unavailable(&member))?;
                callback(target)
            })),
        }
    }

    /// 声明方法是否为静态方法
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// 声明方法参数个数
    pub fn with_param_count(mut self, count: usize) -> Self {
        self.param_count = count;
        self
    }

    /// 回调名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 回调类型
    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// 是否为静态方法
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// 参数个数
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// 以可变借用调用
    pub fn invoke_mut(&self, target: &mut (dyn Any + Send + Sync)) -> Result<(), BoxError> {
        match &self.callback {
            CallbackFn::Mutable(callback) => callback(target),
            CallbackFn::Shared(callback) => callback(&*target),
        }
    }

    /// 以共享借用调用
    pub fn invoke(&self, target: &(dyn Any + Send + Sync)) -> Result<(), BoxError> {
        match &self.callback {
            CallbackFn::Shared(callback) => callback(target),
            CallbackFn::Mutable(_) => Err(target_unavailable(&self.name)),
        }
    }
}

impl fmt::Debug for LifecycleCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallback")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_static", &self.is_static)
            .field("param_count", &self.param_count)
            .finish()
    }
}

/// 业务方法的元数据（方法级拦截器绑定和排除标记）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessMethod {
    name: String,
    markers: Vec<Marker>,
}

impl BusinessMethod {
    /// 创建业务方法声明
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: Vec::new(),
        }
    }

    /// 添加方法标记
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 方法名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 方法标记
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// 是否带有指定标记
    pub fn has_marker(&self, kind: &str) -> bool {
        self.markers.iter().any(|marker| marker.is(kind))
    }
}

/// 拦截器方法
///
/// 在拦截器类型上声明时为拦截器处理方法；在普通 Bean 上声明的
/// `AroundInvoke` 方法是目标类拦截方法
#[derive(Clone)]
pub struct InterceptorMethod {
    kind: InterceptionKind,
    name: String,
    handler: InterceptorHandler,
}

impl InterceptorMethod {
    /// 创建拦截器方法
    pub fn new<I, F>(kind: InterceptionKind, name: impl Into<String>, method: F) -> Self
    where
        I: Send + Sync + 'static,
        F: Fn(&I, &mut InvocationContext<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            kind,
            name,
            handler: handler(move |instance, ctx| {
                let interceptor = instance
                    .downcast_ref::<I>()
                    .ok_or_else(|| target_unavailable(&member))?;
                method(interceptor, ctx)
            }),
        }
    }

    /// 拦截类型
    pub fn kind(&self) -> InterceptionKind {
        self.kind
    }

    /// 方法名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 处理方法
    pub fn handler(&self) -> &InterceptorHandler {
        &self.handler
    }
}

impl fmt::Debug for InterceptorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorMethod")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// 生产者类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProducerKind {
    /// 生产者方法
    Method,
    /// 生产者字段
    Field,
}

/// 生产者成员
///
/// 产出值在容器中以 `Arc<P>` 保存，类型闭包默认包含 `P` 和通用类型
#[derive(Clone)]
pub struct ProducerMember {
    name: String,
    kind: ProducerKind,
    markers: Vec<Marker>,
    is_static: bool,
    params: Vec<Dependency>,
    type_closure: Vec<TypeBinding>,
    produce: ProduceFn,
    disposer: Option<DisposeFn>,
}

impl ProducerMember {
    fn build<P: ?Sized + Send + Sync + 'static>(
        name: String,
        kind: ProducerKind,
        is_static: bool,
        params: Vec<Dependency>,
        produce: ProduceFn,
    ) -> Self {
        Self {
            name,
            kind,
            markers: vec![Marker::new(di_common::builtin::PRODUCES)],
            is_static,
            params,
            type_closure: vec![TypeBinding::product::<P>(), TypeBinding::object()],
            produce,
            disposer: None,
        }
    }

    /// 生产者方法，在声明 Bean 的上下文实例上调用
    pub fn method<D, P, F>(name: impl Into<String>, params: Vec<Dependency>, method: F) -> Self
    where
        D: Send + Sync + 'static,
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&D, &mut Arguments) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        let produce: ProduceFn = Arc::new(
            move |declaring: Option<&SharedInstance>,
                  args: &mut Arguments|
                  -> Result<SharedInstance, BoxError> {
                let declaring = declaring
                    .and_then(|raw| raw.downcast_ref::<D>())
                    .ok_or_else(|| target_unavailable(&member))?;
                let product = method(declaring, args)?;
                Ok(Arc::new(product) as SharedInstance)
            },
        );
        Self::build::<P>(name, ProducerKind::Method, false, params, produce)
    }

    /// 静态生产者方法
    pub fn static_method<P, F>(name: impl Into<String>, params: Vec<Dependency>, method: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        let produce: ProduceFn = Arc::new(
            move |_: Option<&SharedInstance>, args: &mut Arguments| -> Result<SharedInstance, BoxError> {
                let product = method(args)?;
                Ok(Arc::new(product) as SharedInstance)
            },
        );
        Self::build::<P>(name.into(), ProducerKind::Method, true, params, produce)
    }

    /// 生产者字段，读取声明 Bean 上下文实例的字段值
    pub fn field<D, P, F>(name: impl Into<String>, read: F) -> Self
    where
        D: Send + Sync + 'static,
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&D) -> Arc<P> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        let produce: ProduceFn = Arc::new(
            move |declaring: Option<&SharedInstance>,
                  _: &mut Arguments|
                  -> Result<SharedInstance, BoxError> {
                let declaring = declaring
                    .and_then(|raw| raw.downcast_ref::<D>())
                    .ok_or_else(|| target_unavailable(&member))?;
                Ok(Arc::new(read(declaring)) as SharedInstance)
            },
        );
        Self::build::<P>(name, ProducerKind::Field, false, Vec::new(), produce)
    }

    /// 添加成员标记（限定符、作用域、名称、备选等）
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 产出类型实现的另一个类型
    pub fn with_type<P, T>(mut self, cast: fn(Arc<P>) -> Arc<T>) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.type_closure.push(TypeBinding::product_as::<P, T>(cast));
        self
    }

    /// 销毁方法，在声明 Bean 的上下文实例上调用
    pub fn disposer<D, P, F>(mut self, dispose: F) -> Self
    where
        D: Send + Sync + 'static,
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&D, Arc<P>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let member = self.name.clone();
        self.disposer = Some(Arc::new(
            move |declaring: Option<&SharedInstance>,
                  product: &SharedInstance|
                  -> Result<(), BoxError> {
                let declaring = declaring
                    .and_then(|raw| raw.downcast_ref::<D>())
                    .ok_or_else(|| target_unavailable(&member))?;
                let product = product
                    .downcast_ref::<Arc<P>>()
                    .ok_or_else(|| target_unavailable(&member))?;
                dispose(declaring, Arc::clone(product))
            },
        ));
        self
    }

    /// 静态销毁方法
    pub fn static_disposer<P, F>(mut self, dispose: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<P>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let member = self.name.clone();
        self.disposer = Some(Arc::new(
            move |_: Option<&SharedInstance>, product: &SharedInstance| -> Result<(), BoxError> {
                let product = product
                    .downcast_ref::<Arc<P>>()
                    .ok_or_else(|| target_unavailable(&member))?;
                dispose(Arc::clone(product))
            },
        ));
        self
    }

    /// 成员名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 生产者类型
    pub fn kind(&self) -> ProducerKind {
        self.kind
    }

    /// 成员标记
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// 是否带有指定标记
    pub fn has_marker(&self, kind: &str) -> bool {
        self.markers.iter().any(|marker| marker.is(kind))
    }

    /// 是否为静态成员
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// 参数依赖
    pub fn params(&self) -> &[Dependency] {
        &self.params
    }

    /// 产出值的类型闭包
    pub fn type_closure(&self) -> &[TypeBinding] {
        &self.type_closure
    }

    /// 是否声明了销毁方法
    pub fn has_disposer(&self) -> bool {
        self.disposer.is_some()
    }

    /// 销毁方法是否需要声明 Bean 的实例
    pub fn disposer_needs_instance(&self) -> bool {
        self.disposer.is_some() && !self.is_static
    }

    /// 调用生产者
    pub fn produce(
        &self,
        declaring: Option<&SharedInstance>,
        args: &mut Arguments,
    ) -> Result<SharedInstance, BoxError> {
        (self.produce)(declaring, args)
    }

    /// 调用销毁方法；没有销毁方法时什么都不做
    pub fn dispose(
        &self,
        declaring: Option<&SharedInstance>,
        product: &SharedInstance,
    ) -> Result<(), BoxError> {
        match &self.disposer {
            Some(dispose) => dispose(declaring, product),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ProducerMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerMember")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("markers", &self.markers)
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// 观察者投递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObserverMode {
    /// 同步投递
    Sync,
    /// 异步投递
    Async,
}

/// 观察者方法
#[derive(Clone)]
pub struct ObserverMember {
    name: String,
    observed: TypeKey,
    qualifiers: Vec<Marker>,
    mode: ObserverMode,
    is_static: bool,
    notify: NotifyFn,
}

impl ObserverMember {
    /// 在 Bean 实例上调用的观察者方法，观察类型可以是 trait object
    pub fn new<C, E, F>(name: impl Into<String>, observer: F) -> Self
    where
        C: Send + Sync + 'static,
        E: ?Sized + Send + Sync + 'static,
        F: Fn(&C, &E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            observed: TypeKey::of::<E>(),
            qualifiers: Vec::new(),
            mode: ObserverMode::Sync,
            is_static: false,
            notify: Arc::new(
                move |bean: Option<&SharedInstance>, event: BoxedValue| -> Result<(), BoxError> {
                    let bean = bean
                        .and_then(|raw| raw.downcast_ref::<C>())
                        .ok_or_else(|| target_unavailable(&member))?;
                    let event = unbox_reference::<E>(event).ok_or_else(|| target_unavailable(&member))?;
                    observer(bean, &event)
                },
            ),
        }
    }

    /// 不依赖 Bean 实例的观察者
    pub fn new_static<E, F>(name: impl Into<String>, observer: F) -> Self
    where
        E: ?Sized + Send + Sync + 'static,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        Self {
            name,
            observed: TypeKey::of::<E>(),
            qualifiers: Vec::new(),
            mode: ObserverMode::Sync,
            is_static: true,
            notify: Arc::new(
                move |_: Option<&SharedInstance>, event: BoxedValue| -> Result<(), BoxError> {
                    let event = unbox_reference::<E>(event).ok_or_else(|| target_unavailable(&member))?;
                    observer(&event)
                },
            ),
        }
    }

    /// 添加限定符
    pub fn qualified(mut self, qualifier: Marker) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// 设置为异步观察者
    pub fn asynchronous(mut self) -> Self {
        self.mode = ObserverMode::Async;
        self
    }

    /// 方法名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 观察的事件类型
    pub fn observed(&self) -> TypeKey {
        self.observed
    }

    /// 声明的限定符
    pub fn qualifiers(&self) -> &[Marker] {
        &self.qualifiers
    }

    /// 投递方式
    pub fn mode(&self) -> ObserverMode {
        self.mode
    }

    /// 是否不依赖 Bean 实例
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// 通知观察者，`event` 内部为观察类型的 `Arc<E>`
    pub fn notify(&self, bean: Option<&SharedInstance>, event: BoxedValue) -> Result<(), BoxError> {
        (self.notify)(bean, event)
    }
}

impl fmt::Debug for ObserverMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverMember")
            .field("name", &self.name)
            .field("observed", &self.observed)
            .field("qualifiers", &self.qualifiers)
            .field("mode", &self.mode)
            .finish()
    }
}

/// 类型层级中的一层
///
/// `depth` 为 0 表示类型自身，数值越大离根越近
#[derive(Debug, Clone, Default)]
pub struct HierarchyLevel {
    depth: usize,
    name: String,
    markers: Vec<Marker>,
    fields: Vec<FieldMember>,
    initializers: Vec<InitializerMember>,
    post_construct: Vec<LifecycleCallback>,
    pre_destroy: Vec<LifecycleCallback>,
    business_methods: Vec<BusinessMethod>,
    interceptor_methods: Vec<InterceptorMethod>,
    producers: Vec<ProducerMember>,
    observers: Vec<ObserverMember>,
}

impl HierarchyLevel {
    /// 创建层级
    pub fn new(depth: usize, name: impl Into<String>) -> Self {
        Self {
            depth,
            name: name.into(),
            ..Self::default()
        }
    }

    /// 添加层级上声明的类型标记（用于继承的拦截器绑定）
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// 添加注入字段
    pub fn field(mut self, field: FieldMember) -> Self {
        self.fields.push(field);
        self
    }

    /// 添加初始化方法
    pub fn initializer(mut self, initializer: InitializerMember) -> Self {
        self.initializers.push(initializer);
        self
    }

    /// 添加生命周期回调
    pub fn callback(mut self, callback: LifecycleCallback) -> Self {
        match callback.kind() {
            CallbackKind::PostConstruct => self.post_construct.push(callback),
            CallbackKind::PreDestroy => self.pre_destroy.push(callback),
        }
        self
    }

    /// 添加初始化回调
    pub fn post_construct<C, F>(self, name: impl Into<String>, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&mut C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.callback(LifecycleCallback::post_construct(name, callback))
    }

    /// 添加销毁回调
    pub fn pre_destroy<C, F>(self, name: impl Into<String>, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.callback(LifecycleCallback::pre_destroy(name, callback))
    }

    /// 添加业务方法声明
    pub fn business_method(mut self, method: BusinessMethod) -> Self {
        self.business_methods.push(method);
        self
    }

    /// 添加拦截器方法
    pub fn interceptor_method(mut self, method: InterceptorMethod) -> Self {
        self.interceptor_methods.push(method);
        self
    }

    /// 添加拦截器方法
    pub fn intercept<I, F>(self, kind: InterceptionKind, name: impl Into<String>, method: F) -> Self
    where
        I: Send + Sync + 'static,
        F: Fn(&I, &mut InvocationContext<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        self.interceptor_method(InterceptorMethod::new(kind, name, method))
    }

    /// 添加生产者
    pub fn producer(mut self, producer: ProducerMember) -> Self {
        self.producers.push(producer);
        self
    }

    /// 添加观察者方法
    pub fn observer(mut self, observer: ObserverMember) -> Self {
        self.observers.push(observer);
        self
    }

    /// 层级深度
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 层级名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 层级标记
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// 注入字段
    pub fn fields(&self) -> &[FieldMember] {
        &self.fields
    }

    /// 初始化方法
    pub fn initializers(&self) -> &[InitializerMember] {
        &self.initializers
    }

    /// 初始化回调
    pub fn post_construct_callbacks(&self) -> &[LifecycleCallback] {
        &self.post_construct
    }

    /// 销毁回调
    pub fn pre_destroy_callbacks(&self) -> &[LifecycleCallback] {
        &self.pre_destroy
    }

    /// 业务方法
    pub fn business_methods(&self) -> &[BusinessMethod] {
        &self.business_methods
    }

    /// 拦截器方法
    pub fn interceptor_methods(&self) -> &[InterceptorMethod] {
        &self.interceptor_methods
    }

    /// 生产者
    pub fn producers(&self) -> &[ProducerMember] {
        &self.producers
    }

    /// 观察者方法
    pub fn observers(&self) -> &[ObserverMember] {
        &self.observers
    }
}

/// 按祖先优先顺序排好的类型层级
#[derive(Debug, Clone, Default)]
pub struct HierarchyLevels {
    levels: Vec<HierarchyLevel>,
}

impl HierarchyLevels {
    /// 创建层级列表并按祖先优先排序
    pub fn new(mut levels: Vec<HierarchyLevel>) -> Self {
        levels.sort_by(|left, right| right.depth.cmp(&left.depth));
        Self { levels }
    }

    /// 祖先优先遍历
    pub fn iter(&self) -> impl Iterator<Item = &HierarchyLevel> {
        self.levels.iter()
    }

    /// 类型自身所在的层级
    pub fn own(&self) -> Option<&HierarchyLevel> {
        self.levels.iter().find(|level| level.depth == 0)
    }

    /// 祖先层级（不含类型自身）
    pub fn ancestors(&self) -> impl Iterator<Item = &HierarchyLevel> {
        self.levels.iter().filter(|level| level.depth > 0)
    }

    /// 层级个数
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// 是否没有层级
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// 所有注入字段，祖先优先
    pub fn fields(&self) -> impl Iterator<Item = &FieldMember> {
        self.levels.iter().flat_map(|level| level.fields.iter())
    }

    /// 所有初始化方法，祖先优先
    pub fn initializers(&self) -> impl Iterator<Item = &InitializerMember> {
        self.levels.iter().flat_map(|level| level.initializers.iter())
    }

    /// 所有初始化回调，祖先优先
    pub fn post_construct_callbacks(&self) -> impl Iterator<Item = &LifecycleCallback> {
        self.levels.iter().flat_map(|level| level.post_construct.iter())
    }

    /// 所有销毁回调，祖先优先
    pub fn pre_destroy_callbacks(&self) -> impl Iterator<Item = &LifecycleCallback> {
        self.levels.iter().flat_map(|level| level.pre_destroy.iter())
    }

    /// 所有生产者
    pub fn producers(&self) -> impl Iterator<Item = &ProducerMember> {
        self.levels.iter().flat_map(|level| level.producers.iter())
    }

    /// 所有观察者方法
    pub fn observers(&self) -> impl Iterator<Item = &ObserverMember> {
        self.levels.iter().flat_map(|level| level.observers.iter())
    }

    /// 所有拦截器方法，祖先优先
    pub fn interceptor_methods(&self) -> impl Iterator<Item = &InterceptorMethod> {
        self.levels
            .iter()
            .flat_map(|level| level.interceptor_methods.iter())
    }

    /// 按名称查找业务方法，子类声明覆盖祖先声明
    pub fn business_method(&self, name: &str) -> Option<&BusinessMethod> {
        self.levels
            .iter()
            .rev()
            .flat_map(|level| level.business_methods.iter())
            .find(|method| method.name() == name)
    }

    /// 所有业务方法
    pub fn business_methods(&self) -> impl Iterator<Item = &BusinessMethod> {
        self.levels
            .iter()
            .flat_map(|level| level.business_methods.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Holder {
        value: Option<Arc<String>>,
    }

    #[test]
    fn test_field_write_if_changed() {
        let field = FieldMember::new::<Holder, String>("value", |holder| &mut holder.value);
        let shared = Arc::new("a".to_string());
        let mut holder = Holder::default();

        assert!(field
            .inject(&mut holder, Box::new(Arc::clone(&shared)))
            .unwrap());
        assert!(!field
            .inject(&mut holder, Box::new(Arc::clone(&shared)))
            .unwrap());
        assert!(field
            .inject(&mut holder, Box::new(Arc::new("a".to_string())))
            .unwrap());
    }

    #[test]
    fn test_levels_sorted_ancestor_first() {
        let levels = HierarchyLevels::new(vec![
            HierarchyLevel::new(0, "Child"),
            HierarchyLevel::new(2, "Root"),
            HierarchyLevel::new(1, "Parent"),
        ]);
        let names: Vec<&str> = levels.iter().map(HierarchyLevel::name).collect();
        assert_eq!(names, vec!["Root", "Parent", "Child"]);
        assert_eq!(levels.own().map(HierarchyLevel::name), Some("Child"));
    }

    #[test]
    fn test_business_method_override() {
        let levels = HierarchyLevels::new(vec![
            HierarchyLevel::new(1, "Base")
                .business_method(BusinessMethod::new("run").marker(Marker::new("Logged"))),
            HierarchyLevel::new(0, "Impl").business_method(BusinessMethod::new("run")),
        ]);
        assert!(levels.business_method("run").unwrap().markers().is_empty());
    }

    #[test]
    fn test_producer_product_view() {
        struct Factory;
        let producer = ProducerMember::method::<Factory, String, _>("make", Vec::new(), |_, _| {
            Ok(Arc::new("made".to_string()))
        });
        let declaring: SharedInstance = Arc::new(Factory);
        let product = producer
            .produce(Some(&declaring), &mut Arguments::default())
            .unwrap();
        let view = producer.type_closure()[0].view(&product).unwrap();
        assert_eq!(*unbox_reference::<String>(view).unwrap(), "made");
    }
}
