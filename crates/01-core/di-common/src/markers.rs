//! 声明式标记定义
//!
//! 标记相当于附加在类型或成员上的注解：由标记类型名称和成员值组成。
//! 标记本身不带语义，限定符、作用域、构造型和拦截器绑定的判定由注册表
//! 通过标记类型的元标记（或扩展注册的合成表）完成。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 内置标记类型名称
pub mod builtin {
    /// 默认限定符
    pub const DEFAULT: &str = "Default";
    /// 任意限定符，所有 Bean 都具有
    pub const ANY: &str = "Any";
    /// 名称限定符
    pub const NAMED: &str = "Named";
    /// 注入标记（构造函数、字段、初始化方法）
    pub const INJECT: &str = "Inject";
    /// 生产者标记
    pub const PRODUCES: &str = "Produces";
    /// 销毁方法参数标记
    pub const DISPOSES: &str = "Disposes";
    /// 装饰器委托注入点标记
    pub const DELEGATE: &str = "Delegate";

    /// 单例作用域（伪作用域，容器内唯一）
    pub const SINGLETON: &str = "Singleton";
    /// 应用作用域
    pub const APPLICATION_SCOPED: &str = "ApplicationScoped";
    /// 请求作用域
    pub const REQUEST_SCOPED: &str = "RequestScoped";
    /// 依赖作用域（伪作用域，每次解析创建新实例）
    pub const DEPENDENT: &str = "Dependent";

    /// 备选 Bean 标记
    pub const ALTERNATIVE: &str = "Alternative";
    /// 优先级标记，成员 `value`
    pub const PRIORITY: &str = "Priority";
    /// 拦截器类型标记
    pub const INTERCEPTOR: &str = "Interceptor";
    /// 装饰器类型标记
    pub const DECORATOR: &str = "Decorator";
    /// 排除类型
    pub const VETOED: &str = "Vetoed";
    /// 启动时立即实例化
    pub const EAGER: &str = "Eager";
    /// 排除默认拦截器
    pub const EXCLUDE_DEFAULT_INTERCEPTORS: &str = "ExcludeDefaultInterceptors";
    /// 排除类级拦截器
    pub const EXCLUDE_CLASS_INTERCEPTORS: &str = "ExcludeClassInterceptors";

    /// 元标记：限定符
    pub const QUALIFIER: &str = "Qualifier";
    /// 元标记：伪作用域
    pub const SCOPE: &str = "Scope";
    /// 元标记：正常作用域
    pub const NORMAL_SCOPE: &str = "NormalScope";
    /// 元标记：构造型
    pub const STEREOTYPE: &str = "Stereotype";
    /// 元标记：拦截器绑定
    pub const INTERCEPTOR_BINDING: &str = "InterceptorBinding";

    /// 标记成员的默认名称
    pub const VALUE: &str = "value";
}

/// 标记成员值
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerValue {
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 字符串
    Str(String),
    /// 列表
    List(Vec<MarkerValue>),
}

impl MarkerValue {
    /// 获取整数值
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// 获取字符串值
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// 获取布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Str(value) => write!(f, "\"{}\"", value),
            Self::List(values) => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<bool> for MarkerValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MarkerValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MarkerValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for MarkerValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MarkerValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<MarkerValue>> From<Vec<T>> for MarkerValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// 声明式标记
///
/// 标记之间的相等性比较所有成员；注册表比较限定符和拦截器绑定时
/// 会忽略标记类型声明的非绑定成员
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Marker {
    /// 标记类型名称
    kind: String,
    /// 成员值
    #[serde(default)]
    members: BTreeMap<String, MarkerValue>,
}

impl Marker {
    /// 创建没有成员的标记
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            members: BTreeMap::new(),
        }
    }

    /// 设置成员值
    pub fn with(mut self, member: impl Into<String>, value: impl Into<MarkerValue>) -> Self {
        self.members.insert(member.into(), value.into());
        self
    }

    /// 设置 `value` 成员
    pub fn with_value(self, value: impl Into<MarkerValue>) -> Self {
        self.with(builtin::VALUE, value)
    }

    /// 标记类型名称
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// 是否为指定类型的标记
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// 获取成员值
    pub fn member(&self, member: &str) -> Option<&MarkerValue> {
        self.members.get(member)
    }

    /// 获取 `value` 成员
    pub fn value(&self) -> Option<&MarkerValue> {
        self.member(builtin::VALUE)
    }

    /// 所有成员
    pub fn members(&self) -> &BTreeMap<String, MarkerValue> {
        &self.members
    }

    /// 去掉指定成员后的副本，用于忽略非绑定成员的比较
    pub fn without_members(&self, excluded: &BTreeSet<String>) -> Self {
        Self {
            kind: self.kind.clone(),
            members: self
                .members
                .iter()
                .filter(|(name, _)| !excluded.contains(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// `@Default`
    pub fn default_qualifier() -> Self {
        Self::new(builtin::DEFAULT)
    }

    /// `@Any`
    pub fn any() -> Self {
        Self::new(builtin::ANY)
    }

    /// `@Named(value)`
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(builtin::NAMED).with_value(name.into())
    }

    /// `@Inject`
    pub fn inject() -> Self {
        Self::new(builtin::INJECT)
    }

    /// `@Priority(value)`
    pub fn priority(value: i64) -> Self {
        Self::new(builtin::PRIORITY).with_value(value)
    }

    /// `@Alternative`
    pub fn alternative() -> Self {
        Self::new(builtin::ALTERNATIVE)
    }

    /// `@Interceptor`
    pub fn interceptor() -> Self {
        Self::new(builtin::INTERCEPTOR)
    }

    /// `@Decorator`
    pub fn decorator() -> Self {
        Self::new(builtin::DECORATOR)
    }

    /// `@Singleton`
    pub fn singleton() -> Self {
        Self::new(builtin::SINGLETON)
    }

    /// `@ApplicationScoped`
    pub fn application_scoped() -> Self {
        Self::new(builtin::APPLICATION_SCOPED)
    }

    /// `@RequestScoped`
    pub fn request_scoped() -> Self {
        Self::new(builtin::REQUEST_SCOPED)
    }

    /// `@Dependent`
    pub fn dependent() -> Self {
        Self::new(builtin::DEPENDENT)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.kind)?;
        if !self.members.is_empty() {
            let members: Vec<String> = self
                .members
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            write!(f, "({})", members.join(", "))?;
        }
        Ok(())
    }
}

/// 将一组标记格式化为字符串，用于错误信息
pub fn format_markers(markers: &[Marker]) -> String {
    if markers.is_empty() {
        return "{}".to_string();
    }
    let items: Vec<String> = markers.iter().map(ToString::to_string).collect();
    format!("{{{}}}", items.join(", "))
}

/// 可以转换为标记的类型
///
/// `#[derive(Marker)]` 会为结构体生成该 trait 的实现
pub trait MarkerLiteral {
    /// 标记类型名称
    const KIND: &'static str;

    /// 转换为标记实例
    fn to_marker(&self) -> Marker;

    /// 标记类型的声明
    fn definition() -> MarkerDefinition;
}

/// 标记类型的角色，由合成覆盖表使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRole {
    /// 限定符
    Qualifier,
    /// 伪作用域
    PseudoScope,
    /// 正常作用域
    NormalScope,
    /// 构造型
    Stereotype,
    /// 拦截器绑定
    InterceptorBinding,
}

impl MarkerRole {
    /// 对应的元标记名称
    pub fn meta_marker(&self) -> &'static str {
        match self {
            Self::Qualifier => builtin::QUALIFIER,
            Self::PseudoScope => builtin::SCOPE,
            Self::NormalScope => builtin::NORMAL_SCOPE,
            Self::Stereotype => builtin::STEREOTYPE,
            Self::InterceptorBinding => builtin::INTERCEPTOR_BINDING,
        }
    }

    /// 是否为作用域
    pub fn is_scope(&self) -> bool {
        matches!(self, Self::PseudoScope | Self::NormalScope)
    }
}

/// 标记类型声明
///
/// 相当于注解类型本身：携带元标记（如 `Qualifier`、`Stereotype`），
/// 构造型额外携带被捆绑的标记，拦截器绑定可以携带继承的绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerDefinition {
    /// 标记类型名称
    kind: String,
    /// 元标记
    #[serde(default)]
    meta: Vec<Marker>,
    /// 非绑定成员
    #[serde(default)]
    nonbinding: BTreeSet<String>,
}

impl MarkerDefinition {
    /// 创建新的标记声明
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            meta: Vec::new(),
            nonbinding: BTreeSet::new(),
        }
    }

    /// 按角色创建标记声明
    pub fn with_role(kind: impl Into<String>, role: MarkerRole) -> Self {
        Self::new(kind).with_meta(Marker::new(role.meta_marker()))
    }

    /// 限定符声明
    pub fn qualifier(kind: impl Into<String>) -> Self {
        Self::with_role(kind, MarkerRole::Qualifier)
    }

    /// 拦截器绑定声明
    pub fn interceptor_binding(kind: impl Into<String>) -> Self {
        Self::with_role(kind, MarkerRole::InterceptorBinding)
    }

    /// 正常作用域声明
    pub fn normal_scope(kind: impl Into<String>) -> Self {
        Self::with_role(kind, MarkerRole::NormalScope)
    }

    /// 伪作用域声明
    pub fn pseudo_scope(kind: impl Into<String>) -> Self {
        Self::with_role(kind, MarkerRole::PseudoScope)
    }

    /// 构造型声明，携带被捆绑的标记
    pub fn stereotype(kind: impl Into<String>, markers: Vec<Marker>) -> Self {
        let mut definition = Self::with_role(kind, MarkerRole::Stereotype);
        definition.meta.extend(markers);
        definition
    }

    /// 添加元标记
    pub fn with_meta(mut self, marker: Marker) -> Self {
        self.meta.push(marker);
        self
    }

    /// 声明非绑定成员
    pub fn with_nonbinding(mut self, member: impl Into<String>) -> Self {
        self.nonbinding.insert(member.into());
        self
    }

    /// 标记类型名称
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// 所有元标记
    pub fn meta(&self) -> &[Marker] {
        &self.meta
    }

    /// 是否带有指定元标记
    pub fn has_meta(&self, kind: &str) -> bool {
        self.meta.iter().any(|marker| marker.is(kind))
    }

    /// 非绑定成员
    pub fn nonbinding(&self) -> &BTreeSet<String> {
        &self.nonbinding
    }

    /// 除角色元标记以外携带的标记（构造型捆绑的标记、继承的拦截器绑定）
    pub fn carried(&self) -> impl Iterator<Item = &Marker> {
        self.meta.iter().filter(|marker| {
            ![
                builtin::QUALIFIER,
                builtin::SCOPE,
                builtin::NORMAL_SCOPE,
                builtin::STEREOTYPE,
                builtin::INTERCEPTOR_BINDING,
            ]
            .contains(&marker.kind())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_equality_uses_members() {
        let a = Marker::new("Cached").with("region", "users");
        let b = Marker::new("Cached").with("region", "users");
        let c = Marker::new("Cached").with("region", "orders");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_without_members_drops_nonbinding() {
        let marker = Marker::new("Logged").with("level", "debug").with("comment", "x");
        let excluded: BTreeSet<String> = ["comment".to_string()].into_iter().collect();
        assert_eq!(
            marker.without_members(&excluded),
            Marker::new("Logged").with("level", "debug")
        );
    }

    #[test]
    fn test_stereotype_carried_markers() {
        let definition = MarkerDefinition::stereotype(
            "Service",
            vec![Marker::application_scoped(), Marker::new("Logged")],
        );
        assert!(definition.has_meta(builtin::STEREOTYPE));
        let carried: Vec<&str> = definition.carried().map(Marker::kind).collect();
        assert_eq!(carried, vec![builtin::APPLICATION_SCOPED, "Logged"]);
    }

    #[test]
    fn test_marker_display() {
        let marker = Marker::named("greeter");
        assert_eq!(marker.to_string(), "@Named(value=\"greeter\")");
        assert_eq!(format_markers(&[]), "{}");
    }

    #[test]
    fn test_marker_deserialize() {
        let marker: Marker =
            serde_json::from_str(r#"{"kind":"Priority","members":{"value":100}}"#).unwrap();
        assert_eq!(marker, Marker::priority(100));
    }
}
