//! 类型标识定义
//!
//! 提供类型闭包中使用的类型标识以及类型擦除后的实例别名

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 类型擦除后的共享实例
///
/// 容器内部保存的原始实例，实际内容为 `Arc<C>`
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

/// 类型擦除后的值
///
/// 注入引用时内部为请求类型的 `Arc<T>`；作为方法参数或返回值时为任意值
pub type BoxedValue = Box<dyn Any + Send + Sync>;

/// 类型标识
///
/// 同时支持具体类型和 trait object（`dyn Trait`），按 [`TypeId`] 比较
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// 从类型获取类型标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 所有 Bean 和事件都具有的通用类型
    pub fn object() -> Self {
        Self {
            id: TypeId::of::<dyn Any + Send + Sync>(),
            name: "Object",
        }
    }

    /// 是否为通用类型
    pub fn is_object(&self) -> bool {
        self.id == TypeId::of::<dyn Any + Send + Sync>()
    }

    /// 类型ID
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 完整类型名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 简短的类型名称（不包含模块路径和泛型参数）
    pub fn simple_name(&self) -> &'static str {
        let name = self.name.trim_start_matches("dyn ");
        let name = name.split('<').next().unwrap_or(name);
        name.rsplit("::").next().unwrap_or(name)
    }

    /// 检查名称是否指向该类型（完整名称或简短名称）
    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.trim();
        self.name == name
            || self.name.trim_start_matches("dyn ") == name
            || self.simple_name() == name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Bean 标识
///
/// 注册表按发现顺序分配，发现顺序同时用于拦截器排序的平局裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanId(pub usize);

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
