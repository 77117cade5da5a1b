//! 类型扫描器抽象接口
//!
//! 扫描机制本身不属于容器，容器只需要类型句柄的集合和过滤钩子

use crate::annotated::AnnotatedType;
use async_trait::async_trait;
use di_common::ComponentError;
use std::sync::Arc;

/// 类型扫描器 trait
#[async_trait]
pub trait TypeScanner: Send + Sync {
    /// 扫描指定目标中的类型
    async fn scan(&self, target: &ScanTarget) -> Result<Vec<Arc<dyn AnnotatedType>>, ComponentError>;

    /// 获取扫描器名称
    fn name(&self) -> &str;

    /// 检查是否支持指定的扫描目标
    fn supports(&self, target: &ScanTarget) -> bool;
}

/// 扫描目标类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    /// 扫描指定的 crate
    Crate(String),
    /// 扫描指定的模块路径（包含子模块）
    Module(String),
    /// 扫描所有已知类型
    All,
}

impl ScanTarget {
    /// 获取扫描目标的字符串表示
    pub fn as_str(&self) -> &str {
        match self {
            ScanTarget::Crate(name) => name,
            ScanTarget::Module(path) => path,
            ScanTarget::All => "*",
        }
    }

    /// 检查类型名称是否属于扫描目标
    pub fn contains(&self, type_name: &str) -> bool {
        match self {
            ScanTarget::All => true,
            ScanTarget::Crate(name) => {
                let name = name.replace('-', "_");
                type_name == name || type_name.starts_with(&format!("{}::", name))
            }
            ScanTarget::Module(path) => {
                let path = path.replace('.', "::");
                type_name.starts_with(&format!("{}::", path))
            }
        }
    }
}

/// 类型过滤钩子
pub trait TypeFilter: Send + Sync {
    /// 是否接受该类型
    fn accept(&self, ty: &dyn AnnotatedType) -> bool;
}

impl<F> TypeFilter for F
where
    F: Fn(&dyn AnnotatedType) -> bool + Send + Sync,
{
    fn accept(&self, ty: &dyn AnnotatedType) -> bool {
        self(ty)
    }
}
