//! 静态类型扫描器

use async_trait::async_trait;
use di_abstractions::{AnnotatedType, ScanTarget, TypeScanner};
use di_common::ComponentError;
use std::sync::Arc;
use tracing::debug;

/// 内存中的类型目录
///
/// 扫描时返回名称属于扫描目标的类型，按添加顺序
#[derive(Clone)]
pub struct StaticTypeScanner {
    name: String,
    types: Vec<Arc<dyn AnnotatedType>>,
}

impl StaticTypeScanner {
    /// 创建空目录
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    /// 添加类型
    pub fn with_type(mut self, annotated: Arc<dyn AnnotatedType>) -> Self {
        self.types.push(annotated);
        self
    }

    /// 添加一组类型
    pub fn with_types(mut self, types: impl IntoIterator<Item = Arc<dyn AnnotatedType>>) -> Self {
        self.types.extend(types);
        self
    }

    /// 目录中的类型个数
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// 目录是否为空
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[async_trait]
impl TypeScanner for StaticTypeScanner {
    async fn scan(&self, target: &ScanTarget) -> Result<Vec<Arc<dyn AnnotatedType>>, ComponentError> {
        let found: Vec<Arc<dyn AnnotatedType>> = self
            .types
            .iter()
            .filter(|annotated| target.contains(annotated.name()))
            .cloned()
            .collect();
        debug!("扫描 {} ({}): 发现 {} 个类型", self.name, target.as_str(), found.len());
        Ok(found)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, target: &ScanTarget) -> bool {
        match target {
            ScanTarget::All => true,
            _ => self.types.iter().any(|annotated| target.contains(annotated.name())),
        }
    }
}
