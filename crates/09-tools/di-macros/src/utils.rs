//! 宏工具函数

use syn::{Attribute, Path};

/// 过滤出 `#[marker(...)]` 属性
pub fn marker_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|attr| attr.path().is_ident("marker"))
}

/// 路径最后一段的名称
pub fn last_ident(path: &Path) -> String {
    path.segments
        .last()
        .map(|segment| segment.ident.to_string())
        .unwrap_or_default()
}
