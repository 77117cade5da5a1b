//! # DI Macros
//!
//! 这个 crate 提供了把 Rust 类型声明为标记字面量的派生宏。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use di_common::MarkerLiteral;
//! use di_macros::Marker;
//!
//! #[derive(Marker)]
//! #[marker(qualifier)]
//! pub struct Region {
//!     pub code: String,
//!     #[marker(nonbinding)]
//!     pub note: String,
//! }
//!
//! #[derive(Marker)]
//! #[marker(stereotype, carries(ApplicationScoped, Alternative))]
//! pub struct Mock;
//! ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod marker;
mod utils;

/// 标记字面量派生宏
///
/// 为结构体实现 `di_common::MarkerLiteral`。命名成员成为标记成员，
/// 单成员元组结构体的成员名为 `value`，成员类型需要能转换为 `MarkerValue`。
///
/// # 参数
///
/// - `qualifier` / `interceptor_binding` / `normal_scope` / `pseudo_scope` / `stereotype` - 角色，最多一个
/// - `kind = "Name"` - 标记类型名称（默认为结构体名）
/// - `carries(A, B)` - 构造型捆绑的标记或拦截器绑定继承的绑定
/// - 成员上的 `#[marker(nonbinding)]` - 比较时忽略该成员
#[proc_macro_derive(Marker, attributes(marker))]
pub fn derive_marker(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    marker::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
