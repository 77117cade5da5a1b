//! 标记字面量派生实现

use crate::utils::{last_ident, marker_attrs};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, LitStr, Path, Result};

/// 标记类型的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Plain,
    Qualifier,
    InterceptorBinding,
    NormalScope,
    PseudoScope,
    Stereotype,
}

/// 类型级参数
struct MarkerArgs {
    kind: Option<LitStr>,
    role: Role,
    carries: Vec<Path>,
}

impl MarkerArgs {
    fn parse(input: &DeriveInput) -> Result<Self> {
        let mut args = MarkerArgs {
            kind: None,
            role: Role::Plain,
            carries: Vec::new(),
        };

        for attr in marker_attrs(&input.attrs) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("kind") {
                    args.kind = Some(meta.value()?.parse()?);
                    return Ok(());
                }
                if meta.path.is_ident("carries") {
                    meta.parse_nested_meta(|inner| {
                        args.carries.push(inner.path);
                        Ok(())
                    })?;
                    return Ok(());
                }

                let role = if meta.path.is_ident("qualifier") {
                    Role::Qualifier
                } else if meta.path.is_ident("interceptor_binding") {
                    Role::InterceptorBinding
                } else if meta.path.is_ident("normal_scope") {
                    Role::NormalScope
                } else if meta.path.is_ident("pseudo_scope") {
                    Role::PseudoScope
                } else if meta.path.is_ident("stereotype") {
                    Role::Stereotype
                } else {
                    return Err(meta.error("未知的 marker 参数"));
                };
                if args.role != Role::Plain && args.role != role {
                    return Err(meta.error("marker 只能声明一个角色"));
                }
                args.role = role;
                Ok(())
            })?;
        }

        if !args.carries.is_empty()
            && !matches!(args.role, Role::Stereotype | Role::InterceptorBinding)
        {
            return Err(Error::new_spanned(
                &input.ident,
                "只有 stereotype 和 interceptor_binding 可以携带标记",
            ));
        }
        Ok(args)
    }
}

/// 一个标记成员
struct MemberField {
    name: String,
    access: TokenStream,
    nonbinding: bool,
}

fn member_fields(input: &DeriveInput) -> Result<Vec<MemberField>> {
    let data = match &input.data {
        Data::Struct(data) => data,
        _ => return Err(Error::new_spanned(&input.ident, "Marker 只能用于结构体")),
    };

    let mut members = Vec::new();
    match &data.fields {
        Fields::Unit => {}
        Fields::Named(fields) => {
            for field in &fields.named {
                let Some(ident) = &field.ident else { continue };
                let mut nonbinding = false;
                for attr in marker_attrs(&field.attrs) {
                    attr.parse_nested_meta(|meta| {
                        if meta.path.is_ident("nonbinding") {
                            nonbinding = true;
                            Ok(())
                        } else {
                            Err(meta.error("未知的成员参数"))
                        }
                    })?;
                }
                members.push(MemberField {
                    name: ident.to_string(),
                    access: quote!(#ident),
                    nonbinding,
                });
            }
        }
        Fields::Unnamed(fields) => {
            if fields.unnamed.len() != 1 {
                return Err(Error::new_spanned(
                    &input.ident,
                    "元组结构体只能有一个成员 value",
                ));
            }
            members.push(MemberField {
                name: "value".to_string(),
                access: quote!(0),
                nonbinding: false,
            });
        }
    }
    Ok(members)
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(&input.generics, "Marker 不支持泛型"));
    }

    let args = MarkerArgs::parse(&input)?;
    let members = member_fields(&input)?;
    let ident = &input.ident;
    let kind = args
        .kind
        .clone()
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

    let with_members = members.iter().map(|member| {
        let name = &member.name;
        let access = &member.access;
        quote! {
            .with(#name, ::di_common::MarkerValue::from(::core::clone::Clone::clone(&self.#access)))
        }
    });

    let carried: Vec<TokenStream> = args
        .carries
        .iter()
        .map(|path| {
            let name = last_ident(path);
            quote!(::di_common::Marker::new(#name))
        })
        .collect();

    let constructor = match args.role {
        Role::Plain => quote!(::di_common::MarkerDefinition::new(Self::KIND)),
        Role::Qualifier => quote!(::di_common::MarkerDefinition::qualifier(Self::KIND)),
        Role::InterceptorBinding => {
            quote!(::di_common::MarkerDefinition::interceptor_binding(Self::KIND))
        }
        Role::NormalScope => quote!(::di_common::MarkerDefinition::normal_scope(Self::KIND)),
        Role::PseudoScope => quote!(::di_common::MarkerDefinition::pseudo_scope(Self::KIND)),
        Role::Stereotype => {
            quote!(::di_common::MarkerDefinition::stereotype(Self::KIND, vec![#(#carried),*]))
        }
    };
    let with_meta = if args.role == Role::Stereotype {
        Vec::new()
    } else {
        carried
    };
    let nonbinding = members
        .iter()
        .filter(|member| member.nonbinding)
        .map(|member| member.name.as_str());

    Ok(quote! {
        impl ::di_common::MarkerLiteral for #ident {
            const KIND: &'static str = #kind;

            fn to_marker(&self) -> ::di_common::Marker {
                ::di_common::Marker::new(Self::KIND)
                    #(#with_members)*
            }

            fn definition() -> ::di_common::MarkerDefinition {
                #constructor
                    #(.with_meta(#with_meta))*
                    #(.with_nonbinding(#nonbinding))*
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(source: &str) -> Result<String> {
        expand(syn::parse_str(source)?).map(|tokens| tokens.to_string())
    }

    #[test]
    fn test_qualifier_with_members() {
        let output = expand_str(
            r#"
            #[marker(qualifier)]
            struct Region { code: String, #[marker(nonbinding)] note: String }
            "#,
        )
        .unwrap();
        assert!(output.contains("MarkerDefinition :: qualifier"));
        assert!(output.contains("\"code\""));
        assert!(output.contains("with_nonbinding (\"note\")"));
    }

    #[test]
    fn test_stereotype_bundles_markers() {
        let output = expand_str(
            r#"
            #[marker(stereotype, carries(ApplicationScoped, Alternative), kind = "Mock")]
            struct MockStereotype;
            "#,
        )
        .unwrap();
        assert!(output.contains("\"Mock\""));
        assert!(output.contains("Marker :: new (\"ApplicationScoped\")"));
        assert!(!output.contains("with_meta"));
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(expand_str("#[marker(qualifier, normal_scope)] struct Both;").is_err());
        assert!(expand_str("#[marker(qualifier, carries(Other))] struct Carrier;").is_err());
        assert!(expand_str("enum Color { Red }").is_err());
        assert!(expand_str("struct Pair(i64, i64);").is_err());
        assert!(expand_str("struct Generic<T>(T);").is_err());
    }
}
