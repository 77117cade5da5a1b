//! 类型描述与派生事实

use super::markers::MarkerTypeRegistry;
use di_abstractions::AnnotatedType;
use di_common::{builtin, DefinitionError, Marker, MarkerValue, TypeKey};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// 从标记派生出的 Bean 事实
///
/// 托管 Bean 和生产者 Bean 使用同一套派生规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanFacts {
    /// 限定符，总是包含 `Any`
    pub qualifiers: Vec<Marker>,
    /// 作用域标记名称
    pub scope: String,
    /// 构造型（已展开）
    pub stereotypes: Vec<Marker>,
    /// 类级拦截器绑定（已展开）
    pub interceptor_bindings: Vec<Marker>,
    /// 是否为备选
    pub alternative: bool,
    /// 优先级
    pub priority: Option<i64>,
    /// Bean 名称
    pub name: Option<String>,
    /// 是否在启动时立即实例化
    pub eager: bool,
}

impl BeanFacts {
    /// 派生 Bean 事实
    ///
    /// `inherited` 为祖先层级上声明的标记，只贡献拦截器绑定
    pub fn derive(
        registry: &MarkerTypeRegistry,
        type_name: &str,
        default_name: &str,
        markers: &[Marker],
        inherited: &[Marker],
    ) -> (Self, Vec<DefinitionError>) {
        let mut errors = Vec::new();
        let (stereotypes, carried) = expand_stereotypes(registry, markers);

        let scope = match distinct_scopes(registry, markers).as_slice() {
            [] => match distinct_scopes(registry, &carried).as_slice() {
                [] => builtin::DEPENDENT.to_string(),
                [scope] => scope.clone(),
                scopes => {
                    errors.push(DefinitionError::ConflictingScopes {
                        type_name: type_name.to_string(),
                        scopes: scopes.to_vec(),
                    });
                    builtin::DEPENDENT.to_string()
                }
            },
            [scope] => scope.clone(),
            scopes => {
                errors.push(DefinitionError::ConflictingScopes {
                    type_name: type_name.to_string(),
                    scopes: scopes.to_vec(),
                });
                scopes[0].clone()
            }
        };

        let mut qualifiers: Vec<Marker> = markers
            .iter()
            .filter(|marker| registry.is_qualifier(marker.kind()))
            .cloned()
            .collect();
        if !qualifiers.iter().any(|marker| marker.is(builtin::NAMED)) {
            if let Some(named) = carried.iter().find(|marker| marker.is(builtin::NAMED)) {
                qualifiers.push(named.clone());
            }
        }

        let mut name = None;
        for qualifier in qualifiers.iter_mut() {
            if qualifier.is(builtin::NAMED) {
                let value = match qualifier.value().and_then(MarkerValue::as_str) {
                    Some(value) if !value.is_empty() => value.to_string(),
                    _ => decapitalize(default_name),
                };
                *qualifier = Marker::named(value.clone());
                name = Some(value);
            }
        }
        if qualifiers
            .iter()
            .all(|marker| marker.is(builtin::NAMED) || marker.is(builtin::ANY))
        {
            qualifiers.push(Marker::default_qualifier());
        }
        if !qualifiers.iter().any(|marker| marker.is(builtin::ANY)) {
            qualifiers.push(Marker::any());
        }
        qualifiers.sort();
        qualifiers.dedup();

        let mut bindings: Vec<Marker> = markers
            .iter()
            .chain(carried.iter())
            .chain(inherited.iter())
            .cloned()
            .collect();
        bindings.retain(|marker| registry.is_interceptor_binding(marker.kind()));
        let interceptor_bindings = registry.expand_bindings(&bindings);

        let find = |kind: &str| {
            markers
                .iter()
                .find(|marker| marker.is(kind))
                .or_else(|| carried.iter().find(|marker| marker.is(kind)))
        };
        let alternative = find(builtin::ALTERNATIVE).is_some();
        let priority = find(builtin::PRIORITY)
            .and_then(|marker| marker.value())
            .and_then(MarkerValue::as_int);
        let eager = find(builtin::EAGER).is_some();

        (
            Self {
                qualifiers,
                scope,
                stereotypes,
                interceptor_bindings,
                alternative,
                priority,
                name,
                eager,
            },
            errors,
        )
    }
}

fn expand_stereotypes(registry: &MarkerTypeRegistry, markers: &[Marker]) -> (Vec<Marker>, Vec<Marker>) {
    let mut stereotypes = Vec::new();
    let mut carried = Vec::new();
    let mut visited = HashSet::new();
    let mut pending: Vec<Marker> = markers
        .iter()
        .filter(|marker| registry.is_stereotype(marker.kind()))
        .cloned()
        .collect();

    while let Some(stereotype) = pending.pop() {
        if !visited.insert(stereotype.kind().to_string()) {
            continue;
        }
        if let Some(definition) = registry.definition(stereotype.kind()) {
            for marker in definition.carried() {
                if registry.is_stereotype(marker.kind()) {
                    pending.push(marker.clone());
                } else {
                    carried.push(marker.clone());
                }
            }
        }
        stereotypes.push(stereotype);
    }
    stereotypes.sort();
    (stereotypes, carried)
}

fn distinct_scopes(registry: &MarkerTypeRegistry, markers: &[Marker]) -> Vec<String> {
    let mut scopes: Vec<String> = markers
        .iter()
        .filter(|marker| registry.is_scope(marker.kind()))
        .map(|marker| marker.kind().to_string())
        .collect();
    scopes.sort();
    scopes.dedup();
    scopes
}

/// 首字母小写的默认 Bean 名称
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 注册表中的类型描述
///
/// 发现时创建一次，之后不再改变
pub struct TypeDescriptor {
    annotated: Arc<dyn AnnotatedType>,
    facts: BeanFacts,
    discovery_index: usize,
}

impl TypeDescriptor {
    pub(crate) fn new(annotated: Arc<dyn AnnotatedType>, facts: BeanFacts, discovery_index: usize) -> Self {
        Self {
            annotated,
            facts,
            discovery_index,
        }
    }

    /// 类型能力查询接口
    pub fn annotated(&self) -> &Arc<dyn AnnotatedType> {
        &self.annotated
    }

    /// 类型标识
    pub fn key(&self) -> TypeKey {
        self.annotated.type_key()
    }

    /// 完整类型名称
    pub fn name(&self) -> &'static str {
        self.annotated.name()
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

    /// 构造型
    pub fn stereotypes(&self) -> &[Marker] {
        &self.facts.stereotypes
    }

    /// 类级拦截器绑定
    pub fn interceptor_bindings(&self) -> &[Marker] {
        &self.facts.interceptor_bindings
    }

    /// 是否为备选
    pub fn is_alternative(&self) -> bool {
        self.facts.alternative
    }

    /// 优先级
    pub fn priority(&self) -> Option<i64> {
        self.facts.priority
    }

    /// 发现顺序
    pub fn discovery_index(&self) -> usize {
        self.discovery_index
    }

    /// 是否存在可用的构造函数
    pub fn has_usable_constructor(&self) -> bool {
        self.annotated
            .constructors()
            .iter()
            .any(|constructor| constructor.is_injectable() || constructor.is_no_args())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &self.name())
            .field("facts", &self.facts)
            .field("discovery_index", &self.discovery_index)
            .finish()
    }
}
