//! 标记类型注册表
//!
//! 保存标记类型的声明，并解释标记的角色：限定符、作用域、构造型、拦截器绑定。
//! 每个判断都会先查询合成覆盖表（由扩展或构建器以编程方式注册）。

use di_common::{builtin, Marker, MarkerDefinition, MarkerLiteral, MarkerRole};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// 标记类型注册表
#[derive(Debug)]
pub struct MarkerTypeRegistry {
    declared: RwLock<HashMap<String, MarkerDefinition>>,
    synthetic: RwLock<HashMap<String, MarkerDefinition>>,
}

impl MarkerTypeRegistry {
    /// 创建注册表并声明内置标记
    pub fn new() -> Self {
        let registry = Self {
            declared: RwLock::new(HashMap::new()),
            synthetic: RwLock::new(HashMap::new()),
        };
        for definition in [
            MarkerDefinition::qualifier(builtin::DEFAULT),
            MarkerDefinition::qualifier(builtin::ANY),
            MarkerDefinition::qualifier(builtin::NAMED),
            MarkerDefinition::pseudo_scope(builtin::SINGLETON),
            MarkerDefinition::pseudo_scope(builtin::DEPENDENT),
            MarkerDefinition::normal_scope(builtin::APPLICATION_SCOPED),
            MarkerDefinition::normal_scope(builtin::REQUEST_SCOPED),
        ] {
            registry.declare(definition);
        }
        registry
    }

    /// 声明标记类型
    pub fn declare(&self, definition: MarkerDefinition) {
        debug!("声明标记类型: {}", definition.kind());
        self.declared
            .write()
            .insert(definition.kind().to_string(), definition);
    }

    /// 声明由派生宏生成的标记类型
    pub fn declare_literal<M: MarkerLiteral>(&self) {
        self.declare(M::definition());
    }

    /// 以编程方式注册标记类型，优先于声明
    pub fn add_synthetic(&self, definition: MarkerDefinition) {
        debug!("注册合成标记类型: {}", definition.kind());
        self.synthetic
            .write()
            .insert(definition.kind().to_string(), definition);
    }

    /// 获取标记类型声明
    pub fn definition(&self, kind: &str) -> Option<MarkerDefinition> {
        if let Some(definition) = self.synthetic.read().get(kind) {
            return Some(definition.clone());
        }
        self.declared.read().get(kind).cloned()
    }

    /// 检查标记类型是否具有指定角色
    pub fn has_role(&self, kind: &str, role: MarkerRole) -> bool {
        self.definition(kind)
            .map(|definition| definition.has_meta(role.meta_marker()))
            .unwrap_or(false)
    }

    /// 是否为限定符
    pub fn is_qualifier(&self, kind: &str) -> bool {
        self.has_role(kind, MarkerRole::Qualifier)
    }

    /// 是否为作用域（正常作用域或伪作用域）
    pub fn is_scope(&self, kind: &str) -> bool {
        self.has_role(kind, MarkerRole::NormalScope) || self.has_role(kind, MarkerRole::PseudoScope)
    }

    /// 是否为正常作用域
    pub fn is_normal_scope(&self, kind: &str) -> bool {
        self.has_role(kind, MarkerRole::NormalScope)
    }

    /// 是否为构造型
    pub fn is_stereotype(&self, kind: &str) -> bool {
        self.has_role(kind, MarkerRole::Stereotype)
    }

    /// 是否为拦截器绑定
    pub fn is_interceptor_binding(&self, kind: &str) -> bool {
        self.has_role(kind, MarkerRole::InterceptorBinding)
    }

    /// 标记类型声明的非绑定成员
    pub fn nonbinding(&self, kind: &str) -> BTreeSet<String> {
        self.definition(kind)
            .map(|definition| definition.nonbinding().clone())
            .unwrap_or_default()
    }

    /// 两个标记是否等价：类型相同，并且绑定成员的值相等
    pub fn equivalent(&self, left: &Marker, right: &Marker) -> bool {
        if left.kind() != right.kind() {
            return false;
        }
        let nonbinding = self.nonbinding(left.kind());
        if nonbinding.is_empty() {
            return left == right;
        }
        left.without_members(&nonbinding) == right.without_members(&nonbinding)
    }

    /// `markers` 中是否存在与 `marker` 等价的标记
    pub fn contains_equivalent(&self, markers: &[Marker], marker: &Marker) -> bool {
        markers.iter().any(|candidate| self.equivalent(candidate, marker))
    }

    /// `required` 中的每个标记在 `available` 中都有等价标记
    ///
    /// 限定符匹配、拦截器绑定匹配和观察者匹配共用这一个规则
    pub fn is_subset(&self, required: &[Marker], available: &[Marker]) -> bool {
        required
            .iter()
            .all(|marker| self.contains_equivalent(available, marker))
    }

    /// 展开拦截器绑定：加入绑定类型声明中携带的绑定（可传递）
    pub fn expand_bindings(&self, bindings: &[Marker]) -> Vec<Marker> {
        let mut expanded: Vec<Marker> = Vec::new();
        let mut visited = HashSet::new();
        let mut pending: Vec<Marker> = bindings.to_vec();
        while let Some(binding) = pending.pop() {
            if !self.contains_equivalent(&expanded, &binding) {
                expanded.push(binding.clone());
            }
            if !visited.insert(binding.kind().to_string()) {
                continue;
            }
            if let Some(definition) = self.definition(binding.kind()) {
                pending.extend(
                    definition
                        .carried()
                        .filter(|carried| self.is_interceptor_binding(carried.kind()))
                        .cloned(),
                );
            }
        }
        expanded.sort();
        expanded
    }

    /// 只保留拦截器绑定，并展开继承的绑定
    pub fn interceptor_bindings(&self, markers: &[Marker]) -> Vec<Marker> {
        let declared: Vec<Marker> = markers
            .iter()
            .filter(|marker| self.is_interceptor_binding(marker.kind()))
            .cloned()
            .collect();
        self.expand_bindings(&declared)
    }
}

impl Default for MarkerTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let registry = MarkerTypeRegistry::new();
        assert!(registry.is_qualifier(builtin::NAMED));
        assert!(registry.is_scope(builtin::DEPENDENT));
        assert!(registry.is_normal_scope(builtin::REQUEST_SCOPED));
        assert!(!registry.is_normal_scope(builtin::SINGLETON));
        assert!(!registry.is_qualifier("Unknown"));
    }

    #[test]
    fn test_synthetic_override_wins() {
        let registry = MarkerTypeRegistry::new();
        registry.declare(MarkerDefinition::new("Audited"));
        assert!(!registry.is_interceptor_binding("Audited"));

        registry.add_synthetic(MarkerDefinition::interceptor_binding("Audited"));
        assert!(registry.is_interceptor_binding("Audited"));
    }

    #[test]
    fn test_equivalence_ignores_nonbinding_members() {
        let registry = MarkerTypeRegistry::new();
        registry.declare(MarkerDefinition::qualifier("Payment").with_nonbinding("comment"));

        let left = Marker::new("Payment").with_value("card").with("comment", "a");
        let right = Marker::new("Payment").with_value("card").with("comment", "b");
        let other = Marker::new("Payment").with_value("cash");

        assert!(registry.equivalent(&left, &right));
        assert!(!registry.equivalent(&left, &other));
        assert!(registry.is_subset(&[left.clone()], &[other, right]));
        assert!(registry.is_subset(&[], &[left]));
    }

    #[test]
    fn test_binding_expansion_is_transitive() {
        let registry = MarkerTypeRegistry::new();
        registry.declare(MarkerDefinition::interceptor_binding("Logged"));
        registry.declare(
            MarkerDefinition::interceptor_binding("Monitored").with_meta(Marker::new("Logged")),
        );
        registry.declare(
            MarkerDefinition::interceptor_binding("Secured").with_meta(Marker::new("Monitored")),
        );

        let expanded = registry.interceptor_bindings(&[
            Marker::new("Secured"),
            Marker::application_scoped(),
        ]);
        let kinds: Vec<&str> = expanded.iter().map(Marker::kind).collect();
        assert_eq!(kinds, vec!["Logged", "Monitored", "Secured"]);
    }
}
