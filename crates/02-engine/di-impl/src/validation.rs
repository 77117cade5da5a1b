//! 部署验证
//!
//! 在任何实例创建之前检查已发现的 Bean：每个注入点都能唯一解析，
//! 非延迟的构造依赖不形成环，装饰器和拦截器声明合法，启用列表中的名称存在。

use crate::bean::{Bean, ConstructionStrategy};
use crate::problems::ProblemCollector;
use crate::registry::TypeRole;
use crate::resolution::Resolver;
use di_abstractions::InterceptionKind;
use di_common::{builtin, DefinitionError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 部署验证器
pub(crate) struct DeploymentValidator<'a> {
    resolver: &'a Resolver,
    problems: &'a ProblemCollector,
    scopes: &'a [String],
    detect_cycles: bool,
}

impl<'a> DeploymentValidator<'a> {
    pub(crate) fn new(
        resolver: &'a Resolver,
        problems: &'a ProblemCollector,
        scopes: &'a [String],
        detect_cycles: bool,
    ) -> Self {
        Self {
            resolver,
            problems,
            scopes,
            detect_cycles,
        }
    }

    /// 执行全部检查，返回新发现的问题个数
    pub(crate) fn validate(&self) -> usize {
        let before = self.problems.len();
        let beans: Vec<Arc<Bean>> = self
            .resolver
            .beans()
            .into_iter()
            .filter(|bean| self.resolver.is_enabled(bean))
            .collect();

        let edges = self.check_injection_points(&beans);
        self.check_scopes(&beans);
        self.check_roles();
        self.check_enablement();
        if self.detect_cycles {
            self.check_cycles(&beans, &edges);
        }

        let found = self.problems.len() - before;
        info!("部署验证完成: {} 个 Bean, {} 个问题", beans.len(), found);
        found
    }

    /// 解析注入点，返回非延迟依赖构成的边
    fn check_injection_points(&self, beans: &[Arc<Bean>]) -> HashMap<usize, Vec<usize>> {
        let mut edges: HashMap<usize, Vec<usize>> = HashMap::new();
        for bean in beans {
            let targets = edges.entry(bean.id().0).or_default();
            for point in bean.injection_points() {
                if point.is_delegate() {
                    continue;
                }
                match self.resolver.resolve(point.key(), point.qualifiers()) {
                    Ok(target) => {
                        if is_long_lived(bean) && target.scope() == builtin::REQUEST_SCOPED {
                            warn!(
                                "请求作用域的 Bean {} 注入到长生命周期的 {}, 实例只会获取一次",
                                target.type_name(),
                                point
                            );
                        }
                        if !point.is_lazy() {
                            targets.push(target.id().0);
                        }
                    }
                    Err(error) => self.problems.add_resolution(point.to_string(), error),
                }
            }

            match bean.strategy() {
                ConstructionStrategy::ProducerMethod { declaring, member }
                | ConstructionStrategy::ProducerField { declaring, member }
                    if !member.is_static() =>
                {
                    targets.push(declaring.0);
                }
                _ => {}
            }

            for kind in [InterceptionKind::AroundConstruct, InterceptionKind::PostConstruct] {
                for interceptor in self.resolver.resolve_interceptors(bean, None, kind).iter() {
                    targets.push(interceptor.bean.id().0);
                }
            }
            for decorator in self.resolver.resolve_decorators(bean).iter() {
                targets.push(decorator.id().0);
            }
        }
        edges
    }

    fn check_scopes(&self, beans: &[Arc<Bean>]) {
        for bean in beans {
            if bean.is_dependent() || self.scopes.iter().any(|scope| scope == bean.scope()) {
                continue;
            }
            self.problems.add_definition(DefinitionError::InvalidMarker {
                type_name: bean.type_name().to_string(),
                message: format!("作用域 @{} 没有对应的上下文", bean.scope()),
            });
        }
    }

    fn check_roles(&self) {
        let enablement = self.resolver.enablement();
        for bean in self.resolver.beans() {
            match bean.role() {
                TypeRole::Decorator => {
                    let count = bean.delegate_points().count();
                    if count != 1 {
                        self.problems.add_definition(DefinitionError::InvalidDelegate {
                            type_name: bean.type_name().to_string(),
                            count,
                        });
                    }
                }
                TypeRole::Interceptor => {
                    let is_default = enablement
                        .default_interceptors
                        .iter()
                        .any(|name| bean.matches_name(name));
                    if bean.interceptor_bindings().is_empty() && !is_default {
                        self.problems
                            .add_definition(DefinitionError::InterceptorWithoutBindings {
                                type_name: bean.type_name().to_string(),
                            });
                    }
                }
                TypeRole::Bean => {}
            }
        }
    }

    fn check_enablement(&self) {
        let enablement = self.resolver.enablement();
        let beans = self.resolver.beans();
        let markers = self.resolver.markers();
        let lists = [
            &enablement.alternatives,
            &enablement.interceptors,
            &enablement.decorators,
            &enablement.default_interceptors,
        ];
        for name in lists.into_iter().flatten() {
            let known = beans.iter().any(|bean| bean.matches_name(name)) || markers.is_stereotype(name);
            if !known {
                self.problems.add_definition(DefinitionError::UnknownEnabledType {
                    type_name: name.clone(),
                });
            }
        }
    }

    fn check_cycles(&self, beans: &[Arc<Bean>], edges: &HashMap<usize, Vec<usize>>) {
        let names: HashMap<usize, &str> = beans
            .iter()
            .map(|bean| (bean.id().0, bean.type_name()))
            .collect();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut cycles = Vec::new();

        let mut nodes: Vec<usize> = edges.keys().copied().collect();
        nodes.sort_unstable();
        for node in nodes {
            if !visited.contains(&node) {
                let mut path = Vec::new();
                dfs_detect_cycle(node, edges, &mut visited, &mut rec_stack, &mut path, &mut cycles);
            }
        }

        for cycle in cycles {
            let mut chain: Vec<&str> = cycle
                .iter()
                .map(|id| names.get(id).copied().unwrap_or("?"))
                .collect();
            if let Some(first) = chain.first().copied() {
                chain.push(first);
            }
            let cycle = chain.join(" -> ");
            debug!("检测到循环构造: {}", cycle);
            self.problems
                .add_definition(DefinitionError::CircularConstruction { cycle });
        }
    }
}

fn is_long_lived(bean: &Bean) -> bool {
    matches!(bean.scope(), builtin::SINGLETON | builtin::APPLICATION_SCOPED)
}

/// 深度优先搜索检测循环
fn dfs_detect_cycle(
    node: usize,
    edges: &HashMap<usize, Vec<usize>>,
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
    cycles: &mut Vec<Vec<usize>>,
) {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(dependencies) = edges.get(&node) {
        for dep in dependencies {
            if rec_stack.contains(dep) {
                if let Some(cycle_start) = path.iter().position(|n| n == dep) {
                    cycles.push(path[cycle_start..].to_vec());
                }
            } else if !visited.contains(dep) {
                dfs_detect_cycle(*dep, edges, visited, rec_stack, path, cycles);
            }
        }
    }

    path.pop();
    rec_stack.remove(&node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MarkerTypeRegistry, MetadataRegistry};
    use crate::resolution::Enablement;
    use di_abstractions::{AnnotatedType, ComponentType, Dependency};
    use di_common::{DeploymentProblem, Marker};

    struct Left;
    struct Right;
    #[derive(Default)]
    struct Lonely;
    #[derive(Default)]
    struct Wrapper;
    #[derive(Default)]
    struct Audit;

    struct Fixture {
        registry: MetadataRegistry,
        resolver: Resolver,
        problems: Arc<ProblemCollector>,
    }

    impl Fixture {
        fn new() -> Self {
            let markers = Arc::new(MarkerTypeRegistry::new());
            let problems = Arc::new(ProblemCollector::new());
            Self {
                registry: MetadataRegistry::new(Arc::clone(&markers), Arc::clone(&problems)),
                resolver: Resolver::new(markers),
                problems,
            }
        }

        fn add(&self, annotated: Arc<dyn AnnotatedType>, role: TypeRole) {
            let descriptor = self.registry.register(annotated);
            let bean = Bean::managed(self.resolver.next_id(), descriptor, role).unwrap();
            self.resolver.add_bean(bean);
        }

        fn validate(&self) -> Vec<DeploymentProblem> {
            let scopes = vec![builtin::SINGLETON.to_string(), builtin::APPLICATION_SCOPED.to_string()];
            DeploymentValidator::new(&self.resolver, &self.problems, &scopes, true).validate();
            self.problems.take()
        }
    }

    fn left(lazy: bool) -> Arc<dyn AnnotatedType> {
        let dependency = if lazy {
            Dependency::lazy::<Right>()
        } else {
            Dependency::of::<Right>()
        };
        ComponentType::builder::<Left>()
            .inject_constructor(vec![dependency], |_| Ok(Left))
            .build()
    }

    fn right() -> Arc<dyn AnnotatedType> {
        ComponentType::builder::<Right>()
            .inject_constructor(vec![Dependency::of::<Left>()], |_| Ok(Right))
            .build()
    }

    #[test]
    fn test_unsatisfied_injection_point_is_recorded() {
        let fixture = Fixture::new();
        fixture.add(
            ComponentType::builder::<Left>()
                .inject_constructor(vec![Dependency::of::<Lonely>()], |_| Ok(Left))
                .build(),
            TypeRole::Bean,
        );

        let problems = fixture.validate();
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            &problems[0],
            DeploymentProblem::Resolution { source, .. } if source.is_unsatisfied()
        ));
    }

    #[test]
    fn test_eager_cycle_is_definition_error() {
        let fixture = Fixture::new();
        fixture.add(left(false), TypeRole::Bean);
        fixture.add(right(), TypeRole::Bean);

        let problems = fixture.validate();
        assert_eq!(problems.len(), 1);
        match &problems[0] {
            DeploymentProblem::Definition(DefinitionError::CircularConstruction { cycle }) => {
                assert!(cycle.contains("Left"));
                assert!(cycle.contains("Right"));
                assert_eq!(cycle.matches(" -> ").count(), 2);
            }
            other => panic!("unexpected problem: {other}"),
        }
    }

    #[test]
    fn test_lazy_edge_breaks_cycle() {
        let fixture = Fixture::new();
        fixture.add(left(true), TypeRole::Bean);
        fixture.add(right(), TypeRole::Bean);

        assert!(fixture.validate().is_empty());
    }

    #[test]
    fn test_decorator_without_delegate_and_unbound_interceptor() {
        let fixture = Fixture::new();
        fixture.add(
            ComponentType::builder::<Wrapper>()
                .marker(Marker::decorator())
                .with_default()
                .build(),
            TypeRole::Decorator,
        );
        fixture.add(
            ComponentType::builder::<Audit>()
                .marker(Marker::interceptor())
                .with_default()
                .build(),
            TypeRole::Interceptor,
        );

        let problems = fixture.validate();
        assert!(problems.iter().any(|problem| matches!(
            problem,
            DeploymentProblem::Definition(DefinitionError::InvalidDelegate { count: 0, .. })
        )));
        assert!(problems.iter().any(|problem| matches!(
            problem,
            DeploymentProblem::Definition(DefinitionError::InterceptorWithoutBindings { .. })
        )));
    }

    #[test]
    fn test_default_interceptor_needs_no_binding() {
        let fixture = Fixture::new();
        fixture.add(
            ComponentType::builder::<Audit>()
                .marker(Marker::interceptor())
                .with_default()
                .build(),
            TypeRole::Interceptor,
        );
        fixture.resolver.set_enablement(Enablement {
            default_interceptors: vec!["Audit".to_string()],
            ..Enablement::default()
        });

        assert!(fixture.validate().is_empty());
    }

    #[test]
    fn test_unknown_enabled_name_and_missing_context() {
        let fixture = Fixture::new();
        fixture.add(
            ComponentType::builder::<Lonely>()
                .marker(Marker::request_scoped())
                .with_default()
                .build(),
            TypeRole::Bean,
        );
        fixture.resolver.set_enablement(Enablement {
            alternatives: vec!["NoSuchMailer".to_string()],
            ..Enablement::default()
        });

        let problems = fixture.validate();
        assert!(problems.iter().any(|problem| matches!(
            problem,
            DeploymentProblem::Definition(DefinitionError::UnknownEnabledType { type_name })
                if type_name == "NoSuchMailer"
        )));
        assert!(problems.iter().any(|problem| matches!(
            problem,
            DeploymentProblem::Definition(DefinitionError::InvalidMarker { .. })
        )));
    }
}
