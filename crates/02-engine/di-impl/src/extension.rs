//! 容器扩展
//!
//! 扩展在启动流程的固定节点收到容器生命周期事件，可以补充元数据、
//! 修改启用列表、注册合成 Bean 和观察者，或报告问题。

use crate::bean::{Bean, SyntheticBean};
use crate::container::Container;
use crate::registry::{MetadataRegistry, TypeRole};
use crate::resolution::Enablement;
use di_abstractions::{AnnotatedType, Context, Event, ObserverMember};
use di_common::{BoxError, DefinitionError, DeploymentProblem, Marker, MarkerDefinition, TypeKey};
use std::sync::Arc;
use tracing::debug;

/// 容器扩展
///
/// 所有钩子都有空的默认实现，返回的错误记录为定义错误或部署问题。
/// 钩子收到的容器处于对应的启动阶段，阶段不允许的操作会返回阶段错误
pub trait Extension: Send + Sync {
    /// 扩展名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 类型发现之前
    fn before_bean_discovery(
        &self,
        _event: &mut BeforeBeanDiscovery<'_>,
        _container: &Container,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// 每个发现的类型注册之前，可以否决该类型
    fn process_type(&self, _event: &mut ProcessType<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// 类型发现之后
    fn after_type_discovery(
        &self,
        _event: &mut AfterTypeDiscovery,
        _container: &Container,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Bean 发现之后
    fn after_bean_discovery(
        &self,
        _event: &mut AfterBeanDiscovery,
        _container: &Container,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// 部署验证之后
    fn after_deployment_validation(
        &self,
        _event: &mut AfterDeploymentValidation,
        _container: &Container,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// 容器关闭之前
    fn before_shutdown(&self, _event: &BeforeShutdown, _container: &Container) {}
}

/// 类型发现之前的事件
pub struct BeforeBeanDiscovery<'a> {
    registry: &'a MetadataRegistry,
    added: Vec<Arc<dyn AnnotatedType>>,
}

impl<'a> BeforeBeanDiscovery<'a> {
    pub(crate) fn new(registry: &'a MetadataRegistry) -> Self {
        Self {
            registry,
            added: Vec::new(),
        }
    }

    /// 声明合成限定符
    pub fn add_qualifier(&mut self, kind: impl Into<String>) -> &mut Self {
        self.add_marker(MarkerDefinition::qualifier(kind))
    }

    /// 声明合成作用域
    pub fn add_scope(&mut self, kind: impl Into<String>, normal: bool) -> &mut Self {
        let definition = if normal {
            MarkerDefinition::normal_scope(kind)
        } else {
            MarkerDefinition::pseudo_scope(kind)
        };
        self.add_marker(definition)
    }

    /// 声明合成构造型
    pub fn add_stereotype(&mut self, kind: impl Into<String>, markers: Vec<Marker>) -> &mut Self {
        self.add_marker(MarkerDefinition::stereotype(kind, markers))
    }

    /// 声明合成拦截器绑定
    pub fn add_interceptor_binding(&mut self, kind: impl Into<String>) -> &mut Self {
        self.add_marker(MarkerDefinition::interceptor_binding(kind))
    }

    /// 声明任意标记类型
    pub fn add_marker(&mut self, definition: MarkerDefinition) -> &mut Self {
        self.registry.markers().add_synthetic(definition);
        self
    }

    /// 添加需要发现的类型
    pub fn add_annotated_type(&mut self, annotated: Arc<dyn AnnotatedType>) -> &mut Self {
        debug!("扩展添加类型: {}", annotated.name());
        self.added.push(annotated);
        self
    }

    /// 指定类型的角色
    pub fn set_role(&mut self, key: TypeKey, role: TypeRole) -> &mut Self {
        self.registry.override_role(key, role);
        self
    }

    /// 否决类型
    pub fn veto(&mut self, key: TypeKey) -> &mut Self {
        self.registry.veto(key);
        self
    }

    pub(crate) fn into_added(self) -> Vec<Arc<dyn AnnotatedType>> {
        self.added
    }
}

/// 类型注册之前的事件
pub struct ProcessType<'a> {
    annotated: &'a Arc<dyn AnnotatedType>,
    vetoed: bool,
}

impl<'a> ProcessType<'a> {
    pub(crate) fn new(annotated: &'a Arc<dyn AnnotatedType>) -> Self {
        Self {
            annotated,
            vetoed: false,
        }
    }

    /// 正在处理的类型
    pub fn annotated(&self) -> &Arc<dyn AnnotatedType> {
        self.annotated
    }

    /// 否决该类型
    pub fn veto(&mut self) {
        self.vetoed = true;
    }

    /// 是否已被否决
    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }
}

/// 类型发现之后的事件
///
/// 启用列表可以修改，修改结果用于后续的解析
pub struct AfterTypeDiscovery {
    enablement: Enablement,
    discovered: Vec<TypeKey>,
    added: Vec<Arc<dyn AnnotatedType>>,
}

impl AfterTypeDiscovery {
    pub(crate) fn new(enablement: Enablement, discovered: Vec<TypeKey>) -> Self {
        Self {
            enablement,
            discovered,
            added: Vec::new(),
        }
    }

    /// 当前启用列表
    pub fn enablement(&self) -> &Enablement {
        &self.enablement
    }

    /// 可修改的启用列表
    pub fn enablement_mut(&mut self) -> &mut Enablement {
        &mut self.enablement
    }

    /// 已发现的类型
    pub fn discovered(&self) -> &[TypeKey] {
        &self.discovered
    }

    /// 添加需要发现的类型
    pub fn add_annotated_type(&mut self, annotated: Arc<dyn AnnotatedType>) -> &mut Self {
        self.added.push(annotated);
        self
    }

    pub(crate) fn into_parts(self) -> (Enablement, Vec<Arc<dyn AnnotatedType>>) {
        (self.enablement, self.added)
    }
}

/// Bean 发现之后的事件
pub struct AfterBeanDiscovery {
    discovered: Vec<Arc<Bean>>,
    pub(crate) beans: Vec<SyntheticBean>,
    pub(crate) observers: Vec<ObserverMember>,
    pub(crate) contexts: Vec<Arc<dyn Context>>,
    pub(crate) errors: Vec<DefinitionError>,
}

impl AfterBeanDiscovery {
    pub(crate) fn new(discovered: Vec<Arc<Bean>>) -> Self {
        Self {
            discovered,
            beans: Vec::new(),
            observers: Vec::new(),
            contexts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// 已发现的 Bean
    pub fn beans(&self) -> &[Arc<Bean>] {
        &self.discovered
    }

    /// 注册合成 Bean
    pub fn add_bean(&mut self, bean: SyntheticBean) -> &mut Self {
        self.beans.push(bean);
        self
    }

    /// 注册观察者
    pub fn add_observer(&mut self, observer: ObserverMember) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// 注册自定义作用域上下文
    pub fn add_context(&mut self, context: Arc<dyn Context>) -> &mut Self {
        self.contexts.push(context);
        self
    }

    /// 报告定义错误
    pub fn add_definition_error(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(DefinitionError::extension(message));
        self
    }
}

/// 部署验证之后的事件
#[derive(Debug, Default)]
pub struct AfterDeploymentValidation {
    problems: Vec<DeploymentProblem>,
}

impl AfterDeploymentValidation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 报告部署问题
    pub fn add_problem(&mut self, message: impl Into<String>) -> &mut Self {
        self.problems.push(DeploymentProblem::extension(message));
        self
    }

    /// 已报告的问题
    pub fn problems(&self) -> &[DeploymentProblem] {
        &self.problems
    }

    pub(crate) fn into_problems(self) -> Vec<DeploymentProblem> {
        self.problems
    }
}

/// 容器关闭之前的事件
///
/// 同时作为普通事件投递给观察者
#[derive(Debug, Clone, Copy, Default)]
pub struct BeforeShutdown;

impl Event for BeforeShutdown {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::ProblemCollector;
    use crate::registry::MarkerTypeRegistry;
    use di_abstractions::ComponentType;

    #[derive(Default)]
    struct Probe;

    #[test]
    fn test_before_bean_discovery_declares_synthetic_markers() {
        let registry = MetadataRegistry::new(
            Arc::new(MarkerTypeRegistry::new()),
            Arc::new(ProblemCollector::new()),
        );
        let mut event = BeforeBeanDiscovery::new(&registry);
        event
            .add_qualifier("Fast")
            .add_scope("Session", true)
            .add_interceptor_binding("Traced")
            .add_stereotype("Service", vec![Marker::application_scoped()])
            .add_annotated_type(ComponentType::builder::<Probe>().with_default().build());

        assert!(registry.is_qualifier("Fast"));
        assert!(registry.is_scope("Session"));
        assert!(registry.markers().is_normal_scope("Session"));
        assert!(registry.is_interceptor_binding("Traced"));
        assert!(registry.is_stereotype("Service"));
        assert_eq!(event.into_added().len(), 1);
    }

    #[test]
    fn test_process_type_veto() {
        let annotated = ComponentType::builder::<Probe>().with_default().build();
        let mut event = ProcessType::new(&annotated);
        assert!(!event.is_vetoed());
        event.veto();
        assert!(event.is_vetoed());
        assert_eq!(event.annotated().type_key(), TypeKey::of::<Probe>());
    }

    #[test]
    fn test_after_type_discovery_edits_enablement() {
        let mut event = AfterTypeDiscovery::new(Enablement::default(), vec![TypeKey::of::<Probe>()]);
        event.enablement_mut().alternatives.push("MockMailer".to_string());
        let (enablement, added) = event.into_parts();
        assert_eq!(enablement.alternatives, vec!["MockMailer"]);
        assert!(added.is_empty());
    }

    #[test]
    fn test_extension_default_name() {
        struct Audit;
        impl Extension for Audit {}
        assert!(Audit.name().ends_with("Audit"));
    }
}
