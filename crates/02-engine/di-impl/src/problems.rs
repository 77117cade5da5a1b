//! 部署问题收集
//!
//! 定义错误和解析错误在发现和验证阶段累积，只在部署验证结束时统一报告

use di_common::{ContainerError, ContainerResult, DefinitionError, DeploymentProblem, ResolutionError};
use parking_lot::Mutex;
use tracing::warn;

/// 部署问题收集器
#[derive(Debug, Default)]
pub struct ProblemCollector {
    problems: Mutex<Vec<DeploymentProblem>>,
}

impl ProblemCollector {
    /// 创建收集器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录部署问题
    pub fn add(&self, problem: DeploymentProblem) {
        warn!("记录部署问题: {}", problem);
        self.problems.lock().push(problem);
    }

    /// 记录定义错误
    pub fn add_definition(&self, error: DefinitionError) {
        self.add(DeploymentProblem::Definition(error));
    }

    /// 记录注入点解析错误
    pub fn add_resolution(&self, injection_point: impl Into<String>, source: ResolutionError) {
        self.add(DeploymentProblem::Resolution {
            injection_point: injection_point.into(),
            source,
        });
    }

    /// 问题个数
    pub fn len(&self) -> usize {
        self.problems.lock().len()
    }

    /// 是否没有问题
    pub fn is_empty(&self) -> bool {
        self.problems.lock().is_empty()
    }

    /// 当前记录的问题
    pub fn snapshot(&self) -> Vec<DeploymentProblem> {
        self.problems.lock().clone()
    }

    /// 取出所有问题
    pub fn take(&self) -> Vec<DeploymentProblem> {
        std::mem::take(&mut *self.problems.lock())
    }

    /// 把问题转换为部署结果
    pub fn into_result(problems: Vec<DeploymentProblem>) -> ContainerResult<()> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::DeploymentFailed { problems })
        }
    }
}
