//! 求解器错误类型
//!
//! 只有无法在组件内部恢复的故障才会以 SolverError 结束整个运行：
//! 空目标（规划前置条件）、超过图迁移上限、配置错误。
//! 模型故障、工具故障、决策结构故障都在各自组件内转为结果值。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Objective is empty; nothing to plan")]
    EmptyObjective,

    #[error("Workflow exceeded recursion limit of {0} transitions")]
    RecursionLimit(usize),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for SolverError {
    fn from(e: config::ConfigError) -> Self {
        SolverError::Config(e.to_string())
    }
}
