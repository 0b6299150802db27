//! Stepwise - 规划 / 执行 / 重规划 求解器
//!
//! 模块划分：
//! - **agent**: Solver 运行时（装配工作流节点与工具网关）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: 日志初始化
//! - **react**: Planner、决策解析、提示词、ReAct 单步执行循环
//! - **tools**: 代码执行、Web 搜索与工具网关
//! - **workflow**: 工作流状态、迁移表与驱动引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod tools;
pub mod workflow;

pub use agent::{run, Solver};
pub use workflow::{Decision, HistoryEntry, WorkflowState};
