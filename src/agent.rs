//! Solver 运行时
//!
//! 把 Planner（plan / replan）与 StepExecutor（act）装配为工作流的三个节点，
//! 并按配置构建工具网关：execute_python_code 与 web_search。
//! run 从目标开始跑完整的 plan → act → replan 循环，返回终止状态。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::SolverError;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::react::{Planner, StepExecutor, WorkDirs};
use crate::tools::{
    CodeExecTool, CodeRunner, DuckDuckGoBackend, ToolGateway, ToolRegistry, WebSearchTool,
};
use crate::workflow::{NodeOutput, WorkflowEngine, WorkflowEvent, WorkflowNodes, WorkflowState};

/// 代码执行超时上限：比网关外层超时少 1 秒，子进程超时先于网关触发
fn code_timeout_ceiling(gateway_timeout_secs: u64) -> u64 {
    gateway_timeout_secs.saturating_sub(1).max(1)
}

/// 按配置注册代码执行与 Web 搜索工具
pub fn build_tool_gateway(cfg: &AppConfig) -> ToolGateway {
    let mut tools = ToolRegistry::new();
    tools.register(
        CodeExecTool::new(
            CodeRunner::new(cfg.tools.code.interpreter.clone()),
            cfg.tools.code.default_timeout_secs,
        )
        .with_max_timeout_secs(code_timeout_ceiling(cfg.tools.tool_timeout_secs)),
    );

    let search = &cfg.tools.search;
    let backend = DuckDuckGoBackend::new(search.endpoint.clone(), search.timeout_secs, search.max_results);
    tools.register(WebSearchTool::new(Arc::new(backend)).with_max_result_chars(search.max_result_chars));

    ToolGateway::new(tools, cfg.tools.tool_timeout_secs)
}

/// 工作流节点的具体实现
pub struct Solver {
    planner: Planner,
    executor: StepExecutor,
}

impl Solver {
    pub fn new(llm: Arc<dyn LlmClient>, gateway: ToolGateway, max_rounds: usize, dirs: WorkDirs) -> Self {
        Self {
            planner: Planner::new(llm.clone()),
            executor: StepExecutor::new(llm, gateway)
                .with_max_rounds(max_rounds)
                .with_dirs(dirs),
        }
    }

    /// 从配置创建：LLM 后端、工具网关、轮数上限与目录约定
    pub fn from_config(cfg: &AppConfig) -> Self {
        let dirs = WorkDirs {
            metadata_dir: cfg.app.metadata_dir.clone(),
            output_dir: cfg.app.output_dir.clone(),
        };
        Self::new(
            create_llm_from_config(cfg),
            build_tool_gateway(cfg),
            cfg.workflow.max_react_rounds,
            dirs,
        )
    }

    /// LLM 累计 token 使用统计 (prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.token_usage()
    }
}

#[async_trait]
impl WorkflowNodes for Solver {
    async fn plan(&self, state: &WorkflowState) -> Result<NodeOutput, SolverError> {
        let outcome = self.planner.plan(state.objective()).await?;
        tracing::debug!(source = ?outcome.source, "initial plan ready");
        Ok(NodeOutput::Planned(outcome.steps))
    }

    async fn act(&self, state: &WorkflowState) -> NodeOutput {
        NodeOutput::Acted(self.executor.execute(state).await)
    }

    async fn replan(&self, state: &WorkflowState) -> NodeOutput {
        NodeOutput::Decided(self.planner.replan(state).await)
    }
}

/// 用给定的 Solver 跑完一次运行；recursion_limit 为图迁移次数上限
pub async fn run_solver(
    solver: Arc<Solver>,
    objective: &str,
    recursion_limit: usize,
    event_tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
) -> Result<WorkflowState, SolverError> {
    let mut engine = WorkflowEngine::new(solver).with_recursion_limit(recursion_limit);
    if let Some(tx) = event_tx {
        engine = engine.with_event_tx(tx);
    }
    engine.run(objective).await
}

/// 按配置构建 Solver 并运行
pub async fn run(
    objective: &str,
    cfg: &AppConfig,
    event_tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
) -> Result<WorkflowState, SolverError> {
    let solver = Arc::new(Solver::from_config(cfg));
    let state = run_solver(solver.clone(), objective, cfg.workflow.recursion_limit, event_tx).await?;
    let (prompt, completion, total) = solver.token_usage();
    tracing::info!(prompt, completion, total, "token usage");
    Ok(state)
}
