//! Planner：规划与重规划
//!
//! - plan：仅凭目标生成初始计划；空目标直接报错（唯一的致命前置条件），其余失败逐级降级，
//!   最终退化为“复述目标”的单步计划
//! - replan：依据目标、当前计划与完整历史给出 Decision；没有历史时不调用模型直接返回错误决策，
//!   两级解析都失败时以错误决策结束运行，不会无限重试

use std::sync::Arc;

use crate::core::SolverError;
use crate::llm::LlmClient;
use crate::react::parser::{
    coerce_decision, coerce_plan, decision_from_text, parse_numbered_steps, ParseError,
};
use crate::react::prompts::{plan_messages, plan_text_messages, replan_messages, replan_text_messages};
use crate::workflow::{Decision, WorkflowState};

/// 计划来源（用于观察解析是否降级）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// Schema 约束输出
    Structured,
    /// 纯文本编号列表
    NumberedList,
    /// 解析失败，退化为复述目标的单步
    DefaultStep,
}

/// 规划结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    pub steps: Vec<String>,
    pub source: PlanSource,
}

/// 没有任何已执行步骤时的重规划结果
pub const REPLAN_WITHOUT_HISTORY: &str =
    "Error: cannot replan before any step has been executed.";

/// Planner：持有 LLM，负责 plan / replan
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn plan(&self, objective: &str) -> Result<PlanOutcome, SolverError> {
        if objective.trim().is_empty() {
            return Err(SolverError::EmptyObjective);
        }

        match coerce_plan(self.llm.as_ref(), &plan_messages(objective)).await {
            Ok(steps) => {
                tracing::info!(steps = steps.len(), "plan generated");
                return Ok(PlanOutcome {
                    steps,
                    source: PlanSource::Structured,
                });
            }
            Err(e) => tracing::warn!(error = %e, "structured plan failed, falling back to numbered list"),
        }

        let steps = match self.llm.complete(&plan_text_messages(objective)).await {
            Ok(text) => parse_numbered_steps(&text),
            Err(e) => {
                tracing::warn!(error = %e, "plain-text plan request failed");
                Vec::new()
            }
        };
        if !steps.is_empty() {
            tracing::info!(steps = steps.len(), "plan parsed from numbered list");
            return Ok(PlanOutcome {
                steps,
                source: PlanSource::NumberedList,
            });
        }

        tracing::warn!("no plan could be parsed, using the objective as a single step");
        Ok(PlanOutcome {
            steps: vec![objective.to_string()],
            source: PlanSource::DefaultStep,
        })
    }

    pub async fn replan(&self, state: &WorkflowState) -> Decision {
        let history = state.history();
        if history.is_empty() {
            tracing::warn!("replan requested with empty history");
            return Decision::error(REPLAN_WITHOUT_HISTORY);
        }

        let objective = state.objective();
        let strict = coerce_decision(
            self.llm.as_ref(),
            &replan_messages(objective, &state.plan, history),
        )
        .await;
        let decision = match strict {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "structured replan failed, falling back to text");
                let lenient = self
                    .llm
                    .complete(&replan_text_messages(objective, &state.plan, history))
                    .await
                    .map_err(ParseError::from)
                    .and_then(|text| decision_from_text(&text));
                match lenient {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(error = %e, "replan failed, terminating run");
                        Decision::error(format!("Error: replanning failed: {}", e))
                    }
                }
            }
        };

        match &decision {
            Decision::Complete { summary, .. } => tracing::info!(summary = %summary, "replan decided to complete"),
            Decision::Continue { plan } => tracing::info!(remaining = plan.len(), "replan continues"),
        }
        decision
    }
}
