//! ReAct 单步执行循环
//!
//! 每次调用只执行 plan[0]：拼接单步指令后与模型交替进行“回复 → 工具调用 → 观察”，最多 max_rounds 轮。
//! - 模型回复不含工具调用：该回复即步骤结果
//! - 模型无回复：结果为 NO_RESPONSE_RESULT
//! - 轮数耗尽：结果为 “stopped after N iterations” 哨兵（降级而非致命）
//! - 模型调用出错：结果为 “Error encountered during execution: ...”
//! 无论哪种情况都恰好产出一条 (step, result)，本模块不修改计划、不判断终止。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError, Message, ToolCall};
use crate::react::prompts::{step_messages, WorkDirs};
use crate::tools::ToolGateway;
use crate::workflow::{HistoryEntry, WorkflowState};

/// 单步最大轮数
pub const MAX_REACT_ROUNDS: usize = 7;

pub const NO_PLAN_STEP: &str = "No plan";
pub const NO_PLAN_RESULT: &str = "No plan to execute.";
pub const NO_RESPONSE_RESULT: &str = "No response from the model.";

/// 轮数耗尽时的结果
pub fn stopped_after(rounds: usize) -> String {
    format!("Agent stopped after {} iterations without a final answer.", rounds)
}

/// 工具调用没有产生任何结果消息时的替代内容
fn missing_result(call: &ToolCall) -> String {
    format!(
        "Error: tool '{}' returned no result; it may be unavailable.",
        call.name
    )
}

/// 单步执行器：持有 LLM、工具网关与目录约定
pub struct StepExecutor {
    llm: Arc<dyn LlmClient>,
    gateway: ToolGateway,
    dirs: WorkDirs,
    max_rounds: usize,
}

impl StepExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, gateway: ToolGateway) -> Self {
        Self {
            llm,
            gateway,
            dirs: WorkDirs::default(),
            max_rounds: MAX_REACT_ROUNDS,
        }
    }

    pub fn with_dirs(mut self, dirs: WorkDirs) -> Self {
        self.dirs = dirs;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// 执行当前计划的首个步骤，返回一条历史记录
    pub async fn execute(&self, state: &WorkflowState) -> HistoryEntry {
        let Some(step) = state.next_step() else {
            return HistoryEntry::new(NO_PLAN_STEP, NO_PLAN_RESULT);
        };
        tracing::info!(step = %step, "executing step");

        let messages = step_messages(state.objective(), &state.plan, state.history(), &self.dirs);
        let result = match self.exchange(messages).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(step = %step, error = %e, "step execution failed");
                format!("Error encountered during execution: {}", e)
            }
        };
        HistoryEntry::new(step, result)
    }

    async fn exchange(&self, mut messages: Vec<Message>) -> Result<String, LlmError> {
        let catalog = self.gateway.catalog();

        for round in 1..=self.max_rounds {
            let Some(reply) = self.llm.complete_with_tools(&messages, &catalog).await? else {
                tracing::warn!(round, "model returned no response");
                return Ok(NO_RESPONSE_RESULT.to_string());
            };

            if !reply.has_tool_calls() {
                if reply.content.trim().is_empty() {
                    tracing::warn!(round, "model returned an empty response");
                    return Ok(NO_RESPONSE_RESULT.to_string());
                }
                tracing::debug!(round, "step finished without tool calls");
                return Ok(reply.content);
            }

            let calls = reply.tool_calls.clone();
            tracing::debug!(round, calls = calls.len(), "dispatching tool calls");
            messages.push(reply);

            let invocation = self.gateway.invoke_all(&calls).await;
            for call in &calls {
                let message = match invocation.message_for(&call.id) {
                    Some(m) => m.clone(),
                    None => Message::tool(call.id.clone(), missing_result(call)),
                };
                messages.push(message);
            }
        }

        tracing::warn!(max_rounds = self.max_rounds, "step stopped at round limit");
        Ok(stopped_after(self.max_rounds))
    }
}
