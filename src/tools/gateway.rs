//! 工具网关
//!
//! 持有 ToolRegistry 与外层超时。invoke_all 对一轮中的全部 Tool Call 依次分发，
//! 返回统一的 ToolInvocationResult（每个已分发的调用对应一条 Tool 消息）；
//! 工具失败与超时都折叠为消息文本，不会向上传播。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::llm::{Message, ToolCall, ToolSpec};
use crate::tools::registry::RAW_ARGUMENT_KEY;
use crate::tools::ToolRegistry;

/// 一轮工具分发的结果：按调用顺序排列的 Tool 消息
#[derive(Debug, Clone, Default)]
pub struct ToolInvocationResult {
    pub messages: Vec<Message>,
    /// 因工具名未注册而未分发的调用
    pub skipped: Vec<ToolCall>,
}

impl ToolInvocationResult {
    /// 指定 call_id 的 Tool 消息（未分发时为 None）
    pub fn message_for(&self, call_id: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some(call_id))
    }
}

/// 工具网关：统一的工具调用入口
pub struct ToolGateway {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolGateway {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 提供给模型的工具目录
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 分发一轮中的全部调用；未注册的工具名被跳过（记录在 skipped 中）
    pub async fn invoke_all(&self, calls: &[ToolCall]) -> ToolInvocationResult {
        let mut result = ToolInvocationResult::default();
        for call in calls {
            match self.invoke(call).await {
                Some(content) => result.messages.push(Message::tool(call.id.clone(), content)),
                None => {
                    tracing::warn!(tool = %call.name, call_id = %call.id, "unknown tool requested, call dropped");
                    result.skipped.push(call.clone());
                }
            }
        }
        result
    }

    /// 执行单个调用；工具未注册时返回 None，其余情况（含失败、超时）都返回文本
    pub async fn invoke(&self, call: &ToolCall) -> Option<String> {
        let tool = self.registry.get(&call.name)?;
        let args = parse_arguments(&call.arguments);

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        Some(match result {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => format!("Error: {}", e),
            Err(_) => format!(
                "Error: tool '{}' timed out after {}s",
                call.name,
                self.timeout.as_secs()
            ),
        })
    }
}

/// 模型给出的参数不是合法 JSON 对象时，按单个字符串参数兜底
fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => v,
        _ => serde_json::json!({ RAW_ARGUMENT_KEY: raw }),
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
