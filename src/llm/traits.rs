//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient，支持三种调用形态：
//! - complete：纯文本回复
//! - complete_with_tools：可携带 Tool Call 的回复（模型可能返回空）
//! - complete_structured：按 JSON Schema 约束输出结构化结果

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// 后端无法给出结果（如 Mock 未预置回复、不支持结构化输出）
    #[error("LLM unavailable: {0}")]
    Unavailable(String),
}

/// 提供给模型的工具描述（名称、说明、参数 JSON Schema）
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 结构化输出的目标 Schema
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    /// 由 schemars 为类型 T 生成 Schema
    pub fn of<T: schemars::JsonSchema>(name: impl Into<String>) -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(root).unwrap_or(Value::Null),
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 纯文本完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 携带工具目录的完成；返回 assistant 消息（可能含 tool_calls），模型无回复时为 None
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Option<Message>, LlmError>;

    /// 结构化完成：返回符合 schema 的 JSON 值（调用方再做类型化解析）
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
