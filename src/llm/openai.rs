//! OpenAI 兼容 API 客户端
//!
//! 直接以 reqwest 调用 `/chat/completions`（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 工具调用走 `tools` 字段，结构化输出走 `response_format: json_schema`。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError, Message, OutputSchema, Role, ToolCall, ToolSpec};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 结构化输出的请求方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredMode {
    /// `response_format: json_schema`（OpenAI）
    JsonSchema,
    /// `response_format: json_object`，Schema 写入 system 消息（DeepSeek 只支持这种）
    JsonObject,
}

/// OpenAI 兼容客户端：持有 HTTP Client、base_url、model 与 API Key
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    structured_mode: StructuredMode,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn with_timeout(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
            structured_mode: StructuredMode::JsonSchema,
            usage: TokenUsage::new(),
        }
    }

    pub fn with_structured_mode(mut self, mode: StructuredMode) -> Self {
        self.structured_mode = mode;
        self
    }

    /// 结构化请求体：按 structured_mode 选择 response_format
    fn structured_body(&self, messages: &[Message], schema: &OutputSchema) -> Value {
        match self.structured_mode {
            StructuredMode::JsonSchema => json!({
                "model": self.model,
                "messages": Self::to_api_messages(messages),
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": false,
                    }
                }
            }),
            StructuredMode::JsonObject => {
                let instruction = Message::system(format!(
                    "Respond with a single json object that conforms to this JSON schema:\n{}",
                    schema.schema
                ));
                let mut with_schema = Vec::with_capacity(messages.len() + 1);
                with_schema.push(instruction);
                with_schema.extend_from_slice(messages);
                json!({
                    "model": self.model,
                    "messages": Self::to_api_messages(&with_schema),
                    "response_format": { "type": "json_object" }
                })
            }
        }
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".to_string(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    /// 发送请求并返回首个 choice 的 message（无 choice 时为 None）
    async fn send(&self, body: Value) -> Result<Option<ApiMessage>, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(model = %self.model, "sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %message, "LLM endpoint returned error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &api_response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        Ok(api_response.choices.into_iter().next().map(|c| c.message))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
        });
        Ok(self
            .send(body)
            .await?
            .and_then(|m| m.content)
            .unwrap_or_default())
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Option<Message>, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::to_api_tools(tools));
        }

        let Some(reply) = self.send(body).await? else {
            return Ok(None);
        };
        let content = reply.content.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = reply
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        if content.trim().is_empty() && tool_calls.is_empty() {
            return Ok(None);
        }
        Ok(Some(Message::assistant_with_tools(content, tool_calls)))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        let body = self.structured_body(messages, schema);

        let content = self
            .send(body)
            .await?
            .and_then(|m| m.content)
            .ok_or_else(|| LlmError::MalformedResponse("empty structured response".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| LlmError::MalformedResponse(format!("{}: {}", e, content)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "default_call_type")]
    r#type: String,
    function: ApiFunction,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_messages_carry_tool_linkage() {
        let call = ToolCall::new("execute_python_code", json!({"code": "print(1)"}));
        let messages = vec![
            Message::user("go"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::tool(call.id.clone(), "1"),
        ];
        let api = OpenAiClient::to_api_messages(&messages);
        assert_eq!(api[1].role, "assistant");
        assert_eq!(api[1].tool_calls.as_ref().unwrap()[0].function.name, "execute_python_code");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some(call.id.as_str()));
    }

    fn plan_schema() -> OutputSchema {
        OutputSchema {
            name: "plan".to_string(),
            schema: json!({"type": "object", "properties": {"steps": {"type": "array"}}}),
        }
    }

    #[test]
    fn test_json_schema_mode_body() {
        let client = OpenAiClient::with_timeout(None, "gpt-4o-mini", Some("sk-test"), 5);
        let body = client.structured_body(&[Message::user("plan it")], &plan_schema());
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "plan");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_json_object_mode_embeds_schema_in_system_message() {
        let client = OpenAiClient::with_timeout(None, "deepseek-chat", Some("sk-test"), 5)
            .with_structured_mode(StructuredMode::JsonObject);
        let body = client.structured_body(&[Message::user("plan it")], &plan_schema());
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert!(body["response_format"].get("json_schema").is_none());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        let instruction = messages[0]["content"].as_str().unwrap();
        assert!(instruction.contains("json"));
        assert!(instruction.contains("\"steps\""));
        assert_eq!(messages[1]["content"], "plan it");
    }

    #[test]
    fn test_deepseek_client_uses_json_object() {
        let client = crate::llm::create_deepseek_client(None, 5);
        let body = client.structured_body(&[Message::user("plan it")], &plan_schema());
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_response_tool_calls_deserialize() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"x\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let msg = &parsed.choices[0].message;
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.as_ref().unwrap()[0].id, "call_1");
    }
}
