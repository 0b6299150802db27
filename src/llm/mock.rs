//! Mock LLM 客户端（用于测试与无 API Key 时的本地运行）
//!
//! 三种调用形态各有一条预置回复队列，按调用顺序依次弹出；队列耗尽时：
//! - complete 返回空字符串
//! - complete_with_tools 返回 default_turn（未设置则为 None，即“无回复”）
//! - complete_structured 返回 Unavailable 错误
//!
//! 所有调用都会计数，便于断言“某路径没有调用模型”。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, Message, OutputSchema, ToolSpec};

/// 可脚本化、带调用计数的 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    texts: Mutex<VecDeque<Result<String, LlmError>>>,
    turns: Mutex<VecDeque<Result<Option<Message>, LlmError>>>,
    structured: Mutex<VecDeque<Result<Value, LlmError>>>,
    default_turn: Option<Message>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 complete 的回复
    pub fn with_text(self, text: impl Into<String>) -> Self {
        push(&self.texts, Ok(text.into()));
        self
    }

    /// 预置 complete_with_tools 的回复（None 表示模型无回复）
    pub fn with_turn(self, turn: Option<Message>) -> Self {
        push(&self.turns, Ok(turn));
        self
    }

    /// 预置 complete_structured 的回复
    pub fn with_structured(self, value: Value) -> Self {
        push(&self.structured, Ok(value));
        self
    }

    pub fn with_text_error(self, err: LlmError) -> Self {
        push(&self.texts, Err(err));
        self
    }

    pub fn with_turn_error(self, err: LlmError) -> Self {
        push(&self.turns, Err(err));
        self
    }

    pub fn with_structured_error(self, err: LlmError) -> Self {
        push(&self.structured, Err(err));
        self
    }

    /// complete_with_tools 队列耗尽后重复返回的回复（如“总是请求工具”的模型）
    pub fn with_default_turn(mut self, turn: Message) -> Self {
        self.default_turn = Some(turn);
        self
    }

    /// 累计调用次数（三种形态合计）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn push<T>(queue: &Mutex<VecDeque<T>>, item: T) {
    if let Ok(mut q) = queue.lock() {
        q.push_back(item);
    }
}

fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.count();
        pop(&self.texts).unwrap_or_else(|| Ok(String::new()))
    }

    async fn complete_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<Option<Message>, LlmError> {
        self.count();
        pop(&self.turns).unwrap_or_else(|| Ok(self.default_turn.clone()))
    }

    async fn complete_structured(
        &self,
        _messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        self.count();
        pop(&self.structured).unwrap_or_else(|| {
            Err(LlmError::Unavailable(format!(
                "mock has no scripted response for schema '{}'",
                schema.name
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_pop_in_order() {
        let mock = MockLlmClient::new().with_text("first").with_text("second");
        assert_eq!(mock.complete(&[]).await.unwrap(), "first");
        assert_eq!(mock.complete(&[]).await.unwrap(), "second");
        assert_eq!(mock.complete(&[]).await.unwrap(), "");
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_structured_without_script_is_unavailable() {
        let mock = MockLlmClient::new();
        let schema = OutputSchema {
            name: "plan".to_string(),
            schema: Value::Null,
        };
        let err = mock.complete_structured(&[], &schema).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_default_turn_repeats() {
        let mock = MockLlmClient::new().with_default_turn(Message::assistant("again"));
        for _ in 0..3 {
            let turn = mock.complete_with_tools(&[], &[]).await.unwrap();
            assert_eq!(turn.unwrap().content, "again");
        }
    }
}
