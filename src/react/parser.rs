//! 结构化决策解析
//!
//! 两级解析：
//! 1. 严格：请求模型按 Schema 输出（Plan / Act），再类型化解析；空计划视为失败
//! 2. 宽松：请求纯文本，规划时提取编号列表，重规划时提取文本中的 JSON 对象
//!
//! 严格级返回 Result<T, ParseError>，只有 Err 时调用方才进入宽松级。

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::{LlmClient, LlmError, Message, OutputSchema};
use crate::workflow::Decision;

/// 解析失败原因
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("response does not match schema: {0}")]
    Schema(String),

    #[error("plan has no steps")]
    EmptyPlan,

    #[error("unrecognized decision shape: {0}")]
    UnknownShape(String),

    #[error("no JSON object found in response")]
    NoJson,
}

/// Plan to follow in future
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// different steps to follow, should be in sorted order
    pub steps: Vec<String>,
}

/// Response to user, including final content if applicable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FinalResponse {
    /// Summary response to the user.
    pub response: String,
    /// The primary output content (e.g., CSV data).
    #[serde(default)]
    pub content: Option<String>,
}

/// Action to perform: respond to the user, or continue with a new plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Action {
    Response(FinalResponse),
    Plan(Plan),
}

/// Action to perform.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Act {
    /// If you want to respond to user, use Response. If you need to further use tools to get the answer, use Plan.
    pub action: Action,
}

fn clean_steps(steps: Vec<String>) -> Vec<String> {
    steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 将 JSON 值解析为非空计划
pub fn plan_from_value(value: Value) -> Result<Vec<String>, ParseError> {
    let plan: Plan = serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
    let steps = clean_steps(plan.steps);
    if steps.is_empty() {
        return Err(ParseError::EmptyPlan);
    }
    Ok(steps)
}

/// 将 JSON 值解析为决策；接受 {"action": {...}} 或直接的 action 对象
pub fn decision_from_value(value: Value) -> Result<Decision, ParseError> {
    let action_value = match value {
        Value::Object(mut map) if map.contains_key("action") => {
            map.remove("action").unwrap_or(Value::Null)
        }
        other => other,
    };
    let shape = action_value.to_string();
    let action: Action =
        serde_json::from_value(action_value).map_err(|_| ParseError::UnknownShape(shape))?;

    match action {
        Action::Response(r) => {
            let summary = if r.response.trim().is_empty() {
                "Task completed without a summary.".to_string()
            } else {
                r.response
            };
            Ok(Decision::Complete {
                summary,
                content: r.content.filter(|c| !c.trim().is_empty()),
            })
        }
        Action::Plan(p) => {
            let steps = clean_steps(p.steps);
            if steps.is_empty() {
                return Err(ParseError::EmptyPlan);
            }
            Ok(Decision::Continue { plan: steps })
        }
    }
}

/// 严格级：按 Plan Schema 请求并解析
pub async fn coerce_plan(llm: &dyn LlmClient, messages: &[Message]) -> Result<Vec<String>, ParseError> {
    let value = llm
        .complete_structured(messages, &OutputSchema::of::<Plan>("plan"))
        .await?;
    plan_from_value(value)
}

/// 严格级：按 Act Schema 请求并解析为决策
pub async fn coerce_decision(llm: &dyn LlmClient, messages: &[Message]) -> Result<Decision, ParseError> {
    let value = llm
        .complete_structured(messages, &OutputSchema::of::<Act>("act"))
        .await?;
    decision_from_value(value)
}

static NUMBERED_LINE: OnceLock<Option<Regex>> = OnceLock::new();

fn numbered_line() -> Option<&'static Regex> {
    NUMBERED_LINE
        .get_or_init(|| Regex::new(r"^\s*\d{1,3}\.\s+(.+)$").ok())
        .as_ref()
}

/// 宽松级（规划）：提取形如 "1. xxx" 的行，每行余下部分为一步
pub fn parse_numbered_steps(text: &str) -> Vec<String> {
    let Some(re) = numbered_line() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// 从文本中提取 JSON 对象（```json ... ``` 块或首尾花括号之间）
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 宽松级（重规划）：从纯文本中解析决策
pub fn decision_from_text(text: &str) -> Result<Decision, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJson)?;
    let value: Value = serde_json::from_str(json).map_err(|e| ParseError::Schema(e.to_string()))?;
    decision_from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[test]
    fn test_numbered_list_fallback() {
        assert_eq!(
            parse_numbered_steps("1. Research\n2. Implement\n3. Test"),
            vec!["Research", "Implement", "Test"]
        );
    }

    #[test]
    fn test_numbered_list_double_digits_and_noise() {
        let text = "Here is the plan:\n  9. Nine\n10. Ten\n- bullet\n1000. too long\nno number";
        assert_eq!(parse_numbered_steps(text), vec!["Nine", "Ten"]);
    }

    #[test]
    fn test_numbered_list_no_match() {
        assert!(parse_numbered_steps("just do it").is_empty());
    }

    #[test]
    fn test_plan_from_value_rejects_empty() {
        assert!(matches!(
            plan_from_value(json!({"steps": []})),
            Err(ParseError::EmptyPlan)
        ));
        assert!(matches!(
            plan_from_value(json!({"steps": ["  ", ""]})),
            Err(ParseError::EmptyPlan)
        ));
        assert!(matches!(
            plan_from_value(json!({"plan": ["a"]})),
            Err(ParseError::Schema(_))
        ));
    }

    #[test]
    fn test_decision_complete() {
        let d = decision_from_value(json!({"action": {"response": "Done", "content": "4"}})).unwrap();
        assert_eq!(
            d,
            Decision::Complete {
                summary: "Done".into(),
                content: Some("4".into())
            }
        );
    }

    #[test]
    fn test_decision_continue() {
        let d = decision_from_value(json!({"action": {"steps": ["a", "b"]}})).unwrap();
        assert_eq!(
            d,
            Decision::Continue {
                plan: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn test_decision_unknown_shape() {
        let err = decision_from_value(json!({"action": {"verdict": "maybe"}})).unwrap_err();
        assert!(matches!(err, ParseError::UnknownShape(_)));
        let err = decision_from_value(json!(42)).unwrap_err();
        assert!(matches!(err, ParseError::UnknownShape(_)));
    }

    #[test]
    fn test_decision_continue_with_empty_plan_is_error() {
        let err = decision_from_value(json!({"action": {"steps": []}})).unwrap_err();
        assert!(matches!(err, ParseError::EmptyPlan));
    }

    #[test]
    fn test_decision_from_fenced_text() {
        let text = "Sure.\n```json\n{\"action\": {\"response\": \"ok\"}}\n```";
        let d = decision_from_text(text).unwrap();
        assert_eq!(
            d,
            Decision::Complete {
                summary: "ok".into(),
                content: None
            }
        );
        assert!(matches!(decision_from_text("no json here"), Err(ParseError::NoJson)));
    }

    #[tokio::test]
    async fn test_coerce_plan_empty_steps_is_err() {
        let mock = MockLlmClient::new().with_structured(json!({"steps": []}));
        let err = coerce_plan(&mock, &[]).await.unwrap_err();
        assert!(matches!(err, ParseError::EmptyPlan));
    }

    #[tokio::test]
    async fn test_coerce_decision_propagates_llm_error() {
        let mock = MockLlmClient::new().with_structured_error(LlmError::Network("down".into()));
        let err = coerce_decision(&mock, &[]).await.unwrap_err();
        assert!(matches!(err, ParseError::Llm(_)));
    }

    #[test]
    fn test_act_schema_generates() {
        let schema = OutputSchema::of::<Act>("act");
        assert!(schema.schema.is_object());
        assert_eq!(schema.name, "act");
    }
}
