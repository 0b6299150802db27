//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolGateway 在调用时加超时并把结果统一转成工具消息。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSpec;

/// 模型给出的参数不是 JSON 对象时，网关把原文放在这个键下
pub const RAW_ARGUMENT_KEY: &str = "input";

/// 读取字符串参数；缺失时退回原文参数（RAW_ARGUMENT_KEY）
pub fn string_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key)
        .or_else(|| args.get(RAW_ARGUMENT_KEY))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型按此名调用）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 为给模型看的错误描述，不会中断推理循环
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具目录：交给模型的 (name, description, parameters) 列表，按名称排序
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_arg_prefers_named_key() {
        let args = json!({"code": "print(1)", "input": "ignored"});
        assert_eq!(string_arg(&args, "code"), "print(1)");
    }

    #[test]
    fn test_string_arg_falls_back_to_raw_input() {
        assert_eq!(string_arg(&json!({"input": "echo 42"}), "code"), "echo 42");
        assert_eq!(string_arg(&json!({}), "query"), "");
    }
}
