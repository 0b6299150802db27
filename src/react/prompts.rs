//! 各节点的提示词拼装
//!
//! 执行历史只通过提示词传递给后续步骤与重规划，没有额外的共享记忆。

use std::path::PathBuf;

use crate::llm::Message;
use crate::workflow::HistoryEntry;

/// 两个工作目录角色：中间产物 / 最终交付（仅在提示词中约定，不做校验）
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub metadata_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for WorkDirs {
    fn default() -> Self {
        Self {
            metadata_dir: PathBuf::from("metadata"),
            output_dir: PathBuf::from("output"),
        }
    }
}

const PLANNER_SYSTEM: &str = "You are a planner. For the given objective, come up with a simple step by step plan. \
Each step should be an individual task that, if executed correctly, moves toward the answer. \
Do not add superfluous steps. The result of the final step should be the final answer.";

const REPLANNER_SYSTEM: &str = "You are a replanner. Decide whether the objective has been achieved. \
If it has, respond to the user with a summary and the primary output content. \
Otherwise, return only the steps that still need to be done; do not repeat completed steps.";

const EXECUTOR_SYSTEM: &str = "You are a capable assistant executing one step of a larger plan. \
Use the available tools (execute_python_code, web_search) when they help. \
When the step is complete, reply with the result and no tool calls.";

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 历史记录渲染为 "Step N: ...\nResult: ..." 段落
pub fn render_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "(no steps executed yet)".to_string();
    }
    history
        .iter()
        .enumerate()
        .map(|(i, h)| format!("Step {}: {}\nResult: {}", i + 1, h.step, h.result))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 结构化规划请求
pub fn plan_messages(objective: &str) -> Vec<Message> {
    vec![
        Message::system(PLANNER_SYSTEM),
        Message::user(format!("Objective:\n{}", objective)),
    ]
}

/// 纯文本规划请求（编号列表）
pub fn plan_text_messages(objective: &str) -> Vec<Message> {
    vec![
        Message::system(PLANNER_SYSTEM),
        Message::user(format!(
            "Objective:\n{}\n\nRespond with the plan as a numbered list, one step per line, e.g.\n1. First step\n2. Second step",
            objective
        )),
    ]
}

fn replan_context(objective: &str, plan: &[String], history: &[HistoryEntry]) -> String {
    format!(
        "Objective:\n{}\n\nOriginal plan:\n{}\n\nCompleted steps:\n{}",
        objective,
        numbered(plan),
        render_history(history)
    )
}

/// 结构化重规划请求
pub fn replan_messages(objective: &str, plan: &[String], history: &[HistoryEntry]) -> Vec<Message> {
    vec![
        Message::system(REPLANNER_SYSTEM),
        Message::user(replan_context(objective, plan, history)),
    ]
}

/// 纯文本重规划请求（要求输出 JSON）
pub fn replan_text_messages(
    objective: &str,
    plan: &[String],
    history: &[HistoryEntry],
) -> Vec<Message> {
    vec![
        Message::system(REPLANNER_SYSTEM),
        Message::user(format!(
            "{}\n\nReply with a single JSON object and nothing else, either\n\
             {{\"action\": {{\"response\": \"<summary>\", \"content\": \"<output or null>\"}}}}\n\
             or\n{{\"action\": {{\"steps\": [\"<remaining step>\", ...]}}}}",
            replan_context(objective, plan, history)
        )),
    ]
}

/// 单步执行指令：目标、完整计划、目录约定、完整历史、当前步骤
pub fn step_messages(
    objective: &str,
    plan: &[String],
    history: &[HistoryEntry],
    dirs: &WorkDirs,
) -> Vec<Message> {
    let step = plan.first().map(String::as_str).unwrap_or_default();
    vec![
        Message::system(EXECUTOR_SYSTEM),
        Message::user(format!(
            "Objective:\n{objective}\n\nPlan:\n{plan}\n\n\
             Working directories:\n\
             - {metadata}/ : intermediate artifacts (scripts, scratch data)\n\
             - {output}/ : final deliverables only\n\n\
             Execution history:\n{history}\n\n\
             You are tasked with executing step 1: {step}",
            objective = objective,
            plan = numbered(plan),
            metadata = dirs.metadata_dir.display(),
            output = dirs.output_dir.display(),
            history = render_history(history),
            step = step,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_instruction_contains_context() {
        let plan = vec!["Fetch data".to_string(), "Summarize".to_string()];
        let history = vec![HistoryEntry::new("Search", "found 3 sources")];
        let messages = step_messages("Write a report", &plan, &history, &WorkDirs::default());
        let body = &messages[1].content;
        assert!(body.contains("Write a report"));
        assert!(body.contains("1. Fetch data\n2. Summarize"));
        assert!(body.contains("metadata/"));
        assert!(body.contains("output/"));
        assert!(body.contains("Step 1: Search\nResult: found 3 sources"));
        assert!(body.ends_with("executing step 1: Fetch data"));
    }

    #[test]
    fn test_render_empty_history() {
        assert_eq!(render_history(&[]), "(no steps executed yet)");
    }
}
