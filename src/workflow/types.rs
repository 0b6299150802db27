//! 工作流类型定义
//!
//! WorkflowState 是一次运行中唯一的可变记录，由引擎独占；各节点只返回 NodeOutput（部分更新），
//! 由 WorkflowState::apply 按合并规则写回：
//! - history 只追加，不缩短、不重排
//! - plan 在规划 / 重规划时整体替换
//! - final_answer / final_content 仅在 Complete 时设置

use serde::{Deserialize, Serialize};

/// 已执行的一步：(step, result)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: String,
    pub result: String,
}

impl HistoryEntry {
    pub fn new(step: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            result: result.into(),
        }
    }
}

/// 重规划的决策：继续（新计划）或完成（最终回答）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Continue { plan: Vec<String> },
    Complete {
        summary: String,
        content: Option<String>,
    },
}

impl Decision {
    /// 以错误描述作为 summary 的终止决策
    pub fn error(summary: impl Into<String>) -> Self {
        Decision::Complete {
            summary: summary.into(),
            content: None,
        }
    }
}

/// 节点的部分更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutput {
    /// 初始计划
    Planned(Vec<String>),
    /// 执行了一步
    Acted(HistoryEntry),
    /// 重规划决策
    Decided(Decision),
}

/// 一次运行的完整状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    objective: String,
    pub plan: Vec<String>,
    history: Vec<HistoryEntry>,
    pub final_answer: Option<String>,
    pub final_content: Option<String>,
}

impl WorkflowState {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            ..Self::default()
        }
    }

    /// 目标一经设置不可修改
    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// 已执行步骤，按执行顺序排列
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// 下一个待执行的步骤
    pub fn next_step(&self) -> Option<&str> {
        self.plan.first().map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.final_answer.is_some()
    }

    /// 按合并规则写入节点输出
    pub fn apply(&mut self, output: NodeOutput) {
        match output {
            NodeOutput::Planned(plan) => self.plan = plan,
            NodeOutput::Acted(entry) => self.history.push(entry),
            NodeOutput::Decided(Decision::Continue { plan }) => {
                self.plan = plan;
                self.final_answer = None;
                self.final_content = None;
            }
            NodeOutput::Decided(Decision::Complete { summary, content }) => {
                self.plan.clear();
                self.final_answer = Some(summary);
                self.final_content = content;
            }
        }
    }
}

/// 图中的节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Start,
    Plan,
    Act,
    Replan,
    End,
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeId::Start => "start",
            NodeId::Plan => "plan",
            NodeId::Act => "act",
            NodeId::Replan => "replan",
            NodeId::End => "end",
        };
        f.write_str(name)
    }
}

/// 每次节点迁移后推送的状态快照
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    /// 刚执行完的节点
    pub node: NodeId,
    /// 第几次迁移（从 1 开始）
    pub transition: usize,
    pub state: WorkflowState,
}
