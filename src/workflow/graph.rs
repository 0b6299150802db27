//! 工作流图：start → plan → act → replan → (act | end)
//!
//! 迁移表是纯函数；唯一的条件边在 replan 之后，由 should_end 判定。

use crate::workflow::types::{NodeId, WorkflowState};

/// 终止判定：已有最终回答，或计划为空
pub fn should_end(state: &WorkflowState) -> bool {
    state.final_answer.is_some() || state.plan.is_empty()
}

/// 给定刚执行完的节点与当前状态，返回下一个节点
pub fn next_node(current: NodeId, state: &WorkflowState) -> NodeId {
    match current {
        NodeId::Start => NodeId::Plan,
        NodeId::Plan => NodeId::Act,
        NodeId::Act => NodeId::Replan,
        NodeId::Replan => {
            if should_end(state) {
                NodeId::End
            } else {
                NodeId::Act
            }
        }
        NodeId::End => NodeId::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Decision, NodeOutput};

    fn planned(steps: &[&str]) -> WorkflowState {
        let mut state = WorkflowState::new("obj");
        state.apply(NodeOutput::Planned(steps.iter().map(|s| s.to_string()).collect()));
        state
    }

    #[test]
    fn test_linear_edges() {
        let state = planned(&["a"]);
        assert_eq!(next_node(NodeId::Start, &state), NodeId::Plan);
        assert_eq!(next_node(NodeId::Plan, &state), NodeId::Act);
        assert_eq!(next_node(NodeId::Act, &state), NodeId::Replan);
        assert_eq!(next_node(NodeId::End, &state), NodeId::End);
    }

    #[test]
    fn test_replan_continues_with_open_plan() {
        let state = planned(&["a", "b"]);
        assert!(!should_end(&state));
        assert_eq!(next_node(NodeId::Replan, &state), NodeId::Act);
    }

    #[test]
    fn test_replan_ends_on_final_answer() {
        let mut state = planned(&["a"]);
        state.apply(NodeOutput::Decided(Decision::Complete {
            summary: "done".into(),
            content: None,
        }));
        assert!(should_end(&state));
        assert_eq!(next_node(NodeId::Replan, &state), NodeId::End);
    }

    #[test]
    fn test_replan_ends_on_empty_plan() {
        let state = planned(&[]);
        assert!(should_end(&state));
        assert_eq!(next_node(NodeId::Replan, &state), NodeId::End);
    }
}
