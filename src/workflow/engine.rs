//! 工作流引擎
//!
//! 独占一次运行的 WorkflowState，按迁移表逐个执行节点（严格串行），
//! 每次迁移后推送完整状态快照，到达 end 后停止。引擎本身不重试节点：
//! 各节点内部的兜底策略是唯一的恢复机制。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::SolverError;
use crate::workflow::graph::next_node;
use crate::workflow::types::{NodeId, NodeOutput, WorkflowEvent, WorkflowState};

/// 三个业务节点：plan 可以致命失败（空目标），act / replan 总是产出结果
#[async_trait]
pub trait WorkflowNodes: Send + Sync {
    async fn plan(&self, state: &WorkflowState) -> Result<NodeOutput, SolverError>;
    async fn act(&self, state: &WorkflowState) -> NodeOutput;
    async fn replan(&self, state: &WorkflowState) -> NodeOutput;
}

/// 工作流引擎
pub struct WorkflowEngine {
    nodes: Arc<dyn WorkflowNodes>,
    recursion_limit: Option<usize>,
    event_tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl WorkflowEngine {
    pub fn new(nodes: Arc<dyn WorkflowNodes>) -> Self {
        Self {
            nodes,
            recursion_limit: None,
            event_tx: None,
        }
    }

    /// 节点迁移次数上限；超过时以 SolverError::RecursionLimit 结束
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// 每次迁移后接收状态快照
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, node: NodeId, transition: usize, state: &WorkflowState) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(WorkflowEvent {
                node,
                transition,
                state: state.clone(),
            });
        }
    }

    /// 从目标开始运行到终止状态
    pub async fn run(&self, objective: &str) -> Result<WorkflowState, SolverError> {
        let mut state = WorkflowState::new(objective);
        let mut node = next_node(NodeId::Start, &state);
        let mut transitions = 0usize;

        while !matches!(node, NodeId::End | NodeId::Start) {
            transitions += 1;
            if let Some(limit) = self.recursion_limit {
                if transitions > limit {
                    tracing::error!(limit, "workflow recursion limit reached");
                    return Err(SolverError::RecursionLimit(limit));
                }
            }

            let output = match node {
                NodeId::Plan => self.nodes.plan(&state).await?,
                NodeId::Act => self.nodes.act(&state).await,
                NodeId::Replan => self.nodes.replan(&state).await,
                NodeId::Start | NodeId::End => break,
            };
            state.apply(output);

            tracing::info!(
                node = %node,
                transition = transitions,
                plan_len = state.plan.len(),
                history_len = state.history().len(),
                finished = state.is_finished(),
                "node completed"
            );
            self.emit(node, transitions, &state);

            node = next_node(node, &state);
        }

        tracing::info!(transitions, "workflow reached end");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Decision, HistoryEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 每步执行后让计划缩短一步，计划耗尽时完成
    struct CountdownNodes {
        steps: usize,
        acts: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowNodes for CountdownNodes {
        async fn plan(&self, state: &WorkflowState) -> Result<NodeOutput, SolverError> {
            if state.objective().trim().is_empty() {
                return Err(SolverError::EmptyObjective);
            }
            Ok(NodeOutput::Planned(
                (1..=self.steps).map(|i| format!("step {}", i)).collect(),
            ))
        }

        async fn act(&self, state: &WorkflowState) -> NodeOutput {
            self.acts.fetch_add(1, Ordering::SeqCst);
            let step = state.next_step().unwrap_or_default().to_string();
            NodeOutput::Acted(HistoryEntry::new(step, "ok"))
        }

        async fn replan(&self, state: &WorkflowState) -> NodeOutput {
            let remaining: Vec<String> = state.plan.iter().skip(1).cloned().collect();
            if remaining.is_empty() {
                NodeOutput::Decided(Decision::Complete {
                    summary: "all done".into(),
                    content: None,
                })
            } else {
                NodeOutput::Decided(Decision::Continue { plan: remaining })
            }
        }
    }

    fn countdown(steps: usize) -> Arc<CountdownNodes> {
        Arc::new(CountdownNodes {
            steps,
            acts: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_runs_until_complete() {
        let nodes = countdown(3);
        let state = WorkflowEngine::new(nodes.clone()).run("obj").await.unwrap();
        assert_eq!(nodes.acts.load(Ordering::SeqCst), 3);
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.history()[2].step, "step 3");
        assert_eq!(state.final_answer.as_deref(), Some("all done"));
        assert!(state.plan.is_empty());
    }

    #[tokio::test]
    async fn test_emits_snapshot_per_transition_with_growing_history() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        WorkflowEngine::new(countdown(2))
            .with_event_tx(tx)
            .run("obj")
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        let nodes: Vec<NodeId> = events.iter().map(|e| e.node).collect();
        assert_eq!(
            nodes,
            vec![
                NodeId::Plan,
                NodeId::Act,
                NodeId::Replan,
                NodeId::Act,
                NodeId::Replan
            ]
        );
        let lens: Vec<usize> = events.iter().map(|e| e.state.history().len()).collect();
        assert!(lens.windows(2).all(|w| w[0] <= w[1]));
        assert!(events.last().unwrap().state.final_answer.is_some());
    }

    #[tokio::test]
    async fn test_blank_objective_is_fatal() {
        let err = WorkflowEngine::new(countdown(1)).run("   ").await.unwrap_err();
        assert!(matches!(err, SolverError::EmptyObjective));
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let err = WorkflowEngine::new(countdown(10))
            .with_recursion_limit(4)
            .run("obj")
            .await
            .unwrap_err();
        assert!(matches!(err, SolverError::RecursionLimit(4)));
    }
}
