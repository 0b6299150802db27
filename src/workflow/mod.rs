//! 工作流：状态、迁移表与驱动引擎

pub mod engine;
pub mod graph;
pub mod types;

pub use engine::{WorkflowEngine, WorkflowNodes};
pub use graph::{next_node, should_end};
pub use types::*;
