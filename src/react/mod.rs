//! 认知层：Planner（规划 / 重规划）、决策解析、提示词与 ReAct 单步执行循环

pub mod loop_;
pub mod parser;
pub mod planner;
pub mod prompts;

pub use loop_::{StepExecutor, MAX_REACT_ROUNDS, NO_PLAN_RESULT, NO_RESPONSE_RESULT};
pub use parser::{Act, Action, FinalResponse, ParseError, Plan};
pub use planner::{PlanOutcome, PlanSource, Planner, REPLAN_WITHOUT_HISTORY};
pub use prompts::WorkDirs;
