//! 工具网关：代码执行、Web 搜索与统一分发

pub mod code;
pub mod gateway;
pub mod registry;
pub mod search;

pub use code::{extract_code_block, CodeExecTool, CodeExecution, CodeRunner, CODE_TOOL_NAME};
pub use gateway::{ToolGateway, ToolInvocationResult};
pub use registry::{Tool, ToolRegistry};
pub use search::{DuckDuckGoBackend, SearchBackend, WebSearchTool, NO_RESULTS_SENTINEL, SEARCH_TOOL_NAME};
