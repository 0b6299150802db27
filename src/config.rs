//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEPWISE__*` 覆盖（双下划线表示嵌套，如 `STEPWISE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub workflow: WorkflowSection,
}

/// [app] 段：中间产物目录、最终交付目录、目标输入文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 中间产物目录（脚本、草稿数据）
    pub metadata_dir: PathBuf,
    /// 最终交付目录
    pub output_dir: PathBuf,
    /// 默认从此文件读取目标
    pub input_file: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            metadata_dir: PathBuf::from("metadata"),
            output_dir: PathBuf::from("output"),
            input_file: PathBuf::from("context.txt"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmDeepSeekSection,
    pub openai: LlmOpenAiSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [tools] 段：网关超时、代码执行、Web 搜索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 网关对单次工具调用施加的外层超时（秒）
    pub tool_timeout_secs: u64,
    pub code: CodeSection,
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 300,
            code: CodeSection::default(),
            search: SearchSection::default(),
        }
    }
}

/// [tools.code] 段：解释器与默认超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodeSection {
    pub interpreter: String,
    pub default_timeout_secs: u64,
}

impl Default for CodeSection {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            default_timeout_secs: 60,
        }
    }
}

/// [tools.search] 段：搜索端点、超时、结果截断长度与条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            timeout_secs: 15,
            max_result_chars: 3000,
            max_results: 10,
        }
    }
}

/// [workflow] 段：单步 ReAct 轮数上限、图迁移次数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_react_rounds: usize,
    pub recursion_limit: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_react_rounds: 7,
            recursion_limit: 250,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEPWISE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEPWISE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEPWISE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
