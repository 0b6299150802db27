//! 代码执行工具：在独立子进程中运行模型生成的代码
//!
//! 输入若被 Markdown 代码块包裹，先提取首个代码块（先试 ```python，再试通用 ```），否则原样使用；
//! 代码写入临时文件后由解释器执行，超时则强制杀死子进程。临时文件随作用域结束删除，错误路径也不例外。

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::registry::string_arg;
use crate::tools::Tool;

pub const CODE_TOOL_NAME: &str = "execute_python_code";

static FENCE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn fence_patterns() -> &'static [Regex] {
    FENCE_PATTERNS.get_or_init(|| {
        [r"(?s)```python\s*(.*?)```", r"(?s)```\s*(.*?)```"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// 提取首个代码块内容；无代码块时返回去除首尾空白的原文
pub fn extract_code_block(input: &str) -> String {
    for re in fence_patterns() {
        if let Some(body) = re.captures(input).and_then(|c| c.get(1)) {
            return body.as_str().trim().to_string();
        }
    }
    input.trim().to_string()
}

/// 单次代码执行结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CodeExecution {
    pub ok: bool,
    /// 标准输出；stderr 非空时附在 "STDERR:" 段之后
    pub output: String,
    pub error: Option<String>,
    pub timed_out: bool,
    /// 实际执行的代码（提取代码块之后）
    pub code: String,
    /// 原样保留的标准错误，供诊断
    pub stderr: Option<String>,
}

impl CodeExecution {
    fn failed(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: String::new(),
            error: Some(error.into()),
            timed_out: false,
            code: code.into(),
            stderr: None,
        }
    }
}

/// 合并 stdout 与 stderr（stderr 放在带标签的段落中）
fn combine_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => format!("STDERR:\n{}", stderr),
        (false, false) => format!("{}\n\nSTDERR:\n{}", stdout, stderr),
    }
}

/// 代码执行器：解释器名 + 临时文件后缀
#[derive(Debug, Clone)]
pub struct CodeRunner {
    interpreter: String,
    suffix: String,
}

impl Default for CodeRunner {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl CodeRunner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            suffix: ".py".to_string(),
        }
    }

    /// 执行代码；所有失败都体现在返回值中，不会 panic 或返回 Err
    pub async fn run(&self, source: &str, timeout: Duration) -> CodeExecution {
        let code = extract_code_block(source);
        if code.is_empty() {
            return CodeExecution::failed(code, "No code provided to execute");
        }

        // 临时文件在本函数返回时随 NamedTempFile drop 删除
        let script = match tempfile::Builder::new()
            .prefix("stepwise_")
            .suffix(&self.suffix)
            .tempfile()
        {
            Ok(f) => f,
            Err(e) => return CodeExecution::failed(code, format!("Failed to create temp file: {}", e)),
        };
        if let Err(e) = tokio::fs::write(script.path(), code.as_bytes()).await {
            return CodeExecution::failed(code, format!("Failed to write temp file: {}", e));
        }

        let child = Command::new(&self.interpreter)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => {
                return CodeExecution::failed(
                    code,
                    format!("Failed to start interpreter '{}': {}", self.interpreter, e),
                )
            }
        };

        tracing::info!(interpreter = %self.interpreter, timeout_secs = timeout.as_secs_f32(), "code execution started");

        // 超时时 wait_with_output 被丢弃，kill_on_drop 负责杀死子进程
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return CodeExecution::failed(code, format!("Execution failed: {}", e)),
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs_f32(), "code execution timed out, process killed");
                return CodeExecution {
                    timed_out: true,
                    ..CodeExecution::failed(
                        code,
                        format!(
                            "Code execution timed out after {} seconds",
                            timeout.as_secs_f32()
                        ),
                    )
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let combined = combine_output(&stdout, &stderr);
        let stderr_kept = if stderr.trim().is_empty() {
            None
        } else {
            Some(stderr)
        };

        if output.status.success() {
            CodeExecution {
                ok: true,
                output: combined,
                error: None,
                timed_out: false,
                code,
                stderr: stderr_kept,
            }
        } else {
            let error = match output.status.code() {
                Some(c) => format!("Process returned non-zero exit code: {}", c),
                None => "Process terminated by signal".to_string(),
            };
            CodeExecution {
                ok: false,
                output: combined,
                error: Some(error),
                timed_out: false,
                code,
                stderr: stderr_kept,
            }
        }
    }
}

/// execute_python_code 工具：参数 {"code": "...", "timeout": 60}
pub struct CodeExecTool {
    runner: CodeRunner,
    default_timeout_secs: u64,
    /// 请求超时的上限；须小于网关的外层超时，超时才能以 timed_out 结果返回
    max_timeout_secs: Option<u64>,
}

impl CodeExecTool {
    pub fn new(runner: CodeRunner, default_timeout_secs: u64) -> Self {
        Self {
            runner,
            default_timeout_secs,
            max_timeout_secs: None,
        }
    }

    pub fn with_max_timeout_secs(mut self, max: u64) -> Self {
        self.max_timeout_secs = Some(max.max(1));
        self
    }

    fn effective_timeout(&self, requested: Option<u64>) -> Duration {
        let secs = requested.unwrap_or(self.default_timeout_secs);
        let secs = match self.max_timeout_secs {
            Some(max) => secs.min(max),
            None => secs,
        };
        Duration::from_secs(secs)
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        CODE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute Python code in an isolated subprocess and capture the output. Returns a JSON record with ok, output, error, timed_out."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Maximum execution time in seconds (default: 60)"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let code = string_arg(&args, "code");
        let timeout = self.effective_timeout(args.get("timeout").and_then(|v| v.as_u64()));

        let result = self.runner.run(code, timeout).await;
        let rendered = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
        if result.ok {
            Ok(rendered)
        } else {
            Err(rendered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> CodeRunner {
        CodeRunner::new("sh")
    }

    #[test]
    fn test_extract_python_fence() {
        assert_eq!(extract_code_block("```python\nprint(1)\n```"), "print(1)");
    }

    #[test]
    fn test_extract_generic_fence() {
        assert_eq!(
            extract_code_block("Here:\n```\nx = 2\nprint(x)\n```\nthanks"),
            "x = 2\nprint(x)"
        );
    }

    #[test]
    fn test_extract_without_fence_is_verbatim() {
        assert_eq!(extract_code_block("print('hi')"), "print('hi')");
    }

    #[test]
    fn test_combine_output_labels_stderr() {
        assert_eq!(combine_output("out\n", ""), "out");
        assert_eq!(combine_output("", "warn"), "STDERR:\nwarn");
        assert_eq!(combine_output("out", "warn"), "out\n\nSTDERR:\nwarn");
    }

    #[tokio::test]
    async fn test_empty_code_fails_fast() {
        let result = sh().run("```python\n```", Duration::from_secs(1)).await;
        assert!(!result.ok);
        assert!(!result.timed_out);
        assert_eq!(result.error.as_deref(), Some("No code provided to execute"));
    }

    #[tokio::test]
    async fn test_successful_run_captures_stdout() {
        let result = sh().run("echo hello", Duration::from_secs(5)).await;
        assert!(result.ok, "{:?}", result);
        assert_eq!(result.output, "hello");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_success_with_stderr_appends_section() {
        let result = sh().run("echo out; echo diag 1>&2", Duration::from_secs(5)).await;
        assert!(result.ok);
        assert_eq!(result.output, "out\n\nSTDERR:\ndiag");
        assert_eq!(result.stderr.as_deref().map(str::trim), Some("diag"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code_and_stderr() {
        let result = sh().run("echo boom 1>&2; exit 3", Duration::from_secs(5)).await;
        assert!(!result.ok);
        assert!(!result.timed_out);
        assert_eq!(
            result.error.as_deref(),
            Some("Process returned non-zero exit code: 3")
        );
        assert_eq!(result.stderr.as_deref(), Some("boom\n"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let result = sh().run("sleep 5", Duration::from_secs(1)).await;
        assert!(!result.ok);
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_run() {
        // sh 的 $0 即脚本路径
        let result = sh().run("echo $0", Duration::from_secs(5)).await;
        assert!(result.ok);
        let script_path = std::path::PathBuf::from(result.output.trim());
        assert!(script_path.to_string_lossy().contains("stepwise_"));
        assert!(!script_path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_nonzero_exit() {
        let result = sh().run("echo $0; exit 2", Duration::from_secs(5)).await;
        assert!(!result.ok);
        assert_eq!(
            result.error.as_deref(),
            Some("Process returned non-zero exit code: 2")
        );
        let script_path = std::path::PathBuf::from(result.output.trim());
        assert!(script_path.to_string_lossy().contains("stepwise_"));
        assert!(!script_path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_timeout() {
        let dir = std::env::temp_dir();
        let before: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        let result = sh().run("sleep 5 # stepwise-timeout-cleanup", Duration::from_millis(300)).await;
        assert!(result.timed_out);
        let leaked = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| !before.contains(p))
            .filter(|p| {
                std::fs::read_to_string(p)
                    .map(|s| s.contains("stepwise-timeout-cleanup"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leaked, 0);
    }

    #[tokio::test]
    async fn test_python_sleep_times_out() {
        let has_python = std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !has_python {
            return;
        }
        let result = CodeRunner::default()
            .run("import time; time.sleep(5)", Duration::from_secs(1))
            .await;
        assert!(!result.ok);
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_reported() {
        let result = CodeRunner::new("definitely-not-an-interpreter-xyz")
            .run("print(1)", Duration::from_secs(1))
            .await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("Failed to start interpreter"));
    }

    #[test]
    fn test_requested_timeout_clamped_to_max() {
        let tool = CodeExecTool::new(sh(), 60).with_max_timeout_secs(10);
        assert_eq!(tool.effective_timeout(Some(500)), Duration::from_secs(10));
        assert_eq!(tool.effective_timeout(Some(3)), Duration::from_secs(3));
        assert_eq!(tool.effective_timeout(None), Duration::from_secs(10));
        let unbounded = CodeExecTool::new(sh(), 60);
        assert_eq!(unbounded.effective_timeout(Some(500)), Duration::from_secs(500));
    }

    #[tokio::test]
    async fn test_raw_argument_used_as_code() {
        let tool = CodeExecTool::new(sh(), 5);
        let out = tool
            .execute(serde_json::json!({"input": "echo 42"}))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["output"], "42");
    }

    #[tokio::test]
    async fn test_tool_reports_failure_as_err_json() {
        let tool = CodeExecTool::new(sh(), 5);
        let err = tool
            .execute(serde_json::json!({"code": "exit 1"}))
            .await
            .unwrap_err();
        let parsed: serde_json::Value = serde_json::from_str(&err).unwrap();
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["timed_out"], false);
    }
}
