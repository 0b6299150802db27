//! Stepwise 命令行入口
//!
//! 初始化日志、加载配置、准备工作目录，读取目标后跑完整的规划 / 执行 / 重规划循环，
//! 逐步打印轨迹并输出最终状态。

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use stepwise::config::load_config;
use stepwise::workflow::{NodeId, WorkflowEvent, WorkflowState};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "stepwise", version, about = "Plan, execute and replan until an objective is met")]
struct Cli {
    /// 额外的 TOML 配置文件（覆盖 config/default.toml）
    #[arg(short, long, env = "STEPWISE_CONFIG")]
    config: Option<PathBuf>,

    /// 从文件读取目标（默认取 [app].input_file）
    #[arg(short, long, conflicts_with = "objective")]
    input_file: Option<PathBuf>,

    /// 直接在命令行给出目标
    #[arg(short, long)]
    objective: Option<String>,
}

fn print_event(event: &WorkflowEvent) {
    let state = &event.state;
    match event.node {
        NodeId::Plan => {
            println!("\n== Plan ==");
            for (i, step) in state.plan.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
        NodeId::Act => {
            if let Some(last) = state.history().last() {
                println!("\n== Step {}: {} ==", state.history().len(), last.step);
                println!("{}", last.result);
            }
        }
        NodeId::Replan => match &state.final_answer {
            Some(answer) => println!("\n== Final response ==\n{}", answer),
            None => println!("\n== Replanned: {} step(s) remaining ==", state.plan.len()),
        },
        NodeId::Start | NodeId::End => {}
    }
}

fn print_final(state: &WorkflowState) {
    println!("\n== Final state ==");
    println!("Objective: {}", state.objective());
    println!("Steps executed: {}", state.history().len());
    if let Some(answer) = &state.final_answer {
        println!("Answer: {}", answer);
    }
    if let Some(content) = &state.final_content {
        println!("Content:\n{}", content);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stepwise::observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load configuration")?;

    for dir in [&cfg.app.metadata_dir, &cfg.app.output_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let objective = match cli.objective {
        Some(text) => text,
        None => {
            let path = cli.input_file.unwrap_or_else(|| cfg.app.input_file.clone());
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read objective from {}", path.display()))?
        }
    };
    if objective.trim().is_empty() {
        bail!("Objective is empty");
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let result = stepwise::run(objective.trim(), &cfg, Some(event_tx)).await;
    // 发送端随引擎一起释放，打印任务在消费完剩余事件后结束
    let _ = printer.await;

    let state = result.context("Solver run failed")?;
    print_final(&state);
    Ok(())
}
