//! analyst 命令行
//!
//! 带 QUERY 时执行一轮并打印最终回复；不带 QUERY 时逐行读取 stdin，每行在同一线程上执行一轮（Ctrl-D 退出）。
//! 回合进行中按 Ctrl-C 请求停止，在下一次入口守卫时生效。

use std::path::PathBuf;
use std::sync::Arc;

use analyst::agent::{AnalysisRequest, AnalysisService};
use analyst::config::load_config;
use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "analyst")]
#[command(about = "Data analysis agent with per-thread persistent conversations")]
#[command(version)]
struct Cli {
    /// 额外的 TOML 配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 会话线程 ID
    #[arg(short, long, default_value = "default")]
    thread: String,

    /// 以 stop 标志提交本轮（不调用推理后端）
    #[arg(long)]
    stop: bool,

    /// 上传目录中的数据文件名
    #[arg(short, long)]
    file: Option<String>,

    /// 问题；省略时从 stdin 逐行读取
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    analyst::observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let service = Arc::new(
        AnalysisService::from_config(&cfg)
            .await
            .context("Failed to create analysis service")?,
    );

    {
        let service = service.clone();
        let thread = cli.thread.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if service.orchestrator().request_stop(&thread) {
                    tracing::warn!(thread_id = %thread, "stop requested");
                }
            }
        });
    }

    if !cli.query.is_empty() {
        let query = cli.query.join(" ");
        run_one(&service, &cli, query).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = run_one(&service, &cli, line.to_string()).await {
            eprintln!("error: {:#}", e);
        }
    }
    Ok(())
}

async fn run_one(service: &AnalysisService, cli: &Cli, query: String) -> anyhow::Result<()> {
    if cli.stop {
        let outcome = service
            .orchestrator()
            .run_turn(&cli.thread, &query, true)
            .await
            .context("Turn failed")?;
        println!("{}", outcome.final_content);
        return Ok(());
    }

    let request = AnalysisRequest {
        file_path: cli.file.clone(),
        thread_id: cli.thread.clone(),
        ..AnalysisRequest::new(query)
    };
    let response = service.analyze(&request).await.context("Turn failed")?;
    println!("{}", response.result);
    Ok(())
}
