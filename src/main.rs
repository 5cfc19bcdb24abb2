//! Taskloop - 自主智能体编排核心
//!
//! 入口：加载配置、初始化日志、bootstrap，并运行主循环。

use std::path::PathBuf;

use anyhow::Context;
use taskloop::config::{load_config, AppConfig};
use taskloop::core::{pacer_from_config, run_loop, AgentBuilder, ShutdownManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskloop::observability::init();

    // 第一个参数可指定额外的配置文件
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let pacer = pacer_from_config(&config.iteration);
    let agent = AgentBuilder::new(config)
        .build()
        .await
        .context("Failed to build agent")?;
    let report = agent.bootstrap().await.context("Bootstrap failed")?;
    tracing::info!(?report, room_id = %agent.scope.room_id, "Agent ready");

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let orchestrator = agent.orchestrator();
    let summary = run_loop(&orchestrator, pacer.as_ref(), &shutdown).await;
    let (prompt_tokens, completion_tokens, _) = agent.token_usage();
    tracing::info!(
        cycles = summary.cycles,
        completed = summary.completed_tasks,
        failed = summary.failed_cycles,
        idle = summary.idle_cycles,
        reason = ?summary.stop_reason,
        prompt_tokens,
        completion_tokens,
        "Agent stopped"
    );
    Ok(())
}
