//! 主控循环：迭代 → 等待 → 迭代，直到人工退出或收到关闭信号
//!
//! 队列耗尽的一轮是空转，循环继续，新任务写入后下一轮即可接手。

use tracing::{debug, error, info};

use crate::core::iteration::{CycleOutcome, Orchestrator};
use crate::core::pacing::{PaceDecision, Pacer};
use crate::core::shutdown::{ShutdownManager, ShutdownReason};

/// 循环结束时的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,
    pub completed_tasks: usize,
    pub failed_cycles: usize,
    /// 队列为空的空转轮数
    pub idle_cycles: usize,
    pub stop_reason: Option<ShutdownReason>,
}

/// 运行主循环；迭代之间的等待可被关闭信号打断，迭代本身不会
pub async fn run_loop(
    orchestrator: &Orchestrator,
    pacer: &dyn Pacer,
    shutdown: &ShutdownManager,
) -> RunSummary {
    let mut summary = RunSummary::default();
    while !shutdown.is_shutdown() {
        summary.cycles += 1;
        match orchestrator.run_cycle().await {
            Ok(CycleOutcome::QueueExhausted) => {
                summary.idle_cycles += 1;
                debug!("Task queue exhausted, idling");
            }
            Ok(CycleOutcome::Completed { task_id }) => {
                summary.completed_tasks += 1;
                info!(task_id = %task_id, "Cycle completed a task");
            }
            Ok(outcome) => info!(?outcome, "Cycle finished"),
            Err(e) => {
                summary.failed_cycles += 1;
                error!(error = %e, "Cycle aborted");
            }
        }

        tokio::select! {
            decision = pacer.wait() => {
                if decision == PaceDecision::Stop {
                    info!("Stop requested");
                    shutdown.shutdown(ShutdownReason::UserExit);
                }
            }
            _ = shutdown.wait_for_shutdown() => {}
        }
    }
    summary.stop_reason = shutdown.reason();
    summary
}
