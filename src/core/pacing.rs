//! 迭代间等待：固定间隔休眠，或等待人工在 stdin 上确认

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::config::{IterationSection, PacingMode};

/// 等待结束后是否继续下一轮
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceDecision {
    Continue,
    Stop,
}

#[async_trait]
pub trait Pacer: Send + Sync {
    async fn wait(&self) -> PaceDecision;
}

pub struct SleepPacer {
    interval: Duration,
}

impl SleepPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Pacer for SleepPacer {
    async fn wait(&self) -> PaceDecision {
        tokio::time::sleep(self.interval).await;
        PaceDecision::Continue
    }
}

/// 每轮之前读一行输入；`exit` 或输入结束时停止
pub struct ManualPacer<R> {
    reader: Mutex<R>,
}

impl<R: AsyncBufRead + Unpin + Send> ManualPacer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl ManualPacer<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Pacer for ManualPacer<R> {
    async fn wait(&self) -> PaceDecision {
        println!("Press Enter to run the next cycle, or type 'exit' to stop:");
        let mut line = String::new();
        let mut reader = self.reader.lock().await;
        match reader.read_line(&mut line).await {
            Ok(0) => PaceDecision::Stop,
            Ok(_) if line.trim().eq_ignore_ascii_case("exit") => PaceDecision::Stop,
            Ok(_) => PaceDecision::Continue,
            Err(e) => {
                tracing::warn!("Failed to read approval input: {}", e);
                PaceDecision::Stop
            }
        }
    }
}

pub fn pacer_from_config(cfg: &IterationSection) -> Box<dyn Pacer> {
    match cfg.mode {
        PacingMode::Sleep => Box::new(SleepPacer::new(Duration::from_millis(cfg.interval_ms))),
        PacingMode::Manual => Box::new(ManualPacer::stdin()),
    }
}
