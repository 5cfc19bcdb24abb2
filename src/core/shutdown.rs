//! 关闭信号
//!
//! Ctrl+C / SIGTERM 或人工 exit 取消 token；runner 只在迭代间等待时监听，已开始的迭代不会被打断。
//! 第一个到达的原因会被记下，供主循环结束时汇报。

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// 主循环停止的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 手动模式下输入 exit 或输入结束
    UserExit,
}

#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求关闭；重复调用时保留最早的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装 Ctrl+C 与 SIGTERM 处理器
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, stopping after the current cycle");
                manager.shutdown(ShutdownReason::Interrupt);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping after the current cycle");
                    manager.shutdown(ShutdownReason::Terminate);
                }
            });
        }
    }
}
