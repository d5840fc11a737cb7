//! Process-wide shutdown signal shared by the HTTP server and the ingestion worker.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Clone, Debug)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once [`Shutdown::trigger`] has been called on any clone.
    pub async fn wait(self) {
        let mut receiver = self.receiver;
        // `self` keeps a sender alive, so this only returns once triggered.
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }

    /// Trigger on ctrl-c or, on unix, SIGTERM.
    pub fn listen_for_os_signals(&self) -> tokio::task::JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!(target = "newsfeed::shutdown", signal = "ctrl-c", "shutdown requested"),
                _ = terminate => info!(target = "newsfeed::shutdown", signal = "terminate", "shutdown requested"),
            }
            shutdown.trigger();
        })
    }
}
