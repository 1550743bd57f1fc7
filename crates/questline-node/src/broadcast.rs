use questline_registry::UserDirectory;
use questline_verify::{MessageSender, OutboundMessage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Best-effort fan-out to every non-banned user. A worker pool bounded
/// by a semaphore keeps at most `concurrency` sends in flight, and one
/// recipient failing never aborts the run; failures are counted and
/// logged, with no retry.
pub struct Broadcaster {
    sender: Arc<dyn MessageSender>,
    users: Arc<UserDirectory>,
    concurrency: usize,
}

impl Broadcaster {
    pub fn new(sender: Arc<dyn MessageSender>, users: Arc<UserDirectory>, concurrency: usize) -> Self {
        Self {
            sender,
            users,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn broadcast(&self, message: OutboundMessage) -> BroadcastReport {
        let recipients = self.users.all_active().await;
        let attempted = recipients.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let delivered = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(attempted);
        for chat in recipients {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                // Semaphore closed mid-run; count the rest as failed.
                failed.fetch_add(1, Ordering::SeqCst);
                continue;
            };
            let sender = self.sender.clone();
            let message = message.clone();
            let delivered = delivered.clone();
            let failed = failed.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match sender.send(chat, &message).await {
                    Ok(()) => {
                        delivered.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        warn!(chat = %chat, error = %e, "Broadcast send failed");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let report = BroadcastReport {
            attempted,
            delivered: delivered.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        };
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "📣 Broadcast finished"
        );
        report
    }
}
