use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::monitoring::types::DownEvent;

/// Delivery seam for down-transition alerts. The scheduler never calls a
/// notifier directly; it emits DownEvents and this trait consumes them.
/// Email or webhook delivery plugs in here.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_down(&self, event: &DownEvent) -> Result<()>;
}

/// Shipped notifier: writes the alert to the log and nothing else.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify_down(&self, event: &DownEvent) -> Result<()> {
        tracing::warn!(
            owner = %event.owner,
            url = %event.url,
            observed_at = %event.observed_at,
            "target went down"
        );
        Ok(())
    }
}

/// Drains down events for the life of the channel. A failing notifier is
/// logged and skipped; it never feeds back into the scheduler.
pub fn spawn_dispatcher(
    mut events: mpsc::Receiver<DownEvent>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = notifier.notify_down(&event).await {
                tracing::warn!(url = %event.url, error = %e, "notifier failed");
            }
        }
    })
}
