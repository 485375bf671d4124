use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::LabApi;
use crate::state::Connectivity;

pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the connectivity poller.
///
/// Checks once immediately, then every `period`. There is no backoff; the task
/// ends only when the receiving side of `tx` goes away.
pub fn spawn<E>(api: Arc<dyn LabApi>, period: Duration, tx: mpsc::UnboundedSender<E>) -> JoinHandle<()>
where
    E: From<Connectivity> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // A check that outlives the period must not be followed by a burst of catch-up checks
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Connectivity> = None;
        loop {
            interval.tick().await;
            let status = api.check_health().await;
            if last != Some(status) {
                tracing::info!(server = api.server(), status = status.label(), "backend connectivity changed");
                last = Some(status);
            }
            if tx.send(E::from(status)).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;

    #[tokio::test(start_paused = true)]
    async fn reports_immediately_then_on_every_period() {
        let api = Arc::new(FakeApi {
            healthy: true,
            ..FakeApi::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<Connectivity>();
        let handle = spawn(api.clone(), HEALTH_POLL_INTERVAL, tx);

        assert_eq!(rx.recv().await, Some(Connectivity::Connected));
        assert_eq!(api.call_count(), 1);

        tokio::time::advance(HEALTH_POLL_INTERVAL).await;
        assert_eq!(rx.recv().await, Some(Connectivity::Connected));
        assert_eq!(api.call_count(), 2);

        drop(rx);
        tokio::time::advance(HEALTH_POLL_INTERVAL).await;
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backend_reads_disconnected() {
        let api = Arc::new(FakeApi::offline());
        let (tx, mut rx) = mpsc::unbounded_channel::<Connectivity>();
        let _handle = spawn(api, HEALTH_POLL_INTERVAL, tx);
        assert_eq!(rx.recv().await, Some(Connectivity::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_check_does_not_trigger_catch_up_burst() {
        let api = Arc::new(FakeApi {
            healthy: true,
            first_health_delay: Some(Duration::from_secs(30)),
            ..FakeApi::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<Connectivity>();
        let start = tokio::time::Instant::now();
        let _handle = spawn(api.clone(), HEALTH_POLL_INTERVAL, tx);

        let mut reported_at = Vec::new();
        for _ in 0..4 {
            assert_eq!(rx.recv().await, Some(Connectivity::Connected));
            reported_at.push(start.elapsed().as_secs());
        }

        // One overdue check right after the slow one, then back to the fixed period
        assert_eq!(reported_at, vec![30, 30, 35, 40]);
        assert_eq!(api.call_count(), 4);
    }
}
