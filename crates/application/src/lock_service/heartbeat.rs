use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tradeguard_domain::LockLease;

use super::service::DistributedLockService;

/// Background renewal of one lease.
///
/// The first failed or rejected renewal marks the lease lost and ends the
/// task. Dropping the heartbeat aborts the task without releasing the lock.
#[derive(Debug)]
pub struct LeaseHeartbeat {
    lost: Arc<AtomicBool>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LeaseHeartbeat {
    pub(super) fn spawn(locks: DistributedLockService, lease: LockLease) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let (stop, mut stopped) = oneshot::channel();
        let interval = lease.heartbeat_interval();

        let task_lost = Arc::clone(&lost);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => match locks.renew(&lease).await {
                        Ok(true) => tracing::trace!(key = lease.key(), "lease renewed"),
                        Ok(false) => {
                            tracing::warn!(key = lease.key(), "lease lost, held by another token");
                            task_lost.store(true, Ordering::SeqCst);
                            break;
                        }
                        Err(error) => {
                            tracing::warn!(
                                key = lease.key(),
                                error = %error,
                                "lease renewal failed, exclusivity no longer guaranteed"
                            );
                            task_lost.store(true, Ordering::SeqCst);
                            break;
                        }
                    },
                }
            }
        });

        Self {
            lost,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Returns true once a renewal has failed.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Shared flag that flips to true when the lease is lost.
    #[must_use]
    pub fn lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    /// Stops renewing and returns whether the lease was held throughout.
    pub async fn stop(mut self) -> bool {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            tracing::warn!(error = %error, "lease heartbeat task ended abnormally");
        }

        !self.is_lost()
    }
}

impl Drop for LeaseHeartbeat {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
