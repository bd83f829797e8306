//! Background task that sweeps idle sessions out of the cache.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::{ManagerInner, SessionManager, now_ms};

/// Outcome of one scavenger sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScavengeReport {
    /// Index entries looked at.
    pub checked: usize,

    /// Sessions removed because they were idle past their timeout.
    pub expired: usize,

    /// Index entries whose record was already gone.
    pub missing: usize,

    /// Entries that could not be checked or removed (cache errors).
    pub failed: usize,

    /// The sweep did not run because the manager is stopping or stopped.
    pub skipped: bool,
}

impl ScavengeReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Handle to a running scavenger task.
///
/// Runs with a fixed delay: the first sweep starts one period after spawn,
/// and each following sweep one period after the previous one finished.
pub(crate) struct Scavenger {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Scavenger {
    /// Spawn the task on the current tokio runtime.
    ///
    /// The task holds only a weak reference to the manager and exits once the
    /// manager is dropped.
    pub(crate) fn spawn(manager: Weak<ManagerInner>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "session scavenger started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }

                let Some(inner) = manager.upgrade() else {
                    debug!("session manager dropped, scavenger exiting");
                    break;
                };
                let manager = SessionManager::from_inner(inner);

                match manager.scavenge_at(now_ms()).await {
                    Ok(report) if report.expired > 0 || report.failed > 0 => {
                        info!(
                            checked = report.checked,
                            expired = report.expired,
                            missing = report.missing,
                            failed = report.failed,
                            "scavenge sweep finished"
                        );
                    }
                    Ok(report) => {
                        debug!(checked = report.checked, "scavenge sweep found nothing to remove");
                    }
                    Err(e) => warn!(error = %e, "scavenge sweep failed"),
                }
            }

            info!("session scavenger stopped");
        });

        Self { cancel, handle }
    }

    /// Ask the task to stop without waiting for it. A sweep in progress runs
    /// to completion.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait for it to finish.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            warn!(error = %e, "scavenger task panicked");
        }
    }
}
