//! Blocking wait for an approval to become valid.
//!
//! Every successful grant bumps a per-approval watch channel. A waiter
//! subscribes before its first read, so a grant landing between a read and
//! the next wait always wakes it. Wake-ups only trigger a re-read of the
//! stored record, and a slow poll runs alongside in case a signal is lost.
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};

use crate::approval::{Approval, ApprovalId};
use crate::error::ApprovalError;
use crate::service::ApprovalService;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Shortest poll period accepted, so a zero interval cannot spin on the store.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-approval wake-up channels, created on first subscription and
/// dropped with the last subscriber.
#[derive(Debug, Default)]
pub struct GrantSignals {
    senders: DashMap<ApprovalId, watch::Sender<u64>>,
}

/// Held by a waiter for as long as it is interested in an approval.
#[derive(Debug)]
pub struct Subscription {
    id: ApprovalId,
    signals: Arc<GrantSignals>,
    rx: Option<watch::Receiver<u64>>,
}

pub struct WaitCoordinator {
    service: Arc<ApprovalService>,
    poll_interval: Duration,
    default_timeout: Duration,
}

impl GrantSignals {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn subscribe(self: &Arc<Self>, id: &ApprovalId) -> Subscription {
        let rx = self
            .senders
            .entry(id.clone())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe();

        Subscription {
            id: id.clone(),
            signals: Arc::clone(self),
            rx: Some(rx),
        }
    }
    /// Wakes every waiter on `id`. A no-op when nobody is waiting.
    pub fn signal(&self, id: &ApprovalId) {
        if let Some(tx) = self.senders.get(id) {
            tx.send_modify(|generation| *generation += 1);
        }
    }
    /// Number of approvals that currently have at least one waiter.
    pub fn watched(&self) -> usize {
        self.senders.len()
    }
    fn release(&self, id: &ApprovalId) {
        self.senders.remove_if(id, |_, tx| tx.receiver_count() == 0);
    }
}

impl Subscription {
    /// Resolves on the next signal. Returns false once the channel is gone,
    /// after which callers fall back to polling.
    pub async fn changed(&mut self) -> bool {
        match self.rx.as_mut() {
            Some(rx) => rx.changed().await.is_ok(),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.rx.take());
        self.signals.release(&self.id);
    }
}

impl WaitCoordinator {
    pub fn new(service: Arc<ApprovalService>) -> Self {
        Self {
            service,
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
    pub fn service(&self) -> &Arc<ApprovalService> {
        &self.service
    }
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits using the configured default timeout.
    pub async fn wait_until_valid_default(&self, id: &ApprovalId) -> Result<Approval, ApprovalError> {
        self.wait_until_valid(id, self.default_timeout).await
    }

    /// Returns the approval as soon as it is valid, or fails with
    /// [`ApprovalError::Timeout`] once `timeout` has passed.
    ///
    /// A timeout too large to be represented as a deadline waits without one.
    /// Dropping the returned future cancels the wait without touching the
    /// approval or other waiters.
    pub async fn wait_until_valid(
        &self,
        id: &ApprovalId,
        timeout: Duration,
    ) -> Result<Approval, ApprovalError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut subscription = self.service.signals().subscribe(id);
        let mut signal_open = true;

        let expired = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        loop {
            let approval = self.service.get(id)?;
            if approval.is_valid() {
                return Ok(approval);
            }

            tokio::select! {
                open = subscription.changed(), if signal_open => {
                    signal_open = open;
                }
                _ = sleep(self.poll_interval) => {}
                _ = &mut expired => {
                    // one last read so a grant racing the deadline still counts
                    let approval = self.service.get(id)?;
                    if approval.is_valid() {
                        return Ok(approval);
                    }
                    tracing::warn!(approval_id = %id, ?timeout, "approval did not become valid in time");
                    return Err(ApprovalError::Timeout {
                        id: id.clone(),
                        waited: timeout,
                    });
                }
            }
        }
    }
}
