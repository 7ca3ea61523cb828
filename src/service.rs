//! Service layer API for approval workflow operations
use std::sync::Arc;

use crate::approval::{Approval, ApprovalId, ApprovalRequest, Grant};
use crate::clock::{Clock, SystemClock};
use crate::error::ApprovalError;
use crate::notify::{LogNotifier, Notification, NotificationKind, Notifier};
use crate::policy::ValidityPolicy;
use crate::store::ApprovalStore;
use crate::subject::Subject;
use crate::utils;
use crate::wait::GrantSignals;

pub const DEFAULT_MAX_GRANT_ATTEMPTS: u32 = 16;
const MAX_ID_ATTEMPTS: u32 = 3;

pub struct ApprovalService {
    store: Arc<dyn ApprovalStore>,
    policy: Arc<dyn ValidityPolicy>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    signals: Arc<GrantSignals>,
    max_grant_attempts: u32,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn ApprovalStore>, policy: Arc<dyn ValidityPolicy>) -> Self {
        Self {
            store,
            policy,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            signals: Arc::new(GrantSignals::new()),
            max_grant_attempts: DEFAULT_MAX_GRANT_ATTEMPTS,
        }
    }
    pub fn set_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
    pub fn set_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
    pub fn set_max_grant_attempts(mut self, attempts: u32) -> Self {
        self.max_grant_attempts = attempts.max(1);
        self
    }
    pub fn signals(&self) -> &Arc<GrantSignals> {
        &self.signals
    }

    /// Load approval from the store
    fn load_approval(&self, id: &ApprovalId) -> Result<Approval, ApprovalError> {
        self.store
            .load(id)?
            .ok_or_else(|| ApprovalError::NotFound(id.clone()))
    }

    /// Create a new pending approval and ask the notified users for their grant
    pub fn create(&self, request: ApprovalRequest) -> Result<Approval, ApprovalError> {
        let request = request.validate_and_finalise()?;
        let created_at = self.clock.now();

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = utils::new_approval_id()
                .map_err(|e| ApprovalError::IdGeneration(e.to_string()))?;
            let approval = Approval::new(id, request.clone(), created_at.clone());

            if self.store.insert(&approval)? {
                tracing::info!(
                    approval_id = %approval.id,
                    subject = %approval.subject,
                    requestor = %approval.requestor,
                    "approval requested"
                );
                self.notify(Notification::new(
                    approval.id.clone(),
                    NotificationKind::Requested,
                    approval.notified_users.clone(),
                ));
                return Ok(approval);
            }
            tracing::debug!(approval_id = %approval.id, "approval id already taken, drawing another");
        }

        Err(ApprovalError::IdGeneration(format!(
            "no free id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    /// Record a grant from `approver` and recompute validity
    pub fn grant(&self, id: &ApprovalId, approver: &str) -> Result<Approval, ApprovalError> {
        if approver.trim().is_empty() {
            return Err(ApprovalError::InvalidRequest("approver is not set".into()));
        }

        for attempt in 1..=self.max_grant_attempts {
            let current = self.load_approval(id)?;

            if current.requestor == approver {
                tracing::warn!(approval_id = %id, approver, "rejected self approval");
                return Err(ApprovalError::SelfApproval {
                    approver: approver.to_owned(),
                });
            }
            if current.has_grant_from(approver) {
                tracing::debug!(approval_id = %id, approver, "approver already granted");
                return Ok(current);
            }

            let mut updated = current.clone();
            updated.insert_grant(Grant::new(approver, self.clock.now()));
            // valid is terminal, even under a policy that is not monotonic
            let valid = current.is_valid()
                || self.policy.is_valid(updated.subject.kind(), updated.grants());
            updated.set_valid(valid);

            if !self.store.compare_and_swap(&current, &updated)? {
                tracing::debug!(approval_id = %id, approver, attempt, "grant lost a concurrent update, retrying");
                std::thread::yield_now();
                continue;
            }

            self.signals.signal(id);
            self.notify(Notification::new(
                id.clone(),
                NotificationKind::Granted,
                vec![updated.requestor.clone()],
            ));
            if updated.is_valid() && !current.is_valid() {
                tracing::info!(approval_id = %id, approver, grants = updated.grants().len(), "approval is now valid");
                self.notify(Notification::new(
                    id.clone(),
                    NotificationKind::BecameValid,
                    vec![updated.requestor.clone()],
                ));
            }
            return Ok(updated);
        }

        Err(ApprovalError::Conflict {
            id: id.clone(),
            attempts: self.max_grant_attempts,
        })
    }

    pub fn get(&self, id: &ApprovalId) -> Result<Approval, ApprovalError> {
        self.load_approval(id)
    }

    /// Approvals created by `requestor`, newest first, optionally for one subject only
    pub fn list(
        &self,
        requestor: &str,
        subject: Option<&Subject>,
    ) -> Result<Vec<Approval>, ApprovalError> {
        let mut approvals: Vec<Approval> = self
            .store
            .list()?
            .into_iter()
            .filter(|a| a.requestor == requestor)
            .filter(|a| subject.is_none_or(|s| a.subject == *s))
            .collect();
        approvals.sort_by(|a, b| {
            b.created_at
                .to_datetime_utc()
                .cmp(&a.created_at.to_datetime_utc())
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(approvals)
    }

    fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification) {
            tracing::warn!(
                approval_id = %notification.approval_id,
                kind = ?notification.kind,
                error = %e,
                "failed to deliver approval notification"
            );
        }
    }
}
