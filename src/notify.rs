//! Best-effort notifications about approval activity.
use std::sync::Mutex;

use crate::approval::ApprovalId;
use crate::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Sent to the notified users when an approval is created.
    Requested,
    /// Sent to the requestor for every new grant.
    Granted,
    /// Sent to the requestor when the approval turns valid.
    BecameValid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub approval_id: ApprovalId,
    pub kind: NotificationKind,
    pub users: Vec<String>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl Notification {
    pub fn new(approval_id: ApprovalId, kind: NotificationKind, users: Vec<String>) -> Self {
        Self {
            approval_id,
            kind,
            users,
        }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            approval_id = %notification.approval_id,
            kind = ?notification.kind,
            users = ?notification.users,
            "approval notification"
        );
        Ok(())
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut sent = self.sent.lock().map_err(|_| NotifyError::Delivery {
            id: notification.approval_id.clone(),
            reason: "recording lock poisoned".into(),
        })?;
        sent.push(notification.clone());
        Ok(())
    }
}
