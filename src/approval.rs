//! Approval records, their grants and the request used to create them
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ApprovalError, StoreError};
use crate::subject::Subject;

/// Opaque approval identifier, a bech32m encoded uuid7.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApprovalId(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Pending,
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Grant {
    #[n(0)]
    pub approver: String,
    #[n(1)]
    pub timestamp: TimeStamp<Utc>,
}

/// An approval record. Grants and validity are only changed through
/// [`crate::service::ApprovalService::grant`]:
///
/// ```compile_fail
/// # fn forge(mut approval: access_approval::Approval) {
/// approval.is_valid = true;
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Approval {
    #[n(0)]
    pub id: ApprovalId,
    #[n(1)]
    pub subject: Subject,
    #[n(2)]
    pub requestor: String,
    #[n(3)]
    pub reason: String,
    #[n(4)]
    pub notified_users: Vec<String>, // sorted, unique
    #[n(5)]
    grants: Vec<Grant>, // append only, one entry per approver
    #[n(6)]
    is_valid: bool,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

/// Validated input for a new approval, produced by [`ApprovalRequest::validate_and_finalise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApproval {
    pub subject: Subject,
    pub requestor: String,
    pub reason: String,
    pub notified_users: Vec<String>,
}

// used for constructing create calls
#[derive(Debug, Clone, Default)]
pub struct ApprovalRequest {
    subject: Option<Subject>,
    requestor: Option<String>,
    reason: Option<String>,
    notified_users: Vec<String>,
}

impl ApprovalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl Grant {
    pub fn new(approver: impl Into<String>, timestamp: TimeStamp<Utc>) -> Self {
        Self {
            approver: approver.into(),
            timestamp,
        }
    }
}

impl Approval {
    /// A fresh record is always pending with no grants.
    pub fn new(id: ApprovalId, request: NewApproval, created_at: TimeStamp<Utc>) -> Self {
        Self {
            id,
            subject: request.subject,
            requestor: request.requestor,
            reason: request.reason,
            notified_users: request.notified_users,
            grants: vec![],
            is_valid: false,
            created_at,
        }
    }
    pub fn has_grant_from(&self, approver: &str) -> bool {
        self.grants.iter().any(|g| g.approver == approver)
    }
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }
    /// Appends the grant unless the approver already granted. Returns whether it was added.
    pub(crate) fn insert_grant(&mut self, grant: Grant) -> bool {
        if self.has_grant_from(&grant.approver) {
            return false;
        }
        self.grants.push(grant);
        true
    }
    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.is_valid = valid;
    }
    pub fn approvers(&self) -> impl Iterator<Item = &str> {
        self.grants.iter().map(|g| g.approver.as_str())
    }
    pub fn state(&self) -> ApprovalState {
        if self.is_valid {
            ApprovalState::Valid
        } else {
            ApprovalState::Pending
        }
    }
    pub fn to_cbor(&self) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(self).map_err(|e| StoreError::Encode(e.to_string()))
    }
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(minicbor::decode(bytes)?)
    }
}

impl ApprovalRequest {
    /// Construct a new builder object, this becomes the basis for a create call
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }
    pub fn set_requestor(mut self, requestor: impl Into<String>) -> Self {
        self.requestor = Some(requestor.into());
        self
    }
    pub fn set_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
    pub fn add_notified_user(mut self, user: impl Into<String>) -> Self {
        self.notified_users.push(user.into());
        self
    }
    pub fn set_notified_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notified_users = users.into_iter().map(Into::into).collect();
        self
    }
    // Checks fields and returns the input the engine persists
    pub fn validate_and_finalise(self) -> Result<NewApproval, ApprovalError> {
        let subject = self
            .subject
            .ok_or_else(|| ApprovalError::InvalidSubject("subject is not set".into()))?;

        let requestor = match self.requestor {
            Some(r) if !r.trim().is_empty() => r,
            _ => return Err(ApprovalError::InvalidRequest("requestor is not set".into())),
        };
        let reason = match self.reason {
            Some(r) if !r.trim().is_empty() => r,
            _ => return Err(ApprovalError::InvalidRequest("reason is empty".into())),
        };

        if self.notified_users.is_empty() {
            return Err(ApprovalError::InvalidRequest(
                "at least one user must be notified".into(),
            ));
        }
        if self.notified_users.iter().any(|u| u.trim().is_empty()) {
            return Err(ApprovalError::InvalidRequest(
                "notified users cannot be blank".into(),
            ));
        }
        let mut notified_users = self.notified_users;
        notified_users.sort();
        notified_users.dedup();

        Ok(NewApproval {
            subject,
            requestor,
            reason,
            notified_users,
        })
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for ApprovalId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ApprovalId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(ApprovalId(d.str()?.to_owned()))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
