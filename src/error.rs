use std::time::Duration;

use crate::approval::ApprovalId;

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("Invalid approval request: {0}")]
    InvalidRequest(String),
    #[error("Invalid approval subject: {0}")]
    InvalidSubject(String),
    #[error("Approval {0} was not found")]
    NotFound(ApprovalId),
    #[error("User {approver} cannot approve their own request")]
    SelfApproval { approver: String },
    #[error("Approval {id} did not become valid within {waited:?}")]
    Timeout { id: ApprovalId, waited: Duration },
    #[error("Approval {id} kept changing underneath the grant after {attempts} attempts")]
    Conflict { id: ApprovalId, attempts: u32 },
    #[error("Failed to allocate an approval id: {0}")]
    IdGeneration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Storage backend failed: {0}")]
    Backend(#[from] sled::Error),
    #[error("Failed to encode approval record: {0}")]
    Encode(String),
    #[error("Failed to decode approval record: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("Notification for approval {id} could not be delivered: {reason}")]
    Delivery { id: ApprovalId, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
