//! Multi-party approval workflow.
//!
//! A requestor creates an [`approval::Approval`] for a client or hunt and
//! names the users who should grant it. Grants are recorded by
//! [`service::ApprovalService`], which recomputes validity with an injected
//! [`policy::ValidityPolicy`]. [`wait::WaitCoordinator`] lets a caller wait
//! until the approval turns valid.

pub mod approval;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod policy;
pub mod service;
pub mod store;
pub mod subject;
pub mod utils;
pub mod wait;

pub use approval::{Approval, ApprovalId, ApprovalRequest, ApprovalState, Grant};
pub use error::ApprovalError;
pub use service::ApprovalService;
pub use subject::{ClientId, HuntId, Subject, SubjectKind};
pub use wait::WaitCoordinator;
