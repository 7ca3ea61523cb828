//! Deployment configuration: which validity policy to run and how the
//! engine and wait coordinator behave.
//!
//! ```yaml
//! policy:
//!   kind: role_restricted
//!   approvers: 2
//!   privileged: [admin]
//!   kinds: [hunt]
//! max_grant_attempts: 16
//! wait_poll_interval_ms: 250
//! default_wait_timeout_secs: 60
//! storage:
//!   path: /var/lib/approvals
//! ```
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policy::{PerSubjectPolicy, QuorumPolicy, RoleRestrictedPolicy, ValidityPolicy};
use crate::service::{ApprovalService, DEFAULT_MAX_GRANT_ATTEMPTS};
use crate::store::{ApprovalStore, InMemoryStore, SledStore};
use crate::subject::SubjectKind;
use crate::wait::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, WaitCoordinator};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub policy: PolicyConfig,
    pub max_grant_attempts: u32,
    pub wait_poll_interval_ms: u64,
    pub default_wait_timeout_secs: u64,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    Quorum {
        #[serde(default = "one")]
        approvers: usize,
    },
    PerSubject {
        client: usize,
        hunt: usize,
    },
    RoleRestricted {
        #[serde(default = "one")]
        approvers: usize,
        privileged: Vec<String>,
        #[serde(default)]
        kinds: Vec<SubjectKind>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of the sled database. Records are kept in memory when unset.
    pub path: Option<PathBuf>,
}

fn one() -> usize {
    1
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            max_grant_attempts: DEFAULT_MAX_GRANT_ATTEMPTS,
            wait_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            default_wait_timeout_secs: DEFAULT_WAIT_TIMEOUT.as_secs(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::Quorum { approvers: 1 }
    }
}

impl ApprovalConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let quorum_ok = match &self.policy {
            PolicyConfig::Quorum { approvers } => *approvers >= 1,
            PolicyConfig::PerSubject { client, hunt } => *client >= 1 && *hunt >= 1,
            PolicyConfig::RoleRestricted {
                approvers,
                privileged,
                ..
            } => {
                if privileged.is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "policy.privileged",
                        reason: "at least one privileged approver is required".into(),
                    });
                }
                *approvers >= 1
            }
        };
        if !quorum_ok {
            return Err(ConfigError::Invalid {
                field: "policy",
                reason: "quorum must be at least 1".into(),
            });
        }
        if self.max_grant_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_grant_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.wait_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "wait_poll_interval_ms",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn build_policy(&self) -> Arc<dyn ValidityPolicy> {
        match &self.policy {
            PolicyConfig::Quorum { approvers } => Arc::new(QuorumPolicy::new(*approvers)),
            PolicyConfig::PerSubject { client, hunt } => {
                Arc::new(PerSubjectPolicy::new(*client, *hunt))
            }
            PolicyConfig::RoleRestricted {
                approvers,
                privileged,
                kinds,
            } => Arc::new(RoleRestrictedPolicy::new(
                *approvers,
                privileged.iter().cloned(),
                kinds.iter().copied(),
            )),
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn ApprovalStore>, ConfigError> {
        match &self.storage.path {
            Some(path) => Ok(Arc::new(SledStore::open(path)?)),
            None => Ok(Arc::new(InMemoryStore::new())),
        }
    }

    pub fn build_service(&self) -> Result<ApprovalService, ConfigError> {
        self.validate()?;
        Ok(ApprovalService::new(self.open_store()?, self.build_policy())
            .set_max_grant_attempts(self.max_grant_attempts))
    }

    pub fn build_waiter(&self, service: Arc<ApprovalService>) -> WaitCoordinator {
        WaitCoordinator::new(service)
            .set_poll_interval(Duration::from_millis(self.wait_poll_interval_ms))
            .set_default_timeout(Duration::from_secs(self.default_wait_timeout_secs))
    }
}
