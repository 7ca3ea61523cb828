//! Validity policies deciding whether the grants on an approval are sufficient.
//!
//! A policy only ever sees the subject kind and the grant list, so the same
//! inputs always produce the same decision. Policies that need extra data
//! (e.g. a set of privileged approvers) capture it immutably at construction.
use std::collections::BTreeSet;

use crate::approval::Grant;
use crate::subject::SubjectKind;

pub trait ValidityPolicy: Send + Sync {
    fn is_valid(&self, kind: SubjectKind, grants: &[Grant]) -> bool;
}

impl<F> ValidityPolicy for F
where
    F: Fn(SubjectKind, &[Grant]) -> bool + Send + Sync,
{
    fn is_valid(&self, kind: SubjectKind, grants: &[Grant]) -> bool {
        self(kind, grants)
    }
}

/// Valid once `approvers` distinct users have granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    approvers: usize,
}

/// Separate quorum per subject kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerSubjectPolicy {
    client: QuorumPolicy,
    hunt: QuorumPolicy,
}

/// Quorum plus, for the restricted kinds, at least one grant from a privileged user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRestrictedPolicy {
    quorum: QuorumPolicy,
    privileged: BTreeSet<String>,
    kinds: BTreeSet<SubjectKind>,
}

fn distinct_approvers(grants: &[Grant]) -> usize {
    grants
        .iter()
        .map(|g| g.approver.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

impl QuorumPolicy {
    /// A quorum of zero would validate an approval nobody granted, so it is raised to one.
    pub fn new(approvers: usize) -> Self {
        Self {
            approvers: approvers.max(1),
        }
    }
    pub fn approvers(&self) -> usize {
        self.approvers
    }
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ValidityPolicy for QuorumPolicy {
    fn is_valid(&self, _kind: SubjectKind, grants: &[Grant]) -> bool {
        distinct_approvers(grants) >= self.approvers
    }
}

impl PerSubjectPolicy {
    pub fn new(client: usize, hunt: usize) -> Self {
        Self {
            client: QuorumPolicy::new(client),
            hunt: QuorumPolicy::new(hunt),
        }
    }
}

impl ValidityPolicy for PerSubjectPolicy {
    fn is_valid(&self, kind: SubjectKind, grants: &[Grant]) -> bool {
        match kind {
            SubjectKind::Client => self.client.is_valid(kind, grants),
            SubjectKind::Hunt => self.hunt.is_valid(kind, grants),
        }
    }
}

impl RoleRestrictedPolicy {
    /// An empty `kinds` set restricts every subject kind.
    pub fn new<P, K>(approvers: usize, privileged: P, kinds: K) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        K: IntoIterator<Item = SubjectKind>,
    {
        Self {
            quorum: QuorumPolicy::new(approvers),
            privileged: privileged.into_iter().map(Into::into).collect(),
            kinds: kinds.into_iter().collect(),
        }
    }
    fn restricts(&self, kind: SubjectKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

impl ValidityPolicy for RoleRestrictedPolicy {
    fn is_valid(&self, kind: SubjectKind, grants: &[Grant]) -> bool {
        if !self.quorum.is_valid(kind, grants) {
            return false;
        }
        if !self.restricts(kind) {
            return true;
        }
        grants.iter().any(|g| self.privileged.contains(&g.approver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::TimeStamp;

    fn grants(approvers: &[&str]) -> Vec<Grant> {
        approvers
            .iter()
            .map(|a| Grant::new(*a, TimeStamp::new()))
            .collect()
    }

    #[test]
    fn reference_quorum_needs_one_grant() {
        let policy = QuorumPolicy::default();
        assert!(!policy.is_valid(SubjectKind::Client, &[]));
        assert!(policy.is_valid(SubjectKind::Client, &grants(&["foo"])));
        assert!(policy.is_valid(SubjectKind::Hunt, &grants(&["foo"])));
    }

    #[test]
    fn zero_quorum_is_raised_to_one() {
        assert_eq!(QuorumPolicy::new(0).approvers(), 1);
        assert!(!QuorumPolicy::new(0).is_valid(SubjectKind::Hunt, &[]));
    }

    #[test]
    fn quorum_counts_distinct_approvers() {
        let policy = QuorumPolicy::new(2);
        assert!(!policy.is_valid(SubjectKind::Client, &grants(&["foo", "foo"])));
        assert!(policy.is_valid(SubjectKind::Client, &grants(&["foo", "bar"])));
    }

    #[test]
    fn per_subject_branches_on_kind() {
        let policy = PerSubjectPolicy::new(1, 2);
        let one = grants(&["foo"]);
        assert!(policy.is_valid(SubjectKind::Client, &one));
        assert!(!policy.is_valid(SubjectKind::Hunt, &one));
    }

    #[test]
    fn role_restriction_only_applies_to_listed_kinds() {
        let policy = RoleRestrictedPolicy::new(1, ["admin"], [SubjectKind::Hunt]);

        assert!(policy.is_valid(SubjectKind::Client, &grants(&["foo"])));
        assert!(!policy.is_valid(SubjectKind::Hunt, &grants(&["foo"])));
        assert!(policy.is_valid(SubjectKind::Hunt, &grants(&["foo", "admin"])));
    }

    #[test]
    fn closures_are_policies() {
        let never = |_: SubjectKind, _: &[Grant]| false;
        assert!(!never.is_valid(SubjectKind::Client, &grants(&["foo"])));
    }
}
