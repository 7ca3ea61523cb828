//! Storage for approval records.
//!
//! A store only knows how to read and atomically replace a single record by
//! id. All approval semantics live in [`crate::service::ApprovalService`].
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::approval::{Approval, ApprovalId};
use crate::error::StoreError;

pub trait ApprovalStore: Send + Sync {
    fn load(&self, id: &ApprovalId) -> Result<Option<Approval>, StoreError>;
    /// Inserts a record under a new id. Returns false if the id is already taken.
    fn insert(&self, approval: &Approval) -> Result<bool, StoreError>;
    /// Replaces `expected` with `new` only if the stored record still equals `expected`.
    fn compare_and_swap(&self, expected: &Approval, new: &Approval) -> Result<bool, StoreError>;
    fn list(&self) -> Result<Vec<Approval>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<ApprovalId, Approval>,
}

pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for InMemoryStore {
    fn load(&self, id: &ApprovalId) -> Result<Option<Approval>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn insert(&self, approval: &Approval) -> Result<bool, StoreError> {
        match self.records.entry(approval.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(approval.clone());
                Ok(true)
            }
        }
    }

    fn compare_and_swap(&self, expected: &Approval, new: &Approval) -> Result<bool, StoreError> {
        // the shard write lock is held for the whole comparison and swap
        match self.records.get_mut(&expected.id) {
            Some(mut current) if *current == *expected => {
                *current = new.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<Approval>, StoreError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }
}

impl ApprovalStore for SledStore {
    fn load(&self, id: &ApprovalId) -> Result<Option<Approval>, StoreError> {
        match self.instance.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Approval::from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, approval: &Approval) -> Result<bool, StoreError> {
        let cbor = approval.to_cbor()?;
        let swapped = self.instance.compare_and_swap(
            approval.id.as_str().as_bytes(),
            None::<&[u8]>,
            Some(cbor),
        )?;
        self.instance.flush()?;
        Ok(swapped.is_ok())
    }

    fn compare_and_swap(&self, expected: &Approval, new: &Approval) -> Result<bool, StoreError> {
        // records encode deterministically, so byte equality is record equality
        let old = expected.to_cbor()?;
        let cbor = new.to_cbor()?;
        let swapped =
            self.instance
                .compare_and_swap(expected.id.as_str().as_bytes(), Some(old), Some(cbor))?;
        if swapped.is_ok() {
            self.instance.flush()?;
        }
        Ok(swapped.is_ok())
    }

    fn list(&self) -> Result<Vec<Approval>, StoreError> {
        self.instance
            .iter()
            .values()
            .map(|bytes| Approval::from_cbor(&bytes?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalRequest, Grant, TimeStamp};
    use crate::subject::Subject;
    use tempfile::tempdir;

    fn approval(id: &str) -> Approval {
        let request = ApprovalRequest::new()
            .set_subject(Subject::hunt("0000BEEF").unwrap())
            .set_requestor("alice")
            .set_reason("blah")
            .add_notified_user("foo")
            .validate_and_finalise()
            .unwrap();
        Approval::new(ApprovalId::new(id), request, TimeStamp::new())
    }

    fn exercise_cas(store: &dyn ApprovalStore) {
        let original = approval("approval1a");
        assert!(store.insert(&original).unwrap());
        assert!(!store.insert(&original).unwrap());

        let mut granted = original.clone();
        granted.insert_grant(Grant::new("foo", TimeStamp::new()));
        assert!(store.compare_and_swap(&original, &granted).unwrap());

        // a second writer still holding the original loses
        let mut stale = original.clone();
        stale.insert_grant(Grant::new("bar", TimeStamp::new()));
        assert!(!store.compare_and_swap(&original, &stale).unwrap());

        assert_eq!(store.load(&original.id).unwrap(), Some(granted));
        assert!(store.load(&ApprovalId::new("approval1missing")).unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn in_memory_compare_and_swap() {
        exercise_cas(&InMemoryStore::new());
    }

    #[test]
    fn sled_compare_and_swap() {
        let temp_dir = tempdir().unwrap();
        let store = SledStore::open(temp_dir.path().join("store_cas.db")).unwrap();
        exercise_cas(&store);
    }

    #[test]
    fn compare_and_swap_on_missing_record_fails() {
        let store = InMemoryStore::new();
        let ghost = approval("approval1ghost");
        assert!(!store.compare_and_swap(&ghost, &ghost).unwrap());
    }
}
