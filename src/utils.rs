//! Utility functions for identifier generation

use bech32::Bech32m;
use uuid7::uuid7;

use crate::approval::ApprovalId;

pub const APPROVAL_HRP: &str = "approval";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

pub fn new_approval_id() -> anyhow::Result<ApprovalId> {
    Ok(ApprovalId::new(new_uuid_to_bech32(APPROVAL_HRP)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_ids_carry_prefix_and_are_unique() {
        let a = new_approval_id().unwrap();
        let b = new_approval_id().unwrap();

        assert!(a.as_str().starts_with("approval1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}
