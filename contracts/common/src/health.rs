//! Group Health
//!
//! The allocator only ever asks one question about a validator group's
//! health: is it currently valid to hold stake? The answer comes from an
//! external oracle. [`GroupHealthRegistry`] is the in-memory oracle used by
//! the Manager and tests; updates are gated to once per group per epoch.

use crate::errors::{StCeloError, StCeloResult};
use crate::types::Address;
use crate::BTreeMap;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Validity oracle for validator groups
pub trait GroupHealth {
    fn is_valid_group(&self, group: &Address) -> bool;
}

/// Last recorded health of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GroupHealthRecord {
    pub valid: bool,
    pub updated_epoch: u64,
}

/// Per-group validity with once-per-epoch updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GroupHealthRegistry {
    records: BTreeMap<Address, GroupHealthRecord>,
}

impl GroupHealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the validity of `group` as observed in `epoch`.
    ///
    /// Fails `HealthAlreadyUpdated` if the group was already updated in this epoch.
    pub fn update_group_health(&mut self, group: Address, valid: bool, epoch: u64) -> StCeloResult<()> {
        if group == crate::ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "group" });
        }
        if let Some(record) = self.records.get(&group) {
            if record.updated_epoch >= epoch {
                return Err(StCeloError::HealthAlreadyUpdated { group, epoch });
            }
        }
        self.records.insert(group, GroupHealthRecord { valid, updated_epoch: epoch });
        Ok(())
    }

    pub fn record(&self, group: &Address) -> Option<GroupHealthRecord> {
        self.records.get(group).copied()
    }
}

impl GroupHealth for GroupHealthRegistry {
    fn is_valid_group(&self, group: &Address) -> bool {
        self.records.get(group).map(|r| r.valid).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_group_is_invalid() {
        let registry = GroupHealthRegistry::new();
        assert!(!registry.is_valid_group(&[1u8; 20]));
    }

    #[test]
    fn test_update_once_per_epoch() {
        let mut registry = GroupHealthRegistry::new();
        let group = [1u8; 20];

        registry.update_group_health(group, true, 5).unwrap();
        assert!(registry.is_valid_group(&group));

        let err = registry.update_group_health(group, false, 5).unwrap_err();
        assert_eq!(err, StCeloError::HealthAlreadyUpdated { group, epoch: 5 });
        assert!(registry.is_valid_group(&group));

        registry.update_group_health(group, false, 6).unwrap();
        assert!(!registry.is_valid_group(&group));
        assert_eq!(registry.record(&group).unwrap().updated_epoch, 6);
    }

    #[test]
    fn test_other_groups_independent() {
        let mut registry = GroupHealthRegistry::new();
        registry.update_group_health([1u8; 20], true, 3).unwrap();
        registry.update_group_health([2u8; 20], true, 3).unwrap();
        assert!(registry.is_valid_group(&[2u8; 20]));
    }
}
