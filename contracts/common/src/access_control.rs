//! Access Control
//!
//! A single owner (the governance multisig/timelock in production) gates
//! group activation, deprecation and the specific-strategy allow-list.

use crate::errors::{StCeloError, StCeloResult};
use crate::types::Address;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Single-owner authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    pub fn new(owner: Address) -> StCeloResult<Self> {
        if owner == crate::ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "owner" });
        }
        Ok(Self { owner })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Fail `Unauthorized` unless `caller` is the owner
    pub fn ensure_owner(&self, caller: &Address) -> StCeloResult<()> {
        if *caller != self.owner {
            return Err(StCeloError::Unauthorized { expected: self.owner, actual: *caller });
        }
        Ok(())
    }

    /// Hand ownership to `new_owner`, returning the previous owner
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> StCeloResult<Address> {
        self.ensure_owner(caller)?;
        if new_owner == crate::ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "new_owner" });
        }
        let previous = self.owner;
        self.owner = new_owner;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_gate() {
        let owner = [1u8; 20];
        let stranger = [2u8; 20];
        let ownable = Ownable::new(owner).unwrap();

        assert!(ownable.ensure_owner(&owner).is_ok());
        assert_eq!(
            ownable.ensure_owner(&stranger),
            Err(StCeloError::Unauthorized { expected: owner, actual: stranger })
        );
    }

    #[test]
    fn test_transfer_ownership() {
        let owner = [1u8; 20];
        let next = [2u8; 20];
        let mut ownable = Ownable::new(owner).unwrap();

        assert!(ownable.transfer_ownership(&next, next).is_err());
        assert!(ownable.transfer_ownership(&owner, [0u8; 20]).is_err());
        assert_eq!(ownable.transfer_ownership(&owner, next).unwrap(), owner);
        assert_eq!(ownable.owner(), next);
        assert!(ownable.ensure_owner(&owner).is_err());
    }

    #[test]
    fn test_zero_owner_rejected() {
        assert!(Ownable::new([0u8; 20]).is_err());
    }
}
