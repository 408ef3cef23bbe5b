//! Manager Configuration

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use stcelo_common::{
    errors::{StCeloError, StCeloResult},
    types::Address,
    ZERO_ADDRESS,
};

/// Deployment parameters of a Manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ManagerConfig {
    /// Governance address allowed to run privileged operations
    pub owner: Address,
    /// On-chain account that locks and votes the protocol's CELO
    pub account: Address,
    /// Lower cap on the number of groups the account may use. The chain's
    /// own limit always applies as well.
    pub max_groups_voted_for: Option<u32>,
}

impl ManagerConfig {
    pub fn new(owner: Address, account: Address) -> Self {
        Self { owner, account, max_groups_voted_for: None }
    }

    pub fn with_max_groups_voted_for(mut self, max: u32) -> Self {
        self.max_groups_voted_for = Some(max);
        self
    }

    /// # Errors
    /// - `ZeroAddress` if the owner or the account is the zero address
    /// - `InvalidInput` if the group cap is zero
    pub fn validate(&self) -> StCeloResult<()> {
        if self.owner == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "owner" });
        }
        if self.account == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "account" });
        }
        if self.max_groups_voted_for == Some(0) {
            return Err(StCeloError::InvalidInput {
                param: "max_groups_voted_for",
                reason: "must be at least one",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let owner = [1u8; 20];
        let account = [2u8; 20];

        assert!(ManagerConfig::new(owner, account).validate().is_ok());
        assert_eq!(
            ManagerConfig::new(ZERO_ADDRESS, account).validate(),
            Err(StCeloError::ZeroAddress { param: "owner" })
        );
        assert_eq!(
            ManagerConfig::new(owner, ZERO_ADDRESS).validate(),
            Err(StCeloError::ZeroAddress { param: "account" })
        );
        assert!(ManagerConfig::new(owner, account).with_max_groups_voted_for(0).validate().is_err());
        assert!(ManagerConfig::new(owner, account).with_max_groups_voted_for(4).validate().is_ok());
    }
}
