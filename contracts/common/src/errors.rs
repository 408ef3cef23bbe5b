//! Error Types for the stCELO Protocol
//!
//! Every failure is synchronous and reverting: an operation that returns an
//! error has not changed any state. Each condition is a distinct variant so
//! callers can tell "try a different group" apart from "try later".

use crate::types::Address;

/// Result type alias for stCELO operations
pub type StCeloResult<T> = Result<T, StCeloError>;

/// Main error enum for all stCELO protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StCeloError {
    // ============ Input Validation Errors ============
    /// Zero amount not allowed
    ZeroAmount,

    /// Zero address passed where a real address is required
    ZeroAddress { param: &'static str },

    /// Parallel group / amount arrays differ in length
    GroupsAndVotesArrayLengthsMismatch { groups: usize, votes: usize },

    /// Lesser / greater hints do not describe the sorted position of the key
    InvalidSortHints { key: Address },

    /// Local and underlying pending withdrawal entries do not match
    InconsistentPendingWithdrawal { index: usize, underlying_index: usize },

    /// Invalid input parameter
    InvalidInput { param: &'static str, reason: &'static str },

    // ============ Eligibility Errors ============
    /// Group is not registered, elected, healthy or otherwise votable
    GroupNotEligible { group: Address },

    /// Group is already in the active set
    GroupAlreadyAdded { group: Address },

    /// Group is not in the active set
    GroupNotActive { group: Address },

    /// Activating another group would exceed the chain's voted-group cap
    MaxGroupsVotedForReached { max: usize },

    /// Group is not on the specific-strategy allow-list
    StrategyNotAllowed { group: Address },

    /// Group is already on the specific-strategy allow-list
    StrategyAlreadyAllowed { group: Address },

    /// Group is healthy, so it cannot be deprecated permissionlessly
    HealthyGroup { group: Address },

    /// No active group can receive any votes
    NoVotableGroups,

    /// Group state does not call for a rebalance
    NothingToRebalance { group: Address },

    // ============ Capacity / Conservation Errors ============
    /// Active groups cannot absorb the full amount
    NotAbleToDistributeVotes { undistributed: u128 },

    /// Sum of scheduled votes differs from the attached value
    TotalVotesMismatch { expected: u128, actual: u128 },

    /// Transfer source and destination totals differ
    TransferAmountMisalignment { from_total: u128, to_total: u128 },

    /// Withdrawal request exceeds the CELO attributed to the group
    WithdrawalAmountTooHigh { group: Address, requested: u128, available: u128 },

    /// Transfer request exceeds the CELO attributed to the group
    TransferAmountTooHigh { group: Address, requested: u128, available: u128 },

    /// Group holds less real CELO than its share of a withdrawal
    GroupNotBalancedOrNotEnoughStCelo { group: Address, requested: u128, available: u128 },

    /// Strategy does not hold enough stake to source the withdrawal
    CantWithdrawAccordingToStrategy { requested: u128, available: u128 },

    /// Insufficient stCELO balance for operation
    InsufficientBalance { available: u128, requested: u128 },

    /// Nothing is scheduled for this beneficiary in this group
    NoScheduledWithdrawal { group: Address, beneficiary: Address },

    /// Source group of a rebalance holds no more than it should
    RebalanceNoExtraCelo { group: Address, expected: u128, real: u128 },

    /// Destination group of a rebalance already holds what it should
    RebalanceEnoughCelo { group: Address, expected: u128, real: u128 },

    // ============ Authorization Errors ============
    /// Caller is not authorized for this operation
    Unauthorized { expected: Address, actual: Address },

    // ============ Timing Errors ============
    /// Pending withdrawal index does not exist
    PendingWithdrawalIndexTooHigh { index: usize, len: usize },

    /// Pending withdrawal is still inside the unlocking period
    PendingWithdrawalNotReady { unlock_timestamp: u64, now: u64 },

    /// Group health was already updated in this epoch
    HealthAlreadyUpdated { group: Address, epoch: u64 },

    // ============ Chain Errors ============
    /// The underlying chain rejected the call
    Chain { reason: &'static str },

    // ============ Internal Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    /// State could not be encoded
    Serialization,
}

/// Broad classification of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, rejected before any state change
    InputValidation,
    /// Target group cannot be used; try a different group
    Eligibility,
    /// Not enough capacity or stake; conservation would be violated
    Capacity,
    /// Caller lacks the required role
    Authorization,
    /// Outside the allowed time window; try later
    Timing,
    /// Underlying chain refused the operation
    Chain,
    /// Arithmetic or encoding failure
    Internal,
}

impl StCeloError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "E001_ZERO_AMOUNT",
            Self::ZeroAddress { .. } => "E002_ZERO_ADDRESS",
            Self::GroupsAndVotesArrayLengthsMismatch { .. } => "E003_LENGTH_MISMATCH",
            Self::InvalidSortHints { .. } => "E004_INVALID_HINTS",
            Self::InconsistentPendingWithdrawal { .. } => "E005_INCONSISTENT_WITHDRAWAL",
            Self::InvalidInput { .. } => "E006_INVALID_INPUT",
            Self::GroupNotEligible { .. } => "E010_GROUP_NOT_ELIGIBLE",
            Self::GroupAlreadyAdded { .. } => "E011_GROUP_ALREADY_ADDED",
            Self::GroupNotActive { .. } => "E012_GROUP_NOT_ACTIVE",
            Self::MaxGroupsVotedForReached { .. } => "E013_MAX_GROUPS",
            Self::StrategyNotAllowed { .. } => "E014_STRATEGY_NOT_ALLOWED",
            Self::StrategyAlreadyAllowed { .. } => "E015_STRATEGY_ALLOWED",
            Self::HealthyGroup { .. } => "E016_HEALTHY_GROUP",
            Self::NoVotableGroups => "E017_NO_VOTABLE_GROUPS",
            Self::NothingToRebalance { .. } => "E018_NOTHING_TO_REBALANCE",
            Self::NotAbleToDistributeVotes { .. } => "E020_CANNOT_DISTRIBUTE",
            Self::TotalVotesMismatch { .. } => "E021_TOTAL_VOTES_MISMATCH",
            Self::TransferAmountMisalignment { .. } => "E022_TRANSFER_MISALIGNED",
            Self::WithdrawalAmountTooHigh { .. } => "E023_WITHDRAWAL_TOO_HIGH",
            Self::TransferAmountTooHigh { .. } => "E024_TRANSFER_TOO_HIGH",
            Self::GroupNotBalancedOrNotEnoughStCelo { .. } => "E025_GROUP_NOT_BALANCED",
            Self::CantWithdrawAccordingToStrategy { .. } => "E026_STRATEGY_SHORTFALL",
            Self::InsufficientBalance { .. } => "E027_INSUFFICIENT_BALANCE",
            Self::NoScheduledWithdrawal { .. } => "E028_NO_SCHEDULED_WITHDRAWAL",
            Self::RebalanceNoExtraCelo { .. } => "E029_NO_EXTRA_CELO",
            Self::RebalanceEnoughCelo { .. } => "E030_ENOUGH_CELO",
            Self::Unauthorized { .. } => "E040_UNAUTHORIZED",
            Self::PendingWithdrawalIndexTooHigh { .. } => "E050_WITHDRAWAL_INDEX",
            Self::PendingWithdrawalNotReady { .. } => "E051_WITHDRAWAL_NOT_READY",
            Self::HealthAlreadyUpdated { .. } => "E052_HEALTH_UPDATED",
            Self::Chain { .. } => "E060_CHAIN",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::Serialization => "E083_SERIALIZATION",
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ZeroAmount
            | Self::ZeroAddress { .. }
            | Self::GroupsAndVotesArrayLengthsMismatch { .. }
            | Self::InvalidSortHints { .. }
            | Self::InconsistentPendingWithdrawal { .. }
            | Self::InvalidInput { .. } => ErrorKind::InputValidation,

            Self::GroupNotEligible { .. }
            | Self::GroupAlreadyAdded { .. }
            | Self::GroupNotActive { .. }
            | Self::MaxGroupsVotedForReached { .. }
            | Self::StrategyNotAllowed { .. }
            | Self::StrategyAlreadyAllowed { .. }
            | Self::HealthyGroup { .. }
            | Self::NoVotableGroups
            | Self::NothingToRebalance { .. } => ErrorKind::Eligibility,

            Self::NotAbleToDistributeVotes { .. }
            | Self::TotalVotesMismatch { .. }
            | Self::TransferAmountMisalignment { .. }
            | Self::WithdrawalAmountTooHigh { .. }
            | Self::TransferAmountTooHigh { .. }
            | Self::GroupNotBalancedOrNotEnoughStCelo { .. }
            | Self::CantWithdrawAccordingToStrategy { .. }
            | Self::InsufficientBalance { .. }
            | Self::NoScheduledWithdrawal { .. }
            | Self::RebalanceNoExtraCelo { .. }
            | Self::RebalanceEnoughCelo { .. } => ErrorKind::Capacity,

            Self::Unauthorized { .. } => ErrorKind::Authorization,

            Self::PendingWithdrawalIndexTooHigh { .. }
            | Self::PendingWithdrawalNotReady { .. }
            | Self::HealthAlreadyUpdated { .. } => ErrorKind::Timing,

            Self::Chain { .. } => ErrorKind::Chain,

            Self::Overflow | Self::Underflow | Self::DivisionByZero | Self::Serialization => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true if retrying the same call later may succeed
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            Self::PendingWithdrawalNotReady { .. }
                | Self::HealthAlreadyUpdated { .. }
                | Self::NotAbleToDistributeVotes { .. }
                | Self::NoVotableGroups
        )
    }
}

impl core::fmt::Display for StCeloError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {:?}", self.code(), self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StCeloError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let group = [7u8; 20];
        let errors = [
            StCeloError::ZeroAmount,
            StCeloError::NoVotableGroups,
            StCeloError::GroupNotEligible { group },
            StCeloError::GroupAlreadyAdded { group },
            StCeloError::TotalVotesMismatch { expected: 1, actual: 2 },
            StCeloError::GroupsAndVotesArrayLengthsMismatch { groups: 1, votes: 2 },
            StCeloError::WithdrawalAmountTooHigh { group, requested: 2, available: 1 },
            StCeloError::PendingWithdrawalIndexTooHigh { index: 3, len: 1 },
            StCeloError::PendingWithdrawalNotReady { unlock_timestamp: 10, now: 5 },
            StCeloError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_kinds() {
        let group = [7u8; 20];
        assert_eq!(StCeloError::GroupNotEligible { group }.kind(), ErrorKind::Eligibility);
        assert_eq!(
            StCeloError::PendingWithdrawalNotReady { unlock_timestamp: 10, now: 5 }.kind(),
            ErrorKind::Timing
        );
        assert_eq!(
            StCeloError::Unauthorized { expected: group, actual: [1u8; 20] }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            StCeloError::TotalVotesMismatch { expected: 1, actual: 2 }.kind(),
            ErrorKind::Capacity
        );
    }

    #[test]
    fn test_retryable() {
        assert!(StCeloError::HealthAlreadyUpdated { group: [1u8; 20], epoch: 4 }.is_retryable_later());
        assert!(!StCeloError::ZeroAmount.is_retryable_later());
    }
}
