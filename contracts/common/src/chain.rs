//! Underlying Chain Collaborators
//!
//! The allocator never owns election or locking state. It reads and drives
//! it through these traits, implemented by the host chain (or by the
//! in-memory simulator in tests).

use crate::errors::StCeloResult;
use crate::types::{Address, GroupVotes, SortHints, UnlockingCelo};
use crate::Vec;

/// Signed change applied to a group's total votes when computing sort hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDelta {
    Increase(u128),
    Decrease(u128),
}

/// Validator election primitives
pub trait Election {
    /// Pending and active votes `account` holds for `group`
    fn votes_for_group_by_account(&self, group: &Address, account: &Address) -> GroupVotes;

    /// Total votes (all accounts, pending + active) for `group`
    fn total_votes_for_group(&self, group: &Address) -> u128;

    /// Additional votes `group` can accept before hitting its voting limit
    fn num_votes_receivable(&self, group: &Address) -> u128;

    /// Whether `account` has pending votes for `group` from a past epoch
    fn has_activatable_pending_votes(&self, account: &Address, group: &Address) -> bool;

    /// Groups `account` currently votes for
    fn groups_voted_for_by_account(&self, account: &Address) -> Vec<Address>;

    /// Maximum number of groups a single account may vote for
    fn max_num_groups_voted_for(&self) -> usize;

    /// Whether `group` is a registered validator group
    fn is_registered_group(&self, group: &Address) -> bool;

    /// Neighbours of `group` in the chain's eligible-group ordering after applying `delta`
    fn find_lesser_and_greater_after_vote(&self, group: &Address, delta: VoteDelta) -> SortHints;

    /// Cast `value` pending votes from `account`'s nonvoting locked CELO
    fn vote(&mut self, account: &Address, group: &Address, value: u128, hints: SortHints) -> StCeloResult<()>;

    /// Turn activatable pending votes into active votes, returning the amount activated
    fn activate(&mut self, account: &Address, group: &Address) -> StCeloResult<u128>;

    /// Revoke pending votes back to nonvoting locked CELO
    fn revoke_pending(&mut self, account: &Address, group: &Address, value: u128, hints: SortHints) -> StCeloResult<()>;

    /// Revoke active votes back to nonvoting locked CELO
    fn revoke_active(&mut self, account: &Address, group: &Address, value: u128, hints: SortHints) -> StCeloResult<()>;
}

/// Locked-gold primitives
pub trait LockedGold {
    /// Lock `value` CELO for `account`, making it nonvoting locked
    fn lock(&mut self, account: &Address, value: u128) -> StCeloResult<()>;

    /// Start unlocking `value` nonvoting CELO; withdrawable after the unlocking period
    fn unlock(&mut self, account: &Address, value: u128) -> StCeloResult<UnlockingCelo>;

    /// Withdraw the matured unlocking entry at `index`, returning its value
    fn withdraw(&mut self, account: &Address, index: usize) -> StCeloResult<u128>;

    /// Locked CELO not currently voting
    fn nonvoting_locked(&self, account: &Address) -> u128;

    /// All locked CELO (voting and nonvoting), excluding unlocking entries
    fn account_total_locked(&self, account: &Address) -> u128;

    /// Unlocking entries in chain order
    fn pending_withdrawals(&self, account: &Address) -> Vec<UnlockingCelo>;

    /// Seconds between unlock and withdrawability
    fn unlocking_period(&self) -> u64;
}

/// Injected logical clock
pub trait ChainClock {
    /// Current block timestamp in seconds
    fn timestamp(&self) -> u64;

    /// Current epoch number
    fn epoch_number(&self) -> u64;
}

/// Everything the allocator needs from the chain
pub trait CeloChain: Election + LockedGold + ChainClock {}

impl<T: Election + LockedGold + ChainClock> CeloChain for T {}
