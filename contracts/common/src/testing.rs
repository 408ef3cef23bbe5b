//! In-memory Chain Simulator
//!
//! Deterministic implementation of the chain collaborator traits for unit
//! and integration tests: registered groups with voting limits, pending
//! votes that become activatable one epoch after being cast, nonvoting
//! locked CELO and a timestamped unlocking queue.

use crate::chain::{ChainClock, Election, LockedGold, VoteDelta};
use crate::constants::{election, limits};
use crate::errors::{StCeloError, StCeloResult};
use crate::types::{Address, GroupVotes, SortHints, UnlockingCelo};
use crate::{BTreeMap, Vec};

/// Starting block timestamp of a fresh simulator
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct VoteRecord {
    pending: u128,
    pending_epoch: u64,
    active: u128,
}

impl VoteRecord {
    fn total(&self) -> u128 {
        self.pending + self.active
    }
}

/// Simulated election + locked gold + clock
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    timestamp: u64,
    epoch: u64,
    unlocking_period: u64,
    max_groups_voted_for: usize,
    voting_limits: BTreeMap<Address, u128>,
    votes: BTreeMap<(Address, Address), VoteRecord>,
    nonvoting: BTreeMap<Address, u128>,
    unlocking: BTreeMap<Address, Vec<UnlockingCelo>>,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self {
            timestamp: GENESIS_TIMESTAMP,
            epoch: 1,
            unlocking_period: limits::UNLOCKING_PERIOD_SECS,
            max_groups_voted_for: election::DEFAULT_MAX_GROUPS_VOTED_FOR,
            voting_limits: BTreeMap::new(),
            votes: BTreeMap::new(),
            nonvoting: BTreeMap::new(),
            unlocking: BTreeMap::new(),
        }
    }

    // ============ Test Controls ============

    /// Register a validator group that can receive up to `voting_limit` total votes
    pub fn register_group(&mut self, group: Address, voting_limit: u128) {
        self.voting_limits.insert(group, voting_limit);
    }

    pub fn set_voting_limit(&mut self, group: Address, voting_limit: u128) {
        self.voting_limits.insert(group, voting_limit);
    }

    pub fn set_max_groups_voted_for(&mut self, max: usize) {
        self.max_groups_voted_for = max;
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.timestamp += secs;
    }

    /// Move to the next epoch, advancing the clock by one epoch length
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
        self.timestamp += election::EPOCH_DURATION_SECS;
    }

    /// Credit epoch rewards to `account`'s active votes for `group`
    pub fn distribute_rewards(&mut self, account: &Address, group: &Address, amount: u128) {
        let record = self.votes.entry((*account, *group)).or_default();
        record.active += amount;
    }

    /// Remove `amount` from `account`'s active votes for `group`
    pub fn slash(&mut self, account: &Address, group: &Address, amount: u128) {
        if let Some(record) = self.votes.get_mut(&(*account, *group)) {
            record.active = record.active.saturating_sub(amount);
        }
    }

    fn record(&self, account: &Address, group: &Address) -> VoteRecord {
        self.votes.get(&(*account, *group)).copied().unwrap_or_default()
    }

    fn store(&mut self, account: &Address, group: &Address, record: VoteRecord) {
        if record.total() == 0 {
            self.votes.remove(&(*account, *group));
        } else {
            self.votes.insert((*account, *group), record);
        }
    }

    fn take_nonvoting(&mut self, account: &Address, value: u128) -> StCeloResult<()> {
        let nonvoting = self.nonvoting_locked(account);
        if nonvoting < value {
            return Err(StCeloError::Chain { reason: "insufficient nonvoting locked gold" });
        }
        self.nonvoting.insert(*account, nonvoting - value);
        Ok(())
    }

    fn add_nonvoting(&mut self, account: &Address, value: u128) {
        *self.nonvoting.entry(*account).or_default() += value;
    }
}

impl Election for SimulatedChain {
    fn votes_for_group_by_account(&self, group: &Address, account: &Address) -> GroupVotes {
        let record = self.record(account, group);
        GroupVotes { pending: record.pending, active: record.active }
    }

    fn total_votes_for_group(&self, group: &Address) -> u128 {
        self.votes
            .iter()
            .filter(|((_, g), _)| g == group)
            .map(|(_, r)| r.total())
            .sum()
    }

    fn num_votes_receivable(&self, group: &Address) -> u128 {
        match self.voting_limits.get(group) {
            Some(limit) => limit.saturating_sub(self.total_votes_for_group(group)),
            None => 0,
        }
    }

    fn has_activatable_pending_votes(&self, account: &Address, group: &Address) -> bool {
        let record = self.record(account, group);
        record.pending > 0 && record.pending_epoch < self.epoch
    }

    fn groups_voted_for_by_account(&self, account: &Address) -> Vec<Address> {
        self.votes
            .iter()
            .filter(|((a, _), r)| a == account && r.total() > 0)
            .map(|((_, g), _)| *g)
            .collect()
    }

    fn max_num_groups_voted_for(&self) -> usize {
        self.max_groups_voted_for
    }

    fn is_registered_group(&self, group: &Address) -> bool {
        self.voting_limits.contains_key(group)
    }

    fn find_lesser_and_greater_after_vote(&self, group: &Address, delta: VoteDelta) -> SortHints {
        let mut totals: Vec<(u128, Address)> = self
            .voting_limits
            .keys()
            .map(|g| {
                let mut total = self.total_votes_for_group(g);
                if g == group {
                    total = match delta {
                        VoteDelta::Increase(v) => total.saturating_add(v),
                        VoteDelta::Decrease(v) => total.saturating_sub(v),
                    };
                }
                (total, *g)
            })
            .collect();
        // Greatest first
        totals.sort_by(|a, b| b.cmp(a));

        match totals.iter().position(|(_, g)| g == group) {
            Some(pos) => SortHints {
                greater: pos.checked_sub(1).map(|p| totals[p].1),
                lesser: totals.get(pos + 1).map(|(_, g)| *g),
            },
            None => SortHints::default(),
        }
    }

    fn vote(&mut self, account: &Address, group: &Address, value: u128, _hints: SortHints) -> StCeloResult<()> {
        if !self.is_registered_group(group) {
            return Err(StCeloError::Chain { reason: "group not registered" });
        }
        if value == 0 {
            return Err(StCeloError::ZeroAmount);
        }
        if self.num_votes_receivable(group) < value {
            return Err(StCeloError::Chain { reason: "voting limit exceeded" });
        }
        let mut record = self.record(account, group);
        if record.total() == 0 && self.groups_voted_for_by_account(account).len() >= self.max_groups_voted_for {
            return Err(StCeloError::Chain { reason: "voted for too many groups" });
        }
        self.take_nonvoting(account, value)?;

        record.pending += value;
        record.pending_epoch = self.epoch;
        self.store(account, group, record);
        Ok(())
    }

    fn activate(&mut self, account: &Address, group: &Address) -> StCeloResult<u128> {
        if !self.has_activatable_pending_votes(account, group) {
            return Err(StCeloError::Chain { reason: "no activatable pending votes" });
        }
        let mut record = self.record(account, group);
        let amount = record.pending;
        record.active += amount;
        record.pending = 0;
        self.store(account, group, record);
        Ok(amount)
    }

    fn revoke_pending(&mut self, account: &Address, group: &Address, value: u128, _hints: SortHints) -> StCeloResult<()> {
        let mut record = self.record(account, group);
        if record.pending < value {
            return Err(StCeloError::Chain { reason: "revoking more pending votes than exist" });
        }
        record.pending -= value;
        self.store(account, group, record);
        self.add_nonvoting(account, value);
        Ok(())
    }

    fn revoke_active(&mut self, account: &Address, group: &Address, value: u128, _hints: SortHints) -> StCeloResult<()> {
        let mut record = self.record(account, group);
        if record.active < value {
            return Err(StCeloError::Chain { reason: "revoking more active votes than exist" });
        }
        record.active -= value;
        self.store(account, group, record);
        self.add_nonvoting(account, value);
        Ok(())
    }
}

impl LockedGold for SimulatedChain {
    fn lock(&mut self, account: &Address, value: u128) -> StCeloResult<()> {
        self.add_nonvoting(account, value);
        Ok(())
    }

    fn unlock(&mut self, account: &Address, value: u128) -> StCeloResult<UnlockingCelo> {
        self.take_nonvoting(account, value)?;
        let entry = UnlockingCelo { value, timestamp: self.timestamp + self.unlocking_period };
        self.unlocking.entry(*account).or_default().push(entry);
        Ok(entry)
    }

    fn withdraw(&mut self, account: &Address, index: usize) -> StCeloResult<u128> {
        let now = self.timestamp;
        let queue = self
            .unlocking
            .get_mut(account)
            .ok_or(StCeloError::Chain { reason: "no pending withdrawals" })?;
        let entry = queue
            .get(index)
            .copied()
            .ok_or(StCeloError::Chain { reason: "bad pending withdrawal index" })?;
        if entry.timestamp > now {
            return Err(StCeloError::Chain { reason: "pending withdrawal not available" });
        }
        queue.swap_remove(index);
        Ok(entry.value)
    }

    fn nonvoting_locked(&self, account: &Address) -> u128 {
        self.nonvoting.get(account).copied().unwrap_or(0)
    }

    fn account_total_locked(&self, account: &Address) -> u128 {
        let voting: u128 = self
            .votes
            .iter()
            .filter(|((a, _), _)| a == account)
            .map(|(_, r)| r.total())
            .sum();
        voting + self.nonvoting_locked(account)
    }

    fn pending_withdrawals(&self, account: &Address) -> Vec<UnlockingCelo> {
        self.unlocking.get(account).cloned().unwrap_or_default()
    }

    fn unlocking_period(&self) -> u64 {
        self.unlocking_period
    }
}

impl ChainClock for SimulatedChain {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn epoch_number(&self) -> u64 {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: Address = [9u8; 20];
    const G1: Address = [1u8; 20];
    const G2: Address = [2u8; 20];

    #[test]
    fn test_vote_then_activate_next_epoch() {
        let mut chain = SimulatedChain::new();
        chain.register_group(G1, 1_000);
        chain.lock(&ACCOUNT, 300).unwrap();

        chain.vote(&ACCOUNT, &G1, 200, SortHints::default()).unwrap();
        assert_eq!(chain.num_votes_receivable(&G1), 800);
        assert!(!chain.has_activatable_pending_votes(&ACCOUNT, &G1));
        assert!(chain.activate(&ACCOUNT, &G1).is_err());

        chain.advance_epoch();
        assert_eq!(chain.activate(&ACCOUNT, &G1).unwrap(), 200);
        let votes = chain.votes_for_group_by_account(&G1, &ACCOUNT);
        assert_eq!(votes, GroupVotes { pending: 0, active: 200 });
        assert_eq!(chain.account_total_locked(&ACCOUNT), 300);
    }

    #[test]
    fn test_vote_limits() {
        let mut chain = SimulatedChain::new();
        chain.register_group(G1, 100);
        chain.register_group(G2, 100);
        chain.set_max_groups_voted_for(1);
        chain.lock(&ACCOUNT, 500).unwrap();

        assert!(chain.vote(&ACCOUNT, &G1, 101, SortHints::default()).is_err());
        chain.vote(&ACCOUNT, &G1, 100, SortHints::default()).unwrap();
        assert!(chain.vote(&ACCOUNT, &G2, 10, SortHints::default()).is_err());
        assert!(chain.vote(&ACCOUNT, &[7u8; 20], 10, SortHints::default()).is_err());
    }

    #[test]
    fn test_unlock_and_withdraw_after_period() {
        let mut chain = SimulatedChain::new();
        chain.lock(&ACCOUNT, 50).unwrap();
        let entry = chain.unlock(&ACCOUNT, 30).unwrap();
        assert_eq!(entry.timestamp, GENESIS_TIMESTAMP + chain.unlocking_period());
        assert_eq!(chain.nonvoting_locked(&ACCOUNT), 20);

        assert!(chain.withdraw(&ACCOUNT, 0).is_err());
        chain.advance_time(chain.unlocking_period());
        assert_eq!(chain.withdraw(&ACCOUNT, 0).unwrap(), 30);
        assert!(chain.withdraw(&ACCOUNT, 0).is_err());
    }

    #[test]
    fn test_sort_hints_after_vote() {
        let mut chain = SimulatedChain::new();
        let g3 = [3u8; 20];
        chain.register_group(G1, 1_000);
        chain.register_group(G2, 1_000);
        chain.register_group(g3, 1_000);
        chain.lock(&ACCOUNT, 1_000).unwrap();
        chain.vote(&ACCOUNT, &G1, 100, SortHints::default()).unwrap();
        chain.vote(&ACCOUNT, &G2, 50, SortHints::default()).unwrap();

        let hints = chain.find_lesser_and_greater_after_vote(&g3, VoteDelta::Increase(70));
        assert_eq!(hints.greater, Some(G1));
        assert_eq!(hints.lesser, Some(G2));
    }
}
