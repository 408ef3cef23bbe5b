//! Account Ledger for stCELO
//!
//! The Account holds every CELO of the protocol and is the only component
//! that talks to the chain's election and locked-gold primitives. Strategies
//! and the Manager decide *where* stake should be; the Account records that
//! decision as a schedule and later realises it on-chain.
//!
//! ## Per-group state machine
//!
//! ```text
//! stake:       scheduled (to_vote) -> pending (on-chain) -> active (on-chain)
//! withdrawal:  scheduled (to_withdraw) -> pending withdrawal (queued) -> finished
//! ```
//!
//! ## Core Operations
//!
//! - **schedule_votes**: record CELO attached to a deposit as votes to cast
//! - **schedule_withdrawals**: reserve CELO of groups for a beneficiary
//! - **schedule_transfer**: move attributed CELO between groups
//! - **activate_and_vote**: permissionless; realise revocations, activate
//!   pending votes and cast scheduled votes
//! - **withdraw**: permissionless; resolve a beneficiary's scheduled
//!   withdrawal into immediate CELO and an unlocking pending withdrawal
//! - **finish_pending_withdrawal**: permissionless after the unlock time
//!
//! ## Accounting identity
//!
//! `sum(get_celo_for_group(g)) == get_total_celo()` holds after every
//! operation: liquid balance plus nonvoting locked CELO always backs the
//! sum of scheduled votes.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stcelo_common::{
    chain::{CeloChain, Election, LockedGold},
    constants::limits::MAX_GROUPS_PER_SCHEDULE,
    digest::state_digest,
    errors::{StCeloError, StCeloResult},
    math::{safe_add, safe_sub, safe_sum},
    types::{Address, RevokeHints, SortHints},
    BTreeMap, Vec, ZERO_ADDRESS,
};

// ============ Ledger Types ============

/// Schedule of one group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ScheduledVotes {
    /// CELO to be voted for the group
    pub to_vote: u128,
    /// Votes to be revoked from the group (transfers out)
    pub to_revoke: u128,
    /// CELO to be withdrawn from the group
    pub to_withdraw: u128,
    /// `to_withdraw` split by beneficiary
    pub to_withdraw_for: BTreeMap<Address, u128>,
}

impl ScheduledVotes {
    fn is_empty(&self) -> bool {
        self.to_vote == 0 && self.to_revoke == 0 && self.to_withdraw == 0
    }
}

/// CELO unlocking on-chain on behalf of a beneficiary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PendingWithdrawal {
    /// Group the CELO was withdrawn from
    pub group: Address,
    /// Amount unlocking
    pub value: u128,
    /// Earliest time the CELO can be withdrawn
    pub timestamp: u64,
}

/// What a call to [`Account::activate_and_vote`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationResult {
    /// Scheduled votes cancelled against scheduled revocations
    pub netted: u128,
    pub revoked_pending: u128,
    pub revoked_active: u128,
    pub activated: u128,
    pub voted: u128,
    /// Scheduled votes left for a later call
    pub still_scheduled: u128,
}

/// What a call to [`Account::withdraw`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WithdrawalResult {
    /// CELO handed to the beneficiary right away
    pub immediate: u128,
    pub revoked_pending: u128,
    pub revoked_active: u128,
    /// CELO queued as a pending withdrawal
    pub unlocking: u128,
    /// Unlock time of the queued pending withdrawal
    pub unlock_timestamp: Option<u64>,
}

// ============ Account ============

/// Protocol-owned CELO and its per-group schedules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Account {
    /// On-chain address votes are cast from
    address: Address,
    /// Liquid CELO held but not yet locked
    balance: u128,
    scheduled: BTreeMap<Address, ScheduledVotes>,
    total_scheduled_withdrawals: u128,
    scheduled_withdrawals_for: BTreeMap<Address, u128>,
    pending_withdrawals: BTreeMap<Address, Vec<PendingWithdrawal>>,
}

impl Account {
    /// Creates a new ledger voting from `address`.
    ///
    /// # Errors
    /// Returns `StCeloError::ZeroAddress` if `address` is the zero address.
    pub fn new(address: Address) -> StCeloResult<Self> {
        if address == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "account" });
        }
        Ok(Self {
            address,
            balance: 0,
            scheduled: BTreeMap::new(),
            total_scheduled_withdrawals: 0,
            scheduled_withdrawals_for: BTreeMap::new(),
            pending_withdrawals: BTreeMap::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Liquid CELO held by the account
    pub fn balance(&self) -> u128 {
        self.balance
    }

    // ============ Scheduling ============

    /// Record `attached` CELO as votes to cast for `groups`.
    ///
    /// # Errors
    /// - `GroupsAndVotesArrayLengthsMismatch` if the arrays differ in length
    /// - `TotalVotesMismatch` if the votes do not sum to `attached`
    pub fn schedule_votes(&mut self, groups: &[Address], votes: &[u128], attached: u128) -> StCeloResult<()> {
        check_lengths(groups, votes)?;
        let total = safe_sum(votes)?;
        if total != attached {
            return Err(StCeloError::TotalVotesMismatch { expected: attached, actual: total });
        }
        let new_balance = safe_add(self.balance, attached)?;

        for (group, amount) in groups.iter().zip(votes) {
            let entry = self.scheduled.entry(*group).or_default();
            entry.to_vote = safe_add(entry.to_vote, *amount)?;
        }
        self.balance = new_balance;
        self.prune(groups);

        debug!("scheduled {} CELO of votes over {} groups", attached, groups.len());
        Ok(())
    }

    /// Reserve CELO of `groups` for `beneficiary`.
    ///
    /// # Errors
    /// - `GroupsAndVotesArrayLengthsMismatch` if the arrays differ in length
    /// - `WithdrawalAmountTooHigh` if a group is asked for more than it holds
    pub fn schedule_withdrawals<C: Election>(
        &mut self,
        chain: &C,
        beneficiary: Address,
        groups: &[Address],
        amounts: &[u128],
    ) -> StCeloResult<()> {
        check_lengths(groups, amounts)?;
        if beneficiary == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "beneficiary" });
        }

        // 1. Validate against current attribution before touching anything
        let requested = aggregate(groups, amounts)?;
        let mut total = 0u128;
        for (group, amount) in &requested {
            let available = self.get_celo_for_group(chain, group);
            if *amount > available {
                return Err(StCeloError::WithdrawalAmountTooHigh {
                    group: *group,
                    requested: *amount,
                    available,
                });
            }
            total = safe_add(total, *amount)?;
        }

        // 2. Record
        for (group, amount) in &requested {
            let entry = self.scheduled.entry(*group).or_default();
            entry.to_withdraw += amount;
            *entry.to_withdraw_for.entry(beneficiary).or_default() += amount;
        }
        self.total_scheduled_withdrawals = safe_add(self.total_scheduled_withdrawals, total)?;
        *self.scheduled_withdrawals_for.entry(beneficiary).or_default() += total;
        self.prune(groups);

        debug!(
            "scheduled withdrawal of {} CELO for {}",
            total,
            hex::encode(beneficiary)
        );
        Ok(())
    }

    /// Move attributed CELO from `from_groups` to `to_groups`.
    ///
    /// Not-yet-cast votes of a source group are cancelled first; the rest
    /// becomes a scheduled revocation realised by [`Self::activate_and_vote`].
    ///
    /// # Errors
    /// - `GroupsAndVotesArrayLengthsMismatch` on either pair of arrays
    /// - `TransferAmountMisalignment` if both sides do not sum to the same total
    /// - `TransferAmountTooHigh` if a source group is asked for more than it holds
    pub fn schedule_transfer<C: Election>(
        &mut self,
        chain: &C,
        from_groups: &[Address],
        from_votes: &[u128],
        to_groups: &[Address],
        to_votes: &[u128],
    ) -> StCeloResult<()> {
        check_lengths(from_groups, from_votes)?;
        check_lengths(to_groups, to_votes)?;
        let from_total = safe_sum(from_votes)?;
        let to_total = safe_sum(to_votes)?;
        if from_total != to_total {
            return Err(StCeloError::TransferAmountMisalignment { from_total, to_total });
        }

        let from = aggregate(from_groups, from_votes)?;
        for (group, amount) in &from {
            let available = self.get_celo_for_group(chain, group);
            if *amount > available {
                return Err(StCeloError::TransferAmountTooHigh {
                    group: *group,
                    requested: *amount,
                    available,
                });
            }
        }

        for (group, amount) in &from {
            let entry = self.scheduled.entry(*group).or_default();
            let cancelled = entry.to_vote.min(*amount);
            entry.to_vote -= cancelled;
            entry.to_revoke += amount - cancelled;
        }
        for (group, amount) in to_groups.iter().zip(to_votes) {
            let entry = self.scheduled.entry(*group).or_default();
            entry.to_vote = safe_add(entry.to_vote, *amount)?;
        }
        self.prune(from_groups);
        self.prune(to_groups);

        debug!("scheduled transfer of {} CELO", from_total);
        Ok(())
    }

    // ============ Realisation ============

    /// Realise the schedule of `group` on-chain.
    ///
    /// In order: net scheduled votes against scheduled revocations, revoke
    /// pending then active votes, activate matured pending votes, and cast as
    /// many scheduled votes as the group can receive. Anything the chain
    /// cannot take yet stays scheduled, so repeated calls are safe.
    ///
    /// # Errors
    /// - `MaxGroupsVotedForReached` if casting would exceed the voted-group cap
    /// - `Chain` if a chain primitive refuses
    pub fn activate_and_vote<C: CeloChain>(
        &mut self,
        chain: &mut C,
        group: Address,
        vote_hints: SortHints,
        revoke_hints: RevokeHints,
    ) -> StCeloResult<ActivationResult> {
        let mut result = ActivationResult::default();
        let mut schedule = self.scheduled.get(&group).cloned().unwrap_or_default();

        // 1. Net votes against revocations
        let netted = schedule.to_vote.min(schedule.to_revoke);
        schedule.to_vote -= netted;
        schedule.to_revoke -= netted;
        result.netted = netted;

        // 2. Plan revocations
        let votes = chain.votes_for_group_by_account(&group, &self.address);
        let revoke_pending = schedule.to_revoke.min(votes.pending);
        let revoke_active = (schedule.to_revoke - revoke_pending).min(votes.active);
        schedule.to_revoke -= revoke_pending + revoke_active;

        // 3. Plan the vote
        // After netting at most one of to_vote / to_revoke is non-zero
        // Activation only matters for pending votes the revocation leaves behind
        let activatable =
            votes.pending > revoke_pending && chain.has_activatable_pending_votes(&self.address, &group);
        let nonvoting = chain.nonvoting_locked(&self.address);
        let receivable = chain.num_votes_receivable(&group);
        let available = safe_add(self.balance, nonvoting)?;
        let to_cast = schedule.to_vote.min(receivable).min(available);
        let to_lock = to_cast.saturating_sub(nonvoting);

        if to_cast > 0 {
            let voted_for = chain.groups_voted_for_by_account(&self.address);
            let max = chain.max_num_groups_voted_for();
            if !voted_for.contains(&group) && voted_for.len() >= max {
                return Err(StCeloError::MaxGroupsVotedForReached { max });
            }
        }
        schedule.to_vote -= to_cast;
        result.revoked_pending = revoke_pending;
        result.revoked_active = revoke_active;
        result.voted = to_cast;
        result.still_scheduled = schedule.to_vote;

        // 4. Effects
        self.balance -= to_lock;
        if schedule.is_empty() && schedule.to_withdraw_for.is_empty() {
            self.scheduled.remove(&group);
        } else {
            self.scheduled.insert(group, schedule);
        }

        // 5. Interactions
        if revoke_pending > 0 {
            chain.revoke_pending(&self.address, &group, revoke_pending, revoke_hints.after_pending)?;
        }
        if revoke_active > 0 {
            chain.revoke_active(&self.address, &group, revoke_active, revoke_hints.after_active)?;
        }
        if activatable {
            result.activated = chain.activate(&self.address, &group)?;
        }
        if to_lock > 0 {
            chain.lock(&self.address, to_lock)?;
        }
        if to_cast > 0 {
            chain.vote(&self.address, &group, to_cast, vote_hints)?;
        }

        info!(
            "activate_and_vote {}: voted {}, activated {}, revoked {}, {} still scheduled",
            hex::encode(group),
            result.voted,
            result.activated,
            revoke_pending + revoke_active,
            result.still_scheduled
        );
        Ok(result)
    }

    /// Resolve `beneficiary`'s scheduled withdrawal from `group`.
    ///
    /// CELO comes first from not-yet-cast scheduled votes (paid immediately
    /// from the liquid balance), then from revoking pending votes, then
    /// active votes. Everything not paid immediately is unlocked and queued
    /// as one [`PendingWithdrawal`].
    ///
    /// # Errors
    /// - `NoScheduledWithdrawal` if nothing is scheduled for the beneficiary
    /// - `WithdrawalAmountTooHigh` if the group's votes no longer cover it
    pub fn withdraw<C: CeloChain>(
        &mut self,
        chain: &mut C,
        beneficiary: Address,
        group: Address,
        hints: RevokeHints,
    ) -> StCeloResult<WithdrawalResult> {
        let mut schedule = self.scheduled.get(&group).cloned().unwrap_or_default();
        let amount = schedule.to_withdraw_for.get(&beneficiary).copied().unwrap_or(0);
        if amount == 0 {
            return Err(StCeloError::NoScheduledWithdrawal { group, beneficiary });
        }

        // 1. Plan sources
        let from_scheduled = schedule.to_vote.min(amount);
        let immediate = from_scheduled.min(self.balance);
        let from_nonvoting = from_scheduled - immediate;
        if from_nonvoting > chain.nonvoting_locked(&self.address) {
            return Err(StCeloError::Chain { reason: "scheduled votes not backed by locked gold" });
        }

        let remaining = amount - from_scheduled;
        let votes = chain.votes_for_group_by_account(&group, &self.address);
        let revoke_pending = remaining.min(votes.pending);
        let revoke_active = remaining - revoke_pending;
        if revoke_active > votes.active {
            return Err(StCeloError::WithdrawalAmountTooHigh {
                group,
                requested: amount,
                available: from_scheduled + votes.total(),
            });
        }
        let unlocking = from_nonvoting + revoke_pending + revoke_active;

        // 2. Effects
        schedule.to_vote -= from_scheduled;
        schedule.to_withdraw = safe_sub(schedule.to_withdraw, amount)?;
        schedule.to_withdraw_for.remove(&beneficiary);
        self.total_scheduled_withdrawals = safe_sub(self.total_scheduled_withdrawals, amount)?;
        let for_beneficiary = self.scheduled_withdrawals_for.get(&beneficiary).copied().unwrap_or(0);
        let for_beneficiary = safe_sub(for_beneficiary, amount)?;
        if for_beneficiary == 0 {
            self.scheduled_withdrawals_for.remove(&beneficiary);
        } else {
            self.scheduled_withdrawals_for.insert(beneficiary, for_beneficiary);
        }
        if schedule.is_empty() && schedule.to_withdraw_for.is_empty() {
            self.scheduled.remove(&group);
        } else {
            self.scheduled.insert(group, schedule);
        }
        self.balance -= immediate;

        let unlock_timestamp = if unlocking > 0 {
            let timestamp = chain.timestamp() + chain.unlocking_period();
            self.pending_withdrawals
                .entry(beneficiary)
                .or_default()
                .push(PendingWithdrawal { group, value: unlocking, timestamp });
            Some(timestamp)
        } else {
            None
        };

        // 3. Interactions
        if revoke_pending > 0 {
            chain.revoke_pending(&self.address, &group, revoke_pending, hints.after_pending)?;
        }
        if revoke_active > 0 {
            chain.revoke_active(&self.address, &group, revoke_active, hints.after_active)?;
        }
        if unlocking > 0 {
            chain.unlock(&self.address, unlocking)?;
        }

        info!(
            "withdraw {} from {} for {}: {} immediate, {} unlocking",
            amount,
            hex::encode(group),
            hex::encode(beneficiary),
            immediate,
            unlocking
        );
        Ok(WithdrawalResult {
            immediate,
            revoked_pending: revoke_pending,
            revoked_active: revoke_active,
            unlocking,
            unlock_timestamp,
        })
    }

    /// Pay out `beneficiary`'s pending withdrawal at `index`, backed by the
    /// chain's unlocking entry at `underlying_index`. Returns the CELO paid.
    ///
    /// # Errors
    /// - `PendingWithdrawalIndexTooHigh` if either index is out of range
    /// - `InconsistentPendingWithdrawal` if the two entries differ
    /// - `PendingWithdrawalNotReady` before the unlock time
    pub fn finish_pending_withdrawal<C: CeloChain>(
        &mut self,
        chain: &mut C,
        beneficiary: Address,
        index: usize,
        underlying_index: usize,
    ) -> StCeloResult<u128> {
        let local = self.pending_withdrawals.get(&beneficiary).map(|l| l.as_slice()).unwrap_or(&[]);
        let entry = *local.get(index).ok_or(StCeloError::PendingWithdrawalIndexTooHigh {
            index,
            len: local.len(),
        })?;

        let underlying = chain.pending_withdrawals(&self.address);
        let chain_entry = underlying.get(underlying_index).ok_or(StCeloError::PendingWithdrawalIndexTooHigh {
            index: underlying_index,
            len: underlying.len(),
        })?;
        if chain_entry.value != entry.value || chain_entry.timestamp != entry.timestamp {
            return Err(StCeloError::InconsistentPendingWithdrawal { index, underlying_index });
        }

        let now = chain.timestamp();
        if now < entry.timestamp {
            return Err(StCeloError::PendingWithdrawalNotReady { unlock_timestamp: entry.timestamp, now });
        }

        // Keep insertion order for the remaining entries
        if let Some(list) = self.pending_withdrawals.get_mut(&beneficiary) {
            list.remove(index);
            if list.is_empty() {
                self.pending_withdrawals.remove(&beneficiary);
            }
        }

        let value = chain.withdraw(&self.address, underlying_index)?;
        info!("finished pending withdrawal of {} for {}", value, hex::encode(beneficiary));
        Ok(value)
    }

    /// Index of the chain unlocking entry backing `beneficiary`'s pending withdrawal at `index`
    pub fn find_underlying_index<C: LockedGold>(&self, chain: &C, beneficiary: &Address, index: usize) -> Option<usize> {
        let entry = self.pending_withdrawal(beneficiary, index)?;
        chain
            .pending_withdrawals(&self.address)
            .iter()
            .position(|u| u.value == entry.value && u.timestamp == entry.timestamp)
    }

    // ============ Views ============

    /// CELO attributed to `group`: on-chain votes plus scheduled votes minus
    /// scheduled revocations and withdrawals
    pub fn get_celo_for_group<C: Election>(&self, chain: &C, group: &Address) -> u128 {
        let votes = chain.votes_for_group_by_account(group, &self.address).total();
        match self.scheduled.get(group) {
            Some(s) => (votes + s.to_vote)
                .saturating_sub(s.to_revoke)
                .saturating_sub(s.to_withdraw),
            None => votes,
        }
    }

    /// All CELO owned by depositors: liquid balance plus locked CELO, minus
    /// CELO already reserved for withdrawals
    pub fn get_total_celo<C: LockedGold>(&self, chain: &C) -> u128 {
        (self.balance + chain.account_total_locked(&self.address))
            .saturating_sub(self.total_scheduled_withdrawals)
    }

    pub fn scheduled_votes_for_group(&self, group: &Address) -> u128 {
        self.scheduled.get(group).map(|s| s.to_vote).unwrap_or(0)
    }

    pub fn scheduled_revoke_for_group(&self, group: &Address) -> u128 {
        self.scheduled.get(group).map(|s| s.to_revoke).unwrap_or(0)
    }

    pub fn scheduled_withdrawals_for_group(&self, group: &Address) -> u128 {
        self.scheduled.get(group).map(|s| s.to_withdraw).unwrap_or(0)
    }

    pub fn scheduled_withdrawals_for_group_and_beneficiary(&self, group: &Address, beneficiary: &Address) -> u128 {
        self.scheduled
            .get(group)
            .and_then(|s| s.to_withdraw_for.get(beneficiary).copied())
            .unwrap_or(0)
    }

    /// Total CELO scheduled for `beneficiary` across groups
    pub fn scheduled_withdrawals_for(&self, beneficiary: &Address) -> u128 {
        self.scheduled_withdrawals_for.get(beneficiary).copied().unwrap_or(0)
    }

    pub fn total_scheduled_withdrawals(&self) -> u128 {
        self.total_scheduled_withdrawals
    }

    /// Groups with a non-empty schedule
    pub fn scheduled_groups(&self) -> Vec<Address> {
        self.scheduled.keys().copied().collect()
    }

    /// `beneficiary`'s pending withdrawals in insertion order
    pub fn pending_withdrawals(&self, beneficiary: &Address) -> &[PendingWithdrawal] {
        self.pending_withdrawals.get(beneficiary).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn pending_withdrawal(&self, beneficiary: &Address, index: usize) -> Option<PendingWithdrawal> {
        self.pending_withdrawals(beneficiary).get(index).copied()
    }

    /// SHA-256 commitment of the ledger
    pub fn digest(&self) -> StCeloResult<[u8; 32]> {
        state_digest(self)
    }

    fn prune(&mut self, groups: &[Address]) {
        for group in groups {
            if self.scheduled.get(group).map(|s| s.is_empty()).unwrap_or(false) {
                self.scheduled.remove(group);
            }
        }
    }
}

// ============ Helper Functions ============

fn check_lengths(groups: &[Address], amounts: &[u128]) -> StCeloResult<()> {
    if groups.len() != amounts.len() {
        return Err(StCeloError::GroupsAndVotesArrayLengthsMismatch {
            groups: groups.len(),
            votes: amounts.len(),
        });
    }
    if groups.len() > MAX_GROUPS_PER_SCHEDULE {
        return Err(StCeloError::InvalidInput { param: "groups", reason: "too many groups in one schedule" });
    }
    Ok(())
}

/// Sum amounts per group, keeping first-seen order and dropping zeros
fn aggregate(groups: &[Address], amounts: &[u128]) -> StCeloResult<Vec<(Address, u128)>> {
    let mut out: Vec<(Address, u128)> = Vec::new();
    for (group, amount) in groups.iter().zip(amounts) {
        if *amount == 0 {
            continue;
        }
        match out.iter_mut().find(|(g, _)| g == group) {
            Some((_, total)) => *total = safe_add(*total, *amount)?,
            None => out.push((*group, *amount)),
        }
    }
    Ok(out)
}
