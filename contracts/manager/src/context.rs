//! Operation Context
//!
//! A [`ManagerContext`] is a candidate copy of the Manager's state, the
//! chain and the health oracle. Each operation runs against one; the
//! Manager commits it only when the operation succeeds, so a failing
//! operation leaves no trace.

use tracing::{debug, info, warn};

use stcelo_account::{ActivationResult, WithdrawalResult};
use stcelo_common::{
    chain::{CeloChain, ChainClock},
    errors::{StCeloError, StCeloResult},
    events::{EventLog, StCeloEvent},
    health::{GroupHealth, GroupHealthRegistry},
    math::ExchangeRate,
    types::{Address, Distribution, RevokeHints, SortHints, Strategy, StrategyTransfer},
    ZERO_ADDRESS,
};
use stcelo_default_strategy::{DeprecationOutcome, StrategyWithdrawal};
use stcelo_specific_group_strategy::{OverflowDirection, OverflowMove};

use crate::state::{receivable_votes, ManagerState};

/// Candidate state an operation works on
pub struct ManagerContext<C, H> {
    pub state: ManagerState,
    pub chain: C,
    pub health: H,
    /// Events of this operation only
    pub events: EventLog,
}

impl<C: CeloChain, H: GroupHealth> ManagerContext<C, H> {
    fn exchange_rate(&self) -> ExchangeRate {
        self.state.exchange_rate(&self.chain)
    }

    // ============ Depositor Operations ============

    /// Mint stCELO for `celo` and schedule it as votes per the depositor's strategy
    pub fn deposit(&mut self, depositor: Address, celo: u128) -> StCeloResult<u128> {
        // 1. Validate
        if celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }
        if depositor == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "depositor" });
        }
        self.settle_blocked_strategy(depositor)?;

        // 2. Price at the rate before this deposit
        let rate = self.exchange_rate();
        let st_celo = rate.to_staked_celo(celo)?;
        if st_celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }

        // 3. Distribution
        let strategy = self.state.strategy_of(&depositor);
        let distribution = self.deposit_into_strategy(strategy, &rate, celo, st_celo)?;

        // 4. Ledgers
        self.state.account.schedule_votes(&distribution.groups, &distribution.votes, celo)?;
        self.state.token.mint(depositor, st_celo)?;

        self.events.emit(StCeloEvent::VotesScheduled {
            groups: distribution.groups,
            votes: distribution.votes,
        });
        self.events.emit(StCeloEvent::Deposited { depositor, celo, st_celo_minted: st_celo, strategy });
        Ok(st_celo)
    }

    /// Burn `st_celo` and schedule the CELO it is worth for withdrawal
    pub fn withdraw(&mut self, beneficiary: Address, st_celo: u128) -> StCeloResult<u128> {
        // 1. Validate
        if st_celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }
        let balance = self.state.token.balance_of(&beneficiary);
        if st_celo > balance {
            return Err(StCeloError::InsufficientBalance { available: balance, requested: st_celo });
        }
        let rate = self.exchange_rate();
        let celo = rate.to_celo(st_celo)?;
        if celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }

        // 2. Strategy distribution
        let strategy = self.state.strategy_of(&beneficiary);
        let withdrawal = self.withdraw_from_strategy(strategy, st_celo, celo)?;
        let distribution = withdrawal.distribution;

        // 3. Every group must really hold its share
        for (group, amount) in distribution.groups.iter().zip(&distribution.votes) {
            let available = self.state.account.get_celo_for_group(&self.chain, group);
            if *amount > available {
                warn!(
                    "group {} holds {} CELO, {} requested",
                    hex::encode(group),
                    available,
                    amount
                );
                return Err(StCeloError::GroupNotBalancedOrNotEnoughStCelo {
                    group: *group,
                    requested: *amount,
                    available,
                });
            }
        }

        // 4. Ledgers
        self.state
            .account
            .schedule_withdrawals(&self.chain, beneficiary, &distribution.groups, &distribution.votes)?;
        self.state.token.burn(beneficiary, st_celo)?;

        self.events.emit(StCeloEvent::WithdrawalsScheduled {
            beneficiary,
            groups: distribution.groups,
            amounts: distribution.votes,
        });
        self.events.emit(StCeloEvent::Withdrawn { beneficiary, st_celo_burned: st_celo, celo, strategy });
        Ok(celo)
    }

    /// Move the depositor's whole stake to `new_strategy`. Returns the CELO moved.
    pub fn change_strategy(&mut self, depositor: Address, new_strategy: Strategy) -> StCeloResult<u128> {
        if let Strategy::Specific(group) = new_strategy {
            if !self.state.specific.is_allowed(&group) {
                return Err(StCeloError::StrategyNotAllowed { group });
            }
            if !self.health.is_valid_group(&group) {
                return Err(StCeloError::GroupNotEligible { group });
            }
        }

        let current = self.state.strategy_of(&depositor);
        let balance = self.state.token.balance_of(&depositor);
        let celo_moved = self.move_stake(current, new_strategy, balance)?;
        self.state.set_strategy(depositor, new_strategy);

        self.events.emit(StCeloEvent::StrategyChanged {
            depositor,
            from: current,
            to: new_strategy,
            celo_moved,
        });
        Ok(celo_moved)
    }

    /// stCELO transfer; stake follows the tokens when the strategies differ
    pub fn transfer(&mut self, from: Address, to: Address, st_celo: u128) -> StCeloResult<()> {
        self.settle_blocked_strategy(to)?;
        self.state.token.transfer(from, to, st_celo)?;

        let from_strategy = self.state.strategy_of(&from);
        let to_strategy = self.state.strategy_of(&to);
        self.move_stake(from_strategy, to_strategy, st_celo)?;

        self.events.emit(StCeloEvent::TokenTransferred { from, to, st_celo });
        Ok(())
    }

    // ============ Repair Operations ============

    /// Move the overshoot of `from_group`'s real CELO to `to_group`'s shortfall
    pub fn rebalance(&mut self, from_group: Address, to_group: Address) -> StCeloResult<u128> {
        if from_group == to_group {
            return Err(StCeloError::InvalidInput { param: "to_group", reason: "must differ from from_group" });
        }
        if !self.health.is_valid_group(&to_group) {
            return Err(StCeloError::GroupNotEligible { group: to_group });
        }

        let (from_expected, from_real) = self.state.expected_and_real_celo_for_group(&self.chain, &from_group)?;
        if from_real <= from_expected {
            return Err(StCeloError::RebalanceNoExtraCelo {
                group: from_group,
                expected: from_expected,
                real: from_real,
            });
        }
        let (to_expected, to_real) = self.state.expected_and_real_celo_for_group(&self.chain, &to_group)?;
        if to_real >= to_expected {
            return Err(StCeloError::RebalanceEnoughCelo {
                group: to_group,
                expected: to_expected,
                real: to_real,
            });
        }

        let amount = (from_real - from_expected).min(to_expected - to_real);
        let mut transfer = StrategyTransfer::default();
        transfer.from.push(from_group, amount, 0);
        transfer.to.push(to_group, amount, 0);
        self.schedule_transfer(transfer)?;

        self.events.emit(StCeloEvent::Rebalanced { from_group, to_group, amount });
        info!(
            "Rebalanced {} CELO from {} to {}",
            amount,
            hex::encode(from_group),
            hex::encode(to_group)
        );
        Ok(amount)
    }

    /// Follow a health change of a pinned group. Returns the stCELO moved.
    pub fn rebalance_when_health_changed(&mut self, group: Address) -> StCeloResult<u128> {
        let rate = self.exchange_rate();
        let chain = &self.chain;
        let account = &self.state.account;
        let moved = self.state.specific.rebalance_when_health_changed(
            &mut self.state.default,
            &self.health,
            &rate,
            group,
            |g: &Address| receivable_votes(chain, account, g),
        )?;

        let (to_overflow, from_overflow) = match moved.direction {
            OverflowDirection::IntoOverflow => (moved.st_celo, 0),
            OverflowDirection::OutOfOverflow => (0, moved.st_celo),
        };
        let st_celo = moved.st_celo;
        self.apply_overflow_move(moved)?;
        self.events.emit(StCeloEvent::HealthRebalanced { group, to_overflow, from_overflow });
        Ok(st_celo)
    }

    /// Bring overflow of `group` back from the pooled group `from_group`. Returns the CELO moved.
    pub fn rebalance_overflow(&mut self, group: Address, from_group: Address) -> StCeloResult<u128> {
        let rate = self.exchange_rate();
        let chain = &self.chain;
        let account = &self.state.account;
        let moved = self.state.specific.rebalance_overflow(
            &mut self.state.default,
            &self.health,
            &rate,
            group,
            from_group,
            |g: &Address| receivable_votes(chain, account, g),
        )?;

        let amount = moved.transfer.to.total();
        self.apply_overflow_move(moved)?;
        self.events.emit(StCeloEvent::OverflowRebalanced { specific_group: group, from_group, amount });
        Ok(amount)
    }

    // ============ Group Lifecycle ============

    pub fn activate_group(&mut self, caller: Address, group: Address, hints: SortHints) -> StCeloResult<()> {
        self.state.ownable.ensure_owner(&caller)?;
        let mut other_slots = self.state.specific.allowed_groups();
        other_slots.extend(self.state.specific.specific_groups());
        self.ensure_slot_cap(&group)?;

        self.state.default.activate_group(
            &self.health,
            &self.chain,
            &self.state.account.address(),
            group,
            hints,
            &other_slots,
        )?;
        self.events.emit(StCeloEvent::GroupActivated { group });
        Ok(())
    }

    pub fn deprecate_group(&mut self, caller: Address, group: Address) -> StCeloResult<DeprecationOutcome> {
        self.state.ownable.ensure_owner(&caller)?;
        self.deprecate(group)
    }

    /// Permissionless deprecation of a group the health oracle rejects
    pub fn deprecate_unhealthy_group(&mut self, group: Address) -> StCeloResult<DeprecationOutcome> {
        if self.health.is_valid_group(&group) {
            return Err(StCeloError::HealthyGroup { group });
        }
        self.deprecate(group)
    }

    pub fn allow_strategy(&mut self, caller: Address, group: Address) -> StCeloResult<()> {
        self.state.ownable.ensure_owner(&caller)?;
        let mut other_slots = self.state.default.get_groups();
        other_slots.extend(self.state.default.deprecated_groups().iter().copied());
        self.ensure_slot_cap(&group)?;

        self.state.specific.allow_strategy(
            &self.health,
            &self.chain,
            &self.state.account.address(),
            group,
            &other_slots,
        )?;
        self.events.emit(StCeloEvent::StrategyAllowed { group });
        Ok(())
    }

    pub fn block_strategy(&mut self, caller: Address, group: Address) -> StCeloResult<()> {
        self.state.ownable.ensure_owner(&caller)?;
        let rate = self.exchange_rate();
        let chain = &self.chain;
        let account = &self.state.account;
        let moved = self.state.specific.block_strategy(&mut self.state.default, &rate, group, |g: &Address| {
            receivable_votes(chain, account, g)
        })?;

        if let Some(moved) = moved {
            self.apply_overflow_move(moved)?;
        }
        self.events.emit(StCeloEvent::StrategyBlocked { group });
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> StCeloResult<()> {
        let previous = self.state.ownable.transfer_ownership(&caller, new_owner)?;
        self.events.emit(StCeloEvent::OwnershipTransferred { previous, new_owner });
        Ok(())
    }

    // ============ Account Operations ============

    pub fn activate_and_vote(
        &mut self,
        group: Address,
        vote_hints: SortHints,
        revoke_hints: RevokeHints,
    ) -> StCeloResult<ActivationResult> {
        let result = self.state.account.activate_and_vote(&mut self.chain, group, vote_hints, revoke_hints)?;

        if result.revoked_pending > 0 || result.revoked_active > 0 {
            self.events.emit(StCeloEvent::VotesRevoked {
                group,
                pending: result.revoked_pending,
                active: result.revoked_active,
            });
        }
        if result.activated > 0 {
            self.events.emit(StCeloEvent::VotesActivated { group, amount: result.activated });
        }
        if result.voted > 0 {
            self.events.emit(StCeloEvent::VotesCast { group, amount: result.voted });
        }
        Ok(result)
    }

    pub fn withdraw_from_group(
        &mut self,
        beneficiary: Address,
        group: Address,
        hints: RevokeHints,
    ) -> StCeloResult<WithdrawalResult> {
        let result = self.state.account.withdraw(&mut self.chain, beneficiary, group, hints)?;

        if result.immediate > 0 {
            self.events.emit(StCeloEvent::CeloReturned { beneficiary, group, value: result.immediate });
        }
        if result.revoked_pending > 0 || result.revoked_active > 0 {
            self.events.emit(StCeloEvent::VotesRevoked {
                group,
                pending: result.revoked_pending,
                active: result.revoked_active,
            });
        }
        if let Some(unlock_timestamp) = result.unlock_timestamp {
            self.events.emit(StCeloEvent::PendingWithdrawalQueued {
                beneficiary,
                group,
                value: result.unlocking,
                unlock_timestamp,
            });
        }
        Ok(result)
    }

    pub fn finish_pending_withdrawal(
        &mut self,
        beneficiary: Address,
        index: usize,
        underlying_index: usize,
    ) -> StCeloResult<u128> {
        let value = self
            .state
            .account
            .finish_pending_withdrawal(&mut self.chain, beneficiary, index, underlying_index)?;
        self.events.emit(StCeloEvent::PendingWithdrawalFinished { beneficiary, value });
        Ok(value)
    }

    // ============ Internals ============

    fn deposit_into_strategy(
        &mut self,
        strategy: Strategy,
        rate: &ExchangeRate,
        celo: u128,
        st_celo: u128,
    ) -> StCeloResult<Distribution> {
        let chain = &self.chain;
        let account = &self.state.account;
        let receivable = |g: &Address| receivable_votes(chain, account, g);
        let distribution = match strategy {
            Strategy::Default => self
                .state
                .default
                .generate_deposit_vote_distribution(rate, celo, st_celo, None, receivable)?,
            Strategy::Specific(group) => self.state.specific.generate_deposit_vote_distribution(
                &mut self.state.default,
                &self.health,
                rate,
                group,
                celo,
                st_celo,
                receivable,
            )?,
        };
        debug!("distribution for {} CELO: {:?}", celo, distribution.votes);
        Ok(distribution)
    }

    fn withdraw_from_strategy(&mut self, strategy: Strategy, st_celo: u128, celo: u128) -> StCeloResult<StrategyWithdrawal> {
        let withdrawal = match strategy {
            Strategy::Default => self.state.default.calculate_and_update_for_withdrawal(st_celo, celo)?,
            Strategy::Specific(group) => {
                self.state
                    .specific
                    .calculate_and_update_for_withdrawal(&mut self.state.default, group, st_celo, celo)?
            }
        };
        self.emit_removed(&withdrawal.purged);
        Ok(withdrawal)
    }

    /// Move `st_celo` of stake between strategies, returning the CELO moved
    fn move_stake(&mut self, from: Strategy, to: Strategy, st_celo: u128) -> StCeloResult<u128> {
        if from == to || st_celo == 0 {
            return Ok(0);
        }
        let rate = self.exchange_rate();
        let celo = rate.to_celo(st_celo)?;

        let withdrawal = self.withdraw_from_strategy(from, st_celo, celo)?;
        let to = self.deposit_into_strategy(to, &rate, celo, st_celo)?;
        self.schedule_transfer(StrategyTransfer { from: withdrawal.distribution, to })?;
        Ok(celo)
    }

    /// Fall back to the default strategy if the depositor's pinned group was blocked
    fn settle_blocked_strategy(&mut self, depositor: Address) -> StCeloResult<()> {
        let current = self.state.strategy_of(&depositor);
        let Strategy::Specific(group) = current else {
            return Ok(());
        };
        if self.state.specific.is_allowed(&group) {
            return Ok(());
        }

        let balance = self.state.token.balance_of(&depositor);
        let celo_moved = self.move_stake(current, Strategy::Default, balance)?;
        self.state.set_strategy(depositor, Strategy::Default);
        self.events.emit(StCeloEvent::StrategyChanged {
            depositor,
            from: current,
            to: Strategy::Default,
            celo_moved,
        });
        info!("Reset blocked strategy {} of {}", hex::encode(group), hex::encode(depositor));
        Ok(())
    }

    fn apply_overflow_move(&mut self, moved: OverflowMove) -> StCeloResult<()> {
        self.emit_removed(&moved.purged);
        self.schedule_transfer(moved.transfer)
    }

    fn schedule_transfer(&mut self, transfer: StrategyTransfer) -> StCeloResult<()> {
        if transfer.is_empty() {
            return Ok(());
        }
        let StrategyTransfer { from, to } = transfer;
        self.state
            .account
            .schedule_transfer(&self.chain, &from.groups, &from.votes, &to.groups, &to.votes)?;
        self.events.emit(StCeloEvent::TransferScheduled {
            from_groups: from.groups,
            from_votes: from.votes,
            to_groups: to.groups,
            to_votes: to.votes,
        });
        Ok(())
    }

    fn deprecate(&mut self, group: Address) -> StCeloResult<DeprecationOutcome> {
        let outcome = self.state.default.deprecate_group(group)?;
        match outcome {
            DeprecationOutcome::Deprecated => self.events.emit(StCeloEvent::GroupDeprecated { group }),
            DeprecationOutcome::Removed => self.events.emit(StCeloEvent::GroupRemoved { group }),
        }
        Ok(outcome)
    }

    fn emit_removed(&mut self, purged: &[Address]) {
        for group in purged {
            self.events.emit(StCeloEvent::GroupRemoved { group: *group });
        }
    }

    /// Apply the configured cap on vote slots, if any
    fn ensure_slot_cap(&self, group: &Address) -> StCeloResult<()> {
        let Some(max) = self.state.config.max_groups_voted_for else {
            return Ok(());
        };
        let max = max as usize;
        let slots = self.state.vote_slots(&self.chain);
        if !slots.contains(group) && slots.len() >= max {
            return Err(StCeloError::MaxGroupsVotedForReached { max });
        }
        Ok(())
    }
}

impl<C: CeloChain> ManagerContext<C, GroupHealthRegistry> {
    /// Record `group`'s validity for the current epoch
    pub fn update_group_health(&mut self, caller: Address, group: Address, valid: bool) -> StCeloResult<()> {
        self.state.ownable.ensure_owner(&caller)?;
        let epoch = self.chain.epoch_number();
        self.health.update_group_health(group, valid, epoch)?;
        self.events.emit(StCeloEvent::GroupHealthUpdated { group, valid, epoch });
        Ok(())
    }
}

