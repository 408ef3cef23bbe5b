//! stCELO Manager
//!
//! Entry point of the liquid-staking protocol. The Manager prices deposits
//! and withdrawals, asks the depositor's strategy where the stake goes and
//! records the outcome on the Account ledger. It is the only component that
//! talks to more than one of the others.
//!
//! ## Core Operations
//!
//! - **deposit / withdraw**: mint or burn stCELO at the current rate and
//!   schedule the matching votes or withdrawals
//! - **change_strategy / transfer**: move attributed stake between strategies
//! - **rebalance**: permissionless repair of drift between expected and real
//!   per-group CELO
//! - **activate_group / deprecate_group / allow_strategy / block_strategy**:
//!   owner-gated group lifecycle
//! - **activate_and_vote / withdraw_from_group / finish_pending_withdrawal**:
//!   permissionless realisation of the account's schedule
//!
//! ## Atomicity
//!
//! Every operation runs on a [`ManagerContext`] holding copies of the state,
//! the chain and the health oracle. The copies replace the live ones only
//! when the operation returns `Ok`; events are appended at the same time.

use tracing::warn;

use stcelo_account::{Account, ActivationResult, WithdrawalResult};
use stcelo_common::{
    chain::CeloChain,
    errors::StCeloResult,
    events::{EventLog, StCeloEvent},
    health::{GroupHealth, GroupHealthRegistry},
    math::ExchangeRate,
    types::{Address, GroupPartitions, GroupStatus, RevokeHints, SortHints, Strategy},
};
use stcelo_default_strategy::{DefaultStrategy, DeprecationOutcome};
use stcelo_specific_group_strategy::SpecificGroupStrategy;

pub mod config;
pub mod context;
pub mod state;

pub use config::ManagerConfig;
pub use context::ManagerContext;
pub use state::{receivable_votes, ManagerState};

/// The allocator together with the chain and health oracle it drives
#[derive(Debug)]
pub struct Manager<C, H> {
    state: ManagerState,
    chain: C,
    health: H,
    events: EventLog,
}

impl<C, H> Manager<C, H>
where
    C: CeloChain + Clone,
    H: GroupHealth + Clone,
{
    /// # Errors
    /// Returns the first configuration problem found by [`ManagerConfig::validate`].
    pub fn new(config: ManagerConfig, chain: C, health: H) -> StCeloResult<Self> {
        Ok(Self {
            state: ManagerState::new(config)?,
            chain,
            health,
            events: EventLog::new(),
        })
    }

    /// Run `op` on a copy of everything and commit it only on success
    fn transact<T>(&mut self, name: &str, op: impl FnOnce(&mut ManagerContext<C, H>) -> StCeloResult<T>) -> StCeloResult<T> {
        let mut ctx = ManagerContext {
            state: self.state.clone(),
            chain: self.chain.clone(),
            health: self.health.clone(),
            events: EventLog::new(),
        };
        match op(&mut ctx) {
            Ok(value) => {
                self.state = ctx.state;
                self.chain = ctx.chain;
                self.health = ctx.health;
                for event in ctx.events.into_events() {
                    self.events.emit(event);
                }
                Ok(value)
            }
            Err(err) => {
                warn!("{} rejected: {} ({})", name, err, err.code());
                Err(err)
            }
        }
    }

    // ============ Depositor Operations ============

    /// Deposit `celo` for `depositor`, returning the stCELO minted.
    ///
    /// # Errors
    /// - `ZeroAmount` for an empty deposit or one worth no stCELO
    /// - `NoVotableGroups` / `NotAbleToDistributeVotes` if the groups cannot take it
    /// - `StrategyNotAllowed` if a pinned group no longer accepts deposits
    pub fn deposit(&mut self, depositor: Address, celo: u128) -> StCeloResult<u128> {
        self.transact("deposit", |ctx| ctx.deposit(depositor, celo))
    }

    /// Burn `st_celo` of `beneficiary`, returning the CELO scheduled for withdrawal.
    ///
    /// # Errors
    /// - `InsufficientBalance` if the beneficiary holds less stCELO
    /// - `CantWithdrawAccordingToStrategy` if the strategy holds less stake
    /// - `GroupNotBalancedOrNotEnoughStCelo` if a group lacks the real CELO for its share
    pub fn withdraw(&mut self, beneficiary: Address, st_celo: u128) -> StCeloResult<u128> {
        self.transact("withdraw", |ctx| ctx.withdraw(beneficiary, st_celo))
    }

    /// Move `depositor`'s stake to `strategy`, returning the CELO moved.
    ///
    /// # Errors
    /// `StrategyNotAllowed` / `GroupNotEligible` for a pinned group that
    /// cannot take stake.
    pub fn change_strategy(&mut self, depositor: Address, strategy: Strategy) -> StCeloResult<u128> {
        self.transact("change_strategy", |ctx| ctx.change_strategy(depositor, strategy))
    }

    pub fn transfer(&mut self, from: Address, to: Address, st_celo: u128) -> StCeloResult<()> {
        self.transact("transfer", |ctx| ctx.transfer(from, to, st_celo))
    }

    // ============ Repair Operations ============

    /// Move CELO from a group holding more than expected to one holding
    /// less, returning the amount.
    ///
    /// # Errors
    /// - `RebalanceNoExtraCelo` if `from_group` holds no more than expected
    /// - `RebalanceEnoughCelo` if `to_group` already holds what it should
    pub fn rebalance(&mut self, from_group: Address, to_group: Address) -> StCeloResult<u128> {
        self.transact("rebalance", |ctx| ctx.rebalance(from_group, to_group))
    }

    pub fn rebalance_when_health_changed(&mut self, group: Address) -> StCeloResult<u128> {
        self.transact("rebalance_when_health_changed", |ctx| ctx.rebalance_when_health_changed(group))
    }

    pub fn rebalance_overflow(&mut self, group: Address, from_group: Address) -> StCeloResult<u128> {
        self.transact("rebalance_overflow", |ctx| ctx.rebalance_overflow(group, from_group))
    }

    // ============ Group Lifecycle ============

    pub fn activate_group(&mut self, caller: Address, group: Address, hints: SortHints) -> StCeloResult<()> {
        self.transact("activate_group", |ctx| ctx.activate_group(caller, group, hints))
    }

    pub fn deprecate_group(&mut self, caller: Address, group: Address) -> StCeloResult<DeprecationOutcome> {
        self.transact("deprecate_group", |ctx| ctx.deprecate_group(caller, group))
    }

    /// # Errors
    /// Returns `HealthyGroup` while the health oracle still accepts the group.
    pub fn deprecate_unhealthy_group(&mut self, group: Address) -> StCeloResult<DeprecationOutcome> {
        self.transact("deprecate_unhealthy_group", |ctx| ctx.deprecate_unhealthy_group(group))
    }

    pub fn allow_strategy(&mut self, caller: Address, group: Address) -> StCeloResult<()> {
        self.transact("allow_strategy", |ctx| ctx.allow_strategy(caller, group))
    }

    pub fn block_strategy(&mut self, caller: Address, group: Address) -> StCeloResult<()> {
        self.transact("block_strategy", |ctx| ctx.block_strategy(caller, group))
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> StCeloResult<()> {
        self.transact("transfer_ownership", |ctx| ctx.transfer_ownership(caller, new_owner))
    }

    // ============ Account Operations ============

    pub fn activate_and_vote(
        &mut self,
        group: Address,
        vote_hints: SortHints,
        revoke_hints: RevokeHints,
    ) -> StCeloResult<ActivationResult> {
        self.transact("activate_and_vote", |ctx| ctx.activate_and_vote(group, vote_hints, revoke_hints))
    }

    pub fn withdraw_from_group(
        &mut self,
        beneficiary: Address,
        group: Address,
        hints: RevokeHints,
    ) -> StCeloResult<WithdrawalResult> {
        self.transact("withdraw_from_group", |ctx| ctx.withdraw_from_group(beneficiary, group, hints))
    }

    pub fn finish_pending_withdrawal(
        &mut self,
        beneficiary: Address,
        index: usize,
        underlying_index: usize,
    ) -> StCeloResult<u128> {
        self.transact("finish_pending_withdrawal", |ctx| {
            ctx.finish_pending_withdrawal(beneficiary, index, underlying_index)
        })
    }

    // ============ Views ============

    pub fn exchange_rate(&self) -> ExchangeRate {
        self.state.exchange_rate(&self.chain)
    }

    pub fn to_celo(&self, st_celo: u128) -> StCeloResult<u128> {
        self.exchange_rate().to_celo(st_celo)
    }

    pub fn to_staked_celo(&self, celo: u128) -> StCeloResult<u128> {
        self.exchange_rate().to_staked_celo(celo)
    }

    /// `(expected, real)` CELO of `group`
    pub fn get_expected_and_real_celo_for_group(&self, group: &Address) -> StCeloResult<(u128, u128)> {
        self.state.expected_and_real_celo_for_group(&self.chain, group)
    }

    pub fn get_all_groups(&self) -> GroupPartitions {
        self.state.all_groups()
    }

    pub fn group_status(&self, group: &Address) -> GroupStatus {
        self.state.group_status(group)
    }

    pub fn get_receivable_votes_for_group(&self, group: &Address) -> u128 {
        self.state.receivable_votes(&self.chain, group)
    }

    /// Hints for [`Self::activate_and_vote`] computed from the chain's ordering
    pub fn activation_hints(&self, group: &Address) -> (SortHints, RevokeHints) {
        self.state.activation_hints(&self.chain, group)
    }

    /// Chain unlocking entry backing `beneficiary`'s pending withdrawal at `index`
    pub fn find_underlying_index(&self, beneficiary: &Address, index: usize) -> Option<usize> {
        self.state.account.find_underlying_index(&self.chain, beneficiary, index)
    }

    pub fn strategy_of(&self, depositor: &Address) -> Strategy {
        self.state.strategy_of(depositor)
    }

    pub fn balance_of(&self, owner: &Address) -> u128 {
        self.state.token.balance_of(owner)
    }

    pub fn total_supply(&self) -> u128 {
        self.state.token.total_supply()
    }

    pub fn total_celo(&self) -> u128 {
        self.state.account.get_total_celo(&self.chain)
    }

    pub fn owner(&self) -> Address {
        self.state.ownable.owner()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.state.config
    }

    pub fn account(&self) -> &Account {
        &self.state.account
    }

    pub fn default_strategy(&self) -> &DefaultStrategy {
        &self.state.default
    }

    pub fn specific_strategy(&self) -> &SpecificGroupStrategy {
        &self.state.specific
    }

    pub fn state(&self) -> &ManagerState {
        &self.state
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// The host chain moves on by itself (epochs, rewards, other voters)
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    pub fn health(&self) -> &H {
        &self.health
    }

    pub fn events(&self) -> &[StCeloEvent] {
        self.events.events()
    }

    /// SHA-256 commitment of all ledgers
    pub fn digest(&self) -> StCeloResult<[u8; 32]> {
        self.state.digest()
    }
}

impl<C> Manager<C, GroupHealthRegistry>
where
    C: CeloChain + Clone,
{
    /// Owner-gated health update for the current chain epoch.
    ///
    /// # Errors
    /// Returns `HealthAlreadyUpdated` on a second update of a group within one epoch.
    pub fn update_group_health(&mut self, caller: Address, group: Address, valid: bool) -> StCeloResult<()> {
        self.transact("update_group_health", |ctx| ctx.update_group_health(caller, group, valid))
    }
}
