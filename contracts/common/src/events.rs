//! Protocol Events for stCELO
//!
//! Events are emitted during execution and can be indexed off-chain for
//! building UIs, analytics and audit trails of the allocation engine.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use crate::types::{Address, Strategy};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Depositor Events (0x01 - 0x1F)
    Deposited = 0x01,
    Withdrawn = 0x02,
    StrategyChanged = 0x03,
    TokenTransferred = 0x04,

    // Account Ledger Events (0x20 - 0x3F)
    VotesScheduled = 0x20,
    WithdrawalsScheduled = 0x21,
    TransferScheduled = 0x22,
    VotesRevoked = 0x23,
    VotesCast = 0x24,
    VotesActivated = 0x25,
    PendingWithdrawalQueued = 0x26,
    PendingWithdrawalFinished = 0x27,
    CeloReturned = 0x28,

    // Group Lifecycle Events (0x40 - 0x5F)
    GroupActivated = 0x40,
    GroupDeprecated = 0x41,
    GroupRemoved = 0x42,
    StrategyAllowed = 0x43,
    StrategyBlocked = 0x44,
    GroupHealthUpdated = 0x45,

    // Repair Events (0x60 - 0x7F)
    Rebalanced = 0x60,
    OverflowRebalanced = 0x61,
    HealthRebalanced = 0x62,

    // Protocol Events (0x80 - 0x9F)
    OwnershipTransferred = 0x80,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum StCeloEvent {
    // ============ Depositor Events ============

    /// Emitted when CELO is deposited and stCELO minted
    Deposited {
        depositor: Address,
        celo: u128,
        st_celo_minted: u128,
        strategy: Strategy,
    },

    /// Emitted when stCELO is burned for a scheduled CELO withdrawal
    Withdrawn {
        beneficiary: Address,
        st_celo_burned: u128,
        celo: u128,
        strategy: Strategy,
    },

    /// Emitted when a depositor changes strategy
    StrategyChanged {
        depositor: Address,
        from: Strategy,
        to: Strategy,
        celo_moved: u128,
    },

    /// Emitted on an stCELO transfer between depositors
    TokenTransferred {
        from: Address,
        to: Address,
        st_celo: u128,
    },

    // ============ Account Ledger Events ============

    /// Emitted when votes are scheduled for groups
    VotesScheduled {
        groups: Vec<Address>,
        votes: Vec<u128>,
    },

    /// Emitted when withdrawals are scheduled for a beneficiary
    WithdrawalsScheduled {
        beneficiary: Address,
        groups: Vec<Address>,
        amounts: Vec<u128>,
    },

    /// Emitted when attributed stake is scheduled to move between groups
    TransferScheduled {
        from_groups: Vec<Address>,
        from_votes: Vec<u128>,
        to_groups: Vec<Address>,
        to_votes: Vec<u128>,
    },

    /// Emitted when on-chain votes are revoked
    VotesRevoked {
        group: Address,
        pending: u128,
        active: u128,
    },

    /// Emitted when scheduled votes are cast on-chain
    VotesCast {
        group: Address,
        amount: u128,
    },

    /// Emitted when pending votes become active
    VotesActivated {
        group: Address,
        amount: u128,
    },

    /// Emitted when unlocked CELO is queued for a beneficiary
    PendingWithdrawalQueued {
        beneficiary: Address,
        group: Address,
        value: u128,
        unlock_timestamp: u64,
    },

    /// Emitted when a matured pending withdrawal is paid out
    PendingWithdrawalFinished {
        beneficiary: Address,
        value: u128,
    },

    /// Emitted when not-yet-voted CELO is returned immediately
    CeloReturned {
        beneficiary: Address,
        group: Address,
        value: u128,
    },

    // ============ Group Lifecycle Events ============

    /// Emitted when a group joins the default strategy's active set
    GroupActivated { group: Address },

    /// Emitted when a group leaves the active set but still holds stake
    GroupDeprecated { group: Address },

    /// Emitted when a group is purged from the default strategy
    GroupRemoved { group: Address },

    /// Emitted when a group is added to the specific-strategy allow-list
    StrategyAllowed { group: Address },

    /// Emitted when a group is removed from the specific-strategy allow-list
    StrategyBlocked { group: Address },

    /// Emitted when the health registry records a group's validity
    GroupHealthUpdated {
        group: Address,
        valid: bool,
        epoch: u64,
    },

    // ============ Repair Events ============

    /// Emitted when real votes are moved between groups to match expectations
    Rebalanced {
        from_group: Address,
        to_group: Address,
        amount: u128,
    },

    /// Emitted when overflow stake returns to its pinned group
    OverflowRebalanced {
        specific_group: Address,
        from_group: Address,
        amount: u128,
    },

    /// Emitted when a pinned group's stake is moved because its health changed
    HealthRebalanced {
        group: Address,
        to_overflow: u128,
        from_overflow: u128,
    },

    // ============ Protocol Events ============

    /// Emitted when ownership is handed over
    OwnershipTransferred {
        previous: Address,
        new_owner: Address,
    },
}

impl StCeloEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposited { .. } => EventType::Deposited,
            Self::Withdrawn { .. } => EventType::Withdrawn,
            Self::StrategyChanged { .. } => EventType::StrategyChanged,
            Self::TokenTransferred { .. } => EventType::TokenTransferred,
            Self::VotesScheduled { .. } => EventType::VotesScheduled,
            Self::WithdrawalsScheduled { .. } => EventType::WithdrawalsScheduled,
            Self::TransferScheduled { .. } => EventType::TransferScheduled,
            Self::VotesRevoked { .. } => EventType::VotesRevoked,
            Self::VotesCast { .. } => EventType::VotesCast,
            Self::VotesActivated { .. } => EventType::VotesActivated,
            Self::PendingWithdrawalQueued { .. } => EventType::PendingWithdrawalQueued,
            Self::PendingWithdrawalFinished { .. } => EventType::PendingWithdrawalFinished,
            Self::CeloReturned { .. } => EventType::CeloReturned,
            Self::GroupActivated { .. } => EventType::GroupActivated,
            Self::GroupDeprecated { .. } => EventType::GroupDeprecated,
            Self::GroupRemoved { .. } => EventType::GroupRemoved,
            Self::StrategyAllowed { .. } => EventType::StrategyAllowed,
            Self::StrategyBlocked { .. } => EventType::StrategyBlocked,
            Self::GroupHealthUpdated { .. } => EventType::GroupHealthUpdated,
            Self::Rebalanced { .. } => EventType::Rebalanced,
            Self::OverflowRebalanced { .. } => EventType::OverflowRebalanced,
            Self::HealthRebalanced { .. } => EventType::HealthRebalanced,
            Self::OwnershipTransferred { .. } => EventType::OwnershipTransferred,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting multiple events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<StCeloEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: StCeloEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[StCeloEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<StCeloEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&StCeloEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }
}
