//! Protocol Constants
//!
//! All magic numbers and configuration values for the stCELO protocol.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (three day unlocking period)
//! - Default (no feature) - Testnet values (short unlocking period for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! stcelo-common = { path = "...", features = ["mainnet"] }
//! ```

/// Token units
pub mod token {
    /// One unit with decimals (1 CELO = 10^18 base units)
    pub const ONE: u128 = 1_000_000_000_000_000_000;
}

/// Election parameters of the underlying chain
pub mod election {
    /// Maximum number of groups a single account may vote for.
    /// The chain value is authoritative; this is the default used when none is configured.
    pub const DEFAULT_MAX_GROUPS_VOTED_FOR: usize = 10;

    /// Epoch length in seconds (17280 blocks at 5s)
    pub const EPOCH_DURATION_SECS: u64 = 86_400;
}

/// Withdrawal and sizing limits
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod limits {
    /// Time between unlocking CELO and being able to withdraw it
    /// - Mainnet: 3 days
    /// - Testnet: 1 hour
    #[cfg(feature = "mainnet")]
    pub const UNLOCKING_PERIOD_SECS: u64 = 259_200;
    #[cfg(not(feature = "mainnet"))]
    pub const UNLOCKING_PERIOD_SECS: u64 = 3_600;

    /// Upper bound on groups in a single schedule call
    pub const MAX_GROUPS_PER_SCHEDULE: usize = 64;
}

/// The zero address, never a valid owner, account, group or beneficiary
pub const ZERO_ADDRESS: [u8; 20] = [0u8; 20];
