//! stCELO Common Library
//!
//! Shared types, constants, and utilities for all stCELO contracts.
//! This crate is the foundation the Account ledger, both allocation
//! strategies and the Manager are built on.
//!
//! ## Contents
//!
//! - **Types**: group addresses, strategies, per-group distributions
//! - **Errors**: one typed error per named failure condition
//! - **Events**: structured protocol events collected in an [`EventLog`]
//! - **Math**: overflow-safe exchange-rate conversion and the capacity-aware
//!   even-split (water-filling) used for deposits and withdrawals
//! - **Chain**: the election / locked-gold / clock collaborator traits
//! - **Health**: group validity oracle with once-per-epoch updates
//! - **Token**: stCELO balances and supply
//! - **Access Control**: single-owner gating of privileged operations
//! - **Digest**: SHA-256 commitments over borsh-encoded state
//!
//! All amounts are integers (CELO and stCELO in 18-decimal base units).
//! No floating point is used anywhere.
//!
//! This crate is `no_std` compatible when built without the `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules and downstream crates based on feature
#[cfg(not(feature = "std"))]
pub use alloc::collections::{BTreeMap, BTreeSet};
#[cfg(not(feature = "std"))]
pub use alloc::vec::Vec;
#[cfg(feature = "std")]
pub use std::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "std")]
pub use std::vec::Vec;

pub mod constants;
pub mod errors;
pub mod types;
pub mod events;
pub mod math;
pub mod chain;
pub mod health;
pub mod token;
pub mod access_control;
pub mod digest;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use constants::ZERO_ADDRESS;
pub use errors::*;
pub use types::*;
pub use events::*;
pub use math::*;
pub use chain::*;
pub use health::*;
pub use token::*;
pub use access_control::*;
pub use digest::*;
