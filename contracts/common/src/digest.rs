//! State Digests
//!
//! SHA-256 over the borsh encoding of a component's state. Two components
//! with equal digests hold byte-identical ledgers.

use crate::errors::{StCeloError, StCeloResult};
use borsh::BorshSerialize;
use sha2::{Digest, Sha256};

/// SHA-256 commitment of `state`'s borsh encoding
pub fn state_digest<T: BorshSerialize>(state: &T) -> StCeloResult<[u8; 32]> {
    let bytes = borsh::to_vec(state).map_err(|_| StCeloError::Serialization)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}
