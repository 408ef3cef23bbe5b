//! Mathematical Utilities for the stCELO Protocol
//!
//! Integer-only exchange-rate conversion and the capacity-aware even split
//! used to spread deposits over groups and drain withdrawals from them.
//!
//! Rounding rules:
//! - conversions round down (in favour of the protocol)
//! - even splits hand the integer remainder, one unit each, to the earliest
//!   items in fill order

#[cfg(not(feature = "std"))]
use alloc::vec;

use crate::errors::{StCeloError, StCeloResult};
use crate::Vec;

const LOW_MASK: u128 = u64::MAX as u128;

// ============ Wide Arithmetic ============

/// Full 256-bit product of two u128 values as `(hi, lo)`
pub fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // At most 3 * (2^64 - 1), no overflow
    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let lo = (p00 & LOW_MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// Divide a 256-bit value by `d`. `None` if the quotient does not fit in u128.
fn div_wide(hi: u128, lo: u128, d: u128) -> Option<u128> {
    if d == 0 || hi >= d {
        return None;
    }
    let mut rem = hi;
    let mut quot = 0u128;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    Some(quot)
}

/// `floor(a * b / d)` without intermediate overflow
pub fn mul_div(a: u128, b: u128, d: u128) -> StCeloResult<u128> {
    if d == 0 {
        return Err(StCeloError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }
    let (hi, lo) = widening_mul(a, b);
    div_wide(hi, lo, d).ok_or(StCeloError::Overflow)
}

// ============ Exchange Rate ============

/// CELO / stCELO totals used for conversion.
///
/// Build a fresh one right before converting; totals change with every
/// deposit, withdrawal and reward distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRate {
    pub total_celo: u128,
    pub total_st_celo: u128,
}

impl ExchangeRate {
    pub fn new(total_celo: u128, total_st_celo: u128) -> Self {
        Self { total_celo, total_st_celo }
    }

    fn is_degenerate(&self) -> bool {
        self.total_celo == 0 || self.total_st_celo == 0
    }

    /// stCELO owed for `celo`: `celo * total_st_celo / total_celo`, 1:1 when either total is zero
    pub fn to_staked_celo(&self, celo: u128) -> StCeloResult<u128> {
        if self.is_degenerate() {
            return Ok(celo);
        }
        mul_div(celo, self.total_st_celo, self.total_celo)
    }

    /// CELO owed for `st_celo`: `st_celo * total_celo / total_st_celo`, 1:1 when either total is zero
    pub fn to_celo(&self, st_celo: u128) -> StCeloResult<u128> {
        if self.is_degenerate() {
            return Ok(st_celo);
        }
        mul_div(st_celo, self.total_celo, self.total_st_celo)
    }
}

// ============ Even Split ============

/// Raise the lowest levels first until `budget` is spent.
///
/// Items are ordered by level, ties by input position. The integer
/// remainder goes one unit each to the earliest items in that order.
fn even_fill(budget: u128, levels: &[u128]) -> Vec<u128> {
    let n = levels.len();
    let mut fills = vec![0u128; n];
    if budget == 0 || n == 0 {
        return fills;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| levels[i]);

    // Work relative to the lowest level to keep products small
    let base = levels[order[0]];
    let rel = |i: usize| levels[i] - base;

    let mut k = n;
    let mut prefix = 0u128;
    for (pos, &idx) in order.iter().enumerate() {
        if pos > 0 {
            let cost = (pos as u128).saturating_mul(rel(idx)).saturating_sub(prefix);
            if cost >= budget {
                k = pos;
                break;
            }
        }
        prefix = prefix.saturating_add(rel(idx));
    }

    let pool = budget.saturating_add(prefix);
    let target = pool / k as u128;
    let remainder = (pool % k as u128) as usize;

    for (pos, &idx) in order.iter().take(k).enumerate() {
        let extra = if pos < remainder { 1 } else { 0 };
        fills[idx] = target - rel(idx) + extra;
    }
    fills
}

/// Split `amount` over items so the smallest `levels` are filled first,
/// never giving an item more than its `caps` entry.
///
/// Items whose cap is zero are skipped. Returns the per-item allocation in
/// input order, or `Err(undistributed)` when the caps cannot absorb `amount`.
pub fn distribute_evenly(amount: u128, levels: &[u128], caps: &[u128]) -> Result<Vec<u128>, u128> {
    let n = levels.len();
    let total_cap = caps.iter().fold(0u128, |acc, c| acc.saturating_add(*c));
    if total_cap < amount {
        return Err(amount - total_cap);
    }

    let mut alloc = vec![0u128; n];
    let mut fixed: Vec<bool> = caps.iter().map(|c| *c == 0).collect();
    let mut remaining = amount;

    while remaining > 0 {
        let active: Vec<usize> = (0..n).filter(|&i| !fixed[i]).collect();
        if active.is_empty() {
            return Err(remaining);
        }
        let active_levels: Vec<u128> = active.iter().map(|&i| levels[i]).collect();
        let fills = even_fill(remaining, &active_levels);

        let mut saturated = false;
        for (pos, &idx) in active.iter().enumerate() {
            if fills[pos] > caps[idx] {
                alloc[idx] = caps[idx];
                fixed[idx] = true;
                remaining -= caps[idx];
                saturated = true;
            }
        }
        if !saturated {
            for (pos, &idx) in active.iter().enumerate() {
                alloc[idx] = fills[pos];
            }
            remaining = 0;
        }
    }
    Ok(alloc)
}

/// Take `amount` from items so the largest `levels` are drained first,
/// never taking more than an item's `available` entry.
///
/// Ties are broken by input position; returns `Err(shortfall)` when the
/// items cannot cover `amount`.
pub fn drain_evenly(amount: u128, levels: &[u128], available: &[u128]) -> Result<Vec<u128>, u128> {
    let top = levels.iter().copied().max().unwrap_or(0);
    let inverted: Vec<u128> = levels.iter().map(|l| top - l).collect();
    distribute_evenly(amount, &inverted, available)
}

/// Split `total` in proportion to `weights`, rounding down and giving the
/// remainder one unit each to the earliest non-zero weights
pub fn split_proportionally(total: u128, weights: &[u128]) -> StCeloResult<Vec<u128>> {
    if total == 0 {
        return Ok(vec![0u128; weights.len()]);
    }
    let sum = weights
        .iter()
        .try_fold(0u128, |acc, w| acc.checked_add(*w))
        .ok_or(StCeloError::Overflow)?;
    if sum == 0 {
        return Err(StCeloError::DivisionByZero);
    }

    let mut parts = Vec::with_capacity(weights.len());
    let mut assigned = 0u128;
    for w in weights {
        let part = mul_div(total, *w, sum)?;
        assigned += part;
        parts.push(part);
    }

    let mut remainder = total - assigned;
    for (part, w) in parts.iter_mut().zip(weights) {
        if remainder == 0 {
            break;
        }
        if *w > 0 {
            *part += 1;
            remainder -= 1;
        }
    }
    Ok(parts)
}

// ============ Safe Arithmetic ============

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> StCeloResult<u128> {
    a.checked_add(b).ok_or(StCeloError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> StCeloResult<u128> {
    a.checked_sub(b).ok_or(StCeloError::Underflow)
}

/// Checked sum of a slice
pub fn safe_sum(values: &[u128]) -> StCeloResult<u128> {
    values.iter().try_fold(0u128, |acc, v| safe_add(acc, *v))
}
