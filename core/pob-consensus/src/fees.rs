//! Gas limit and base-fee rules
//!
//! Before the fee-market fork the gas limit may drift by less than
//! `parent / 1024` per block and headers must not carry a base fee. From the
//! fork on, every header carries the base fee derived from its parent's usage.

use crate::errors::{ConsensusError, ConsensusResult};
use crate::types::{GAS_LIMIT_BOUND_DIVISOR, MAX_GAS_LIMIT, MIN_GAS_LIMIT};
use pob_state::{ChainConfig, Header};

/// Gas target is the limit divided by this
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Bounds the per-block base fee change to 1/8
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

/// Base fee of the first fee-market block
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// Gas cap, usage, limit drift and base fee of `header` against its real parent
pub fn verify_gas(config: &ChainConfig, parent: &Header, header: &Header) -> ConsensusResult<()> {
    if header.gas_limit > MAX_GAS_LIMIT {
        return Err(ConsensusError::InvalidGasLimit(format!(
            "have {}, max {}",
            header.gas_limit, MAX_GAS_LIMIT
        )));
    }
    if header.gas_used > header.gas_limit {
        return Err(ConsensusError::InvalidGasUsed {
            used: header.gas_used,
            limit: header.gas_limit,
        });
    }

    if !config.is_london(header.number) {
        if let Some(fee) = header.base_fee {
            return Err(ConsensusError::InvalidBaseFee(format!(
                "base fee {} before fork",
                fee
            )));
        }
        return verify_gas_limit(parent.gas_limit, header.gas_limit);
    }

    // The fork block doubles the limit to keep the target steady
    let parent_gas_limit = if config.is_london(parent.number) {
        parent.gas_limit
    } else {
        parent.gas_limit.saturating_mul(ELASTICITY_MULTIPLIER)
    };
    verify_gas_limit(parent_gas_limit, header.gas_limit)?;

    let fee = header
        .base_fee
        .ok_or_else(|| ConsensusError::InvalidBaseFee("header is missing base fee".to_string()))?;
    let expected = calc_base_fee(config, parent);
    if fee != expected {
        return Err(ConsensusError::InvalidBaseFee(format!(
            "have {}, want {}, parent base fee {:?}, parent gas used {}",
            fee, expected, parent.base_fee, parent.gas_used
        )));
    }
    Ok(())
}

/// The gas limit may move by strictly less than `parent / 1024`
pub fn verify_gas_limit(parent_gas_limit: u64, gas_limit: u64) -> ConsensusResult<()> {
    let diff = parent_gas_limit.abs_diff(gas_limit);
    let limit = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if diff >= limit {
        return Err(ConsensusError::InvalidGasLimit(format!(
            "have {}, want {} +-= {}",
            gas_limit,
            parent_gas_limit,
            limit.saturating_sub(1)
        )));
    }
    if gas_limit < MIN_GAS_LIMIT {
        return Err(ConsensusError::InvalidGasLimit(format!(
            "have {}, minimum {}",
            gas_limit, MIN_GAS_LIMIT
        )));
    }
    Ok(())
}

/// Base fee of the child of `parent`
pub fn calc_base_fee(config: &ChainConfig, parent: &Header) -> u64 {
    if !config.is_london(parent.number) {
        return INITIAL_BASE_FEE;
    }

    let current = parent.base_fee.unwrap_or(INITIAL_BASE_FEE);
    let target = parent.gas_limit / ELASTICITY_MULTIPLIER;
    if target == 0 || parent.gas_used == target {
        return current;
    }

    let denominator = target as u128 * BASE_FEE_CHANGE_DENOMINATOR as u128;
    if parent.gas_used > target {
        let excess = (parent.gas_used - target) as u128;
        // At least +1 above target
        let delta = (current as u128 * excess / denominator).max(1);
        current.saturating_add(delta.min(u64::MAX as u128) as u64)
    } else {
        let deficit = (target - parent.gas_used) as u128;
        let delta = current as u128 * deficit / denominator;
        current.saturating_sub(delta as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london_at(block: u64) -> ChainConfig {
        ChainConfig {
            london_block: Some(block),
            ..Default::default()
        }
    }

    fn parent(number: u64, gas_limit: u64, gas_used: u64, base_fee: Option<u64>) -> Header {
        Header {
            number,
            gas_limit,
            gas_used,
            base_fee,
            ..Default::default()
        }
    }

    #[test]
    fn test_gas_limit_bounds() {
        assert!(verify_gas_limit(10_240_000, 10_240_000).is_ok());
        assert!(verify_gas_limit(10_240_000, 10_240_000 + 9_999).is_ok());
        assert!(verify_gas_limit(10_240_000, 10_240_000 + 10_000).is_err());
        assert!(verify_gas_limit(10_240_000, 10_240_000 - 10_000).is_err());
        assert!(verify_gas_limit(4_000, 4_000).is_err());
    }

    #[test]
    fn test_gas_used_above_limit() {
        let p = parent(1, 8_000_000, 0, None);
        let h = Header {
            number: 2,
            gas_limit: 8_000_000,
            gas_used: 8_000_001,
            ..Default::default()
        };
        assert!(matches!(
            verify_gas(&ChainConfig::default(), &p, &h),
            Err(ConsensusError::InvalidGasUsed { .. })
        ));
    }

    #[test]
    fn test_gas_limit_cap() {
        let p = parent(1, MAX_GAS_LIMIT, 0, None);
        let h = Header {
            number: 2,
            gas_limit: MAX_GAS_LIMIT + 1,
            ..Default::default()
        };
        assert!(matches!(
            verify_gas(&ChainConfig::default(), &p, &h),
            Err(ConsensusError::InvalidGasLimit(_))
        ));
    }

    #[test]
    fn test_base_fee_forbidden_before_fork() {
        let p = parent(1, 8_000_000, 0, None);
        let h = Header {
            number: 2,
            gas_limit: 8_000_000,
            base_fee: Some(7),
            ..Default::default()
        };
        assert!(matches!(
            verify_gas(&ChainConfig::default(), &p, &h),
            Err(ConsensusError::InvalidBaseFee(_))
        ));
    }

    #[test]
    fn test_fork_block() {
        let config = london_at(2);
        let p = parent(1, 8_000_000, 0, None);
        let mut h = Header {
            number: 2,
            gas_limit: 16_000_000,
            ..Default::default()
        };
        assert!(verify_gas(&config, &p, &h).is_err());

        h.base_fee = Some(INITIAL_BASE_FEE);
        assert!(verify_gas(&config, &p, &h).is_ok());
    }

    #[test]
    fn test_base_fee_adjustment() {
        let config = london_at(0);
        let at_target = parent(5, 10_000_000, 5_000_000, Some(INITIAL_BASE_FEE));
        assert_eq!(calc_base_fee(&config, &at_target), INITIAL_BASE_FEE);

        let full = parent(5, 10_000_000, 10_000_000, Some(INITIAL_BASE_FEE));
        assert_eq!(calc_base_fee(&config, &full), INITIAL_BASE_FEE + INITIAL_BASE_FEE / 8);

        let empty = parent(5, 10_000_000, 0, Some(INITIAL_BASE_FEE));
        assert_eq!(calc_base_fee(&config, &empty), INITIAL_BASE_FEE - INITIAL_BASE_FEE / 8);

        // Tiny excess still moves the fee
        let nudge = parent(5, 10_000_000, 5_000_001, Some(8));
        assert_eq!(calc_base_fee(&config, &nudge), 9);
    }

    #[test]
    fn test_wrong_base_fee_rejected() {
        let config = london_at(0);
        let p = parent(5, 10_000_000, 10_000_000, Some(INITIAL_BASE_FEE));
        let mut h = Header {
            number: 6,
            gas_limit: 10_000_000,
            base_fee: Some(INITIAL_BASE_FEE),
            ..Default::default()
        };
        assert!(matches!(verify_gas(&config, &p, &h), Err(ConsensusError::InvalidBaseFee(_))));
        h.base_fee = Some(calc_base_fee(&config, &p));
        assert!(verify_gas(&config, &p, &h).is_ok());
    }
}
