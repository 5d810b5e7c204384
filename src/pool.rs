use serde::{Deserialize, Serialize};
use starknet::core::types::{Felt, U256};
use starknet_crypto::poseidon_hash_many;

use crate::error::RouterError;
use crate::tick_math::usable_bounds;
use crate::utils::Address;

/// Sentinel identifier for the chain's native asset. Native amounts cannot
/// be pulled by allowance; they ride along as batch value.
pub const NATIVE_ASSET: Felt = Felt::ZERO;

/// Engine-native pool identifier, a Poseidon digest of the canonical key.
/// Opaque beyond equality and derivation.
pub type PoolId = Felt;

/// Caller-facing pool parameters. Asset order does not matter: the key
/// derivation normalizes it, so both orderings of one economic pool
/// resolve to the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    pub asset_a: Address,
    pub asset_b: Address,
    /// Fee tier, basis-points-like integer.
    pub fee: u32,
    pub tick_spacing: i32,
    /// Extension/hook identifier; `Felt::ZERO` means none.
    pub extension: Address,
}

/// Canonical pool key: assets sorted, spacing validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolKey {
    pub asset0: Address,
    pub asset1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub extension: Address,
}

impl PoolKey {
    pub fn from_params(params: &PoolParams) -> Result<Self, RouterError> {
        if params.asset_a == params.asset_b {
            return Err(RouterError::InvalidArgument(
                "pool assets must be distinct".to_string(),
            ));
        }
        usable_bounds(params.tick_spacing)?;
        let (asset0, asset1) = if params.asset_a < params.asset_b {
            (params.asset_a, params.asset_b)
        } else {
            (params.asset_b, params.asset_a)
        };
        Ok(Self {
            asset0,
            asset1,
            fee: params.fee,
            tick_spacing: params.tick_spacing,
            extension: params.extension,
        })
    }

    /// Deterministic, collision-resistant derivation: any field difference
    /// in the canonical key changes the id.
    pub fn pool_id(&self) -> PoolId {
        poseidon_hash_many(&[
            self.asset0,
            self.asset1,
            Felt::from(self.fee),
            Felt::from(self.tick_spacing as u64),
            self.extension,
        ])
    }
}

/// Point-in-time pool snapshot, re-derived from the engine at query time.
/// The component reads are independent, so the fields are display-grade,
/// not settlement-grade, across a concurrent mutation.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub pool_id: PoolId,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub protocol_fee: u32,
    pub lp_fee: u32,
    pub liquidity: u128,
    pub fee_growth_global_0: U256,
    pub fee_growth_global_1: U256,
}

/// Position snapshot joined with its pool's live state.
///
/// The fee-growth fields are the *pool-global* accumulators, not the amount
/// owed to this position; treating them as per-position earned fees is a
/// caller bug.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub position_id: u64,
    pub liquidity: u128,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub pool_sqrt_price_x96: U256,
    pub pool_tick: i32,
    pub pool_fee_growth_global_0: U256,
    pub pool_fee_growth_global_1: U256,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(asset_a: u64, asset_b: u64, fee: u32) -> PoolParams {
        PoolParams {
            asset_a: Felt::from(asset_a),
            asset_b: Felt::from(asset_b),
            fee,
            tick_spacing: 60,
            extension: Felt::ZERO,
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let key_a = PoolKey::from_params(&params(1, 2, 3000)).expect("key");
        let key_b = PoolKey::from_params(&params(1, 2, 3000)).expect("key");
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.pool_id(), key_b.pool_id());
    }

    #[test]
    fn asset_order_is_normalized() {
        let forward = PoolKey::from_params(&params(1, 2, 3000)).expect("key");
        let reversed = PoolKey::from_params(&params(2, 1, 3000)).expect("key");
        assert_eq!(forward, reversed);
        assert_eq!(forward.pool_id(), reversed.pool_id());
        assert!(forward.asset0 < forward.asset1);
    }

    #[test]
    fn field_differences_change_the_id() {
        let base = PoolKey::from_params(&params(1, 2, 3000)).expect("key");
        let other_fee = PoolKey::from_params(&params(1, 2, 500)).expect("key");
        let other_asset = PoolKey::from_params(&params(1, 3, 3000)).expect("key");
        let mut other_extension = params(1, 2, 3000);
        other_extension.extension = Felt::from(9u64);
        let other_extension = PoolKey::from_params(&other_extension).expect("key");
        assert_ne!(base.pool_id(), other_fee.pool_id());
        assert_ne!(base.pool_id(), other_asset.pool_id());
        assert_ne!(base.pool_id(), other_extension.pool_id());
    }

    #[test]
    fn identical_assets_are_rejected() {
        assert!(PoolKey::from_params(&params(7, 7, 3000)).is_err());
    }

    #[test]
    fn zero_spacing_is_rejected() {
        let mut bad = params(1, 2, 3000);
        bad.tick_spacing = 0;
        assert!(matches!(
            PoolKey::from_params(&bad),
            Err(RouterError::InvalidArgument(_))
        ));
    }
}
