//! Contract of the external liquidity engine, as consumed by the router.
//!
//! The engine owns pricing, tick-crossing and fee accrual; the router only
//! relies on atomic batch execution plus a handful of point-in-time reads.
//! Each read is an independent snapshot with no cross-read consistency
//! guarantee.

use async_trait::async_trait;
use starknet::core::types::{Felt, U256};

use crate::actions::ActionBatch;
use crate::error::RouterError;
use crate::pool::{PoolId, PoolKey};
use crate::utils::Address;

pub type TxHash = Felt;

#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub tx_hash: TxHash,
    /// Id assigned by a `MintPosition` action, if the batch contained one.
    pub position_id: Option<u64>,
    /// Tick reported by an `Initialize` action, if the batch contained one.
    pub tick_after: Option<i32>,
}

/// Price/tick/fee read, one engine call.
#[derive(Debug, Clone)]
pub struct PoolSlot {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub protocol_fee: u32,
    pub lp_fee: u32,
}

/// Per-position read. Bounds are fixed for the life of the position.
#[derive(Debug, Clone, Copy)]
pub struct PositionSnapshot {
    pub liquidity: u128,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

#[async_trait]
pub trait LiquidityEngine: Send + Sync {
    /// Executes the batch as one indivisible unit. A tripped slippage
    /// guard, an expired deadline or insufficient batch funding fails the
    /// whole batch with no partial effect; the failure is surfaced as
    /// [`RouterError::Engine`] and must not be retried.
    async fn execute_batch(&self, batch: &ActionBatch) -> Result<BatchReceipt, RouterError>;

    async fn pool_slot(&self, pool_id: PoolId) -> Result<PoolSlot, RouterError>;

    /// Total liquidity active at the current tick.
    async fn pool_liquidity(&self, pool_id: PoolId) -> Result<u128, RouterError>;

    /// Global cumulative fee-growth accumulators for each asset.
    async fn pool_fee_growth(&self, pool_id: PoolId) -> Result<(U256, U256), RouterError>;

    /// [`RouterError::NotFound`] for never-minted or burned ids.
    async fn position_state(&self, position_id: u64) -> Result<PositionSnapshot, RouterError>;

    async fn position_pool_key(&self, position_id: u64) -> Result<PoolKey, RouterError>;

    /// Monotonically increasing; the next id a mint would assign.
    async fn next_position_id(&self) -> Result<u64, RouterError>;

    /// Ownership-registry lookup. [`RouterError::NotFound`] for ids that
    /// were never assigned or have been burned, distinguished in the
    /// message where the transport can tell them apart.
    async fn owner_of(&self, position_id: u64) -> Result<Address, RouterError>;
}
