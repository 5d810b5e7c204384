//! Caller-facing facade: the five lifecycle verbs plus state reads and the
//! bounded ownership scan. Stateless; every operation is one validation
//! pass, one composed batch, one engine submission. Engine failures
//! propagate unchanged, with no retries and no partial recovery.

use starknet::core::types::{Felt, U256};

use crate::actions::{
    plan_close, plan_create_pool, plan_decrease, plan_increase, plan_mint,
};
use crate::engine::{LiquidityEngine, TxHash};
use crate::error::RouterError;
use crate::pool::{PoolId, PoolKey, PoolParams, PoolState, PositionInfo};
use crate::tick_math::usable_bounds;
use crate::utils::Address;

#[derive(Debug, Clone)]
pub struct MintRequest {
    pub params: PoolParams,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    /// Maximum spend of `params.asset_a` / `params.asset_b`. Mapped onto
    /// the canonical asset order internally, so the caller never has to
    /// know which side sorts first.
    pub amount_a_max: u128,
    pub amount_b_max: u128,
    pub recipient: Address,
    pub payer: Address,
    /// Unix seconds, shared by every action in the batch.
    pub deadline: u64,
}

#[derive(Debug, Clone)]
pub struct MintResult {
    pub position_id: u64,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone)]
pub struct IncreaseRequest {
    pub position_id: u64,
    pub liquidity: u128,
    /// Maxima in canonical asset order of the position's pool.
    pub amount0_max: u128,
    pub amount1_max: u128,
    pub payer: Address,
    pub deadline: u64,
}

#[derive(Debug, Clone)]
pub struct DecreaseRequest {
    pub position_id: u64,
    pub liquidity: u128,
    /// Minima in canonical asset order of the position's pool.
    pub amount0_min: u128,
    pub amount1_min: u128,
    pub recipient: Address,
    pub deadline: u64,
}

#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub position_id: u64,
    pub amount0_min: u128,
    pub amount1_min: u128,
    pub recipient: Address,
    pub deadline: u64,
}

#[derive(Debug, Clone)]
pub struct CreatePoolResult {
    pub pool_id: PoolId,
    pub tick: i32,
    pub tx_hash: TxHash,
}

pub struct PositionRouter<E: LiquidityEngine> {
    engine: E,
}

impl<E: LiquidityEngine> PositionRouter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn create_pool(
        &self,
        params: &PoolParams,
        sqrt_price_x96: U256,
        deadline: u64,
    ) -> Result<CreatePoolResult, RouterError> {
        check_deadline(deadline)?;
        let key = PoolKey::from_params(params)?;
        let batch = plan_create_pool(&key, sqrt_price_x96, deadline);
        let receipt = self.engine.execute_batch(&batch).await?;
        let tick = receipt
            .tick_after
            .ok_or_else(|| RouterError::Rpc("engine did not report the initial tick".to_string()))?;
        Ok(CreatePoolResult {
            pool_id: key.pool_id(),
            tick,
            tx_hash: receipt.tx_hash,
        })
    }

    pub async fn mint(&self, request: &MintRequest) -> Result<MintResult, RouterError> {
        check_deadline(request.deadline)?;
        check_nonzero_address(request.recipient, "recipient")?;
        check_nonzero_address(request.payer, "payer")?;
        check_liquidity(request.liquidity)?;
        let key = PoolKey::from_params(&request.params)?;
        check_bounds(&key, request.tick_lower, request.tick_upper)?;
        // Maxima follow the caller's asset order; realign them with the
        // canonical key when normalization swapped the pair.
        let (amount0_max, amount1_max) = if key.asset0 == request.params.asset_a {
            (request.amount_a_max, request.amount_b_max)
        } else {
            (request.amount_b_max, request.amount_a_max)
        };
        let batch = plan_mint(
            &key,
            request.tick_lower,
            request.tick_upper,
            request.liquidity,
            amount0_max,
            amount1_max,
            request.recipient,
            request.payer,
            request.deadline,
        );
        let receipt = self.engine.execute_batch(&batch).await?;
        let position_id = receipt.position_id.ok_or_else(|| {
            RouterError::Rpc("engine did not report a minted position id".to_string())
        })?;
        Ok(MintResult {
            position_id,
            tx_hash: receipt.tx_hash,
        })
    }

    pub async fn increase(&self, request: &IncreaseRequest) -> Result<TxHash, RouterError> {
        check_deadline(request.deadline)?;
        check_nonzero_address(request.payer, "payer")?;
        check_liquidity(request.liquidity)?;
        let key = self.engine.position_pool_key(request.position_id).await?;
        let batch = plan_increase(
            &key,
            request.position_id,
            request.liquidity,
            request.amount0_max,
            request.amount1_max,
            request.payer,
            request.deadline,
        );
        let receipt = self.engine.execute_batch(&batch).await?;
        Ok(receipt.tx_hash)
    }

    pub async fn decrease(&self, request: &DecreaseRequest) -> Result<TxHash, RouterError> {
        check_deadline(request.deadline)?;
        check_nonzero_address(request.recipient, "recipient")?;
        check_liquidity(request.liquidity)?;
        let key = self.engine.position_pool_key(request.position_id).await?;
        let batch = plan_decrease(
            &key,
            request.position_id,
            request.liquidity,
            request.amount0_min,
            request.amount1_min,
            request.recipient,
            request.deadline,
        );
        let receipt = self.engine.execute_batch(&batch).await?;
        Ok(receipt.tx_hash)
    }

    pub async fn close(&self, request: &CloseRequest) -> Result<TxHash, RouterError> {
        check_deadline(request.deadline)?;
        check_nonzero_address(request.recipient, "recipient")?;
        let key = self.engine.position_pool_key(request.position_id).await?;
        let batch = plan_close(
            &key,
            request.position_id,
            request.amount0_min,
            request.amount1_min,
            request.recipient,
            request.deadline,
        );
        let receipt = self.engine.execute_batch(&batch).await?;
        Ok(receipt.tx_hash)
    }

    /// Four independent point-in-time reads, joined for display. Not
    /// transactionally consistent across a concurrent mutation; do not
    /// make settlement decisions from this snapshot.
    pub async fn get_pool_state(&self, params: &PoolParams) -> Result<PoolState, RouterError> {
        let key = PoolKey::from_params(params)?;
        let pool_id = key.pool_id();
        let slot = self.engine.pool_slot(pool_id).await?;
        let liquidity = self.engine.pool_liquidity(pool_id).await?;
        let (fee_growth_global_0, fee_growth_global_1) =
            self.engine.pool_fee_growth(pool_id).await?;
        Ok(PoolState {
            pool_id,
            sqrt_price_x96: slot.sqrt_price_x96,
            tick: slot.tick,
            protocol_fee: slot.protocol_fee,
            lp_fee: slot.lp_fee,
            liquidity,
            fee_growth_global_0,
            fee_growth_global_1,
        })
    }

    /// `NotFound` if the id was never minted or has been burned.
    pub async fn get_position(&self, position_id: u64) -> Result<PositionInfo, RouterError> {
        let snapshot = self.engine.position_state(position_id).await?;
        let key = self.engine.position_pool_key(position_id).await?;
        let pool_id = key.pool_id();
        let slot = self.engine.pool_slot(pool_id).await?;
        let (fee_growth_global_0, fee_growth_global_1) =
            self.engine.pool_fee_growth(pool_id).await?;
        Ok(PositionInfo {
            position_id,
            liquidity: snapshot.liquidity,
            tick_lower: snapshot.tick_lower,
            tick_upper: snapshot.tick_upper,
            pool_sqrt_price_x96: slot.sqrt_price_x96,
            pool_tick: slot.tick,
            pool_fee_growth_global_0: fee_growth_global_0,
            pool_fee_growth_global_1: fee_growth_global_1,
        })
    }

    /// Bounded linear probe over `start_id .. start_id + max_scan`, capped
    /// at the next unassigned id. Ownership lookups that fail with
    /// `NotFound` (never minted, already burned) are skipped, not fatal.
    /// Cost is proportional to the window, so callers paginate by advancing
    /// `start_id`; a window past the assigned range yields an empty result.
    pub async fn list_owned(
        &self,
        owner: Address,
        start_id: u64,
        max_scan: u64,
    ) -> Result<Vec<u64>, RouterError> {
        let next_id = self.engine.next_position_id().await?;
        let end = start_id.saturating_add(max_scan).min(next_id);
        let mut owned = Vec::new();
        for position_id in start_id..end {
            match self.engine.owner_of(position_id).await {
                Ok(holder) if holder == owner => owned.push(position_id),
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(owned)
    }
}

fn check_deadline(deadline: u64) -> Result<(), RouterError> {
    if deadline == 0 {
        return Err(RouterError::InvalidArgument("deadline is zero".to_string()));
    }
    Ok(())
}

fn check_liquidity(liquidity: u128) -> Result<(), RouterError> {
    if liquidity == 0 {
        return Err(RouterError::InvalidArgument(
            "liquidity delta is zero".to_string(),
        ));
    }
    Ok(())
}

fn check_nonzero_address(address: Address, what: &str) -> Result<(), RouterError> {
    if address == Felt::ZERO {
        return Err(RouterError::InvalidArgument(format!("{what} is zero")));
    }
    Ok(())
}

fn check_bounds(key: &PoolKey, tick_lower: i32, tick_upper: i32) -> Result<(), RouterError> {
    if tick_lower >= tick_upper {
        return Err(RouterError::InvalidArgument(format!(
            "tick bounds out of order: {tick_lower} >= {tick_upper}"
        )));
    }
    let (min_usable, max_usable) = usable_bounds(key.tick_spacing)?;
    if tick_lower < min_usable || tick_upper > max_usable {
        return Err(RouterError::InvalidArgument(
            "tick bounds outside usable range".to_string(),
        ));
    }
    if tick_lower % key.tick_spacing != 0 || tick_upper % key.tick_spacing != 0 {
        return Err(RouterError::InvalidArgument(
            "tick bounds not aligned to spacing".to_string(),
        ));
    }
    Ok(())
}
