//! In-memory liquidity engine honoring the batch contract: all-or-nothing
//! execution, deadline enforcement, per-batch scoped funding, and an
//! ownership registry that distinguishes never-minted from burned ids.
//!
//! Used by the integration tests and by consumers that want to dry-run
//! compositions offline. Prices are static between batches (no swaps), so
//! fee growth stays at its initialized value; everything the router reads
//! or submits is otherwise modeled faithfully.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use starknet::core::types::{Felt, U256};

use crate::actions::{Action, ActionBatch};
use crate::engine::{BatchReceipt, LiquidityEngine, PoolSlot, PositionSnapshot};
use crate::error::RouterError;
use crate::pool::{PoolId, PoolKey, NATIVE_ASSET};
use crate::tick_math::{sqrt_price_at_tick, tick_at_sqrt_price};
use crate::utils::{biguint_to_u256, u256_to_biguint, Address};

#[derive(Clone)]
struct SimPool {
    key: PoolKey,
    sqrt_price_x96: BigUint,
    tick: i32,
    /// Liquidity active at the current tick.
    liquidity: u128,
    fee_growth_global_0: BigUint,
    fee_growth_global_1: BigUint,
    protocol_fee: u32,
}

#[derive(Clone)]
struct SimPosition {
    pool_id: PoolId,
    owner: Address,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
}

#[derive(Clone)]
struct SimState {
    pools: HashMap<PoolId, SimPool>,
    positions: HashMap<u64, SimPosition>,
    burned: HashSet<u64>,
    next_position_id: u64,
    /// (asset, account) -> balance.
    balances: HashMap<(Address, Address), u128>,
    /// Logical clock compared against batch deadlines.
    now: u64,
    batch_nonce: u64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            pools: HashMap::new(),
            positions: HashMap::new(),
            burned: HashSet::new(),
            next_position_id: 1,
            balances: HashMap::new(),
            now: 0,
            batch_nonce: 0,
        }
    }
}

pub struct SimEngine {
    state: Mutex<SimState>,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn set_balance(&self, asset: Address, account: Address, amount: u128) {
        if let Ok(mut state) = self.state.lock() {
            state.balances.insert((asset, account), amount);
        }
    }

    pub fn balance_of(&self, asset: Address, account: Address) -> u128 {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.balances.get(&(asset, account)).copied())
            .unwrap_or(0)
    }

    pub fn advance_time(&self, seconds: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.now += seconds;
        }
    }

    pub fn now(&self) -> u64 {
        self.state.lock().map(|state| state.now).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimState>, RouterError> {
        self.state
            .lock()
            .map_err(|_| RouterError::Rpc("engine state poisoned".to_string()))
    }
}

/// Per-batch execution scratchpad: the scoped funding authorization plus
/// the settlement deltas accumulated by liquidity actions.
struct BatchCtx {
    payer: Address,
    funding_remaining: HashMap<Address, u128>,
    native_remaining: u128,
    pending_due: HashMap<Address, u128>,
    pending_credit: HashMap<Address, u128>,
    minted: Option<u64>,
    tick_after: Option<i32>,
}

#[async_trait]
impl LiquidityEngine for SimEngine {
    async fn execute_batch(&self, batch: &ActionBatch) -> Result<BatchReceipt, RouterError> {
        let mut state = self.lock()?;
        if state.now > batch.deadline {
            return Err(RouterError::Engine("deadline elapsed".to_string()));
        }
        // All-or-nothing: roll the whole state back on any failure.
        let snapshot = state.clone();
        match apply_batch(&mut state, batch) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                *state = snapshot;
                Err(err)
            }
        }
    }

    async fn pool_slot(&self, pool_id: PoolId) -> Result<PoolSlot, RouterError> {
        let state = self.lock()?;
        let pool = lookup_pool(&state, pool_id)?;
        Ok(PoolSlot {
            sqrt_price_x96: biguint_to_u256(&pool.sqrt_price_x96)?,
            tick: pool.tick,
            protocol_fee: pool.protocol_fee,
            lp_fee: pool.key.fee,
        })
    }

    async fn pool_liquidity(&self, pool_id: PoolId) -> Result<u128, RouterError> {
        let state = self.lock()?;
        Ok(lookup_pool(&state, pool_id)?.liquidity)
    }

    async fn pool_fee_growth(&self, pool_id: PoolId) -> Result<(U256, U256), RouterError> {
        let state = self.lock()?;
        let pool = lookup_pool(&state, pool_id)?;
        Ok((
            biguint_to_u256(&pool.fee_growth_global_0)?,
            biguint_to_u256(&pool.fee_growth_global_1)?,
        ))
    }

    async fn position_state(&self, position_id: u64) -> Result<PositionSnapshot, RouterError> {
        let state = self.lock()?;
        let position = lookup_position(&state, position_id)?;
        Ok(PositionSnapshot {
            liquidity: position.liquidity,
            tick_lower: position.tick_lower,
            tick_upper: position.tick_upper,
        })
    }

    async fn position_pool_key(&self, position_id: u64) -> Result<PoolKey, RouterError> {
        let state = self.lock()?;
        let position = lookup_position(&state, position_id)?;
        Ok(lookup_pool(&state, position.pool_id)?.key)
    }

    async fn next_position_id(&self) -> Result<u64, RouterError> {
        Ok(self.lock()?.next_position_id)
    }

    async fn owner_of(&self, position_id: u64) -> Result<Address, RouterError> {
        let state = self.lock()?;
        Ok(lookup_position(&state, position_id)?.owner)
    }
}

fn lookup_pool<'a>(state: &'a SimState, pool_id: PoolId) -> Result<&'a SimPool, RouterError> {
    state
        .pools
        .get(&pool_id)
        .ok_or_else(|| RouterError::NotFound("pool not initialized".to_string()))
}

fn lookup_position<'a>(
    state: &'a SimState,
    position_id: u64,
) -> Result<&'a SimPosition, RouterError> {
    if let Some(position) = state.positions.get(&position_id) {
        return Ok(position);
    }
    if state.burned.contains(&position_id) {
        return Err(RouterError::NotFound(format!(
            "position {position_id} burned"
        )));
    }
    Err(RouterError::NotFound(format!(
        "position {position_id} never minted"
    )))
}

fn apply_batch(state: &mut SimState, batch: &ActionBatch) -> Result<BatchReceipt, RouterError> {
    let mut funding_remaining: HashMap<Address, u128> = HashMap::new();
    for funding in &batch.funding {
        *funding_remaining.entry(funding.asset).or_insert(0) += funding.max_amount;
    }
    // Native value is prepaid by the payer at submission.
    if batch.native_value > 0 {
        debit(state, NATIVE_ASSET, batch.payer, batch.native_value)
            .map_err(|_| RouterError::Engine("insufficient native value".to_string()))?;
    }
    let mut ctx = BatchCtx {
        payer: batch.payer,
        funding_remaining,
        native_remaining: batch.native_value,
        pending_due: HashMap::new(),
        pending_credit: HashMap::new(),
        minted: None,
        tick_after: None,
    };

    for action in &batch.actions {
        apply_action(state, &mut ctx, action)?;
    }

    if ctx.pending_due.values().any(|amount| *amount > 0) {
        return Err(RouterError::Engine("batch left unsettled debt".to_string()));
    }
    if ctx.pending_credit.values().any(|amount| *amount > 0) {
        return Err(RouterError::Engine(
            "batch left uncollected credit".to_string(),
        ));
    }
    // Unswept native change returns to the payer.
    if ctx.native_remaining > 0 {
        credit(state, NATIVE_ASSET, batch.payer, ctx.native_remaining);
    }

    state.batch_nonce += 1;
    Ok(BatchReceipt {
        tx_hash: Felt::from(state.batch_nonce),
        position_id: ctx.minted,
        tick_after: ctx.tick_after,
    })
}

fn apply_action(
    state: &mut SimState,
    ctx: &mut BatchCtx,
    action: &Action,
) -> Result<(), RouterError> {
    match action {
        Action::Initialize { key, sqrt_price_x96 } => {
            let pool_id = key.pool_id();
            if state.pools.contains_key(&pool_id) {
                return Err(RouterError::Engine("pool already initialized".to_string()));
            }
            let tick = tick_at_sqrt_price(*sqrt_price_x96)
                .map_err(|err| RouterError::Engine(err.to_string()))?;
            state.pools.insert(
                pool_id,
                SimPool {
                    key: *key,
                    sqrt_price_x96: u256_to_biguint(sqrt_price_x96),
                    tick,
                    liquidity: 0,
                    fee_growth_global_0: BigUint::zero(),
                    fee_growth_global_1: BigUint::zero(),
                    protocol_fee: 0,
                },
            );
            ctx.tick_after = Some(tick);
        }
        Action::MintPosition {
            key,
            tick_lower,
            tick_upper,
            liquidity,
            amount0_max,
            amount1_max,
            recipient,
        } => {
            let pool_id = key.pool_id();
            let pool = state
                .pools
                .get(&pool_id)
                .ok_or_else(|| RouterError::Engine("pool not initialized".to_string()))?;
            let (amount0, amount1) =
                amounts_for_liquidity(pool, *tick_lower, *tick_upper, *liquidity, true)?;
            if amount0 > *amount0_max || amount1 > *amount1_max {
                return Err(RouterError::Engine("maximum amount exceeded".to_string()));
            }
            let position_id = state.next_position_id;
            state.next_position_id += 1;
            state.positions.insert(
                position_id,
                SimPosition {
                    pool_id,
                    owner: *recipient,
                    tick_lower: *tick_lower,
                    tick_upper: *tick_upper,
                    liquidity: *liquidity,
                },
            );
            add_active_liquidity(state, pool_id, *tick_lower, *tick_upper, *liquidity as i128)?;
            add_pending(&mut ctx.pending_due, key.asset0, amount0);
            add_pending(&mut ctx.pending_due, key.asset1, amount1);
            ctx.minted = Some(position_id);
        }
        Action::IncreaseLiquidity {
            position_id,
            liquidity,
            amount0_max,
            amount1_max,
        } => {
            let position = state
                .positions
                .get(position_id)
                .ok_or_else(|| RouterError::Engine("unknown position".to_string()))?
                .clone();
            let pool = state
                .pools
                .get(&position.pool_id)
                .ok_or_else(|| RouterError::Engine("pool not initialized".to_string()))?;
            let key = pool.key;
            let (amount0, amount1) = amounts_for_liquidity(
                pool,
                position.tick_lower,
                position.tick_upper,
                *liquidity,
                true,
            )?;
            if amount0 > *amount0_max || amount1 > *amount1_max {
                return Err(RouterError::Engine("maximum amount exceeded".to_string()));
            }
            if let Some(entry) = state.positions.get_mut(position_id) {
                entry.liquidity += *liquidity;
            }
            add_active_liquidity(
                state,
                position.pool_id,
                position.tick_lower,
                position.tick_upper,
                *liquidity as i128,
            )?;
            add_pending(&mut ctx.pending_due, key.asset0, amount0);
            add_pending(&mut ctx.pending_due, key.asset1, amount1);
        }
        Action::DecreaseLiquidity {
            position_id,
            liquidity,
            amount0_min,
            amount1_min,
        } => {
            remove_liquidity(state, ctx, *position_id, Some(*liquidity), *amount0_min, *amount1_min)?;
        }
        Action::BurnPosition {
            position_id,
            amount0_min,
            amount1_min,
        } => {
            remove_liquidity(state, ctx, *position_id, None, *amount0_min, *amount1_min)?;
            state.positions.remove(position_id);
            state.burned.insert(*position_id);
        }
        Action::SettlePair { asset0, asset1 } => {
            settle_due(state, ctx, *asset0)?;
            settle_due(state, ctx, *asset1)?;
        }
        Action::TakePair {
            asset0,
            asset1,
            recipient,
        } => {
            pay_credit(state, ctx, *asset0, *recipient);
            pay_credit(state, ctx, *asset1, *recipient);
        }
        Action::CloseCurrency { asset } => {
            // Net the signed delta: pull the due side, push the credit side.
            settle_due(state, ctx, *asset)?;
            let payer = ctx.payer;
            pay_credit(state, ctx, *asset, payer);
        }
        Action::Sweep { asset, recipient } => {
            if *asset == NATIVE_ASSET && ctx.native_remaining > 0 {
                let change = ctx.native_remaining;
                ctx.native_remaining = 0;
                credit(state, NATIVE_ASSET, *recipient, change);
            }
        }
    }
    Ok(())
}

fn remove_liquidity(
    state: &mut SimState,
    ctx: &mut BatchCtx,
    position_id: u64,
    liquidity: Option<u128>,
    amount0_min: u128,
    amount1_min: u128,
) -> Result<(), RouterError> {
    let position = state
        .positions
        .get(&position_id)
        .ok_or_else(|| RouterError::Engine("unknown position".to_string()))?
        .clone();
    let delta = liquidity.unwrap_or(position.liquidity);
    if delta > position.liquidity {
        return Err(RouterError::Engine(
            "liquidity exceeds position".to_string(),
        ));
    }
    let pool = state
        .pools
        .get(&position.pool_id)
        .ok_or_else(|| RouterError::Engine("pool not initialized".to_string()))?;
    let key = pool.key;
    let (amount0, amount1) =
        amounts_for_liquidity(pool, position.tick_lower, position.tick_upper, delta, false)?;
    if amount0 < amount0_min || amount1 < amount1_min {
        return Err(RouterError::Engine(
            "amount below caller minimum".to_string(),
        ));
    }
    if let Some(entry) = state.positions.get_mut(&position_id) {
        entry.liquidity -= delta;
    }
    add_active_liquidity(
        state,
        position.pool_id,
        position.tick_lower,
        position.tick_upper,
        -(delta as i128),
    )?;
    add_pending(&mut ctx.pending_credit, key.asset0, amount0);
    add_pending(&mut ctx.pending_credit, key.asset1, amount1);
    Ok(())
}

/// Pulls the accumulated due amount for one asset from the batch's scoped
/// funding. This is the only settlement path: nothing can draw on balances
/// the payer did not authorize for this batch, and nothing can draw on a
/// different account's funds.
fn settle_due(state: &mut SimState, ctx: &mut BatchCtx, asset: Address) -> Result<(), RouterError> {
    let due = ctx.pending_due.remove(&asset).unwrap_or(0);
    if due == 0 {
        return Ok(());
    }
    if asset == NATIVE_ASSET {
        if due > ctx.native_remaining {
            return Err(RouterError::Engine(
                "insufficient native value".to_string(),
            ));
        }
        ctx.native_remaining -= due;
        return Ok(());
    }
    let cap = ctx.funding_remaining.get_mut(&asset);
    match cap {
        Some(remaining) if *remaining >= due => *remaining -= due,
        _ => {
            return Err(RouterError::Engine(
                "insufficient batch funding".to_string(),
            ))
        }
    }
    debit(state, asset, ctx.payer, due)
        .map_err(|_| RouterError::Engine("insufficient payer balance".to_string()))?;
    Ok(())
}

fn pay_credit(state: &mut SimState, ctx: &mut BatchCtx, asset: Address, recipient: Address) {
    let amount = ctx.pending_credit.remove(&asset).unwrap_or(0);
    if amount > 0 {
        credit(state, asset, recipient, amount);
    }
}

fn add_pending(pending: &mut HashMap<Address, u128>, asset: Address, amount: u128) {
    if amount > 0 {
        *pending.entry(asset).or_insert(0) += amount;
    }
}

fn add_active_liquidity(
    state: &mut SimState,
    pool_id: PoolId,
    tick_lower: i32,
    tick_upper: i32,
    delta: i128,
) -> Result<(), RouterError> {
    let pool = state
        .pools
        .get_mut(&pool_id)
        .ok_or_else(|| RouterError::Engine("pool not initialized".to_string()))?;
    if pool.tick < tick_lower || pool.tick >= tick_upper {
        return Ok(());
    }
    let updated = (pool.liquidity as i128) + delta;
    if updated < 0 {
        return Err(RouterError::Engine("liquidity underflow".to_string()));
    }
    pool.liquidity = updated as u128;
    Ok(())
}

fn debit(state: &mut SimState, asset: Address, account: Address, amount: u128) -> Result<(), ()> {
    let balance = state.balances.entry((asset, account)).or_insert(0);
    if *balance < amount {
        return Err(());
    }
    *balance -= amount;
    Ok(())
}

fn credit(state: &mut SimState, asset: Address, account: Address, amount: u128) {
    *state.balances.entry((asset, account)).or_insert(0) += amount;
}

/// Token amounts backing `liquidity` over `[tick_lower, tick_upper]` at the
/// pool's current price. Deposits round up, withdrawals round down.
fn amounts_for_liquidity(
    pool: &SimPool,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
    round_up: bool,
) -> Result<(u128, u128), RouterError> {
    if tick_lower >= tick_upper {
        return Err(RouterError::Engine("tick bounds out of order".to_string()));
    }
    if tick_lower % pool.key.tick_spacing != 0 || tick_upper % pool.key.tick_spacing != 0 {
        return Err(RouterError::Engine(
            "tick bounds not aligned to spacing".to_string(),
        ));
    }
    let sqrt_lower =
        u256_to_biguint(&sqrt_price_at_tick(tick_lower).map_err(engine_err)?);
    let sqrt_upper =
        u256_to_biguint(&sqrt_price_at_tick(tick_upper).map_err(engine_err)?);
    let sqrt_current = pool.sqrt_price_x96.clone();

    let liquidity = BigUint::from(liquidity);
    let (amount0, amount1) = if sqrt_current <= sqrt_lower {
        (
            amount0_delta(&liquidity, &sqrt_lower, &sqrt_upper, round_up),
            BigUint::zero(),
        )
    } else if sqrt_current >= sqrt_upper {
        (
            BigUint::zero(),
            amount1_delta(&liquidity, &sqrt_lower, &sqrt_upper, round_up),
        )
    } else {
        (
            amount0_delta(&liquidity, &sqrt_current, &sqrt_upper, round_up),
            amount1_delta(&liquidity, &sqrt_lower, &sqrt_current, round_up),
        )
    };
    let amount0 = amount0
        .to_u128()
        .ok_or_else(|| RouterError::Engine("amount overflow".to_string()))?;
    let amount1 = amount1
        .to_u128()
        .ok_or_else(|| RouterError::Engine("amount overflow".to_string()))?;
    Ok((amount0, amount1))
}

/// `L * 2^96 * (sqrt_b - sqrt_a) / (sqrt_b * sqrt_a)` with `sqrt_a < sqrt_b`.
fn amount0_delta(liquidity: &BigUint, sqrt_a: &BigUint, sqrt_b: &BigUint, round_up: bool) -> BigUint {
    let numerator = (liquidity << 96usize) * (sqrt_b - sqrt_a);
    let denominator = sqrt_b * sqrt_a;
    div_rounded(numerator, denominator, round_up)
}

/// `L * (sqrt_b - sqrt_a) / 2^96` with `sqrt_a < sqrt_b`.
fn amount1_delta(liquidity: &BigUint, sqrt_a: &BigUint, sqrt_b: &BigUint, round_up: bool) -> BigUint {
    let numerator = liquidity * (sqrt_b - sqrt_a);
    let denominator = BigUint::one() << 96usize;
    div_rounded(numerator, denominator, round_up)
}

fn div_rounded(numerator: BigUint, denominator: BigUint, round_up: bool) -> BigUint {
    if round_up {
        (numerator + &denominator - BigUint::one()) / denominator
    } else {
        numerator / denominator
    }
}

fn engine_err(err: RouterError) -> RouterError {
    RouterError::Engine(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_math::sqrt_price_at_tick;

    fn pool_at_tick_zero() -> SimPool {
        SimPool {
            key: PoolKey {
                asset0: Felt::from(1u64),
                asset1: Felt::from(2u64),
                fee: 3000,
                tick_spacing: 60,
                extension: Felt::ZERO,
            },
            sqrt_price_x96: u256_to_biguint(&sqrt_price_at_tick(0).expect("price")),
            tick: 0,
            liquidity: 0,
            fee_growth_global_0: BigUint::zero(),
            fee_growth_global_1: BigUint::zero(),
            protocol_fee: 0,
        }
    }

    #[test]
    fn in_range_liquidity_needs_both_assets() {
        let pool = pool_at_tick_zero();
        let (amount0, amount1) =
            amounts_for_liquidity(&pool, -600, 600, 1_000_000_000, true).expect("amounts");
        assert!(amount0 > 0 && amount1 > 0);
        // Symmetric range around the current tick takes near-equal amounts.
        let low = amount0.min(amount1) as f64;
        let high = amount0.max(amount1) as f64;
        assert!(high / low < 1.001);
    }

    #[test]
    fn out_of_range_liquidity_is_single_sided() {
        let pool = pool_at_tick_zero();
        let (amount0, amount1) =
            amounts_for_liquidity(&pool, 600, 1200, 1_000_000_000, true).expect("above");
        assert!(amount0 > 0 && amount1 == 0);
        let (amount0, amount1) =
            amounts_for_liquidity(&pool, -1200, -600, 1_000_000_000, true).expect("below");
        assert!(amount0 == 0 && amount1 > 0);
    }

    #[test]
    fn deposit_rounds_up_withdrawal_rounds_down() {
        let pool = pool_at_tick_zero();
        let (in0, in1) = amounts_for_liquidity(&pool, -600, 600, 777, true).expect("in");
        let (out0, out1) = amounts_for_liquidity(&pool, -600, 600, 777, false).expect("out");
        assert!(in0 >= out0 && in1 >= out1);
    }

    #[test]
    fn misaligned_bounds_are_rejected() {
        let pool = pool_at_tick_zero();
        assert!(amounts_for_liquidity(&pool, -61, 60, 1, true).is_err());
    }
}
