//! Primitive engine actions and the per-operation batch composer.
//!
//! Every lifecycle verb becomes one ordered, all-or-nothing batch: the
//! engine executes the whole sequence or none of it. A batch carries its
//! own deadline and its own scoped funding authorization; settlement can
//! draw only on the submitting batch's payer, up to the batch's per-asset
//! caps, so the router never holds working capital between operations.

use starknet::core::types::{Felt, U256};

use crate::error::RouterError;
use crate::pool::{PoolKey, NATIVE_ASSET};
use crate::utils::{i32_to_felt, Address};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Registers the pool at a starting price.
    Initialize { key: PoolKey, sqrt_price_x96: U256 },
    /// Computes required amounts for the requested liquidity within the
    /// caller-specified maximums and records a fresh position.
    MintPosition {
        key: PoolKey,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        amount0_max: u128,
        amount1_max: u128,
        recipient: Address,
    },
    IncreaseLiquidity {
        position_id: u64,
        liquidity: u128,
        amount0_max: u128,
        amount1_max: u128,
    },
    /// Burns liquidity and credits owed amounts, rejecting below the
    /// caller-specified minimums.
    DecreaseLiquidity {
        position_id: u64,
        liquidity: u128,
        amount0_min: u128,
        amount1_min: u128,
    },
    /// Removes all remaining liquidity, collects outstanding fees and
    /// destroys the ownership record, under the same minimum guards.
    BurnPosition {
        position_id: u64,
        amount0_min: u128,
        amount1_min: u128,
    },
    /// Pulls both owed amounts from the batch's funding authorization.
    SettlePair { asset0: Address, asset1: Address },
    /// Transfers both credited amounts to the recipient.
    TakePair {
        asset0: Address,
        asset1: Address,
        recipient: Address,
    },
    /// Nets the signed delta for one asset: pulls a positive delta from
    /// the batch funding, pays out a negative one.
    CloseCurrency { asset: Address },
    /// Returns unused native value to the recipient.
    Sweep { asset: Address, recipient: Address },
}

/// Per-asset settlement cap, scoped to a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Funding {
    pub asset: Address,
    pub max_amount: u128,
}

/// One atomic unit of work: ordered actions, a shared deadline, and the
/// single-use funding authorization that backs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBatch {
    pub actions: Vec<Action>,
    /// Unix seconds; the engine rejects the whole batch once passed.
    pub deadline: u64,
    /// Account the engine may settle against for this batch only.
    pub payer: Address,
    pub funding: Vec<Funding>,
    /// Native-asset value accompanying the submission. Native amounts
    /// cannot be pulled by allowance.
    pub native_value: u128,
}

pub fn plan_create_pool(key: &PoolKey, sqrt_price_x96: U256, deadline: u64) -> ActionBatch {
    ActionBatch {
        actions: vec![Action::Initialize {
            key: *key,
            sqrt_price_x96,
        }],
        deadline,
        payer: Felt::ZERO,
        funding: Vec::new(),
        native_value: 0,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn plan_mint(
    key: &PoolKey,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
    amount0_max: u128,
    amount1_max: u128,
    recipient: Address,
    payer: Address,
    deadline: u64,
) -> ActionBatch {
    let (funding, native_value) =
        split_funding(key.asset0, amount0_max, key.asset1, amount1_max);
    ActionBatch {
        actions: vec![
            Action::MintPosition {
                key: *key,
                tick_lower,
                tick_upper,
                liquidity,
                amount0_max,
                amount1_max,
                recipient,
            },
            Action::SettlePair {
                asset0: key.asset0,
                asset1: key.asset1,
            },
            Action::Sweep {
                asset: key.asset0,
                recipient,
            },
            Action::Sweep {
                asset: key.asset1,
                recipient,
            },
        ],
        deadline,
        payer,
        funding,
        native_value,
    }
}

pub fn plan_increase(
    key: &PoolKey,
    position_id: u64,
    liquidity: u128,
    amount0_max: u128,
    amount1_max: u128,
    payer: Address,
    deadline: u64,
) -> ActionBatch {
    let (funding, native_value) =
        split_funding(key.asset0, amount0_max, key.asset1, amount1_max);
    ActionBatch {
        actions: vec![
            Action::IncreaseLiquidity {
                position_id,
                liquidity,
                amount0_max,
                amount1_max,
            },
            Action::CloseCurrency { asset: key.asset0 },
            Action::CloseCurrency { asset: key.asset1 },
        ],
        deadline,
        payer,
        funding,
        native_value,
    }
}

pub fn plan_decrease(
    key: &PoolKey,
    position_id: u64,
    liquidity: u128,
    amount0_min: u128,
    amount1_min: u128,
    recipient: Address,
    deadline: u64,
) -> ActionBatch {
    ActionBatch {
        actions: vec![
            Action::DecreaseLiquidity {
                position_id,
                liquidity,
                amount0_min,
                amount1_min,
            },
            Action::TakePair {
                asset0: key.asset0,
                asset1: key.asset1,
                recipient,
            },
        ],
        deadline,
        payer: Felt::ZERO,
        funding: Vec::new(),
        native_value: 0,
    }
}

pub fn plan_close(
    key: &PoolKey,
    position_id: u64,
    amount0_min: u128,
    amount1_min: u128,
    recipient: Address,
    deadline: u64,
) -> ActionBatch {
    ActionBatch {
        actions: vec![
            Action::BurnPosition {
                position_id,
                amount0_min,
                amount1_min,
            },
            Action::TakePair {
                asset0: key.asset0,
                asset1: key.asset1,
                recipient,
            },
        ],
        deadline,
        payer: Felt::ZERO,
        funding: Vec::new(),
        native_value: 0,
    }
}

/// Routes each maximum either as a pull-funding cap or, for the native
/// asset, as accompanying batch value.
fn split_funding(
    asset0: Address,
    amount0_max: u128,
    asset1: Address,
    amount1_max: u128,
) -> (Vec<Funding>, u128) {
    let mut funding = Vec::new();
    let mut native_value = 0u128;
    for (asset, max_amount) in [(asset0, amount0_max), (asset1, amount1_max)] {
        if asset == NATIVE_ASSET {
            native_value += max_amount;
        } else {
            funding.push(Funding { asset, max_amount });
        }
    }
    (funding, native_value)
}

impl Action {
    pub fn code(&self) -> Felt {
        let code: u64 = match self {
            Action::Initialize { .. } => 1,
            Action::MintPosition { .. } => 2,
            Action::IncreaseLiquidity { .. } => 3,
            Action::DecreaseLiquidity { .. } => 4,
            Action::BurnPosition { .. } => 5,
            Action::SettlePair { .. } => 6,
            Action::TakePair { .. } => 7,
            Action::CloseCurrency { .. } => 8,
            Action::Sweep { .. } => 9,
        };
        Felt::from(code)
    }

    pub fn encode_params(&self) -> Result<Vec<Felt>, RouterError> {
        let params = match self {
            Action::Initialize { key, sqrt_price_x96 } => {
                let mut out = encode_key(key)?;
                out.extend(encode_u256(sqrt_price_x96));
                out
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
                let mut out = encode_key(key)?;
                out.push(i32_to_felt(*tick_lower)?);
                out.push(i32_to_felt(*tick_upper)?);
                out.push(Felt::from(*liquidity));
                out.push(Felt::from(*amount0_max));
                out.push(Felt::from(*amount1_max));
                out.push(*recipient);
                out
            }
            Action::IncreaseLiquidity {
                position_id,
                liquidity,
                amount0_max,
                amount1_max,
            } => vec![
                Felt::from(*position_id),
                Felt::from(*liquidity),
                Felt::from(*amount0_max),
                Felt::from(*amount1_max),
            ],
            Action::DecreaseLiquidity {
                position_id,
                liquidity,
                amount0_min,
                amount1_min,
            } => vec![
                Felt::from(*position_id),
                Felt::from(*liquidity),
                Felt::from(*amount0_min),
                Felt::from(*amount1_min),
            ],
            Action::BurnPosition {
                position_id,
                amount0_min,
                amount1_min,
            } => vec![
                Felt::from(*position_id),
                Felt::from(*amount0_min),
                Felt::from(*amount1_min),
            ],
            Action::SettlePair { asset0, asset1 } => vec![*asset0, *asset1],
            Action::TakePair {
                asset0,
                asset1,
                recipient,
            } => vec![*asset0, *asset1, *recipient],
            Action::CloseCurrency { asset } => vec![*asset],
            Action::Sweep { asset, recipient } => vec![*asset, *recipient],
        };
        Ok(params)
    }
}

/// Wire layout: `[deadline, payer, native_value, n_funding, (asset, max)*,
/// n_actions, (code, n_params, params...)*]`.
pub fn encode_batch(batch: &ActionBatch) -> Result<Vec<Felt>, RouterError> {
    let mut out = Vec::new();
    out.push(Felt::from(batch.deadline));
    out.push(batch.payer);
    out.push(Felt::from(batch.native_value));
    out.push(Felt::from(batch.funding.len() as u64));
    for funding in &batch.funding {
        out.push(funding.asset);
        out.push(Felt::from(funding.max_amount));
    }
    out.push(Felt::from(batch.actions.len() as u64));
    for action in &batch.actions {
        let params = action.encode_params()?;
        out.push(action.code());
        out.push(Felt::from(params.len() as u64));
        out.extend(params);
    }
    Ok(out)
}

fn encode_key(key: &PoolKey) -> Result<Vec<Felt>, RouterError> {
    Ok(vec![
        key.asset0,
        key.asset1,
        Felt::from(key.fee),
        i32_to_felt(key.tick_spacing)?,
        key.extension,
    ])
}

fn encode_u256(value: &U256) -> [Felt; 2] {
    [Felt::from(value.low()), Felt::from(value.high())]
}
