//! Tidepool position router SDK.
//!
//! A stateless facade over an external concentrated-liquidity engine:
//! composes each lifecycle operation into one atomic action batch with
//! slippage and deadline guards, converts between ticks and Q64.96 square
//! root prices, derives canonical pool identities, and enumerates
//! ownership with a bounded scan.

mod actions;
mod engine;
mod error;
mod pool;
mod router;
mod sim;
mod starknet_engine;
pub mod tick_math;
mod utils;

pub use actions::{
    encode_batch, plan_close, plan_create_pool, plan_decrease, plan_increase, plan_mint, Action,
    ActionBatch, Funding,
};
pub use engine::{BatchReceipt, LiquidityEngine, PoolSlot, PositionSnapshot, TxHash};
pub use error::RouterError;
pub use pool::{PoolId, PoolKey, PoolParams, PoolState, PositionInfo, NATIVE_ASSET};
pub use router::{
    CloseRequest, CreatePoolResult, DecreaseRequest, IncreaseRequest, MintRequest, MintResult,
    PositionRouter,
};
pub use sim::SimEngine;
pub use starknet_engine::{RetryConfig, StarknetEngine, StarknetEngineConfig};
pub use utils::{parse_felt, Address};
