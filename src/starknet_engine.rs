//! On-chain transport: implements the engine contract against a deployed
//! engine core, ownership registry and settlement gateway.

use std::sync::Arc;

use async_trait::async_trait;
use starknet::accounts::ConnectedAccount;
use starknet::core::types::{
    BlockId, BlockTag, Call, Felt, FunctionCall, StarknetError, U256,
};
use starknet::core::utils::get_selector_from_name;
use starknet::macros::selector;
use starknet::providers::{Provider, ProviderError};
use tokio::time::{sleep, Duration};

use crate::actions::{encode_batch, ActionBatch};
use crate::engine::{BatchReceipt, LiquidityEngine, PoolSlot, PositionSnapshot, TxHash};
use crate::error::RouterError;
use crate::pool::{PoolId, PoolKey};
use crate::utils::{felt_to_i32, felt_to_u128, felt_to_u64, parse_event, Address, StarknetEvent};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 500,
        }
    }
}

pub struct StarknetEngineConfig<A: ConnectedAccount + Sync + Send> {
    pub account: A,
    /// Engine core: batch execution and pool/position reads.
    pub core_address: Address,
    /// Non-fungible ownership registry.
    pub registry_address: Address,
    /// Settlement/allowance gateway, configured once during setup.
    pub gateway_address: Address,
}

pub struct StarknetEngine<A: ConnectedAccount + Sync + Send> {
    account: Arc<A>,
    pub core_address: Address,
    pub registry_address: Address,
    pub gateway_address: Address,
    pub retry: RetryConfig,
}

struct PositionMinted {
    position_id: u64,
}

impl StarknetEvent for PositionMinted {
    fn selector() -> Felt {
        selector!("PositionMinted")
    }

    fn from_event(_keys: &[Felt], data: &[Felt]) -> Option<Self> {
        let position_id = felt_to_u64(data.first()?).ok()?;
        Some(Self { position_id })
    }
}

struct PoolInitialized {
    tick: i32,
}

impl StarknetEvent for PoolInitialized {
    fn selector() -> Felt {
        selector!("PoolInitialized")
    }

    fn from_event(_keys: &[Felt], data: &[Felt]) -> Option<Self> {
        let tick = felt_to_i32(data.get(1)?).ok()?;
        Some(Self { tick })
    }
}

impl<A: ConnectedAccount + Sync + Send> StarknetEngine<A> {
    pub fn new(config: StarknetEngineConfig<A>) -> Self {
        Self {
            account: Arc::new(config.account),
            core_address: config.core_address,
            registry_address: config.registry_address,
            gateway_address: config.gateway_address,
            retry: RetryConfig::default(),
        }
    }

    /// One-time setup: grants the settlement gateway an allowance over
    /// `asset`, so the engine can pull batch funding up to the exposed
    /// approvals. The caller performs the matching approval on their side.
    pub async fn approve_gateway(&self, asset: Address, amount: u128) -> Result<TxHash, RouterError> {
        if asset == Felt::ZERO {
            return Err(RouterError::InvalidArgument(
                "native asset needs no allowance".to_string(),
            ));
        }
        let selector = get_selector_from_name("approve")
            .map_err(|err| RouterError::InvalidArgument(err.to_string()))?;
        let call = Call {
            to: asset,
            selector,
            calldata: vec![self.gateway_address, Felt::from(amount), Felt::ZERO],
        };
        execute_with_retry(self.account.as_ref(), call, self.retry.clone()).await
    }

    async fn read(&self, contract: Address, entrypoint: &str, calldata: Vec<Felt>) -> Result<Vec<Felt>, RouterError> {
        let selector = get_selector_from_name(entrypoint)
            .map_err(|err| RouterError::InvalidArgument(err.to_string()))?;
        let call = FunctionCall {
            contract_address: contract,
            entry_point_selector: selector,
            calldata,
        };
        let provider = self.account.provider();
        with_retry(self.retry.clone(), || async {
            provider
                .call(call.clone(), BlockId::Tag(BlockTag::Latest))
                .await
                .map_err(map_provider_error)
        })
        .await
    }
}

#[async_trait]
impl<A: ConnectedAccount + Sync + Send> LiquidityEngine for StarknetEngine<A> {
    async fn execute_batch(&self, batch: &ActionBatch) -> Result<BatchReceipt, RouterError> {
        if self.core_address == Felt::ZERO {
            return Err(RouterError::InvalidArgument(
                "engine core address is zero".to_string(),
            ));
        }
        let calldata = encode_batch(batch)?;
        let selector = get_selector_from_name("execute_batch")
            .map_err(|err| RouterError::InvalidArgument(err.to_string()))?;
        let call = Call {
            to: self.core_address,
            selector,
            calldata,
        };
        let tx_hash = execute_with_retry(self.account.as_ref(), call, self.retry.clone()).await?;

        let provider = self.account.provider();
        let receipt = with_retry(self.retry.clone(), || async {
            provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(map_provider_error)
        })
        .await?;
        let position_id =
            parse_event::<PositionMinted>(&receipt.receipt).map(|event| event.position_id);
        let tick_after = parse_event::<PoolInitialized>(&receipt.receipt).map(|event| event.tick);
        Ok(BatchReceipt {
            tx_hash,
            position_id,
            tick_after,
        })
    }

    async fn pool_slot(&self, pool_id: PoolId) -> Result<PoolSlot, RouterError> {
        let result = self.read(self.core_address, "get_pool_slot", vec![pool_id]).await?;
        if result.len() < 5 {
            return Err(RouterError::Rpc("invalid pool slot reply".to_string()));
        }
        Ok(PoolSlot {
            sqrt_price_x96: U256::from_words(felt_to_u128(&result[0])?, felt_to_u128(&result[1])?),
            tick: felt_to_i32(&result[2])?,
            protocol_fee: felt_to_u64(&result[3])? as u32,
            lp_fee: felt_to_u64(&result[4])? as u32,
        })
    }

    async fn pool_liquidity(&self, pool_id: PoolId) -> Result<u128, RouterError> {
        let result = self
            .read(self.core_address, "get_pool_liquidity", vec![pool_id])
            .await?;
        felt_to_u128(result.first().ok_or_else(|| {
            RouterError::Rpc("invalid pool liquidity reply".to_string())
        })?)
    }

    async fn pool_fee_growth(&self, pool_id: PoolId) -> Result<(U256, U256), RouterError> {
        let result = self
            .read(self.core_address, "get_fee_growth_globals", vec![pool_id])
            .await?;
        if result.len() < 4 {
            return Err(RouterError::Rpc("invalid fee growth reply".to_string()));
        }
        Ok((
            U256::from_words(felt_to_u128(&result[0])?, felt_to_u128(&result[1])?),
            U256::from_words(felt_to_u128(&result[2])?, felt_to_u128(&result[3])?),
        ))
    }

    async fn position_state(&self, position_id: u64) -> Result<PositionSnapshot, RouterError> {
        let result = self
            .read(
                self.core_address,
                "get_position_state",
                vec![Felt::from(position_id)],
            )
            .await
            .map_err(|err| not_found_on_revert(err, position_id))?;
        if result.len() < 3 {
            return Err(RouterError::Rpc("invalid position state reply".to_string()));
        }
        Ok(PositionSnapshot {
            liquidity: felt_to_u128(&result[0])?,
            tick_lower: felt_to_i32(&result[1])?,
            tick_upper: felt_to_i32(&result[2])?,
        })
    }

    async fn position_pool_key(&self, position_id: u64) -> Result<PoolKey, RouterError> {
        let result = self
            .read(
                self.core_address,
                "get_position_pool_key",
                vec![Felt::from(position_id)],
            )
            .await
            .map_err(|err| not_found_on_revert(err, position_id))?;
        if result.len() < 5 {
            return Err(RouterError::Rpc("invalid pool key reply".to_string()));
        }
        Ok(PoolKey {
            asset0: result[0],
            asset1: result[1],
            fee: felt_to_u64(&result[2])? as u32,
            tick_spacing: felt_to_i32(&result[3])?,
            extension: result[4],
        })
    }

    async fn next_position_id(&self) -> Result<u64, RouterError> {
        let result = self
            .read(self.core_address, "get_next_position_id", Vec::new())
            .await?;
        felt_to_u64(result.first().ok_or_else(|| {
            RouterError::Rpc("invalid next position id reply".to_string())
        })?)
    }

    async fn owner_of(&self, position_id: u64) -> Result<Address, RouterError> {
        let result = self
            .read(
                self.registry_address,
                "owner_of",
                vec![Felt::from(position_id)],
            )
            .await
            .map_err(|err| not_found_on_revert(err, position_id))?;
        result.first().copied().ok_or_else(|| {
            RouterError::Rpc("invalid owner reply".to_string())
        })
    }
}

/// The registry reverts for both never-minted and burned ids; the wire
/// cannot tell the two apart, so both surface as the same NotFound.
fn not_found_on_revert(err: RouterError, position_id: u64) -> RouterError {
    match err {
        RouterError::Engine(_) => {
            RouterError::NotFound(format!("position {position_id} not found"))
        }
        other => other,
    }
}

fn map_provider_error(err: ProviderError) -> RouterError {
    match err {
        ProviderError::StarknetError(StarknetError::ContractError(data)) => {
            RouterError::Engine(format!("{data:?}"))
        }
        ProviderError::StarknetError(StarknetError::TransactionExecutionError(data)) => {
            RouterError::Engine(format!("{data:?}"))
        }
        other => RouterError::Rpc(other.to_string()),
    }
}

pub(crate) async fn execute_with_retry<A: ConnectedAccount + Sync>(
    account: &A,
    call: Call,
    retry: RetryConfig,
) -> Result<TxHash, RouterError> {
    with_retry(retry, || async {
        account
            .execute_v3(vec![call.clone()])
            .send()
            .await
            .map_err(|err| match err {
                starknet::accounts::AccountError::Provider(provider_err) => {
                    map_provider_error(provider_err)
                }
                other => RouterError::Rpc(other.to_string()),
            })
            .map(|result| result.transaction_hash)
    })
    .await
}

/// Retries transport faults only; engine rejections and not-found are
/// returned immediately (a failed batch must never be resubmitted by this
/// layer).
pub(crate) async fn with_retry<F, Fut, T>(retry: RetryConfig, mut f: F) -> Result<T, RouterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RouterError>>,
{
    let mut attempt = 0usize;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(RouterError::Rpc(msg)) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(RouterError::Rpc(msg));
                }
                sleep(Duration::from_millis(retry.delay_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
