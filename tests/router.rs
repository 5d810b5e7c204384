use starknet::core::types::Felt;

use tidepool_router::tick_math::sqrt_price_at_tick;
use tidepool_router::{
    CloseRequest, DecreaseRequest, IncreaseRequest, LiquidityEngine, MintRequest, PoolParams,
    PositionRouter, RouterError, SimEngine, NATIVE_ASSET,
};

fn asset(id: u64) -> Felt {
    Felt::from(id)
}

fn alice() -> Felt {
    Felt::from(0xA11CEu64)
}

fn bob() -> Felt {
    Felt::from(0xB0Bu64)
}

fn pool_params() -> PoolParams {
    PoolParams {
        asset_a: asset(1),
        asset_b: asset(2),
        fee: 3000,
        tick_spacing: 60,
        extension: Felt::ZERO,
    }
}

const GENEROUS: u128 = 1 << 80;

async fn router_with_pool() -> PositionRouter<SimEngine> {
    let router = PositionRouter::new(SimEngine::new());
    let price = sqrt_price_at_tick(0).expect("price");
    let created = router
        .create_pool(&pool_params(), price, 1_000)
        .await
        .expect("create pool");
    assert_eq!(created.tick, 0);
    router
}

fn fund_both(router: &PositionRouter<SimEngine>, account: Felt, amount: u128) {
    router.engine().set_balance(asset(1), account, amount);
    router.engine().set_balance(asset(2), account, amount);
}

fn mint_request(owner: Felt, liquidity: u128) -> MintRequest {
    MintRequest {
        params: pool_params(),
        tick_lower: -600,
        tick_upper: 600,
        liquidity,
        amount_a_max: GENEROUS,
        amount_b_max: GENEROUS,
        recipient: owner,
        payer: owner,
        deadline: 1_000,
    }
}

#[tokio::test]
async fn create_pool_registers_price_and_tick() {
    let router = router_with_pool().await;
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.tick, 0);
    assert_eq!(pool.liquidity, 0);
    assert_eq!(pool.sqrt_price_x96, sqrt_price_at_tick(0).expect("price"));
}

#[tokio::test]
async fn swapped_asset_order_reads_the_same_pool() {
    let router = router_with_pool().await;
    let mut swapped = pool_params();
    std::mem::swap(&mut swapped.asset_a, &mut swapped.asset_b);
    let forward = router.get_pool_state(&pool_params()).await.expect("state");
    let reversed = router.get_pool_state(&swapped).await.expect("state");
    assert_eq!(forward.pool_id, reversed.pool_id);
}

#[tokio::test]
async fn lifecycle_tracks_active_liquidity() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);

    let minted = router.mint(&mint_request(alice(), 1_000_000)).await.expect("mint");
    assert_eq!(minted.position_id, 1);
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 1_000_000);

    router
        .increase(&IncreaseRequest {
            position_id: minted.position_id,
            liquidity: 500_000,
            amount0_max: GENEROUS,
            amount1_max: GENEROUS,
            payer: alice(),
            deadline: 1_000,
        })
        .await
        .expect("increase");
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 1_500_000);

    let position = router.get_position(minted.position_id).await.expect("position");
    assert_eq!(position.liquidity, 1_500_000);
    assert_eq!(position.tick_lower, -600);
    assert_eq!(position.tick_upper, 600);
    assert_eq!(position.pool_tick, 0);

    router
        .decrease(&DecreaseRequest {
            position_id: minted.position_id,
            liquidity: 500_000,
            amount0_min: 0,
            amount1_min: 0,
            recipient: alice(),
            deadline: 1_000,
        })
        .await
        .expect("decrease");
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 1_000_000);

    router
        .close(&CloseRequest {
            position_id: minted.position_id,
            amount0_min: 0,
            amount1_min: 0,
            recipient: alice(),
            deadline: 1_000,
        })
        .await
        .expect("close");
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 0);

    let gone = router.get_position(minted.position_id).await;
    assert!(matches!(gone, Err(RouterError::NotFound(_))));
    let owner = router.engine().owner_of(minted.position_id).await;
    match owner {
        Err(RouterError::NotFound(msg)) => assert!(msg.contains("burned")),
        other => panic!("expected burned not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn mint_settles_and_decrease_pays_back() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);

    let minted = router.mint(&mint_request(alice(), 1_000_000_000)).await.expect("mint");
    let paid0 = GENEROUS - router.engine().balance_of(asset(1), alice());
    let paid1 = GENEROUS - router.engine().balance_of(asset(2), alice());
    assert!(paid0 > 0 && paid1 > 0);

    router
        .close(&CloseRequest {
            position_id: minted.position_id,
            amount0_min: 0,
            amount1_min: 0,
            recipient: alice(),
            deadline: 1_000,
        })
        .await
        .expect("close");
    // Withdrawal rounds down, so the refund never exceeds what was paid.
    let back0 = router.engine().balance_of(asset(1), alice()) + paid0;
    let back1 = router.engine().balance_of(asset(2), alice()) + paid1;
    assert!(back0 <= GENEROUS && back1 <= GENEROUS);
    assert!(GENEROUS - back0 <= 2 && GENEROUS - back1 <= 2);
}

#[tokio::test]
async fn underfunded_mint_fails_atomically() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);

    let mut request = mint_request(alice(), 1_000_000_000);
    // Deliberately below the true required amounts.
    request.amount_a_max = 1;
    request.amount_b_max = 1;
    let err = router.mint(&request).await.expect_err("must fail");
    assert!(matches!(err, RouterError::Engine(_)));

    // No liquidity, no ownership record, no balance change, no id burned.
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 0);
    assert!(router.list_owned(alice(), 1, 100).await.expect("scan").is_empty());
    assert_eq!(router.engine().balance_of(asset(1), alice()), GENEROUS);
    assert_eq!(router.engine().balance_of(asset(2), alice()), GENEROUS);
    let minted = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
    assert_eq!(minted.position_id, 1);
}

#[tokio::test]
async fn slippage_guard_rejects_whole_decrease() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);
    let minted = router.mint(&mint_request(alice(), 1_000_000)).await.expect("mint");

    let err = router
        .decrease(&DecreaseRequest {
            position_id: minted.position_id,
            liquidity: 1_000,
            amount0_min: GENEROUS,
            amount1_min: GENEROUS,
            recipient: alice(),
            deadline: 1_000,
        })
        .await
        .expect_err("must trip the guard");
    assert!(matches!(err, RouterError::Engine(_)));
    let position = router.get_position(minted.position_id).await.expect("position");
    assert_eq!(position.liquidity, 1_000_000);
}

#[tokio::test]
async fn expired_deadline_rejects_whole_batch() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);
    router.engine().advance_time(2_000);

    let err = router.mint(&mint_request(alice(), 1_000)).await.expect_err("expired");
    match err {
        RouterError::Engine(msg) => assert!(msg.contains("deadline")),
        other => panic!("expected engine rejection, got {other:?}"),
    }
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 0);
}

#[tokio::test]
async fn batches_cannot_draw_on_another_callers_funds() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);
    // Bob has nothing; his batch names himself as payer.
    let err = router.mint(&mint_request(bob(), 1_000_000)).await.expect_err("unfunded");
    match err {
        RouterError::Engine(msg) => assert!(msg.contains("payer")),
        other => panic!("expected engine rejection, got {other:?}"),
    }
    // Alice's standing funds were never touchable by Bob's batch.
    assert_eq!(router.engine().balance_of(asset(1), alice()), GENEROUS);
    assert_eq!(router.engine().balance_of(asset(2), alice()), GENEROUS);
    assert!(router.list_owned(bob(), 1, 100).await.expect("scan").is_empty());

    // And Alice's own operation still works afterwards, untouched by Bob's.
    router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
}

#[tokio::test]
async fn scan_returns_owned_ids_ascending() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);
    fund_both(&router, bob(), GENEROUS);

    let first = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
    let second = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
    let other = router.mint(&mint_request(bob(), 1_000)).await.expect("mint");
    let third = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");

    let owned = router.list_owned(alice(), 1, 100).await.expect("scan");
    assert_eq!(
        owned,
        vec![first.position_id, second.position_id, third.position_id]
    );
    assert_eq!(owned.len(), 3);
    let unrelated = router.list_owned(Felt::from(0xDEADu64), 1, 100).await.expect("scan");
    assert!(unrelated.is_empty());
    let bobs = router.list_owned(bob(), 1, 100).await.expect("scan");
    assert_eq!(bobs, vec![other.position_id]);
}

#[tokio::test]
async fn scan_skips_burned_ids_and_bounded_windows() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);

    let first = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
    let second = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
    let third = router.mint(&mint_request(alice(), 1_000)).await.expect("mint");
    router
        .close(&CloseRequest {
            position_id: second.position_id,
            amount0_min: 0,
            amount1_min: 0,
            recipient: alice(),
            deadline: 1_000,
        })
        .await
        .expect("close");

    // The burned id is skipped, not fatal; scanning continues past it.
    let owned = router.list_owned(alice(), 1, 100).await.expect("scan");
    assert_eq!(owned, vec![first.position_id, third.position_id]);

    // Window boundaries: a partial window sees only its slice, a window
    // past the assigned range is empty, never an error.
    let slice = router.list_owned(alice(), 1, 1).await.expect("scan");
    assert_eq!(slice, vec![first.position_id]);
    let beyond = router.list_owned(alice(), 50, 100).await.expect("scan");
    assert!(beyond.is_empty());
}

#[tokio::test]
async fn structural_validation_precedes_engine_calls() {
    let router = router_with_pool().await;
    fund_both(&router, alice(), GENEROUS);

    let mut zero_deadline = mint_request(alice(), 1_000);
    zero_deadline.deadline = 0;
    assert!(matches!(
        router.mint(&zero_deadline).await,
        Err(RouterError::InvalidArgument(_))
    ));

    let mut misaligned = mint_request(alice(), 1_000);
    misaligned.tick_lower = -61;
    assert!(matches!(
        router.mint(&misaligned).await,
        Err(RouterError::InvalidArgument(_))
    ));

    let mut reversed = mint_request(alice(), 1_000);
    reversed.tick_lower = 600;
    reversed.tick_upper = -600;
    assert!(matches!(
        router.mint(&reversed).await,
        Err(RouterError::InvalidArgument(_))
    ));

    let mut empty = mint_request(alice(), 1_000);
    empty.liquidity = 0;
    assert!(matches!(
        router.mint(&empty).await,
        Err(RouterError::InvalidArgument(_))
    ));

    // None of the rejects reached the engine.
    let pool = router.get_pool_state(&pool_params()).await.expect("state");
    assert_eq!(pool.liquidity, 0);
    assert_eq!(router.engine().balance_of(asset(1), alice()), GENEROUS);
}

#[tokio::test]
async fn never_minted_position_is_not_found() {
    let router = router_with_pool().await;
    let err = router.get_position(99).await.expect_err("unknown id");
    match err {
        RouterError::NotFound(msg) => assert!(msg.contains("never minted")),
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn native_asset_rides_as_value_and_change_returns() {
    let params = PoolParams {
        asset_a: NATIVE_ASSET,
        asset_b: asset(2),
        fee: 3000,
        tick_spacing: 60,
        extension: Felt::ZERO,
    };
    let router = PositionRouter::new(SimEngine::new());
    router
        .create_pool(&params, sqrt_price_at_tick(0).expect("price"), 1_000)
        .await
        .expect("create pool");
    router.engine().set_balance(NATIVE_ASSET, alice(), GENEROUS);
    router.engine().set_balance(asset(2), alice(), GENEROUS);

    let max_native = 1u128 << 40;
    router
        .mint(&MintRequest {
            params,
            tick_lower: -600,
            tick_upper: 600,
            liquidity: 1_000_000,
            amount_a_max: max_native,
            amount_b_max: GENEROUS,
            recipient: alice(),
            payer: alice(),
            deadline: 1_000,
        })
        .await
        .expect("mint");

    // The full maximum was prepaid as value and the unused part swept
    // back, so the net native spend is the true required amount, strictly
    // under the cap.
    let native_spent = GENEROUS - router.engine().balance_of(NATIVE_ASSET, alice());
    assert!(native_spent > 0);
    assert!(native_spent < max_native);
}
