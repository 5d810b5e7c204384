//! Tick index <-> Q64.96 square-root price conversions.
//!
//! Ticks discretize the price axis as powers of sqrt(1.0001); tick spacing
//! restricts which ticks are valid position boundaries. All conversions are
//! pure and engine-free.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use starknet::core::types::U256;

use crate::error::RouterError;
use crate::utils::{biguint_to_u256, u256_to_biguint};

/// Tick domain: the ticks whose price fits a 160-bit sqrt ratio.
pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// `sqrt_price_at_tick(MIN_TICK)` and `sqrt_price_at_tick(MAX_TICK)`.
pub const MIN_SQRT_PRICE_X96: u128 = 4_295_128_739;
pub const MAX_SQRT_PRICE_X96_HEX: &str = "fffd8963efd1fc6a506488495d951d5263988d26";

// sqrt(1.0001)^(-2^i) in Q128.128, for each bit of the tick magnitude.
const RATIO_FACTORS: [u128; 20] = [
    0xfffcb933bd6fad37aa2d162d1a594001,
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x09aa508b5b7a84e1c677de54f3e99bc9,
    0x005d6af8dedb81196699c329225ee604,
    0x00002216e584f5fa1ea926041bedfe98,
    0x0000000000048a170391f7dc42444e8fa2,
];

/// Exact exponential mapping `sqrt(1.0001)^tick * 2^96`.
pub fn sqrt_price_at_tick(tick: i32) -> Result<U256, RouterError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(RouterError::InvalidArgument(format!(
            "tick {tick} outside [{MIN_TICK}, {MAX_TICK}]"
        )));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 {
        BigUint::from(RATIO_FACTORS[0])
    } else {
        BigUint::one() << 128
    };
    for (bit, factor) in RATIO_FACTORS.iter().enumerate().skip(1) {
        if abs_tick & (1 << bit) != 0 {
            ratio = (ratio * BigUint::from(*factor)) >> 128;
        }
    }
    if tick > 0 {
        let max = (BigUint::one() << 256usize) - BigUint::one();
        ratio = max / ratio;
    }

    // Narrow Q128.128 to Q64.96, rounding up so the tick-at-price inverse
    // of the result lands back on the same tick.
    let round_up = !(&ratio & ((BigUint::one() << 32usize) - BigUint::one())).is_zero();
    let mut sqrt_price = ratio >> 32;
    if round_up {
        sqrt_price += BigUint::one();
    }
    biguint_to_u256(&sqrt_price)
}

/// Greatest tick whose sqrt price does not exceed `sqrt_price_x96`.
pub fn tick_at_sqrt_price(sqrt_price_x96: U256) -> Result<i32, RouterError> {
    let price = u256_to_biguint(&sqrt_price_x96);
    if price < BigUint::from(MIN_SQRT_PRICE_X96) || price > max_sqrt_price() {
        return Err(RouterError::InvalidArgument(
            "sqrt price outside usable range".to_string(),
        ));
    }

    // The mapping is strictly increasing, so bisect the tick domain.
    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let mid_price = u256_to_biguint(&sqrt_price_at_tick(mid)?);
        if mid_price <= price {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// Raw inverse of `tick_to_price`, then rounded to the nearest multiple of
/// `spacing` less than or equal to it (floor toward negative infinity, not
/// truncation toward zero), clamped into the usable range.
pub fn price_to_tick(sqrt_price_x96: U256, spacing: i32) -> Result<i32, RouterError> {
    let (min_usable, max_usable) = usable_bounds(spacing)?;
    let raw = tick_at_sqrt_price(sqrt_price_x96)?;
    let floored = raw.div_euclid(spacing) * spacing;
    Ok(floored.clamp(min_usable, max_usable))
}

/// Exact price of a tick; no spacing rounding.
pub fn tick_to_price(tick: i32) -> Result<U256, RouterError> {
    sqrt_price_at_tick(tick)
}

/// Smallest and largest multiples of `spacing` inside the tick domain.
/// Both straddle zero for any valid spacing.
pub fn usable_bounds(spacing: i32) -> Result<(i32, i32), RouterError> {
    if spacing <= 0 {
        return Err(RouterError::InvalidArgument(
            "tick spacing must be positive".to_string(),
        ));
    }
    if spacing > MAX_TICK {
        return Err(RouterError::InvalidArgument(
            "tick spacing exceeds tick domain".to_string(),
        ));
    }
    Ok(((MIN_TICK / spacing) * spacing, (MAX_TICK / spacing) * spacing))
}

fn max_sqrt_price() -> BigUint {
    // Parsing a fixed hex literal; cannot fail.
    BigUint::parse_bytes(MAX_SQRT_PRICE_X96_HEX.as_bytes(), 16).unwrap_or_default()
}
