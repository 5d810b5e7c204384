use num_bigint::BigUint;
use num_traits::ToPrimitive;
use starknet::core::types::{Event, Felt, TransactionReceipt, U256};

use crate::error::RouterError;

pub type Address = Felt;

const STARK_FIELD_MODULUS_HEX: &str =
    "800000000000011000000000000000000000000000000000000000000000001";

pub fn parse_felt(value: &str) -> Result<Felt, RouterError> {
    if value.starts_with("0x") {
        Felt::from_hex(value).map_err(|_| RouterError::InvalidArgument("invalid felt".to_string()))
    } else {
        Felt::from_dec_str(value)
            .map_err(|_| RouterError::InvalidArgument("invalid felt".to_string()))
    }
}

pub fn felt_to_u128(value: &Felt) -> Result<u128, RouterError> {
    let bytes = value.to_bytes_be();
    if bytes[..16].iter().any(|b| *b != 0) {
        return Err(RouterError::Rpc("felt exceeds u128".to_string()));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes[16..32]);
    Ok(u128::from_be_bytes(buf))
}

pub fn felt_to_u64(value: &Felt) -> Result<u64, RouterError> {
    let as_u128 = felt_to_u128(value)?;
    if as_u128 > u64::MAX as u128 {
        return Err(RouterError::Rpc("felt exceeds u64".to_string()));
    }
    Ok(as_u128 as u64)
}

pub fn felt_to_i32(value: &Felt) -> Result<i32, RouterError> {
    let modulus = stark_field_modulus()?;
    let as_big = felt_to_biguint(value);
    let max = BigUint::from(i32::MAX as u32);
    if as_big <= max {
        return as_big
            .to_i32()
            .ok_or_else(|| RouterError::Rpc("felt out of i32 range".to_string()));
    }

    let min_abs = BigUint::from(1u32) << 31;
    let lower_bound = &modulus - &min_abs;
    if as_big < lower_bound {
        return Err(RouterError::Rpc("felt out of i32 range".to_string()));
    }

    let mag = &modulus - &as_big;
    let mag_u32 = mag
        .to_u32()
        .ok_or_else(|| RouterError::Rpc("felt out of i32 range".to_string()))?;
    if mag_u32 == 0 || mag_u32 > (1u32 << 31) {
        return Err(RouterError::Rpc("felt out of i32 range".to_string()));
    }
    if mag_u32 == (1u32 << 31) {
        return Ok(i32::MIN);
    }
    Ok(-(mag_u32 as i32))
}

pub fn i32_to_felt(value: i32) -> Result<Felt, RouterError> {
    if value >= 0 {
        return Ok(Felt::from(value as u64));
    }
    let modulus = stark_field_modulus()?;
    let mag = BigUint::from(value.unsigned_abs());
    let result = modulus - mag;
    let bytes = result.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(Felt::from_bytes_be(&out))
}

pub fn felt_to_biguint(value: &Felt) -> BigUint {
    BigUint::from_bytes_be(&value.to_bytes_be())
}

pub fn u256_to_biguint(value: &U256) -> BigUint {
    (BigUint::from(value.high()) << 128) + BigUint::from(value.low())
}

pub fn biguint_to_u256(value: &BigUint) -> Result<U256, RouterError> {
    if value.bits() > 256 {
        return Err(RouterError::Rpc("value exceeds u256".to_string()));
    }
    let mask = (BigUint::from(1u8) << 128) - BigUint::from(1u8);
    let low = (value & &mask)
        .to_u128()
        .ok_or_else(|| RouterError::Rpc("value exceeds u256".to_string()))?;
    let high = (value >> 128u32)
        .to_u128()
        .ok_or_else(|| RouterError::Rpc("value exceeds u256".to_string()))?;
    Ok(U256::from_words(low, high))
}

pub trait StarknetEvent: Sized {
    fn selector() -> Felt;
    fn from_event(keys: &[Felt], data: &[Felt]) -> Option<Self>;
}

pub fn parse_event<T: StarknetEvent>(receipt: &TransactionReceipt) -> Option<T> {
    for event in receipt_events(receipt) {
        let keys = &event.keys;
        if keys.first().copied() == Some(T::selector()) {
            return T::from_event(keys, &event.data);
        }
    }
    None
}

fn receipt_events(receipt: &TransactionReceipt) -> &[Event] {
    match receipt {
        TransactionReceipt::Invoke(inner) => &inner.events,
        TransactionReceipt::L1Handler(inner) => &inner.events,
        TransactionReceipt::Declare(inner) => &inner.events,
        TransactionReceipt::Deploy(inner) => &inner.events,
        TransactionReceipt::DeployAccount(inner) => &inner.events,
    }
}

fn stark_field_modulus() -> Result<BigUint, RouterError> {
    BigUint::parse_bytes(STARK_FIELD_MODULUS_HEX.as_bytes(), 16)
        .ok_or_else(|| RouterError::Rpc("invalid field modulus".to_string()))
}
