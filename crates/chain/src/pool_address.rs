//! Deterministic pool address derivation.
//!
//! Pools are CREATE2 deployments of the factory, so the address of the
//! pool for a (token pair, fee tier) is a pure function of the factory
//! address and the pool init code hash. Derivation never changes once
//! computed, which is why the pool-address cache has no invalidation.

use alloy::primitives::{b256, keccak256, Address, B256, U256};
use alloy::sol_types::SolValue;

/// Init code hash of the canonical UniswapV3Pool; forks override this
/// per chain in configuration.
pub const POOL_INIT_CODE_HASH: B256 =
    b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54");

/// Order a token pair the way the factory does (ascending by address).
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Compute the pool address for a token pair and fee tier.
pub fn compute_pool_address(
    factory: Address,
    token_a: Address,
    token_b: Address,
    fee: u32,
    init_code_hash: B256,
) -> Address {
    let (token0, token1) = sort_tokens(token_a, token_b);
    let salt = keccak256((token0, token1, U256::from(fee)).abi_encode());
    factory.create2(salt, init_code_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

    #[test]
    fn derives_known_mainnet_pool() {
        // USDC/WETH 0.05% on mainnet.
        let pool = compute_pool_address(FACTORY, USDC, WETH, 500, POOL_INIT_CODE_HASH);
        assert_eq!(
            pool,
            address!("88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640")
        );
    }

    #[test]
    fn derivation_is_order_independent() {
        let a = compute_pool_address(FACTORY, USDC, WETH, 3000, POOL_INIT_CODE_HASH);
        let b = compute_pool_address(FACTORY, WETH, USDC, 3000, POOL_INIT_CODE_HASH);
        assert_eq!(a, b);
    }

    #[test]
    fn sorts_ascending() {
        let (t0, t1) = sort_tokens(WETH, USDC);
        assert_eq!((t0, t1), (USDC, WETH));
        assert_eq!(sort_tokens(USDC, WETH), (USDC, WETH));
    }
}
