//! Contract interfaces used by the read path.
//!
//! Everything here is encode/decode only: calls are built with `SolCall`
//! and submitted through Multicall3, never as individual typed RPC calls.

use alloy::primitives::{address, Address};
use alloy::sol;

/// Multicall3 deployment address (identical on every supported EVM chain).
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

sol! {
    /// Multicall3 batched-call aggregator.
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

sol! {
    /// NonfungiblePositionManager read surface.
    ///
    /// `collect` is state-mutating on-chain but is only ever executed here
    /// inside an eth_call simulation to read uncollected fee amounts.
    interface INonfungiblePositionManager {
        struct CollectParams {
            uint256 tokenId;
            address recipient;
            uint128 amount0Max;
            uint128 amount1Max;
        }

        function balanceOf(address owner) external view returns (uint256);

        function tokenOfOwnerByIndex(address owner, uint256 index)
            external view returns (uint256);

        function positions(uint256 tokenId)
            external
            view
            returns (
                uint96 nonce,
                address operator,
                address token0,
                address token1,
                uint24 fee,
                int24 tickLower,
                int24 tickUpper,
                uint128 liquidity,
                uint256 feeGrowthInside0LastX128,
                uint256 feeGrowthInside1LastX128,
                uint128 tokensOwed0,
                uint128 tokensOwed1
            );

        function collect(CollectParams calldata params)
            external payable returns (uint256 amount0, uint256 amount1);
    }
}

sol! {
    /// Concentrated-liquidity pool read surface.
    interface IUniswapV3Pool {
        function slot0()
            external
            view
            returns (
                uint160 sqrtPriceX96,
                int24 tick,
                uint16 observationIndex,
                uint16 observationCardinality,
                uint16 observationCardinalityNext,
                uint8 feeProtocol,
                bool unlocked
            );
    }
}

sol! {
    /// ERC-20 metadata, variable-string form.
    interface IErc20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }

    /// ERC-20 metadata, bytes32 form.
    ///
    /// Some early tokens (MKR among them) return fixed-size byte strings
    /// instead of variable strings; the string-form calls revert or decode
    /// to garbage for those, so both shapes are always requested.
    interface IErc20MetadataBytes32 {
        function name() external view returns (bytes32);
        function symbol() external view returns (bytes32);
    }
}
