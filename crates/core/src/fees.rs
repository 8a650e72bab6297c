//! Background enrichment of uncollected fee amounts.
//!
//! Fee reads are fire-and-forget: they start as soon as a chain's token
//! ids are known and never block primary position assembly. Results land
//! in a side ledger keyed by position identity and are merged into
//! `PositionInfo` whenever both sides are available; a position is valid
//! to display with `fees: None` in the meantime.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use lpscope_chain::contracts::INonfungiblePositionManager;
use lpscope_chain::{BatchCall, ChainContext};

use crate::position::{PositionInfo, PositionKey};

/// Side map of uncollected fee amounts per position.
#[derive(Default)]
pub struct FeeLedger {
    fees: DashMap<PositionKey, (U256, U256)>,
}

impl FeeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Option<(U256, U256)> {
        self.fees.get(key).map(|f| *f)
    }

    pub fn record(&self, key: PositionKey, amounts: (U256, U256)) {
        self.fees.insert(key, amounts);
    }

    /// Merge any recorded fee amounts into the given positions.
    pub fn apply(&self, positions: &mut [PositionInfo]) {
        for position in positions {
            if position.fees.is_none() {
                position.fees = self.get(&position.key());
            }
        }
    }
}

/// Read uncollected fees for every token id via one batched call of
/// simulated `collect` invocations (maximum amounts, never submitted).
pub async fn enrich_fees(
    chain: Arc<ChainContext>,
    owner: Address,
    token_ids: Vec<U256>,
    ledger: Arc<FeeLedger>,
) {
    if token_ids.is_empty() {
        return;
    }

    let calls: Vec<BatchCall> = token_ids
        .iter()
        .map(|&token_id| {
            let call = INonfungiblePositionManager::collectCall {
                params: INonfungiblePositionManager::CollectParams {
                    tokenId: token_id,
                    recipient: owner,
                    amount0Max: u128::MAX,
                    amount1Max: u128::MAX,
                },
            };
            BatchCall::new(chain.position_manager, call.abi_encode())
        })
        .collect();

    let outcomes = match chain.fetcher.fetch(calls).await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            warn!(chain = %chain.name, error = %err, "fee enrichment batch failed");
            return;
        }
    };

    let mut recorded = 0usize;
    for (token_id, outcome) in token_ids.iter().zip(outcomes) {
        let Some(data) = outcome.data() else { continue };
        match INonfungiblePositionManager::collectCall::abi_decode_returns(data, true) {
            Ok(ret) => {
                ledger.record((chain.chain_id, *token_id), (ret.amount0, ret.amount1));
                recorded += 1;
            }
            Err(err) => {
                warn!(chain = %chain.name, token_id = %token_id, error = %err, "undecodable collect result");
            }
        }
    }

    debug!(chain = %chain.name, positions = recorded, "fee enrichment complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;
    use async_trait::async_trait;
    use lpscope_chain::{BatchError, BatchExecutor, CallOutcome};

    struct CollectExecutor;

    #[async_trait]
    impl BatchExecutor for CollectExecutor {
        async fn execute(&self, calls: &[BatchCall]) -> Result<Vec<CallOutcome>, BatchError> {
            Ok(calls
                .iter()
                .map(|call| {
                    let decoded =
                        INonfungiblePositionManager::collectCall::abi_decode(&call.calldata, true)
                            .expect("collect calldata");
                    // Fees proportional to the token id, so assertions can
                    // tell results apart.
                    let id = decoded.params.tokenId;
                    CallOutcome {
                        success: true,
                        return_data: (id * U256::from(10), id * U256::from(20))
                            .abi_encode()
                            .into(),
                    }
                })
                .collect())
        }
    }

    fn test_chain() -> Arc<ChainContext> {
        Arc::new(ChainContext::with_executor(
            1,
            "testchain",
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Arc::new(CollectExecutor),
        ))
    }

    #[tokio::test]
    async fn records_fees_per_token_id() {
        let ledger = Arc::new(FeeLedger::new());
        let chain = test_chain();

        enrich_fees(
            chain,
            Address::repeat_byte(0xAA),
            vec![U256::from(7), U256::from(9)],
            ledger.clone(),
        )
        .await;

        assert_eq!(
            ledger.get(&(1, U256::from(7))),
            Some((U256::from(70), U256::from(140)))
        );
        assert_eq!(
            ledger.get(&(1, U256::from(9))),
            Some((U256::from(90), U256::from(180)))
        );
        // No entry for a chain that was never enriched.
        assert!(ledger.get(&(2, U256::from(7))).is_none());
    }

    #[tokio::test]
    async fn empty_id_list_is_a_no_op() {
        let ledger = Arc::new(FeeLedger::new());
        enrich_fees(test_chain(), Address::repeat_byte(0xAA), Vec::new(), ledger.clone()).await;
        assert!(ledger.fees.is_empty());
    }
}
