//! Batched read calls with failure-driven chunk splitting.
//!
//! All contract reads go through one [`ChunkedBatchFetcher`] per chain. A
//! batch is submitted as a single Multicall3 `aggregate3` round trip; when
//! the aggregate call itself is rejected for exceeding a capacity limit
//! (out of gas, oversized payload), the call list is split at its midpoint
//! and both halves are fetched concurrently. Result order always matches
//! input order, which downstream code relies on to map results back to
//! their inputs.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use anyhow::Context;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::contracts::IMulticall3;

/// One encoded read call destined for a batched-call collaborator.
#[derive(Debug, Clone)]
pub struct BatchCall {
    /// Contract to call.
    pub target: Address,
    /// ABI-encoded calldata.
    pub calldata: Bytes,
    /// Gas budget for this call, summed into the aggregate call's limit.
    pub gas_limit: u64,
}

impl BatchCall {
    /// Build a call with the default per-call gas budget.
    pub fn new(target: Address, calldata: Vec<u8>) -> Self {
        Self {
            target,
            calldata: calldata.into(),
            gas_limit: DEFAULT_CALL_GAS,
        }
    }

    /// Override the per-call gas budget.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }
}

/// Default gas budget per inner call.
pub const DEFAULT_CALL_GAS: u64 = 1_000_000;

/// Fixed overhead added to the aggregate call's gas limit.
const AGGREGATE_GAS_OVERHEAD: u64 = 500_000;

/// Tagged per-call result from a batched call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Whether the inner call succeeded.
    pub success: bool,
    /// ABI-encoded return data; empty on failure.
    pub return_data: Bytes,
}

impl CallOutcome {
    /// Return data if the call succeeded and returned anything.
    pub fn data(&self) -> Option<&[u8]> {
        (self.success && !self.return_data.is_empty()).then(|| self.return_data.as_ref())
    }
}

/// Errors surfaced by a batched-call collaborator.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The aggregate call was rejected because its combined resource cost
    /// exceeded a collaborator-imposed limit. Recovered by splitting.
    #[error("batched call over capacity: {0}")]
    OverCapacity(String),

    /// Transport or execution failure. Not retried.
    #[error("batched call failed: {0}")]
    Transport(String),

    /// The collaborator returned something we could not decode.
    #[error("batched call returned malformed data: {0}")]
    Decode(String),
}

/// Classifier deciding whether an error is a capacity failure worth a
/// split retry. Injectable so the split logic is testable without a
/// live collaborator.
pub type CapacityClassifier = fn(&BatchError) -> bool;

/// Default classifier: matches the error classes RPC nodes emit when an
/// aggregate call is too large.
pub fn is_capacity_error(err: &BatchError) -> bool {
    match err {
        BatchError::OverCapacity(_) => true,
        BatchError::Transport(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("out of gas")
                || msg.contains("gas required exceeds")
                || msg.contains("exceeds block gas limit")
                || msg.contains("request entity too large")
                || msg.contains("oversized data")
        }
        BatchError::Decode(_) => false,
    }
}

/// A batched-call collaborator: executes an ordered list of calls and
/// returns one tagged outcome per call, in the same order.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, calls: &[BatchCall]) -> Result<Vec<CallOutcome>, BatchError>;
}

/// Production executor backed by Multicall3 `aggregate3` over HTTP.
#[derive(Debug)]
pub struct MulticallExecutor {
    provider: RootProvider,
    multicall: Address,
}

impl MulticallExecutor {
    /// Build an executor over the given HTTP endpoint. The provider is
    /// constructed once and reused for every batch, so a malformed URL
    /// is rejected here rather than on each call.
    pub fn new(rpc_url: impl AsRef<str>, multicall: Address) -> anyhow::Result<Self> {
        let url = rpc_url.as_ref().parse().context("invalid rpc url")?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            multicall,
        })
    }
}

#[async_trait]
impl BatchExecutor for MulticallExecutor {
    async fn execute(&self, calls: &[BatchCall]) -> Result<Vec<CallOutcome>, BatchError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let inner: Vec<IMulticall3::Call3> = calls
            .iter()
            .map(|c| IMulticall3::Call3 {
                target: c.target,
                allowFailure: true,
                callData: c.calldata.clone(),
            })
            .collect();

        use alloy::sol_types::SolCall;
        let calldata = IMulticall3::aggregate3Call { calls: inner }.abi_encode();
        let gas_limit =
            calls.iter().map(|c| c.gas_limit).sum::<u64>() + AGGREGATE_GAS_OVERHEAD;

        let tx = TransactionRequest::default()
            .with_to(self.multicall)
            .with_input(calldata)
            .with_gas_limit(gas_limit);

        let raw = self
            .provider
            .call(tx)
            .await
            .map_err(|e| BatchError::Transport(e.to_string()))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&raw, true)
            .map_err(|e| BatchError::Decode(e.to_string()))?;

        Ok(decoded
            .returnData
            .into_iter()
            .map(|r| CallOutcome {
                success: r.success,
                return_data: r.returnData,
            })
            .collect())
    }
}

/// Executes batched calls, recursively halving the batch on capacity
/// failure until every chunk either succeeds or fails terminally.
#[derive(Clone)]
pub struct ChunkedBatchFetcher {
    executor: Arc<dyn BatchExecutor>,
    is_capacity_error: CapacityClassifier,
}

impl ChunkedBatchFetcher {
    pub fn new(executor: Arc<dyn BatchExecutor>) -> Self {
        Self::with_classifier(executor, is_capacity_error)
    }

    /// Use a custom capacity-error classifier.
    pub fn with_classifier(
        executor: Arc<dyn BatchExecutor>,
        classifier: CapacityClassifier,
    ) -> Self {
        Self {
            executor,
            is_capacity_error: classifier,
        }
    }

    /// Fetch all calls, returning one outcome per call in input order.
    ///
    /// A capacity failure on a list of length 1 is terminal: that single
    /// call's failure is surfaced rather than retried further.
    pub async fn fetch(&self, calls: Vec<BatchCall>) -> Result<Vec<CallOutcome>, BatchError> {
        self.fetch_chunk(calls).await
    }

    fn fetch_chunk(
        &self,
        mut calls: Vec<BatchCall>,
    ) -> BoxFuture<'_, Result<Vec<CallOutcome>, BatchError>> {
        async move {
            if calls.is_empty() {
                return Ok(Vec::new());
            }

            trace!(calls = calls.len(), "submitting batched call");
            match self.executor.execute(&calls).await {
                Ok(outcomes) => {
                    if outcomes.len() != calls.len() {
                        return Err(BatchError::Decode(format!(
                            "expected {} results, got {}",
                            calls.len(),
                            outcomes.len()
                        )));
                    }
                    Ok(outcomes)
                }
                Err(err) if calls.len() > 1 && (self.is_capacity_error)(&err) => {
                    debug!(
                        calls = calls.len(),
                        error = %err,
                        "batched call over capacity, splitting"
                    );
                    let right = calls.split_off(calls.len() / 2);
                    let (mut left, right) =
                        tokio::try_join!(self.fetch_chunk(calls), self.fetch_chunk(right))?;
                    left.extend(right);
                    Ok(left)
                }
                Err(err) => Err(err),
            }
        }
        .boxed()
    }
}
