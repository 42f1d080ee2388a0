//! Follows a submitted transaction until it is buried deep enough, fails,
//! disappears in a reorganization, or times out.

use super::{
    eth::Eth,
    provider::ProviderError,
    Receipt, TransactionStatus,
};
use alloy::primitives::{B256, U256};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatcherError {
    #[error("node request failed: {0}")]
    ResponseError(ProviderError),
    #[error("transaction failed on chain")]
    TransactionFailed,
    #[error("transaction was dropped by a chain reorganization")]
    ChainReorganized,
    #[error("transaction was not mined within the block timeout")]
    BlockTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("block timeout must be at least one block")]
    ZeroBlockTimeout,
    #[error("confirmation blocks must be at least one block")]
    ZeroConfirmationBlocks,
    #[error("polling interval must be positive")]
    ZeroPollingInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    block_timeout: u64,
    confirmation_blocks: u64,
    polling_interval: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            block_timeout: 50,
            confirmation_blocks: 24,
            polling_interval: Duration::from_secs(1),
        }
    }
}

impl WatcherOptions {
    pub fn new(
        block_timeout: u64,
        confirmation_blocks: u64,
        polling_interval: Duration,
    ) -> Result<Self, OptionsError> {
        if block_timeout == 0 {
            return Err(OptionsError::ZeroBlockTimeout);
        }
        if confirmation_blocks == 0 {
            return Err(OptionsError::ZeroConfirmationBlocks);
        }
        if polling_interval.is_zero() {
            return Err(OptionsError::ZeroPollingInterval);
        }

        Ok(Self {
            block_timeout,
            confirmation_blocks,
            polling_interval,
        })
    }

    /// Blocks to wait for a receipt before giving up.
    pub fn block_timeout(&self) -> u64 {
        self.block_timeout
    }

    /// Blocks on top of the transaction's block required for success.
    pub fn confirmation_blocks(&self) -> u64 {
        self.confirmation_blocks
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }
}

#[derive(Clone)]
pub struct TransactionWatcher {
    eth: Eth,
    options: WatcherOptions,
}

impl TransactionWatcher {
    pub fn new(eth: Eth, options: WatcherOptions) -> Self {
        Self { eth, options }
    }

    pub fn options(&self) -> &WatcherOptions {
        &self.options
    }

    /// Starts polling for `hash` on a background task.
    ///
    /// Must be called within a tokio runtime. Dropping the returned stream
    /// stops the polling.
    pub fn wait_for_receipt(&self, hash: B256) -> TransactionWatch {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let poller = ReceiptPoller {
            eth: self.eth.clone(),
            options: self.options,
            hash,
            receipt: None,
        };
        tokio::spawn(poller.run(sender));

        TransactionWatch { receiver }
    }
}

type StatusItem = Result<TransactionStatus, WatcherError>;

/// Live status sequence of one transaction.
///
/// Yields `Pending`, any number of `Confirmed`, then either `Successful`
/// followed by the end of the stream, or a single error.
pub struct TransactionWatch {
    receiver: mpsc::Receiver<StatusItem>,
}

impl TransactionWatch {
    pub async fn next_status(&mut self) -> Option<StatusItem> {
        self.receiver.recv().await
    }

    /// Stops the background polling. Equivalent to dropping the watch.
    pub fn cancel(mut self) {
        self.receiver.close();
    }
}

impl Stream for TransactionWatch {
    type Item = StatusItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Whether the poll loop should keep going.
enum Step {
    Continue,
    Done,
}

struct ReceiptPoller {
    eth: Eth,
    options: WatcherOptions,
    hash: B256,
    receipt: Option<Receipt>,
}

impl ReceiptPoller {
    async fn run(mut self, sender: mpsc::Sender<StatusItem>) {
        let hash = self.hash;
        let outcome = tokio::select! {
            biased;
            _ = sender.closed() => {
                debug!("Watch of {:?} cancelled", hash);
                return;
            }
            outcome = self.poll(&sender) => outcome,
        };

        if let Err(error) = outcome {
            info!("Watch of {:?} ended: {}", hash, error);
            let _ = sender.send(Err(error)).await;
        }
    }

    async fn poll(&mut self, sender: &mpsc::Sender<StatusItem>) -> Result<(), WatcherError> {
        let first_block = self.block_number().await?;
        let mut previous_block = first_block;
        if !emit(sender, TransactionStatus::Pending).await {
            return Ok(());
        }

        loop {
            let block = self.block_number().await?;
            match self.step(sender, first_block, &mut previous_block, block).await? {
                Step::Continue => tokio::time::sleep(self.options.polling_interval).await,
                Step::Done => return Ok(()),
            }
        }
    }

    async fn step(
        &mut self,
        sender: &mpsc::Sender<StatusItem>,
        first_block: U256,
        previous_block: &mut U256,
        block: U256,
    ) -> Result<Step, WatcherError> {
        if self.receipt.is_none() {
            self.receipt = self.fetch_receipt().await?;
        }

        let Some(receipt) = self.receipt.clone() else {
            let waited = block.saturating_sub(first_block);
            if block > first_block && waited >= U256::from(self.options.block_timeout) {
                return Err(WatcherError::BlockTimeout);
            }
            debug!("{:?} not mined yet at block {}", self.hash, block);
            return Ok(Step::Continue);
        };

        if receipt.is_failure() {
            return Err(WatcherError::TransactionFailed);
        }

        if block > *previous_block {
            if self.fetch_receipt().await?.is_none() {
                warn!("Receipt of {:?} vanished at block {}", self.hash, block);
                return Err(WatcherError::ChainReorganized);
            }

            let confirmations = block.saturating_sub(receipt.block_number);
            *previous_block = block;

            if confirmations >= U256::from(self.options.confirmation_blocks) {
                info!(
                    "{:?} confirmed by {} blocks",
                    self.hash, confirmations
                );
                emit(sender, TransactionStatus::Successful { receipt }).await;
                return Ok(Step::Done);
            }

            let status = TransactionStatus::Confirmed {
                receipt,
                confirmations,
            };
            if !emit(sender, status).await {
                return Ok(Step::Done);
            }
        }

        Ok(Step::Continue)
    }

    async fn block_number(&self) -> Result<U256, WatcherError> {
        self.eth
            .block_number()
            .await
            .map_err(WatcherError::ResponseError)
    }

    /// `None` while the node has no receipt for the hash.
    async fn fetch_receipt(&self) -> Result<Option<Receipt>, WatcherError> {
        match self.eth.get_transaction_receipt(self.hash).await {
            Ok(receipt) => Ok(receipt),
            Err(ProviderError::EmptyResponse) => Ok(None),
            Err(e) => Err(WatcherError::ResponseError(e)),
        }
    }
}

/// `false` once the consumer is gone.
async fn emit(sender: &mpsc::Sender<StatusItem>, status: TransactionStatus) -> bool {
    sender.send(Ok(status)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::mock::MockProvider;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const HASH: B256 = B256::repeat_byte(0x42);

    fn receipt_json(block: u64, status: u64) -> Value {
        json!({
            "transactionHash": HASH,
            "transactionIndex": "0x0",
            "blockHash": B256::repeat_byte(0x07),
            "blockNumber": U256::from(block),
            "gasUsed": "0x5208",
            "cumulativeGasUsed": "0x5208",
            "status": U256::from(status),
            "logs": []
        })
    }

    fn heads(blocks: &[u64]) -> Vec<Result<Value, ProviderError>> {
        blocks.iter().map(|b| Ok(json!(U256::from(*b)))).collect()
    }

    fn watcher(provider: &Arc<MockProvider>, timeout: u64, confirmations: u64) -> TransactionWatcher {
        let options = WatcherOptions::new(timeout, confirmations, Duration::from_millis(5)).unwrap();
        TransactionWatcher::new(Eth::new(provider.clone()), options)
    }

    async fn collect(watch: TransactionWatch) -> Vec<StatusItem> {
        tokio::time::timeout(Duration::from_secs(5), watch.collect::<Vec<_>>())
            .await
            .expect("watch did not terminate")
    }

    #[test]
    fn test_options_reject_zero_values() {
        assert_eq!(
            WatcherOptions::new(0, 1, Duration::from_secs(1)),
            Err(OptionsError::ZeroBlockTimeout)
        );
        assert_eq!(
            WatcherOptions::new(1, 0, Duration::from_secs(1)),
            Err(OptionsError::ZeroConfirmationBlocks)
        );
        assert_eq!(
            WatcherOptions::new(1, 1, Duration::ZERO),
            Err(OptionsError::ZeroPollingInterval)
        );

        let defaults = WatcherOptions::default();
        assert_eq!(defaults.block_timeout(), 50);
        assert_eq!(defaults.confirmation_blocks(), 24);
    }

    #[tokio::test]
    async fn test_confirms_then_succeeds() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[100, 100, 101, 102, 103]));
        provider.respond("eth_getTransactionReceipt", receipt_json(100, 1));

        let statuses = collect(watcher(&provider, 10, 3).wait_for_receipt(HASH)).await;
        let receipt: Receipt = serde_json::from_value(receipt_json(100, 1)).unwrap();

        assert_eq!(
            statuses,
            vec![
                Ok(TransactionStatus::Pending),
                Ok(TransactionStatus::Confirmed {
                    receipt: receipt.clone(),
                    confirmations: U256::from(1)
                }),
                Ok(TransactionStatus::Confirmed {
                    receipt: receipt.clone(),
                    confirmations: U256::from(2)
                }),
                Ok(TransactionStatus::Successful { receipt }),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_status_while_head_is_unchanged() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[7, 7, 7, 7, 8]));
        provider.respond("eth_getTransactionReceipt", receipt_json(7, 1));

        let statuses = collect(watcher(&provider, 10, 1).wait_for_receipt(HASH)).await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], Ok(TransactionStatus::Pending));
        assert!(matches!(
            statuses[1],
            Ok(TransactionStatus::Successful { .. })
        ));
        assert_eq!(provider.calls("eth_getTransactionReceipt"), 2);
    }

    #[tokio::test]
    async fn test_empty_response_means_not_mined() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[20, 20, 21, 22]));
        provider.script(
            "eth_getTransactionReceipt",
            vec![
                Err(ProviderError::EmptyResponse),
                Ok(Value::Null),
                Ok(receipt_json(21, 1)),
            ],
        );

        let statuses = collect(watcher(&provider, 10, 1).wait_for_receipt(HASH)).await;

        assert_eq!(statuses.len(), 2);
        assert!(matches!(
            &statuses[1],
            Ok(TransactionStatus::Successful { receipt }) if receipt.block_number == U256::from(21)
        ));
    }

    #[tokio::test]
    async fn test_block_timeout() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[100, 100, 101, 102, 103, 104]));
        provider.respond("eth_getTransactionReceipt", Value::Null);

        let statuses = collect(watcher(&provider, 3, 1).wait_for_receipt(HASH)).await;

        assert_eq!(
            statuses,
            vec![Ok(TransactionStatus::Pending), Err(WatcherError::BlockTimeout)]
        );
        assert_eq!(provider.calls("eth_blockNumber"), 5);
    }

    #[tokio::test]
    async fn test_failed_transaction() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[5, 5]));
        provider.respond("eth_getTransactionReceipt", receipt_json(5, 0));

        let statuses = collect(watcher(&provider, 10, 2).wait_for_receipt(HASH)).await;

        assert_eq!(
            statuses,
            vec![
                Ok(TransactionStatus::Pending),
                Err(WatcherError::TransactionFailed)
            ]
        );
    }

    #[tokio::test]
    async fn test_chain_reorganization() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[10, 10, 11]));
        provider.script(
            "eth_getTransactionReceipt",
            vec![Ok(receipt_json(10, 1)), Ok(Value::Null)],
        );

        let statuses = collect(watcher(&provider, 10, 5).wait_for_receipt(HASH)).await;

        assert_eq!(
            statuses,
            vec![
                Ok(TransactionStatus::Pending),
                Err(WatcherError::ChainReorganized)
            ]
        );
    }

    #[tokio::test]
    async fn test_confirmations_count_from_first_receipt() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[10, 10, 11]));
        provider.script(
            "eth_getTransactionReceipt",
            vec![Ok(receipt_json(10, 1)), Ok(receipt_json(12, 1))],
        );

        let mut watch = watcher(&provider, 10, 5).wait_for_receipt(HASH);
        let first: Receipt = serde_json::from_value(receipt_json(10, 1)).unwrap();

        assert_eq!(watch.next_status().await, Some(Ok(TransactionStatus::Pending)));
        assert_eq!(
            watch.next_status().await,
            Some(Ok(TransactionStatus::Confirmed {
                receipt: first,
                confirmations: U256::from(1)
            }))
        );
        assert_eq!(provider.calls("eth_getTransactionReceipt"), 2);
        watch.cancel();
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let provider = Arc::new(MockProvider::new());
        provider.script("eth_blockNumber", heads(&[1, 1]));
        provider.fail(
            "eth_getTransactionReceipt",
            ProviderError::ServerError("boom".into()),
        );

        let statuses = collect(watcher(&provider, 10, 1).wait_for_receipt(HASH)).await;

        assert_eq!(
            statuses,
            vec![
                Ok(TransactionStatus::Pending),
                Err(WatcherError::ResponseError(ProviderError::ServerError(
                    "boom".into()
                )))
            ]
        );
    }

    #[tokio::test]
    async fn test_head_failure_before_pending() {
        let provider = Arc::new(MockProvider::new());
        provider.fail("eth_blockNumber", ProviderError::RequestFailed("offline".into()));

        let statuses = collect(watcher(&provider, 10, 1).wait_for_receipt(HASH)).await;

        assert_eq!(
            statuses,
            vec![Err(WatcherError::ResponseError(ProviderError::RequestFailed(
                "offline".into()
            )))]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let provider = Arc::new(MockProvider::new());
        provider.respond("eth_blockNumber", json!("0x1"));
        provider.respond("eth_getTransactionReceipt", Value::Null);

        let mut watch = watcher(&provider, 1_000, 1).wait_for_receipt(HASH);
        assert_eq!(watch.next_status().await, Some(Ok(TransactionStatus::Pending)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        watch.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = provider.total_calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.total_calls(), settled);
    }

    #[tokio::test]
    async fn test_drop_stops_polling() {
        let provider = Arc::new(MockProvider::new());
        provider.respond("eth_blockNumber", json!("0x1"));
        provider.respond("eth_getTransactionReceipt", Value::Null);

        let watch = watcher(&provider, 1_000, 1).wait_for_receipt(HASH);
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(watch);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = provider.total_calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.total_calls(), settled);
    }
}
