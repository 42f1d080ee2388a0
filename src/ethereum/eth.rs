//! The `eth_*` JSON-RPC namespace.

use super::{
    provider::Provider, provider::ProviderError, Block, BlockTag, Call, Log, Receipt, SyncStatus,
    Transaction, TransactionObject,
};
use alloy::{
    primitives::{Address, Bytes, B256, U256},
    rpc::types::Filter,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Typed access to the `eth` namespace of a node.
#[derive(Clone)]
pub struct Eth {
    provider: Arc<dyn Provider>,
}

impl Eth {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Sends a request whose result is mandatory. A `null` result is an
    /// [`ProviderError::EmptyResponse`].
    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, ProviderError> {
        match self.provider.send(method, params).await? {
            Value::Null => Err(ProviderError::EmptyResponse),
            value => decode(method, value),
        }
    }

    /// Sends a request whose result may legitimately be `null`.
    async fn request_optional<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<R>, ProviderError> {
        match self.provider.send(method, params).await? {
            Value::Null => Ok(None),
            value => decode(method, value).map(Some),
        }
    }

    /// `web3_clientVersion`.
    pub async fn client_version(&self) -> Result<String, ProviderError> {
        self.request("web3_clientVersion", Value::Array(vec![])).await
    }

    /// `net_version`: the network id as a decimal string.
    pub async fn net_version(&self) -> Result<String, ProviderError> {
        self.request("net_version", Value::Array(vec![])).await
    }

    /// `net_peerCount`.
    pub async fn peer_count(&self) -> Result<U256, ProviderError> {
        self.request("net_peerCount", Value::Array(vec![])).await
    }

    pub async fn protocol_version(&self) -> Result<String, ProviderError> {
        self.request("eth_protocolVersion", Value::Array(vec![])).await
    }

    pub async fn syncing(&self) -> Result<SyncStatus, ProviderError> {
        self.request("eth_syncing", Value::Array(vec![])).await
    }

    /// Accounts managed by the node, usable as `from` in `send_transaction`.
    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.request("eth_accounts", Value::Array(vec![])).await
    }

    pub async fn block_number(&self) -> Result<U256, ProviderError> {
        self.request("eth_blockNumber", Value::Array(vec![])).await
    }

    pub async fn chain_id(&self) -> Result<U256, ProviderError> {
        self.request("eth_chainId", Value::Array(vec![])).await
    }

    pub async fn gas_price(&self) -> Result<U256, ProviderError> {
        self.request("eth_gasPrice", Value::Array(vec![])).await
    }

    pub async fn get_balance(&self, address: Address, block: BlockTag) -> Result<U256, ProviderError> {
        self.request("eth_getBalance", params((address, block))?).await
    }

    pub async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockTag,
    ) -> Result<U256, ProviderError> {
        self.request("eth_getTransactionCount", params((address, block))?)
            .await
    }

    pub async fn get_storage_at(
        &self,
        address: Address,
        position: U256,
        block: BlockTag,
    ) -> Result<B256, ProviderError> {
        self.request("eth_getStorageAt", params((address, position, block))?)
            .await
    }

    pub async fn get_code(&self, address: Address, block: BlockTag) -> Result<Bytes, ProviderError> {
        self.request("eth_getCode", params((address, block))?).await
    }

    pub async fn call(&self, call: &Call, block: BlockTag) -> Result<Bytes, ProviderError> {
        self.request("eth_call", params((call, block))?).await
    }

    pub async fn estimate_gas(&self, call: &Call) -> Result<U256, ProviderError> {
        self.request("eth_estimateGas", params([call])?).await
    }

    pub async fn send_transaction(&self, transaction: &Transaction) -> Result<B256, ProviderError> {
        self.request("eth_sendTransaction", params([transaction])?)
            .await
    }

    pub async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, ProviderError> {
        self.request("eth_sendRawTransaction", params([raw])?).await
    }

    /// `Ok(None)` for an unknown block. With `full` the block carries
    /// transaction objects instead of hashes.
    pub async fn get_block_by_number(
        &self,
        block: BlockTag,
        full: bool,
    ) -> Result<Option<Block>, ProviderError> {
        self.request_optional("eth_getBlockByNumber", params((block, full))?)
            .await
    }

    pub async fn get_block_by_hash(
        &self,
        hash: B256,
        full: bool,
    ) -> Result<Option<Block>, ProviderError> {
        self.request_optional("eth_getBlockByHash", params((hash, full))?)
            .await
    }

    /// `Ok(None)` for a hash the node has never seen.
    pub async fn get_transaction_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionObject>, ProviderError> {
        self.request_optional("eth_getTransactionByHash", params([hash])?)
            .await
    }

    /// `Ok(None)` while the transaction is not mined.
    pub async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<Receipt>, ProviderError> {
        self.request_optional("eth_getTransactionReceipt", params([hash])?)
            .await
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError> {
        self.request("eth_getLogs", params([filter])?).await
    }
}

fn params<T: Serialize>(value: T) -> Result<Value, ProviderError> {
    serde_json::to_value(value).map_err(|e| ProviderError::RequestFailed(e.to_string()))
}

fn decode<R: DeserializeOwned>(method: &str, value: Value) -> Result<R, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::DecodingError(format!("{}: {}", method, e)))
}
