pub mod abi;
pub mod contract;
pub mod eth;
pub mod invocation;
pub mod provider;
pub mod typed;
pub mod utils;
pub mod watcher;

#[cfg(test)]
pub(crate) mod mock;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, B256, U256},
};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// Decoded return values or event fields, keyed by parameter name.
///
/// Unnamed parameters are keyed by their position (`"0"`, `"1"`, ...).
pub type ResultMap = HashMap<String, DynSolValue>;

/// A read-only message call (`eth_call` / `eth_estimateGas` payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    pub data: Bytes,
}

/// A state-changing transaction (`eth_sendTransaction` payload).
///
/// `to` is absent for contract deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    pub gas: U256,
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// Sender-side parameters shared by `create_transaction` and `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub nonce: Option<U256>,
    pub from: Address,
    pub value: Option<U256>,
    pub gas: U256,
    pub gas_price: Option<U256>,
}

impl TransactionOptions {
    pub fn new(from: Address, gas: U256) -> Self {
        Self {
            nonce: None,
            from,
            value: None,
            gas,
            gas_price: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = Some(gas_price);
        self
    }
}

/// Block selector for state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Earliest,
    Pending,
    Number(U256),
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockTag::Latest => serializer.serialize_str("latest"),
            BlockTag::Earliest => serializer.serialize_str("earliest"),
            BlockTag::Pending => serializer.serialize_str("pending"),
            BlockTag::Number(number) => number.serialize(serializer),
        }
    }
}

/// A log entry as returned by `eth_getLogs` or embedded in a receipt.
///
/// Position fields are `None` for logs of a pending transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U256>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub transaction_index: Option<U256>,
    #[serde(default)]
    pub log_index: Option<U256>,
    #[serde(default)]
    pub removed: Option<bool>,
}

/// A mined transaction's receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub transaction_index: Option<U256>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    pub block_number: U256,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub cumulative_gas_used: Option<U256>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `0` on failure, `1` on success. Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<U256>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn is_failure(&self) -> bool {
        self.status == Some(U256::ZERO)
    }
}

/// A transaction as returned by `eth_getTransactionByHash` or inside a full block.
///
/// Position fields are `None` while the transaction is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionObject {
    pub hash: B256,
    pub nonce: U256,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U256>,
    #[serde(default)]
    pub transaction_index: Option<U256>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub gas_price: Option<U256>,
    pub gas: U256,
    #[serde(alias = "data")]
    pub input: Bytes,
}

/// Transactions of a block: hashes only, or full objects when requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Hashes(Vec<B256>),
    Full(Vec<TransactionObject>),
}

impl Default for BlockTransactions {
    fn default() -> Self {
        BlockTransactions::Hashes(Vec::new())
    }
}

impl BlockTransactions {
    pub fn len(&self) -> usize {
        match self {
            BlockTransactions::Hashes(hashes) => hashes.len(),
            BlockTransactions::Full(transactions) => transactions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A block header plus its transactions. `number` and `hash` are `None`
/// for the pending block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub number: Option<U256>,
    #[serde(default)]
    pub hash: Option<B256>,
    pub parent_hash: B256,
    #[serde(default)]
    pub miner: Option<Address>,
    pub timestamp: U256,
    pub gas_limit: U256,
    pub gas_used: U256,
    #[serde(default)]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub transactions: BlockTransactions,
}

/// Result of `eth_syncing`: `false`, or the node's sync progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncStatus {
    #[serde(rename_all = "camelCase")]
    Syncing {
        starting_block: U256,
        current_block: U256,
        highest_block: U256,
    },
    NotSyncing(bool),
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing { .. })
    }
}

/// Progress of a watched transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Confirmed {
        receipt: Receipt,
        confirmations: U256,
    },
    Successful {
        receipt: Receipt,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_tag_serialization() {
        assert_eq!(serde_json::to_value(BlockTag::Latest).unwrap(), json!("latest"));
        assert_eq!(serde_json::to_value(BlockTag::Pending).unwrap(), json!("pending"));
        assert_eq!(
            serde_json::to_value(BlockTag::Number(U256::from(255))).unwrap(),
            json!("0xff")
        );
    }

    #[test]
    fn test_call_skips_absent_fields() {
        let call = Call {
            from: None,
            to: Address::repeat_byte(0x11),
            gas: None,
            gas_price: None,
            value: None,
            data: Bytes::from(vec![0xde, 0xad]),
        };

        let value = serde_json::to_value(&call).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["data"], json!("0xdead"));
    }

    #[test]
    fn test_receipt_deserialization() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x1b4",
            "status": "0x0",
            "logs": []
        }))
        .unwrap();

        assert_eq!(receipt.block_number, U256::from(0x1b4));
        assert!(receipt.is_failure());
        assert!(receipt.logs.is_empty());
    }
}
