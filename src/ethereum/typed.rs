//! Strongly typed views over invocation results and event logs.

use super::{
    contract::result_key,
    invocation::{Invocation, InvocationError},
    BlockTag, Call, Log, ResultMap, Transaction, TransactionOptions,
};
use alloy::{
    dyn_abi::EventExt,
    json_abi::Event,
    primitives::{Address, Bytes, B256, U256},
};
use std::sync::Arc;
use thiserror::Error;

type Cast<T> = Arc<dyn Fn(&ResultMap) -> anyhow::Result<T> + Send + Sync>;

/// An invocation whose call result is converted into `T`.
pub struct TypedInvocation<T> {
    invocation: Box<dyn Invocation>,
    cast: Cast<T>,
}

impl<T> TypedInvocation<T> {
    pub fn new(
        invocation: Box<dyn Invocation>,
        cast: impl Fn(&ResultMap) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            invocation,
            cast: Arc::new(cast),
        }
    }

    pub fn invocation(&self) -> &dyn Invocation {
        self.invocation.as_ref()
    }

    pub async fn call(&self) -> Result<T, InvocationError> {
        self.call_at(BlockTag::Latest).await
    }

    /// Inner errors pass through untouched; a failed cast is a `DecodingError`.
    pub async fn call_at(&self, block: BlockTag) -> Result<T, InvocationError> {
        let values = self.invocation.call_at(block).await?;
        (self.cast)(&values).map_err(|e| {
            tracing::debug!(
                "failed to cast result of {}: {}",
                self.invocation.method().name,
                e
            );
            InvocationError::DecodingError
        })
    }

    pub fn create_call(&self) -> Option<Call> {
        self.invocation.create_call()
    }

    pub fn create_transaction(&self, options: &TransactionOptions) -> Option<Transaction> {
        self.invocation.create_transaction(options)
    }

    pub async fn send(&self, options: TransactionOptions) -> Result<B256, InvocationError> {
        self.invocation.send(options).await
    }

    pub async fn estimate_gas(
        &self,
        from: Option<Address>,
        gas: Option<U256>,
        value: Option<U256>,
    ) -> Result<U256, InvocationError> {
        self.invocation.estimate_gas(from, gas, value).await
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to decode log: {0}")]
    Abi(#[from] alloy::dyn_abi::Error),
    #[error("failed to convert event: {0}")]
    Cast(anyhow::Error),
}

/// An event descriptor whose decoded fields are converted into `T`.
pub struct TypedEvent<T> {
    event: Event,
    cast: Cast<T>,
}

impl<T> Clone for TypedEvent<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            cast: self.cast.clone(),
        }
    }
}

impl<T> TypedEvent<T> {
    pub fn new(
        event: Event,
        cast: impl Fn(&ResultMap) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            event,
            cast: Arc::new(cast),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn decode(&self, log: &Log) -> Result<T, EventError> {
        let fields = decode_log(&self.event, log)?;
        (self.cast)(&fields).map_err(EventError::Cast)
    }
}

/// Decodes a log into a map of the event's fields in declaration order.
pub fn decode_log(event: &Event, log: &Log) -> Result<ResultMap, alloy::dyn_abi::Error> {
    let decoded = event.decode_log_parts(log.topics.iter().copied(), &log.data, true)?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut fields = ResultMap::new();

    for (index, input) in event.inputs.iter().enumerate() {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        if let Some(value) = value {
            fields.insert(result_key(&input.name, index), value);
        }
    }

    Ok(fields)
}

/// Raw log payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub data: Bytes,
    pub topics: Vec<B256>,
}

/// A decoded event together with where it was emitted.
///
/// The position fields are `None` for a log of a transaction that is not
/// mined yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent<T> {
    pub name: String,
    pub signature: String,
    pub address: Option<Address>,
    pub result: T,
    pub log_index: Option<U256>,
    pub transaction_index: Option<U256>,
    pub transaction_hash: Option<B256>,
    pub block_hash: Option<B256>,
    pub block_number: Option<U256>,
    pub raw: RawLog,
}

impl<T> ContractEvent<T> {
    pub fn from_log(
        event: &TypedEvent<T>,
        log: &Log,
        address: Option<Address>,
    ) -> Result<Self, EventError> {
        let result = event.decode(log)?;

        Ok(Self {
            name: event.event.name.clone(),
            signature: event.event.signature(),
            address,
            result,
            log_index: log.log_index,
            transaction_index: log.transaction_index,
            transaction_hash: log.transaction_hash,
            block_hash: log.block_hash,
            block_number: log.block_number,
            raw: RawLog {
                data: log.data.clone(),
                topics: log.topics.clone(),
            },
        })
    }
}
