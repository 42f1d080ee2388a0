//! Ethereum JSON-RPC client with typed contract invocations and a
//! transaction confirmation watcher.

pub mod config;
pub mod ethereum;

pub use ethereum::{
    contract::{ContractHandler, DynamicContract},
    eth::Eth,
    invocation::{
        invoke, ConstructorInvocation, FunctionHandler, Invocation, InvocationError,
        NonPayableInvocation, PayableInvocation, ReadInvocation,
    },
    provider::{HttpProvider, Provider, ProviderError, ProviderManager},
    typed::{ContractEvent, EventError, TypedEvent, TypedInvocation},
    watcher::{OptionsError, TransactionWatch, TransactionWatcher, WatcherError, WatcherOptions},
    Block, BlockTag, BlockTransactions, Call, Log, Receipt, ResultMap, SyncStatus, Transaction,
    TransactionObject, TransactionOptions, TransactionStatus,
};
