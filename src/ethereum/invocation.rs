//! Contract method invocations.
//!
//! A method's state mutability decides which operations are legal on it:
//! read-only methods can only be called, state-changing methods can only be
//! sent. Each kind is its own type behind the [`Invocation`] trait so the
//! illegal operation is a fixed error path rather than a runtime check.

use super::{provider::ProviderError, BlockTag, Call, ResultMap, Transaction, TransactionOptions};
use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Constructor, Function, Param, StateMutability},
    primitives::{Address, Bytes, B256, U256},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("contract is not deployed: no address bound")]
    ContractNotDeployed,
    #[error("invalid contract configuration")]
    InvalidConfiguration,
    #[error("operation is not valid for this method")]
    InvalidInvocation,
    #[error("failed to encode invocation")]
    EncodingError,
    #[error("failed to decode result")]
    DecodingError,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Submits calls and transactions on behalf of invocations.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// The contract address, once deployed or known.
    fn address(&self) -> Option<Address>;

    async fn call(
        &self,
        call: Call,
        outputs: &[Param],
        block: BlockTag,
    ) -> Result<ResultMap, InvocationError>;

    async fn send(&self, transaction: Transaction) -> Result<B256, InvocationError>;

    async fn estimate_gas(&self, call: Call) -> Result<U256, InvocationError>;
}

/// A parameter value together with its declared ABI type.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedValue {
    pub value: DynSolValue,
    pub ty: DynSolType,
}

impl WrappedValue {
    pub fn matches(&self) -> bool {
        self.ty.matches(&self.value)
    }
}

/// Pairs each value with the declared type of its input, position by position.
fn wrap_parameters(
    inputs: &[Param],
    values: Vec<DynSolValue>,
) -> Result<Vec<WrappedValue>, InvocationError> {
    if inputs.len() != values.len() {
        debug!(
            "expected {} parameters, got {}",
            inputs.len(),
            values.len()
        );
        return Err(InvocationError::InvalidConfiguration);
    }

    inputs
        .iter()
        .zip(values)
        .map(|(input, value)| {
            let ty = input.resolve().map_err(|e| {
                debug!("unresolvable type '{}': {}", input.ty, e);
                InvocationError::InvalidConfiguration
            })?;
            Ok(WrappedValue { value, ty })
        })
        .collect()
}

#[async_trait]
pub trait Invocation: Send + Sync {
    fn method(&self) -> &Function;

    fn parameters(&self) -> &[WrappedValue];

    fn handler(&self) -> &Arc<dyn FunctionHandler>;

    fn create_call(&self) -> Option<Call>;

    fn create_transaction(&self, options: &TransactionOptions) -> Option<Transaction>;

    /// Reads from the chain at `block`. Only legal for read-only methods.
    async fn call_at(&self, block: BlockTag) -> Result<ResultMap, InvocationError>;

    /// Writes to the chain. Only legal for state-changing methods.
    async fn send(&self, options: TransactionOptions) -> Result<B256, InvocationError>;

    async fn call(&self) -> Result<ResultMap, InvocationError> {
        self.call_at(BlockTag::Latest).await
    }

    async fn estimate_gas(
        &self,
        from: Option<Address>,
        gas: Option<U256>,
        value: Option<U256>,
    ) -> Result<U256, InvocationError> {
        let to = self
            .handler()
            .address()
            .ok_or(InvocationError::ContractNotDeployed)?;
        let data = self.encode_abi().ok_or(InvocationError::EncodingError)?;
        let call = Call {
            from,
            to,
            gas,
            gas_price: None,
            value,
            data,
        };
        self.handler().estimate_gas(call).await
    }

    /// Selector followed by the ABI-encoded parameters.
    fn encode_abi(&self) -> Option<Bytes> {
        let values: Vec<DynSolValue> = self
            .parameters()
            .iter()
            .map(|parameter| parameter.value.clone())
            .collect();

        match self.method().abi_encode_input(&values) {
            Ok(encoded) => Some(encoded.into()),
            Err(e) => {
                debug!("failed to encode call to {}: {}", self.method().name, e);
                None
            }
        }
    }
}

/// Builds the invocation variant matching the method's state mutability.
pub fn invoke(
    method: Function,
    values: Vec<DynSolValue>,
    handler: Arc<dyn FunctionHandler>,
) -> Result<Box<dyn Invocation>, InvocationError> {
    let invocation: Box<dyn Invocation> = match method.state_mutability {
        StateMutability::Pure | StateMutability::View => {
            Box::new(ReadInvocation::new(method, values, handler)?)
        }
        StateMutability::Payable => Box::new(PayableInvocation::new(method, values, handler)?),
        StateMutability::NonPayable => {
            Box::new(NonPayableInvocation::new(method, values, handler)?)
        }
    };
    Ok(invocation)
}

/// State shared by every method invocation kind.
#[derive(Clone)]
struct MethodCall {
    method: Function,
    parameters: Vec<WrappedValue>,
    handler: Arc<dyn FunctionHandler>,
}

impl MethodCall {
    fn new(
        method: Function,
        values: Vec<DynSolValue>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<Self, InvocationError> {
        let parameters = wrap_parameters(&method.inputs, values)?;
        Ok(Self {
            method,
            parameters,
            handler,
        })
    }
}

/// A `view` or `pure` method. Use [`Invocation::call`].
#[derive(Clone)]
pub struct ReadInvocation(MethodCall);

impl ReadInvocation {
    pub fn new(
        method: Function,
        values: Vec<DynSolValue>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<Self, InvocationError> {
        MethodCall::new(method, values, handler).map(Self)
    }
}

#[async_trait]
impl Invocation for ReadInvocation {
    fn method(&self) -> &Function {
        &self.0.method
    }

    fn parameters(&self) -> &[WrappedValue] {
        &self.0.parameters
    }

    fn handler(&self) -> &Arc<dyn FunctionHandler> {
        &self.0.handler
    }

    fn create_call(&self) -> Option<Call> {
        let data = self.encode_abi()?;
        let to = self.0.handler.address()?;
        Some(Call {
            from: None,
            to,
            gas: None,
            gas_price: None,
            value: None,
            data,
        })
    }

    fn create_transaction(&self, _options: &TransactionOptions) -> Option<Transaction> {
        None
    }

    async fn call_at(&self, block: BlockTag) -> Result<ResultMap, InvocationError> {
        if self.0.handler.address().is_none() {
            return Err(InvocationError::ContractNotDeployed);
        }
        let call = self.create_call().ok_or(InvocationError::EncodingError)?;
        let outputs = &self.0.method.outputs;
        self.0.handler.call(call, outputs, block).await
    }

    async fn send(&self, _options: TransactionOptions) -> Result<B256, InvocationError> {
        Err(InvocationError::InvalidInvocation)
    }
}

/// Transaction to the bound contract, or `None` when undeployed or unencodable.
fn method_transaction(
    invocation: &dyn Invocation,
    options: &TransactionOptions,
) -> Option<Transaction> {
    let data = invocation.encode_abi()?;
    let to = invocation.handler().address()?;
    Some(Transaction {
        nonce: options.nonce,
        gas_price: options.gas_price,
        gas: options.gas,
        from: options.from,
        to: Some(to),
        value: options.value.unwrap_or(U256::ZERO),
        data,
    })
}

async fn send_method_transaction(
    invocation: &dyn Invocation,
    options: &TransactionOptions,
) -> Result<B256, InvocationError> {
    if invocation.handler().address().is_none() {
        return Err(InvocationError::ContractNotDeployed);
    }
    let transaction =
        method_transaction(invocation, options).ok_or(InvocationError::EncodingError)?;
    invocation.handler().send(transaction).await
}

/// A `payable` method. Use [`Invocation::send`].
#[derive(Clone)]
pub struct PayableInvocation(MethodCall);

impl PayableInvocation {
    pub fn new(
        method: Function,
        values: Vec<DynSolValue>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<Self, InvocationError> {
        MethodCall::new(method, values, handler).map(Self)
    }
}

#[async_trait]
impl Invocation for PayableInvocation {
    fn method(&self) -> &Function {
        &self.0.method
    }

    fn parameters(&self) -> &[WrappedValue] {
        &self.0.parameters
    }

    fn handler(&self) -> &Arc<dyn FunctionHandler> {
        &self.0.handler
    }

    fn create_call(&self) -> Option<Call> {
        None
    }

    fn create_transaction(&self, options: &TransactionOptions) -> Option<Transaction> {
        method_transaction(self, options)
    }

    async fn call_at(&self, _block: BlockTag) -> Result<ResultMap, InvocationError> {
        Err(InvocationError::InvalidInvocation)
    }

    async fn send(&self, options: TransactionOptions) -> Result<B256, InvocationError> {
        send_method_transaction(self, &options).await
    }
}

/// A `nonpayable` method. Use [`Invocation::send`].
#[derive(Clone)]
pub struct NonPayableInvocation(MethodCall);

impl NonPayableInvocation {
    pub fn new(
        method: Function,
        values: Vec<DynSolValue>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<Self, InvocationError> {
        MethodCall::new(method, values, handler).map(Self)
    }
}

#[async_trait]
impl Invocation for NonPayableInvocation {
    fn method(&self) -> &Function {
        &self.0.method
    }

    fn parameters(&self) -> &[WrappedValue] {
        &self.0.parameters
    }

    fn handler(&self) -> &Arc<dyn FunctionHandler> {
        &self.0.handler
    }

    fn create_call(&self) -> Option<Call> {
        None
    }

    fn create_transaction(&self, options: &TransactionOptions) -> Option<Transaction> {
        method_transaction(self, options)
    }

    async fn call_at(&self, _block: BlockTag) -> Result<ResultMap, InvocationError> {
        Err(InvocationError::InvalidInvocation)
    }

    async fn send(&self, options: TransactionOptions) -> Result<B256, InvocationError> {
        send_method_transaction(self, &options).await
    }
}

/// Deployment of a contract: bytecode plus encoded constructor arguments.
#[derive(Clone)]
pub struct ConstructorInvocation {
    bytecode: Bytes,
    parameters: Vec<WrappedValue>,
    payable: bool,
    handler: Arc<dyn FunctionHandler>,
}

impl ConstructorInvocation {
    /// `constructor` is `None` for contracts without an explicit constructor.
    pub fn new(
        bytecode: Bytes,
        constructor: Option<&Constructor>,
        values: Vec<DynSolValue>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<Self, InvocationError> {
        let (inputs, payable) = match constructor {
            Some(constructor) => (
                constructor.inputs.as_slice(),
                constructor.state_mutability == StateMutability::Payable,
            ),
            None => (&[][..], false),
        };
        let parameters = wrap_parameters(inputs, values)?;

        Ok(Self {
            bytecode,
            parameters,
            payable,
            handler,
        })
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    pub fn parameters(&self) -> &[WrappedValue] {
        &self.parameters
    }

    pub fn is_payable(&self) -> bool {
        self.payable
    }

    pub fn create_transaction(&self, options: &TransactionOptions) -> Option<Transaction> {
        let data = self.encode_abi()?;
        Some(Transaction {
            nonce: options.nonce,
            gas_price: options.gas_price,
            gas: options.gas,
            from: options.from,
            to: None,
            value: options.value.unwrap_or(U256::ZERO),
            data,
        })
    }

    pub async fn send(&self, options: TransactionOptions) -> Result<B256, InvocationError> {
        let value = options.value.unwrap_or(U256::ZERO);
        if !self.payable && value != U256::ZERO {
            return Err(InvocationError::InvalidInvocation);
        }
        let transaction = self
            .create_transaction(&options)
            .ok_or(InvocationError::EncodingError)?;
        self.handler.send(transaction).await
    }

    /// Bytecode followed by the ABI-encoded constructor arguments.
    pub fn encode_abi(&self) -> Option<Bytes> {
        if self.parameters.is_empty() {
            return Some(self.bytecode.clone());
        }

        if let Some(mismatch) = self.parameters.iter().find(|p| !p.matches()) {
            debug!(
                "constructor argument {:?} does not match type {}",
                mismatch.value,
                mismatch.ty.sol_type_name()
            );
            return None;
        }

        let values = self
            .parameters
            .iter()
            .map(|parameter| parameter.value.clone())
            .collect();
        let encoded = DynSolValue::Tuple(values).abi_encode_params();

        let mut data = self.bytecode.to_vec();
        data.extend_from_slice(&encoded);
        Some(data.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::contract::ContractHandler;
    use crate::ethereum::{eth::Eth, mock::MockProvider};
    use alloy::json_abi::JsonAbi;
    use serde_json::json;

    const TX_HASH: &str = "0x0e670ec64341771606e55d6b4ca35a1a6b75ee3d5145a99d05921026d1527331";

    fn test_abi() -> JsonAbi {
        serde_json::from_value(json!([
            {
                "type": "constructor",
                "inputs": [{"name": "_name", "type": "string"}],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "balanceOf",
                "inputs": [{"name": "owner", "type": "address"}],
                "outputs": [{"name": "balance", "type": "uint256"}],
                "stateMutability": "view"
            },
            {
                "type": "function",
                "name": "buyToken",
                "inputs": [],
                "outputs": [],
                "stateMutability": "payable"
            },
            {
                "type": "function",
                "name": "transfer",
                "inputs": [
                    {"name": "to", "type": "address"},
                    {"name": "tokenId", "type": "uint256"}
                ],
                "outputs": [],
                "stateMutability": "nonpayable"
            }
        ]))
        .unwrap()
    }

    fn function(name: &str) -> Function {
        test_abi().function(name).unwrap()[0].clone()
    }

    fn owner() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn stubbed_provider() -> Arc<MockProvider> {
        let provider = Arc::new(MockProvider::new());
        provider.respond("eth_call", json!(format!("0x{:064x}", 1)));
        provider.respond("eth_sendTransaction", json!(TX_HASH));
        provider.respond("eth_estimateGas", json!("0x5208"));
        provider
    }

    fn handler(provider: &Arc<MockProvider>, address: Option<Address>) -> Arc<dyn FunctionHandler> {
        Arc::new(ContractHandler::new(Eth::new(provider.clone()), address))
    }

    fn options() -> TransactionOptions {
        TransactionOptions::new(owner(), U256::from(21000))
    }

    #[test]
    fn test_invoke_dispatches_on_state_mutability() {
        let provider = stubbed_provider();
        let handler = handler(&provider, Some(owner()));

        let read = invoke(
            function("balanceOf"),
            vec![DynSolValue::Address(owner())],
            handler.clone(),
        )
        .unwrap();
        assert!(read.create_call().is_some());
        assert!(read.create_transaction(&options()).is_none());

        let payable = invoke(function("buyToken"), vec![], handler.clone()).unwrap();
        assert!(payable.create_call().is_none());
        assert!(payable.create_transaction(&options()).is_some());

        let non_payable = invoke(
            function("transfer"),
            vec![DynSolValue::Address(owner()), DynSolValue::Uint(U256::from(1), 256)],
            handler,
        )
        .unwrap();
        assert!(non_payable.create_call().is_none());
        let transaction = non_payable.create_transaction(&options()).unwrap();
        assert_eq!(transaction.to, Some(owner()));
        assert_eq!(transaction.value, U256::ZERO);
    }

    #[test]
    fn test_parameter_count_must_match_inputs() {
        let provider = stubbed_provider();
        let result = ReadInvocation::new(function("balanceOf"), vec![], handler(&provider, None));
        assert!(matches!(result, Err(InvocationError::InvalidConfiguration)));
    }

    #[tokio::test]
    async fn test_read_call_decodes_outputs() {
        let provider = stubbed_provider();
        let invocation = invoke(
            function("balanceOf"),
            vec![DynSolValue::Address(owner())],
            handler(&provider, Some(owner())),
        )
        .unwrap();

        let values = invocation.call().await.unwrap();
        assert_eq!(values["balance"], DynSolValue::Uint(U256::from(1), 256));
        assert_eq!(provider.last_params("eth_call").unwrap()[1], json!("latest"));
    }

    #[tokio::test]
    async fn test_read_send_is_invalid() {
        let provider = stubbed_provider();
        let invocation = invoke(
            function("balanceOf"),
            vec![DynSolValue::Address(owner())],
            handler(&provider, Some(owner())),
        )
        .unwrap();

        let result = invocation.send(options()).await;
        assert_eq!(result, Err(InvocationError::InvalidInvocation));
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_call_requires_address() {
        let provider = stubbed_provider();
        let invocation = invoke(
            function("balanceOf"),
            vec![DynSolValue::Address(owner())],
            handler(&provider, None),
        )
        .unwrap();

        assert!(invocation.create_call().is_none());
        assert_eq!(invocation.call().await, Err(InvocationError::ContractNotDeployed));
    }

    #[tokio::test]
    async fn test_read_call_with_unencodable_parameter() {
        let provider = stubbed_provider();
        let invocation = invoke(
            function("balanceOf"),
            vec![DynSolValue::Bool(true)],
            handler(&provider, Some(owner())),
        )
        .unwrap();

        assert!(invocation.encode_abi().is_none());
        assert_eq!(invocation.call().await, Err(InvocationError::EncodingError));
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_payable_send_and_call() {
        let provider = stubbed_provider();
        let invocation = invoke(function("buyToken"), vec![], handler(&provider, Some(owner()))).unwrap();

        let hash = invocation
            .send(options().with_value(U256::from(10).pow(U256::from(18))))
            .await
            .unwrap();
        assert_eq!(hash, TX_HASH.parse::<B256>().unwrap());

        assert_eq!(invocation.call().await, Err(InvocationError::InvalidInvocation));
        assert_eq!(provider.calls("eth_call"), 0);
    }

    #[tokio::test]
    async fn test_non_payable_send_requires_address() {
        let provider = stubbed_provider();
        let invocation = invoke(
            function("transfer"),
            vec![DynSolValue::Address(owner()), DynSolValue::Uint(U256::from(1), 256)],
            handler(&provider, None),
        )
        .unwrap();

        assert!(invocation.create_transaction(&options()).is_none());
        assert_eq!(
            invocation.send(options()).await,
            Err(InvocationError::ContractNotDeployed)
        );
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_payable_call_is_invalid() {
        let provider = stubbed_provider();
        let invocation = invoke(
            function("transfer"),
            vec![DynSolValue::Address(owner()), DynSolValue::Uint(U256::from(1), 256)],
            handler(&provider, Some(owner())),
        )
        .unwrap();

        assert!(invocation.create_call().is_none());
        assert_eq!(invocation.call().await, Err(InvocationError::InvalidInvocation));
        assert_eq!(
            invocation.call_at(BlockTag::Pending).await,
            Err(InvocationError::InvalidInvocation)
        );
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_estimate_gas() {
        let provider = stubbed_provider();
        let invocation = invoke(function("buyToken"), vec![], handler(&provider, Some(owner()))).unwrap();

        let gas = invocation
            .estimate_gas(Some(owner()), None, Some(U256::from(5)))
            .await
            .unwrap();
        assert_eq!(gas, U256::from(21000));

        let sent = provider.last_params("eth_estimateGas").unwrap();
        assert_eq!(sent[0]["value"], json!("0x5"));

        let undeployed =
            invoke(function("buyToken"), vec![], handler(&provider, None)).unwrap();
        assert_eq!(
            undeployed.estimate_gas(None, None, None).await,
            Err(InvocationError::ContractNotDeployed)
        );
    }

    #[test]
    fn test_encode_abi_preserves_parameters() {
        let provider = stubbed_provider();
        let values = vec![
            DynSolValue::Address(owner()),
            DynSolValue::Uint(U256::from(42), 256),
        ];
        let method = function("transfer");
        let invocation = invoke(method.clone(), values.clone(), handler(&provider, None)).unwrap();

        let encoded = invocation.encode_abi().unwrap();
        assert_eq!(&encoded[..4], method.selector().as_slice());

        let types = invocation
            .parameters()
            .iter()
            .map(|p| p.ty.clone())
            .collect();
        let decoded = DynSolType::Tuple(types).abi_decode_params(&encoded[4..]).unwrap();
        assert_eq!(decoded, DynSolValue::Tuple(values));
    }

    #[tokio::test]
    async fn test_constructor_deploys_without_address() {
        let provider = stubbed_provider();
        let abi = test_abi();
        let bytecode = Bytes::from(vec![0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        let deployment = ConstructorInvocation::new(
            bytecode.clone(),
            abi.constructor.as_ref(),
            vec![DynSolValue::String("Test Instance".into())],
            handler(&provider, None),
        )
        .unwrap();

        let transaction = deployment.create_transaction(&options()).unwrap();
        assert_eq!(transaction.to, None);
        assert!(transaction.data.starts_with(&bytecode));
        assert!(transaction.data.len() > bytecode.len());

        let hash = deployment.send(options()).await.unwrap();
        assert_eq!(hash, TX_HASH.parse::<B256>().unwrap());
        let sent = provider.last_params("eth_sendTransaction").unwrap();
        assert!(sent[0].get("to").is_none());
    }

    #[tokio::test]
    async fn test_non_payable_constructor_rejects_value() {
        let provider = stubbed_provider();
        let abi = test_abi();
        let deployment = ConstructorInvocation::new(
            Bytes::from(vec![0x60, 0x80]),
            abi.constructor.as_ref(),
            vec![DynSolValue::String("Test Instance".into())],
            handler(&provider, None),
        )
        .unwrap();

        let result = deployment.send(options().with_value(U256::from(1))).await;
        assert_eq!(result, Err(InvocationError::InvalidInvocation));
        assert_eq!(provider.total_calls(), 0);
    }

    #[test]
    fn test_constructor_without_parameters_is_bytecode() {
        let provider = stubbed_provider();
        let bytecode = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);
        let deployment =
            ConstructorInvocation::new(bytecode.clone(), None, vec![], handler(&provider, None))
                .unwrap();

        assert_eq!(deployment.encode_abi().unwrap(), bytecode);
        assert!(!deployment.is_payable());
    }

    #[test]
    fn test_constructor_argument_type_mismatch() {
        let provider = stubbed_provider();
        let abi = test_abi();
        let deployment = ConstructorInvocation::new(
            Bytes::from(vec![0x60]),
            abi.constructor.as_ref(),
            vec![DynSolValue::Bool(false)],
            handler(&provider, None),
        )
        .unwrap();

        assert!(deployment.encode_abi().is_none());
        assert!(deployment.create_transaction(&options()).is_none());
    }
}
