use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::{Event, Function, JsonAbi, Param},
    primitives::{Address, Bytes, B256, U256},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{
    eth::Eth,
    invocation::{invoke, ConstructorInvocation, FunctionHandler, Invocation, InvocationError},
    typed::{TypedEvent, TypedInvocation},
    BlockTag, Call, ResultMap, Transaction,
};

/// Routes invocations of one contract through the `eth` namespace.
#[derive(Clone)]
pub struct ContractHandler {
    eth: Eth,
    address: Option<Address>,
}

impl ContractHandler {
    pub fn new(eth: Eth, address: Option<Address>) -> Self {
        Self { eth, address }
    }

    pub fn eth(&self) -> &Eth {
        &self.eth
    }
}

#[async_trait]
impl FunctionHandler for ContractHandler {
    fn address(&self) -> Option<Address> {
        self.address
    }

    async fn call(
        &self,
        call: Call,
        outputs: &[Param],
        block: BlockTag,
    ) -> Result<ResultMap, InvocationError> {
        let data = self.eth.call(&call, block).await.map_err(|e| {
            tracing::debug!("eth_call to {:?} failed: {}", call.to, e);
            InvocationError::from(e)
        })?;
        decode_outputs(outputs, &data)
    }

    async fn send(&self, transaction: Transaction) -> Result<B256, InvocationError> {
        let hash = self.eth.send_transaction(&transaction).await?;
        tracing::info!("Transaction sent with hash: {:?}", hash);
        Ok(hash)
    }

    async fn estimate_gas(&self, call: Call) -> Result<U256, InvocationError> {
        Ok(self.eth.estimate_gas(&call).await?)
    }
}

/// Decodes `eth_call` return data into a map keyed by output name.
pub fn decode_outputs(outputs: &[Param], data: &[u8]) -> Result<ResultMap, InvocationError> {
    if outputs.is_empty() {
        return Ok(ResultMap::new());
    }

    let types = outputs
        .iter()
        .map(|output| output.resolve())
        .collect::<Result<Vec<DynSolType>, _>>()
        .map_err(|e| {
            tracing::debug!("unresolvable output type: {}", e);
            InvocationError::DecodingError
        })?;

    let decoded = DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| {
            tracing::debug!("failed to decode output: {}", e);
            InvocationError::DecodingError
        })?;

    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };

    Ok(outputs
        .iter()
        .map(|output| output.name.as_str())
        .zip(values)
        .enumerate()
        .map(|(index, (name, value))| (result_key(name, index), value))
        .collect())
}

pub(crate) fn result_key(name: &str, index: usize) -> String {
    if name.is_empty() {
        index.to_string()
    } else {
        name.to_string()
    }
}

/// A contract described by a JSON ABI, optionally bound to an address.
#[derive(Clone)]
pub struct DynamicContract {
    abi: JsonAbi,
    handler: Arc<ContractHandler>,
}

impl DynamicContract {
    pub fn new(abi: JsonAbi, address: Option<Address>, eth: Eth) -> Self {
        Self {
            abi,
            handler: Arc::new(ContractHandler::new(eth, address)),
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.handler.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Looks up a method by name. Overloads resolve by parameter count.
    pub fn method(&self, name: &str, arity: usize) -> Result<&Function, InvocationError> {
        let overloads = self.abi.function(name).ok_or_else(|| {
            tracing::debug!(
                "function '{}' not found. Available functions: {}",
                name,
                self.abi
                    .functions()
                    .map(|f| f.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            InvocationError::InvalidConfiguration
        })?;

        overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .ok_or(InvocationError::InvalidConfiguration)
    }

    pub fn invoke(
        &self,
        name: &str,
        values: Vec<DynSolValue>,
    ) -> Result<Box<dyn Invocation>, InvocationError> {
        let method = self.method(name, values.len())?.clone();
        invoke(method, values, self.handler.clone())
    }

    pub fn typed_invoke<T>(
        &self,
        name: &str,
        values: Vec<DynSolValue>,
        cast: impl Fn(&ResultMap) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Result<TypedInvocation<T>, InvocationError> {
        Ok(TypedInvocation::new(self.invoke(name, values)?, cast))
    }

    pub fn deploy(
        &self,
        bytecode: Bytes,
        values: Vec<DynSolValue>,
    ) -> Result<ConstructorInvocation, InvocationError> {
        ConstructorInvocation::new(
            bytecode,
            self.abi.constructor.as_ref(),
            values,
            self.handler.clone(),
        )
    }

    pub fn event(&self, name: &str) -> Result<&Event, InvocationError> {
        self.abi
            .event(name)
            .and_then(|events| events.first())
            .ok_or(InvocationError::InvalidConfiguration)
    }

    pub fn typed_event<T>(
        &self,
        name: &str,
        cast: impl Fn(&ResultMap) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Result<TypedEvent<T>, InvocationError> {
        Ok(TypedEvent::new(self.event(name)?.clone(), cast))
    }
}

/// Renders a result map as a JSON object.
pub fn result_map_to_json(values: &ResultMap) -> Value {
    let mut object = Map::new();
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort();
    for key in keys {
        object.insert(key.clone(), dyn_sol_value_to_json(&values[key]));
    }
    Value::Object(object)
}

/// Converts a decoded ABI value to JSON. Integers become decimal strings.
pub fn dyn_sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(addr.to_checksum(None)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(dyn_sol_value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}
