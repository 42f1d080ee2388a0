use crate::config::{Config, NetworkConfig};
use crate::ethereum::eth::Eth;
use alloy::{
    providers::{Provider as AlloyProvider, ProviderBuilder, RootProvider},
    transports::{
        http::{Client, Http},
        RpcError,
    },
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Transport-level failure of a single JSON-RPC round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("server error: {0}")]
    ServerError(String),
    #[error("failed to decode response: {0}")]
    DecodingError(String),
    #[error("{0}")]
    CustomError(String),
    /// The node answered without a result (e.g. `null` for an unknown receipt).
    #[error("empty response")]
    EmptyResponse,
}

/// Executes one JSON-RPC request.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// JSON-RPC over HTTP, backed by alloy's root provider.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    inner: RootProvider<Http<Client>>,
    rpc_url: String,
}

impl HttpProvider {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let inner = ProviderBuilder::new().on_http(url);

        Ok(Self {
            inner,
            rpc_url: rpc_url.to_string(),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn send(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        tracing::trace!("-> {} {}", method, params);
        let result: Result<Value, _> = self
            .inner
            .client()
            .request(method.to_string(), params)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(RpcError::NullResp) => Err(ProviderError::EmptyResponse),
            Err(RpcError::ErrorResp(payload)) => Err(ProviderError::ServerError(payload.to_string())),
            Err(RpcError::SerError(e)) => Err(ProviderError::RequestFailed(e.to_string())),
            Err(RpcError::DeserError { err, .. }) => {
                Err(ProviderError::DecodingError(err.to_string()))
            }
            Err(RpcError::Transport(kind)) => Err(ProviderError::RequestFailed(kind.to_string())),
            Err(other) => Err(ProviderError::CustomError(other.to_string())),
        }
    }
}

/// One `Eth` namespace per configured network.
pub struct ProviderManager {
    namespaces: HashMap<String, Eth>,
    config: Config,
}

impl ProviderManager {
    pub fn new(config: Config) -> Result<Self> {
        let mut namespaces = HashMap::new();

        for (network_name, network_config) in &config.networks {
            let provider = Self::create_provider(network_config)
                .map_err(|e| anyhow!("Network '{}': {}", network_name, e))?;
            namespaces.insert(network_name.clone(), Eth::new(Arc::new(provider)));
        }

        Ok(Self { namespaces, config })
    }

    fn create_provider(network_config: &NetworkConfig) -> Result<HttpProvider> {
        HttpProvider::new(&network_config.rpc_url)
    }

    pub fn eth(&self, network: Option<&str>) -> Result<&Eth> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.namespaces.get(network_name).ok_or_else(|| {
            anyhow!(
                "Network '{}' not configured. Available networks: {}",
                network_name,
                self.available_networks().join(", ")
            )
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn network_config(&self, network: Option<&str>) -> Result<&NetworkConfig> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.config
            .networks
            .get(network_name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", network_name))
    }

    pub fn available_networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.networks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Checks the network is reachable with `eth_blockNumber`.
    pub async fn validate_network_connection(&self, network: Option<&str>) -> Result<()> {
        let network_name = network.unwrap_or(&self.config.default_network);
        let eth = self.eth(network)?;

        match eth.block_number().await {
            Ok(block) => {
                tracing::debug!("Network '{}' reachable at block {}", network_name, block);
                Ok(())
            }
            Err(e) => Err(anyhow!(
                "Cannot connect to network '{}': {}. Please check your RPC endpoint configuration and network connectivity.",
                network_name,
                crate::ethereum::utils::interpret_rpc_error(&e.to_string())
            )),
        }
    }
}
