use crate::ethereum::watcher::{OptionsError, WatcherOptions};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const RPC_URL_ENV: &str = "CONTRACT_CLIENT_RPC_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub transaction: TransactionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
}

/// Polling parameters for the transaction watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub block_timeout: u64,
    pub confirmation_blocks: u64,
    pub polling_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let options = WatcherOptions::default();
        Self {
            block_timeout: options.block_timeout(),
            confirmation_blocks: options.confirmation_blocks(),
            polling_interval_ms: options.polling_interval().as_millis() as u64,
        }
    }
}

impl TryFrom<WatcherConfig> for WatcherOptions {
    type Error = OptionsError;

    fn try_from(config: WatcherConfig) -> Result<Self, Self::Error> {
        WatcherOptions::new(
            config.block_timeout,
            config.confirmation_blocks,
            Duration::from_millis(config.polling_interval_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub default_gas_limit: u64,
    pub gas_price: Option<u64>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_gas_limit: 300_000,
            gas_price: None,
        }
    }
}

fn alchemy_network(subdomain: &str, chain_id: u64, explorer: &str) -> NetworkConfig {
    NetworkConfig {
        rpc_url: format!("https://{}.g.alchemy.com/v2/demo", subdomain),
        chain_id,
        explorer_url: Some(explorer.to_string()),
    }
}

impl Default for Config {
    fn default() -> Self {
        let networks = HashMap::from([
            (
                "ethereum".to_string(),
                alchemy_network("eth-mainnet", 1, "https://etherscan.io"),
            ),
            (
                "sepolia".to_string(),
                alchemy_network("eth-sepolia", 11155111, "https://sepolia.etherscan.io"),
            ),
            (
                "polygon".to_string(),
                alchemy_network("polygon-mainnet", 137, "https://polygonscan.com"),
            ),
            (
                "arbitrum".to_string(),
                alchemy_network("arb-mainnet", 42161, "https://arbiscan.io"),
            ),
            (
                "local".to_string(),
                NetworkConfig {
                    rpc_url: "http://127.0.0.1:8545".to_string(),
                    chain_id: 31337,
                    explorer_url: None,
                },
            ),
        ]);

        Self {
            networks,
            default_network: "ethereum".to_string(),
            watcher: WatcherConfig::default(),
            transaction: TransactionConfig::default(),
        }
    }
}

impl Config {
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        if !config.networks.contains_key(&config.default_network) {
            return Err(anyhow!(
                "Default network '{}' is not configured in {:?}",
                config.default_network,
                path
            ));
        }

        Ok(config)
    }

    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Loads `path`, or the default location when it exists. Environment
    /// overrides are applied last.
    ///
    /// A file named explicitly must load; only the implicit default location
    /// falls back to built-in defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let explicit = path.map(|p| p.as_ref().to_path_buf());
        let implicit = Self::default_config_path().ok();
        let mut config = Self::load_layered(explicit.as_deref(), implicit).await?;
        config.apply_env_vars();
        Ok(config)
    }

    async fn load_layered(explicit: Option<&Path>, implicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path).await?;
            tracing::info!("Loaded configuration from {:?}", path);
            return Ok(config);
        }

        match implicit.filter(|p| p.exists()) {
            Some(path) => match Self::load_from_file(&path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {:?}", path);
                    Ok(config)
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Ok(Self::default())
                }
            },
            None => Ok(Self::default()),
        }
    }

    pub fn watcher_options(&self) -> Result<WatcherOptions> {
        WatcherOptions::try_from(self.watcher)
            .map_err(|e| anyhow!("Invalid [watcher] configuration: {}", e))
    }

    fn apply_env_vars(&mut self) {
        let api_key = std::env::var("ALCHEMY_API_KEY").ok();
        let rpc_url = std::env::var(RPC_URL_ENV).ok();
        self.apply_overrides(api_key.as_deref(), rpc_url.as_deref());
    }

    /// `ALCHEMY_API_KEY` fills in demo endpoints; `CONTRACT_CLIENT_RPC_URL`
    /// replaces the default network's endpoint.
    fn apply_overrides(&mut self, api_key: Option<&str>, rpc_url: Option<&str>) {
        match api_key {
            Some(api_key) => {
                for (network_name, network_config) in &mut self.networks {
                    if network_config.rpc_url.contains("alchemy.com/v2/demo") {
                        network_config.rpc_url = network_config
                            .rpc_url
                            .replace("/demo", &format!("/{}", api_key));
                        tracing::debug!("Updated {} RPC URL with API key", network_name);
                    } else if network_config.rpc_url.contains("YOUR_API_KEY_HERE") {
                        network_config.rpc_url =
                            network_config.rpc_url.replace("YOUR_API_KEY_HERE", api_key);
                        tracing::debug!("Updated {} RPC URL with API key", network_name);
                    }
                }
            }
            None => {
                if let Some(network) = self.networks.get(&self.default_network) {
                    if network.rpc_url.contains("/demo") {
                        tracing::warn!(
                            "Using demo RPC endpoint for {}, set ALCHEMY_API_KEY for better reliability",
                            self.default_network
                        );
                    }
                }
            }
        }

        if let Some(rpc_url) = rpc_url {
            if let Some(network) = self.networks.get_mut(&self.default_network) {
                tracing::info!("Using {} for {}", RPC_URL_ENV, self.default_network);
                network.rpc_url = rpc_url.to_string();
            }
        }
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-client").join("config.toml"))
    }

    pub fn generate_sample() -> String {
        let sample_config = r#"# contract-client configuration

# Network used when --network is not given
default_network = "ethereum"

[networks.ethereum]
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"

[networks.sepolia]
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"

[networks.local]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

# Receipt polling
[watcher]
block_timeout = 50         # blocks to wait for a receipt
confirmation_blocks = 24   # blocks on top of the mined block
polling_interval_ms = 1000

# Defaults for send and deploy
[transaction]
default_gas_limit = 300000
# gas_price = 20000000000  # 20 Gwei; omit to let the node decide

# Environment variables:
# ALCHEMY_API_KEY - replaces YOUR_API_KEY_HERE above
# CONTRACT_CLIENT_RPC_URL - overrides the default network's rpc_url
"#;
        sample_config.to_string()
    }
}
