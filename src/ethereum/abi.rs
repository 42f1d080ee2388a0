use alloy::json_abi::JsonAbi;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Loads a contract ABI from disk.
///
/// Accepts either a bare ABI array or a compiler artifact (Hardhat, Foundry)
/// whose `abi` field holds the array.
pub async fn load_abi_file<P: AsRef<Path>>(path: P) -> Result<JsonAbi> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read ABI file {:?}: {}", path, e))?;

    let abi = parse_abi(&content).map_err(|e| anyhow!("Invalid ABI in {:?}: {}", path, e))?;
    debug!(
        "Loaded ABI from {:?}: {} functions, {} events",
        path,
        abi.functions().count(),
        abi.events().count()
    );
    Ok(abi)
}

pub fn parse_abi(content: &str) -> Result<JsonAbi> {
    let json: Value =
        serde_json::from_str(content).map_err(|e| anyhow!("Failed to parse JSON: {}", e))?;

    let abi = match json {
        Value::Array(_) => json,
        Value::Object(mut artifact) => artifact
            .remove("abi")
            .ok_or_else(|| anyhow!("Artifact has no 'abi' field"))?,
        _ => return Err(anyhow!("Expected an ABI array or an artifact object")),
    };

    serde_json::from_value(abi).map_err(|e| anyhow!("Failed to parse ABI: {}", e))
}

/// Deployment bytecode from a compiler artifact, if present.
///
/// Hardhat stores it as a string, Foundry as `{ "object": "0x..." }`.
pub fn artifact_bytecode(content: &str) -> Option<String> {
    let json: Value = serde_json::from_str(content).ok()?;
    match json.get("bytecode")? {
        Value::String(code) => Some(code.clone()),
        Value::Object(object) => object.get("object")?.as_str().map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ABI: &str = r#"[
        {"type": "function", "name": "balanceOf", "stateMutability": "view",
         "inputs": [{"name": "owner", "type": "address"}],
         "outputs": [{"name": "", "type": "uint256"}]},
        {"type": "event", "name": "Transfer", "anonymous": false,
         "inputs": [{"name": "from", "type": "address", "indexed": true}]}
    ]"#;

    #[tokio::test]
    async fn test_load_bare_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Token.json");
        fs::write(&path, ABI).await.unwrap();

        let abi = load_abi_file(&path).await.unwrap();
        assert!(abi.function("balanceOf").is_some());
        assert!(abi.event("Transfer").is_some());
    }

    #[tokio::test]
    async fn test_load_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Token.json");
        let artifact = format!(
            r#"{{"contractName": "Token", "abi": {}, "bytecode": {{"object": "0x6080"}}}}"#,
            ABI
        );
        fs::write(&path, &artifact).await.unwrap();

        let abi = load_abi_file(&path).await.unwrap();
        assert_eq!(abi.functions().count(), 1);
        assert_eq!(artifact_bytecode(&artifact).as_deref(), Some("0x6080"));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let dir = tempdir().unwrap();
        assert!(load_abi_file(dir.path().join("missing.json")).await.is_err());

        assert!(parse_abi("{\"contractName\": \"Token\"}").is_err());
        assert!(parse_abi("42").is_err());
        assert!(parse_abi("not json").is_err());
        assert_eq!(artifact_bytecode(ABI), None);
    }
}
