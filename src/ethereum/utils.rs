use alloy::{
    dyn_abi::{DynSolValue, Specifier},
    json_abi::Param,
    primitives::{Address, Bytes, B256, U256},
};
use anyhow::{anyhow, Result};
use std::str::FromStr;

fn strip_hex_prefix(value: &str) -> Option<&str> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
}

/// Validates and normalizes an Ethereum address
pub fn parse_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    let hex_part = strip_hex_prefix(address).ok_or_else(|| {
        anyhow!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        )
    })?;

    if hex_part.len() != 40 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Expected 0x followed by 40 hex characters",
            address
        ));
    }

    Address::from_str(hex_part)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Parses a decimal or `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<U256> {
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("Value cannot be empty"));
    }

    match strip_hex_prefix(value) {
        Some(hex) => U256::from_str_radix(hex, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value)),
        None => U256::from_str(value).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value
            )
        }),
    }
}

pub fn parse_hash(hash: &str) -> Result<B256> {
    let hash = hash.trim();
    match strip_hex_prefix(hash) {
        Some(hex) if hex.len() == 64 => {
            B256::from_str(hex).map_err(|e| anyhow!("Invalid hash '{}': {}", hash, e))
        }
        _ => Err(anyhow!(
            "Invalid hash: '{}'. Expected 0x followed by 64 hex characters",
            hash
        )),
    }
}

pub fn parse_bytes(data: &str) -> Result<Bytes> {
    let data = data.trim();
    let hex_part = strip_hex_prefix(data).unwrap_or(data);
    hex::decode(hex_part)
        .map(Bytes::from)
        .map_err(|e| anyhow!("Invalid hex data: {}", e))
}

/// Parses command-line arguments against the declared parameter types.
pub fn parse_arguments(inputs: &[Param], args: &[String]) -> Result<Vec<DynSolValue>> {
    if inputs.len() != args.len() {
        return Err(anyhow!(
            "Expected {} arguments, got {}",
            inputs.len(),
            args.len()
        ));
    }

    inputs
        .iter()
        .zip(args)
        .map(|(input, arg)| {
            let ty = input
                .resolve()
                .map_err(|e| anyhow!("Unsupported parameter type '{}': {}", input.ty, e))?;
            ty.coerce_str(arg).map_err(|e| {
                anyhow!(
                    "Invalid value '{}' for parameter '{}' ({}): {}",
                    arg,
                    input.name,
                    input.ty,
                    e
                )
            })
        })
        .collect()
}

/// Validates function name
pub fn validate_function_name(function_name: &str) -> Result<()> {
    let first = function_name
        .chars()
        .next()
        .ok_or_else(|| anyhow!("Function name cannot be empty"))?;

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(anyhow!(
            "Invalid function name: '{}'. Function names must start with a letter or underscore",
            function_name
        ));
    }

    if !function_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(anyhow!(
            "Invalid function name: '{}'. Function names can only contain letters, numbers, and underscores",
            function_name
        ));
    }

    Ok(())
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    let lowered = error.to_lowercase();
    if lowered.contains("execution reverted") {
        format!("Call reverted: the contract rejected the request. ({})", error)
    } else if lowered.contains("insufficient funds") {
        "Insufficient funds: the sender cannot cover value plus gas.".to_string()
    } else if lowered.contains("gas required exceeds allowance") {
        "Gas limit too low: increase --gas and try again.".to_string()
    } else if lowered.contains("nonce too low") {
        "Nonce too low: another transaction already used this nonce.".to_string()
    } else if lowered.contains("replacement transaction underpriced") {
        "Gas price too low to replace the pending transaction.".to_string()
    } else if lowered.contains("unknown account") {
        "The node does not manage the sender account; use a node with an unlocked account."
            .to_string()
    } else if lowered.contains("connection refused") || lowered.contains("network unreachable") {
        "Network error: cannot connect to the RPC endpoint. Check the RPC URL configuration."
            .to_string()
    } else if lowered.contains("timeout") || lowered.contains("timed out") {
        "Network error: the RPC endpoint did not answer in time.".to_string()
    } else if lowered.contains("rate limit") || lowered.contains("429") {
        "Rate limited by the RPC endpoint. Try again later or use another endpoint.".to_string()
    } else if lowered.contains("method not found") {
        "The RPC endpoint does not support this method.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
