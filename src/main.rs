use alloy::{
    json_abi::JsonAbi,
    primitives::{Address, Bytes, B256, U256},
    rpc::types::Filter,
};
use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use contract_client::{
    config::Config,
    ethereum::{
        abi::{artifact_bytecode, load_abi_file, parse_abi},
        contract::result_map_to_json,
        utils::{
            interpret_rpc_error, parse_address, parse_arguments, parse_bytes, parse_hash,
            parse_quantity, validate_function_name,
        },
    },
    BlockTag, ContractEvent, DynamicContract, Eth, Invocation, InvocationError, ProviderError,
    ProviderManager, TransactionOptions, TransactionStatus, TransactionWatcher, WatcherError,
    WatcherOptions,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut command = cli();
    let matches = command.clone().get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let Some((name, sub)) = matches.subcommand() else {
        command.print_help()?;
        return Ok(());
    };

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await?;

    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    info!("Using network: {}", config.default_network);
    let manager = ProviderManager::new(config)?;

    let result = match name {
        "info" => node_info(&manager).await,
        "watch" => watch(&manager, sub).await,
        "call" => call(&manager, sub).await,
        "estimate-gas" => estimate_gas(&manager, sub).await,
        "send" => send(&manager, sub).await,
        "deploy" => deploy(&manager, sub).await,
        "events" => events(&manager, sub).await,
        other => Err(anyhow!("Unknown command: {}", other)),
    };

    if let Err(e) = &result {
        error!("{} failed: {}", name, e);
    }
    result
}

fn cli() -> Command {
    let abi = Arg::new("abi")
        .long("abi")
        .value_name("FILE")
        .required(true)
        .help("ABI JSON file or compiler artifact");
    let address = Arg::new("address")
        .short('a')
        .long("address")
        .value_name("ADDRESS")
        .required(true)
        .help("Contract address");
    let method = Arg::new("method")
        .value_name("METHOD")
        .required(true)
        .help("Contract function name");
    let args = Arg::new("args")
        .value_name("ARG")
        .num_args(0..)
        .allow_hyphen_values(true)
        .help("Function arguments in declaration order");
    let from = Arg::new("from")
        .long("from")
        .value_name("ADDRESS")
        .help("Sender account (must be unlocked on the node)");
    let value = Arg::new("value")
        .long("value")
        .value_name("WEI")
        .help("Ether to send, in wei (decimal or 0x hex)");
    let gas = Arg::new("gas")
        .long("gas")
        .value_name("GAS")
        .help("Gas limit (defaults to [transaction].default_gas_limit)");
    let gas_price = Arg::new("gas-price")
        .long("gas-price")
        .value_name("WEI")
        .help("Gas price in wei");
    let nonce = Arg::new("nonce")
        .long("nonce")
        .value_name("NONCE")
        .help("Explicit account nonce");
    let wait = Arg::new("wait")
        .long("wait")
        .help("Watch the transaction until it is confirmed")
        .action(ArgAction::SetTrue);

    Command::new("contract-client")
        .version("0.1.0")
        .about("Call, transact with and watch Ethereum smart contracts")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (ethereum, sepolia, polygon, arbitrum, local)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("info").about("Show node, chain and account information"))
        .subcommand(
            Command::new("watch")
                .about("Follow a transaction until it is confirmed")
                .arg(Arg::new("hash").value_name("TX_HASH").required(true))
                .arg(
                    Arg::new("confirmations")
                        .long("confirmations")
                        .value_name("BLOCKS")
                        .value_parser(value_parser!(u64))
                        .help("Override [watcher].confirmation_blocks"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("BLOCKS")
                        .value_parser(value_parser!(u64))
                        .help("Override [watcher].block_timeout"),
                ),
        )
        .subcommand(
            Command::new("call")
                .about("Run a read-only function via eth_call")
                .arg(abi.clone())
                .arg(address.clone())
                .arg(
                    Arg::new("block")
                        .long("block")
                        .value_name("BLOCK")
                        .help("Block number or tag (latest, earliest, pending)"),
                )
                .arg(method.clone())
                .arg(args.clone()),
        )
        .subcommand(
            Command::new("estimate-gas")
                .about("Estimate the gas a function call would use")
                .arg(abi.clone())
                .arg(address.clone())
                .arg(from.clone())
                .arg(value.clone())
                .arg(method.clone())
                .arg(args.clone()),
        )
        .subcommand(
            Command::new("send")
                .about("Send a transaction invoking a state-changing function")
                .arg(abi.clone())
                .arg(address.clone())
                .arg(from.clone().required(true))
                .arg(value.clone())
                .arg(gas.clone())
                .arg(gas_price.clone())
                .arg(nonce.clone())
                .arg(wait.clone())
                .arg(method)
                .arg(args.clone()),
        )
        .subcommand(
            Command::new("deploy")
                .about("Deploy a contract")
                .arg(abi.clone())
                .arg(
                    Arg::new("bytecode")
                        .long("bytecode")
                        .value_name("HEX")
                        .help("Creation bytecode (defaults to the artifact's bytecode)"),
                )
                .arg(from.required(true))
                .arg(value)
                .arg(gas)
                .arg(gas_price)
                .arg(nonce)
                .arg(wait)
                .arg(args),
        )
        .subcommand(
            Command::new("events")
                .about("Fetch and decode past events")
                .arg(abi)
                .arg(address)
                .arg(
                    Arg::new("from-block")
                        .long("from-block")
                        .value_name("BLOCK")
                        .value_parser(value_parser!(u64))
                        .help("First block to search (defaults to the latest block)"),
                )
                .arg(
                    Arg::new("to-block")
                        .long("to-block")
                        .value_name("BLOCK")
                        .value_parser(value_parser!(u64))
                        .help("Last block to search (defaults to the latest block)"),
                )
                .arg(Arg::new("event").value_name("EVENT").required(true)),
        )
}

async fn load_contract(eth: &Eth, matches: &ArgMatches, address: Option<Address>) -> Result<DynamicContract> {
    let path = required(matches, "abi")?;
    let abi = load_abi_file(path).await?;
    Ok(DynamicContract::new(abi, address, eth.clone()))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing required argument --{}", name))
}

fn optional_quantity(matches: &ArgMatches, name: &str) -> Result<Option<U256>> {
    matches
        .get_one::<String>(name)
        .map(|value| parse_quantity(value))
        .transpose()
}

fn arguments(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("args")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn parse_block(block: &str) -> Result<BlockTag> {
    match block {
        "latest" => Ok(BlockTag::Latest),
        "earliest" => Ok(BlockTag::Earliest),
        "pending" => Ok(BlockTag::Pending),
        number => Ok(BlockTag::Number(parse_quantity(number)?)),
    }
}

/// Resolves the `METHOD ARG...` positionals against the contract's ABI.
fn method_invocation<'a>(
    contract: &DynamicContract,
    matches: &'a ArgMatches,
) -> Result<(&'a str, Box<dyn Invocation>)> {
    let name = required(matches, "method")?;
    validate_function_name(name)?;
    let args = arguments(matches);
    let method = contract.method(name, args.len()).map_err(|_| {
        anyhow!("Function '{}' with {} arguments not found in ABI", name, args.len())
    })?;
    let values = parse_arguments(&method.inputs, &args)?;
    let invocation = contract.invoke(name, values).map_err(explain)?;
    Ok((name, invocation))
}

fn explain(error: InvocationError) -> anyhow::Error {
    match error {
        InvocationError::Provider(e) => anyhow!(interpret_rpc_error(&e.to_string())),
        other => anyhow!(other),
    }
}

fn transaction_options(manager: &ProviderManager, matches: &ArgMatches) -> Result<TransactionOptions> {
    let defaults = &manager.config().transaction;
    let from = parse_address(required(matches, "from")?)?;
    let gas = optional_quantity(matches, "gas")?.unwrap_or(U256::from(defaults.default_gas_limit));

    let mut options = TransactionOptions::new(from, gas);
    if let Some(value) = optional_quantity(matches, "value")? {
        options = options.with_value(value);
    }
    if let Some(nonce) = optional_quantity(matches, "nonce")? {
        options = options.with_nonce(nonce);
    }
    match optional_quantity(matches, "gas-price")? {
        Some(gas_price) => options = options.with_gas_price(gas_price),
        None => {
            if let Some(gas_price) = defaults.gas_price {
                options = options.with_gas_price(U256::from(gas_price));
            }
        }
    }
    Ok(options)
}

/// Checks the node is reachable before a write and warns when it does not manage `from`.
async fn check_sender(manager: &ProviderManager, options: &TransactionOptions) -> Result<()> {
    manager.validate_network_connection(None).await?;

    let accounts = manager
        .eth(None)?
        .accounts()
        .await
        .map_err(|e| anyhow!(interpret_rpc_error(&e.to_string())))?;
    if !accounts.contains(&options.from) {
        warn!(
            "{} is not among the node's {} managed accounts; eth_sendTransaction will likely fail",
            options.from,
            accounts.len()
        );
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn node_info(manager: &ProviderManager) -> Result<()> {
    manager.validate_network_connection(None).await?;
    let eth = manager.eth(None)?;
    let rpc = |e: ProviderError| anyhow!(interpret_rpc_error(&e.to_string()));

    let syncing = eth.syncing().await.map_err(rpc)?;
    let latest = eth
        .get_block_by_number(BlockTag::Latest, false)
        .await
        .map_err(rpc)?;

    print_json(&json!({
        "network": manager.config().default_network,
        "clientVersion": eth.client_version().await.map_err(rpc)?,
        "netVersion": eth.net_version().await.map_err(rpc)?,
        "chainId": eth.chain_id().await.map_err(rpc)?.to_string(),
        "blockNumber": eth.block_number().await.map_err(rpc)?.to_string(),
        "latestBlock": latest.map(|block| json!({
            "hash": block.hash,
            "timestamp": block.timestamp.to_string(),
            "transactions": block.transactions.len(),
        })),
        "syncing": syncing.is_syncing(),
        "accounts": eth.accounts().await.map_err(rpc)?,
    }))
}

async fn watch(manager: &ProviderManager, matches: &ArgMatches) -> Result<()> {
    let hash = parse_hash(required(matches, "hash")?)?;
    let mut watcher_config = manager.config().watcher;
    if let Some(confirmations) = matches.get_one::<u64>("confirmations") {
        watcher_config.confirmation_blocks = *confirmations;
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        watcher_config.block_timeout = *timeout;
    }

    let options = WatcherOptions::try_from(watcher_config)
        .map_err(|e| anyhow!("Invalid watcher options: {}", e))?;
    let watcher = TransactionWatcher::new(manager.eth(None)?.clone(), options);
    follow(&watcher, hash).await
}

async fn follow(watcher: &TransactionWatcher, hash: B256) -> Result<()> {
    info!(
        "Watching {:?} for {} confirmations",
        hash,
        watcher.options().confirmation_blocks()
    );
    let mut statuses = watcher.wait_for_receipt(hash);

    while let Some(status) = statuses.next().await {
        match status {
            Ok(TransactionStatus::Pending) => println!("pending"),
            Ok(TransactionStatus::Confirmed { confirmations, .. }) => {
                println!("confirmed ({} blocks)", confirmations)
            }
            Ok(TransactionStatus::Successful { receipt }) => {
                println!("successful in block {}", receipt.block_number);
                if let Some(contract) = receipt.contract_address {
                    println!("contract address: {}", contract);
                }
            }
            Err(WatcherError::ResponseError(e)) => {
                return Err(anyhow!(interpret_rpc_error(&e.to_string())))
            }
            Err(e) => return Err(anyhow!(e)),
        }
    }
    Ok(())
}

async fn call(manager: &ProviderManager, matches: &ArgMatches) -> Result<()> {
    let eth = manager.eth(None)?;
    let address = parse_address(required(matches, "address")?)?;
    let contract = load_contract(eth, matches, Some(address)).await?;

    let (_, invocation) = method_invocation(&contract, matches)?;

    let block = matches
        .get_one::<String>("block")
        .map(|block| parse_block(block))
        .transpose()?
        .unwrap_or_default();

    let result = invocation.call_at(block).await.map_err(explain)?;
    print_json(&result_map_to_json(&result))
}

async fn estimate_gas(manager: &ProviderManager, matches: &ArgMatches) -> Result<()> {
    let eth = manager.eth(None)?;
    let address = parse_address(required(matches, "address")?)?;
    let contract = load_contract(eth, matches, Some(address)).await?;

    let (name, invocation) = method_invocation(&contract, matches)?;

    let from = matches
        .get_one::<String>("from")
        .map(|from| parse_address(from))
        .transpose()?;
    let value = optional_quantity(matches, "value")?;

    let gas = invocation
        .estimate_gas(from, None, value)
        .await
        .map_err(explain)?;
    print_json(&json!({ "function": name, "gas": gas.to_string() }))
}

async fn send(manager: &ProviderManager, matches: &ArgMatches) -> Result<()> {
    let eth = manager.eth(None)?;
    let address = parse_address(required(matches, "address")?)?;
    let contract = load_contract(eth, matches, Some(address)).await?;

    let (_, invocation) = method_invocation(&contract, matches)?;
    let options = transaction_options(manager, matches)?;
    check_sender(manager, &options).await?;

    let hash = invocation.send(options).await.map_err(explain)?;
    println!("{}", hash);

    if matches.get_flag("wait") {
        let watcher = TransactionWatcher::new(eth.clone(), manager.config().watcher_options()?);
        follow(&watcher, hash).await?;
    }
    Ok(())
}

async fn deploy(manager: &ProviderManager, matches: &ArgMatches) -> Result<()> {
    let eth = manager.eth(None)?;
    let path = required(matches, "abi")?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read {}: {}", path, e))?;
    let abi: JsonAbi = parse_abi(&content)?;

    let bytecode: Bytes = match matches.get_one::<String>("bytecode") {
        Some(code) => parse_bytes(code)?,
        None => parse_bytes(&artifact_bytecode(&content).ok_or_else(|| {
            anyhow!("No bytecode in {}; pass --bytecode", path)
        })?)?,
    };

    let inputs = abi
        .constructor
        .as_ref()
        .map(|constructor| constructor.inputs.clone())
        .unwrap_or_default();
    let values = parse_arguments(&inputs, &arguments(matches))?;
    let options = transaction_options(manager, matches)?;
    check_sender(manager, &options).await?;

    let contract = DynamicContract::new(abi, None, eth.clone());
    let invocation = contract.deploy(bytecode, values).map_err(explain)?;
    let hash = invocation.send(options).await.map_err(explain)?;
    println!("{}", hash);

    if matches.get_flag("wait") {
        let watcher = TransactionWatcher::new(eth.clone(), manager.config().watcher_options()?);
        follow(&watcher, hash).await?;
    }
    Ok(())
}

async fn events(manager: &ProviderManager, matches: &ArgMatches) -> Result<()> {
    let eth = manager.eth(None)?;
    let address = parse_address(required(matches, "address")?)?;
    let contract = load_contract(eth, matches, Some(address)).await?;

    let name = required(matches, "event")?;
    let event = contract
        .typed_event(name, |fields| Ok(result_map_to_json(fields)))
        .map_err(|_| anyhow!("Event '{}' not found in ABI", name))?;

    let mut filter = Filter::new()
        .address(address)
        .event_signature(event.event().selector());
    if let Some(from_block) = matches.get_one::<u64>("from-block") {
        filter = filter.from_block(*from_block);
    }
    if let Some(to_block) = matches.get_one::<u64>("to-block") {
        filter = filter.to_block(*to_block);
    }

    let logs = eth
        .get_logs(&filter)
        .await
        .map_err(|e| anyhow!(interpret_rpc_error(&e.to_string())))?;
    info!("Found {} {} logs", logs.len(), name);

    let mut decoded = Vec::with_capacity(logs.len());
    for log in &logs {
        let materialized = ContractEvent::from_log(&event, log, Some(log.address))?;
        decoded.push(json!({
            "event": materialized.signature,
            "blockNumber": materialized.block_number.map(|n| n.to_string()),
            "transactionHash": materialized.transaction_hash,
            "logIndex": materialized.log_index.map(|n| n.to_string()),
            "result": materialized.result,
            "topics": materialized.raw.topics,
        }));
    }

    print_json(&Value::Array(decoded))
}
