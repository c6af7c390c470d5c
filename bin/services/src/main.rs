#[macro_use]
extern crate slog;

use std::{
    fs,
    path::PathBuf,
    process,
    sync::Arc,
};

use raiden_services::{
    blockchain::{
        events::Web3EventFetcher,
        key::PrivateKey,
        proxies::Web3TransactionSender,
    },
    handlers::Context,
    primitives::{
        parse_address,
        ChainID,
        PathfindingConfig,
        ServicesConfig,
    },
    service::{
        MonitoringService,
        PathfindingService,
    },
    storage::Storage,
};
use rusqlite::Connection;
use slog::{
    Drain,
    Logger,
};
use structopt::StructOpt;
use tokio::{
    io::{
        AsyncBufReadExt,
        BufReader,
    },
    sync::{
        mpsc,
        watch,
    },
};
use web3::types::U64;

use crate::cli::Opt;

mod accounts;
mod cli;

#[tokio::main]
async fn main() {
    let cli = Opt::from_args();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = Logger::root(drain, o!());

    let datadir = match setup_data_directory(cli.datadir.clone()) {
        Ok(datadir) => datadir,
        Err(e) => {
            eprintln!("Error initializing data directory: {}", e);
            process::exit(1);
        }
    };

    let private_key = match unlock_private_key(&cli) {
        Ok(private_key) => private_key,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let config = match services_config(&cli, datadir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    info!(logger, "Raiden services starting"; "chain_id" => format!("{}", config.chain_id));

    if let Err(e) = run_services(cli, config, private_key, logger.clone()).await {
        crit!(logger, "Service failed"; "error" => e);
        process::exit(1);
    }
}

fn setup_data_directory(path: PathBuf) -> Result<PathBuf, String> {
    let path =
        expanduser::expanduser(path.to_string_lossy()).map_err(|_| "Failed to expand data directory".to_owned())?;
    if !path.exists() {
        fs::create_dir_all(&path).map_err(|e| format!("Could not create directory {:?}: {}", path, e))?;
    }
    if !path.is_dir() {
        return Err("Datadir has to be a directory".to_owned());
    }
    Ok(path)
}

fn unlock_private_key(cli: &Opt) -> Result<PrivateKey, String> {
    let keys = accounts::list_keys(cli.keystore_path.as_path()).map_err(|e| format!("Error listing accounts: {}", e))?;
    if keys.is_empty() {
        return Err(format!("No keys found in {:?}", cli.keystore_path));
    }
    let key_filename = cli::prompt_key(&keys);

    let secret_key = match &cli.password_file {
        Some(password_file) => {
            let password = fs::read_to_string(password_file)
                .map_err(|e| format!("Error reading password file: {}", e))?
                .trim()
                .to_owned();
            accounts::unlock_key(&key_filename, password).ok_or_else(|| "Invalid keystore password".to_owned())?
        }
        None => cli::prompt_password(key_filename),
    };
    Ok(PrivateKey::new(secret_key))
}

fn services_config(cli: &Opt, datadir: PathBuf) -> Result<ServicesConfig, String> {
    let chain_id = ChainID::try_from(cli.chain_id).map_err(|e| format!("{}", e))?;
    let token_network_registry_address =
        parse_address(&cli.token_network_registry).map_err(|e| format!("Invalid registry address: {}", e))?;
    let monitoring_contract_address =
        parse_address(&cli.monitoring_contract).map_err(|e| format!("Invalid monitoring address: {}", e))?;

    let mut config = ServicesConfig::new(
        chain_id,
        token_network_registry_address,
        monitoring_contract_address,
        datadir,
        cli.eth_rpc_endpoint.clone(),
    );
    if let Some(wait_blocks) = cli.wait_blocks {
        config.wait_blocks = wait_blocks;
    }
    if let Some(block_confirmations) = cli.block_confirmations {
        config.block_confirmations = block_confirmations;
    }
    Ok(config)
}

async fn run_services(cli: Opt, config: ServicesConfig, private_key: PrivateKey, logger: Logger) -> Result<(), String> {
    let http = web3::transports::Http::new(&config.eth_rpc_endpoint)
        .map_err(|e| format!("Invalid RPC endpoint: {}", e))?;
    let web3 = web3::Web3::new(http);

    let conn = Connection::open(config.datadir.join("services.db"))
        .map_err(|e| format!("Could not open database: {}", e))?;
    let storage = Storage::new(conn);
    storage.setup_database().map_err(|e| format!("Could not set up database: {}", e))?;
    storage
        .init_chain_state(
            config.chain_id,
            config.token_network_registry_address,
            config.monitoring_contract_address,
            U64::from(cli.start_block),
        )
        .map_err(|e| format!("Could not initialize chain state: {}", e))?;

    let pathfinding = Arc::new(PathfindingService::new(
        config.chain_id,
        &PathfindingConfig::default(),
        logger.clone(),
    ));
    pathfinding
        .restore(&storage)
        .map_err(|e| format!("Could not restore routing state: {}", e))?;

    let transaction_sender = Arc::new(Web3TransactionSender::new(
        web3.clone(),
        config.monitoring_contract_address,
        private_key,
    ));
    let context = Context {
        chain_id: config.chain_id,
        wait_blocks: config.wait_blocks,
        storage,
        transaction_sender,
        log: logger.clone(),
    };
    let service = MonitoringService::new(
        context,
        Arc::new(Web3EventFetcher::new(web3)),
        &config,
        logger.clone(),
    )
    .with_pathfinding(pathfinding);

    // Off-chain messages arrive as JSON lines on stdin.
    let (message_tx, message_rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if message_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_log = logger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(signal_log, "Interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    service
        .run(message_rx, shutdown_rx)
        .await
        .map_err(|e| format!("{}", e))
}
