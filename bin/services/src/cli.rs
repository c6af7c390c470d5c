use std::{
    collections::HashMap,
    io::{
        stdin,
        stdout,
        Write,
    },
    path::PathBuf,
};

use structopt::StructOpt;
use web3::types::Address;

use crate::accounts;

#[derive(StructOpt, Debug)]
#[structopt(name = "raiden-services")]
pub struct Opt {
    /// Chain to run the services on (1, 3, 4, 5 or 42).
    #[structopt(short = "c", long, default_value = "5")]
    pub chain_id: u64,

    /// HTTP RPC endpoint of an Ethereum node.
    #[structopt(long)]
    pub eth_rpc_endpoint: String,

    /// Directory containing keystore files.
    #[structopt(short = "k", long, parse(from_os_str))]
    pub keystore_path: PathBuf,

    /// Read the keystore password from this file instead of prompting.
    #[structopt(long, parse(from_os_str))]
    pub password_file: Option<PathBuf>,

    #[structopt(short = "d", long, parse(from_os_str), default_value = "~/.raiden-services")]
    pub datadir: PathBuf,

    /// Address of the token network registry contract.
    #[structopt(long)]
    pub token_network_registry: String,

    /// Address of the monitoring contract.
    #[structopt(long)]
    pub monitoring_contract: String,

    /// Block to start syncing from on first run.
    #[structopt(long, default_value = "0")]
    pub start_block: u64,

    /// Blocks between a channel close and the monitoring intervention.
    #[structopt(long)]
    pub wait_blocks: Option<u64>,

    /// Confirmations required before a block counts as final.
    #[structopt(long)]
    pub block_confirmations: Option<u64>,
}

pub fn prompt_key(keys: &HashMap<String, Address>) -> String {
    println!("Select key:");
    loop {
        let mut s = String::new();

        for (index, address) in keys.values().enumerate() {
            println!("[{}]: {:#x}", index, address);
        }
        print!("Selected key: ");
        let _ = stdout().flush();
        stdin().read_line(&mut s).expect("Did not enter a correct string");
        let selected_value: Result<u32, _> = s.trim().parse();
        if let Ok(chosen_index) = selected_value {
            if (chosen_index as usize) >= keys.len() {
                continue;
            }
            let selected_filename = keys.keys().nth(chosen_index as usize).unwrap();
            return selected_filename.clone();
        }
    }
}

pub fn prompt_password(key_filename: String) -> ethsign::SecretKey {
    loop {
        let password = rpassword::read_password_from_tty(Some("Password: ")).expect("Could not read password");
        if let Some(secret_key) = accounts::unlock_key(&key_filename, password) {
            return secret_key;
        }
        println!("Invalid password, try again");
    }
}
