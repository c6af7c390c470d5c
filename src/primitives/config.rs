use std::path::PathBuf;
use web3::types::Address;

use crate::constants::{
    DEFAULT_NUMBER_OF_BLOCK_CONFIRMATIONS,
    DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_RETENTION_BLOCKS,
    DEFAULT_WAIT_BLOCKS,
    MAX_PATHS_PER_REQUEST,
};

use super::ChainID;

#[derive(Clone)]
pub struct ServicesConfig {
    pub chain_id: ChainID,
    pub token_network_registry_address: Address,
    pub monitoring_contract_address: Address,
    pub datadir: PathBuf,
    pub eth_rpc_endpoint: String,
    pub block_confirmations: u64,
    /// Blocks between a channel close and the monitoring intervention.
    pub wait_blocks: u64,
    pub request_retention_blocks: u64,
    pub poll_interval_ms: u64,
}

impl ServicesConfig {
    pub fn new(
        chain_id: ChainID,
        token_network_registry_address: Address,
        monitoring_contract_address: Address,
        datadir: PathBuf,
        eth_rpc_endpoint: String,
    ) -> Self {
        Self {
            chain_id,
            token_network_registry_address,
            monitoring_contract_address,
            datadir,
            eth_rpc_endpoint,
            block_confirmations: DEFAULT_NUMBER_OF_BLOCK_CONFIRMATIONS,
            wait_blocks: DEFAULT_WAIT_BLOCKS,
            request_retention_blocks: DEFAULT_REQUEST_RETENTION_BLOCKS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Clone)]
pub struct PathfindingConfig {
    pub max_paths: usize,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            max_paths: MAX_PATHS_PER_REQUEST,
        }
    }
}
