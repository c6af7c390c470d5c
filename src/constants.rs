use web3::types::H256;

pub const DEFAULT_NUMBER_OF_BLOCK_CONFIRMATIONS: u64 = 5;

/// Blocks to wait after a channel close before the monitor intervenes,
/// giving the non-closing participant time to submit its own balance proof.
pub const DEFAULT_WAIT_BLOCKS: u64 = 10;

/// Monitor requests without a matching channel are dropped once they are
/// older than this many blocks.
pub const DEFAULT_REQUEST_RETENTION_BLOCKS: u64 = 1000;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

pub const MONITOR_GAS_LIMIT: u64 = 240_000;
pub const CLAIM_REWARD_GAS_LIMIT: u64 = 100_000;

pub const TRANSACTION_RETRIES: usize = 3;
pub const TRANSACTION_RETRY_BACKOFF_MS: u64 = 500;

/// Root of a merkle tree built from no locks at all. Real data can never
/// produce it because every inner node is a keccak output.
pub const EMPTY_MERKLE_ROOT: H256 = H256([0u8; 32]);

pub const DB_SCHEMA_VERSION: u32 = 1;

pub const MAX_PATHS_PER_REQUEST: usize = 5;

/// Added to every edge weight so that shorter routes win when fees tie.
pub const DIJKSTRA_HOP_BIAS: u64 = 1;

/// Weight penalty applied to edges already used by a previously returned
/// path, pushing later paths onto disjoint routes.
pub const PATH_DIVERSITY_PENALTY: u64 = 1_000;
