use web3::types::{
    H256,
    U256,
    U64,
};

pub type BalanceHash = H256;

pub type AdditionalHash = H256;

pub type BlockNumber = U64;

pub type BlockHash = H256;

pub type BlockTimeout = u64;

pub type ChannelIdentifier = U256;

pub type FeeAmount = U256;

pub type GasLimit = U256;

pub type Nonce = U256;

pub type ProportionalFeeAmount = U256;

pub type RewardAmount = U256;

pub type SettleTimeout = U64;

pub type Signature = Vec<u8>;

pub type TokenAmount = U256;

pub type TokenAddress = web3::types::Address;

pub type TokenNetworkAddress = web3::types::Address;

pub type TokenNetworkRegistryAddress = web3::types::Address;

pub type TransactionHash = H256;
