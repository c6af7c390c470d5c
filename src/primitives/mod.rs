mod config;
mod types;

pub use config::*;
pub use types::*;

use derive_more::Display;
use serde::{
    Deserialize,
    Serialize,
};
use std::str::FromStr;
use web3::types::Address;

use crate::errors::TypeError;

#[derive(Copy, Clone, Display, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ChainID {
    Mainnet = 1,
    Ropsten = 3,
    Rinkeby = 4,
    Goerli = 5,
    Kovan = 42,
}

impl From<ChainID> for u64 {
    fn from(chain_id: ChainID) -> Self {
        chain_id as u64
    }
}

impl TryFrom<u64> for ChainID {
    type Error = TypeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChainID::Mainnet),
            3 => Ok(ChainID::Ropsten),
            4 => Ok(ChainID::Rinkeby),
            5 => Ok(ChainID::Goerli),
            42 => Ok(ChainID::Kovan),
            _ => Err(TypeError {
                msg: format!("Unknown chain id: {}", value),
            }),
        }
    }
}

impl ChainID {
    /// 32-byte big-endian representation used when packing signed data.
    pub fn to_bytes(self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&(self as u64).to_be_bytes());
        bytes
    }
}

/// Channel identity within one chain: the registry guarantees channel
/// identifiers are unique per token network.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct CanonicalIdentifier {
    pub token_network_address: TokenNetworkAddress,
    pub channel_identifier: ChannelIdentifier,
}

/// Validated address constructor. Raw strings from CLI arguments, JSON
/// messages and database rows all pass through here so that malformed
/// addresses never enter the typed model.
pub fn parse_address(value: &str) -> Result<Address, TypeError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    if trimmed.len() != 40 {
        return Err(TypeError {
            msg: format!("Invalid address length: {}", value),
        });
    }
    Address::from_str(trimmed).map_err(|e| TypeError {
        msg: format!("Invalid address {}: {}", value, e),
    })
}
