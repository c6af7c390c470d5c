use derive_more::Display;
use serde::{
    Deserialize,
    Serialize,
};
use web3::types::Address;

use crate::primitives::{
    AdditionalHash,
    BalanceHash,
    BlockNumber,
    CanonicalIdentifier,
    ChainID,
    ChannelIdentifier,
    Nonce,
    RewardAmount,
    SettleTimeout,
    Signature,
    TokenNetworkAddress,
    TokenNetworkRegistryAddress,
    TransactionHash,
};

/// Channel lifecycle. Transitions are strictly monotonic, a channel never
/// regresses to an earlier status.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ChannelStatus {
    Opened,
    Closed,
    Settled,
}

impl ChannelStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "Opened" => Some(ChannelStatus::Opened),
            "Closed" => Some(ChannelStatus::Closed),
            "Settled" => Some(ChannelStatus::Settled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub token_network_address: TokenNetworkAddress,
    pub channel_identifier: ChannelIdentifier,
    pub participant1: Address,
    pub participant2: Address,
    pub settle_timeout: SettleTimeout,
    pub status: ChannelStatus,
    pub closing_block: Option<BlockNumber>,
    pub closing_participant: Option<Address>,
    /// Hash of the update transaction submitted by the monitor, if any.
    pub monitor_tx_hash: Option<TransactionHash>,
    /// Hash of the reward claim transaction, if any.
    pub claim_tx_hash: Option<TransactionHash>,
}

impl Channel {
    pub fn new(
        token_network_address: TokenNetworkAddress,
        channel_identifier: ChannelIdentifier,
        participant1: Address,
        participant2: Address,
        settle_timeout: SettleTimeout,
    ) -> Self {
        Self {
            token_network_address,
            channel_identifier,
            participant1,
            participant2,
            settle_timeout,
            status: ChannelStatus::Opened,
            closing_block: None,
            closing_participant: None,
            monitor_tx_hash: None,
            claim_tx_hash: None,
        }
    }

    pub fn canonical_identifier(&self) -> CanonicalIdentifier {
        CanonicalIdentifier {
            token_network_address: self.token_network_address,
            channel_identifier: self.channel_identifier,
        }
    }

    pub fn has_participant(&self, address: Address) -> bool {
        self.participant1 == address || self.participant2 == address
    }

    pub fn partner_of(&self, address: Address) -> Option<Address> {
        if self.participant1 == address {
            Some(self.participant2)
        } else if self.participant2 == address {
            Some(self.participant1)
        } else {
            None
        }
    }
}

/// Off-chain request authorizing the monitor to submit the counterparty's
/// balance proof on-chain for a reward. Only the highest nonce per
/// (token network, channel, non-closing signer) is ever kept.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MonitorRequest {
    pub token_network_address: TokenNetworkAddress,
    pub channel_identifier: ChannelIdentifier,
    pub non_closing_signer: Address,
    pub balance_hash: BalanceHash,
    pub nonce: Nonce,
    pub additional_hash: AdditionalHash,
    pub closing_signature: Signature,
    pub non_closing_signature: Signature,
    pub reward_amount: RewardAmount,
    pub reward_proof_signature: Signature,
    /// Head block at the time the request was accepted, used for pruning.
    pub received_at_block: BlockNumber,
}

impl MonitorRequest {
    pub fn canonical_identifier(&self) -> CanonicalIdentifier {
        CanonicalIdentifier {
            token_network_address: self.token_network_address,
            channel_identifier: self.channel_identifier,
        }
    }
}

/// Durable process-wide checkpoint. `latest_known_block` only ever moves
/// forward and commits atomically with the block batch that produced it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockchainState {
    pub chain_id: ChainID,
    pub token_network_registry_address: TokenNetworkRegistryAddress,
    pub monitoring_contract_address: Address,
    pub latest_known_block: BlockNumber,
    pub token_network_addresses: Vec<TokenNetworkAddress>,
}
