use serde::{
    Deserialize,
    Serialize,
};
use web3::types::Address;

use crate::primitives::{
    BlockNumber,
    CanonicalIdentifier,
    Nonce,
    SettleTimeout,
    TokenAddress,
    TokenNetworkAddress,
};

/// Everything the services react to. `Receive*` variants are derived from
/// confirmed blockchain logs, `Action*` variants are produced internally by
/// the scheduler, `UpdatedHeadBlock` closes every batch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ReceiveTokenNetworkCreated(ReceiveTokenNetworkCreated),
    ReceiveChannelOpened(ReceiveChannelOpened),
    ReceiveChannelClosed(ReceiveChannelClosed),
    ReceiveChannelSettled(ReceiveChannelSettled),
    ReceiveNonClosingBalanceProofUpdated(ReceiveNonClosingBalanceProofUpdated),
    ActionMonitoringTriggered(ActionMonitoringTriggered),
    ActionClaimRewardTriggered(ActionClaimRewardTriggered),
    UpdatedHeadBlock(UpdatedHeadBlock),
}

impl Event {
    /// Block the event was confirmed in, for chain-derived events.
    pub fn block_number(&self) -> Option<BlockNumber> {
        match self {
            Event::ReceiveTokenNetworkCreated(inner) => Some(inner.block_number),
            Event::ReceiveChannelOpened(inner) => Some(inner.block_number),
            Event::ReceiveChannelClosed(inner) => Some(inner.block_number),
            Event::ReceiveChannelSettled(inner) => Some(inner.block_number),
            Event::ReceiveNonClosingBalanceProofUpdated(inner) => Some(inner.block_number),
            Event::ActionMonitoringTriggered(_) => None,
            Event::ActionClaimRewardTriggered(_) => None,
            Event::UpdatedHeadBlock(inner) => Some(inner.block_number),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReceiveTokenNetworkCreated {
    pub token_network_address: TokenNetworkAddress,
    pub token_address: TokenAddress,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReceiveChannelOpened {
    pub canonical_identifier: CanonicalIdentifier,
    pub participant1: Address,
    pub participant2: Address,
    pub settle_timeout: SettleTimeout,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReceiveChannelClosed {
    pub canonical_identifier: CanonicalIdentifier,
    pub closing_participant: Address,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReceiveChannelSettled {
    pub canonical_identifier: CanonicalIdentifier,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReceiveNonClosingBalanceProofUpdated {
    pub canonical_identifier: CanonicalIdentifier,
    pub closing_participant: Address,
    pub nonce: Nonce,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActionMonitoringTriggered {
    pub canonical_identifier: CanonicalIdentifier,
    pub non_closing_signer: Address,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActionClaimRewardTriggered {
    pub canonical_identifier: CanonicalIdentifier,
    pub non_closing_signer: Address,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdatedHeadBlock {
    pub block_number: BlockNumber,
}

/// An event frozen until the chain confirms a block at or past the trigger.
/// Dispatch may come arbitrarily late but never early.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub trigger_block_number: BlockNumber,
    pub event: Event,
}

pub fn monitoring_triggered(
    canonical_identifier: CanonicalIdentifier,
    non_closing_signer: Address,
) -> Event {
    Event::ActionMonitoringTriggered(ActionMonitoringTriggered {
        canonical_identifier,
        non_closing_signer,
    })
}

pub fn claim_reward_triggered(
    canonical_identifier: CanonicalIdentifier,
    non_closing_signer: Address,
) -> Event {
    Event::ActionClaimRewardTriggered(ActionClaimRewardTriggered {
        canonical_identifier,
        non_closing_signer,
    })
}
