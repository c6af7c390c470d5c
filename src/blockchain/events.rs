use std::collections::HashMap;

use async_trait::async_trait;
use derive_more::Display;
use ethabi::{
    EventParam,
    ParamType,
    Token,
};
use lazy_static::lazy_static;
use web3::{
    transports::Http,
    types::{
        Address,
        BlockNumber as Web3BlockNumber,
        FilterBuilder,
        Log,
        U256,
        U64,
    },
    Web3,
};

use crate::{
    events::{
        Event,
        ReceiveChannelClosed,
        ReceiveChannelOpened,
        ReceiveChannelSettled,
        ReceiveNonClosingBalanceProofUpdated,
        ReceiveTokenNetworkCreated,
    },
    primitives::{
        BlockNumber,
        CanonicalIdentifier,
    },
};

pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Display, Debug)]
pub enum BlockchainError {
    #[display(fmt = "RPC error: {}", _0)]
    Rpc(web3::Error),
    #[display(fmt = "Cannot decode log: {}", _0)]
    Decode(String),
}

lazy_static! {
    static ref CONTRACT_EVENTS: Vec<ethabi::Event> = vec![
        ethabi::Event {
            name: "TokenNetworkCreated".to_owned(),
            inputs: vec![
                EventParam {
                    name: "token_address".to_owned(),
                    kind: ParamType::Address,
                    indexed: true,
                },
                EventParam {
                    name: "token_network_address".to_owned(),
                    kind: ParamType::Address,
                    indexed: false,
                },
            ],
            anonymous: false,
        },
        ethabi::Event {
            name: "ChannelOpened".to_owned(),
            inputs: vec![
                EventParam {
                    name: "channel_identifier".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: true,
                },
                EventParam {
                    name: "participant1".to_owned(),
                    kind: ParamType::Address,
                    indexed: true,
                },
                EventParam {
                    name: "participant2".to_owned(),
                    kind: ParamType::Address,
                    indexed: true,
                },
                EventParam {
                    name: "settle_timeout".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: false,
                },
            ],
            anonymous: false,
        },
        ethabi::Event {
            name: "ChannelClosed".to_owned(),
            inputs: vec![
                EventParam {
                    name: "channel_identifier".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: true,
                },
                EventParam {
                    name: "closing_participant".to_owned(),
                    kind: ParamType::Address,
                    indexed: true,
                },
                EventParam {
                    name: "nonce".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: false,
                },
            ],
            anonymous: false,
        },
        ethabi::Event {
            name: "ChannelSettled".to_owned(),
            inputs: vec![
                EventParam {
                    name: "channel_identifier".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: true,
                },
                EventParam {
                    name: "participant1_amount".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: false,
                },
                EventParam {
                    name: "participant2_amount".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: false,
                },
            ],
            anonymous: false,
        },
        ethabi::Event {
            name: "NonClosingBalanceProofUpdated".to_owned(),
            inputs: vec![
                EventParam {
                    name: "channel_identifier".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: true,
                },
                EventParam {
                    name: "closing_participant".to_owned(),
                    kind: ParamType::Address,
                    indexed: true,
                },
                EventParam {
                    name: "nonce".to_owned(),
                    kind: ParamType::Uint(256),
                    indexed: false,
                },
            ],
            anonymous: false,
        },
    ];
}

/// Decoded contract log, still keyed by parameter name. Gets mapped onto
/// the typed `Event` union right after.
#[derive(Clone, Debug)]
pub struct ContractEvent {
    pub name: String,
    pub address: Address,
    pub block_number: U64,
    pub log_index: U256,
    pub data: HashMap<String, Token>,
}

impl ContractEvent {
    pub fn from_log(log: &Log) -> Option<ContractEvent> {
        let topic0 = log.topics.first()?;
        let event = CONTRACT_EVENTS.iter().find(|event| event.signature() == *topic0)?;

        let mut data: HashMap<String, Token> = HashMap::new();

        let indexed_inputs = event.inputs.iter().filter(|input| input.indexed);
        for (input, topic) in indexed_inputs.zip(&log.topics[1..]) {
            let decoded = ethabi::decode(&[input.kind.clone()], topic.as_bytes()).ok()?;
            data.insert(input.name.clone(), decoded.into_iter().next()?);
        }

        let non_indexed: Vec<&EventParam> = event.inputs.iter().filter(|input| !input.indexed).collect();
        if !non_indexed.is_empty() && !log.data.0.is_empty() {
            let kinds: Vec<ParamType> = non_indexed.iter().map(|input| input.kind.clone()).collect();
            let decoded = ethabi::decode(&kinds, &log.data.0).ok()?;
            for (input, token) in non_indexed.iter().zip(decoded) {
                data.insert(input.name.clone(), token);
            }
        }

        Some(ContractEvent {
            name: event.name.clone(),
            address: log.address,
            block_number: log.block_number?,
            log_index: log.log_index.unwrap_or_default(),
            data,
        })
    }

    fn address_param(&self, name: &str) -> Option<Address> {
        match self.data.get(name)? {
            Token::Address(address) => Some(*address),
            _ => None,
        }
    }

    fn uint_param(&self, name: &str) -> Option<U256> {
        match self.data.get(name)? {
            Token::Uint(value) => Some(*value),
            _ => None,
        }
    }

    /// The emitting contract is the token network for channel events and
    /// the registry for `TokenNetworkCreated`.
    pub fn to_service_event(&self) -> Option<Event> {
        let canonical_identifier = || -> Option<CanonicalIdentifier> {
            Some(CanonicalIdentifier {
                token_network_address: self.address,
                channel_identifier: self.uint_param("channel_identifier")?,
            })
        };

        match self.name.as_ref() {
            "TokenNetworkCreated" => Some(Event::ReceiveTokenNetworkCreated(ReceiveTokenNetworkCreated {
                token_network_address: self.address_param("token_network_address")?,
                token_address: self.address_param("token_address")?,
                block_number: self.block_number,
            })),
            "ChannelOpened" => Some(Event::ReceiveChannelOpened(ReceiveChannelOpened {
                canonical_identifier: canonical_identifier()?,
                participant1: self.address_param("participant1")?,
                participant2: self.address_param("participant2")?,
                settle_timeout: U64::from(self.uint_param("settle_timeout")?.low_u64()),
                block_number: self.block_number,
            })),
            "ChannelClosed" => Some(Event::ReceiveChannelClosed(ReceiveChannelClosed {
                canonical_identifier: canonical_identifier()?,
                closing_participant: self.address_param("closing_participant")?,
                block_number: self.block_number,
            })),
            "ChannelSettled" => Some(Event::ReceiveChannelSettled(ReceiveChannelSettled {
                canonical_identifier: canonical_identifier()?,
                block_number: self.block_number,
            })),
            "NonClosingBalanceProofUpdated" => Some(Event::ReceiveNonClosingBalanceProofUpdated(
                ReceiveNonClosingBalanceProofUpdated {
                    canonical_identifier: canonical_identifier()?,
                    closing_participant: self.address_param("closing_participant")?,
                    nonce: self.uint_param("nonce")?,
                    block_number: self.block_number,
                },
            )),
            _ => None,
        }
    }
}

/// Confirmed-log feed for a block range. Implementations must answer the
/// same range with the same events every time so catch-up after a restart
/// can re-query safely.
#[async_trait]
pub trait BlockchainEvents: Send + Sync {
    async fn latest_block(&self) -> Result<BlockNumber>;

    async fn events_in_range(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Event>>;
}

pub struct Web3EventFetcher {
    web3: Web3<Http>,
}

impl Web3EventFetcher {
    pub fn new(web3: Web3<Http>) -> Self {
        Self { web3 }
    }
}

#[async_trait]
impl BlockchainEvents for Web3EventFetcher {
    async fn latest_block(&self) -> Result<BlockNumber> {
        self.web3.eth().block_number().await.map_err(BlockchainError::Rpc)
    }

    async fn events_in_range(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Event>> {
        let filter = FilterBuilder::default()
            .address(addresses.to_vec())
            .from_block(Web3BlockNumber::Number(from_block))
            .to_block(Web3BlockNumber::Number(to_block))
            .build();

        let logs = self.web3.eth().logs(filter).await.map_err(BlockchainError::Rpc)?;

        let mut decoded: Vec<ContractEvent> = logs.iter().filter_map(ContractEvent::from_log).collect();
        // Blockchain order: ascending block, then log index within a block.
        decoded.sort_by_key(|event| (event.block_number, event.log_index));

        Ok(decoded.iter().filter_map(ContractEvent::to_service_event).collect())
    }
}
