use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use slog::{
    o,
    Discard,
    Logger,
};
use web3::{
    signing::Key,
    types::{
        Address,
        H256,
        U256,
        U64,
    },
};

use crate::{
    blockchain::{
        events::{
            BlockchainError,
            BlockchainEvents,
        },
        key::PrivateKey,
        proxies::{
            ProxyError,
            TransactionReceiptInfo,
            TransactionSender,
        },
    },
    events::Event,
    handlers::Context,
    messages::MonitorRequestMessage,
    primitives::{
        BlockNumber,
        CanonicalIdentifier,
        ChainID,
        Nonce,
        TransactionHash,
    },
    state::MonitorRequest,
    storage::Storage,
};

pub fn test_logger() -> Logger {
    Logger::root(Discard, o!())
}

/// Deterministic signing key derived from a seed byte.
pub fn private_key(seed: u8) -> PrivateKey {
    PrivateKey::new(ethsign::SecretKey::from_raw(&[seed; 32]).expect("valid key bytes"))
}

/// In-memory context with a mock transaction sender, ready for handlers.
pub fn test_context() -> (Context, Arc<MockTransactionSender>) {
    let storage = Storage::new(Connection::open_in_memory().unwrap());
    storage.setup_database().unwrap();
    storage
        .init_chain_state(
            ChainID::Goerli,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            U64::zero(),
        )
        .unwrap();

    let sender = Arc::new(MockTransactionSender::default());
    let context = Context {
        chain_id: ChainID::Goerli,
        wait_blocks: 5,
        storage,
        transaction_sender: sender.clone(),
        log: test_logger(),
    };
    (context, sender)
}

#[derive(Default)]
pub struct MockTransactionSender {
    monitor_calls: Mutex<usize>,
    claim_calls: Mutex<usize>,
    fail_next: Mutex<bool>,
    fail_always: Mutex<bool>,
}

impl MockTransactionSender {
    pub fn monitor_calls(&self) -> usize {
        *self.monitor_calls.lock()
    }

    pub fn claim_calls(&self) -> usize {
        *self.claim_calls.lock()
    }

    /// Makes the next submission fail, once.
    pub fn fail_next(&self, fail: bool) {
        *self.fail_next.lock() = fail;
    }

    /// Makes every submission fail, simulating an unreachable node.
    pub fn fail_always(&self, fail: bool) {
        *self.fail_always.lock() = fail;
    }

    fn take_failure(&self) -> bool {
        if *self.fail_always.lock() {
            return true;
        }
        std::mem::take(&mut *self.fail_next.lock())
    }
}

#[async_trait]
impl TransactionSender for MockTransactionSender {
    async fn monitor(&self, _request: &MonitorRequest) -> Result<TransactionHash, ProxyError> {
        *self.monitor_calls.lock() += 1;
        if self.take_failure() {
            return Err(ProxyError::Rpc(web3::Error::Internal));
        }
        Ok(H256::repeat_byte(0xfe))
    }

    async fn claim_reward(
        &self,
        _canonical_identifier: &CanonicalIdentifier,
        _non_closing_signer: Address,
    ) -> Result<TransactionHash, ProxyError> {
        *self.claim_calls.lock() += 1;
        if self.take_failure() {
            return Err(ProxyError::Rpc(web3::Error::Internal));
        }
        Ok(H256::repeat_byte(0xfd))
    }

    async fn get_receipt(&self, _transaction_hash: TransactionHash) -> Result<Option<TransactionReceiptInfo>, ProxyError> {
        Ok(None)
    }
}

/// Scripted confirmed-log feed. Events are handed out by block range and,
/// when tagged with an emitting contract, by address, so re-querying a
/// range behaves like the real fetcher.
#[derive(Default)]
pub struct MockBlockchainEvents {
    latest: Mutex<U64>,
    events: Mutex<Vec<(Option<Address>, Event)>>,
}

impl MockBlockchainEvents {
    pub fn set_latest_block(&self, block_number: u64) {
        *self.latest.lock() = U64::from(block_number);
    }

    /// Event returned for any queried address set.
    pub fn push_event(&self, event: Event) {
        self.events.lock().push((None, event));
    }

    /// Event returned only when `emitter` is part of the queried addresses.
    pub fn push_event_from(&self, emitter: Address, event: Event) {
        self.events.lock().push((Some(emitter), event));
    }
}

#[async_trait]
impl BlockchainEvents for MockBlockchainEvents {
    async fn latest_block(&self) -> Result<BlockNumber, BlockchainError> {
        Ok(*self.latest.lock())
    }

    async fn events_in_range(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Event>, BlockchainError> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|(emitter, event)| {
                let in_range = match event.block_number() {
                    Some(block_number) => block_number >= from_block && block_number <= to_block,
                    None => false,
                };
                let watched = match emitter {
                    Some(emitter) => addresses.contains(emitter),
                    None => true,
                };
                in_range && watched
            })
            .map(|(_, event)| event.clone())
            .collect())
    }
}

/// Stored monitor request with placeholder signatures, for handler tests
/// that never verify them.
pub fn monitor_request(
    canonical_identifier: CanonicalIdentifier,
    non_closing_signer: Address,
    nonce: Nonce,
) -> MonitorRequest {
    MonitorRequest {
        token_network_address: canonical_identifier.token_network_address,
        channel_identifier: canonical_identifier.channel_identifier,
        non_closing_signer,
        balance_hash: H256::repeat_byte(0x42),
        nonce,
        additional_hash: H256::zero(),
        closing_signature: vec![0u8; 65],
        non_closing_signature: vec![0u8; 65],
        reward_amount: U256::from(5u64),
        reward_proof_signature: vec![0u8; 65],
        received_at_block: U64::zero(),
    }
}

/// Fully signed monitor request message: balance proof by the closing key,
/// update and reward proof by the non-closing key.
pub fn monitor_request_message(
    channel_identifier: u64,
    nonce: Nonce,
    closing_key: &PrivateKey,
    non_closing_key: &PrivateKey,
) -> MonitorRequestMessage {
    let mut message = MonitorRequestMessage {
        chain_id: ChainID::Goerli,
        token_network_address: Address::repeat_byte(0x10),
        channel_identifier: U256::from(channel_identifier),
        balance_hash: H256::repeat_byte(0x42),
        nonce,
        additional_hash: H256::zero(),
        closing_signature: vec![],
        non_closing_signature: vec![],
        reward_amount: U256::from(5u64),
        reward_proof_signature: vec![],
    };
    message.closing_signature = sign_hash(closing_key, &message.balance_proof_bytes());
    message.non_closing_signature = sign_hash(non_closing_key, &message.update_bytes());
    message.reward_proof_signature = sign_hash(non_closing_key, &message.reward_proof_bytes());
    message
}

fn sign_hash(key: &PrivateKey, data: &[u8]) -> Vec<u8> {
    let hash = web3::signing::keccak256(data);
    let signature = key.sign(&hash, None).unwrap();
    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(signature.r.as_bytes());
    bytes.extend_from_slice(signature.s.as_bytes());
    bytes.push(signature.v as u8);
    bytes
}
