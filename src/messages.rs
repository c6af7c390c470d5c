use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use slog::{
    debug,
    Logger,
};
use web3::{
    signing::{
        Key,
        SigningError,
    },
    types::{
        Address,
        U256,
    },
};

use crate::{
    blockchain::key::recover_address,
    primitives::{
        AdditionalHash,
        BalanceHash,
        BlockNumber,
        CanonicalIdentifier,
        ChainID,
        ChannelIdentifier,
        Nonce,
        RewardAmount,
        Signature,
        TokenAmount,
        TokenNetworkAddress,
    },
    state::MonitorRequest,
    storage::Storage,
};

enum MessageTypeId {
    BalanceProof = 1,
    BalanceProofUpdate = 2,
    MSReward = 6,
    PFSCapacityUpdate = 7,
    PFSFeeUpdate = 8,
}

impl From<MessageTypeId> for [u8; 1] {
    fn from(value: MessageTypeId) -> Self {
        (value as u8).to_be_bytes()
    }
}

/// Off-chain messages arrive as signed JSON blobs, one per line, tagged by
/// a `type` field. Unknown types are dropped by serde before they reach any
/// handler.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OffchainMessage {
    MonitorRequest(MonitorRequestMessage),
    PFSCapacityUpdate(PFSCapacityUpdate),
    PFSFeeUpdate(PFSFeeUpdate),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MonitorRequestMessage {
    pub chain_id: ChainID,
    pub token_network_address: TokenNetworkAddress,
    pub channel_identifier: ChannelIdentifier,
    pub balance_hash: BalanceHash,
    pub nonce: Nonce,
    pub additional_hash: AdditionalHash,
    pub closing_signature: Signature,
    pub non_closing_signature: Signature,
    pub reward_amount: RewardAmount,
    pub reward_proof_signature: Signature,
}

pub trait SignedMessage {
    fn bytes(&self) -> Vec<u8>;

    fn sign(&mut self, key: impl Key) -> Result<(), SigningError>;

    fn sign_bytes(&self, key: impl Key) -> Result<Vec<u8>, SigningError> {
        let hash = web3::signing::keccak256(&self.bytes());
        let signature = key.sign(&hash, None)?;
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(signature.r.as_bytes());
        bytes.extend_from_slice(signature.s.as_bytes());
        bytes.push(signature.v as u8);
        Ok(bytes)
    }
}

impl MonitorRequestMessage {
    /// Data signed by the channel counterparty when it produced the
    /// underlying balance proof.
    pub fn balance_proof_bytes(&self) -> Vec<u8> {
        let message_type: [u8; 1] = MessageTypeId::BalanceProof.into();
        let mut channel_identifier = [0u8; 32];
        self.channel_identifier.to_big_endian(&mut channel_identifier);
        let mut nonce = [0u8; 32];
        self.nonce.to_big_endian(&mut nonce);

        let mut bytes = vec![];
        bytes.extend_from_slice(self.token_network_address.as_bytes());
        bytes.extend_from_slice(&self.chain_id.to_bytes());
        bytes.extend_from_slice(&message_type);
        bytes.extend_from_slice(&channel_identifier);
        bytes.extend_from_slice(self.balance_hash.as_bytes());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(self.additional_hash.as_bytes());
        bytes
    }

    /// Data signed by the non-closing participant to delegate the on-chain
    /// update: the balance proof plus the closing signature.
    pub fn update_bytes(&self) -> Vec<u8> {
        let message_type: [u8; 1] = MessageTypeId::BalanceProofUpdate.into();
        let mut bytes = self.balance_proof_bytes();
        // Replace the embedded type tag byte at the fixed offset.
        bytes[20 + 32] = message_type[0];
        bytes.extend_from_slice(&self.closing_signature);
        bytes
    }

    /// Data signed by the requester to authorize paying the reward.
    pub fn reward_proof_bytes(&self) -> Vec<u8> {
        let message_type: [u8; 1] = MessageTypeId::MSReward.into();
        let mut reward_amount = [0u8; 32];
        self.reward_amount.to_big_endian(&mut reward_amount);

        let mut bytes = vec![];
        bytes.extend_from_slice(&self.chain_id.to_bytes());
        bytes.extend_from_slice(&message_type);
        bytes.extend_from_slice(&self.non_closing_signature);
        bytes.extend_from_slice(&reward_amount);
        bytes
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PFSCapacityUpdate {
    pub chain_id: ChainID,
    pub token_network_address: TokenNetworkAddress,
    pub channel_identifier: ChannelIdentifier,
    pub updating_participant: Address,
    pub other_participant: Address,
    pub updating_nonce: Nonce,
    pub updating_capacity: TokenAmount,
    pub signature: Signature,
}

impl PFSCapacityUpdate {
    pub fn canonical_identifier(&self) -> CanonicalIdentifier {
        CanonicalIdentifier {
            token_network_address: self.token_network_address,
            channel_identifier: self.channel_identifier,
        }
    }
}

impl SignedMessage for PFSCapacityUpdate {
    fn bytes(&self) -> Vec<u8> {
        let message_type: [u8; 1] = MessageTypeId::PFSCapacityUpdate.into();
        let mut channel_identifier = [0u8; 32];
        self.channel_identifier.to_big_endian(&mut channel_identifier);
        let mut nonce = [0u8; 32];
        self.updating_nonce.to_big_endian(&mut nonce);
        let mut capacity = [0u8; 32];
        self.updating_capacity.to_big_endian(&mut capacity);

        let mut bytes = vec![];
        bytes.extend_from_slice(&self.chain_id.to_bytes());
        bytes.extend_from_slice(&message_type);
        bytes.extend_from_slice(self.token_network_address.as_bytes());
        bytes.extend_from_slice(&channel_identifier);
        bytes.extend_from_slice(self.updating_participant.as_bytes());
        bytes.extend_from_slice(self.other_participant.as_bytes());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&capacity);
        bytes
    }

    fn sign(&mut self, key: impl Key) -> Result<(), SigningError> {
        self.signature = self.sign_bytes(key)?;
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PFSFeeUpdate {
    pub chain_id: ChainID,
    pub token_network_address: TokenNetworkAddress,
    pub channel_identifier: ChannelIdentifier,
    pub updating_participant: Address,
    pub flat_fee: TokenAmount,
    pub proportional_fee_ppm: U256,
    pub timestamp: DateTime<Utc>,
    pub signature: Signature,
}

impl PFSFeeUpdate {
    pub fn canonical_identifier(&self) -> CanonicalIdentifier {
        CanonicalIdentifier {
            token_network_address: self.token_network_address,
            channel_identifier: self.channel_identifier,
        }
    }
}

impl SignedMessage for PFSFeeUpdate {
    fn bytes(&self) -> Vec<u8> {
        let message_type: [u8; 1] = MessageTypeId::PFSFeeUpdate.into();
        let mut channel_identifier = [0u8; 32];
        self.channel_identifier.to_big_endian(&mut channel_identifier);
        let mut flat_fee = [0u8; 32];
        self.flat_fee.to_big_endian(&mut flat_fee);
        let mut proportional_fee = [0u8; 32];
        self.proportional_fee_ppm.to_big_endian(&mut proportional_fee);

        let mut bytes = vec![];
        bytes.extend_from_slice(&self.chain_id.to_bytes());
        bytes.extend_from_slice(&message_type);
        bytes.extend_from_slice(self.token_network_address.as_bytes());
        bytes.extend_from_slice(&channel_identifier);
        bytes.extend_from_slice(self.updating_participant.as_bytes());
        bytes.extend_from_slice(&flat_fee);
        bytes.extend_from_slice(&proportional_fee);
        bytes.extend_from_slice(self.timestamp.to_rfc3339().as_bytes());
        bytes
    }

    fn sign(&mut self, key: impl Key) -> Result<(), SigningError> {
        self.signature = self.sign_bytes(key)?;
        Ok(())
    }
}

/// Recovers the sender of a PFS update and checks it against the claimed
/// updating participant.
pub fn verify_update_signature(message: &impl SignedMessage, signature: &[u8], claimed: Address) -> bool {
    match recover_address(&message.bytes(), signature) {
        Ok(signer) => signer == claimed,
        Err(_) => false,
    }
}

/// Validates and stores a monitor request. Returns whether the request was
/// accepted; rejected requests leave stored state untouched.
pub fn on_monitor_request(
    storage: &Storage,
    chain_id: ChainID,
    message: &MonitorRequestMessage,
    received_at_block: BlockNumber,
    log: &Logger,
) -> bool {
    if message.chain_id != chain_id {
        debug!(log, "Rejecting monitor request for foreign chain";
            "chain_id" => format!("{}", message.chain_id));
        return false;
    }
    if message.nonce.is_zero() {
        debug!(log, "Rejecting monitor request with zero nonce");
        return false;
    }

    let balance_proof_signer = match recover_address(&message.balance_proof_bytes(), &message.closing_signature) {
        Ok(signer) => signer,
        Err(_) => {
            debug!(log, "Rejecting monitor request: balance proof signature unrecoverable");
            return false;
        }
    };
    let non_closing_signer = match recover_address(&message.update_bytes(), &message.non_closing_signature) {
        Ok(signer) => signer,
        Err(_) => {
            debug!(log, "Rejecting monitor request: non-closing signature unrecoverable");
            return false;
        }
    };
    if balance_proof_signer == non_closing_signer {
        debug!(log, "Rejecting monitor request: balance proof signed by requester";
            "signer" => format!("{:#x}", non_closing_signer));
        return false;
    }
    match recover_address(&message.reward_proof_bytes(), &message.reward_proof_signature) {
        Ok(reward_signer) if reward_signer == non_closing_signer => {}
        _ => {
            debug!(log, "Rejecting monitor request: reward proof not signed by requester");
            return false;
        }
    }

    let canonical_identifier = CanonicalIdentifier {
        token_network_address: message.token_network_address,
        channel_identifier: message.channel_identifier,
    };
    let existing = match storage.monitor_request(&canonical_identifier, non_closing_signer) {
        Ok(existing) => existing,
        Err(e) => {
            debug!(log, "Failed to look up monitor request"; "error" => format!("{}", e));
            return false;
        }
    };
    if let Some(existing) = existing {
        if existing.nonce >= message.nonce {
            debug!(log, "Rejecting stale monitor request";
                "stored_nonce" => existing.nonce.to_string(),
                "received_nonce" => message.nonce.to_string());
            return false;
        }
    }

    let request = MonitorRequest {
        token_network_address: message.token_network_address,
        channel_identifier: message.channel_identifier,
        non_closing_signer,
        balance_hash: message.balance_hash,
        nonce: message.nonce,
        additional_hash: message.additional_hash,
        closing_signature: message.closing_signature.clone(),
        non_closing_signature: message.non_closing_signature.clone(),
        reward_amount: message.reward_amount,
        reward_proof_signature: message.reward_proof_signature.clone(),
        received_at_block,
    };
    if let Err(e) = storage.upsert_monitor_request(&request) {
        debug!(log, "Failed to store monitor request"; "error" => format!("{}", e));
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use web3::types::U64;

    use crate::{
        blockchain::key::PrivateKey,
        tests::factories::{
            monitor_request_message,
            private_key,
            test_logger,
        },
    };

    fn storage() -> Storage {
        let storage = Storage::new(Connection::open_in_memory().unwrap());
        storage.setup_database().unwrap();
        storage
    }

    fn keys() -> (PrivateKey, PrivateKey) {
        (private_key(0x11), private_key(0x22))
    }

    #[test]
    fn accepts_valid_request() {
        let storage = storage();
        let (closing_key, non_closing_key) = keys();
        let message = monitor_request_message(1, U256::from(1u64), &closing_key, &non_closing_key);

        assert!(on_monitor_request(
            &storage,
            ChainID::Goerli,
            &message,
            U64::from(5u64),
            &test_logger(),
        ));

        let stored = storage
            .monitor_request(&CanonicalIdentifier {
                token_network_address: message.token_network_address,
                channel_identifier: message.channel_identifier,
            }, non_closing_key.address())
            .unwrap()
            .expect("request stored");
        assert_eq!(stored.nonce, U256::from(1u64));
    }

    #[test]
    fn nonce_must_strictly_increase() {
        let storage = storage();
        let (closing_key, non_closing_key) = keys();
        let log = test_logger();

        let first = monitor_request_message(1, U256::from(1u64), &closing_key, &non_closing_key);
        let second = monitor_request_message(1, U256::from(2u64), &closing_key, &non_closing_key);
        let stale = monitor_request_message(1, U256::from(1u64), &closing_key, &non_closing_key);

        assert!(on_monitor_request(&storage, ChainID::Goerli, &first, U64::from(5u64), &log));
        assert!(on_monitor_request(&storage, ChainID::Goerli, &second, U64::from(6u64), &log));
        assert!(!on_monitor_request(&storage, ChainID::Goerli, &stale, U64::from(7u64), &log));

        let stored = storage
            .monitor_request(&CanonicalIdentifier {
                token_network_address: first.token_network_address,
                channel_identifier: first.channel_identifier,
            }, non_closing_key.address())
            .unwrap()
            .expect("request stored");
        assert_eq!(stored.nonce, U256::from(2u64));
        assert_eq!(stored.received_at_block, U64::from(6u64));
    }

    #[test]
    fn rejects_wrong_chain() {
        let storage = storage();
        let (closing_key, non_closing_key) = keys();
        let message = monitor_request_message(1, U256::from(1u64), &closing_key, &non_closing_key);
        assert!(!on_monitor_request(
            &storage,
            ChainID::Mainnet,
            &message,
            U64::from(5u64),
            &test_logger(),
        ));
    }

    #[test]
    fn rejects_self_signed_balance_proof() {
        let storage = storage();
        let (_, non_closing_key) = keys();
        // Both signatures from the requester: the balance proof signer must
        // be the counterparty.
        let message = monitor_request_message(1, U256::from(1u64), &non_closing_key, &non_closing_key);
        assert!(!on_monitor_request(
            &storage,
            ChainID::Goerli,
            &message,
            U64::from(5u64),
            &test_logger(),
        ));
    }

    #[test]
    fn rejects_garbled_signature() {
        let storage = storage();
        let (closing_key, non_closing_key) = keys();
        let mut message = monitor_request_message(1, U256::from(1u64), &closing_key, &non_closing_key);
        message.closing_signature = vec![0u8; 10];
        assert!(!on_monitor_request(
            &storage,
            ChainID::Goerli,
            &message,
            U64::from(5u64),
            &test_logger(),
        ));
    }

    #[test]
    fn unknown_message_type_fails_parse() {
        let raw = r#"{"type": "Gossip", "payload": 1}"#;
        assert!(serde_json::from_str::<OffchainMessage>(raw).is_err());
    }

    #[test]
    fn capacity_update_signature_binds_sender() {
        let (key, other_key) = keys();
        let mut update = PFSCapacityUpdate {
            chain_id: ChainID::Goerli,
            token_network_address: Address::repeat_byte(0x10),
            channel_identifier: U256::from(1u64),
            updating_participant: key.address(),
            other_participant: other_key.address(),
            updating_nonce: U256::from(1u64),
            updating_capacity: U256::from(100u64),
            signature: vec![],
        };
        update.sign(key.clone()).unwrap();

        assert!(verify_update_signature(&update, &update.signature.clone(), key.address()));
        assert!(!verify_update_signature(&update, &update.signature.clone(), other_key.address()));

        update.updating_capacity = U256::from(500u64);
        assert!(
            !verify_update_signature(&update, &update.signature.clone(), key.address()),
            "tampered payload must not verify"
        );
    }
}
