use async_trait::async_trait;
use derive_more::Display;
use ethabi::{
    Function,
    Param,
    ParamType,
    StateMutability,
    Token,
};
use lazy_static::lazy_static;
use std::time::Duration;
use web3::{
    transports::Http,
    types::{
        Address,
        Bytes,
        TransactionParameters,
        U256,
    },
    Web3,
};

use crate::{
    blockchain::key::PrivateKey,
    constants::{
        CLAIM_REWARD_GAS_LIMIT,
        MONITOR_GAS_LIMIT,
        TRANSACTION_RETRIES,
        TRANSACTION_RETRY_BACKOFF_MS,
    },
    primitives::{
        BlockNumber,
        CanonicalIdentifier,
        TransactionHash,
    },
    state::MonitorRequest,
};

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Display, Debug)]
pub enum ProxyError {
    #[display(fmt = "RPC error: {}", _0)]
    Rpc(web3::Error),
    #[display(fmt = "ABI error: {}", _0)]
    Abi(ethabi::Error),
}

#[derive(Clone, Debug)]
pub struct TransactionReceiptInfo {
    pub block_number: Option<BlockNumber>,
    pub successful: bool,
}

/// On-chain side effects of the monitoring service. Kept behind a trait so
/// handlers stay testable and the contract call shape stays in one place.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    /// Submits the counterparty's balance proof on behalf of the
    /// non-closing participant.
    async fn monitor(&self, request: &MonitorRequest) -> Result<TransactionHash>;

    /// Claims the reward for a previously submitted balance proof once the
    /// channel is settled.
    async fn claim_reward(
        &self,
        canonical_identifier: &CanonicalIdentifier,
        non_closing_signer: Address,
    ) -> Result<TransactionHash>;

    async fn get_receipt(&self, transaction_hash: TransactionHash) -> Result<Option<TransactionReceiptInfo>>;
}

fn function(name: &str, inputs: Vec<(&str, ParamType)>) -> Function {
    #[allow(deprecated)]
    Function {
        name: name.to_owned(),
        inputs: inputs
            .into_iter()
            .map(|(name, kind)| Param {
                name: name.to_owned(),
                kind,
                internal_type: None,
            })
            .collect(),
        outputs: vec![],
        constant: false,
        state_mutability: StateMutability::NonPayable,
    }
}

lazy_static! {
    static ref MONITOR_FN: Function = function(
        "monitor",
        vec![
            ("token_network_address", ParamType::Address),
            ("channel_identifier", ParamType::Uint(256)),
            ("non_closing_participant", ParamType::Address),
            ("balance_hash", ParamType::FixedBytes(32)),
            ("nonce", ParamType::Uint(256)),
            ("additional_hash", ParamType::FixedBytes(32)),
            ("closing_signature", ParamType::Bytes),
            ("non_closing_signature", ParamType::Bytes),
            ("reward_amount", ParamType::Uint(256)),
            ("reward_proof_signature", ParamType::Bytes),
        ],
    );
    static ref CLAIM_REWARD_FN: Function = function(
        "claimReward",
        vec![
            ("token_network_address", ParamType::Address),
            ("channel_identifier", ParamType::Uint(256)),
            ("non_closing_participant", ParamType::Address),
        ],
    );
}

pub struct Web3TransactionSender {
    web3: Web3<Http>,
    monitoring_contract_address: Address,
    private_key: PrivateKey,
}

impl Web3TransactionSender {
    pub fn new(web3: Web3<Http>, monitoring_contract_address: Address, private_key: PrivateKey) -> Self {
        Self {
            web3,
            monitoring_contract_address,
            private_key,
        }
    }

    async fn submit(&self, data: Vec<u8>, gas_limit: u64) -> Result<TransactionHash> {
        let params = TransactionParameters {
            to: Some(self.monitoring_contract_address),
            data: Bytes(data),
            gas: U256::from(gas_limit),
            ..Default::default()
        };

        let mut last_error = None;
        for attempt in 0..TRANSACTION_RETRIES {
            if attempt > 0 {
                let backoff = TRANSACTION_RETRY_BACKOFF_MS << attempt;
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            let signed = match self
                .web3
                .accounts()
                .sign_transaction(params.clone(), self.private_key.clone())
                .await
            {
                Ok(signed) => signed,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            match self.web3.eth().send_raw_transaction(signed.raw_transaction).await {
                Ok(hash) => return Ok(hash),
                Err(e) => last_error = Some(e),
            }
        }
        Err(ProxyError::Rpc(last_error.unwrap_or(web3::Error::Internal)))
    }
}

#[async_trait]
impl TransactionSender for Web3TransactionSender {
    async fn monitor(&self, request: &MonitorRequest) -> Result<TransactionHash> {
        let data = MONITOR_FN
            .encode_input(&[
                Token::Address(request.token_network_address),
                Token::Uint(request.channel_identifier),
                Token::Address(request.non_closing_signer),
                Token::FixedBytes(request.balance_hash.as_bytes().to_vec()),
                Token::Uint(request.nonce),
                Token::FixedBytes(request.additional_hash.as_bytes().to_vec()),
                Token::Bytes(request.closing_signature.clone()),
                Token::Bytes(request.non_closing_signature.clone()),
                Token::Uint(request.reward_amount),
                Token::Bytes(request.reward_proof_signature.clone()),
            ])
            .map_err(ProxyError::Abi)?;
        self.submit(data, MONITOR_GAS_LIMIT).await
    }

    async fn claim_reward(
        &self,
        canonical_identifier: &CanonicalIdentifier,
        non_closing_signer: Address,
    ) -> Result<TransactionHash> {
        let data = CLAIM_REWARD_FN
            .encode_input(&[
                Token::Address(canonical_identifier.token_network_address),
                Token::Uint(canonical_identifier.channel_identifier),
                Token::Address(non_closing_signer),
            ])
            .map_err(ProxyError::Abi)?;
        self.submit(data, CLAIM_REWARD_GAS_LIMIT).await
    }

    async fn get_receipt(&self, transaction_hash: TransactionHash) -> Result<Option<TransactionReceiptInfo>> {
        let receipt = self
            .web3
            .eth()
            .transaction_receipt(transaction_hash)
            .await
            .map_err(ProxyError::Rpc)?;
        Ok(receipt.map(|receipt| TransactionReceiptInfo {
            block_number: receipt.block_number,
            successful: receipt.status.map(|status| status.as_u64() == 1).unwrap_or(false),
        }))
    }
}
