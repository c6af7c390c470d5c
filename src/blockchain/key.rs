use ethsign::SecretKey;
use web3::{
    signing::{
        self,
        keccak256,
        recover,
        Key,
        RecoveryError,
    },
    types::{
        Address,
        H256,
    },
};

/// Keystore-backed signing key for on-chain transactions.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    pub fn new(inner: SecretKey) -> Self {
        Self { inner }
    }
}

impl Key for PrivateKey {
    fn sign(&self, message: &[u8], chain_id: Option<u64>) -> Result<signing::Signature, signing::SigningError> {
        let signature = self
            .inner
            .sign(message)
            .map_err(|_| signing::SigningError::InvalidMessage)?;

        let standard_v = signature.v as u64;
        let v = if let Some(chain_id) = chain_id {
            standard_v + 35 + chain_id * 2
        } else {
            standard_v + 27
        };
        Ok(signing::Signature {
            r: H256::from(signature.r),
            s: H256::from(signature.s),
            v,
        })
    }

    fn sign_message(&self, message: &[u8]) -> Result<signing::Signature, signing::SigningError> {
        let signature = self
            .inner
            .sign(message)
            .map_err(|_| signing::SigningError::InvalidMessage)?;

        Ok(signing::Signature {
            r: H256::from(signature.r),
            s: H256::from(signature.s),
            v: signature.v as u64 + 27,
        })
    }

    fn address(&self) -> Address {
        Address::from(self.inner.public().address())
    }
}

/// Recovers the signer of `data` from a 65-byte r||s||v signature. The
/// payload is keccak-hashed here; callers pass the packed message bytes.
pub fn recover_address(data: &[u8], signature: &[u8]) -> Result<Address, RecoveryError> {
    if signature.len() != 65 {
        return Err(RecoveryError::InvalidSignature);
    }
    let recovery_id = match signature[64] {
        value @ 27..=28 => (value - 27) as i32,
        value @ 0..=1 => value as i32,
        _ => return Err(RecoveryError::InvalidSignature),
    };
    let hash = keccak256(data);
    recover(&hash, &signature[..64], recovery_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_signatures() {
        assert!(recover_address(b"data", &[0u8; 64]).is_err());
        let mut signature = [0u8; 65];
        signature[64] = 99;
        assert!(recover_address(b"data", &signature).is_err());
    }
}
