use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Deterministic signature over a canonical certificate payload.
pub trait PayloadSigner: Send + Sync {
    fn algorithm(&self) -> &'static str;
    fn sign(&self, payload: &[u8]) -> Result<String, SigningError>;
    fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, SigningError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("canonical payload could not be encoded: {0}")]
    Payload(String),
}

/// Keyed MAC signer producing lowercase hex digests.
pub struct HmacSha256Signer {
    key: Vec<u8>,
}

impl HmacSha256Signer {
    pub const ALGORITHM: &'static str = "HMAC-SHA256";

    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SigningError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(SigningError::InvalidKey("key must not be empty".to_string()));
        }
        Ok(Self { key: key.to_vec() })
    }

    fn compute(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for HmacSha256Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256Signer")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl PayloadSigner for HmacSha256Signer {
    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn sign(&self, payload: &[u8]) -> Result<String, SigningError> {
        Ok(hex::encode(self.compute(payload)?))
    }

    fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, SigningError> {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return Ok(false);
        };
        let actual = self.compute(payload)?;
        if expected.len() != actual.len() {
            return Ok(false);
        }
        Ok(expected.ct_eq(actual.as_slice()).into())
    }
}
