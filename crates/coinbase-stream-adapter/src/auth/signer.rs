/*
[INPUT]:  Channel subscription parameters and API credentials
[OUTPUT]: Signing material (key, signature, timestamp) for stream frames
[POS]:    Auth layer - cryptographic signing for subscription authentication
[UPDATE]: When changing signing algorithm or signed message format
*/

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CoinbaseError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Parameters of one subscribe/unsubscribe frame that need signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub channel: String,
    pub product_ids: Vec<String>,
    /// Unix seconds, already corrected for server clock skew
    pub timestamp: i64,
}

impl SignRequest {
    /// Prehash string: `{timestamp}{channel}{product_ids joined by ','}`
    pub fn message(&self) -> String {
        format!(
            "{}{}{}",
            self.timestamp,
            self.channel,
            self.product_ids.join(",")
        )
    }
}

/// Signing fields merged into every outbound frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub key: String,
    pub signature: String,
    pub timestamp: String,
}

/// Caller supplied signing capability.
///
/// Implementations may perform their own I/O (e.g. a remote key service).
#[async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> Result<Signature>;
}

/// HMAC-SHA256 signer using an API key/secret pair
pub struct HmacSigner {
    api_key: String,
    api_secret: String,
}

impl HmacSigner {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Hex encoded HMAC-SHA256 of the request prehash
    pub fn sign_message(&self, message: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| CoinbaseError::Signing(e.to_string()))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl RequestSigner for HmacSigner {
    async fn sign(&self, request: &SignRequest) -> Result<Signature> {
        Ok(Signature {
            key: self.api_key.clone(),
            signature: self.sign_message(&request.message())?,
            timestamp: request.timestamp.to_string(),
        })
    }
}

/// Signer for unauthenticated public channels and tests: empty key and signature
#[derive(Debug, Clone, Default)]
pub struct MockSigner;

#[async_trait]
impl RequestSigner for MockSigner {
    async fn sign(&self, request: &SignRequest) -> Result<Signature> {
        Ok(Signature {
            key: String::new(),
            signature: String::new(),
            timestamp: request.timestamp.to_string(),
        })
    }
}
