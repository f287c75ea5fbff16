/*
[INPUT]:  Caller supplied RequestSigner and channel to authenticate
[OUTPUT]: Signature fields for one outbound frame
[POS]:    Auth layer - pass-through between the stream client and the signer
[UPDATE]: When the signed payload or clock handling changes
*/

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::auth::{RequestSigner, SignRequest, Signature};
use crate::error::Result;
use crate::types::Channel;

/// Wraps the external signing callback.
///
/// The only state is the server clock skew (seconds), refreshed by the
/// stream client whenever it re-authenticates.
#[derive(Clone)]
pub struct SignerAdapter {
    signer: Arc<dyn RequestSigner>,
    clock_skew: Arc<AtomicI64>,
}

impl SignerAdapter {
    pub fn new(signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            signer,
            clock_skew: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn clock_skew(&self) -> i64 {
        self.clock_skew.load(Ordering::Relaxed)
    }

    pub fn set_clock_skew(&self, seconds: i64) {
        self.clock_skew.store(seconds, Ordering::Relaxed);
    }

    /// Build the sign request for `channel` and hand it to the signer
    pub async fn sign_channel(&self, channel: &Channel) -> Result<Signature> {
        let request = SignRequest {
            channel: channel.channel.to_string(),
            product_ids: channel.product_ids().to_vec(),
            timestamp: Utc::now().timestamp() + self.clock_skew(),
        };
        self.signer.sign(&request).await
    }
}

impl fmt::Debug for SignerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerAdapter")
            .field("clock_skew", &self.clock_skew())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockSigner;
    use crate::types::ChannelName;

    #[tokio::test]
    async fn test_timestamp_includes_clock_skew() {
        let adapter = SignerAdapter::new(Arc::new(MockSigner));
        adapter.set_clock_skew(3600);

        let before = Utc::now().timestamp();
        let signature = adapter
            .sign_channel(&Channel::new(ChannelName::Status))
            .await
            .unwrap();
        let stamped: i64 = signature.timestamp.parse().unwrap();

        assert!(stamped >= before + 3600);
        assert!(stamped <= Utc::now().timestamp() + 3600);
    }

    #[tokio::test]
    async fn test_clones_share_skew() {
        let adapter = SignerAdapter::new(Arc::new(MockSigner));
        let clone = adapter.clone();
        clone.set_clock_skew(-5);
        assert_eq!(adapter.clock_skew(), -5);
    }
}
