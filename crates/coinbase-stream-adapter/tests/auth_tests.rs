/*
[INPUT]:  API credentials and channels to sign
[OUTPUT]: Test results for request signing
[POS]:    Integration tests - authentication
[UPDATE]: When signing algorithm or signed fields change
*/

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use coinbase_stream_adapter::{
    Channel, ChannelName, CoinbaseError, ConnectOptions, EventKind, HmacSigner, RequestSigner,
    Result, SignRequest, Signature, SignerAdapter, StreamConfig, WebSocketClient,
};
use common::{StreamServer, expect_event, offline_rest_client};
use tokio_test::assert_ok;

/// Counts calls and refuses to sign level2
struct CountingSigner {
    calls: AtomicUsize,
}

#[async_trait]
impl RequestSigner for CountingSigner {
    async fn sign(&self, request: &SignRequest) -> Result<Signature> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.channel == "level2" {
            return Err(CoinbaseError::Signing("level2 not allowed".to_string()));
        }
        Ok(Signature {
            key: "counting".to_string(),
            signature: format!("sig:{}", request.message()),
            timestamp: request.timestamp.to_string(),
        })
    }
}

#[tokio::test]
async fn test_hmac_signer_known_vector() {
    let signer = HmacSigner::new("api-key", "secret");
    let request = SignRequest {
        channel: "ticker".to_string(),
        product_ids: vec!["BTC-USD".to_string()],
        timestamp: 1_700_000_000,
    };

    let signature = assert_ok!(signer.sign(&request).await);
    assert_eq!(signature.key, "api-key");
    assert_eq!(signature.timestamp, "1700000000");
    assert_eq!(
        signature.signature,
        assert_ok!(signer.sign_message("1700000000tickerBTC-USD"))
    );
}

#[tokio::test]
async fn test_adapter_passes_channel_and_products() {
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let adapter = SignerAdapter::new(signer.clone());

    let channel = Channel::with_products(ChannelName::Ticker, ["BTC-USD", "ETH-USD"]);
    let signature = assert_ok!(adapter.sign_channel(&channel).await);

    assert_eq!(signature.key, "counting");
    assert!(signature.signature.ends_with("tickerBTC-USD,ETH-USD"));
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_signer_failure_surfaces_from_subscribe() {
    let server = StreamServer::silent().await;
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let mut client = WebSocketClient::with_config(
        server.url(),
        signer.clone(),
        offline_rest_client(),
        StreamConfig::default(),
    );
    let mut events = client.take_receiver().expect("receiver");

    assert_ok!(client.connect(ConnectOptions::default()));
    expect_event(&mut events, EventKind::Open).await;

    let result = client
        .subscribe(Channel::with_products(ChannelName::Level2, ["BTC-USD"]))
        .await;
    assert!(matches!(result, Err(CoinbaseError::Signing(_))));
    assert!(client.connected());

    client.disconnect();
    expect_event(&mut events, EventKind::Close).await;
}
