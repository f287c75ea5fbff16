/*
[INPUT]:  Test scenarios needing a live WebSocket peer or REST mock
[OUTPUT]: Per-test stream server fixture, client builders and event helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for coinbase-stream-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use coinbase_stream_adapter::{
    ClientConfig, EventKind, MockSigner, RestClient, StreamConfig, StreamEvent, WebSocketClient,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::MockServer;

pub const TICKER_BTC_USD: &str = include_str!("../fixtures/ws/ticker/BTC-USD.json");
pub const LEVEL2_SNAPSHOT: &str = include_str!("../fixtures/ws/level2/snapshot.json");
pub const STATUS: &str = include_str!("../fixtures/ws/status/status.json");
pub const EMPTY_SUBSCRIPTIONS: &str = include_str!("../fixtures/ws/empty-subscriptions.json");

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Replies the server sends for one inbound request frame
pub type Responder = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

/// Local WebSocket server bound to an ephemeral port, owned by one test
pub struct StreamServer {
    url: String,
    requests: mpsc::UnboundedReceiver<Value>,
    pings: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    drops: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl StreamServer {
    pub async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");

        let (request_tx, requests) = mpsc::unbounded_channel();
        let pings = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let (drops, _) = broadcast::channel(4);

        let task = {
            let pings = pings.clone();
            let connections = connections.clone();
            let drops = drops.clone();
            tokio::spawn(async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(
                        tcp,
                        responder.clone(),
                        request_tx.clone(),
                        pings.clone(),
                        drops.subscribe(),
                    ));
                }
            })
        };

        Self {
            url: format!("ws://{addr}"),
            requests,
            pings,
            connections,
            drops,
            task,
        }
    }

    /// Server that never answers requests
    pub async fn silent() -> Self {
        Self::start(Arc::new(|_: &Value| Vec::new())).await
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Kill every open socket without a close handshake
    pub fn drop_connections(&self) {
        let _ = self.drops.send(());
    }

    pub async fn next_request(&mut self) -> Value {
        tokio::time::timeout(EVENT_TIMEOUT, self.requests.recv())
            .await
            .expect("request within timeout")
            .expect("server running")
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    tcp: TcpStream,
    responder: Responder,
    requests: mpsc::UnboundedSender<Value>,
    pings: Arc<AtomicUsize>,
    mut drops: broadcast::Receiver<()>,
) {
    let Ok(ws) = accept_async(tcp).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = drops.recv() => return,
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                    let replies = responder(&request);
                    let _ = requests.send(request);
                    for reply in replies {
                        if write.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    pings.fetch_add(1, Ordering::SeqCst);
                    let _ = write.flush().await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Confirms subscribes with the requested channel, then pushes `payload`;
/// answers unsubscribes with an empty channel list
pub fn subscription_responder(payload: &'static str) -> Responder {
    Arc::new(move |request: &Value| match request["type"].as_str() {
        Some("subscribe") => vec![
            json!({"type": "subscriptions", "channels": request["channel"]}).to_string(),
            payload.to_string(),
        ],
        Some("unsubscribe") => vec![EMPTY_SUBSCRIPTIONS.to_string()],
        _ => Vec::new(),
    })
}

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// REST client pointing at a closed port; stream tests never need it
pub fn offline_rest_client() -> RestClient {
    RestClient::with_config_and_base_url(ClientConfig::default(), "http://127.0.0.1:1")
        .expect("rest client")
}

/// Client signing with empty credentials, like the public channels allow
pub fn create_client(
    url: &str,
    config: StreamConfig,
) -> (WebSocketClient, mpsc::UnboundedReceiver<StreamEvent>) {
    let mut client =
        WebSocketClient::with_config(url, Arc::new(MockSigner), offline_rest_client(), config);
    let events = client.take_receiver().expect("receiver");
    (client, events)
}

/// Wait for the next event of `kind`.
///
/// A `MessageError` fails the test unless it is what we are waiting for.
pub async fn expect_event(
    events: &mut mpsc::UnboundedReceiver<StreamEvent>,
    kind: EventKind,
) -> StreamEvent {
    wait_for(events, |event| event.kind() == kind).await
}

pub async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<StreamEvent>, mut matches: F) -> StreamEvent
where
    F: FnMut(&StreamEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open");
        if matches(&event) {
            return event;
        }
        if let StreamEvent::MessageError(err) = &event {
            panic!("unexpected message error: {err}");
        }
    }
}
