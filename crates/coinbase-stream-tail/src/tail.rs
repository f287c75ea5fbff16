/*
[INPUT]:  Tail configuration, stream events, shutdown token
[OUTPUT]: Structured log line per event and a per-kind tally on exit
[POS]:    Runtime layer - drives one WebSocketClient until shutdown
[UPDATE]: When changing how events are reported or when subscriptions are sent
*/

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use coinbase_stream_adapter::{
    Channel, ClientConfig, EventKind, HmacSigner, MockSigner, ReadyState, RequestSigner,
    RestClient, StreamEvent, WebSocketClient,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TailConfig;

const CLOSE_WAIT: Duration = Duration::from_secs(2);

/// Event counts collected while tailing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TailSummary {
    counts: BTreeMap<&'static str, u64>,
}

impl TailSummary {
    pub fn record(&mut self, kind: EventKind) {
        *self.counts.entry(kind.as_str()).or_default() += 1;
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts.get(kind.as_str()).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Build the stream client described by `config`
pub fn build_client(config: &TailConfig) -> Result<WebSocketClient> {
    let signer: Arc<dyn RequestSigner> = match &config.credentials {
        Some(credentials) => Arc::new(HmacSigner::new(
            credentials.api_key.clone(),
            credentials.api_secret.clone(),
        )),
        None => Arc::new(MockSigner),
    };
    let rest = RestClient::with_config_and_base_url(ClientConfig::default(), &config.rest_url)
        .context("create rest client")?;

    Ok(WebSocketClient::with_config(
        config.url.clone(),
        signer,
        rest,
        config.stream_config(),
    ))
}

/// Connect, subscribe on the first open and log events until `shutdown` fires
/// or the client gives up reconnecting.
pub async fn run(
    mut client: WebSocketClient,
    config: &TailConfig,
    shutdown: CancellationToken,
) -> Result<TailSummary> {
    let mut events = client
        .take_receiver()
        .context("event receiver already taken")?;
    let channels = config.channels();
    let handle = client
        .connect(config.connect_options())
        .context("connect stream client")?;
    info!(connection_id = %handle.id(), url = %client.url(), "tail started");

    let mut summary = TailSummary::default();
    let mut subscribed = false;
    let mut credentials_hinted = config.credentials.is_some();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        summary.record(event.kind());
        log_event(&event);
        if !credentials_hinted && is_auth_rejection(&event) {
            credentials_hinted = true;
            warn!("server rejected a subscription for authentication, configure credentials");
        }

        match event {
            StreamEvent::Open if !subscribed => {
                subscribed = true;
                subscribe_all(&client, &channels).await;
            }
            StreamEvent::Error(_) if handle.ready_state() == ReadyState::Closed => {
                while let Ok(event) = events.try_recv() {
                    summary.record(event.kind());
                    log_event(&event);
                }
                warn!(connection_id = %handle.id(), "stream closed for good, stopping tail");
                return Ok(summary);
            }
            _ => {}
        }
    }

    client.disconnect();
    if handle.session_count() > 0 {
        drain_until_close(&mut events, &mut summary).await;
    }
    Ok(summary)
}

async fn subscribe_all(client: &WebSocketClient, channels: &[Channel]) {
    if channels.is_empty() {
        warn!("no channels configured, only lifecycle events will be logged");
        return;
    }
    for channel in channels {
        if let Err(err) = client.subscribe(channel.clone()).await {
            warn!(
                channel = %channel.channel,
                error = %err,
                auth_error = err.is_auth_error(),
                "subscribe failed"
            );
        }
    }
}

async fn drain_until_close(
    events: &mut UnboundedReceiver<StreamEvent>,
    summary: &mut TailSummary,
) {
    let wait = async {
        while let Some(event) = events.recv().await {
            summary.record(event.kind());
            log_event(&event);
            if matches!(event, StreamEvent::Close) {
                break;
            }
        }
    };
    if tokio::time::timeout(CLOSE_WAIT, wait).await.is_err() {
        debug!("no close event before shutdown deadline");
    }
}

/// Server error frame caused by missing or bad credentials
pub fn is_auth_rejection(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::MessageError(err) if err.is_auth_error())
}

/// One log line per event; payload events at info, lifecycle noise at debug
pub fn log_event(event: &StreamEvent) {
    match event {
        StreamEvent::Open => info!("stream open"),
        StreamEvent::Close => info!("stream closed"),
        StreamEvent::Error(message) => warn!(error = %message, "stream error"),
        StreamEvent::Reconnecting { attempt, delay } => info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "stream reconnecting"
        ),
        StreamEvent::MessageError(err) => warn!(
            error = %err,
            server_reported = err.is_server_reported(),
            auth_error = err.is_auth_error(),
            "message error"
        ),
        StreamEvent::SubscriptionsUpdated(message) => {
            let channels: Vec<&str> = message
                .channels
                .iter()
                .map(|subscription| subscription.channel.as_str())
                .collect();
            info!(channels = ?channels, "subscriptions updated");
        }
        StreamEvent::Ticker(ticker) | StreamEvent::TickerBatch(ticker) => info!(
            kind = %event.kind(),
            product_id = %ticker.product_id,
            price = ?ticker.price,
            best_bid = ?ticker.best_bid,
            best_ask = ?ticker.best_ask,
            "ticker"
        ),
        StreamEvent::Level2Snapshot(snapshot) => info!(
            product_id = %snapshot.product_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "level2 snapshot"
        ),
        StreamEvent::Level2Update(update) => debug!(
            product_id = %update.product_id,
            changes = update.changes.len(),
            "level2 update"
        ),
        StreamEvent::Status(status) => info!(
            products = status.products.len(),
            currencies = status.currencies.len(),
            "status"
        ),
        StreamEvent::User(user) => info!(
            message_type = ?user.message_type,
            order_id = ?user.order_id,
            product_id = ?user.product_id,
            "user"
        ),
        StreamEvent::Heartbeat(heartbeat) => debug!(
            product_id = ?heartbeat.product_id,
            sequence = ?heartbeat.sequence,
            "heartbeat"
        ),
        StreamEvent::RawMessage(value) => debug!(message = %value, "raw message"),
    }
}
