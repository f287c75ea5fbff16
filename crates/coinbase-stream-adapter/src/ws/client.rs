/*
[INPUT]:  Streaming URL, request signer, REST client and caller subscription intents
[OUTPUT]: Connection lifecycle plus typed market data and account events
[POS]:    WebSocket layer - connection manager and its per-connection driver task
[UPDATE]: When changing connect/reconnect rules, replay or event emission
*/

use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{RequestSigner, SignerAdapter};
use crate::error::{CoinbaseError, Result};
use crate::http::RestClient;
use crate::types::{Channel, ChannelSubscription, Channels, RequestType, SubscriptionRequest};
use crate::ws::demux::Demultiplexer;
use crate::ws::events::StreamEvent;
use crate::ws::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use crate::ws::reconnect::{ConnectOptions, ReconnectPolicy};
use crate::ws::registry::SubscriptionRegistry;
use crate::ws::transport::{FrameSink, FrameStream, Transport, TungsteniteTransport, WsFrame};

/// Advanced Trade market data and user feed
pub const ADVANCED_TRADE_WS_URL: &str = "wss://advanced-trade-ws.coinbase.com";

const SUBSCRIPTION_LOG_LIMIT: usize = 10;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings fixed for the lifetime of a client instance
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub heartbeat: HeartbeatConfig,
    /// Refresh the signer's clock skew from the REST time endpoint on every session open
    pub sync_server_time: bool,
    /// Also emit every decodable frame as `RawMessage` before its typed event
    pub emit_raw_messages: bool,
}

/// Readiness of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

#[derive(Debug)]
struct HandleState {
    id: Uuid,
    ready_state: AtomicU8,
    /// Unix millis of the last inbound frame, 0 before any traffic
    last_activity: AtomicI64,
    session_count: AtomicU32,
}

/// Shared view of one `connect()` call.
///
/// Reconnects reuse the handle; a fresh `connect()` replaces it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    state: Arc<HandleState>,
}

impl ConnectionHandle {
    fn new(initial: ReadyState) -> Self {
        Self {
            state: Arc::new(HandleState {
                id: Uuid::new_v4(),
                ready_state: AtomicU8::new(initial as u8),
                last_activity: AtomicI64::new(0),
                session_count: AtomicU32::new(0),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.ready_state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match self.state.last_activity.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    /// Number of sessions opened so far (1 after the first open, +1 per reconnect)
    pub fn session_count(&self) -> u32 {
        self.state.session_count.load(Ordering::Relaxed)
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.state.ready_state.store(state as u8, Ordering::Release);
    }

    fn touch(&self) {
        self.state
            .last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

#[derive(Debug)]
enum Command {
    Send(String),
    Reconnect,
    Close,
}

#[derive(Debug)]
struct ActiveConnection {
    handle: ConnectionHandle,
    commands: mpsc::UnboundedSender<Command>,
}

/// Streaming client for the Coinbase market data and user feed.
///
/// Events are delivered on one receiver taken with [`take_receiver`]. All
/// socket work runs in a driver task spawned by [`connect`], so the caller
/// facing methods never block on the network except for signing.
///
/// [`take_receiver`]: WebSocketClient::take_receiver
/// [`connect`]: WebSocketClient::connect
pub struct WebSocketClient {
    url: String,
    signer: SignerAdapter,
    rest: RestClient,
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    active: Mutex<Option<ActiveConnection>>,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    subscription_logs: AtomicUsize,
}

impl WebSocketClient {
    pub fn new(url: impl Into<String>, signer: Arc<dyn RequestSigner>, rest: RestClient) -> Self {
        Self::with_config(url, signer, rest, StreamConfig::default())
    }

    pub fn with_config(
        url: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
        rest: RestClient,
        config: StreamConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            signer: SignerAdapter::new(signer),
            rest,
            config,
            transport: Arc::new(TungsteniteTransport),
            registry: Arc::new(Mutex::new(SubscriptionRegistry::new())),
            active: Mutex::new(None),
            event_tx,
            event_rx: Some(event_rx),
            subscription_logs: AtomicUsize::new(0),
        }
    }

    /// Replace the socket implementation (used by tests and custom proxies)
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn signer(&self) -> &SignerAdapter {
        &self.signer
    }

    /// Get the event receiver; `None` after the first call
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.event_rx.take()
    }

    /// Current connection handle, if any
    pub fn handle(&self) -> Option<ConnectionHandle> {
        lock(&self.active).as_ref().map(|active| active.handle.clone())
    }

    /// True iff a handle exists and its transport is open
    pub fn connected(&self) -> bool {
        self.handle().is_some_and(|handle| handle.is_open())
    }

    /// Create a connection and start its driver task.
    ///
    /// Fails with `AlreadyConnected` while the previous handle is not closed
    /// (including while a `disconnect()` is still in flight). Transport
    /// failures are reported later as `Error` events, never returned here.
    pub fn connect(&self, options: ConnectOptions) -> Result<ConnectionHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CoinbaseError::Config("connect() requires a Tokio runtime".to_string()))?;

        let mut active = lock(&self.active);
        if let Some(current) = active.as_ref()
            && current.handle.ready_state() != ReadyState::Closed
        {
            return Err(CoinbaseError::AlreadyConnected);
        }

        lock(&self.registry).clear();

        let initial = if options.start_closed {
            ReadyState::Closed
        } else {
            ReadyState::Connecting
        };
        let handle = ConnectionHandle::new(initial);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url: self.url.clone(),
            transport: self.transport.clone(),
            signer: self.signer.clone(),
            rest: self.rest.clone(),
            sync_server_time: self.config.sync_server_time,
            registry: self.registry.clone(),
            events: self.event_tx.clone(),
            handle: handle.clone(),
            heartbeat: HeartbeatMonitor::new(self.config.heartbeat.clone()),
            demux: Demultiplexer::new(self.config.emit_raw_messages),
            policy: ReconnectPolicy::new(options.reconnect.clone()),
            connect_timeout: options.connect_timeout,
            close_reported: true,
        };

        info!(
            connection_id = %handle.id(),
            url = %self.url,
            start_closed = options.start_closed,
            "ws connect requested"
        );
        runtime.spawn(driver.run(command_rx, options.start_closed));

        // Dropping the previous sender retires its (closed) driver silently
        *active = Some(ActiveConnection {
            handle: handle.clone(),
            commands: command_tx,
        });

        Ok(handle)
    }

    /// Close the current connection. No-op without a live handle.
    ///
    /// The handle stays in place as `Closing` until the driver has shut down.
    /// A `Close` event follows unless one was already reported for this handle
    /// or a `start_closed` handle was never asked to open.
    pub fn disconnect(&self) {
        let active = lock(&self.active);
        let Some(current) = active.as_ref() else {
            return;
        };

        if matches!(
            current.handle.ready_state(),
            ReadyState::Closing | ReadyState::Closed
        ) && current.commands.is_closed()
        {
            return;
        }

        if current.commands.send(Command::Close).is_ok() {
            if current.handle.ready_state() != ReadyState::Closed {
                current.handle.set_ready_state(ReadyState::Closing);
            }
            info!(connection_id = %current.handle.id(), "ws disconnect requested");
        }
    }

    /// Force a transport level reconnect, or open a handle created with `start_closed`.
    ///
    /// Intended subscriptions are replayed once the new session is open.
    pub fn reconnect(&self) -> Result<()> {
        let active = lock(&self.active);
        let current = active.as_ref().ok_or(CoinbaseError::NotConnected)?;
        if current.handle.ready_state() == ReadyState::Closing {
            return Err(CoinbaseError::NotConnected);
        }
        current
            .commands
            .send(Command::Reconnect)
            .map_err(|_| CoinbaseError::NotConnected)
    }

    /// Subscribe to one or more channels.
    ///
    /// The registry is updated before the frame is signed and sent, so a
    /// reconnect racing this call still replays the intent.
    pub async fn subscribe(&self, channels: impl Into<Channels>) -> Result<()> {
        let channels = channels.into().into_vec();
        self.open_commands()?;

        for channel in channels {
            lock(&self.registry).add(&channel.channel, channel.product_ids.as_deref());
            self.send_message(RequestType::Subscribe, channel).await?;
        }
        Ok(())
    }

    /// Unsubscribe from channels; without product ids the whole channel is dropped
    pub async fn unsubscribe(&self, channels: impl Into<Channels>) -> Result<()> {
        let channels = channels.into().into_vec();
        self.open_commands()?;

        for channel in channels {
            lock(&self.registry).remove(&channel.channel, channel.product_ids.as_deref());
            self.send_message(RequestType::Unsubscribe, channel).await?;
        }
        Ok(())
    }

    /// Sign and send one request frame without touching the registry
    pub async fn send_message(&self, request_type: RequestType, channel: Channel) -> Result<()> {
        self.open_commands()?;

        let signature = self.signer.sign_channel(&channel).await?;
        let request = SubscriptionRequest::new(request_type, channel, signature);
        let frame = serde_json::to_string(&request)?;

        // the connection may have dropped while the signer was running
        self.open_commands()?
            .send(Command::Send(frame))
            .map_err(|_| CoinbaseError::NotConnected)?;

        self.log_subscription_sent(&request);
        Ok(())
    }

    /// Intended subscriptions (what is replayed after a reconnect)
    pub fn subscriptions(&self) -> Vec<ChannelSubscription> {
        lock(&self.registry).snapshot()
    }

    /// Channel list from the latest `subscriptions` confirmation
    pub fn confirmed_subscriptions(&self) -> Vec<ChannelSubscription> {
        lock(&self.registry).confirmed()
    }

    fn open_commands(&self) -> Result<mpsc::UnboundedSender<Command>> {
        let active = lock(&self.active);
        match active.as_ref() {
            Some(current) if current.handle.is_open() => Ok(current.commands.clone()),
            _ => Err(CoinbaseError::NotConnected),
        }
    }

    fn log_subscription_sent(&self, request: &SubscriptionRequest) {
        let count = self.subscription_logs.fetch_add(1, Ordering::Relaxed);
        if count >= SUBSCRIPTION_LOG_LIMIT {
            return;
        }

        let products = request.channel.product_ids().join(",");
        info!(
            sample_index = count + 1,
            sample_limit = SUBSCRIPTION_LOG_LIMIT,
            action = request.request_type.as_str(),
            channel = %request.channel.channel,
            products = %products,
            "ws subscription sent"
        );
    }
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why the driver stopped waiting
enum Interrupt {
    Close,
    Reconnect,
    /// Client dropped or the handle was replaced by a new `connect()`
    Abandon,
}

/// Frames queued while no session is open are lost, like any in-flight frame across a reconnect
fn absorb(command: Option<Command>) -> Option<Interrupt> {
    match command {
        None => Some(Interrupt::Abandon),
        Some(Command::Close) => Some(Interrupt::Close),
        Some(Command::Reconnect) => Some(Interrupt::Reconnect),
        Some(Command::Send(frame)) => {
            debug!(bytes = frame.len(), "ws frame dropped, connection not open");
            None
        }
    }
}

enum SessionEnd {
    Lost(String),
    Reconnect,
    Close,
    Abandon,
}

/// Owns one connection for its whole life: sessions, heartbeat and backoff
struct Driver {
    url: String,
    transport: Arc<dyn Transport>,
    signer: SignerAdapter,
    rest: RestClient,
    sync_server_time: bool,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    events: mpsc::UnboundedSender<StreamEvent>,
    handle: ConnectionHandle,
    heartbeat: HeartbeatMonitor,
    demux: Demultiplexer,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    /// No `Close` owed: the close was already emitted, or nothing ever asked to connect
    close_reported: bool,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, start_closed: bool) {
        if start_closed && !self.wait_for_open(&mut commands).await {
            return;
        }

        let mut replay = false;
        loop {
            self.handle.set_ready_state(ReadyState::Connecting);

            let (mut sink, mut stream) = match self.establish(&mut commands).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    let retryable = err.is_retryable();
                    warn!(
                        connection_id = %self.handle.id(),
                        error = %err,
                        retryable,
                        "ws connect failed"
                    );
                    if !retryable {
                        self.shutdown();
                        self.emit(StreamEvent::Error(err.to_string()));
                        return;
                    }
                    self.emit(StreamEvent::Error(err.to_string()));
                    if !self.backoff(&mut commands).await {
                        return;
                    }
                    continue;
                }
                Err(Interrupt::Reconnect) => continue,
                Err(Interrupt::Close) => return self.close_requested(),
                Err(Interrupt::Abandon) => return self.abandon(),
            };

            self.refresh_clock_skew().await;
            self.open_session();

            let end = if replay {
                match self.replay(&mut sink).await {
                    Ok(()) => self.session(&mut sink, &mut stream, &mut commands).await,
                    Err(err) => SessionEnd::Lost(err.to_string()),
                }
            } else {
                self.session(&mut sink, &mut stream, &mut commands).await
            };
            self.heartbeat.cleanup();
            replay = true;

            match end {
                SessionEnd::Lost(reason) => {
                    warn!(connection_id = %self.handle.id(), reason = %reason, "ws connection lost");
                    self.report_close(ReadyState::Connecting);
                    if !self.backoff(&mut commands).await {
                        return;
                    }
                }
                SessionEnd::Reconnect => {
                    info!(connection_id = %self.handle.id(), "ws reconnect requested");
                    let _ = time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                    self.report_close(ReadyState::Connecting);
                }
                SessionEnd::Close => {
                    let _ = time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                    return self.close_requested();
                }
                SessionEnd::Abandon => {
                    let _ = time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                    return self.abandon();
                }
            }
        }
    }

    /// Idle until `reconnect()` asks for the first open
    async fn wait_for_open(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        loop {
            match absorb(commands.recv().await) {
                Some(Interrupt::Reconnect) => return true,
                Some(Interrupt::Close) => {
                    self.shutdown();
                    return false;
                }
                Some(Interrupt::Abandon) => {
                    self.abandon();
                    return false;
                }
                None => {}
            }
        }
    }

    async fn establish(
        &self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> std::result::Result<Result<(FrameSink, FrameStream)>, Interrupt> {
        let connect = time::timeout(self.connect_timeout, self.transport.connect(&self.url));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return Ok(result.unwrap_or_else(|_| {
                        Err(CoinbaseError::Timeout {
                            duration: self.connect_timeout.as_secs(),
                        })
                    }));
                }
                command = commands.recv() => {
                    if let Some(interrupt) = absorb(command) {
                        return Err(interrupt);
                    }
                }
            }
        }
    }

    /// Wait out the next backoff delay; false when the driver must stop
    async fn backoff(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        let Some(delay) = self.policy.next_delay() else {
            let attempts = self.policy.attempt_count();
            warn!(connection_id = %self.handle.id(), attempts, "ws reconnect attempts exhausted");
            self.shutdown();
            self.emit(StreamEvent::Error(format!(
                "giving up after {attempts} reconnect attempts"
            )));
            return false;
        };

        let attempt = self.policy.attempt_count();
        info!(
            connection_id = %self.handle.id(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "ws reconnect scheduled"
        );
        self.handle.set_ready_state(ReadyState::Connecting);
        self.emit(StreamEvent::Reconnecting { attempt, delay });

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = commands.recv() => match absorb(command) {
                    Some(Interrupt::Reconnect) => return true,
                    Some(Interrupt::Close) => {
                        self.close_requested();
                        return false;
                    }
                    Some(Interrupt::Abandon) => {
                        self.abandon();
                        return false;
                    }
                    None => {}
                },
            }
        }
    }

    async fn refresh_clock_skew(&self) {
        if !self.sync_server_time {
            return;
        }

        match self.rest.clock_skew().await {
            Ok(skew) => {
                self.signer.set_clock_skew(skew);
                debug!(connection_id = %self.handle.id(), skew_seconds = skew, "clock skew refreshed");
            }
            Err(err) => {
                warn!(
                    connection_id = %self.handle.id(),
                    error = %err,
                    skew_seconds = self.signer.clock_skew(),
                    "clock skew refresh failed, keeping previous value"
                );
            }
        }
    }

    fn open_session(&mut self) {
        let session = self.handle.state.session_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.handle.touch();
        self.handle.set_ready_state(ReadyState::Open);
        self.policy.reset();
        self.close_reported = false;
        self.heartbeat.arm(Instant::now());

        info!(connection_id = %self.handle.id(), session, "ws connected");
        self.emit(StreamEvent::Open);
    }

    /// Re-send every intended subscription on a fresh session
    async fn replay(&mut self, sink: &mut FrameSink) -> Result<()> {
        let intended = lock(&self.registry).snapshot();
        if intended.is_empty() {
            return Ok(());
        }

        info!(
            connection_id = %self.handle.id(),
            channels = intended.len(),
            "ws replaying subscriptions"
        );
        for entry in intended {
            let channel = entry.to_channel();
            let signature = match self.signer.sign_channel(&channel).await {
                Ok(signature) => signature,
                Err(err) => {
                    warn!(channel = %channel.channel, error = %err, "ws replay signing failed");
                    self.emit(StreamEvent::Error(format!(
                        "replay of {} failed: {err}",
                        channel.channel
                    )));
                    continue;
                }
            };
            let request = SubscriptionRequest::new(RequestType::Subscribe, channel, signature);
            sink.send(WsFrame::Text(serde_json::to_string(&request)?))
                .await?;
        }
        Ok(())
    }

    async fn session(
        &mut self,
        sink: &mut FrameSink,
        stream: &mut FrameStream,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        if let Err(err) = sink.send(WsFrame::Text(frame)).await {
                            return SessionEnd::Lost(err.to_string());
                        }
                    }
                    Some(Command::Reconnect) => return SessionEnd::Reconnect,
                    Some(Command::Close) => return SessionEnd::Close,
                    None => return SessionEnd::Abandon,
                },
                action = self.heartbeat.next_action() => match action {
                    HeartbeatAction::SendPing => {
                        if let Err(err) = sink.send(WsFrame::Ping(Vec::new())).await {
                            return SessionEnd::Lost(err.to_string());
                        }
                        self.heartbeat.ping_sent(Instant::now());
                        debug!(connection_id = %self.handle.id(), "ws ping sent");
                    }
                    HeartbeatAction::PongTimeout => {
                        let err = CoinbaseError::HeartbeatTimeout {
                            timeout: self.heartbeat.config().pong_timeout,
                        };
                        return SessionEnd::Lost(err.to_string());
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(frame)) => {
                        self.handle.touch();
                        self.heartbeat.traffic_received(Instant::now());
                        match frame {
                            WsFrame::Text(text) => {
                                let events = {
                                    let mut registry = lock(&self.registry);
                                    self.demux.route(&text, &mut registry)
                                };
                                for event in events {
                                    self.emit(event);
                                }
                            }
                            WsFrame::Pong(_) => self.heartbeat.pong_received(Instant::now()),
                            // answered by the socket library
                            WsFrame::Ping(_) => {}
                            WsFrame::Close => {
                                return SessionEnd::Lost("server closed the connection".to_string());
                            }
                        }
                    }
                    Some(Err(err)) => return SessionEnd::Lost(err.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                },
            }
        }
    }

    /// Transport went away; `next` is the state to show while reconnecting
    fn report_close(&mut self, next: ReadyState) {
        self.handle.set_ready_state(next);
        if !self.close_reported {
            self.close_reported = true;
            self.emit(StreamEvent::Close);
        }
    }

    /// Caller initiated or final close
    fn shutdown(&mut self) {
        self.heartbeat.cleanup();
        self.report_close(ReadyState::Closed);
        info!(connection_id = %self.handle.id(), "ws closed");
    }

    /// `disconnect()` after connecting began; a handle that never opened still owes one `Close`
    fn close_requested(&mut self) {
        if self.handle.session_count() == 0 {
            self.close_reported = false;
        }
        self.shutdown();
    }

    fn abandon(&mut self) {
        self.heartbeat.cleanup();
        self.handle.set_ready_state(ReadyState::Closed);
        debug!(connection_id = %self.handle.id(), "ws driver retired");
    }

    fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }
}
