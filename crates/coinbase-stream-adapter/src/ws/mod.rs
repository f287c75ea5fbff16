/*
[INPUT]:  Streaming endpoint, signer and caller subscription intents
[OUTPUT]: Connection manager plus typed stream events
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding ws submodules or changing the public ws surface
*/

pub mod client;
pub mod demux;
pub mod events;
pub mod heartbeat;
pub mod message;
pub mod reconnect;
pub mod registry;
pub mod transport;

pub use client::{
    ADVANCED_TRADE_WS_URL, ConnectionHandle, ReadyState, StreamConfig, WebSocketClient,
};
pub use demux::Demultiplexer;
pub use events::{EventKind, MessageError, StreamEvent};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
pub use message::{InboundKind, InboundMessage};
pub use reconnect::{ConnectOptions, ReconnectConfig, ReconnectPolicy};
pub use registry::SubscriptionRegistry;
pub use transport::{FrameSink, FrameStream, Transport, TungsteniteTransport, WsFrame};
