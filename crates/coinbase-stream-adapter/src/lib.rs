/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Coinbase stream adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod error;
pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from auth
pub use auth::{HmacSigner, MockSigner, RequestSigner, SignRequest, Signature, SignerAdapter};

// Re-export error types
pub use error::{CoinbaseError, Result};

// Re-export commonly used types from http
pub use http::{ClientConfig, RestClient};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ADVANCED_TRADE_WS_URL,
    ConnectOptions,
    ConnectionHandle,
    EventKind,
    HeartbeatConfig,
    MessageError,
    ReadyState,
    ReconnectConfig,
    StreamConfig,
    StreamEvent,
    SubscriptionRegistry,
    Transport,
    TungsteniteTransport,
    WebSocketClient,
    WsFrame,
};
