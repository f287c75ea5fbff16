/*
[INPUT]:  Streaming endpoint URL
[OUTPUT]: Split duplex frame sink/stream over a WebSocket connection
[POS]:    WebSocket layer - socket abstraction used by the connection driver
[UPDATE]: When switching socket libraries or adding frame kinds
*/

use std::future;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use crate::error::{CoinbaseError, Result};

/// Frame kinds the client cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl WsFrame {
    /// Binary frames are read as text. Invalid UTF-8 is replaced rather than
    /// dropped, so the demultiplexer still reports the frame as a parse error.
    /// Raw frames are dropped.
    pub fn from_message(message: WsMessage) -> Option<Self> {
        match message {
            WsMessage::Text(text) => Some(WsFrame::Text(text.to_string())),
            WsMessage::Binary(bytes) => {
                Some(WsFrame::Text(String::from_utf8_lossy(&bytes).into_owned()))
            }
            WsMessage::Ping(payload) => Some(WsFrame::Ping(payload.to_vec())),
            WsMessage::Pong(payload) => Some(WsFrame::Pong(payload.to_vec())),
            WsMessage::Close(_) => Some(WsFrame::Close),
            WsMessage::Frame(_) => None,
        }
    }

    pub fn into_message(self) -> WsMessage {
        match self {
            WsFrame::Text(text) => WsMessage::Text(text.into()),
            WsFrame::Ping(payload) => WsMessage::Ping(payload.into()),
            WsFrame::Pong(payload) => WsMessage::Pong(payload.into()),
            WsFrame::Close => WsMessage::Close(None),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<WsFrame, Error = CoinbaseError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WsFrame>> + Send>>;

/// Opens one duplex connection per call.
///
/// The driver calls `connect` again for every reconnect, so implementations
/// must not keep per-connection state of their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)>;
}

/// tokio-tungstenite backed transport (TLS via rustls)
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        let (ws_stream, response) = connect_async(url).await?;
        debug!(url, status = response.status().as_u16(), "ws handshake complete");

        let (write, read) = ws_stream.split();
        let sink = write
            .sink_map_err(CoinbaseError::from)
            .with(|frame: WsFrame| future::ready(Ok::<_, CoinbaseError>(frame.into_message())));
        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(message) => WsFrame::from_message(message).map(Ok),
                Err(err) => Some(Err(CoinbaseError::from(err))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
