use crate::traits::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A raw duplex frame
///
/// Can be text or binary data; the connection layer encodes its wire
/// envelopes as text frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Get the frame as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(s) => Some(s),
            Frame::Binary(_) => None,
        }
    }

    /// Get the frame as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(_) => None,
            Frame::Binary(b) => Some(b),
        }
    }

    /// Check if the frame is text
    pub fn is_text(&self) -> bool {
        matches!(self, Frame::Text(_))
    }
}

/// Outbound instruction for a live transport link
#[derive(Debug)]
pub enum LinkCommand {
    /// Send a frame to the peer
    Send(Frame),
    /// Close the link
    Close { code: Option<u16>, reason: String },
}

/// Inbound event from a live transport link
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A frame arrived from the peer
    Frame(Frame),
    /// The link closed (peer close, local close, or fatal error)
    Closed { code: Option<u16>, reason: String },
    /// A transport-level error occurred; does not by itself end the link
    Error(String),
}

/// A live duplex link returned by [`Transport::open`]
///
/// The opener owns both halves exclusively: frames go out through `commands`,
/// events come in through `events`. Dropping the command sender tells the
/// transport implementation to tear the link down.
pub struct TransportLink {
    pub commands: mpsc::UnboundedSender<LinkCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Abstract duplex transport capability
///
/// The connection layer depends only on this seam; production code uses the
/// WebSocket implementation, tests substitute a scripted one.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link to `target`
    ///
    /// Resolves once the link is established (the OPEN event of the
    /// underlying protocol); a failed handshake returns an error.
    async fn open(&self, target: &str) -> Result<TransportLink>;
}
