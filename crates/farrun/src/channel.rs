//! # Channel Abstraction
//!
//! A minimal, async interface for moving structured values between isolated
//! execution contexts.
//!
//! ## Philosophy
//!
//! - **Value-Oriented**: the channel carries `Value`s; it knows nothing
//!   about frames, registries, or correlation.
//! - **Shape-Agnostic**: differing host pipe shapes are normalized behind
//!   one trait so the agent never branches on them.
//! - **Shareable**: payloads that are not engine frames pass through
//!   untouched on the wire and are ignored by the adapter, so a channel can
//!   carry unrelated traffic alongside RPC.

use std::sync::Arc;

use farrpc::Frame;
use farrpc::TransferList;
use farrpc::Value;
use farrpc::seal;
use tracing::debug;

use crate::classify::TransferKind;

/// Errors that occur at the channel boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer endpoint is gone.
    Closed,
    /// The outbound value could not be isolated for the peer.
    Seal(farrpc::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "The channel is closed."),
            Self::Seal(e) => write!(f, "Failed to seal the message: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Seal(e) => Some(e),
            Self::Closed => None,
        }
    }
}

impl From<farrpc::Error> for Error {
    fn from(e: farrpc::Error) -> Self {
        Self::Seal(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional message pipe between two execution contexts.
///
/// This trait is designed to be object-safe (`Arc<dyn Channel>`).
///
/// # invariants
/// - `send` must deliver messages in send order per direction.
/// - `recv` must return `None` once the peer endpoint is gone.
/// - `supports` must never fail for any kind; unsupported kinds answer
///   `false`.
#[async_trait::async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Hands a value to the peer.
    async fn send(&self, message: Value) -> Result<()>;

    /// Waits for the next inbound value; `None` once the channel is closed.
    async fn recv(&self) -> Option<Value>;

    /// Probes whether a reference-transfer kind exists on this channel.
    fn supports(&self, kind: TransferKind) -> bool {
        matches!(kind, TransferKind::Buffer)
    }
}

/// Wraps a channel with the engine-facing surface: sealing on the way out,
/// frame classification on the way in.
#[derive(Clone)]
pub struct ChannelAdapter {
    inner: Arc<dyn Channel>,
}

impl ChannelAdapter {
    pub fn new(inner: Arc<dyn Channel>) -> Self {
        Self { inner }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.inner
    }

    /// Seals a frame against the transfer list and sends it.
    ///
    /// Handles named in the transfer list are moved to the peer (the sender
    /// side is left detached); everything else is deep-copied.
    pub async fn send_frame(&self, frame: Frame, transfers: &TransferList) -> Result<()> {
        let sealed = seal(&frame.into_value(), transfers)?;
        self.inner.send(sealed).await
    }

    /// Waits for the next recognizable frame, silently skipping payloads
    /// that match neither message shape.
    pub async fn next_frame(&self) -> Option<Frame> {
        while let Some(message) = self.inner.recv().await {
            match Frame::classify(message) {
                Some(frame) => return Some(frame),
                None => debug!("ignoring non-rpc payload on shared channel"),
            }
        }
        None
    }
}
