//! Bidirectional message channels to scripts and simulations.
//!
//! The router owns one end of every channel. A [`Channel`] delivers JSON
//! payloads to its peer and yields the payloads the peer has sent, one at a
//! time and in order. [`local_channel`] builds an in-process pair whose
//! remote end can be moved to another thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use serde_json::Value;
use thiserror::Error;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique channel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocates a fresh identity.
    #[must_use]
    pub fn allocate() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the identity.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// Errors raised while sending on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The peer has gone away.
    #[error("{channel} is closed")]
    Closed {
        /// Channel that failed.
        channel: ChannelId,
    },
}

/// Router-side end of a bidirectional channel.
pub trait Channel {
    /// Identity used to key listeners.
    fn id(&self) -> ChannelId;

    /// Delivers `payload` to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the peer has gone away.
    fn send(&self, payload: Value) -> Result<(), ChannelError>;

    /// Takes the next payload sent by the peer, if one is waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the peer has gone away and
    /// every payload it sent has been read.
    fn try_recv(&self) -> Result<Option<Value>, ChannelError>;
}

/// Host end of an in-process channel.
#[derive(Debug)]
pub struct LocalChannel {
    id: ChannelId,
    outbound: Sender<Value>,
    inbound: Receiver<Value>,
}

impl Channel for LocalChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn send(&self, payload: Value) -> Result<(), ChannelError> {
        self.outbound
            .send(payload)
            .map_err(|_| ChannelError::Closed { channel: self.id })
    }

    fn try_recv(&self) -> Result<Option<Value>, ChannelError> {
        receive(&self.inbound, self.id)
    }
}

/// Peer end of an in-process channel. Unlike the host end it is `Send`, so
/// a script runtime can own it on its own thread.
#[derive(Debug)]
pub struct RemoteEndpoint {
    id: ChannelId,
    outbound: Sender<Value>,
    inbound: Receiver<Value>,
}

impl RemoteEndpoint {
    /// Identity shared with the host end.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Sends `payload` to the host.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the host end is dropped.
    pub fn send(&self, payload: Value) -> Result<(), ChannelError> {
        self.outbound
            .send(payload)
            .map_err(|_| ChannelError::Closed { channel: self.id })
    }

    /// Blocks until the host sends a payload. Returns `None` once the host
    /// end is dropped.
    #[must_use]
    pub fn recv(&self) -> Option<Value> {
        self.inbound.recv().ok()
    }

    /// Takes the next waiting payload without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the host end is dropped and
    /// nothing is left to read.
    pub fn try_recv(&self) -> Result<Option<Value>, ChannelError> {
        receive(&self.inbound, self.id)
    }

    /// Takes every payload currently waiting.
    #[must_use]
    pub fn drain(&self) -> Vec<Value> {
        self.inbound.try_iter().collect()
    }
}

fn receive(inbound: &Receiver<Value>, channel: ChannelId) -> Result<Option<Value>, ChannelError> {
    match inbound.try_recv() {
        Ok(payload) => Ok(Some(payload)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => Err(ChannelError::Closed { channel }),
    }
}

/// Builds an in-process channel pair.
#[must_use]
pub fn local_channel() -> (LocalChannel, RemoteEndpoint) {
    let id = ChannelId::allocate();
    let (to_remote, from_host) = mpsc::channel();
    let (to_host, from_remote) = mpsc::channel();
    (
        LocalChannel {
            id,
            outbound: to_remote,
            inbound: from_remote,
        },
        RemoteEndpoint {
            id,
            outbound: to_host,
            inbound: from_host,
        },
    )
}
