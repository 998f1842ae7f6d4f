//! Errors raised while translating between plain payloads and typed messages.
//!
//! An unknown or missing type tag is not an error: forward and backward
//! compatibility depend on the host ignoring types it does not understand.
//! Only payloads that claim a known type but cannot be decoded as that type
//! are reported here.

use thiserror::Error;

use crate::types::ScriptMessageType;

/// Errors arising from script protocol translation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A payload tagged with a known message type did not match its schema.
    #[error("malformed '{message_type}' message: {source}")]
    Malformed {
        /// Type tag carried by the payload.
        message_type: ScriptMessageType,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// A host-to-script message could not be encoded.
    #[error("failed to encode '{message}' message: {source}")]
    Encode {
        /// Name of the message being encoded.
        message: &'static str,
        /// Underlying encoding error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Creates a malformed payload error.
    #[must_use]
    pub const fn malformed(message_type: ScriptMessageType, source: serde_json::Error) -> Self {
        Self::Malformed {
            message_type,
            source,
        }
    }

    /// Returns the message type of a malformed payload, if any.
    #[must_use]
    pub const fn message_type(&self) -> Option<ScriptMessageType> {
        match self {
            Self::Malformed { message_type, .. } => Some(*message_type),
            Self::Encode { .. } => None,
        }
    }
}
