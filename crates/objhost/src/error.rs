//! Errors surfaced while routing messages.

use objhost_protocol::{ProtocolError, ScriptMessageType};
use thiserror::Error;

use crate::bridge::EntityId;
use crate::sandbox::LaunchError;
use crate::session::SessionError;

/// Errors raised by the router, entity bridges and their handlers.
#[derive(Debug, Error)]
pub enum HostError {
    /// A script payload could not be decoded, or a host message encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session layer rejected a request.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A script could not be launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// No entity is registered under the identifier.
    #[error("unknown entity '{id}'")]
    UnknownEntity {
        /// Identifier looked up.
        id: EntityId,
    },

    /// The entity's dispatcher was modified while one of its handlers ran.
    #[error("dispatcher of entity '{entity}' is busy")]
    DispatcherBusy {
        /// Entity whose dispatcher was borrowed.
        entity: EntityId,
    },

    /// The entity is no longer owned by a router.
    #[error("entity '{entity}' has been dropped")]
    Detached {
        /// Entity whose handle could not be upgraded.
        entity: EntityId,
    },

    /// A handler received a message of a type it was not registered for.
    #[error("handler for '{expected}' received a '{actual}' message")]
    MismatchedHandler {
        /// Type the handler was registered for.
        expected: ScriptMessageType,
        /// Type of the message received.
        actual: ScriptMessageType,
    },
}
