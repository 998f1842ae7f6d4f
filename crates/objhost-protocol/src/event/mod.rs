//! Host-to-script messages.
//!
//! These are built by the object host when the session layer reports a
//! connection result, a remote message, a proximity change or a location
//! update, then encoded with [`ScriptEvent::to_payload`] and posted on the
//! entity's script channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{ConnectionData, Location, PresenceId, ProximityProperties};

/// A message delivered from the host to a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// A presence was opened.
    Connected {
        /// Space connected to.
        space: String,
        /// Object identifier of the new presence.
        object: String,
        /// Initial location.
        loc: Location,
        /// Bounds; not reported by current session layers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bounds: Option<Value>,
        /// Initial visual.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visual: Option<Value>,
    },
    /// A connection attempt failed.
    ConnectionFailed {
        /// Space that refused the connection.
        space: String,
        /// Object identifier the connection was attempted for.
        object: String,
        /// Human-readable reason.
        reason: String,
    },
    /// The session layer dropped a presence.
    Disconnected {
        /// Space that was disconnected.
        space: String,
    },
    /// An application message arrived for one of the script's presences.
    ReceiveMessage {
        /// Space carrying the message.
        space: String,
        /// Sending object.
        source_object: String,
        /// Sending port.
        source_port: u32,
        /// Receiving object.
        dest_object: String,
        /// Receiving port.
        dest_port: u32,
        /// Opaque application payload.
        payload: Value,
    },
    /// An object entered or left a proximity query.
    ///
    /// `loc` and `visual` are only present on detailed events.
    QueryEvent {
        /// Space of the query.
        space: String,
        /// Object that entered or left.
        observed: String,
        /// `true` on entry, `false` on exit.
        entered: bool,
        /// Location of the observed object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loc: Option<Location>,
        /// Visual of the observed object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visual: Option<Value>,
    },
    /// A remote presence moved.
    PresenceLocationUpdate {
        /// Space of the update.
        space: String,
        /// Presence that moved.
        from: String,
        /// New location.
        loc: Location,
        /// New visual, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visual: Option<Value>,
    },
}

impl ScriptEvent {
    /// Builds the message reporting a connection attempt.
    #[must_use]
    pub fn connection_result(success: bool, presence: &PresenceId, data: &ConnectionData) -> Self {
        if success {
            Self::Connected {
                space: presence.space.clone(),
                object: presence.object.clone(),
                loc: data.loc.clone(),
                bounds: None,
                visual: data.visual.clone(),
            }
        } else {
            Self::ConnectionFailed {
                space: presence.space.clone(),
                object: presence.object.clone(),
                reason: data.reason.clone().unwrap_or_default(),
            }
        }
    }

    /// Builds a proximity event, detailed when `properties` are supplied.
    #[must_use]
    pub fn query_event(
        space: impl Into<String>,
        observed: impl Into<String>,
        entered: bool,
        properties: Option<ProximityProperties>,
    ) -> Self {
        let (loc, visual) = match properties {
            Some(ProximityProperties { loc, visual }) => (Some(loc), visual),
            None => (None, None),
        };
        Self::QueryEvent {
            space: space.into(),
            observed: observed.into(),
            entered,
            loc,
            visual,
        }
    }

    /// Returns the type tag of this message.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::Disconnected { .. } => "disconnected",
            Self::ReceiveMessage { .. } => "receive_message",
            Self::QueryEvent { .. } => "query_event",
            Self::PresenceLocationUpdate { .. } => "presence_location_update",
        }
    }

    /// Encodes the message into its plain structural form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the message cannot be encoded.
    pub fn to_payload(&self) -> Result<Value, ProtocolError> {
        serde_json::to_value(self).map_err(|source| ProtocolError::Encode {
            message: self.name(),
            source,
        })
    }
}
