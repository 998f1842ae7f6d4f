//! Shared vocabulary of the script protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

/// Type tag of a script-originated message.
///
/// The textual form (used in the `__type` field) is the snake_case variant
/// name, for example `"query_update"`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScriptMessageType {
    /// Open a presence in a space.
    Connect,
    /// Close a presence.
    Disconnect,
    /// Send an addressed application-level message.
    SendMessage,
    /// Register a proximity query.
    Query,
    /// Change the solid angle of an existing proximity query.
    QueryUpdate,
    /// Remove a proximity query.
    QueryRemoval,
    /// Request a location update for a presence.
    Location,
    /// Enable or disable a subscription to another presence.
    Subscription,
    /// Update physics parameters of a presence.
    Physics,
    /// Create a child entity, optionally running its own script.
    CreateObject,
    /// Forward a message to the simulations.
    Graphics,
    /// Subscribe the entity to a simulation's traffic.
    EnableGui,
    /// Unsubscribe the entity from a simulation's traffic.
    DisableGui,
    /// Forward a GUI message to the simulations.
    Gui,
}

impl ScriptMessageType {
    /// Every script-originated message type.
    pub const ALL: [Self; 14] = [
        Self::Connect,
        Self::Disconnect,
        Self::SendMessage,
        Self::Query,
        Self::QueryUpdate,
        Self::QueryRemoval,
        Self::Location,
        Self::Subscription,
        Self::Physics,
        Self::CreateObject,
        Self::Graphics,
        Self::EnableGui,
        Self::DisableGui,
        Self::Gui,
    ];

    /// Parses a type tag, returning `None` for tags outside the protocol.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        tag.parse().ok()
    }

    /// Returns the canonical tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Identity of a presence: a local entity connected to a specific space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceId {
    /// Space the presence lives in.
    pub space: String,
    /// Object identifier assigned by the space.
    pub object: String,
}

impl PresenceId {
    /// Creates a presence identifier.
    #[must_use]
    pub fn new(space: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            object: object.into(),
        }
    }
}

/// Location of a presence. Every component is optional so partial updates
/// only carry what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<[f64; 3]>,
    /// Velocity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vel: Option<[f64; 3]>,
    /// Orientation quaternion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orient: Option<[f64; 4]>,
    /// Rotation axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotaxis: Option<[f64; 3]>,
    /// Rotational velocity around `rotaxis`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotvel: Option<f64>,
    /// Bounds, as `[x, y, z, radius]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f64>>,
    /// Timestamp shared by every component of this update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// Data the session layer reports with a connection result.
///
/// Successful connections carry the initial location and visual of the
/// presence; failures carry a human-readable reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionData {
    /// Initial location of the new presence.
    pub loc: Location,
    /// Visual description (mesh reference, etc.).
    pub visual: Option<Value>,
    /// Reason for a failed connection.
    pub reason: Option<String>,
}

impl ConnectionData {
    /// Creates data for a successful connection.
    #[must_use]
    pub const fn connected(loc: Location, visual: Option<Value>) -> Self {
        Self {
            loc,
            visual,
            reason: None,
        }
    }

    /// Creates data for a failed connection.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Detail attached to a proximity event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximityProperties {
    /// Location of the observed presence.
    pub loc: Location,
    /// Visual of the observed presence.
    pub visual: Option<Value>,
}
