//! Script-to-host requests and their reconstitution from plain payloads.
//!
//! Payloads cross the sandbox boundary as plain JSON objects. They lose any
//! type identity on the way, so the host restores it with [`reconstitute`]:
//! the `__type` tag selects the [`ScriptRequest`] variant and the remaining
//! fields are decoded into that variant's payload struct.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::types::{Location, ScriptMessageType};

/// Key under which every message carries its type tag.
pub const TYPE_KEY: &str = "__type";

/// A typed script-originated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type", rename_all = "snake_case")]
pub enum ScriptRequest {
    /// Open a presence in a space.
    Connect(ConnectRequest),
    /// Close a presence.
    Disconnect(DisconnectRequest),
    /// Send an addressed application message.
    SendMessage(ApplicationMessageRequest),
    /// Register a proximity query.
    Query(QueryRequest),
    /// Update the solid angle of a proximity query.
    QueryUpdate(QueryRequest),
    /// Remove a proximity query.
    QueryRemoval(QueryRemovalRequest),
    /// Request a location update.
    Location(LocationRequest),
    /// Enable or disable a subscription.
    Subscription(SubscriptionRequest),
    /// Update physics parameters.
    Physics(PhysicsRequest),
    /// Create a child entity.
    CreateObject(CreateObjectRequest),
    /// Message bound for the simulations.
    Graphics(SimulationRequest),
    /// Start receiving a simulation's traffic.
    EnableGui(SimulationCallbackRequest),
    /// Stop receiving a simulation's traffic.
    DisableGui(SimulationCallbackRequest),
    /// GUI message bound for the simulations.
    Gui(SimulationRequest),
}

impl ScriptRequest {
    /// Returns the type tag of this request.
    #[must_use]
    pub const fn message_type(&self) -> ScriptMessageType {
        match self {
            Self::Connect(_) => ScriptMessageType::Connect,
            Self::Disconnect(_) => ScriptMessageType::Disconnect,
            Self::SendMessage(_) => ScriptMessageType::SendMessage,
            Self::Query(_) => ScriptMessageType::Query,
            Self::QueryUpdate(_) => ScriptMessageType::QueryUpdate,
            Self::QueryRemoval(_) => ScriptMessageType::QueryRemoval,
            Self::Location(_) => ScriptMessageType::Location,
            Self::Subscription(_) => ScriptMessageType::Subscription,
            Self::Physics(_) => ScriptMessageType::Physics,
            Self::CreateObject(_) => ScriptMessageType::CreateObject,
            Self::Graphics(_) => ScriptMessageType::Graphics,
            Self::EnableGui(_) => ScriptMessageType::EnableGui,
            Self::DisableGui(_) => ScriptMessageType::DisableGui,
            Self::Gui(_) => ScriptMessageType::Gui,
        }
    }

    /// Encodes the request back into its plain structural form, type tag
    /// included.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the payload cannot be encoded.
    pub fn to_payload(&self) -> Result<Value, ProtocolError> {
        serde_json::to_value(self).map_err(|source| ProtocolError::Encode {
            message: self.message_type().as_str(),
            source,
        })
    }
}

/// Outcome of [`reconstitute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstituted {
    /// The payload carried a known type and decoded cleanly.
    Request(ScriptRequest),
    /// The payload carried no type tag, or one outside the protocol. It is
    /// handed back untouched.
    Unrecognised {
        /// Tag found in the payload, if it had a string tag.
        type_tag: Option<String>,
        /// The payload as received.
        payload: Value,
    },
}

/// Restores the typed identity of a plain payload received from a script.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] when the payload names a known type
/// but its fields do not match that type's schema.
pub fn reconstitute(payload: Value) -> Result<Reconstituted, ProtocolError> {
    let type_tag = payload
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned);
    let Some(message_type) = type_tag.as_deref().and_then(ScriptMessageType::from_tag) else {
        return Ok(Reconstituted::Unrecognised { type_tag, payload });
    };
    serde_json::from_value(payload)
        .map(Reconstituted::Request)
        .map_err(|source| ProtocolError::malformed(message_type, source))
}

/// Request to open a presence in a space.
///
/// Fields the host does not interpret (initial location, visual, query
/// angle...) are kept in `extra` and passed through to the session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Space to connect to.
    pub space: String,
    /// Bounds of the new presence as `[x, y, z, radius]`.
    #[serde(default)]
    pub scale: Vec<f64>,
    /// Authentication data for the space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// Remaining request fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectRequest {
    /// Rewrites legacy 3-component bounds into the 4-component form.
    ///
    /// Legacy scripts send `[r, _, _]`, which becomes `[0, 0, 0, r]`. Returns
    /// the legacy value when a rewrite happened.
    pub fn normalise_legacy_scale(&mut self) -> Option<Vec<f64>> {
        let &[radius, _, _] = self.scale.as_slice() else {
            return None;
        };
        Some(std::mem::replace(
            &mut self.scale,
            vec![0.0, 0.0, 0.0, radius],
        ))
    }
}

/// Request to close a presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectRequest {
    /// Space of the presence.
    pub space: String,
    /// Presence object identifier.
    pub id: String,
}

/// Application-level message addressed by `(space, object, port)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMessageRequest {
    /// Space carrying the message.
    pub space: String,
    /// Sending object.
    pub source_object: String,
    /// Sending port.
    pub source_port: u32,
    /// Receiving object.
    pub dest_object: String,
    /// Receiving port.
    pub dest_port: u32,
    /// Opaque application payload.
    #[serde(default)]
    pub payload: Value,
}

/// Registration or update of a proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Space of the querying presence.
    pub space: String,
    /// Querying presence.
    pub id: String,
    /// Minimum solid angle of reported objects.
    #[serde(rename = "angle", alias = "sa")]
    pub solid_angle: f64,
}

/// Removal of a proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRemovalRequest {
    /// Space of the querying presence.
    pub space: String,
    /// Querying presence.
    pub id: String,
}

/// Location update requested by a script for one of its presences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRequest {
    /// Space of the presence.
    pub space: String,
    /// Presence to move.
    pub id: String,
    /// New location components.
    #[serde(flatten)]
    pub location: Location,
    /// New visual, if it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<Value>,
}

/// Subscription toggle for updates about another presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Space of the subscribing presence.
    pub space: String,
    /// Subscribing presence.
    pub id: String,
    /// Objects whose updates are wanted, as the script sent them. Usually a
    /// single identifier or an array of identifiers.
    pub observed: Value,
    /// `true` to subscribe, `false` to unsubscribe.
    pub enable: bool,
}

/// Physics parameters for a presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsRequest {
    /// Space of the presence.
    pub space: String,
    /// Presence to update.
    pub id: String,
    /// Opaque physics description.
    #[serde(default)]
    pub data: Value,
}

/// Creation of a child entity.
///
/// A script is only started for the new entity when `script`, `constructor`
/// and `args` are all present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateObjectRequest {
    /// Script source reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Name of the constructor to instantiate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
    /// Constructor arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Message bound for the simulations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Message body, forwarded untouched.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl SimulationRequest {
    /// Simulation named by a string `simulation` field. Any other value
    /// belongs to the body and leaves the message addressed to every
    /// simulation.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.body.get("simulation").and_then(Value::as_str)
    }
}

/// Subscription toggle for a simulation's traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationCallbackRequest {
    /// Simulation to follow. Absent means the host's GUI simulation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<String>,
}
