//! Script protocol spoken between hosted entities and their sandboxed scripts.
//!
//! Scripts run in isolated execution contexts and can only exchange plain
//! structural data with the object host. Every message carries its type under
//! the `__type` key. This crate defines:
//!
//! - the [`ScriptMessageType`] taxonomy of script-originated requests;
//! - the typed [`ScriptRequest`] payloads, restored from plain JSON values by
//!   [`reconstitute`];
//! - the host-to-script [`ScriptEvent`] messages built by the object host when
//!   the session layer or a simulation has something to report.
//!
//! # Example
//!
//! ```
//! use objhost_protocol::{reconstitute, Reconstituted, ScriptMessageType};
//! use serde_json::json;
//!
//! let raw = json!({"__type": "query", "space": "S1", "id": "Q1", "angle": 0.5});
//! let Reconstituted::Request(request) = reconstitute(raw).expect("valid payload") else {
//!     panic!("query is a known message type");
//! };
//! assert_eq!(request.message_type(), ScriptMessageType::Query);
//! ```

pub mod error;
pub mod event;
pub mod request;
pub mod types;

pub use self::error::ProtocolError;
pub use self::event::ScriptEvent;
pub use self::request::{
    ApplicationMessageRequest, ConnectRequest, CreateObjectRequest, DisconnectRequest,
    LocationRequest, PhysicsRequest, QueryRemovalRequest, QueryRequest, Reconstituted,
    ScriptRequest, SimulationCallbackRequest, SimulationRequest, SubscriptionRequest,
    TYPE_KEY, reconstitute,
};
pub use self::types::{ConnectionData, Location, PresenceId, ProximityProperties, ScriptMessageType};
