//! Contract with the session layer.
//!
//! The session layer owns the network side of presences: connecting to
//! spaces, proximity queries, locations and application messages. The
//! router forwards script requests to a [`SessionManager`] and the session
//! layer calls back into the relevant [`EntityBridge`] when it has results.

use std::rc::Rc;

use objhost_protocol::{ApplicationMessageRequest, ConnectRequest, DisconnectRequest, Location};
use serde_json::Value;
use thiserror::Error;

use crate::bridge::EntityBridge;

/// Errors returned by a session layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation failed inside the session layer.
    #[error("session operation '{operation}' failed: {message}")]
    Failed {
        /// Operation that failed.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// No presence is connected to the space.
    #[error("not connected to space '{space}'")]
    NotConnected {
        /// Space addressed.
        space: String,
    },
}

/// Operations the router forwards to the session layer.
///
/// `bridge` arguments identify the requesting entity; the session layer may
/// keep the handle to report results through methods such as
/// [`EntityBridge::connection_result`].
pub trait SessionManager {
    /// Opens a presence for `bridge`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the request cannot be issued.
    fn connect(
        &mut self,
        bridge: &Rc<EntityBridge>,
        request: &ConnectRequest,
        auth: Option<Value>,
    ) -> Result<(), SessionError>;

    /// Closes one of `bridge`'s presences.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the request cannot be issued.
    fn disconnect(
        &mut self,
        bridge: &Rc<EntityBridge>,
        request: &DisconnectRequest,
    ) -> Result<(), SessionError>;

    /// Sends an application message between two objects.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the message cannot be sent.
    fn send_application_message(
        &mut self,
        message: &ApplicationMessageRequest,
    ) -> Result<(), SessionError>;

    /// Registers a proximity query for presence `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the query cannot be registered.
    fn register_proximity_query(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: f64,
    ) -> Result<(), SessionError>;

    /// Updates the location and visual of presence `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the update cannot be issued.
    fn request_location_update(
        &mut self,
        space: &str,
        id: &str,
        location: &Location,
        visual: Option<Value>,
    ) -> Result<(), SessionError>;

    /// Removes the proximity query of presence `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the removal cannot be issued.
    fn request_query_removal(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: Option<f64>,
    ) -> Result<(), SessionError>;

    /// Changes the solid angle of presence `id`'s proximity query.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the update cannot be issued.
    fn request_query_update(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: f64,
    ) -> Result<(), SessionError>;

    /// Sets physics parameters of presence `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the update cannot be issued.
    fn set_physics(&mut self, space: &str, id: &str, data: &Value) -> Result<(), SessionError>;

    /// Subscribes presence `id` to updates of the objects in `observed`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the subscription cannot be issued.
    fn subscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), SessionError>;

    /// Cancels a subscription made with [`SessionManager::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the cancellation cannot be issued.
    fn unsubscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), SessionError>;
}
