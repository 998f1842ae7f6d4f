//! Entities hosted by the router.
//!
//! An [`EntityBridge`] is one addressable world entity. It sits between the
//! entity's sandboxed script and the [`Router`]: script requests arrive as
//! plain payloads, are reconstituted into [`ScriptRequest`] values and
//! dispatched to handlers that call the matching router operation. Results
//! flowing the other way (connection outcomes, remote messages, proximity
//! and location events, simulation traffic) are encoded as
//! [`ScriptEvent`] payloads and posted on the script channel.
//!
//! Bridges are always held behind an [`Rc`]; handlers that need to hand the
//! entity to the session layer or to a subscriber list obtain a strong handle
//! through [`EntityBridge::handle`].

mod handlers;

use std::borrow::Borrow;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use objhost_protocol::{
    ConnectionData, Location, PresenceId, ProximityProperties, Reconstituted, ScriptEvent,
    ScriptMessageType, ScriptRequest, reconstitute,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ChannelId};
use crate::dispatch::{DispatchOutcome, Dispatcher, MessageReceiver};
use crate::error::HostError;
use crate::router::{Listener, Router};
use crate::sandbox::ScriptBootstrap;

const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bridge");

/// Key wrapping GUI traffic forwarded to the simulations.
pub const GUI_KEY: &str = "__gui";

/// Immutable identifier of an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One addressable entity and its script.
pub struct EntityBridge {
    id: EntityId,
    this: Weak<Self>,
    dispatcher: RefCell<Dispatcher<Self>>,
    script: RefCell<Option<Rc<dyn Channel>>>,
    gui_simulation: String,
}

impl MessageReceiver for EntityBridge {
    type Message = ScriptRequest;
    type Context = Router;
    type Channel = Rc<dyn Channel>;
    type Error = HostError;
}

impl EntityBridge {
    /// Creates an entity with the default script handlers. `gui` names the
    /// simulation followed by GUI subscription messages that do not name one.
    #[must_use]
    pub fn new(id: EntityId, gui: impl Into<String>) -> Rc<Self> {
        let gui_simulation = gui.into();
        Rc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            dispatcher: RefCell::new(Dispatcher::new(handlers::defaults())),
            script: RefCell::new(None),
            gui_simulation,
        })
    }

    /// Identifier of the entity.
    #[must_use]
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    /// Returns `true` while a script channel is attached.
    #[must_use]
    pub fn has_script(&self) -> bool {
        self.script.borrow().is_some()
    }

    /// Simulation followed by GUI subscription messages by default.
    #[must_use]
    pub fn gui_simulation(&self) -> &str {
        &self.gui_simulation
    }

    /// Returns a strong handle to this entity.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Detached`] if the entity is being dropped.
    pub fn handle(&self) -> Result<Rc<Self>, HostError> {
        self.this.upgrade().ok_or_else(|| HostError::Detached {
            entity: self.id.clone(),
        })
    }

    /// Returns `true` if a script handler is registered for `message_type`.
    #[must_use]
    pub fn handles_script_message(&self, message_type: ScriptMessageType) -> bool {
        self.dispatcher
            .try_borrow()
            .is_ok_and(|dispatcher| dispatcher.handles(message_type))
    }

    /// Registers or replaces the handler for a script message type.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DispatcherBusy`] when called from one of this
    /// entity's own handlers.
    pub fn add_script_handler<F>(
        &self,
        message_type: ScriptMessageType,
        handler: F,
    ) -> Result<(), HostError>
    where
        F: Fn(&Self, &mut Router, &Rc<dyn Channel>, &ScriptRequest) -> Result<(), HostError>
            + 'static,
    {
        let mut dispatcher = self
            .dispatcher
            .try_borrow_mut()
            .map_err(|_| HostError::DispatcherBusy {
                entity: self.id.clone(),
            })?;
        dispatcher.add(message_type, handler);
        Ok(())
    }

    /// Handles a payload received from the entity's script.
    ///
    /// Payloads whose `__type` is missing or outside the protocol are
    /// ignored and reported as [`DispatchOutcome::Unhandled`].
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Protocol`] for a known type with a malformed
    /// body, or the error returned by the handler.
    pub fn on_script_message(
        &self,
        router: &mut Router,
        channel: &Rc<dyn Channel>,
        payload: Value,
    ) -> Result<DispatchOutcome, HostError> {
        let request = match reconstitute(payload)? {
            Reconstituted::Request(request) => request,
            Reconstituted::Unrecognised { type_tag, .. } => {
                debug!(
                    target: BRIDGE_TARGET,
                    entity = %self.id,
                    type_tag = type_tag.as_deref().unwrap_or("<missing>"),
                    "ignoring unrecognised script message"
                );
                return Ok(DispatchOutcome::Unhandled);
            }
        };

        let dispatcher = self
            .dispatcher
            .try_borrow()
            .map_err(|_| HostError::DispatcherBusy {
                entity: self.id.clone(),
            })?;
        let outcome = dispatcher.dispatch(self, router, channel, &request)?;
        trace!(
            target: BRIDGE_TARGET,
            entity = %self.id,
            message_type = %request.message_type(),
            ?outcome,
            "script message dispatched"
        );
        Ok(outcome)
    }

    /// Posts `payload` on the script channel. Returns `false`, after logging
    /// a warning, when no script is attached or the script has gone away.
    #[must_use]
    pub fn send_to_script(&self, payload: Value) -> bool {
        let Some(channel) = self.script.borrow().clone() else {
            warn!(
                target: BRIDGE_TARGET,
                entity = %self.id,
                "no script attached; dropping message"
            );
            return false;
        };
        match channel.send(payload) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    target: BRIDGE_TARGET,
                    entity = %self.id,
                    %error,
                    "script channel closed; dropping message"
                );
                false
            }
        }
    }

    fn send_event(&self, event: &ScriptEvent) -> Result<bool, HostError> {
        Ok(self.send_to_script(event.to_payload()?))
    }

    /// Reports the outcome of a connection attempt to the script.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Protocol`] if the message cannot be encoded.
    pub fn connection_result(
        &self,
        success: bool,
        presence: &PresenceId,
        data: &ConnectionData,
    ) -> Result<bool, HostError> {
        self.send_event(&ScriptEvent::connection_result(success, presence, data))
    }

    /// Tells the script that the session layer dropped its presence in
    /// `space`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Protocol`] if the message cannot be encoded.
    pub fn force_disconnected(&self, space: &str) -> Result<bool, HostError> {
        self.send_event(&ScriptEvent::Disconnected {
            space: space.to_owned(),
        })
    }

    /// Delivers an application message addressed to one of the entity's
    /// presences. The payload is passed through unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Protocol`] if the message cannot be encoded.
    pub fn deliver_application_message(
        &self,
        space: &str,
        source_object: &str,
        source_port: u32,
        dest_object: &str,
        dest_port: u32,
        payload: Value,
    ) -> Result<bool, HostError> {
        self.send_event(&ScriptEvent::ReceiveMessage {
            space: space.to_owned(),
            source_object: source_object.to_owned(),
            source_port,
            dest_object: dest_object.to_owned(),
            dest_port,
            payload,
        })
    }

    /// Reports an object entering or leaving a proximity query. Location and
    /// visual are only included when `properties` are supplied.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Protocol`] if the message cannot be encoded.
    pub fn proximity_event(
        &self,
        space: &str,
        observed: &str,
        entered: bool,
        properties: Option<ProximityProperties>,
    ) -> Result<bool, HostError> {
        self.send_event(&ScriptEvent::query_event(
            space, observed, entered, properties,
        ))
    }

    /// Reports that a remote presence moved.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Protocol`] if the message cannot be encoded.
    pub fn presence_location_update(
        &self,
        space: &str,
        from: &str,
        loc: Location,
        visual: Option<Value>,
    ) -> Result<bool, HostError> {
        self.send_event(&ScriptEvent::PresenceLocationUpdate {
            space: space.to_owned(),
            from: from.to_owned(),
            loc,
            visual,
        })
    }

    /// Forwards traffic from a subscribed simulation to the script.
    #[must_use]
    pub fn on_simulation_message(
        &self,
        simulation: &str,
        channel: &Rc<dyn Channel>,
        data: Value,
    ) -> bool {
        trace!(
            target: BRIDGE_TARGET,
            entity = %self.id,
            simulation,
            channel = %channel.id(),
            "forwarding simulation message"
        );
        self.send_to_script(data)
    }

    /// Starts `bootstrap` in a fresh sandbox and makes it this entity's
    /// script. The router listens on the new channel on the entity's behalf.
    ///
    /// A previously attached script is replaced; the router keeps listening
    /// on its channel, so anything it still sends reaches this entity.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Launch`] if the script cannot be started.
    pub fn attach_script(
        &self,
        router: &mut Router,
        bootstrap: &ScriptBootstrap,
    ) -> Result<(), HostError> {
        let handle = self.handle()?;
        let channel = router.launch_script(bootstrap)?;
        *self.script.borrow_mut() = Some(Rc::clone(&channel));
        debug!(
            target: BRIDGE_TARGET,
            entity = %self.id,
            script = %bootstrap.script,
            class = %bootstrap.class,
            channel = %channel.id(),
            "script attached"
        );
        router.listen(channel, Listener::Script(handle));
        Ok(())
    }

    /// Channel of the attached script, if any.
    #[must_use]
    pub fn script_channel(&self) -> Option<Rc<dyn Channel>> {
        self.script.borrow().clone()
    }

    /// Detaches the script if `channel` is still its channel.
    pub(crate) fn release_script(&self, channel: ChannelId) {
        let mut script = self.script.borrow_mut();
        if script.as_ref().is_some_and(|current| current.id() == channel) {
            *script = None;
            debug!(target: BRIDGE_TARGET, entity = %self.id, %channel, "script ended");
        }
    }
}

impl fmt::Debug for EntityBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBridge")
            .field("id", &self.id)
            .field("has_script", &self.has_script())
            .field("gui_simulation", &self.gui_simulation)
            .finish_non_exhaustive()
    }
}
