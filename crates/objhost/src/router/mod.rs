//! Global registry and forwarder of the object host.
//!
//! The [`Router`] owns every [`EntityBridge`], keeps the simulation channels
//! and their subscriber lists, and forwards script requests to the
//! [`SessionManager`]. It also owns the listener table: for every channel it
//! reads from, the table records whether inbound traffic belongs to an
//! entity's script or to a named simulation. [`Router::pump`] drains those
//! channels on the control thread and routes each payload to its listener.
//!
//! All state lives on one thread; scripts and simulations only reach it
//! through their channels.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use objhost_config::{Config, QueryUpdateMode};
use objhost_protocol::{ApplicationMessageRequest, ConnectRequest, DisconnectRequest, Location};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::bridge::{EntityBridge, EntityId};
use crate::channel::{Channel, ChannelId};
use crate::error::HostError;
use crate::sandbox::{LaunchError, ScriptBootstrap, ScriptLauncher};
use crate::session::SessionManager;

const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Behavioural switches of a [`Router`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    /// Simulation followed by GUI subscription messages that name none.
    pub gui_simulation: String,
    /// Route query updates to query removal, as older session layers expect.
    pub legacy_query_update: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            gui_simulation: objhost_config::DEFAULT_GUI_SIMULATION.to_owned(),
            legacy_query_update: false,
        }
    }
}

impl RouterOptions {
    /// Takes the router switches from the host configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            gui_simulation: config.gui_simulation().to_owned(),
            legacy_query_update: config.query_update_mode() == QueryUpdateMode::Legacy,
        }
    }
}

/// Recipient of a channel's inbound traffic.
#[derive(Debug, Clone)]
pub(crate) enum Listener {
    /// The channel carries an entity's script.
    Script(Rc<EntityBridge>),
    /// The channel carries a named simulation.
    Simulation(String),
}

struct ListenerEntry {
    channel: Rc<dyn Channel>,
    listener: Listener,
}

/// Registry of entities and simulations.
pub struct Router {
    entities: HashMap<EntityId, Rc<EntityBridge>>,
    simulations_by_name: BTreeMap<String, Rc<dyn Channel>>,
    simulation_callbacks: HashMap<String, Vec<Rc<EntityBridge>>>,
    listeners: Vec<ListenerEntry>,
    session: Box<dyn SessionManager>,
    launcher: Box<dyn ScriptLauncher>,
    options: RouterOptions,
    next_identifier: u64,
    trusted: Option<EntityId>,
}

impl Router {
    /// Creates a router with no entities.
    #[must_use]
    pub fn new(
        session: Box<dyn SessionManager>,
        launcher: Box<dyn ScriptLauncher>,
        options: RouterOptions,
    ) -> Self {
        Self {
            entities: HashMap::new(),
            simulations_by_name: BTreeMap::new(),
            simulation_callbacks: HashMap::new(),
            listeners: Vec::new(),
            session,
            launcher,
            options,
            next_identifier: 0,
            trusted: None,
        }
    }

    /// Creates a router together with its first, trusted entity. The entity
    /// takes the first generated identifier and runs `bootstrap` when one is
    /// supplied.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Launch`] if the bootstrap script cannot start.
    pub fn start(
        session: Box<dyn SessionManager>,
        launcher: Box<dyn ScriptLauncher>,
        options: RouterOptions,
        bootstrap: Option<&ScriptBootstrap>,
    ) -> Result<Self, HostError> {
        let mut router = Self::new(session, launcher, options);
        let id = router.generate_identifier();
        let trusted = router.create_entity(id.clone());
        if let Some(script) = bootstrap {
            trusted.attach_script(&mut router, script)?;
        }
        info!(
            target: ROUTER_TARGET,
            entity = %id,
            scripted = bootstrap.is_some(),
            "trusted entity created"
        );
        router.trusted = Some(id);
        Ok(router)
    }

    /// Identifier of the trusted entity created by [`Router::start`].
    #[must_use]
    pub const fn trusted_entity(&self) -> Option<&EntityId> {
        self.trusted.as_ref()
    }

    /// Behavioural switches in effect.
    #[must_use]
    pub const fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Session layer the router forwards to.
    #[must_use]
    pub fn session(&self) -> &dyn SessionManager {
        self.session.as_ref()
    }

    /// Mutable access to the session layer.
    #[must_use]
    pub fn session_mut(&mut self) -> &mut dyn SessionManager {
        self.session.as_mut()
    }

    // Entities

    /// Returns the next identifier: `"1"`, `"2"`, ... Identifiers are never
    /// reused.
    pub fn generate_identifier(&mut self) -> EntityId {
        self.next_identifier += 1;
        EntityId::from(self.next_identifier.to_string())
    }

    /// Creates and registers an entity, silently replacing any entity
    /// already registered under `id`.
    pub fn create_entity(&mut self, id: impl Into<EntityId>) -> Rc<EntityBridge> {
        let bridge = EntityBridge::new(id.into(), self.options.gui_simulation.clone());
        let previous = self
            .entities
            .insert(bridge.id().clone(), Rc::clone(&bridge));
        if previous.is_some() {
            debug!(target: ROUTER_TARGET, entity = %bridge.id(), "entity replaced");
        }
        bridge
    }

    /// Removes an entity from the registry, from every simulation subscriber
    /// list and from the listener table.
    pub fn destroy_entity(&mut self, id: &str) -> Option<Rc<EntityBridge>> {
        let bridge = self.entities.remove(id)?;
        self.simulation_callbacks.retain(|_, subscribers| {
            subscribers.retain(|subscriber| !Rc::ptr_eq(subscriber, &bridge));
            !subscribers.is_empty()
        });
        self.listeners.retain(|entry| match &entry.listener {
            Listener::Script(owner) => !Rc::ptr_eq(owner, &bridge),
            Listener::Simulation(_) => true,
        });
        debug!(target: ROUTER_TARGET, entity = %id, "entity destroyed");
        Some(bridge)
    }

    /// Creates an entity under a fresh identifier. A script is started for
    /// it only when `script`, `constructor` and `args` are all supplied.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Launch`] if the script cannot start. The entity
    /// stays registered without a script.
    pub fn create_object(
        &mut self,
        script: Option<String>,
        constructor: Option<String>,
        args: Option<Value>,
    ) -> Result<EntityId, HostError> {
        let id = self.generate_identifier();
        let bridge = self.create_entity(id.clone());
        if let Some(bootstrap) = ScriptBootstrap::from_parts(script, constructor, args) {
            bridge.attach_script(self, &bootstrap)?;
        }
        Ok(id)
    }

    /// Entity registered under `id`.
    #[must_use]
    pub fn entity(&self, id: &str) -> Option<Rc<EntityBridge>> {
        self.entities.get(id).cloned()
    }

    /// Number of registered entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // Simulations

    /// Registers a simulation channel under `name` and listens on it.
    ///
    /// A later registration under the same name replaces the earlier
    /// channel, which stops receiving broadcasts and, unless another name
    /// still refers to it, is no longer read.
    pub fn register_simulation(&mut self, channel: Rc<dyn Channel>, name: impl Into<String>) {
        let simulation = name.into();
        debug!(
            target: ROUTER_TARGET,
            simulation = %simulation,
            channel = %channel.id(),
            "simulation registered"
        );
        let replaced = self
            .simulations_by_name
            .insert(simulation.clone(), Rc::clone(&channel));
        if let Some(previous) = replaced.filter(|previous| previous.id() != channel.id()) {
            self.release_simulation_channel(previous.id());
        }
        self.listen(channel, Listener::Simulation(simulation));
    }

    fn release_simulation_channel(&mut self, channel: ChannelId) {
        let still_named = self
            .simulations_by_name
            .values()
            .any(|candidate| candidate.id() == channel);
        if !still_named {
            self.listeners.retain(|entry| entry.channel.id() != channel);
        }
    }

    /// Names of the registered simulations, in name order.
    #[must_use]
    pub fn simulation_names(&self) -> impl Iterator<Item = &str> {
        self.simulations_by_name.keys().map(String::as_str)
    }

    /// Sends `data` to the simulation called `name`, or to every registered
    /// simulation when no name is given. A broadcast reaches each channel
    /// once, even when it is registered under several names. Delivery is
    /// not confirmed; failures are logged.
    pub fn send_to_simulation(&self, data: Value, name: Option<&str>) {
        let Some(simulation) = name else {
            let mut reached = BTreeSet::new();
            for channel in self.simulations_by_name.values() {
                if reached.insert(channel.id()) {
                    deliver(channel.as_ref(), data.clone());
                }
            }
            return;
        };
        match self.simulations_by_name.get(simulation) {
            Some(channel) => deliver(channel.as_ref(), data),
            None => warn!(
                target: ROUTER_TARGET,
                simulation,
                "unknown simulation; dropping message"
            ),
        }
    }

    /// Subscribes `subscriber` to the traffic of simulation `name`.
    pub fn register_simulation_callback(&mut self, name: &str, subscriber: &Rc<EntityBridge>) {
        self.simulation_callbacks
            .entry(name.to_owned())
            .or_default()
            .push(Rc::clone(subscriber));
    }

    /// Removes `subscriber` from the traffic of simulation `name`. Returns
    /// `false` if it was not subscribed. The last subscriber moves into the
    /// vacated slot.
    pub fn unregister_simulation_callback(
        &mut self,
        name: &str,
        subscriber: &Rc<EntityBridge>,
    ) -> bool {
        let Some(subscribers) = self.simulation_callbacks.get_mut(name) else {
            return false;
        };
        let Some(position) = subscribers
            .iter()
            .position(|candidate| Rc::ptr_eq(candidate, subscriber))
        else {
            return false;
        };
        subscribers.swap_remove(position);
        if subscribers.is_empty() {
            self.simulation_callbacks.remove(name);
        }
        true
    }

    /// Current subscribers of simulation `name`, in delivery order.
    #[must_use]
    pub fn subscribers(&self, name: &str) -> &[Rc<EntityBridge>] {
        self.simulation_callbacks
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fans a simulation message out to the subscribers of `name`. Returns
    /// how many scripts received it.
    #[must_use]
    pub fn dispatch_simulation_message(
        &self,
        name: &str,
        channel: &Rc<dyn Channel>,
        data: &Value,
    ) -> usize {
        let mut delivered = 0;
        for subscriber in self.subscribers(name) {
            if subscriber.on_simulation_message(name, channel, data.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    // Session pass-throughs

    /// Opens a presence for `bridge`. A three-component `scale` is an
    /// outdated bounds description and becomes `[0, 0, 0, scale[0]]`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn connect(
        &mut self,
        bridge: &Rc<EntityBridge>,
        mut request: ConnectRequest,
        auth: Option<Value>,
    ) -> Result<(), HostError> {
        if let Some(outdated) = request.normalise_legacy_scale() {
            warn!(
                target: ROUTER_TARGET,
                entity = %bridge.id(),
                space = %request.space,
                ?outdated,
                normalised = ?request.scale,
                "connect request uses outdated bounds; treating first component as radius"
            );
        }
        self.session.connect(bridge, &request, auth)?;
        Ok(())
    }

    /// Closes one of `bridge`'s presences.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn disconnect(
        &mut self,
        bridge: &Rc<EntityBridge>,
        request: &DisconnectRequest,
    ) -> Result<(), HostError> {
        self.session.disconnect(bridge, request)?;
        Ok(())
    }

    /// Sends an application message.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn send_application_message(
        &mut self,
        message: &ApplicationMessageRequest,
    ) -> Result<(), HostError> {
        self.session.send_application_message(message)?;
        Ok(())
    }

    /// Registers a proximity query.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn register_proximity_query(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: f64,
    ) -> Result<(), HostError> {
        self.session.register_proximity_query(space, id, solid_angle)?;
        Ok(())
    }

    /// Updates a presence's location and visual.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn request_location_update(
        &mut self,
        space: &str,
        id: &str,
        location: &Location,
        visual: Option<Value>,
    ) -> Result<(), HostError> {
        self.session
            .request_location_update(space, id, location, visual)?;
        Ok(())
    }

    /// Removes a proximity query.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn request_query_removal(&mut self, space: &str, id: &str) -> Result<(), HostError> {
        self.session.request_query_removal(space, id, None)?;
        Ok(())
    }

    /// Changes the solid angle of a proximity query. With
    /// [`RouterOptions::legacy_query_update`] set, the request is sent as a
    /// query removal carrying the angle instead.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn request_query_update(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: f64,
    ) -> Result<(), HostError> {
        if self.options.legacy_query_update {
            debug!(
                target: ROUTER_TARGET,
                space,
                id,
                solid_angle,
                "legacy query update: forwarding as query removal"
            );
            self.session
                .request_query_removal(space, id, Some(solid_angle))?;
        } else {
            self.session.request_query_update(space, id, solid_angle)?;
        }
        Ok(())
    }

    /// Sets physics parameters of a presence.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn set_physics(&mut self, space: &str, id: &str, data: &Value) -> Result<(), HostError> {
        self.session.set_physics(space, id, data)?;
        Ok(())
    }

    /// Subscribes presence `id` to the objects in `observed`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn subscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), HostError> {
        self.session.subscribe(space, id, observed)?;
        Ok(())
    }

    /// Cancels a subscription of presence `id` to the objects in `observed`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Session`] if the session layer rejects it.
    pub fn unsubscribe(
        &mut self,
        space: &str,
        id: &str,
        observed: &Value,
    ) -> Result<(), HostError> {
        self.session.unsubscribe(space, id, observed)?;
        Ok(())
    }

    // Channels

    pub(crate) fn launch_script(
        &self,
        bootstrap: &ScriptBootstrap,
    ) -> Result<Rc<dyn Channel>, LaunchError> {
        self.launcher.launch(bootstrap)
    }

    /// Makes `listener` the recipient of `channel`'s inbound traffic. A
    /// channel has a single listener; the latest registration wins.
    pub(crate) fn listen(&mut self, channel: Rc<dyn Channel>, listener: Listener) {
        let id = channel.id();
        if let Some(entry) = self
            .listeners
            .iter_mut()
            .find(|entry| entry.channel.id() == id)
        {
            entry.listener = listener;
            return;
        }
        self.listeners.push(ListenerEntry { channel, listener });
    }

    /// Returns `true` if the router reads inbound traffic from `channel`.
    #[must_use]
    pub fn is_listening(&self, channel: ChannelId) -> bool {
        self.listeners
            .iter()
            .any(|entry| entry.channel.id() == channel)
    }

    fn listener_for(&self, channel: ChannelId) -> Option<Listener> {
        self.listeners
            .iter()
            .find(|entry| entry.channel.id() == channel)
            .map(|entry| entry.listener.clone())
    }

    /// Drains every listened-to channel once, in registration order, and
    /// routes each payload to the channel's listener. Returns how many
    /// payloads were routed.
    ///
    /// A channel whose peer has gone away is dropped from the listener table
    /// once its remaining payloads are routed. A closed script channel is
    /// also detached from its entity; a closed simulation is unregistered.
    ///
    /// # Errors
    ///
    /// Stops at the first handler error and returns it; payloads not yet
    /// read stay queued.
    pub fn pump(&mut self) -> Result<usize, HostError> {
        let channels: Vec<Rc<dyn Channel>> = self
            .listeners
            .iter()
            .map(|entry| Rc::clone(&entry.channel))
            .collect();
        let mut routed = 0;
        for channel in channels {
            while let Some(listener) = self.listener_for(channel.id()) {
                match channel.try_recv() {
                    Ok(Some(payload)) => {
                        routed += 1;
                        self.route(listener, &channel, payload)?;
                    }
                    Ok(None) => break,
                    Err(error) => {
                        debug!(target: ROUTER_TARGET, %error, "dropping closed channel");
                        self.forget_channel(channel.id(), &listener);
                        break;
                    }
                }
            }
        }
        if routed > 0 {
            trace!(target: ROUTER_TARGET, routed, "pump pass complete");
        }
        Ok(routed)
    }

    fn forget_channel(&mut self, channel: ChannelId, listener: &Listener) {
        self.listeners.retain(|entry| entry.channel.id() != channel);
        match listener {
            Listener::Script(bridge) => bridge.release_script(channel),
            Listener::Simulation(_) => self
                .simulations_by_name
                .retain(|_, candidate| candidate.id() != channel),
        }
    }

    /// Pumps until a pass routes nothing. Returns the total routed.
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    pub fn run_until_idle(&mut self) -> Result<usize, HostError> {
        let mut total = 0;
        loop {
            let routed = self.pump()?;
            if routed == 0 {
                return Ok(total);
            }
            total += routed;
        }
    }

    fn route(
        &mut self,
        listener: Listener,
        channel: &Rc<dyn Channel>,
        payload: Value,
    ) -> Result<(), HostError> {
        match listener {
            Listener::Script(bridge) => {
                bridge.on_script_message(self, channel, payload)?;
            }
            Listener::Simulation(name) => {
                let delivered = self.dispatch_simulation_message(&name, channel, &payload);
                trace!(
                    target: ROUTER_TARGET,
                    simulation = %name,
                    delivered,
                    "simulation message fanned out"
                );
            }
        }
        Ok(())
    }
}

fn deliver(channel: &dyn Channel, data: Value) {
    if let Err(error) = channel.send(data) {
        warn!(target: ROUTER_TARGET, %error, "simulation unreachable; dropping message");
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("entities", &self.entities.len())
            .field("simulations", &self.simulations_by_name.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.len())
            .field("options", &self.options)
            .field("trusted", &self.trusted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
