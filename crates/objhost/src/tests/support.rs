//! Test doubles shared by the unit and behavioural tests.

use std::cell::RefCell;
use std::rc::Rc;

use objhost_protocol::{ApplicationMessageRequest, ConnectRequest, DisconnectRequest, Location};
use serde_json::Value;

use crate::bridge::{EntityBridge, EntityId};
use crate::channel::{Channel, RemoteEndpoint, local_channel};
use crate::router::{Router, RouterOptions};
use crate::sandbox::{LaunchError, ScriptBootstrap, ScriptLauncher};
use crate::session::{SessionError, SessionManager};

/// A call observed by [`RecordingSession`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionCall {
    Connect {
        entity: EntityId,
        space: String,
        scale: Vec<f64>,
        auth: Option<Value>,
    },
    Disconnect {
        entity: EntityId,
        space: String,
        id: String,
    },
    SendMessage(ApplicationMessageRequest),
    RegisterQuery {
        space: String,
        id: String,
        solid_angle: f64,
    },
    LocationUpdate {
        space: String,
        id: String,
        location: Location,
        visual: Option<Value>,
    },
    QueryRemoval {
        space: String,
        id: String,
        solid_angle: Option<f64>,
    },
    QueryUpdate {
        space: String,
        id: String,
        solid_angle: f64,
    },
    Physics {
        space: String,
        id: String,
        data: Value,
    },
    Subscribe {
        space: String,
        id: String,
        observed: Value,
    },
    Unsubscribe {
        space: String,
        id: String,
        observed: Value,
    },
}

/// Session layer that records every call. Clones share the record, so a
/// test keeps one clone after handing another to the router.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSession {
    calls: Rc<RefCell<Vec<SessionCall>>>,
    connected: Rc<RefCell<Vec<Rc<EntityBridge>>>>,
    failure: Rc<RefCell<Option<SessionError>>>,
}

impl RecordingSession {
    pub(crate) fn calls(&self) -> Vec<SessionCall> {
        self.calls.borrow().clone()
    }

    /// Bridges handed to `connect`, in call order.
    pub(crate) fn connected(&self) -> Vec<Rc<EntityBridge>> {
        self.connected.borrow().clone()
    }

    /// Makes every later call fail with `error`.
    pub(crate) fn fail_with(&self, error: SessionError) {
        *self.failure.borrow_mut() = Some(error);
    }

    fn record(&self, call: SessionCall) -> Result<(), SessionError> {
        if let Some(error) = self.failure.borrow().clone() {
            return Err(error);
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl SessionManager for RecordingSession {
    fn connect(
        &mut self,
        bridge: &Rc<EntityBridge>,
        request: &ConnectRequest,
        auth: Option<Value>,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::Connect {
            entity: bridge.id().clone(),
            space: request.space.clone(),
            scale: request.scale.clone(),
            auth,
        })?;
        self.connected.borrow_mut().push(Rc::clone(bridge));
        Ok(())
    }

    fn disconnect(
        &mut self,
        bridge: &Rc<EntityBridge>,
        request: &DisconnectRequest,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::Disconnect {
            entity: bridge.id().clone(),
            space: request.space.clone(),
            id: request.id.clone(),
        })
    }

    fn send_application_message(
        &mut self,
        message: &ApplicationMessageRequest,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::SendMessage(message.clone()))
    }

    fn register_proximity_query(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: f64,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::RegisterQuery {
            space: space.to_owned(),
            id: id.to_owned(),
            solid_angle,
        })
    }

    fn request_location_update(
        &mut self,
        space: &str,
        id: &str,
        location: &Location,
        visual: Option<Value>,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::LocationUpdate {
            space: space.to_owned(),
            id: id.to_owned(),
            location: location.clone(),
            visual,
        })
    }

    fn request_query_removal(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: Option<f64>,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::QueryRemoval {
            space: space.to_owned(),
            id: id.to_owned(),
            solid_angle,
        })
    }

    fn request_query_update(
        &mut self,
        space: &str,
        id: &str,
        solid_angle: f64,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::QueryUpdate {
            space: space.to_owned(),
            id: id.to_owned(),
            solid_angle,
        })
    }

    fn set_physics(&mut self, space: &str, id: &str, data: &Value) -> Result<(), SessionError> {
        self.record(SessionCall::Physics {
            space: space.to_owned(),
            id: id.to_owned(),
            data: data.clone(),
        })
    }

    fn subscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), SessionError> {
        self.record(SessionCall::Subscribe {
            space: space.to_owned(),
            id: id.to_owned(),
            observed: observed.clone(),
        })
    }

    fn unsubscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), SessionError> {
        self.record(SessionCall::Unsubscribe {
            space: space.to_owned(),
            id: id.to_owned(),
            observed: observed.clone(),
        })
    }
}

/// Launcher that runs nothing. Each launch hands back the host end of a
/// fresh in-process channel and keeps the remote end, so a test can play
/// the part of the script.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedLauncher {
    scripts: Rc<RefCell<Vec<(ScriptBootstrap, Option<RemoteEndpoint>)>>>,
    rejection: Rc<RefCell<Option<String>>>,
}

impl ScriptedLauncher {
    /// Makes every later launch fail.
    pub(crate) fn reject(&self, reason: &str) {
        *self.rejection.borrow_mut() = Some(reason.to_owned());
    }

    pub(crate) fn launched(&self) -> Vec<ScriptBootstrap> {
        self.scripts
            .borrow()
            .iter()
            .map(|(bootstrap, _)| bootstrap.clone())
            .collect()
    }

    /// Sends `payload` to the host as the script of launch `index`.
    pub(crate) fn send_from(&self, index: usize, payload: Value) {
        self.with_remote(index, |remote| {
            remote.send(payload).expect("host end is open");
        });
    }

    /// Payloads the host has sent to the script of launch `index`.
    pub(crate) fn received(&self, index: usize) -> Vec<Value> {
        self.with_remote(index, RemoteEndpoint::drain)
    }

    /// Ends the script of launch `index` by dropping its end of the channel.
    pub(crate) fn terminate(&self, index: usize) {
        let mut scripts = self.scripts.borrow_mut();
        let Some((_, remote)) = scripts.get_mut(index) else {
            panic!("no script launched at index {index}");
        };
        *remote = None;
    }

    fn with_remote<T>(&self, index: usize, action: impl FnOnce(&RemoteEndpoint) -> T) -> T {
        let scripts = self.scripts.borrow();
        let Some((_, Some(remote))) = scripts.get(index) else {
            panic!("no running script at launch index {index}");
        };
        action(remote)
    }
}

impl ScriptLauncher for ScriptedLauncher {
    fn launch(&self, bootstrap: &ScriptBootstrap) -> Result<Rc<dyn Channel>, LaunchError> {
        if let Some(reason) = self.rejection.borrow().clone() {
            return Err(LaunchError::Rejected {
                script: bootstrap.script.clone(),
                reason,
            });
        }
        let (host, remote) = local_channel();
        self.scripts
            .borrow_mut()
            .push((bootstrap.clone(), Some(remote)));
        Ok(Rc::new(host))
    }
}

/// A simulation played by the test: the router owns `channel`, the test
/// reads and writes through `remote`.
pub(crate) struct Simulation {
    pub(crate) channel: Rc<dyn Channel>,
    pub(crate) remote: RemoteEndpoint,
}

impl Simulation {
    pub(crate) fn new() -> Self {
        let (host, remote) = local_channel();
        Self {
            channel: Rc::new(host),
            remote,
        }
    }

    pub(crate) fn register(router: &mut Router, name: &str) -> Self {
        let simulation = Self::new();
        router.register_simulation(Rc::clone(&simulation.channel), name);
        simulation
    }
}

/// Router over a recording session and a scripted launcher.
pub(crate) fn router_with(
    session: &RecordingSession,
    launcher: &ScriptedLauncher,
    options: RouterOptions,
) -> Router {
    Router::new(Box::new(session.clone()), Box::new(launcher.clone()), options)
}

pub(crate) fn bootstrap(class: &str) -> ScriptBootstrap {
    ScriptBootstrap::new(format!("scripts/{}.js", class.to_lowercase()), class, Value::Null)
}
