//! Default script handlers: one per script-originated message type, each
//! forwarding to the matching router operation.

use std::rc::Rc;

use objhost_protocol::{ScriptMessageType, ScriptRequest};
use serde_json::{Map, Value};
use tracing::debug;

use super::{BRIDGE_TARGET, EntityBridge, GUI_KEY};
use crate::channel::Channel;
use crate::dispatch::Handler;
use crate::error::HostError;
use crate::router::Router;

type HandlerFn =
    fn(&EntityBridge, &mut Router, &Rc<dyn Channel>, &ScriptRequest) -> Result<(), HostError>;

/// Extracts the expected request variant, or fails with
/// [`HostError::MismatchedHandler`].
macro_rules! unpack {
    ($message:expr, $variant:ident) => {
        match $message {
            ScriptRequest::$variant(request) => request,
            other => {
                return Err(HostError::MismatchedHandler {
                    expected: ScriptMessageType::$variant,
                    actual: other.message_type(),
                });
            }
        }
    };
}

fn entry(
    message_type: ScriptMessageType,
    handler: HandlerFn,
) -> (ScriptMessageType, Handler<EntityBridge>) {
    (message_type, Box::new(handler))
}

/// Handler table installed on every new entity.
pub(super) fn defaults() -> Vec<(ScriptMessageType, Handler<EntityBridge>)> {
    vec![
        entry(ScriptMessageType::Connect, connect),
        entry(ScriptMessageType::Disconnect, disconnect),
        entry(ScriptMessageType::SendMessage, send_message),
        entry(ScriptMessageType::Query, query),
        entry(ScriptMessageType::QueryUpdate, query_update),
        entry(ScriptMessageType::QueryRemoval, query_removal),
        entry(ScriptMessageType::Location, location),
        entry(ScriptMessageType::Subscription, subscription),
        entry(ScriptMessageType::Physics, physics),
        entry(ScriptMessageType::CreateObject, create_object),
        entry(ScriptMessageType::Graphics, graphics),
        entry(ScriptMessageType::EnableGui, enable_gui),
        entry(ScriptMessageType::DisableGui, disable_gui),
        entry(ScriptMessageType::Gui, gui),
    ]
}

fn connect(
    bridge: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Connect);
    let handle = bridge.handle()?;
    router.connect(&handle, request.clone(), request.auth.clone())
}

fn disconnect(
    bridge: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Disconnect);
    let handle = bridge.handle()?;
    router.disconnect(&handle, request)
}

fn send_message(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, SendMessage);
    router.send_application_message(request)
}

fn query(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Query);
    router.register_proximity_query(&request.space, &request.id, request.solid_angle)
}

fn query_update(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, QueryUpdate);
    router.request_query_update(&request.space, &request.id, request.solid_angle)
}

fn query_removal(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, QueryRemoval);
    router.request_query_removal(&request.space, &request.id)
}

fn location(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Location);
    router.request_location_update(
        &request.space,
        &request.id,
        &request.location,
        request.visual.clone(),
    )
}

fn subscription(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Subscription);
    if request.enable {
        router.subscribe(&request.space, &request.id, &request.observed)
    } else {
        router.unsubscribe(&request.space, &request.id, &request.observed)
    }
}

fn physics(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Physics);
    router.set_physics(&request.space, &request.id, &request.data)
}

fn create_object(
    bridge: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, CreateObject);
    let created = router.create_object(
        request.script.clone(),
        request.constructor.clone(),
        request.args.clone(),
    )?;
    debug!(
        target: BRIDGE_TARGET,
        entity = %bridge.id(),
        %created,
        "child entity created"
    );
    Ok(())
}

fn graphics(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, Graphics);
    router.send_to_simulation(message.to_payload()?, request.target());
    Ok(())
}

fn enable_gui(
    bridge: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, EnableGui);
    let simulation = request
        .simulation
        .as_deref()
        .unwrap_or_else(|| bridge.gui_simulation());
    router.register_simulation_callback(simulation, &bridge.handle()?);
    Ok(())
}

fn disable_gui(
    bridge: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    let request = unpack!(message, DisableGui);
    let simulation = request
        .simulation
        .as_deref()
        .unwrap_or_else(|| bridge.gui_simulation());
    let removed = router.unregister_simulation_callback(simulation, &bridge.handle()?);
    if !removed {
        debug!(
            target: BRIDGE_TARGET,
            entity = %bridge.id(),
            simulation,
            "entity was not subscribed"
        );
    }
    Ok(())
}

fn gui(
    _: &EntityBridge,
    router: &mut Router,
    _: &Rc<dyn Channel>,
    message: &ScriptRequest,
) -> Result<(), HostError> {
    unpack!(message, Gui);
    let mut wrapped = Map::new();
    wrapped.insert(GUI_KEY.to_owned(), message.to_payload()?);
    router.send_to_simulation(Value::Object(wrapped), None);
    Ok(())
}
