//! Unit tests for the router.

use std::io;
use std::sync::{Arc, Mutex};

use mockall::mock;
use mockall::predicate::eq;
use objhost_protocol::ScriptEvent;
use rstest::{fixture, rstest};
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;

use super::*;
use crate::session::SessionError;
use crate::tests::support::{
    RecordingSession, ScriptedLauncher, SessionCall, Simulation, bootstrap, router_with,
};

mock! {
    Session {}
    impl SessionManager for Session {
        fn connect(
            &mut self,
            bridge: &Rc<EntityBridge>,
            request: &ConnectRequest,
            auth: Option<Value>,
        ) -> Result<(), SessionError>;
        fn disconnect(
            &mut self,
            bridge: &Rc<EntityBridge>,
            request: &DisconnectRequest,
        ) -> Result<(), SessionError>;
        fn send_application_message(
            &mut self,
            message: &ApplicationMessageRequest,
        ) -> Result<(), SessionError>;
        fn register_proximity_query(
            &mut self,
            space: &str,
            id: &str,
            solid_angle: f64,
        ) -> Result<(), SessionError>;
        fn request_location_update(
            &mut self,
            space: &str,
            id: &str,
            location: &Location,
            visual: Option<Value>,
        ) -> Result<(), SessionError>;
        fn request_query_removal(
            &mut self,
            space: &str,
            id: &str,
            solid_angle: Option<f64>,
        ) -> Result<(), SessionError>;
        fn request_query_update(
            &mut self,
            space: &str,
            id: &str,
            solid_angle: f64,
        ) -> Result<(), SessionError>;
        fn set_physics(&mut self, space: &str, id: &str, data: &Value) -> Result<(), SessionError>;
        fn subscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), SessionError>;
        fn unsubscribe(&mut self, space: &str, id: &str, observed: &Value) -> Result<(), SessionError>;
    }
}

mock! {
    Launcher {}
    impl ScriptLauncher for Launcher {
        fn launch(&self, bootstrap: &ScriptBootstrap) -> Result<Rc<dyn Channel>, LaunchError>;
    }
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        let buffer = self.0.lock().expect("log buffer lock");
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn with_captured_warnings<T>(action: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, action);
    (result, logs.contents())
}

fn mocked(session: MockSession, options: RouterOptions) -> Router {
    Router::new(
        Box::new(session),
        Box::new(ScriptedLauncher::default()),
        options,
    )
}

#[fixture]
fn session() -> RecordingSession {
    RecordingSession::default()
}

#[fixture]
fn launcher() -> ScriptedLauncher {
    ScriptedLauncher::default()
}

#[fixture]
fn router(session: RecordingSession, launcher: ScriptedLauncher) -> (Router, RecordingSession, ScriptedLauncher) {
    let router = router_with(&session, &launcher, RouterOptions::default());
    (router, session, launcher)
}

// Identifiers and entities

#[rstest]
#[case(1)]
#[case(3)]
#[case(12)]
fn identifiers_count_up_from_one(#[case] count: u64) {
    let mut router = router_with(
        &RecordingSession::default(),
        &ScriptedLauncher::default(),
        RouterOptions::default(),
    );

    let generated: Vec<EntityId> = (0..count).map(|_| router.generate_identifier()).collect();

    let expected: Vec<EntityId> = (1..=count).map(|n| EntityId::from(n.to_string())).collect();
    assert_eq!(generated, expected);
}

#[rstest]
fn duplicate_entities_keep_the_latest(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;

    let first = router.create_entity("7");
    let second = router.create_entity("7");

    let registered = router.entity("7").expect("entity 7 registered");
    assert!(Rc::ptr_eq(&registered, &second));
    assert!(!Rc::ptr_eq(&registered, &first));
    assert_eq!(router.entity_count(), 1);
}

#[test]
fn new_routers_have_no_entities() {
    let router = router_with(
        &RecordingSession::default(),
        &ScriptedLauncher::default(),
        RouterOptions::default(),
    );
    assert_eq!(router.entity_count(), 0);
    assert!(router.trusted_entity().is_none());
}

#[rstest]
fn start_creates_the_trusted_entity(session: RecordingSession, launcher: ScriptedLauncher) {
    let router = Router::start(
        Box::new(session),
        Box::new(launcher.clone()),
        RouterOptions::default(),
        Some(&bootstrap("Avatar")),
    )
    .expect("router starts");

    let trusted = router.trusted_entity().expect("trusted entity").clone();
    assert_eq!(trusted.as_str(), "1");
    let entity = router.entity("1").expect("entity 1 registered");
    assert!(entity.has_script());
    assert_eq!(launcher.launched(), vec![bootstrap("Avatar")]);
}

#[rstest]
fn start_without_bootstrap_leaves_trusted_entity_idle(
    session: RecordingSession,
    launcher: ScriptedLauncher,
) {
    let mut router = Router::start(
        Box::new(session),
        Box::new(launcher.clone()),
        RouterOptions::default(),
        None,
    )
    .expect("router starts");

    let entity = router.entity("1").expect("entity 1 registered");
    assert!(!entity.has_script());
    assert!(launcher.launched().is_empty());
    assert_eq!(router.generate_identifier().as_str(), "2");
}

#[test]
fn start_reports_launch_failures() {
    let mut launcher = MockLauncher::new();
    launcher.expect_launch().once().returning(|bootstrap| {
        Err(LaunchError::Rejected {
            script: bootstrap.script.clone(),
            reason: String::from("sandbox unavailable"),
        })
    });

    let error = Router::start(
        Box::new(RecordingSession::default()),
        Box::new(launcher),
        RouterOptions::default(),
        Some(&bootstrap("Avatar")),
    )
    .expect_err("launch failure propagates");

    assert!(matches!(error, HostError::Launch(LaunchError::Rejected { .. })));
}

#[rstest]
fn create_object_with_a_full_bootstrap_runs_a_script(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, launcher) = router;

    let id = router
        .create_object(
            Some(String::from("child.js")),
            Some(String::from("Child")),
            Some(json!({"colour": "red"})),
        )
        .expect("object created");

    assert_eq!(id.as_str(), "1");
    let child = router.entity("1").expect("child registered");
    assert!(child.has_script());
    let channel = child.script_channel().expect("script channel");
    assert!(router.is_listening(channel.id()));
    assert_eq!(
        launcher.launched(),
        vec![ScriptBootstrap::new("child.js", "Child", json!({"colour": "red"}))]
    );
}

#[rstest]
#[case(None, Some("Child"), Some(json!({})))]
#[case(Some("child.js"), None, Some(json!({})))]
#[case(Some("child.js"), Some("Child"), None)]
fn create_object_without_a_full_bootstrap_runs_nothing(
    router: (Router, RecordingSession, ScriptedLauncher),
    #[case] script: Option<&str>,
    #[case] constructor: Option<&str>,
    #[case] args: Option<Value>,
) {
    let (mut router, _, launcher) = router;

    let id = router
        .create_object(script.map(str::to_owned), constructor.map(str::to_owned), args)
        .expect("object created");

    let entity = router.entity(id.as_str()).expect("entity registered");
    assert!(!entity.has_script());
    assert!(launcher.launched().is_empty());
}

#[rstest]
fn create_object_keeps_the_entity_when_launch_fails(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, launcher) = router;
    launcher.reject("quota exceeded");

    let error = router
        .create_object(
            Some(String::from("child.js")),
            Some(String::from("Child")),
            Some(json!(null)),
        )
        .expect_err("launch fails");

    assert!(matches!(error, HostError::Launch(_)));
    let entity = router.entity("1").expect("entity stays registered");
    assert!(!entity.has_script());
}

#[rstest]
fn destroy_entity_removes_every_reference(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let id = router
        .create_object(
            Some(String::from("a.js")),
            Some(String::from("A")),
            Some(json!({})),
        )
        .expect("object created");
    let entity = router.entity(id.as_str()).expect("entity registered");
    let channel = entity.script_channel().expect("script channel");
    router.register_simulation_callback("graphics", &entity);

    let removed = router.destroy_entity(id.as_str()).expect("entity removed");

    assert!(Rc::ptr_eq(&removed, &entity));
    assert!(router.entity(id.as_str()).is_none());
    assert!(router.subscribers("graphics").is_empty());
    assert!(!router.is_listening(channel.id()));
    assert!(router.destroy_entity(id.as_str()).is_none());
}

// Simulations

#[rstest]
fn unregistering_keeps_the_other_subscriber(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let a = router.create_entity("a");
    let b = router.create_entity("b");
    router.register_simulation_callback("graphics", &a);
    router.register_simulation_callback("graphics", &b);

    assert!(router.unregister_simulation_callback("graphics", &a));

    let remaining = router.subscribers("graphics");
    assert_eq!(remaining.len(), 1);
    assert!(Rc::ptr_eq(&remaining[0], &b));
}

#[rstest]
fn removal_moves_the_last_subscriber_into_the_gap(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, _) = router;
    let a = router.create_entity("a");
    let b = router.create_entity("b");
    let c = router.create_entity("c");
    for subscriber in [&a, &b, &c] {
        router.register_simulation_callback("graphics", subscriber);
    }

    router.unregister_simulation_callback("graphics", &a);

    let order: Vec<&str> = router
        .subscribers("graphics")
        .iter()
        .map(|subscriber| subscriber.id().as_str())
        .collect();
    assert_eq!(order, vec!["c", "b"]);
}

#[rstest]
fn unregistering_an_absent_subscriber_is_a_no_op(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, _) = router;
    let a = router.create_entity("a");
    let b = router.create_entity("b");
    router.register_simulation_callback("graphics", &a);

    assert!(!router.unregister_simulation_callback("graphics", &b));
    assert!(!router.unregister_simulation_callback("physics", &a));
    assert_eq!(router.subscribers("graphics").len(), 1);
}

#[rstest]
fn emptied_subscriber_lists_are_dropped(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let a = router.create_entity("a");
    router.register_simulation_callback("graphics", &a);

    assert!(router.unregister_simulation_callback("graphics", &a));
    assert!(router.subscribers("graphics").is_empty());
    assert!(!router.unregister_simulation_callback("graphics", &a));
}

#[rstest]
fn named_sends_reach_one_simulation(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let graphics = Simulation::register(&mut router, "graphics");
    let physics = Simulation::register(&mut router, "physics");

    router.send_to_simulation(json!({"frame": 1}), Some("graphics"));

    assert_eq!(graphics.remote.drain(), vec![json!({"frame": 1})]);
    assert!(physics.remote.drain().is_empty());
}

#[rstest]
fn unnamed_sends_reach_every_simulation(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let graphics = Simulation::register(&mut router, "graphics");
    let physics = Simulation::register(&mut router, "physics");

    router.send_to_simulation(json!({"tick": 2}), None);

    assert_eq!(graphics.remote.drain(), vec![json!({"tick": 2})]);
    assert_eq!(physics.remote.drain(), vec![json!({"tick": 2})]);
}

#[rstest]
fn broadcasts_reach_each_registered_simulation_once(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, _) = router;
    let graphics = Simulation::new();
    router.register_simulation(Rc::clone(&graphics.channel), "graphics");
    router.register_simulation(Rc::clone(&graphics.channel), "graphics");
    let replaced = Simulation::register(&mut router, "physics");
    let current = Simulation::register(&mut router, "physics");

    router.send_to_simulation(json!({"tick": 1}), None);

    assert_eq!(graphics.remote.drain(), vec![json!({"tick": 1})]);
    assert!(replaced.remote.drain().is_empty());
    assert_eq!(current.remote.drain(), vec![json!({"tick": 1})]);
    assert!(!router.is_listening(replaced.channel.id()));
    assert!(router.is_listening(current.channel.id()));
}

#[rstest]
fn a_channel_registered_under_two_names_gets_one_broadcast(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, _) = router;
    let shared = Simulation::new();
    router.register_simulation(Rc::clone(&shared.channel), "graphics");
    router.register_simulation(Rc::clone(&shared.channel), "hud");

    router.send_to_simulation(json!({"tick": 2}), None);
    router.send_to_simulation(json!({"frame": 3}), Some("graphics"));

    assert_eq!(
        shared.remote.drain(),
        vec![json!({"tick": 2}), json!({"frame": 3})]
    );
}

#[rstest]
fn sends_to_unknown_simulations_are_dropped(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let graphics = Simulation::register(&mut router, "graphics");

    let ((), logs) = with_captured_warnings(|| {
        router.send_to_simulation(json!({"frame": 1}), Some("audio"));
    });

    assert!(graphics.remote.drain().is_empty());
    assert!(logs.contains("unknown simulation"), "logs: {logs}");
}

#[rstest]
fn simulation_names_are_listed_in_order(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let _physics = Simulation::register(&mut router, "physics");
    let _graphics = Simulation::register(&mut router, "graphics");

    let names: Vec<&str> = router.simulation_names().collect();
    assert_eq!(names, vec!["graphics", "physics"]);
}

#[rstest]
fn simulation_traffic_fans_out_to_subscribers(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, launcher) = router;
    let graphics = Simulation::register(&mut router, "graphics");
    let first = router.create_entity("first");
    let second = router.create_entity("second");
    first.attach_script(&mut router, &bootstrap("First")).expect("attach first");
    second.attach_script(&mut router, &bootstrap("Second")).expect("attach second");
    router.register_simulation_callback("graphics", &first);
    router.register_simulation_callback("graphics", &second);

    graphics.remote.send(json!({"clicked": "door"})).expect("simulation sends");
    let routed = router.pump().expect("pump");

    assert_eq!(routed, 1);
    assert_eq!(launcher.received(0), vec![json!({"clicked": "door"})]);
    assert_eq!(launcher.received(1), vec![json!({"clicked": "door"})]);
}

#[rstest]
fn fan_out_counts_deliveries(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let graphics = Simulation::register(&mut router, "graphics");
    let scripted = router.create_entity("scripted");
    scripted
        .attach_script(&mut router, &bootstrap("Scripted"))
        .expect("attach");
    let idle = router.create_entity("idle");
    router.register_simulation_callback("graphics", &scripted);
    router.register_simulation_callback("graphics", &idle);

    let delivered = router.dispatch_simulation_message("graphics", &graphics.channel, &json!(1));

    assert_eq!(delivered, 1);
}

// Session pass-throughs

#[test]
fn connect_normalises_outdated_scale() {
    let mut session = MockSession::new();
    session
        .expect_connect()
        .withf(|_, request, auth| {
            request.space == "S1" && request.scale == vec![0.0, 0.0, 0.0, 1.0] && auth.is_none()
        })
        .once()
        .returning(|_, _, _| Ok(()));
    let mut router = mocked(session, RouterOptions::default());
    let entity = router.create_entity("a");
    let request: ConnectRequest =
        serde_json::from_value(json!({"space": "S1", "scale": [1.0, 2.0, 3.0]}))
            .expect("connect request");

    let (result, logs) = with_captured_warnings(|| router.connect(&entity, request, None));

    result.expect("connect forwarded");
    assert!(logs.contains("outdated bounds"), "logs: {logs}");
}

#[test]
fn connect_leaves_current_scale_alone() {
    let mut session = MockSession::new();
    session
        .expect_connect()
        .withf(|_, request, auth| {
            request.scale == vec![0.0, 0.0, 0.0, 5.0] && auth == &Some(json!({"token": "t"}))
        })
        .once()
        .returning(|_, _, _| Ok(()));
    let mut router = mocked(session, RouterOptions::default());
    let entity = router.create_entity("a");
    let request: ConnectRequest =
        serde_json::from_value(json!({"space": "S1", "scale": [0.0, 0.0, 0.0, 5.0]}))
            .expect("connect request");

    let (result, logs) =
        with_captured_warnings(|| router.connect(&entity, request, Some(json!({"token": "t"}))));

    result.expect("connect forwarded");
    assert!(logs.is_empty(), "logs: {logs}");
}

#[test]
fn query_update_is_forwarded_as_an_update() {
    let mut session = MockSession::new();
    session
        .expect_request_query_update()
        .with(eq("S1"), eq("Q1"), eq(0.25))
        .once()
        .returning(|_, _, _| Ok(()));
    session.expect_request_query_removal().never();
    let mut router = mocked(session, RouterOptions::default());

    router
        .request_query_update("S1", "Q1", 0.25)
        .expect("update forwarded");
}

#[test]
fn legacy_query_update_is_forwarded_as_a_removal() {
    let mut session = MockSession::new();
    session
        .expect_request_query_removal()
        .with(eq("S1"), eq("Q1"), eq(Some(0.25)))
        .once()
        .returning(|_, _, _| Ok(()));
    session.expect_request_query_update().never();
    let options = RouterOptions {
        legacy_query_update: true,
        ..RouterOptions::default()
    };
    let mut router = mocked(session, options);

    router
        .request_query_update("S1", "Q1", 0.25)
        .expect("removal forwarded");
}

#[test]
fn query_removal_carries_no_angle() {
    let mut session = MockSession::new();
    session
        .expect_request_query_removal()
        .with(eq("S1"), eq("Q1"), eq(None))
        .once()
        .returning(|_, _, _| Ok(()));
    let mut router = mocked(session, RouterOptions::default());

    router
        .request_query_removal("S1", "Q1")
        .expect("removal forwarded");
}

#[test]
fn session_errors_propagate() {
    let mut session = MockSession::new();
    session.expect_set_physics().once().returning(|_, _, _| {
        Err(SessionError::NotConnected {
            space: String::from("S9"),
        })
    });
    let mut router = mocked(session, RouterOptions::default());

    let error = router
        .set_physics("S9", "P1", &json!({"mass": 2}))
        .expect_err("session error propagates");

    assert!(matches!(
        error,
        HostError::Session(SessionError::NotConnected { .. })
    ));
}

#[rstest]
fn pass_throughs_reach_the_session(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, _) = router;
    let location = Location {
        pos: Some([1.0, 2.0, 3.0]),
        ..Location::default()
    };

    router
        .register_proximity_query("S1", "Q1", 0.5)
        .expect("query");
    router
        .request_location_update("S1", "P1", &location, Some(json!({"mesh": "cube"})))
        .expect("location");
    router
        .subscribe("S1", "P1", &json!(["P2", "P3"]))
        .expect("subscribe");
    router
        .unsubscribe("S1", "P1", &json!(["P2", "P3"]))
        .expect("unsubscribe");

    assert_eq!(
        session.calls(),
        vec![
            SessionCall::RegisterQuery {
                space: String::from("S1"),
                id: String::from("Q1"),
                solid_angle: 0.5,
            },
            SessionCall::LocationUpdate {
                space: String::from("S1"),
                id: String::from("P1"),
                location,
                visual: Some(json!({"mesh": "cube"})),
            },
            SessionCall::Subscribe {
                space: String::from("S1"),
                id: String::from("P1"),
                observed: json!(["P2", "P3"]),
            },
            SessionCall::Unsubscribe {
                space: String::from("S1"),
                id: String::from("P1"),
                observed: json!(["P2", "P3"]),
            },
        ]
    );
}

// Pumping

#[rstest]
fn pump_routes_script_requests_in_order(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, launcher) = router;
    let entity = router.create_entity("a");
    entity
        .attach_script(&mut router, &bootstrap("A"))
        .expect("attach");
    launcher.send_from(0, json!({"__type": "query", "space": "S1", "id": "Q1", "angle": 0.5}));
    launcher.send_from(0, json!({"__type": "query_removal", "space": "S1", "id": "Q1"}));
    launcher.send_from(0, json!({"__type": "teleport", "space": "S1"}));

    let routed = router.pump().expect("pump");

    assert_eq!(routed, 3);
    assert_eq!(
        session.calls(),
        vec![
            SessionCall::RegisterQuery {
                space: String::from("S1"),
                id: String::from("Q1"),
                solid_angle: 0.5,
            },
            SessionCall::QueryRemoval {
                space: String::from("S1"),
                id: String::from("Q1"),
                solid_angle: None,
            },
        ]
    );
    assert_eq!(router.pump().expect("second pump"), 0);
}

#[rstest]
fn pump_stops_at_malformed_requests(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, launcher) = router;
    let entity = router.create_entity("a");
    entity
        .attach_script(&mut router, &bootstrap("A"))
        .expect("attach");
    launcher.send_from(0, json!({"__type": "query", "space": "S1"}));
    launcher.send_from(0, json!({"__type": "physics", "space": "S1", "id": "P1"}));

    let error = router.pump().expect_err("malformed query");
    assert!(matches!(error, HostError::Protocol(_)));
    assert!(session.calls().is_empty());

    assert_eq!(router.pump().expect("remaining payload"), 1);
    assert_eq!(session.calls().len(), 1);
}

#[rstest]
fn replaced_scripts_are_still_heard(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, launcher) = router;
    let entity = router.create_entity("a");
    entity
        .attach_script(&mut router, &bootstrap("Old"))
        .expect("attach old");
    entity
        .attach_script(&mut router, &bootstrap("New"))
        .expect("attach new");

    launcher.send_from(0, json!({"__type": "subscription", "space": "S1", "id": "P1", "observed": "P2", "enable": true}));
    router.pump().expect("pump");

    assert_eq!(session.calls().len(), 1);
    let event = ScriptEvent::Disconnected {
        space: String::from("S1"),
    };
    assert!(entity.force_disconnected("S1").expect("encode"));
    assert!(launcher.received(0).is_empty());
    assert_eq!(
        launcher.received(1),
        vec![event.to_payload().expect("encode")]
    );
}

#[rstest]
fn ended_scripts_are_routed_then_forgotten(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, launcher) = router;
    let entity = router.create_entity("a");
    entity
        .attach_script(&mut router, &bootstrap("A"))
        .expect("attach");
    let channel = entity.script_channel().expect("script attached");
    launcher.send_from(0, json!({"__type": "query", "space": "S1", "id": "Q1", "angle": 0.5}));
    launcher.terminate(0);

    assert_eq!(router.pump().expect("pump"), 1);

    assert_eq!(session.calls().len(), 1);
    assert!(!router.is_listening(channel.id()));
    assert!(!entity.has_script());
    assert_eq!(router.pump().expect("idle pump"), 0);
}

#[rstest]
fn ended_replaced_scripts_leave_the_current_script_attached(
    router: (Router, RecordingSession, ScriptedLauncher),
) {
    let (mut router, _, launcher) = router;
    let entity = router.create_entity("a");
    entity
        .attach_script(&mut router, &bootstrap("Old"))
        .expect("attach old");
    let old = entity.script_channel().expect("old script");
    entity
        .attach_script(&mut router, &bootstrap("New"))
        .expect("attach new");
    let new = entity.script_channel().expect("new script");

    launcher.terminate(0);
    router.pump().expect("pump");

    assert!(!router.is_listening(old.id()));
    assert!(router.is_listening(new.id()));
    assert_eq!(
        entity.script_channel().map(|channel| channel.id()),
        Some(new.id())
    );
}

#[rstest]
fn ended_simulations_are_unregistered(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, _, _) = router;
    let Simulation { channel, remote } = Simulation::register(&mut router, "physics");
    let graphics = Simulation::register(&mut router, "graphics");
    drop(remote);

    router.pump().expect("pump");

    assert!(!router.is_listening(channel.id()));
    assert!(router.is_listening(graphics.channel.id()));
    let names: Vec<&str> = router.simulation_names().collect();
    assert_eq!(names, vec!["graphics"]);
}

#[rstest]
fn run_until_idle_follows_child_scripts(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, launcher) = router;
    let parent = router.create_entity("parent");
    parent
        .attach_script(&mut router, &bootstrap("Parent"))
        .expect("attach");
    launcher.send_from(
        0,
        json!({"__type": "create_object", "script": "child.js", "constructor": "Child", "args": {}}),
    );

    assert_eq!(router.run_until_idle().expect("first run"), 1);
    assert_eq!(launcher.launched().len(), 2);

    launcher.send_from(1, json!({"__type": "physics", "space": "S1", "id": "C1", "data": {"mass": 1}}));
    assert_eq!(router.run_until_idle().expect("second run"), 1);
    assert_eq!(
        session.calls(),
        vec![SessionCall::Physics {
            space: String::from("S1"),
            id: String::from("C1"),
            data: json!({"mass": 1}),
        }]
    );
}

#[rstest]
fn session_failures_surface_from_pump(router: (Router, RecordingSession, ScriptedLauncher)) {
    let (mut router, session, launcher) = router;
    let entity = router.create_entity("a");
    entity
        .attach_script(&mut router, &bootstrap("A"))
        .expect("attach");
    session.fail_with(SessionError::Failed {
        operation: "subscribe",
        message: String::from("space offline"),
    });
    launcher.send_from(0, json!({"__type": "subscription", "space": "S1", "id": "P1", "observed": "P2", "enable": true}));

    let error = router.pump().expect_err("session failure propagates");
    assert!(matches!(error, HostError::Session(SessionError::Failed { .. })));
}
