//! Object host message router.
//!
//! The object host runs world entities whose behaviour is written as
//! sandboxed scripts. Each entity is an [`EntityBridge`]: it receives plain
//! payloads from its script, restores their typed form and dispatches them
//! through a per-entity [`Dispatcher`] to the [`Router`], which forwards
//! them to the [`SessionManager`] or to the registered simulations. Results
//! flow back the other way as script messages.
//!
//! Scripts and simulations run in their own contexts and are reached only
//! through [`Channel`]s; the router drains them with [`Router::pump`] on a
//! single control thread.

pub mod bootstrap;
pub mod bridge;
pub mod channel;
pub mod dispatch;
pub mod error;
pub mod router;
pub mod sandbox;
pub mod session;
pub mod telemetry;

pub use self::bootstrap::{BootstrapError, ConfigLoader, Host, SystemConfigLoader, bootstrap_with};
pub use self::bridge::{EntityBridge, EntityId, GUI_KEY};
pub use self::channel::{Channel, ChannelError, ChannelId, LocalChannel, RemoteEndpoint, local_channel};
pub use self::dispatch::{DispatchOutcome, Dispatcher, Handler, MessageReceiver, TypedMessage};
pub use self::error::HostError;
pub use self::router::{Router, RouterOptions};
pub use self::sandbox::{
    LaunchError, ScriptBootstrap, ScriptLauncher, ScriptRuntime, ThreadLauncher,
};
pub use self::session::{SessionError, SessionManager};

#[cfg(test)]
mod tests;
