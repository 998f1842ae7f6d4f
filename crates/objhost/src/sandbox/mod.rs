//! Script launching.
//!
//! Each entity runs at most one script in an isolated context and talks to
//! it over a [`Channel`]. The router only knows how to ask a
//! [`ScriptLauncher`] for a channel; how the script is hosted is up to the
//! launcher. [`ThreadLauncher`] runs a [`ScriptRuntime`] on a dedicated
//! thread with the remote end of a [`local_channel`].
//!
//! The launcher abstraction lets tests substitute a double that hands back
//! a scripted channel without running anything.

use std::rc::Rc;
use std::sync::Arc;
use std::{io, thread};

use objhost_config::BootstrapSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::channel::{Channel, RemoteEndpoint, local_channel};

const SANDBOX_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sandbox");

/// Script to run for an entity: a source reference, the constructor to
/// instantiate and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptBootstrap {
    /// Script source reference.
    pub script: String,
    /// Constructor name.
    pub class: String,
    /// Constructor arguments.
    pub args: Value,
}

impl ScriptBootstrap {
    /// Creates a bootstrap description.
    #[must_use]
    pub fn new(script: impl Into<String>, class: impl Into<String>, args: Value) -> Self {
        Self {
            script: script.into(),
            class: class.into(),
            args,
        }
    }

    /// Builds a bootstrap only when all three parts are present.
    #[must_use]
    pub fn from_parts(
        script: Option<String>,
        class: Option<String>,
        args: Option<Value>,
    ) -> Option<Self> {
        Some(Self {
            script: script?,
            class: class?,
            args: args?,
        })
    }

}

impl From<BootstrapSettings> for ScriptBootstrap {
    fn from(settings: BootstrapSettings) -> Self {
        Self {
            script: settings.script,
            class: settings.class,
            args: settings.args,
        }
    }
}

/// Errors raised while launching a script.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    /// The script thread could not be started.
    #[error("failed to start script thread for '{script}': {source}")]
    Spawn {
        /// Script being launched.
        script: String,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The launcher refused the script.
    #[error("script '{script}' rejected: {reason}")]
    Rejected {
        /// Script being launched.
        script: String,
        /// Why the launcher refused.
        reason: String,
    },
}

/// Starts scripts and returns the router end of their channel.
pub trait ScriptLauncher {
    /// Launches `bootstrap` in a fresh isolated context.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] when the script cannot be started.
    fn launch(&self, bootstrap: &ScriptBootstrap) -> Result<Rc<dyn Channel>, LaunchError>;
}

/// Executes a script against the remote end of its channel. Implementations
/// return when the script finishes or the channel closes.
pub trait ScriptRuntime: Send + Sync {
    /// Runs the script described by `bootstrap`.
    fn run(&self, bootstrap: ScriptBootstrap, endpoint: RemoteEndpoint);
}

/// Launcher that gives every script its own thread.
#[derive(Clone)]
pub struct ThreadLauncher {
    runtime: Arc<dyn ScriptRuntime>,
}

impl ThreadLauncher {
    /// Creates a launcher driving `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self { runtime }
    }
}

impl std::fmt::Debug for ThreadLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadLauncher").finish_non_exhaustive()
    }
}

impl ScriptLauncher for ThreadLauncher {
    fn launch(&self, bootstrap: &ScriptBootstrap) -> Result<Rc<dyn Channel>, LaunchError> {
        let (host, remote) = local_channel();
        let runtime = Arc::clone(&self.runtime);
        let owned = bootstrap.clone();
        thread::Builder::new()
            .name(format!("script-{}", host.id().get()))
            .spawn(move || runtime.run(owned, remote))
            .map_err(|source| LaunchError::Spawn {
                script: bootstrap.script.clone(),
                source: Arc::new(source),
            })?;
        debug!(
            target: SANDBOX_TARGET,
            script = %bootstrap.script,
            class = %bootstrap.class,
            channel = %host.id(),
            "script launched"
        );
        Ok(Rc::new(host))
    }
}
