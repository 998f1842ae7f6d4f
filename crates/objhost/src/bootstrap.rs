//! Host bootstrap orchestration.
//!
//! Loads configuration, installs telemetry and starts the router with its
//! trusted entity, in that order. The session layer and the script launcher
//! are supplied by the embedding program.

use std::sync::Arc;

use objhost_config::Config;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::info;

use crate::error::HostError;
use crate::router::{Router, RouterOptions};
use crate::sandbox::{ScriptBootstrap, ScriptLauncher};
use crate::session::SessionManager;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Source of the host configuration.
pub trait ConfigLoader {
    /// Loads the host configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] when any configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads the process arguments, environment and configuration
/// file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        <Config as OrthoConfig>::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The router could not start its trusted entity.
    #[error("failed to start router: {source}")]
    Router {
        /// Underlying router error.
        #[source]
        source: HostError,
    },
}

/// A started object host.
#[derive(Debug)]
pub struct Host {
    config: Config,
    router: Router,
    telemetry: TelemetryHandle,
}

impl Host {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The running router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Mutable access to the router, for registering simulations and
    /// pumping channels.
    #[must_use]
    pub const fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Telemetry handle, mainly useful to tests.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Consumes the host, returning its router.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Starts the host from the configuration provided by `loader`.
///
/// # Errors
///
/// Returns a [`BootstrapError`] naming the stage that failed.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    session: Box<dyn SessionManager>,
    launcher: Box<dyn ScriptLauncher>,
) -> Result<Host, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let bootstrap = config.bootstrap().map(ScriptBootstrap::from);
    let router = Router::start(
        session,
        launcher,
        RouterOptions::from_config(&config),
        bootstrap.as_ref(),
    )
    .map_err(|source| BootstrapError::Router { source })?;

    info!(
        target: BOOTSTRAP_TARGET,
        log_format = %telemetry.format(),
        gui_simulation = %config.gui_simulation(),
        query_update_mode = %config.query_update_mode(),
        "object host started"
    );
    Ok(Host {
        config,
        router,
        telemetry,
    })
}
