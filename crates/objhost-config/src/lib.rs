//! Layered configuration for the object host.
//!
//! Values resolve in increasing order of precedence:
//!
//! 1. built-in defaults;
//! 2. a TOML file named by `--config-path` (or `OBJHOST_CONFIG_PATH`);
//! 3. `OBJHOST_*` environment variables;
//! 4. command-line flags.
//!
//! The resulting [`Config`] drives telemetry (filter and format), the
//! router's protocol options, and the script run by the trusted entity that
//! the router creates at start-up.

mod defaults;
mod logging;
mod routing;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use defaults::{
    DEFAULT_GUI_SIMULATION, DEFAULT_LOG_FILTER, default_gui_simulation,
    default_gui_simulation_string, default_log_filter, default_log_filter_string,
    default_log_format, default_query_update_mode,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use routing::{QueryUpdateMode, QueryUpdateModeParseError};

/// Script run by the trusted entity created when the router starts.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSettings {
    /// Script source reference.
    pub script: String,
    /// Constructor instantiated by the script.
    pub class: String,
    /// Constructor arguments.
    pub args: Value,
}

/// Resolved host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "OBJHOST")]
pub struct Config {
    /// Tracing filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Simulation followed by `enable_gui`/`disable_gui` script messages.
    #[ortho_config(default = default_gui_simulation_string())]
    pub gui_simulation: String,
    /// Session call that `query_update` script messages turn into.
    #[ortho_config(default = default_query_update_mode())]
    pub query_update_mode: QueryUpdateMode,
    /// Script run by the trusted entity.
    pub bootstrap_script: Option<String>,
    /// Constructor instantiated by the trusted entity's script.
    pub bootstrap_class: Option<String>,
    /// Arguments passed to the trusted entity's constructor.
    pub bootstrap_args: Option<Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            gui_simulation: default_gui_simulation_string(),
            query_update_mode: default_query_update_mode(),
            bootstrap_script: None,
            bootstrap_class: None,
            bootstrap_args: None,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Simulation followed by GUI subscription messages.
    #[must_use]
    pub fn gui_simulation(&self) -> &str {
        self.gui_simulation.as_str()
    }

    /// Session call that query updates are routed to.
    #[must_use]
    pub const fn query_update_mode(&self) -> QueryUpdateMode {
        self.query_update_mode
    }

    /// Trusted entity bootstrap. Present only when script, class and
    /// arguments are all configured.
    #[must_use]
    pub fn bootstrap(&self) -> Option<BootstrapSettings> {
        match (
            &self.bootstrap_script,
            &self.bootstrap_class,
            &self.bootstrap_args,
        ) {
            (Some(script), Some(class), Some(args)) => Some(BootstrapSettings {
                script: script.clone(),
                class: class.clone(),
                args: args.clone(),
            }),
            _ => None,
        }
    }
}
