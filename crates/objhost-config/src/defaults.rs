use crate::logging::LogFormat;
use crate::routing::QueryUpdateMode;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Simulation whose traffic `enable_gui`/`disable_gui` script messages follow
/// when they do not name one.
pub const DEFAULT_GUI_SIMULATION: &str = "graphics";

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned form of [`default_log_filter`], for configuration defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default GUI simulation name.
#[must_use]
pub const fn default_gui_simulation() -> &'static str {
    DEFAULT_GUI_SIMULATION
}

/// Owned form of [`default_gui_simulation`], for configuration defaults.
#[must_use]
pub fn default_gui_simulation_string() -> String {
    DEFAULT_GUI_SIMULATION.to_owned()
}

/// Query updates reach the session layer as updates unless configured
/// otherwise.
#[must_use]
pub const fn default_query_update_mode() -> QueryUpdateMode {
    QueryUpdateMode::Update
}
