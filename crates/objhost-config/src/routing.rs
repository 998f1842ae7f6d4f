use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Session call that a script's `query_update` message turns into.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QueryUpdateMode {
    /// Forward as a query update.
    #[default]
    Update,
    /// Forward as a query removal carrying the new angle, as older session
    /// layers expect.
    Legacy,
}

/// Errors encountered while parsing a [`QueryUpdateMode`] from text.
pub type QueryUpdateModeParseError = strum::ParseError;
