//! Crate-level test support and behavioural scenarios.

pub(crate) mod support;
