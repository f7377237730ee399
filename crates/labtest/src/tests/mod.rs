//! Test suites spanning several lab components.

mod behaviour;
pub(crate) mod support;
