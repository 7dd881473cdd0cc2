//! Application-level orchestration.
//!
//! This module owns the replay session lifecycle (start/stop/download/restore).
//! Front-ends call into the controller with validated intents and render the
//! directives it returns.

mod commands;
mod controller;
mod host;

pub(crate) use controller::{SessionController, StartRequest};
pub(crate) use host::TerminalHost;
