//! Core domain types shared by every component.
//!
//! - Status taxonomy
//! - Captured command results

mod cmd;
mod status;

pub use cmd::CmdResult;
pub use status::{StatusCode, StatusError, UnknownStatusCode};
