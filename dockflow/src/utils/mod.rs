//! Small pure helpers shared across the executor.
//!
//! - Environment mapping merge used for build and run variables
//! - Timestamp helpers
//! - Per-run identifiers

pub mod env;
pub mod run_id;
pub mod timestamps;

pub use env::{merge_env, EnvMap};
pub use run_id::RunId;
pub use timestamps::{elapsed_ms, format_timestamp, now_utc, Timestamp};
