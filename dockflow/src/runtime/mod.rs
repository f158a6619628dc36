//! Process-backed adapters: the container CLI and git.

mod docker;
mod git;
mod process;

pub use docker::DockerRuntime;
pub use git::{classify_clone_failure, normalize_reference, GitFetcher};
pub use process::format_command;
