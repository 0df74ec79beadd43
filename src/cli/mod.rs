//! CLI argument parsing and command handling.

mod args;
mod validators;

pub use args::{Cli, Command, ConfigAction, JobOverrides, ModelsAction, RunArgs, WorkerArgs};
