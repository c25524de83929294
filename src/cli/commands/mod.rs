//! Subcommand implementations.

pub mod build;
pub mod gate;
pub mod matrix;
pub mod publish;
pub mod run;
mod shared;
pub mod verify;
