//! A restricted command terminal.
//!
//! [`Engine`] interprets one command line at a time against a whitelisted
//! verb set. Every path is confined to a sandbox root, deletes go through a
//! trash area, and verbs without built-in logic run as supervised native
//! processes with a timeout and output cap.

pub mod commands;
pub mod config;
pub mod engine;
pub mod sandbox;
pub mod security;
pub mod system;
pub mod trash;

pub use commands::{CommandError, CommandResult, ALLOWED_COMMANDS};
pub use config::Config;
pub use engine::Engine;
pub use sandbox::ProcessSupervisor;
pub use security::PathResolver;
pub use trash::TrashStore;
