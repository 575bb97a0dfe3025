//! Ridge compute-resource management.
//!
//! This crate contains the computer registry of the Ridge workflow
//! orchestration platform: registering local and remote execution resources,
//! attaching per-user connection settings, and smoke-testing connectivity.

pub mod builder;
pub mod commands;
pub mod config;
pub mod errors;
pub mod models;
pub mod ops;
pub mod plugins;
pub mod prompt;
pub mod store;
pub mod transport;
pub mod validation;

// Re-exports for convenience
pub use builder::ComputerBuilder;
pub use config::{ConfigPaths, RidgeConfig};
pub use errors::RidgeError;
pub use models::{AuthInfo, Computer, SETUP_FIELD_ORDER};
pub use ops::{OpContext, TestReport};
pub use plugins::{PluginRegistry, SchedulerEntry, TransportEntry};
pub use prompt::{LineSource, ScriptedSource, StdinSource};
pub use store::ComputerStore;
pub use transport::{AuthField, AuthFieldKind, LocalTransport, SshTransport, Transport};
