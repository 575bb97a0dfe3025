//! Explicit registries for transport and scheduler plugins.
//!
//! Every transport/scheduler identifier a computer can reference must be
//! registered here at startup; lookups by unknown identifier fail instead of
//! falling back to dynamic discovery.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{Result, RidgeError};
use crate::models::Computer;
use crate::transport::{local, ssh, AuthField, LocalTransport, SshTransport, Transport};

type TransportFactory =
    Box<dyn Fn(&Computer, &BTreeMap<String, Value>) -> anyhow::Result<Box<dyn Transport>>>;

/// A registered transport kind.
pub struct TransportEntry {
    pub name: String,
    pub description: String,
    schema: fn(&str) -> Vec<AuthField>,
    factory: TransportFactory,
}

impl std::fmt::Debug for TransportEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl TransportEntry {
    pub fn new(
        name: &str,
        description: &str,
        schema: fn(&str) -> Vec<AuthField>,
        factory: TransportFactory,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            factory,
        }
    }

    /// Auth-params schema, in prompt order, with defaults resolved for the
    /// acting user.
    pub fn auth_schema(&self, acting_user: &str) -> Vec<AuthField> {
        (self.schema)(acting_user)
    }

    /// Instantiate the transport for a computer with the given auth params.
    pub fn create(
        &self,
        computer: &Computer,
        params: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Box<dyn Transport>> {
        (self.factory)(computer, params)
    }
}

/// A registered scheduler kind. Scheduler internals live elsewhere; the
/// registry carries the metadata setup needs.
#[derive(Debug, Clone)]
pub struct SchedulerEntry {
    pub name: String,
    pub description: String,
    /// Whether the scheduler honors a per-machine memory default. When it
    /// does not, interactive setup skips that prompt.
    pub supports_memory_default: bool,
}

/// Registry of known transports and schedulers.
pub struct PluginRegistry {
    transports: Vec<TransportEntry>,
    schedulers: Vec<SchedulerEntry>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
            schedulers: Vec::new(),
        }
    }

    /// Create a registry with the built-in transports and schedulers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_transport(TransportEntry::new(
            "local",
            "Execution on this machine through a shell",
            local::auth_schema,
            Box::new(|_, params| Ok(Box::new(LocalTransport::new(params)) as Box<dyn Transport>)),
        ));
        registry.register_transport(TransportEntry::new(
            "ssh",
            "Execution on a remote machine through the system ssh client",
            ssh::auth_schema,
            Box::new(|computer, params| {
                Ok(Box::new(SshTransport::new(&computer.hostname, params)) as Box<dyn Transport>)
            }),
        ));
        registry.register_scheduler(SchedulerEntry {
            name: "direct".to_string(),
            description: "Run jobs directly, no queueing system".to_string(),
            supports_memory_default: false,
        });
        registry.register_scheduler(SchedulerEntry {
            name: "slurm".to_string(),
            description: "Submit jobs through the Slurm workload manager".to_string(),
            supports_memory_default: true,
        });
        registry
    }

    /// Register a transport, replacing any existing entry with the same name.
    pub fn register_transport(&mut self, entry: TransportEntry) {
        self.transports.retain(|t| t.name != entry.name);
        self.transports.push(entry);
    }

    /// Register a scheduler, replacing any existing entry with the same name.
    pub fn register_scheduler(&mut self, entry: SchedulerEntry) {
        self.schedulers.retain(|s| s.name != entry.name);
        self.schedulers.push(entry);
    }

    /// Look up a transport by identifier.
    pub fn transport(&self, name: &str) -> Result<&TransportEntry> {
        self.transports
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RidgeError::unknown_transport(name))
    }

    /// Look up a scheduler by identifier.
    pub fn scheduler(&self, name: &str) -> Result<&SchedulerEntry> {
        self.schedulers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| RidgeError::unknown_scheduler(name))
    }

    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn scheduler_names(&self) -> Vec<&str> {
        self.schedulers.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.transport_names(), vec!["local", "ssh"]);
        assert_eq!(registry.scheduler_names(), vec!["direct", "slurm"]);
    }

    #[test]
    fn test_unknown_transport_lookup_fails() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.transport("unknown_transport").unwrap_err();
        assert!(err.to_string().contains("unknown_transport"));
    }

    #[test]
    fn test_unknown_scheduler_lookup_fails() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.scheduler("unknown_scheduler").unwrap_err();
        assert!(err.to_string().contains("unknown_scheduler"));
    }

    #[test]
    fn test_direct_scheduler_skips_memory_default() {
        let registry = PluginRegistry::with_builtins();
        assert!(!registry.scheduler("direct").unwrap().supports_memory_default);
        assert!(registry.scheduler("slurm").unwrap().supports_memory_default);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = PluginRegistry::with_builtins();
        registry.register_scheduler(SchedulerEntry {
            name: "direct".to_string(),
            description: "replacement".to_string(),
            supports_memory_default: true,
        });
        assert_eq!(registry.scheduler_names().len(), 2);
        assert!(registry.scheduler("direct").unwrap().supports_memory_default);
    }
}
