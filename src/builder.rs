//! Option collector assembling a [`Computer`] from flags, a YAML document
//! and interactive input.
//!
//! Values arrive in three ways that can be mixed within one setup run:
//! explicit `--key=value` flags, a `--config` document, and interactive
//! prompts for whatever is still unset. All three funnel through the same
//! per-field validation.

use chrono::Utc;
use log::warn;
use serde::Deserialize;

use crate::errors::{Result, RidgeError};
use crate::models::{Computer, SETUP_FIELD_ORDER};
use crate::plugins::PluginRegistry;
use crate::prompt::LineSource;
use crate::validation::{
    validate_memory, validate_mpiprocs, validate_mpirun_template, validate_shebang,
};

/// Field values of a computer under construction. `None` means "not
/// supplied at this layer".
#[derive(Debug, Default, Clone)]
struct Fields {
    label: Option<String>,
    hostname: Option<String>,
    description: Option<String>,
    transport: Option<String>,
    scheduler: Option<String>,
    shebang: Option<String>,
    work_dir: Option<String>,
    mpirun_command: Option<String>,
    mpiprocs_per_machine: Option<Option<u32>>,
    default_memory_per_machine: Option<Option<u64>>,
    prepend_text: Option<String>,
    append_text: Option<String>,
}

/// Setup fields as they appear in a `--config` YAML document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetupDocument {
    label: Option<String>,
    hostname: Option<String>,
    description: Option<String>,
    transport: Option<String>,
    scheduler: Option<String>,
    shebang: Option<String>,
    work_dir: Option<String>,
    mpirun_command: Option<String>,
    mpiprocs_per_machine: Option<i64>,
    default_memory_per_machine: Option<i64>,
    prepend_text: Option<String>,
    append_text: Option<String>,
}

/// Collects setup values layer by layer and produces a validated computer.
pub struct ComputerBuilder<'r> {
    registry: &'r PluginRegistry,
    values: Fields,
    defaults: Fields,
}

impl<'r> ComputerBuilder<'r> {
    /// Builder for a fresh setup, seeded with the built-in suggestions.
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self {
            registry,
            values: Fields::default(),
            defaults: Fields {
                label: None,
                hostname: None,
                description: Some(String::new()),
                transport: None,
                scheduler: None,
                shebang: Some("#!/bin/bash".to_string()),
                work_dir: Some("/scratch/{username}/ridge_run".to_string()),
                mpirun_command: Some("mpirun -np {tot_num_mpiprocs}".to_string()),
                mpiprocs_per_machine: Some(None),
                default_memory_per_machine: Some(None),
                prepend_text: Some(String::new()),
                append_text: Some(String::new()),
            },
        }
    }

    /// Builder for duplicating an existing computer: every field of the
    /// source becomes a default, the label must be supplied anew.
    pub fn from_computer(registry: &'r PluginRegistry, source: &Computer) -> Self {
        Self {
            registry,
            values: Fields::default(),
            defaults: Fields {
                label: None,
                hostname: Some(source.hostname.clone()),
                description: Some(source.description.clone()),
                transport: Some(source.transport.clone()),
                scheduler: Some(source.scheduler.clone()),
                shebang: Some(source.shebang.clone()),
                work_dir: Some(source.work_dir.clone()),
                mpirun_command: Some(source.mpirun_command.clone()),
                mpiprocs_per_machine: Some(source.mpiprocs_per_machine),
                default_memory_per_machine: Some(source.default_memory_per_machine),
                prepend_text: Some(source.prepend_text.clone()),
                append_text: Some(source.append_text.clone()),
            },
        }
    }

    /// Set one field from its raw string form, validating it.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        match key {
            "label" => self.values.label = Some(raw.to_string()),
            "hostname" => self.values.hostname = Some(raw.to_string()),
            "description" => self.values.description = Some(raw.to_string()),
            "transport" => {
                self.registry.transport(raw)?;
                self.values.transport = Some(raw.to_string());
            }
            "scheduler" => {
                self.registry.scheduler(raw)?;
                self.values.scheduler = Some(raw.to_string());
            }
            "shebang" => {
                validate_shebang(raw)?;
                self.values.shebang = Some(raw.to_string());
            }
            "work-dir" => self.values.work_dir = Some(raw.to_string()),
            "mpirun-command" => {
                validate_mpirun_template(raw)?;
                self.values.mpirun_command = Some(raw.to_string());
            }
            "mpiprocs-per-machine" => {
                let n = raw.trim().parse::<i64>().map_err(|_| {
                    RidgeError::validation(
                        "mpiprocs_per_machine",
                        format!("must be an integer, got: {raw}"),
                    )
                })?;
                self.values.mpiprocs_per_machine = Some(validate_mpiprocs(Some(n))?);
            }
            "default-memory-per-machine" => {
                let n = raw.trim().parse::<i64>().map_err(|_| {
                    RidgeError::validation(
                        "default_memory_per_machine",
                        format!("must be an integer, got: {raw}"),
                    )
                })?;
                self.values.default_memory_per_machine = Some(validate_memory(Some(n))?);
            }
            "prepend-text" => self.values.prepend_text = Some(raw.to_string()),
            "append-text" => self.values.append_text = Some(raw.to_string()),
            other => {
                return Err(RidgeError::validation(
                    other.to_string(),
                    "is not a recognized setup field",
                ))
            }
        }
        Ok(())
    }

    /// Merge fields from a YAML setup document. Explicit flags set before or
    /// after this call win over the document.
    pub fn apply_document(&mut self, yaml: &str) -> Result<()> {
        let doc: SetupDocument = serde_yaml::from_str(yaml)
            .map_err(|e| RidgeError::Format(format!("invalid setup document: {e}")))?;

        if let Some(v) = doc.label {
            self.set_default("label", Some(v));
        }
        if let Some(v) = doc.hostname {
            self.set_default("hostname", Some(v));
        }
        if let Some(v) = doc.description {
            self.set_default("description", Some(v));
        }
        if let Some(v) = doc.transport {
            self.registry.transport(&v)?;
            self.set_default("transport", Some(v));
        }
        if let Some(v) = doc.scheduler {
            self.registry.scheduler(&v)?;
            self.set_default("scheduler", Some(v));
        }
        if let Some(v) = doc.shebang {
            validate_shebang(&v)?;
            self.set_default("shebang", Some(v));
        }
        if let Some(v) = doc.work_dir {
            self.set_default("work-dir", Some(v));
        }
        if let Some(v) = doc.mpirun_command {
            validate_mpirun_template(&v)?;
            self.set_default("mpirun-command", Some(v));
        }
        if let Some(n) = doc.mpiprocs_per_machine {
            self.defaults.mpiprocs_per_machine = Some(validate_mpiprocs(Some(n))?);
        }
        if let Some(n) = doc.default_memory_per_machine {
            self.defaults.default_memory_per_machine = Some(validate_memory(Some(n))?);
        }
        if let Some(v) = doc.prepend_text {
            self.set_default("prepend-text", Some(v));
        }
        if let Some(v) = doc.append_text {
            self.set_default("append-text", Some(v));
        }
        Ok(())
    }

    fn set_default(&mut self, key: &str, value: Option<String>) {
        match key {
            "label" => self.defaults.label = value,
            "hostname" => self.defaults.hostname = value,
            "description" => self.defaults.description = value,
            "transport" => self.defaults.transport = value,
            "scheduler" => self.defaults.scheduler = value,
            "shebang" => self.defaults.shebang = value,
            "work-dir" => self.defaults.work_dir = value,
            "mpirun-command" => self.defaults.mpirun_command = value,
            "prepend-text" => self.defaults.prepend_text = value,
            "append-text" => self.defaults.append_text = value,
            _ => unreachable!("set_default called with unknown key {key}"),
        }
    }

    fn is_set(&self, key: &str) -> bool {
        match key {
            "label" => self.values.label.is_some(),
            "hostname" => self.values.hostname.is_some(),
            "description" => self.values.description.is_some(),
            "transport" => self.values.transport.is_some(),
            "scheduler" => self.values.scheduler.is_some(),
            "shebang" => self.values.shebang.is_some(),
            "work-dir" => self.values.work_dir.is_some(),
            "mpirun-command" => self.values.mpirun_command.is_some(),
            "mpiprocs-per-machine" => self.values.mpiprocs_per_machine.is_some(),
            "default-memory-per-machine" => self.values.default_memory_per_machine.is_some(),
            "prepend-text" => self.values.prepend_text.is_some(),
            "append-text" => self.values.append_text.is_some(),
            _ => false,
        }
    }

    /// Effective scheduler identifier, if one has been supplied so far.
    pub fn scheduler(&self) -> Option<&str> {
        self.values
            .scheduler
            .as_deref()
            .or(self.defaults.scheduler.as_deref())
    }

    fn default_display(&self, key: &str) -> Option<String> {
        match key {
            "label" => self.defaults.label.clone(),
            "hostname" => self.defaults.hostname.clone(),
            "description" => self.defaults.description.clone(),
            "transport" => self.defaults.transport.clone(),
            "scheduler" => self.defaults.scheduler.clone(),
            "shebang" => self.defaults.shebang.clone(),
            "work-dir" => self.defaults.work_dir.clone(),
            "mpirun-command" => self.defaults.mpirun_command.clone(),
            "mpiprocs-per-machine" => self
                .defaults
                .mpiprocs_per_machine
                .map(|v| v.map(|n| n.to_string()).unwrap_or_default()),
            "default-memory-per-machine" => self
                .defaults
                .default_memory_per_machine
                .map(|v| v.map(|n| n.to_string()).unwrap_or_default()),
            "prepend-text" => self.defaults.prepend_text.clone(),
            "append-text" => self.defaults.append_text.clone(),
            _ => None,
        }
    }

    fn prompt_text(key: &str) -> &'static str {
        match key {
            "label" => "Computer label",
            "hostname" => "Hostname",
            "description" => "Description",
            "transport" => "Transport plugin",
            "scheduler" => "Scheduler plugin",
            "shebang" => "Shebang line (first line of each script)",
            "work-dir" => "Work directory on the computer",
            "mpirun-command" => "Mpirun command",
            "mpiprocs-per-machine" => "Default number of MPI processes per machine",
            "default-memory-per-machine" => "Default memory per machine (kB)",
            "prepend-text" => "Text to prepend to each execution",
            "append-text" => "Text to append to each execution",
            _ => unreachable!("prompt requested for unknown setup field"),
        }
    }

    /// Prompt for every field not yet supplied, in canonical order.
    ///
    /// A value that fails validation is reported and the field is asked
    /// again. An empty line or EOF accepts the default; fields without a
    /// default are required.
    pub fn collect_interactive(&mut self, source: &mut dyn LineSource) -> Result<()> {
        for key in SETUP_FIELD_ORDER {
            if self.is_set(key) {
                continue;
            }
            // The memory prompt only makes sense for schedulers that honor a
            // per-machine memory default.
            if *key == "default-memory-per-machine" {
                if let Some(scheduler) = self.scheduler() {
                    if let Ok(entry) = self.registry.scheduler(scheduler) {
                        if !entry.supports_memory_default {
                            continue;
                        }
                    }
                }
            }

            let default = self.default_display(key);
            loop {
                let line = source.read_line(Self::prompt_text(key), default.as_deref())?;
                let raw = match line {
                    Some(ref l) if !l.is_empty() => l.clone(),
                    // Empty line or EOF accepts the default.
                    _ => match &default {
                        Some(d) => d.clone(),
                        None if line.is_none() => {
                            return Err(RidgeError::validation(
                                key.replace('-', "_"),
                                "is required",
                            ))
                        }
                        None => {
                            eprintln!("A value is required for {key}");
                            continue;
                        }
                    },
                };

                // Accepting an empty optional default means "leave unset".
                if raw.is_empty()
                    && matches!(*key, "mpiprocs-per-machine" | "default-memory-per-machine")
                {
                    break;
                }
                if raw.is_empty() && default.is_some() {
                    break;
                }

                match self.set(key, &raw) {
                    Ok(()) => break,
                    Err(e) => {
                        warn!("rejected value for {key}: {e}");
                        eprintln!("{e}");
                        if line.is_none() {
                            // EOF with an invalid default cannot make progress.
                            return Err(e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Produce the validated computer, falling back to defaults for fields
    /// that were never explicitly set.
    pub fn build(self) -> Result<Computer> {
        let Fields {
            label,
            hostname,
            description,
            transport,
            scheduler,
            shebang,
            work_dir,
            mpirun_command,
            mpiprocs_per_machine,
            default_memory_per_machine,
            prepend_text,
            append_text,
        } = self.values;

        let required = |field: &str, value: Option<String>| -> Result<String> {
            value.ok_or_else(|| RidgeError::validation(field.to_string(), "is required"))
        };

        let transport = required("transport", transport.or(self.defaults.transport))?;
        self.registry.transport(&transport)?;
        let scheduler = required("scheduler", scheduler.or(self.defaults.scheduler))?;
        self.registry.scheduler(&scheduler)?;

        let shebang = required("shebang", shebang.or(self.defaults.shebang))?;
        validate_shebang(&shebang)?;
        let mpirun_command =
            required("mpirun_command", mpirun_command.or(self.defaults.mpirun_command))?;
        validate_mpirun_template(&mpirun_command)?;

        Ok(Computer {
            label: required("label", label.or(self.defaults.label))?,
            hostname: required("hostname", hostname.or(self.defaults.hostname))?,
            description: description
                .or(self.defaults.description)
                .unwrap_or_default(),
            transport,
            scheduler,
            shebang,
            work_dir: required("work_dir", work_dir.or(self.defaults.work_dir))?,
            mpirun_command,
            mpiprocs_per_machine: mpiprocs_per_machine
                .or(self.defaults.mpiprocs_per_machine)
                .unwrap_or(None),
            default_memory_per_machine: default_memory_per_machine
                .or(self.defaults.default_memory_per_machine)
                .unwrap_or(None),
            prepend_text: prepend_text
                .or(self.defaults.prepend_text)
                .unwrap_or_default(),
            append_text: append_text.or(self.defaults.append_text).unwrap_or_default(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedSource;

    fn registry() -> PluginRegistry {
        PluginRegistry::with_builtins()
    }

    fn minimal(builder: &mut ComputerBuilder) {
        builder.set("label", "c1").unwrap();
        builder.set("hostname", "localhost").unwrap();
        builder.set("transport", "local").unwrap();
        builder.set("scheduler", "direct").unwrap();
    }

    #[test]
    fn test_minimal_build_uses_defaults() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        minimal(&mut builder);
        let computer = builder.build().unwrap();
        assert_eq!(computer.shebang, "#!/bin/bash");
        assert_eq!(computer.work_dir, "/scratch/{username}/ridge_run");
        assert_eq!(computer.mpiprocs_per_machine, None);
        assert_eq!(computer.prepend_text, "");
    }

    #[test]
    fn test_missing_required_field_fails() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        builder.set("label", "c1").unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn test_unknown_transport_rejected_on_set() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        let err = builder.set("transport", "unknown_transport").unwrap_err();
        assert!(err.to_string().contains("unknown_transport"));
    }

    #[test]
    fn test_document_fills_fields_flags_win() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        builder
            .apply_document(
                "label: doc_computer\nhostname: doc_host\ntransport: local\nscheduler: direct\n",
            )
            .unwrap();
        builder.set("hostname", "flag_host").unwrap();
        let computer = builder.build().unwrap();
        assert_eq!(computer.label, "doc_computer");
        assert_eq!(computer.hostname, "flag_host");
    }

    #[test]
    fn test_document_with_unknown_key_fails() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        let err = builder.apply_document("label: x\nbogus_key: 1\n").unwrap_err();
        assert!(err.to_string().contains("invalid setup document"));
    }

    #[test]
    fn test_interactive_fills_remaining_fields() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        builder.set("transport", "local").unwrap();
        builder.set("scheduler", "slurm").unwrap();

        let mut source = ScriptedSource::new([
            "int_computer", // label
            "localhost",    // hostname
            "a machine",    // description
            "",             // shebang -> default
            "",             // work-dir -> default
            "",             // mpirun-command -> default
            "4",            // mpiprocs
            "1000000",      // memory (slurm supports it)
            "",             // prepend-text
            "",             // append-text
        ]);
        builder.collect_interactive(&mut source).unwrap();
        let computer = builder.build().unwrap();
        assert_eq!(computer.label, "int_computer");
        assert_eq!(computer.description, "a machine");
        assert_eq!(computer.mpiprocs_per_machine, Some(4));
        assert_eq!(computer.default_memory_per_machine, Some(1_000_000));
    }

    #[test]
    fn test_interactive_reprompts_on_invalid_value() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        builder.set("transport", "local").unwrap();
        builder.set("scheduler", "direct").unwrap();

        let mut source = ScriptedSource::new([
            "c1",        // label
            "localhost", // hostname
            "",          // description
            "/bin/bash", // shebang: invalid, re-prompted
            "#!/bin/sh", // shebang: valid
            "",          // work-dir
            "",          // mpirun-command
            "-1",        // mpiprocs: invalid, re-prompted
            "2",         // mpiprocs: valid
        ]);
        builder.collect_interactive(&mut source).unwrap();
        let computer = builder.build().unwrap();
        assert_eq!(computer.shebang, "#!/bin/sh");
        assert_eq!(computer.mpiprocs_per_machine, Some(2));
    }

    #[test]
    fn test_interactive_skips_memory_for_direct_scheduler() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        builder.set("transport", "local").unwrap();
        builder.set("scheduler", "direct").unwrap();

        // No line supplied for memory: the prompt must not be issued.
        let mut source = ScriptedSource::new([
            "c_direct",  // label
            "localhost", // hostname
            "",          // description
            "",          // shebang
            "",          // work-dir
            "",          // mpirun-command
            "2",         // mpiprocs
        ]);
        builder.collect_interactive(&mut source).unwrap();
        let computer = builder.build().unwrap();
        assert_eq!(computer.default_memory_per_machine, None);
    }

    #[test]
    fn test_duplicate_builder_inherits_everything_but_label() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        minimal(&mut builder);
        builder.set("mpiprocs-per-machine", "8").unwrap();
        let source = builder.build().unwrap();

        let mut dup = ComputerBuilder::from_computer(&registry, &source);
        dup.set("label", "copy").unwrap();
        let copy = dup.build().unwrap();
        assert_eq!(copy.label, "copy");
        assert_eq!(copy.hostname, source.hostname);
        assert_eq!(copy.mpiprocs_per_machine, source.mpiprocs_per_machine);
    }

    #[test]
    fn test_duplicate_builder_without_label_fails() {
        let registry = registry();
        let mut builder = ComputerBuilder::new(&registry);
        minimal(&mut builder);
        let source = builder.build().unwrap();

        let dup = ComputerBuilder::from_computer(&registry, &source);
        let err = dup.build().unwrap_err();
        assert!(err.to_string().contains("label"));
    }
}
