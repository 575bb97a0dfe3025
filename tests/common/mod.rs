//! Shared helpers for the computer-management integration tests.

#![allow(dead_code)]

use anyhow::Result;
use tempfile::TempDir;

use ridge::builder::ComputerBuilder;
use ridge::models::Computer;
use ridge::ops::{self, OpContext};
use ridge::plugins::{PluginRegistry, TransportEntry};
use ridge::store::ComputerStore;
use ridge::transport::{local, Transport};

pub const TEST_USER: &str = "testuser";

/// An operation context backed by a store in a temp directory. The directory
/// lives as long as the context.
pub struct TestContext {
    pub ctx: OpContext,
    _dir: TempDir,
}

pub fn test_context() -> TestContext {
    test_context_with_registry(PluginRegistry::with_builtins())
}

pub fn test_context_with_registry(registry: PluginRegistry) -> TestContext {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = ComputerStore::open(dir.path().join("computers.json")).expect("open store");
    TestContext {
        ctx: OpContext::new(TEST_USER, store, registry),
        _dir: dir,
    }
}

/// The full set of setup options in canonical order, mirroring what a
/// non-interactive `ridge computer setup` invocation passes.
pub fn generate_setup_options() -> Vec<(&'static str, String)> {
    vec![
        ("label", "noninteractive_computer".to_string()),
        ("hostname", "localhost".to_string()),
        ("description", "my description".to_string()),
        ("transport", "local".to_string()),
        ("scheduler", "direct".to_string()),
        ("shebang", "#!/bin/bash".to_string()),
        ("work-dir", "/scratch/{username}/ridge_run".to_string()),
        ("mpirun-command", "mpirun -np {tot_num_mpiprocs}".to_string()),
        ("mpiprocs-per-machine", "2".to_string()),
        ("default-memory-per-machine", "1000000".to_string()),
        // Multiline values exercise multiline option handling
        ("prepend-text", "date\necho 'second line'".to_string()),
        ("append-text", "env\necho '444'\necho 'third line'".to_string()),
    ]
}

/// Replace (or with an empty value: remove) entries of an option list.
pub fn replace_option(
    options: &mut Vec<(&'static str, String)>,
    key: &str,
    value: Option<&str>,
) {
    match value {
        Some(value) => {
            for entry in options.iter_mut() {
                if entry.0 == key {
                    entry.1 = value.to_string();
                    return;
                }
            }
            panic!("option {key} not present");
        }
        None => options.retain(|(k, _)| *k != key),
    }
}

/// Build a computer from an option list without storing it.
pub fn build_computer(
    ctx: &OpContext,
    options: &[(&'static str, String)],
) -> ridge::errors::Result<Computer> {
    let mut builder = ComputerBuilder::new(&ctx.registry);
    for (key, value) in options {
        builder.set(key, value)?;
    }
    builder.build()
}

/// Build and register a computer from an option list.
pub fn setup_from_options(
    test: &mut TestContext,
    options: &[(&'static str, String)],
) -> ridge::errors::Result<()> {
    let computer = build_computer(&test.ctx, options)?;
    ops::setup_computer(&mut test.ctx, computer)
}

/// Register a computer with the given label, transport and scheduler and
/// otherwise default-ish values.
pub fn setup_computer(
    test: &mut TestContext,
    label: &str,
    transport: &str,
    scheduler: &str,
) -> ridge::errors::Result<()> {
    let mut options = generate_setup_options();
    replace_option(&mut options, "label", Some(label));
    replace_option(&mut options, "transport", Some(transport));
    replace_option(&mut options, "scheduler", Some(scheduler));
    setup_from_options(test, &options)
}

/// Transport test double: every command succeeds with plausible output, and
/// spurious stdout/stderr can be injected to exercise the failure paths of
/// the connectivity checks.
pub struct FakeTransport {
    pub extra_stdout: String,
    pub extra_stderr: String,
}

impl FakeTransport {
    fn respond(&self, command: &str) -> (i32, String, String) {
        let mut stdout = if let Some(rest) = command.strip_prefix("echo ") {
            format!("{rest}\n")
        } else if command == "whoami" {
            format!("{TEST_USER}\n")
        } else {
            String::new()
        };
        if !self.extra_stdout.is_empty() {
            stdout.push_str(&self.extra_stdout);
            stdout.push('\n');
        }
        (0, stdout, self.extra_stderr.clone())
    }
}

impl Transport for FakeTransport {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn exec_command(&self, command: &str) -> Result<(i32, String, String)> {
        Ok(self.respond(command))
    }

    fn exec_with_login_shell(
        &self,
        command: &str,
        _login_shell: bool,
    ) -> Result<(i32, String, String)> {
        Ok(self.respond(command))
    }
}

/// A registry whose `local` transport is a [`FakeTransport`] with the given
/// spurious output.
pub fn registry_with_fake_local(extra_stdout: &str, extra_stderr: &str) -> PluginRegistry {
    let extra_stdout = extra_stdout.to_string();
    let extra_stderr = extra_stderr.to_string();
    let mut registry = PluginRegistry::with_builtins();
    registry.register_transport(TransportEntry::new(
        "local",
        "scripted local transport",
        local::auth_schema,
        Box::new(move |_, _| {
            Ok(Box::new(FakeTransport {
                extra_stdout: extra_stdout.clone(),
                extra_stderr: extra_stderr.clone(),
            }) as Box<dyn Transport>)
        }),
    ));
    registry
}
