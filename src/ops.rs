//! Core computer operations: setup, configuration, lifecycle and the
//! connectivity test suite.
//!
//! Every operation takes an explicit [`OpContext`]; there is no process-wide
//! state. The command layer translates CLI arguments into these calls and
//! formats the results.

use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::errors::{Result, RidgeError};
use crate::models::{AuthInfo, Computer};
use crate::plugins::PluginRegistry;
use crate::prompt::LineSource;
use crate::store::ComputerStore;
use crate::transport::{AuthField, Transport};
use crate::validation::validate_label_unique;

/// Context every operation runs against: the acting user, the open store and
/// the plugin registries.
pub struct OpContext {
    pub username: String,
    pub store: ComputerStore,
    pub registry: PluginRegistry,
}

impl OpContext {
    pub fn new(username: impl Into<String>, store: ComputerStore, registry: PluginRegistry) -> Self {
        Self {
            username: username.into(),
            store,
            registry,
        }
    }
}

/// Register a new computer. The label must be unique and the referenced
/// plugins registered.
pub fn setup_computer(ctx: &mut OpContext, computer: Computer) -> Result<()> {
    validate_label_unique(&computer.label, ctx.store.labels())?;
    ctx.registry.transport(&computer.transport)?;
    ctx.registry.scheduler(&computer.scheduler)?;
    info!(
        "registering computer '{}' (transport={}, scheduler={})",
        computer.label, computer.transport, computer.scheduler
    );
    ctx.store.add(computer)
}

/// Configure a computer for the acting user.
///
/// The requested transport must match the one the computer was set up with
/// (the compatibility gate), and both stored plugin identifiers must be
/// registered. The final auth params are reconciled by layering, in
/// increasing priority: schema defaults < previously persisted values <
/// values supplied in this call. With a line source, fields not supplied are
/// prompted for, defaulting to the layered value.
pub fn configure_computer(
    ctx: &mut OpContext,
    requested_transport: &str,
    label: &str,
    supplied: &BTreeMap<String, Value>,
    source: Option<&mut dyn LineSource>,
) -> Result<AuthInfo> {
    let computer = ctx.store.get(label)?.clone();

    // Configuring a computer whose plugins are no longer registered is
    // rejected before the gate comparison.
    ctx.registry.transport(&computer.transport)?;
    ctx.registry.scheduler(&computer.scheduler)?;
    let entry = ctx.registry.transport(requested_transport)?;

    if computer.transport != requested_transport {
        return Err(RidgeError::ConfigurationMismatch {
            label: label.to_string(),
            expected: computer.transport.clone(),
            requested: requested_transport.to_string(),
        });
    }

    let schema = entry.auth_schema(&ctx.username);
    for key in supplied.keys() {
        if !schema.iter().any(|f| f.name == key.as_str()) {
            return Err(RidgeError::validation(
                key.clone(),
                format!("is not a valid auth field for transport '{requested_transport}'"),
            ));
        }
    }

    let stored = ctx
        .store
        .auth_info(label, &ctx.username)
        .map(|a| a.auth_params.clone())
        .unwrap_or_default();

    let mut params = BTreeMap::new();
    let mut source = source;
    for field in &schema {
        let layered = supplied
            .get(field.name)
            .or_else(|| stored.get(field.name))
            .cloned()
            .unwrap_or_else(|| field.default.clone());

        let value = if supplied.contains_key(field.name) {
            layered
        } else if let Some(src) = source.as_deref_mut() {
            prompt_auth_field(src, field, &layered)?
        } else {
            layered
        };
        params.insert(field.name.to_string(), value);
    }

    debug!("configuring '{label}' for user '{}'", ctx.username);
    let auth = AuthInfo::new(label, &ctx.username, params);
    ctx.store.set_auth_info(auth.clone())?;
    Ok(auth)
}

/// Parse one supplied `key=value` pair against a transport's schema.
pub fn parse_auth_assignment(
    schema: &[AuthField],
    assignment: &str,
) -> Result<(String, Value)> {
    let (key, raw) = assignment.split_once('=').ok_or_else(|| {
        RidgeError::validation(
            assignment.to_string(),
            "auth fields must be given as key=value",
        )
    })?;
    let field = schema
        .iter()
        .find(|f| f.name == key)
        .ok_or_else(|| RidgeError::validation(key.to_string(), "is not a valid auth field"))?;
    let value = field
        .parse(raw)
        .map_err(|reason| RidgeError::validation(key.to_string(), reason))?;
    Ok((key.to_string(), value))
}

fn prompt_auth_field(
    source: &mut dyn LineSource,
    field: &AuthField,
    default: &Value,
) -> Result<Value> {
    let default_display = AuthField::display(default);
    loop {
        let line = source.read_line(field.prompt, Some(&default_display))?;
        let raw = match line {
            Some(ref l) if !l.is_empty() => l.clone(),
            _ => return Ok(default.clone()),
        };
        match field.parse(&raw) {
            Ok(value) => return Ok(value),
            Err(reason) => {
                eprintln!("Invalid value for {}: {reason}", field.name);
                if line.is_none() {
                    return Err(RidgeError::validation(field.name.to_string(), reason));
                }
            }
        }
    }
}

/// The auth params that `configure` would produce with no input at all:
/// schema defaults only.
pub fn default_auth_params(ctx: &OpContext, label: &str) -> Result<Vec<(String, Value)>> {
    let computer = ctx.store.get(label)?;
    let entry = ctx.registry.transport(&computer.transport)?;
    Ok(entry
        .auth_schema(&ctx.username)
        .into_iter()
        .map(|f| (f.name.to_string(), f.default))
        .collect())
}

/// The effective auth params for the acting user: schema defaults overlaid
/// with whatever is persisted.
pub fn current_auth_params(ctx: &OpContext, label: &str) -> Result<Vec<(String, Value)>> {
    let computer = ctx.store.get(label)?;
    let entry = ctx.registry.transport(&computer.transport)?;
    let stored = ctx
        .store
        .auth_info(label, &ctx.username)
        .map(|a| a.auth_params.clone())
        .unwrap_or_default();
    Ok(entry
        .auth_schema(&ctx.username)
        .into_iter()
        .map(|f| {
            let value = stored.get(f.name).cloned().unwrap_or(f.default);
            (f.name.to_string(), value)
        })
        .collect())
}

/// Render auth params as a replayable `key=value ...` option string.
pub fn as_option_string(params: &[(String, Value)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={}", AuthField::display(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Change a computer's label. The new label must differ and be unused;
/// configuration state survives the rename.
pub fn relabel_computer(ctx: &mut OpContext, old_label: &str, new_label: &str) -> Result<()> {
    if new_label.is_empty() {
        return Err(RidgeError::validation("label", "must not be empty"));
    }
    if old_label == new_label {
        return Err(RidgeError::validation(
            "label",
            "the new label must differ from the current one",
        ));
    }
    info!("relabeling computer '{old_label}' to '{new_label}'");
    ctx.store.relabel(old_label, new_label)
}

/// Remove a computer and its auth records permanently.
pub fn delete_computer(ctx: &mut OpContext, label: &str) -> Result<()> {
    info!("deleting computer '{label}'");
    ctx.store.delete(label)
}

/// Outcome of one connectivity check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub messages: Vec<String>,
}

/// Report of a full `computer test` run.
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub checks: Vec<CheckOutcome>,
}

impl TestReport {
    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn failed(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    fn push(&mut self, name: &'static str, passed: bool, messages: Vec<String>) {
        self.checks.push(CheckOutcome {
            name,
            passed,
            messages,
        });
    }
}

/// Number of checks `test_computer` runs on a configured computer.
pub const NUM_CONNECTION_CHECKS: usize = 6;

const ECHO_PROBE: &str = "__ridge_probe__";

/// Run the connectivity test suite against a configured computer.
///
/// The computer must exist and be configured for the acting user; the
/// transport is instantiated through the registry, so tests can substitute
/// a scripted transport by registering their own factory.
pub fn test_computer(ctx: &OpContext, label: &str) -> Result<TestReport> {
    let computer = ctx.store.get(label)?.clone();
    let auth = ctx
        .store
        .auth_info(label, &ctx.username)
        .ok_or_else(|| RidgeError::NotConfigured {
            label: label.to_string(),
            username: ctx.username.clone(),
        })?;

    let entry = ctx.registry.transport(&computer.transport)?;
    let transport = entry.create(&computer, &auth.auth_params)?;

    let remote_user = auth
        .auth_params
        .get("username")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(&ctx.username)
        .to_string();
    let use_login_shell = auth
        .auth_params
        .get("use_login_shell")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let mut report = TestReport::default();

    // Everything else is meaningless if the connection cannot be opened.
    match transport.open() {
        Ok(()) => report.push("opening connection", true, Vec::new()),
        Err(e) => {
            report.push("opening connection", false, vec![e.to_string()]);
            return Ok(report);
        }
    }

    check_clean_shell_output(&mut report, transport.as_ref());
    check_remote_user(&mut report, transport.as_ref());

    let work_dir = computer.work_dir_for(&remote_user);
    check_work_directory(&mut report, transport.as_ref(), &work_dir);
    check_temp_file(&mut report, transport.as_ref(), &work_dir);
    check_login_shell_timing(&mut report, transport.as_ref(), use_login_shell);

    Ok(report)
}

/// The shell must produce exactly the probe line and nothing on stderr;
/// anything else ends up corrupting file transfers and parsed output.
fn check_clean_shell_output(report: &mut TestReport, transport: &dyn Transport) {
    let name = "checking for spurious output";
    match transport.exec_command(&format!("echo {ECHO_PROBE}")) {
        Ok((code, stdout, stderr)) => {
            let mut messages = Vec::new();
            if code != 0 {
                messages.push(format!("probe command exited with code {code}"));
            }
            if stdout.trim() != ECHO_PROBE {
                messages.push(format!(
                    "the shell produced unexpected standard output: {stdout}"
                ));
            }
            if !stderr.trim().is_empty() {
                messages.push(format!(
                    "the shell produced output on standard error: {stderr}"
                ));
            }
            report.push(name, messages.is_empty(), messages);
        }
        Err(e) => report.push(name, false, vec![e.to_string()]),
    }
}

fn check_remote_user(report: &mut TestReport, transport: &dyn Transport) {
    let name = "determining remote user";
    match transport.exec_command("whoami") {
        Ok((0, stdout, _)) if !stdout.trim().is_empty() => {
            report.push(name, true, vec![format!("remote user: {}", stdout.trim())]);
        }
        Ok((code, _, stderr)) => report.push(
            name,
            false,
            vec![format!("whoami failed with code {code}: {stderr}")],
        ),
        Err(e) => report.push(name, false, vec![e.to_string()]),
    }
}

fn check_work_directory(report: &mut TestReport, transport: &dyn Transport, work_dir: &str) {
    let name = "accessing the work directory";
    let command = format!("mkdir -p '{work_dir}' && test -d '{work_dir}' && test -w '{work_dir}'");
    match transport.exec_command(&command) {
        Ok((0, _, _)) => report.push(name, true, Vec::new()),
        Ok((code, _, stderr)) => report.push(
            name,
            false,
            vec![format!("work directory '{work_dir}' is not usable (code {code}): {stderr}")],
        ),
        Err(e) => report.push(name, false, vec![e.to_string()]),
    }
}

fn check_temp_file(report: &mut TestReport, transport: &dyn Transport, work_dir: &str) {
    let name = "creating and deleting a temporary file";
    let file = format!("{work_dir}/.ridge-test-{}", std::process::id());
    let command = format!("touch '{file}' && test -f '{file}' && rm '{file}'");
    match transport.exec_command(&command) {
        Ok((0, _, _)) => report.push(name, true, Vec::new()),
        Ok((code, _, stderr)) => report.push(
            name,
            false,
            vec![format!("temporary file round trip failed (code {code}): {stderr}")],
        ),
        Err(e) => report.push(name, false, vec![e.to_string()]),
    }
}

fn check_login_shell_timing(
    report: &mut TestReport,
    transport: &dyn Transport,
    use_login_shell: bool,
) {
    let name = "comparing login shell timing";
    if !use_login_shell {
        report.push(name, true, Vec::new());
        return;
    }
    let timing = |login: bool| -> anyhow::Result<Duration> {
        let start = Instant::now();
        transport.exec_with_login_shell("true", login)?;
        Ok(start.elapsed())
    };
    match (timing(true), timing(false)) {
        (Ok(with_login), Ok(without_login)) => {
            if login_shell_is_slow(with_login, without_login) {
                report.push(
                    name,
                    false,
                    vec![format!(
                        "computer is configured to use a login shell, which is slower compared to a normal shell ({:.0} ms vs {:.0} ms)",
                        with_login.as_secs_f64() * 1000.0,
                        without_login.as_secs_f64() * 1000.0
                    )],
                );
            } else {
                report.push(name, true, Vec::new());
            }
        }
        (Err(e), _) | (_, Err(e)) => report.push(name, false, vec![e.to_string()]),
    }
}

/// A login shell is flagged when it takes at least twice as long as a plain
/// shell and the absolute difference is noticeable.
pub fn login_shell_is_slow(with_login: Duration, without_login: Duration) -> bool {
    with_login >= without_login * 2 && (with_login - without_login) > Duration::from_millis(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_shell_verdict() {
        let ms = Duration::from_millis;
        assert!(login_shell_is_slow(ms(210), ms(100)));
        assert!(!login_shell_is_slow(ms(120), ms(100)));
        // Large ratio but negligible absolute difference.
        assert!(!login_shell_is_slow(ms(10), ms(2)));
    }

    #[test]
    fn test_option_string_rendering() {
        let params = vec![
            ("port".to_string(), Value::from(22)),
            ("username".to_string(), Value::String("alice".to_string())),
            ("use_login_shell".to_string(), Value::Bool(true)),
        ];
        assert_eq!(
            as_option_string(&params),
            "port=22 username=alice use_login_shell=true"
        );
    }
}
