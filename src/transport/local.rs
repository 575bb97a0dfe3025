//! Local transport: commands run on this machine through `sh`.

use anyhow::{Context, Result};
use log::trace;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Command;

use super::{param_bool, AuthField, AuthFieldKind, Transport};

/// Auth-params schema for the local transport, in prompt order.
pub fn auth_schema(_acting_user: &str) -> Vec<AuthField> {
    vec![
        AuthField {
            name: "use_login_shell",
            prompt: "Use a login shell when executing commands",
            kind: AuthFieldKind::Bool,
            default: Value::Bool(true),
        },
        AuthField {
            name: "safe_interval",
            prompt: "Minimum interval between connections (s)",
            kind: AuthFieldKind::Float,
            default: Value::from(0.0),
        },
    ]
}

/// Runs commands on the local machine.
pub struct LocalTransport {
    use_login_shell: bool,
}

impl LocalTransport {
    pub fn new(params: &BTreeMap<String, Value>) -> Self {
        Self {
            use_login_shell: param_bool(params, "use_login_shell", true),
        }
    }

    fn run(&self, command: &str, login_shell: bool) -> Result<(i32, String, String)> {
        let mut sh = Command::new("sh");
        if login_shell {
            sh.arg("-l");
        }
        sh.arg("-c").arg(command);

        trace!("local exec: sh {}-c {:?}", if login_shell { "-l " } else { "" }, command);
        let output = sh
            .output()
            .with_context(|| format!("failed to run local command: {command}"))?;

        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }
}

impl Transport for LocalTransport {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn open(&self) -> Result<()> {
        // A local "connection" only needs a working shell.
        let (code, _, stderr) = self.run("true", false)?;
        if code != 0 {
            anyhow::bail!("local shell is not usable: {stderr}");
        }
        Ok(())
    }

    fn exec_command(&self, command: &str) -> Result<(i32, String, String)> {
        self.run(command, self.use_login_shell)
    }

    fn exec_with_login_shell(
        &self,
        command: &str,
        login_shell: bool,
    ) -> Result<(i32, String, String)> {
        self.run(command, login_shell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_exec_captures_stdout() {
        let transport = LocalTransport::new(&BTreeMap::new());
        let (code, stdout, _) = transport.exec_with_login_shell("echo hello", false).unwrap();
        assert_eq!(code, 0);
        assert_eq!(stdout.trim(), "hello");
    }

    #[test]
    fn test_local_exec_captures_exit_code() {
        let transport = LocalTransport::new(&BTreeMap::new());
        let (code, _, _) = transport.exec_with_login_shell("exit 3", false).unwrap();
        assert_eq!(code, 3);
    }
}
