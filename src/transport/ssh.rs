//! SSH transport: commands run on a remote host through the system `ssh`
//! client, the same mechanism used for remote workers.

use anyhow::{Context, Result};
use log::trace;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Command;

use super::{param_bool, param_i64, param_str, AuthField, AuthFieldKind, Transport};

/// Auth-params schema for the ssh transport, in prompt order.
pub fn auth_schema(acting_user: &str) -> Vec<AuthField> {
    vec![
        AuthField {
            name: "username",
            prompt: "Remote user name",
            kind: AuthFieldKind::Text,
            default: Value::String(acting_user.to_string()),
        },
        AuthField {
            name: "port",
            prompt: "SSH port",
            kind: AuthFieldKind::Integer,
            default: Value::from(22),
        },
        AuthField {
            name: "look_for_keys",
            prompt: "Look for keys in the standard SSH locations",
            kind: AuthFieldKind::Bool,
            default: Value::Bool(true),
        },
        AuthField {
            name: "key_filename",
            prompt: "Private key file",
            kind: AuthFieldKind::Text,
            default: Value::String(String::new()),
        },
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
            default: Value::from(30.0),
        },
    ]
}

/// Runs commands on a remote host via the `ssh` binary.
pub struct SshTransport {
    hostname: String,
    username: Option<String>,
    port: Option<i64>,
    key_filename: Option<String>,
    use_login_shell: bool,
}

impl SshTransport {
    pub fn new(hostname: &str, params: &BTreeMap<String, Value>) -> Self {
        Self {
            hostname: hostname.to_string(),
            username: param_str(params, "username")
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            port: param_i64(params, "port"),
            key_filename: param_str(params, "key_filename")
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            use_login_shell: param_bool(params, "use_login_shell", true),
        }
    }

    fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }

    fn base_command(&self) -> Command {
        let mut ssh = Command::new("ssh");
        // Never hang on a password prompt; configuration must be key-based.
        ssh.arg("-o").arg("BatchMode=yes");
        if let Some(port) = self.port {
            ssh.arg("-p").arg(port.to_string());
        }
        if let Some(key) = &self.key_filename {
            ssh.arg("-i").arg(key);
        }
        ssh.arg(self.destination());
        ssh
    }

    fn run(&self, command: &str, login_shell: bool) -> Result<(i32, String, String)> {
        let remote = if login_shell {
            format!("sh -l -c {}", shell_quote(command))
        } else {
            format!("sh -c {}", shell_quote(command))
        };

        let mut ssh = self.base_command();
        ssh.arg(remote);

        trace!("ssh exec on {}: {:?}", self.hostname, command);
        let output = ssh
            .output()
            .with_context(|| format!("failed to run ssh to {}", self.hostname))?;

        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }
}

impl Transport for SshTransport {
    fn kind(&self) -> &'static str {
        "ssh"
    }

    fn open(&self) -> Result<()> {
        let (code, _, stderr) = self.run("true", false)?;
        if code != 0 {
            anyhow::bail!("cannot open ssh connection to {}: {stderr}", self.hostname);
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

/// Single-quote a string for the remote shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_includes_username() {
        let mut params = BTreeMap::new();
        params.insert("username".to_string(), Value::String("alice".to_string()));
        let transport = SshTransport::new("host1.example.com", &params);
        assert_eq!(transport.destination(), "alice@host1.example.com");
    }

    #[test]
    fn test_destination_without_username() {
        let transport = SshTransport::new("host1.example.com", &BTreeMap::new());
        assert_eq!(transport.destination(), "host1.example.com");
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("echo 'hi'"), r"'echo '\''hi'\'''");
    }

    #[test]
    fn test_empty_key_filename_is_ignored() {
        let mut params = BTreeMap::new();
        params.insert("key_filename".to_string(), Value::String(String::new()));
        let transport = SshTransport::new("host", &params);
        assert!(transport.key_filename.is_none());
    }
}
