// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway to the external OVN controller via the `ovn-nbctl` binary.

use crate::config::NbctlConfig;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use slog_error_chain::SlogInlineError;
use std::io;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

/// The seam between this server and the external controller: everything the
/// reconciler and provisioner do goes through one of these. Injectable so
/// tests substitute a recording fake (see [`crate::fakes`]).
#[async_trait]
pub trait NbctlGateway: Send + Sync {
    /// Side-effect-free reachability probe of the northbound database.
    async fn check_available(&self) -> bool;

    /// Run a single `ovn-nbctl` invocation, returning its stdout on a zero
    /// exit. Decoding the output is the caller's business.
    async fn run(&self, args: &[String]) -> Result<String, GatewayError>;
}

#[derive(Debug)]
pub struct CommandFailureInfo {
    pub command: String,
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl std::fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Command [{}] executed and failed with status: {}",
            self.command, self.status
        )?;
        write!(f, "  stdout: {}", self.stdout)?;
        write!(f, "  stderr: {}", self.stderr)
    }
}

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum GatewayError {
    /// The controller is unreachable (probe failed or the command timed
    /// out). Transient; the reconciler may retry these.
    #[error("OVN northbound database is unavailable: {reason}")]
    Unavailable { reason: String },

    /// The `ovn-nbctl` binary itself is absent from the environment.
    #[error("`{binary}` not found; is OVN installed?")]
    ToolMissing { binary: String },

    /// The process could not be spawned for some other reason.
    #[error("failed to start execution of [{command}]")]
    Invoke {
        command: String,
        #[source]
        err: io::Error,
    },

    /// The tool ran and exited non-zero. Deterministic; never retried.
    #[error("{0}")]
    Command(Box<CommandFailureInfo>),
}

fn command_to_string(command: &std::process::Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|s| s.to_string_lossy().into())
        .collect::<Vec<String>>()
        .join(" ")
}

/// The real gateway: spawns `ovn-nbctl` pointed at the configured northbound
/// database, with a bounded per-call timeout.
#[derive(Debug)]
pub struct NbctlCli {
    binary_path: Utf8PathBuf,
    db_address: String,
    command_timeout: Duration,
}

impl NbctlCli {
    pub fn new(config: &NbctlConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            db_address: config.db_address.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    async fn output(
        &self,
        args: &[String],
        deadline: Instant,
    ) -> Result<Output, GatewayError> {
        let mut command = Command::new(&self.binary_path);
        command.kill_on_drop(true);
        command.arg(format!("--db={}", self.db_address));
        command.args(args);
        let invocation = command_to_string(command.as_std());
        match tokio::time::timeout_at(deadline, command.output()).await {
            Err(_elapsed) => Err(GatewayError::Unavailable {
                reason: format!(
                    "[{invocation}] did not complete within {:?}",
                    self.command_timeout
                ),
            }),
            Ok(Err(err)) if err.kind() == io::ErrorKind::NotFound => {
                Err(GatewayError::ToolMissing {
                    binary: self.binary_path.to_string(),
                })
            }
            Ok(Err(err)) => {
                Err(GatewayError::Invoke { command: invocation, err })
            }
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// Probe the controller. The controller is the sole authority and may be
    /// reconfigured out-of-band, so reachability is re-checked before every
    /// command rather than cached.
    async fn probe(&self, deadline: Instant) -> Result<(), GatewayError> {
        let output = self.output(&["show".to_string()], deadline).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GatewayError::Unavailable {
                reason: format!(
                    "`ovn-nbctl show` exited {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim(),
                ),
            })
        }
    }
}

#[async_trait]
impl NbctlGateway for NbctlCli {
    async fn check_available(&self) -> bool {
        self.probe(Instant::now() + self.command_timeout).await.is_ok()
    }

    async fn run(&self, args: &[String]) -> Result<String, GatewayError> {
        // One deadline covers the probe and the command together, so a call
        // never blocks longer than the configured timeout.
        let deadline = Instant::now() + self.command_timeout;
        self.probe(deadline).await?;
        let output = self.output(args, deadline).await?;
        if !output.status.success() {
            return Err(GatewayError::Command(Box::new(CommandFailureInfo {
                command: format!(
                    "{} --db={} {}",
                    self.binary_path,
                    self.db_address,
                    args.join(" ")
                ),
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(binary: &str) -> NbctlConfig {
        NbctlConfig {
            binary_path: binary.into(),
            db_address: "unix:/nonexistent/ovnnb_db.sock".to_string(),
            command_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn missing_binary_is_tool_missing() {
        let cli = NbctlCli::new(&config_for("/nonexistent/path/to/ovn-nbctl"));
        let err = cli.run(&["ls-add".to_string()]).await.unwrap_err();
        assert!(
            matches!(err, GatewayError::ToolMissing { .. }),
            "unexpected error: {err}"
        );
        assert!(!cli.check_available().await);
    }

    // `false(1)` stands in for an `ovn-nbctl` whose probe always fails: the
    // gateway must classify that as unavailability, not a command failure.
    #[tokio::test]
    async fn failing_probe_is_unavailable() {
        let cli = NbctlCli::new(&config_for("false"));
        let err = cli.run(&["ls-add".to_string()]).await.unwrap_err();
        assert!(
            matches!(err, GatewayError::Unavailable { .. }),
            "unexpected error: {err}"
        );
        assert!(!cli.check_available().await);
    }

    // A slow probe must eat into the command's budget, not extend it: the
    // configured timeout bounds the whole call, probe included.
    #[tokio::test]
    async fn probe_and_command_share_one_deadline() {
        use std::os::unix::fs::PermissionsExt;

        let dir = camino_tempfile::Utf8TempDir::new().unwrap();
        let script = dir.path().join("slow-nbctl");
        // Probe ("show") takes one second; anything else hangs.
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$2\" = show ]; then sleep 1; exit 0; fi\nsleep 10\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let mut config = config_for(script.as_str());
        config.command_timeout_secs = 2;
        let cli = NbctlCli::new(&config);
        let start = std::time::Instant::now();
        let err = cli.run(&["ls-list".to_string()]).await.unwrap_err();
        assert!(
            matches!(err, GatewayError::Unavailable { .. }),
            "unexpected error: {err}"
        );
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(2700),
            "call outlived its timeout: {elapsed:?}"
        );
    }

    // `echo(1)` stands in for a healthy `ovn-nbctl`: probe succeeds and the
    // command's stdout comes back verbatim.
    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let cli = NbctlCli::new(&config_for("echo"));
        assert!(cli.check_available().await);
        let stdout =
            cli.run(&["ls-list".to_string()]).await.expect("echo ran");
        assert_eq!(
            stdout,
            "--db=unix:/nonexistent/ovnnb_db.sock ls-list\n"
        );
    }
}
