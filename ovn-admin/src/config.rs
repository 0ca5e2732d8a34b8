// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of the server's TOML configuration file.

use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigDropshot;
use dropshot::ConfigLogging;
use serde::{Deserialize, Serialize};
use slog_error_chain::SlogInlineError;
use thiserror::Error;

/// Configuration for an ovn-admin server.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Configuration for our dropshot server.
    pub dropshot: ConfigDropshot,
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    /// How to reach `ovn-nbctl` and the northbound database.
    #[serde(default)]
    pub nbctl: NbctlConfig,
}

impl Config {
    /// Load a `Config` from the given TOML file.
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct NbctlConfig {
    /// Path to the `ovn-nbctl` binary.
    #[serde(default = "NbctlConfig::default_binary_path")]
    pub binary_path: Utf8PathBuf,
    /// Address of the OVN northbound database, passed as `--db`.
    #[serde(default = "NbctlConfig::default_db_address")]
    pub db_address: String,
    /// Upper bound on any single gateway call, shared by the availability
    /// probe and the command it precedes; calls running longer are treated
    /// as controller unavailability.
    #[serde(default = "NbctlConfig::default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl NbctlConfig {
    fn default_binary_path() -> Utf8PathBuf {
        "ovn-nbctl".into()
    }

    fn default_db_address() -> String {
        "unix:/var/run/ovn/ovnnb_db.sock".to_string()
    }

    fn default_command_timeout_secs() -> u64 {
        10
    }
}

impl Default for NbctlConfig {
    fn default() -> Self {
        Self {
            binary_path: Self::default_binary_path(),
            db_address: Self::default_db_address(),
            command_timeout_secs: Self::default_command_timeout_secs(),
        }
    }
}

#[derive(Debug, Error, SlogInlineError)]
pub enum LoadError {
    #[error("error reading \"{path}\"")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\"")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [dropshot]
            bind_address = "[::1]:12230"

            [log]
            mode = "stderr-terminal"
            level = "info"

            [nbctl]
            binary_path = "/usr/bin/ovn-nbctl"
            db_address = "tcp:127.0.0.1:6641"
            command_timeout_secs = 30
            "#,
        )
        .expect("parsed config");
        assert_eq!(config.nbctl.binary_path, "/usr/bin/ovn-nbctl");
        assert_eq!(config.nbctl.db_address, "tcp:127.0.0.1:6641");
        assert_eq!(config.nbctl.command_timeout_secs, 30);
    }

    #[test]
    fn nbctl_section_is_optional_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [dropshot]
            bind_address = "[::1]:12230"

            [log]
            mode = "stderr-terminal"
            level = "info"
            "#,
        )
        .expect("parsed config");
        assert_eq!(config.nbctl, NbctlConfig::default());
    }
}
