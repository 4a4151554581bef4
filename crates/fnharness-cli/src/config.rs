//! Configuration file management for fnharness.
//!
//! Provides an optional TOML config file at `~/.config/fnharness/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use fnharness_core::HarnessConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub process: ProcessSection,
    pub handshake: HandshakeSection,
    pub invoke: InvokeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessSection {
    /// Environment variable that carries the port to the function.
    pub port_env: Option<String>,
    /// Milliseconds between SIGTERM and SIGKILL on teardown.
    pub grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandshakeSection {
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvokeSection {
    /// Seconds from invocation to the deadline handed to the function.
    pub deadline_secs: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the fnharness config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/fnharness` or
/// `~/.config/fnharness`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fnharness");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fnharness")
}

/// Return the path to the fnharness config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse a config file. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port_env: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub grace_ms: Option<u64>,
}

pub const PORT_ENV_VAR: &str = "FNHARNESS_PORT_ENV";
pub const POLL_INTERVAL_VAR: &str = "FNHARNESS_POLL_INTERVAL_MS";
pub const DEADLINE_VAR: &str = "FNHARNESS_DEADLINE_SECS";
pub const GRACE_VAR: &str = "FNHARNESS_GRACE_MS";

/// Resolve configuration from the command line, the process environment and
/// the config file at `path` (or the default location).
pub fn resolve(cli: &Overrides, path: Option<&Path>) -> Result<HarnessConfig> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let file = load_config_from(&path)?.unwrap_or_default();
    resolve_with(cli, &file, |name| std::env::var(name).ok())
}

/// Resolve configuration using the chain: CLI flag > env var > config file > default.
pub fn resolve_with(
    cli: &Overrides,
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Result<HarnessConfig> {
    let defaults = HarnessConfig::default();

    let port_env = cli
        .port_env
        .clone()
        .or_else(|| env(PORT_ENV_VAR))
        .or_else(|| file.process.port_env.clone())
        .unwrap_or(defaults.port_env);
    anyhow::ensure!(
        !port_env.is_empty() && !port_env.contains('='),
        "invalid port environment variable name {port_env:?}"
    );

    let poll_interval = pick(
        cli.poll_interval_ms,
        &env,
        POLL_INTERVAL_VAR,
        file.handshake.poll_interval_ms,
    )?
    .map_or(defaults.poll_interval, Duration::from_millis);

    let deadline_window = pick(cli.deadline_secs, &env, DEADLINE_VAR, file.invoke.deadline_secs)?
        .map_or(defaults.deadline_window, Duration::from_secs);

    let shutdown_grace = pick(cli.grace_ms, &env, GRACE_VAR, file.process.grace_ms)?
        .map_or(defaults.shutdown_grace, Duration::from_millis);

    Ok(HarnessConfig {
        port_env,
        poll_interval,
        deadline_window,
        shutdown_grace,
    })
}

fn pick(
    cli: Option<u64>,
    env: &impl Fn(&str) -> Option<String>,
    var: &str,
    file: Option<u64>,
) -> Result<Option<u64>> {
    if cli.is_some() {
        return Ok(cli);
    }
    if let Some(raw) = env(var) {
        let value = raw
            .trim()
            .parse()
            .with_context(|| format!("{var} must be a non-negative integer, got {raw:?}"))?;
        return Ok(Some(value));
    }
    Ok(file)
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn file_from(toml_text: &str) -> ConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = resolve_with(&Overrides::default(), &ConfigFile::default(), env_of(&[])).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.port_env, "_LAMBDA_SERVER_PORT");
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.deadline_window, Duration::from_secs(3600));
    }

    #[test]
    fn cli_flag_overrides_all() {
        let cli = Overrides {
            deadline_secs: Some(5),
            ..Overrides::default()
        };
        let file = file_from("[invoke]\ndeadline_secs = 50\n");
        let config = resolve_with(&cli, &file, env_of(&[(DEADLINE_VAR, "500")])).unwrap();
        assert_eq!(config.deadline_window, Duration::from_secs(5));
    }

    #[test]
    fn env_var_overrides_config_file() {
        let file = file_from("[process]\nport_env = \"FROM_FILE\"\ngrace_ms = 10\n");
        let config = resolve_with(
            &Overrides::default(),
            &file,
            env_of(&[(PORT_ENV_VAR, "FROM_ENV")]),
        )
        .unwrap();
        assert_eq!(config.port_env, "FROM_ENV");
        assert_eq!(config.shutdown_grace, Duration::from_millis(10));
    }

    #[test]
    fn config_file_overrides_default() {
        let file = file_from("[handshake]\npoll_interval_ms = 25\n");
        let config = resolve_with(&Overrides::default(), &file, env_of(&[])).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn malformed_env_number_is_an_error() {
        let err = resolve_with(
            &Overrides::default(),
            &ConfigFile::default(),
            env_of(&[(GRACE_VAR, "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(GRACE_VAR), "unexpected error: {err}");
    }

    #[test]
    fn invalid_port_env_name_is_rejected() {
        let cli = Overrides {
            port_env: Some("A=B".to_owned()),
            ..Overrides::default()
        };
        assert!(resolve_with(&cli, &ConfigFile::default(), env_of(&[])).is_err());
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loaded = load_config_from(&tmp.path().join("config.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn config_file_loads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[invoke]\ndeadline_secs = 90\n").unwrap();

        let loaded = load_config_from(&path).unwrap().unwrap();
        assert_eq!(loaded.invoke.deadline_secs, Some(90));
        assert!(loaded.process.port_env.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[invoke]\ndeadline = 90\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("fnharness/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
