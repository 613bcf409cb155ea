//! Configuration file management for flowrig.
//!
//! Provides a TOML config file at `~/.config/flowrig/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use flowrig_core::{ProcessSpec, SettlePolicy, Topology};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

/// On-disk config. Every section and key is optional; missing values fall
/// back to the defaults below.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub build: BuildSection,
    pub coordinator: CoordinatorSection,
    pub worker: WorkerSection,
    pub settle: SettleSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Build command. An empty list skips the build step.
    pub command: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: vec!["make".to_string(), "jars".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    pub command: Vec<String>,
    pub port: u16,
    /// Passed as `--archive <archive>`; skipped when empty.
    pub archive: String,
    /// Flow to run, passed as the final argument; skipped when empty.
    pub flow: String,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            command: java_command("dapper.ui.FlowManagerDriver"),
            port: 12121,
            archive: "dapper-ex.jar".to_string(),
            flow: "ex.SimpleTest".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub command: Vec<String>,
    /// Host workers connect to; the coordinator port is appended.
    pub host: String,
    pub count: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            command: java_command("dapper.client.ClientDriver"),
            host: "localhost".to_string(),
            count: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleSection {
    /// Fixed delay, and the fallback when a probe times out.
    pub delay_ms: u64,
    /// Poll the coordinator's port instead of sleeping blindly.
    pub probe: bool,
    pub probe_timeout_ms: u64,
    pub probe_interval_ms: u64,
}

impl Default for SettleSection {
    fn default() -> Self {
        Self {
            delay_ms: 2000,
            probe: false,
            probe_timeout_ms: 10_000,
            probe_interval_ms: 100,
        }
    }
}

fn java_command(main_class: &str) -> Vec<String> {
    ["java", "-ea", "-Xmx128M", "-cp", "dapper.jar", main_class]
        .into_iter()
        .map(String::from)
        .collect()
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the flowrig config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/flowrig` or `~/.config/flowrig`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("flowrig");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("flowrig")
}

/// Return the default config file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse a config file. Returns an error if it does not exist.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    tracing::debug!(path = %path.display(), "loading config file");
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Find and load the config file.
///
/// An explicit path (`--config` or `FLOWRIG_CONFIG`) must exist. The
/// default path is optional; when it is missing the built-in defaults are
/// used.
pub fn locate_config(cli_path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = cli_path {
        return load_config(path);
    }
    if let Ok(path) = std::env::var("FLOWRIG_CONFIG") {
        return load_config(Path::new(&path));
    }
    let path = config_path();
    if path.exists() {
        load_config(&path)
    } else {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        Ok(ConfigFile::default())
    }
}

/// Serialize and write a config file, creating parent dirs as needed.
pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None`/`false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub port: Option<u16>,
    pub settle_ms: Option<u64>,
    pub probe: bool,
    pub skip_build: bool,
}

/// Read an env var and parse it, treating unset as `None`.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} env var is not valid: {value:?}")),
        Err(_) => Ok(None),
    }
}

/// Resolve the topology using the chain: CLI flag > env var > config file > default.
///
/// - worker count: `--workers` > `FLOWRIG_WORKERS` > `worker.count`
/// - port: `--port` > `FLOWRIG_PORT` > `coordinator.port`
/// - settle delay: `--settle-ms` > `settle.delay_ms`
pub fn resolve(file: ConfigFile, overrides: &Overrides) -> Result<Topology> {
    let workers = match overrides.workers {
        Some(n) => n,
        None => env_parse("FLOWRIG_WORKERS")?.unwrap_or(file.worker.count),
    };
    let port = match overrides.port {
        Some(p) => p,
        None => env_parse("FLOWRIG_PORT")?.unwrap_or(file.coordinator.port),
    };

    let build = if overrides.skip_build || file.build.command.is_empty() {
        None
    } else {
        Some(ProcessSpec::from_tokens(file.build.command).context("invalid build.command")?)
    };

    let mut coordinator_args = vec!["--port".to_string(), port.to_string()];
    if !file.coordinator.archive.is_empty() {
        coordinator_args.push("--archive".to_string());
        coordinator_args.push(file.coordinator.archive.clone());
    }
    if !file.coordinator.flow.is_empty() {
        coordinator_args.push(file.coordinator.flow.clone());
    }
    let coordinator = ProcessSpec::from_tokens(file.coordinator.command)
        .context("invalid coordinator.command")?
        .with_args(coordinator_args);

    if file.worker.host.trim().is_empty() {
        bail!("worker.host must not be empty");
    }
    let address = format!("{}:{port}", file.worker.host);
    let worker = ProcessSpec::from_tokens(file.worker.command)
        .context("invalid worker.command")?
        .with_args(["--host".to_string(), address.clone()]);

    let delay = Duration::from_millis(overrides.settle_ms.unwrap_or(file.settle.delay_ms));
    let settle = if overrides.probe || file.settle.probe {
        SettlePolicy::Probe {
            address,
            interval: Duration::from_millis(file.settle.probe_interval_ms.max(1)),
            timeout: Duration::from_millis(file.settle.probe_timeout_ms),
            fallback: delay,
        }
    } else {
        SettlePolicy::Delay(delay)
    };

    Ok(Topology {
        build,
        coordinator,
        worker,
        workers,
        settle,
    })
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn clear_env() {
        unsafe { std::env::remove_var("FLOWRIG_WORKERS") };
        unsafe { std::env::remove_var("FLOWRIG_PORT") };
    }

    #[test]
    fn defaults_match_the_smoke_test_topology() {
        let _lock = lock_env();
        clear_env();

        let topology = resolve(ConfigFile::default(), &Overrides::default()).unwrap();

        assert_eq!(topology.build.unwrap().to_string(), "make jars");
        assert_eq!(
            topology.coordinator.to_string(),
            "java -ea -Xmx128M -cp dapper.jar dapper.ui.FlowManagerDriver \
             --port 12121 --archive dapper-ex.jar ex.SimpleTest"
        );
        assert_eq!(
            topology.worker.to_string(),
            "java -ea -Xmx128M -cp dapper.jar dapper.client.ClientDriver --host localhost:12121"
        );
        assert_eq!(topology.workers, 4);
        assert_eq!(topology.settle, SettlePolicy::Delay(Duration::from_secs(2)));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [worker]
            count = 2

            [coordinator]
            command = ["./server"]
            flow = ""
            "#,
        )
        .unwrap();

        assert_eq!(file.worker.count, 2);
        assert_eq!(file.worker.host, "localhost");
        assert_eq!(file.coordinator.command, vec!["./server"]);
        assert_eq!(file.coordinator.port, 12121);
        assert!(file.coordinator.flow.is_empty());
        assert_eq!(file.build, BuildSection::default());
    }

    #[test]
    fn cli_flag_overrides_env_and_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var("FLOWRIG_WORKERS", "7") };
        unsafe { std::env::set_var("FLOWRIG_PORT", "4000") };

        let overrides = Overrides {
            workers: Some(1),
            port: Some(5000),
            ..Overrides::default()
        };
        let topology = resolve(ConfigFile::default(), &overrides).unwrap();

        clear_env();
        assert_eq!(topology.workers, 1);
        assert!(topology.worker.to_string().ends_with("--host localhost:5000"));
    }

    #[test]
    fn env_var_overrides_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var("FLOWRIG_WORKERS", "0") };
        unsafe { std::env::set_var("FLOWRIG_PORT", "4000") };

        let topology = resolve(ConfigFile::default(), &Overrides::default()).unwrap();

        clear_env();
        assert_eq!(topology.workers, 0);
        assert!(topology.coordinator.to_string().contains("--port 4000"));
    }

    #[test]
    fn invalid_env_var_is_an_error() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var("FLOWRIG_WORKERS", "many") };

        let result = resolve(ConfigFile::default(), &Overrides::default());

        clear_env();
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("FLOWRIG_WORKERS"), "unexpected error: {msg}");
    }

    #[test]
    fn skip_build_and_empty_build_command_both_skip() {
        let _lock = lock_env();
        clear_env();

        let skipped = resolve(
            ConfigFile::default(),
            &Overrides {
                skip_build: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        assert!(skipped.build.is_none());

        let mut file = ConfigFile::default();
        file.build.command.clear();
        assert!(resolve(file, &Overrides::default()).unwrap().build.is_none());
    }

    #[test]
    fn probe_uses_worker_address_and_delay_as_fallback() {
        let _lock = lock_env();
        clear_env();

        let overrides = Overrides {
            probe: true,
            settle_ms: Some(250),
            ..Overrides::default()
        };
        let topology = resolve(ConfigFile::default(), &overrides).unwrap();

        assert_eq!(
            topology.settle,
            SettlePolicy::Probe {
                address: "localhost:12121".to_string(),
                interval: Duration::from_millis(100),
                timeout: Duration::from_secs(10),
                fallback: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn empty_coordinator_command_is_rejected() {
        let _lock = lock_env();
        clear_env();

        let mut file = ConfigFile::default();
        file.coordinator.command.clear();
        let msg = format!("{:#}", resolve(file, &Overrides::default()).unwrap_err());
        assert!(msg.contains("coordinator.command"), "unexpected error: {msg}");
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut original = ConfigFile::default();
        original.worker.count = 9;
        original.settle.probe = true;

        save_config(&path, &original).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("absent.toml");

        let msg = format!("{:#}", locate_config(Some(&missing)).unwrap_err());
        assert!(msg.contains("failed to read config file"), "unexpected error: {msg}");
    }

    #[test]
    fn missing_default_path_uses_defaults() {
        let _lock = lock_env();

        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        let orig_cfg = std::env::var("FLOWRIG_CONFIG").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::remove_var("FLOWRIG_CONFIG") };

        let result = locate_config(None);

        // Restore env before asserting, to avoid poisoning the mutex on failure.
        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        if let Some(c) = orig_cfg {
            unsafe { std::env::set_var("FLOWRIG_CONFIG", c) };
        }

        assert_eq!(result.unwrap(), ConfigFile::default());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("flowrig/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
