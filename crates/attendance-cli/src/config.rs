use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Optional `config.toml` contents. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub state_path: Option<PathBuf>,
    pub http_timeout_secs: Option<u64>,
    pub scan_timeout_secs: Option<u64>,
    pub device: Option<String>,
}

impl FileConfig {
    /// Read a config file; a missing file yields the empty config.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// CLI configuration: config file, overridden by `ATTENDANCE_*` environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint from env or file. `None` falls back to the URL saved in local state.
    pub api_url: Option<String>,
    /// Local state file (API URL, admin token, last result).
    pub state_path: PathBuf,
    pub http_timeout: Duration,
    /// How long `scan` waits for a stable match before giving up.
    pub scan_timeout: Duration,
    /// Device label reported with each log entry.
    pub device: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let path = config_path(&env);
        let file = FileConfig::read(&path)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(Self::resolve(file, env))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = env("ATTENDANCE_API_URL")
            .or(file.api_url)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let state_path = env("ATTENDANCE_STATE_PATH")
            .map(PathBuf::from)
            .or(file.state_path)
            .unwrap_or_else(|| data_dir(&env).join("state.json"));

        Self {
            api_url,
            state_path,
            http_timeout: Duration::from_secs(env_u64(
                &env,
                "ATTENDANCE_HTTP_TIMEOUT_SECS",
                file.http_timeout_secs.unwrap_or(30),
            )),
            scan_timeout: Duration::from_secs(env_u64(
                &env,
                "ATTENDANCE_SCAN_TIMEOUT_SECS",
                file.scan_timeout_secs.unwrap_or(30),
            )),
            device: env("ATTENDANCE_DEVICE")
                .or(file.device)
                .unwrap_or_else(|| "desktop".to_string()),
        }
    }
}

fn home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(env("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn config_path(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(p) = env("ATTENDANCE_CONFIG") {
        return PathBuf::from(p);
    }
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".config"))
        .join("attendance/config.toml")
}

fn data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".local/share"))
        .join("attendance")
}

fn env_u64(env: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::resolve(FileConfig::default(), env_of(&[("HOME", "/home/hr")]));
        assert!(cfg.api_url.is_none());
        assert_eq!(
            cfg.state_path,
            PathBuf::from("/home/hr/.local/share/attendance/state.json")
        );
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.scan_timeout, Duration::from_secs(30));
        assert_eq!(cfg.device, "desktop");
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig {
            api_url: Some("https://file.example/exec".into()),
            http_timeout_secs: Some(5),
            device: Some("kiosk-1".into()),
            ..Default::default()
        };
        let cfg = Config::resolve(
            file,
            env_of(&[
                ("ATTENDANCE_API_URL", " https://env.example/exec "),
                ("ATTENDANCE_HTTP_TIMEOUT_SECS", "12"),
            ]),
        );
        assert_eq!(cfg.api_url.as_deref(), Some("https://env.example/exec"));
        assert_eq!(cfg.http_timeout, Duration::from_secs(12));
        assert_eq!(cfg.device, "kiosk-1");
    }

    #[test]
    fn test_bad_env_number_falls_back() {
        let cfg = Config::resolve(
            FileConfig::default(),
            env_of(&[("ATTENDANCE_SCAN_TIMEOUT_SECS", "soon")]),
        );
        assert_eq!(cfg.scan_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_path_resolution() {
        assert_eq!(
            config_path(&env_of(&[("ATTENDANCE_CONFIG", "/etc/attendance.toml")])),
            PathBuf::from("/etc/attendance.toml")
        );
        assert_eq!(
            config_path(&env_of(&[("XDG_CONFIG_HOME", "/cfg")])),
            PathBuf::from("/cfg/attendance/config.toml")
        );
    }

    #[test]
    fn test_file_config_read() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileConfig::read(&dir.path().join("none.toml")).unwrap();
        assert!(missing.api_url.is_none());

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_url = \"https://x.example/exec\"\nscan_timeout_secs = 10\n")
            .unwrap();
        let cfg = FileConfig::read(&path).unwrap();
        assert_eq!(cfg.api_url.as_deref(), Some("https://x.example/exec"));
        assert_eq!(cfg.scan_timeout_secs, Some(10));

        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(matches!(
            FileConfig::read(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
