//! Configuration for the DWL download client.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DWL_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/dwl/config.toml
//!   3. ~/.config/dwl/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DwlConfig {
    pub retry: RetryConfig,
    pub keys: KeysConfig,
    pub workspace: WorkspaceConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of HEAD attempts before treating the origin as unreachable.
    pub head_attempts: u32,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// What to do when the origin answers a ranged GET with a plain 200
    /// instead of 206 Partial Content (spec §9 open question (a)).
    pub range_not_honoured: RangeNotHonoured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeNotHonoured {
    /// Discard the bytes already on disk and restart the download from
    /// offset zero against the full 200 response.
    Realign,
    /// Treat it as a protocol violation and fail with `UPDATE_FAILED`.
    Fail,
}

impl Default for RangeNotHonoured {
    fn default() -> Self {
        RangeNotHonoured::Realign
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// DER-encoded RSA public key used to verify firmware packages.
    /// Falls back to a compiled-in key when unset.
    pub firmware_public_key_path: Option<PathBuf>,
    /// DER-encoded RSA public key used to verify software packages.
    pub software_public_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Where the resumable workspace record and staged package bytes live.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Loopback port the daemon's status/control HTTP surface listens on.
    pub port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DwlConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            keys: KeysConfig::default(),
            workspace: WorkspaceConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            head_attempts: 3,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            range_not_honoured: RangeNotHonoured::default(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            firmware_public_key_path: None,
            software_public_key_path: None,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("workspace"),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { port: 9180 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("dwl")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("dwl")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DwlConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DwlConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DWL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DwlConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply DWL_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DWL_RETRY__HEAD_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.retry.head_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("DWL_RETRY__CONNECT_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.retry.connect_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("DWL_RETRY__READ_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.retry.read_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("DWL_RETRY__RANGE_NOT_HONOURED") {
            self.retry.range_not_honoured = match v.as_str() {
                "fail" => RangeNotHonoured::Fail,
                _ => RangeNotHonoured::Realign,
            };
        }
        if let Ok(v) = std::env::var("DWL_KEYS__FIRMWARE_PUBLIC_KEY_PATH") {
            self.keys.firmware_public_key_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DWL_KEYS__SOFTWARE_PUBLIC_KEY_PATH") {
            self.keys.software_public_key_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DWL_WORKSPACE__PATH") {
            self.workspace.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DWL_STATUS__PORT") {
            if let Ok(p) = v.parse() {
                self.status.port = p;
            }
        }
    }
}
