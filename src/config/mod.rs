//! # Configuration Management
//!
//! YAML configuration for the Herald service, loaded from the path in
//! `HERALD_CONFIG` with environment-variable overrides applied afterwards.
//! Every section carries serde defaults so a minimal (or absent) file still
//! yields a runnable configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::Policy;
use crate::errors::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bearer token required on protected API routes; from `HERALD_API_TOKEN`.
    /// Empty disables request authentication.
    #[serde(skip)]
    pub api_token: String,

    pub server: ServerConfig,
    pub providers: Vec<ProviderConfig>,
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
    pub alerts: AlertsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8765 }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One secret-provider backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub token: String,
    pub priority: u32,
}

/// Deploy-orchestrator webhook sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl OrchestratorConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Encrypted cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_policy: Policy,
    /// Default TTL for cached entries, seconds
    pub default_ttl: u64,
    /// Passphrase for the at-rest data key; empty disables the cache
    pub encryption_key: String,
    pub data_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_policy: Policy::Memory,
            default_ttl: 3600,
            encryption_key: String::new(),
            data_path: PathBuf::from("/data/cache.db"),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: false, path: PathBuf::new(), retention_days: 30 }
    }
}

/// Alerting thresholds for the health watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Days before token expiry at which a warning alert fires; 0 disables
    pub token_expiry_warning_days: u32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { token_expiry_warning_days: 7 }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file (empty path = defaults only) and
    /// apply environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut cfg = if path.is_empty() {
            AppConfig::default()
        } else {
            let data = std::fs::read_to_string(path)
                .map_err(|e| Error::io(e, format!("read config file {path:?}")))?;
            serde_yaml::from_str(&data)
                .map_err(|e| Error::config(format!("parse config file {path:?}: {e}")))?
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HERALD_API_TOKEN") {
            if !v.is_empty() {
                self.api_token = v;
            }
        }
        if let Ok(v) = std::env::var("OP_CONNECT_TOKEN") {
            if !v.is_empty() {
                for p in self.providers.iter_mut().filter(|p| p.kind == "connect_server") {
                    p.token = v.clone();
                }
            }
        }
        if let Ok(v) = std::env::var("OP_SERVICE_ACCOUNT_TOKEN") {
            if !v.is_empty() {
                let mut found = false;
                for p in self.providers.iter_mut().filter(|p| p.kind == "service_account") {
                    p.token = v.clone();
                    found = true;
                }
                // Auto-create a default service-account provider when none is configured
                if !found {
                    self.providers.push(ProviderConfig {
                        name: "service-account".to_string(),
                        kind: "service_account".to_string(),
                        url: String::new(),
                        token: v,
                        priority: 1,
                    });
                }
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_API_KEY") {
            if !v.is_empty() {
                self.orchestrator.api_key = v;
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_API_SECRET") {
            if !v.is_empty() {
                self.orchestrator.api_secret = v;
            }
        }
        if let Ok(v) = std::env::var("HERALD_CACHE_KEY") {
            if !v.is_empty() {
                self.cache.encryption_key = v;
            }
        }
        if let Ok(v) = std::env::var("HERALD_CACHE_DATA_PATH") {
            if !v.is_empty() {
                self.cache.data_path = PathBuf::from(v);
            }
        }
    }

    /// Validate the configuration beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        for p in &self.providers {
            if p.name.is_empty() {
                return Err(Error::config("provider name cannot be empty"));
            }
            match p.kind.as_str() {
                "connect_server" | "service_account" => {}
                other => {
                    return Err(Error::config(format!(
                        "provider {:?}: unknown type {other:?}",
                        p.name
                    )));
                }
            }
            if p.kind == "connect_server" && p.url.is_empty() {
                return Err(Error::config(format!(
                    "provider {:?}: connect_server requires a url",
                    p.name
                )));
            }
        }
        if self.audit.enabled && self.audit.path.as_os_str().is_empty() {
            return Err(Error::config("audit.path is required when audit is enabled"));
        }
        Ok(())
    }
}
