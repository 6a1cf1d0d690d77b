//! Config - プラットフォーム設定
//!
//! # 読み込み順（後勝ち）
//! 1. 組み込みのデフォルト
//! 2. 任意の TOML ファイル
//! 3. `SHIPYARD_` 接頭辞の環境変数（ネストは `__` 区切り、例: `SHIPYARD_CLUSTER__PLATFORM_DOMAIN`）
//!
//! # Fail-fast 設計
//! 読み込み直後に `validate()` で矛盾を弾き、起動時に失敗させます。

use serde::{Deserialize, Serialize};

use crate::domain::version::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub resources: ResourceTier,

    #[serde(default)]
    pub probes: ProbeConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Namespace every app object lives in.
    pub namespace: String,

    /// Apps are served at `app-{id}.{platform_domain}`.
    pub platform_domain: String,

    /// Prefix for the tenant/app labels (`{prefix}/tenant`, `{prefix}/app-id`).
    pub label_prefix: String,

    /// Runtime image, pinned per platform release.
    pub runtime_image: String,

    pub container_port: u16,
    pub service_port: u16,
    pub health_path: String,

    #[serde(default = "default_url_scheme")]
    pub url_scheme: String,

    /// Group/version/kind of the routing rule resource.
    #[serde(default = "default_routing_api_version")]
    pub routing_api_version: String,
    #[serde(default = "default_routing_kind")]
    pub routing_kind: String,
    #[serde(default = "default_entry_points")]
    pub routing_entry_points: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "apps".to_string(),
            platform_domain: "apps.localhost".to_string(),
            label_prefix: "shipyard.dev".to_string(),
            runtime_image: "ghcr.io/shipyard/python-runtime:3.12-v1".to_string(),
            container_port: 8000,
            service_port: 80,
            health_path: "/health".to_string(),
            url_scheme: default_url_scheme(),
            routing_api_version: default_routing_api_version(),
            routing_kind: default_routing_kind(),
            routing_entry_points: default_entry_points(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTier {
    pub cpu_request: String,
    pub memory_request: String,
    pub cpu_limit: String,
    pub memory_limit: String,
}

impl Default for ResourceTier {
    fn default() -> Self {
        Self {
            cpu_request: "100m".to_string(),
            memory_request: "128Mi".to_string(),
            cpu_limit: "500m".to_string(),
            memory_limit: "512Mi".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTiming {
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
}

/// Liveness tolerates slow first boot; readiness pulls traffic quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub liveness: ProbeTiming,
    pub readiness: ProbeTiming,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            liveness: ProbeTiming {
                initial_delay_seconds: 30,
                period_seconds: 20,
            },
            readiness: ProbeTiming {
                initial_delay_seconds: 5,
                period_seconds: 5,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub max_total_bytes: usize,
    pub history_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_bytes: 100 * 1024,
            max_total_bytes: 500 * 1024,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_url_scheme() -> String {
    "https".to_string()
}

fn default_routing_api_version() -> String {
    "traefik.io/v1alpha1".to_string()
}

fn default_routing_kind() -> String {
    "IngressRoute".to_string()
}

fn default_entry_points() -> Vec<String> {
    vec!["websecure".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PlatformConfig {
    /// Load configuration from defaults, an optional file, and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&PlatformConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SHIPYARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: PlatformConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ProbeConfig { liveness, readiness } = self.probes;
        if liveness.initial_delay_seconds <= readiness.initial_delay_seconds
            || liveness.period_seconds <= readiness.period_seconds
        {
            return Err(ConfigError::Invalid(
                "liveness probe delay and period must exceed the readiness probe's".to_string(),
            ));
        }
        if self.limits.history_limit == 0 {
            return Err(ConfigError::Invalid("limits.history_limit must be at least 1".to_string()));
        }
        if self.limits.max_file_bytes > self.limits.max_total_bytes {
            return Err(ConfigError::Invalid(
                "limits.max_file_bytes cannot exceed limits.max_total_bytes".to_string(),
            ));
        }
        if self.cluster.platform_domain.is_empty() {
            return Err(ConfigError::Invalid("cluster.platform_domain is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlatformConfig::default();
        assert_eq!(config.cluster.namespace, "apps");
        assert_eq!(config.cluster.container_port, 8000);
        assert_eq!(config.limits.max_files, 10);
        assert_eq!(config.limits.history_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probe_defaults_favor_slow_liveness() {
        let probes = ProbeConfig::default();
        assert!(probes.liveness.initial_delay_seconds > probes.readiness.initial_delay_seconds);
        assert!(probes.liveness.period_seconds > probes.readiness.period_seconds);
    }

    #[test]
    fn test_rejects_inverted_probes() {
        let mut config = PlatformConfig::default();
        config.probes.liveness = config.probes.readiness;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = PlatformConfig::load(None).unwrap();
        assert_eq!(config.cluster.service_port, 80);
    }

    #[test]
    fn test_partial_document_is_filled_with_defaults() {
        let config: PlatformConfig = serde_json::from_str(r#"{ "limits": { "max_files": 3, "max_file_bytes": 10, "max_total_bytes": 30, "history_limit": 5 } }"#).unwrap();
        assert_eq!(config.limits.max_files, 3);
        assert_eq!(config.cluster, ClusterConfig::default());
    }
}
