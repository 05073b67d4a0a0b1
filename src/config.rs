//! Configuration types.
//!
//! The worker reads its settings once at startup. Components receive the
//! pieces they need by reference; nothing reads the environment later.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Roles that may request validation when no override is configured.
pub const DEFAULT_REQUIRED_ROLES: &[&str] = &["tdei-admin", "poc", "osw_data_generator"];

/// Message type marker that skips the authorization step.
pub const DEFAULT_BYPASS_MARKER: &str = "VALIDATION_ONLY";

/// Stage name stamped on every published verdict.
pub const STAGE_NAME: &str = "osw-validation";

/// Which permission backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProvider {
    /// Always grants; for local runs.
    Simulated,
    /// Remote permission service.
    Hosted,
}

impl AuthProvider {
    /// Interpret the `AUTH_SIMULATE` flag. Unrecognised values mean hosted.
    pub fn from_simulate_flag(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("true" | "yes" | "1") => Self::Simulated,
            _ => Self::Hosted,
        }
    }
}

/// Topic and subscription names.
#[derive(Debug, Clone, Default)]
pub struct EventBusConfig {
    pub upload_topic: String,
    pub upload_subscription: String,
    pub validation_topic: String,
}

/// Object storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Container the uploads live in.
    pub container_name: String,
    /// Serve files from this directory instead of over HTTP.
    pub local_root: Option<PathBuf>,
}

/// Authorization settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub provider: AuthProvider,
    /// Permission endpoint (hosted provider only).
    pub permission_url: Option<String>,
    /// Holding any one of these roles is enough.
    pub required_roles: Vec<String>,
    /// Message types containing this marker skip authorization.
    pub bypass_marker: String,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Service name used in log lines.
    pub app_name: String,
    pub event_bus: EventBusConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    /// Parent directory for per-message staging directories.
    pub download_dir: PathBuf,
    /// Ceiling on messages processed at the same time.
    pub max_concurrent_messages: usize,
    /// Maximum number of validator errors reported in a verdict.
    pub max_errors: usize,
    /// Command line of the external structural validator.
    pub validator_command: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "osw-validation".to_string(),
            event_bus: EventBusConfig::default(),
            storage: StorageConfig {
                container_name: "osw".to_string(),
                local_root: None,
            },
            auth: AuthConfig {
                provider: AuthProvider::Hosted,
                permission_url: None,
                required_roles: DEFAULT_REQUIRED_ROLES.iter().map(|r| r.to_string()).collect(),
                bypass_marker: DEFAULT_BYPASS_MARKER.to_string(),
            },
            download_dir: PathBuf::from("./downloads"),
            max_concurrent_messages: 10,
            max_errors: 20,
            validator_command: "osw-validate".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let event_bus = EventBusConfig {
            upload_topic: non_empty("UPLOAD_TOPIC").unwrap_or_default(),
            upload_subscription: non_empty("UPLOAD_SUBSCRIPTION").unwrap_or_default(),
            validation_topic: non_empty("VALIDATION_TOPIC").unwrap_or_default(),
        };

        let storage = StorageConfig {
            container_name: non_empty("CONTAINER_NAME")
                .unwrap_or(defaults.storage.container_name),
            local_root: non_empty("STORAGE_ROOT").map(PathBuf::from),
        };

        let provider = AuthProvider::from_simulate_flag(lookup("AUTH_SIMULATE").as_deref());
        let permission_url = non_empty("AUTH_PERMISSION_URL");
        if provider == AuthProvider::Hosted && permission_url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "AUTH_PERMISSION_URL".to_string(),
                hint: "Set it, or set AUTH_SIMULATE=true for local runs.".to_string(),
            });
        }

        let required_roles = match non_empty("AUTH_REQUIRED_ROLES") {
            Some(raw) => {
                let roles = split_list(&raw);
                if roles.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "AUTH_REQUIRED_ROLES".to_string(),
                        message: "must name at least one role".to_string(),
                    });
                }
                roles
            }
            None => defaults.auth.required_roles,
        };

        let auth = AuthConfig {
            provider,
            permission_url,
            required_roles,
            bypass_marker: non_empty("VALIDATION_BYPASS_MARKER")
                .unwrap_or(defaults.auth.bypass_marker),
        };

        let max_concurrent_messages = parse_positive(
            "MAX_CONCURRENT_MESSAGES",
            non_empty("MAX_CONCURRENT_MESSAGES"),
            defaults.max_concurrent_messages,
        )?;
        let max_errors = parse_positive("MAX_ERRORS", non_empty("MAX_ERRORS"), defaults.max_errors)?;

        Ok(Self {
            app_name: defaults.app_name,
            event_bus,
            storage,
            auth,
            download_dir: non_empty("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            max_concurrent_messages,
            max_errors,
            validator_command: non_empty("VALIDATOR_COMMAND").unwrap_or(defaults.validator_command),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_positive(key: &str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a number: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn simulated_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[("AUTH_SIMULATE", "true")])).unwrap();
        assert_eq!(config.auth.provider, AuthProvider::Simulated);
        assert_eq!(config.storage.container_name, "osw");
        assert_eq!(config.max_concurrent_messages, 10);
        assert_eq!(config.max_errors, 20);
        assert_eq!(config.auth.bypass_marker, "VALIDATION_ONLY");
        assert_eq!(
            config.auth.required_roles,
            vec!["tdei-admin", "poc", "osw_data_generator"]
        );
        assert!(config.storage.local_root.is_none());
    }

    #[test]
    fn hosted_requires_permission_url() {
        let err = WorkerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "AUTH_PERMISSION_URL"));
    }

    #[test]
    fn hosted_with_url() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("AUTH_PERMISSION_URL", "https://auth.example.com/api/v1/hasPermission"),
            ("UPLOAD_TOPIC", "osw-upload"),
            ("UPLOAD_SUBSCRIPTION", "upload-validation-processor"),
            ("VALIDATION_TOPIC", "osw-validation"),
            ("CONTAINER_NAME", "tdei-storage-test"),
        ]))
        .unwrap();
        assert_eq!(config.auth.provider, AuthProvider::Hosted);
        assert_eq!(config.event_bus.upload_topic, "osw-upload");
        assert_eq!(config.event_bus.validation_topic, "osw-validation");
        assert_eq!(config.storage.container_name, "tdei-storage-test");
    }

    #[test]
    fn simulate_flag_values() {
        assert_eq!(AuthProvider::from_simulate_flag(Some("YES")), AuthProvider::Simulated);
        assert_eq!(AuthProvider::from_simulate_flag(Some("1")), AuthProvider::Simulated);
        assert_eq!(AuthProvider::from_simulate_flag(Some("no")), AuthProvider::Hosted);
        assert_eq!(AuthProvider::from_simulate_flag(Some("maybe")), AuthProvider::Hosted);
        assert_eq!(AuthProvider::from_simulate_flag(None), AuthProvider::Hosted);
    }

    #[test]
    fn numeric_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("AUTH_SIMULATE", "true"),
            ("MAX_CONCURRENT_MESSAGES", "4"),
            ("MAX_ERRORS", " 50 "),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrent_messages, 4);
        assert_eq!(config.max_errors, 50);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("AUTH_SIMULATE", "true"),
            ("MAX_CONCURRENT_MESSAGES", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn garbage_number_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("AUTH_SIMULATE", "true"),
            ("MAX_ERRORS", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_ERRORS"));
    }

    #[test]
    fn role_override_is_trimmed() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("AUTH_SIMULATE", "true"),
            ("AUTH_REQUIRED_ROLES", " poc , , tdei-admin "),
        ]))
        .unwrap();
        assert_eq!(config.auth.required_roles, vec!["poc", "tdei-admin"]);
    }

    #[test]
    fn empty_role_override_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("AUTH_SIMULATE", "true"),
            ("AUTH_REQUIRED_ROLES", " , "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
