//! Authorization of upload requesters.
//!
//! - `gate`: the policy applied per message (bypass, any-of roles, fail-closed)
//! - `hosted`: remote permission service client
//! - `simulated`: always-grant provider for local runs

pub mod gate;
pub mod hosted;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AuthConfig, AuthProvider};
use crate::error::{AuthError, ConfigError};

pub use gate::{AuthDecision, Authorizer};
pub use hosted::HostedPermissionProvider;
pub use simulated::SimulatedPermissionProvider;

/// Question put to the permission backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub user_id: String,
    /// Project group the request is scoped to.
    pub project_group_id: String,
    pub roles: Vec<String>,
    /// `false`: holding any one role is enough.
    pub require_all: bool,
}

/// Permission backend.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// `Ok(None)` means the backend gave no answer.
    async fn has_permission(&self, request: &PermissionRequest) -> Result<Option<bool>, AuthError>;
}

/// Create the permission provider selected by configuration.
pub fn create_provider(config: &AuthConfig) -> Result<Arc<dyn PermissionProvider>, ConfigError> {
    match config.provider {
        AuthProvider::Simulated => {
            tracing::warn!("Using simulated authorization; every requester is granted");
            Ok(Arc::new(SimulatedPermissionProvider))
        }
        AuthProvider::Hosted => {
            let url = config
                .permission_url
                .clone()
                .ok_or_else(|| ConfigError::MissingRequired {
                    key: "AUTH_PERMISSION_URL".to_string(),
                    hint: "The hosted provider needs the permission endpoint.".to_string(),
                })?;
            tracing::info!("Using hosted authorization ({})", url);
            let provider = HostedPermissionProvider::new(url).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "AUTH_PERMISSION_URL".to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok(Arc::new(provider))
        }
    }
}
