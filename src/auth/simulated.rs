//! Simulated permission provider.

use async_trait::async_trait;

use crate::auth::{PermissionProvider, PermissionRequest};
use crate::error::AuthError;

/// Grants every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedPermissionProvider;

#[async_trait]
impl PermissionProvider for SimulatedPermissionProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn has_permission(&self, request: &PermissionRequest) -> Result<Option<bool>, AuthError> {
        tracing::debug!(user_id = %request.user_id, "Simulated authorization granted");
        Ok(Some(true))
    }
}
