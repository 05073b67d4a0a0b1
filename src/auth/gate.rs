//! Per-message authorization policy.
//!
//! - Message types carrying the bypass marker skip the backend entirely.
//! - Otherwise the requester needs any one of the required roles in the
//!   message's project group.
//! - Backend errors and non-answers count as denial.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::auth::{PermissionProvider, PermissionRequest};
use crate::config::AuthConfig;
use crate::envelope::InboundEnvelope;

/// Outcome of the authorization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Marker present; the backend was not asked.
    Bypassed,
    Granted,
    Denied,
}

impl AuthDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

pub struct Authorizer {
    provider: Arc<dyn PermissionProvider>,
    required_roles: Vec<String>,
    bypass_marker: String,
}

impl Authorizer {
    pub fn new(provider: Arc<dyn PermissionProvider>, config: &AuthConfig) -> Self {
        Self {
            provider,
            required_roles: config.required_roles.clone(),
            bypass_marker: config.bypass_marker.clone(),
        }
    }

    /// Whether `envelope` skips authorization.
    pub fn should_bypass(&self, envelope: &InboundEnvelope) -> bool {
        envelope.has_marker(&self.bypass_marker)
    }

    /// Apply the full policy to one message.
    pub async fn authorize(&self, envelope: &InboundEnvelope) -> AuthDecision {
        if self.should_bypass(envelope) {
            debug!(
                message_id = %envelope.message_id,
                message_type = %envelope.message_type,
                "Bypass marker present, skipping authorization"
            );
            return AuthDecision::Bypassed;
        }

        let granted = self
            .is_authorized(
                &self.required_roles,
                &envelope.payload.user_id,
                &envelope.payload.project_group_id,
            )
            .await;
        if granted {
            AuthDecision::Granted
        } else {
            AuthDecision::Denied
        }
    }

    /// Whether `requester_id` holds any of `roles` in `scope_id`. Never errors.
    pub async fn is_authorized(&self, roles: &[String], requester_id: &str, scope_id: &str) -> bool {
        let request = PermissionRequest {
            user_id: requester_id.to_string(),
            project_group_id: scope_id.to_string(),
            roles: roles.to_vec(),
            require_all: false,
        };

        match self.provider.has_permission(&request).await {
            Ok(Some(granted)) => {
                if !granted {
                    warn!(user_id = %requester_id, scope = %scope_id, "Permission denied");
                }
                granted
            }
            Ok(None) => {
                warn!(
                    user_id = %requester_id,
                    provider = self.provider.name(),
                    "Permission backend gave no answer, denying"
                );
                false
            }
            Err(e) => {
                error!(
                    user_id = %requester_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Error validating the request authorization, denying"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::AuthProvider;
    use crate::envelope::Payload;
    use crate::error::AuthError;

    /// Answers with a fixed result and records the requests it saw.
    struct FixedProvider {
        answer: fn() -> Result<Option<bool>, AuthError>,
        calls: AtomicUsize,
        seen: Mutex<Vec<PermissionRequest>>,
    }

    impl FixedProvider {
        fn new(answer: fn() -> Result<Option<bool>, AuthError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PermissionProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn has_permission(
            &self,
            request: &PermissionRequest,
        ) -> Result<Option<bool>, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            (self.answer)()
        }
    }

    fn config() -> AuthConfig {
        AuthConfig {
            provider: AuthProvider::Hosted,
            permission_url: None,
            required_roles: vec!["tdei-admin".into(), "poc".into(), "osw_data_generator".into()],
            bypass_marker: "VALIDATION_ONLY".into(),
        }
    }

    fn envelope(message_type: &str) -> InboundEnvelope {
        InboundEnvelope {
            message_id: "m1".into(),
            message_type: message_type.into(),
            payload: Payload {
                user_id: "user-1".into(),
                project_group_id: "pg-1".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bypass_never_calls_backend() {
        let provider = FixedProvider::new(|| Ok(Some(false)));
        let gate = Authorizer::new(provider.clone(), &config());

        let decision = gate.authorize(&envelope("VALIDATION_ONLY")).await;
        assert_eq!(decision, AuthDecision::Bypassed);
        assert!(decision.is_allowed());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn granted_requests_any_role() {
        let provider = FixedProvider::new(|| Ok(Some(true)));
        let gate = Authorizer::new(provider.clone(), &config());

        assert_eq!(gate.authorize(&envelope("osw-upload")).await, AuthDecision::Granted);
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].require_all);
        assert_eq!(seen[0].roles.len(), 3);
        assert_eq!(seen[0].user_id, "user-1");
        assert_eq!(seen[0].project_group_id, "pg-1");
    }

    #[tokio::test]
    async fn denial_is_denied() {
        let gate = Authorizer::new(FixedProvider::new(|| Ok(Some(false))), &config());
        assert_eq!(gate.authorize(&envelope("osw-upload")).await, AuthDecision::Denied);
    }

    #[tokio::test]
    async fn no_answer_fails_closed() {
        let gate = Authorizer::new(FixedProvider::new(|| Ok(None)), &config());
        assert_eq!(gate.authorize(&envelope("osw-upload")).await, AuthDecision::Denied);
    }

    #[tokio::test]
    async fn backend_error_fails_closed() {
        let gate = Authorizer::new(
            FixedProvider::new(|| Err(AuthError::RequestFailed("timeout".into()))),
            &config(),
        );
        assert!(!gate.is_authorized(&["poc".to_string()], "u", "p").await);
        assert!(!gate.authorize(&envelope("osw-upload")).await.is_allowed());
    }
}
