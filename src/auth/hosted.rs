//! Hosted permission service client.
//!
//! `GET <permission_url>?userId=..&projectGroupId=..&roles=..&roles=..&affirmative=..`
//! answers with a bare JSON boolean.

use std::time::Duration;

use async_trait::async_trait;

use crate::auth::{PermissionProvider, PermissionRequest};
use crate::error::AuthError;

/// Upper bound on a permission round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HostedPermissionProvider {
    client: reqwest::Client,
    api_url: String,
}

impl HostedPermissionProvider {
    pub fn new(api_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

/// Query parameters for a permission request.
fn query_params(request: &PermissionRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("userId", request.user_id.clone()),
        ("projectGroupId", request.project_group_id.clone()),
    ];
    params.extend(request.roles.iter().map(|r| ("roles", r.clone())));
    params.push(("affirmative", request.require_all.to_string()));
    params
}

/// Interpret the response body.
fn parse_answer(body: &serde_json::Value) -> Result<Option<bool>, AuthError> {
    match body {
        serde_json::Value::Bool(granted) => Ok(Some(*granted)),
        serde_json::Value::Null => Ok(None),
        other => Err(AuthError::MalformedResponse(format!(
            "expected a boolean, got {other}"
        ))),
    }
}

#[async_trait]
impl PermissionProvider for HostedPermissionProvider {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn has_permission(&self, request: &PermissionRequest) -> Result<Option<bool>, AuthError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&query_params(request))
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        parse_answer(&body)
    }
}
