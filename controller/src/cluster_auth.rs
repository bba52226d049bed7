//! Client for the external auth service that issues workload API keys.
//!
//! The service is the source of truth for key validity metadata (TTL,
//! expiry, uses, group bindings); the controller stores only an opaque key
//! id and a truncated display form.

use gantry_common::args::ClusterAuthArgs;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

pub struct ClusterAuthClient {
    base_url: String,
    admin_token: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedApiKey {
    pub api_key: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyInfo {
    #[serde(default)]
    pub expire_time: Option<String>,
    #[serde(default = "default_true")]
    pub renewable: bool,
    #[serde(default)]
    pub num_uses: i64,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub meta: Value,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CreateApiKeyRequest {
    pub ttl: Option<String>,
    pub num_uses: Option<i64>,
    pub renewable: Option<bool>,
    pub period: Option<String>,
    pub explicit_max_ttl: Option<String>,
    pub meta: Option<Value>,
}

impl ClusterAuthClient {
    pub fn new(args: &ClusterAuthArgs) -> Self {
        Self {
            base_url: args.cluster_auth_url.trim_end_matches('/').to_string(),
            admin_token: args.cluster_auth_admin_token.clone(),
            http: reqwest::Client::new(),
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiResult<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.admin_token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| {
            ApiError::ExternalService(format!("auth service unreachable ({method} {path}): {e}"))
        })?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ApiError::not_found(format!(
                "auth service has no record for {path}"
            ))),
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(|e| {
                    ApiError::ExternalService(format!("invalid auth service response: {e}"))
                })?;
                if bytes.is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_slice(&bytes).map_err(|e| {
                    ApiError::ExternalService(format!("invalid auth service response: {e}"))
                })
            }
            status => Err(ApiError::ExternalService(format!(
                "auth service returned {status} for {method} {path}"
            ))),
        }
    }

    pub async fn create_api_key(&self, request: &CreateApiKeyRequest) -> ApiResult<CreatedApiKey> {
        let value = self
            .request(
                reqwest::Method::POST,
                "/v1/api-keys",
                Some(serde_json::to_value(request).map_err(anyhow::Error::from)?),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::ExternalService(format!("malformed create-key response: {e}")))
    }

    pub async fn lookup_api_key(&self, key_id: &str) -> ApiResult<ApiKeyInfo> {
        let value = self
            .request(reqwest::Method::GET, &format!("/v1/api-keys/{key_id}"), None)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::ExternalService(format!("malformed lookup response: {e}")))
    }

    pub async fn renew_api_key(&self, key_id: &str, increment: Option<&str>) -> ApiResult<Value> {
        let body = increment.map(|i| serde_json::json!({"increment": i}));
        self.request(
            reqwest::Method::POST,
            &format!("/v1/api-keys/{key_id}/renew"),
            body,
        )
        .await
    }

    pub async fn revoke_api_key(&self, key_id: &str) -> ApiResult<()> {
        self.request(reqwest::Method::DELETE, &format!("/v1/api-keys/{key_id}"), None)
            .await
            .map(|_| ())
    }

    pub async fn bind_api_key_to_group(&self, key_id: &str, group_id: &str) -> ApiResult<()> {
        self.request(
            reqwest::Method::PUT,
            &format!("/v1/api-keys/{key_id}/groups/{group_id}"),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn unbind_api_key_from_group(&self, key_id: &str, group_id: &str) -> ApiResult<()> {
        self.request(
            reqwest::Method::DELETE,
            &format!("/v1/api-keys/{key_id}/groups/{group_id}"),
            None,
        )
        .await
        .map(|_| ())
    }
}
