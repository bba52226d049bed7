use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub const API_KEY_PREFIX: &str = "amd_aim_api_key_";

#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub truncated_key: String,
    #[serde(skip_serializing)]
    pub cluster_auth_key_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub ttl: Option<String>,
    #[serde(default)]
    pub num_uses: Option<i64>,
    #[serde(default)]
    pub renewable: Option<bool>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub explicit_max_ttl: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub aim_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateApiKeyBindingsRequest {
    pub aim_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenewApiKeyRequest {
    #[serde(default)]
    pub increment: Option<String>,
}

/// Full key plus metadata; produced once, at creation.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyWithFullKey {
    #[serde(flatten)]
    pub api_key: ApiKey,
    pub full_key: String,
    pub expires_at: Option<String>,
    pub renewable: bool,
    pub num_uses: i64,
    pub ttl: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyDetails {
    #[serde(flatten)]
    pub api_key: ApiKey,
    pub expires_at: Option<String>,
    pub renewable: bool,
    pub num_uses: i64,
    pub ttl: Option<i64>,
    pub groups: Vec<String>,
    pub entity_id: Option<String>,
    pub meta: Value,
}

/// Mask the key for display, keeping the prefix and the last four
/// characters of the token part.
pub fn truncate_api_key(full_key: &str) -> ApiResult<String> {
    let Some(token) = full_key.strip_prefix(API_KEY_PREFIX) else {
        return Err(ApiError::validation(format!(
            "API key must start with '{API_KEY_PREFIX}'"
        )));
    };
    if token.len() <= 4 {
        return Ok(full_key.to_string());
    }
    let last_four = &token[token.len() - 4..];
    Ok(format!("{API_KEY_PREFIX}••••••••{last_four}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_prefix_and_tail() {
        let truncated = truncate_api_key("amd_aim_api_key_hvs.abc123def456").unwrap();
        assert_eq!(truncated, "amd_aim_api_key_••••••••f456");
    }

    #[test]
    fn short_tokens_pass_through() {
        assert_eq!(
            truncate_api_key("amd_aim_api_key_ab12").unwrap(),
            "amd_aim_api_key_ab12"
        );
    }

    #[test]
    fn foreign_prefixes_are_rejected() {
        assert!(truncate_api_key("hvs.abc123").is_err());
    }
}
