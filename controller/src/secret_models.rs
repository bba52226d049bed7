use chrono::{DateTime, Utc};
use gantry_common::labels;
use gantry_common::messages::{AssignmentStatus, SecretComponentKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::status::RollupStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretScope {
    Organization,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretKind {
    External,
    KubernetesSecret,
}

impl SecretKind {
    pub fn component_kind(&self) -> SecretComponentKind {
        match self {
            SecretKind::External => SecretComponentKind::ExternalSecret,
            SecretKind::KubernetesSecret => SecretComponentKind::KubernetesSecret,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretUseCase {
    HuggingFace,
    S3,
    Generic,
    Database,
}

#[derive(Debug, Clone, Serialize)]
pub struct Secret {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub scope: SecretScope,
    pub kind: SecretKind,
    pub use_case: SecretUseCase,
    #[serde(skip_serializing)]
    pub manifest: String,
    pub status: RollupStatus,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSecret {
    pub id: Uuid,
    pub secret_id: Uuid,
    pub project_id: Uuid,
    pub status: AssignmentStatus,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSecretRequest {
    pub name: String,
    pub scope: SecretScope,
    #[serde(rename = "type")]
    pub kind: SecretKind,
    pub use_case: SecretUseCase,
    pub manifest: String,
    #[serde(default)]
    pub project_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAssignmentsRequest {
    pub project_ids: Vec<Uuid>,
}

/// Manifests split into what ships to the cluster and what we persist.
/// Hugging Face token secrets ship labeled but are never stored.
#[derive(Debug)]
pub struct PreparedManifest {
    pub ship: String,
    pub store: String,
}

pub fn prepare_manifest(
    kind: SecretKind,
    use_case: SecretUseCase,
    manifest: &str,
) -> ApiResult<PreparedManifest> {
    if manifest.trim().is_empty() {
        return Err(ApiError::validation(
            "Manifest must be provided for secret creation",
        ));
    }
    let mut parsed: serde_yaml::Value = serde_yaml::from_str(manifest)
        .map_err(|e| ApiError::validation(format!("Invalid YAML manifest: {e}")))?;

    match kind {
        SecretKind::KubernetesSecret => {
            expect_kind(&parsed, "Secret")?;
            if use_case == SecretUseCase::HuggingFace {
                add_use_case_label(&mut parsed, "hugging_face");
            }
            let ship = serde_yaml::to_string(&parsed)
                .map_err(|e| ApiError::validation(format!("Invalid manifest: {e}")))?;
            // Token material must not be persisted.
            let store = if use_case == SecretUseCase::HuggingFace {
                String::new()
            } else {
                ship.clone()
            };
            Ok(PreparedManifest { ship, store })
        }
        SecretKind::External => {
            expect_kind(&parsed, "ExternalSecret")?;
            strip_namespace(&mut parsed);
            let sanitized = serde_yaml::to_string(&parsed)
                .map_err(|e| ApiError::validation(format!("Invalid manifest: {e}")))?;
            Ok(PreparedManifest {
                ship: sanitized.clone(),
                store: sanitized,
            })
        }
    }
}

fn expect_kind(manifest: &serde_yaml::Value, expected: &str) -> ApiResult<()> {
    let kind = manifest.get("kind").and_then(|k| k.as_str());
    if kind != Some(expected) {
        return Err(ApiError::validation(format!(
            "Manifest kind must be {expected}, got {}",
            kind.unwrap_or("nothing")
        )));
    }
    Ok(())
}

fn add_use_case_label(manifest: &mut serde_yaml::Value, use_case: &str) {
    use serde_yaml::{Mapping, Value};
    let Some(mapping) = manifest.as_mapping_mut() else {
        return;
    };
    let metadata = mapping
        .entry(Value::from("metadata"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !metadata.is_mapping() {
        *metadata = Value::Mapping(Mapping::new());
    }
    let labels_entry = metadata
        .as_mapping_mut()
        .expect("metadata is a mapping")
        .entry(Value::from("labels"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !labels_entry.is_mapping() {
        *labels_entry = Value::Mapping(Mapping::new());
    }
    labels_entry
        .as_mapping_mut()
        .expect("labels is a mapping")
        .insert(Value::from(labels::USE_CASE), Value::from(use_case));
}

/// The target namespace is decided per assignment, never by the caller.
fn strip_namespace(manifest: &mut serde_yaml::Value) {
    if let Some(metadata) = manifest.get_mut("metadata").and_then(|m| m.as_mapping_mut()) {
        metadata.remove(serde_yaml::Value::from("namespace"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HF_MANIFEST: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: hf-token
stringData:
  token: hf_secret_value
"#;

    const EXTERNAL_MANIFEST: &str = r#"
apiVersion: external-secrets.io/v1beta1
kind: ExternalSecret
metadata:
  name: s3-creds
  namespace: should-be-removed
spec:
  refreshInterval: 1h
"#;

    #[test]
    fn hugging_face_secrets_get_the_use_case_label_and_are_not_stored() {
        let prepared = prepare_manifest(
            SecretKind::KubernetesSecret,
            SecretUseCase::HuggingFace,
            HF_MANIFEST,
        )
        .unwrap();
        assert!(prepared.ship.contains("airm.silogen.com/use-case"));
        assert!(prepared.ship.contains("hugging_face"));
        assert!(prepared.store.is_empty());
    }

    #[test]
    fn external_manifests_lose_their_namespace() {
        let prepared =
            prepare_manifest(SecretKind::External, SecretUseCase::S3, EXTERNAL_MANIFEST).unwrap();
        assert!(!prepared.ship.contains("should-be-removed"));
        assert_eq!(prepared.ship, prepared.store);
    }

    #[test]
    fn kind_mismatch_is_a_validation_error() {
        let err = prepare_manifest(SecretKind::External, SecretUseCase::S3, HF_MANIFEST);
        assert!(err.is_err());
        let err = prepare_manifest(SecretKind::KubernetesSecret, SecretUseCase::Generic, "")
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
