use chrono::{DateTime, Utc};
use gantry_common::messages::NamespaceStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quota_models::{Quota, QuotaSpec};
use crate::status::ProjectStatus;

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub cluster_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub status_reason: Option<String>,
    pub keycloak_group_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Namespace {
    pub id: Uuid,
    pub project_id: Uuid,
    pub cluster_id: Uuid,
    pub name: String,
    pub status: NamespaceStatus,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub cluster_id: Uuid,
    pub quota: QuotaSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: Project,
    pub quota: Option<Quota>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMembersRequest {
    pub user_ids: Vec<String>,
}
