use axum::{Json, extract::State, response::IntoResponse};
use deadpool_postgres::GenericClient;
use gantry_common::rbac::TokenClaims;
use uuid::Uuid;

use crate::aims;
use crate::error::{ApiError, ApiResult};
use crate::project_db;
use crate::project_models::Project;
use crate::server::AppState;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

pub fn require_org(claims: &TokenClaims) -> ApiResult<Uuid> {
    claims
        .organization_id
        .ok_or_else(|| ApiError::Forbidden("Token carries no organization".into()))
}

pub fn require_platform_admin(claims: &TokenClaims) -> ApiResult<()> {
    if !claims.is_platform_administrator() {
        return Err(ApiError::Forbidden(
            "Platform administrator role required".into(),
        ));
    }
    Ok(())
}

/// Project routes require membership in the project's group (or an admin
/// role).
pub async fn require_project_access(
    client: &impl GenericClient,
    claims: &TokenClaims,
    organization_id: Uuid,
    project_id: Uuid,
) -> ApiResult<Project> {
    let project = project_db::get_project_in_organization(client, organization_id, project_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Project with ID {project_id} not found in your organization"))
        })?;
    if !claims.is_platform_administrator() && !claims.is_member_of(&project.name) {
        return Err(ApiError::Forbidden(format!(
            "Not a member of project {}",
            project.name
        )));
    }
    Ok(project)
}

pub async fn list_aims(
    State(state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<impl IntoResponse> {
    require_org(&claims)?;
    let client = state.pool.get().await?;
    let aims = aims::get_aims(&client).await?;
    Ok(Json(serde_json::json!({ "aims": aims })))
}
