use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gantry_common::rbac::TokenClaims;
use uuid::Uuid;

use crate::cluster_db;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{require_org, require_platform_admin, require_project_access};
use crate::org_db;
use crate::outbox::Outbox;
use crate::project_db;
use crate::project_models::{CreateProjectRequest, ProjectMembersRequest, ProjectResponse};
use crate::projects;
use crate::quota_db;
use crate::quota_models::QuotaSpec;
use crate::quotas;
use crate::server::AppState;

pub async fn create_project(
    State(state): State<AppState>,
    claims: TokenClaims,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let cluster = cluster_db::get_cluster_in_organization(&tx, organization_id, request.cluster_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Cluster with ID {} not found", request.cluster_id))
        })?;
    let organization = org_db::get_organization(&tx, organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    let org_group_id = organization.keycloak_group_id.clone().ok_or_else(|| {
        ApiError::InconsistentState("organization has no identity-provider group".into())
    })?;

    let project = projects::create_project(
        &tx,
        &mut outbox,
        &state.identity,
        &cluster,
        &org_group_id,
        &request,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;

    let quota = quota_db::get_quota_by_project(&client, project.id).await?;
    Ok((StatusCode::CREATED, Json(ProjectResponse { project, quota })))
}

pub async fn list_projects(
    State(state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let all = project_db::get_projects_in_organization(&client, organization_id).await?;
    let visible: Vec<_> = all
        .into_iter()
        .filter(|p| claims.is_platform_administrator() || claims.is_member_of(&p.name))
        .collect();

    let mut responses = Vec::with_capacity(visible.len());
    for project in visible {
        let quota = quota_db::get_quota_by_project(&client, project.id).await?;
        responses.push(ProjectResponse { project, quota });
    }
    Ok(Json(serde_json::json!({ "projects": responses })))
}

pub async fn get_project(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let quota = quota_db::get_quota_by_project(&client, project.id).await?;
    Ok(Json(ProjectResponse { project, quota }))
}

pub async fn delete_project(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let project = project_db::get_project_in_organization(&tx, organization_id, project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project with ID {project_id} not found")))?;
    let cluster = cluster_db::get_cluster(&tx, project.cluster_id)
        .await?
        .ok_or_else(|| ApiError::InconsistentState("project's cluster is missing".into()))?;

    projects::submit_delete_project(&tx, &mut outbox, &cluster, &project, &claims.principal())
        .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn update_project_quota(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
    Json(spec): Json<QuotaSpec>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let project = project_db::get_project_in_organization(&tx, organization_id, project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project with ID {project_id} not found")))?;
    let cluster = cluster_db::get_cluster(&tx, project.cluster_id)
        .await?
        .ok_or_else(|| ApiError::InconsistentState("project's cluster is missing".into()))?;
    let quota = quota_db::get_quota_by_project(&tx, project.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Quota not found"))?;

    let updated =
        quotas::update_project_quota(&tx, &mut outbox, &cluster, &quota, &spec, &claims.principal())
            .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(Json(updated))
}

pub async fn add_project_users(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
    Json(request): Json<ProjectMembersRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = project_db::get_project_in_organization(&client, organization_id, project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project with ID {project_id} not found")))?;
    for user_id in &request.user_ids {
        state
            .identity
            .assign_user_to_group(user_id, &project.keycloak_group_id)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_project_user(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path((project_id, user_id)): Path<(Uuid, String)>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = project_db::get_project_in_organization(&client, organization_id, project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project with ID {project_id} not found")))?;
    state
        .identity
        .unassign_user_from_group(&user_id, &project.keycloak_group_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
