use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gantry_common::rbac::TokenClaims;
use uuid::Uuid;

use crate::cluster_db;
use crate::cluster_models::{ClusterWithUserSecret, CreateClusterRequest};
use crate::clusters;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{require_org, require_platform_admin};
use crate::project_db;
use crate::server::AppState;

/// Create a cluster record and provision its messaging fabric. The returned
/// user secret is shown exactly once.
pub async fn create_cluster(
    State(state): State<AppState>,
    claims: TokenClaims,
    Json(request): Json<CreateClusterRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let client = state.pool.get().await?;
    let cluster = cluster_db::insert_cluster(
        &client,
        organization_id,
        request.base_url.as_deref(),
        request.kube_api_url.as_deref(),
        &claims.principal(),
    )
    .await?;

    let user_secret = state
        .fabric
        .provision_cluster(cluster.id)
        .await
        .map_err(|e| ApiError::ExternalService(format!("Failed to provision messaging: {e}")))?;

    let status = cluster.status();
    Ok((
        StatusCode::CREATED,
        Json(ClusterWithUserSecret {
            cluster,
            status,
            user_secret,
        }),
    ))
}

pub async fn list_clusters(
    State(state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let clusters_in_org = cluster_db::get_clusters_in_organization(&client, organization_id).await?;
    let mut views = Vec::with_capacity(clusters_in_org.len());
    for cluster in &clusters_in_org {
        views.push(clusters::get_cluster_with_resources(&client, cluster).await?);
    }
    Ok(Json(serde_json::json!({ "clusters": views })))
}

pub async fn get_cluster(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(cluster_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let cluster = cluster_db::get_cluster_in_organization(&client, organization_id, cluster_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Cluster with ID {cluster_id} not found")))?;
    let view = clusters::get_cluster_with_resources(&client, &cluster).await?;
    Ok(Json(view))
}

pub async fn update_cluster(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(cluster_id): Path<Uuid>,
    Json(request): Json<CreateClusterRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    cluster_db::get_cluster_in_organization(&client, organization_id, cluster_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Cluster with ID {cluster_id} not found")))?;
    let cluster = cluster_db::update_cluster_urls(
        &client,
        cluster_id,
        request.base_url.as_deref(),
        request.kube_api_url.as_deref(),
        &claims.principal(),
    )
    .await?;
    Ok(Json(cluster))
}

pub async fn delete_cluster(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(cluster_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let cluster = cluster_db::get_cluster_in_organization(&client, organization_id, cluster_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Cluster with ID {cluster_id} not found")))?;

    clusters::ensure_cluster_deletable(&client, &cluster).await?;
    cluster_db::delete_cluster(&client, cluster.id).await?;
    if let Err(err) = state.fabric.deprovision_cluster(cluster.id).await {
        tracing::warn!(%cluster_id, ?err, "failed to deprovision cluster messaging");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_cluster_nodes(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(cluster_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    cluster_db::get_cluster_in_organization(&client, organization_id, cluster_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Cluster with ID {cluster_id} not found")))?;
    let nodes = cluster_db::get_cluster_nodes(&client, cluster_id).await?;
    Ok(Json(serde_json::json!({ "cluster_nodes": nodes })))
}

pub async fn get_cluster_projects(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(cluster_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    cluster_db::get_cluster_in_organization(&client, organization_id, cluster_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Cluster with ID {cluster_id} not found")))?;
    let projects = project_db::get_projects_in_cluster(&client, cluster_id).await?;
    Ok(Json(serde_json::json!({ "projects": projects })))
}

pub async fn get_clusters_stats(
    State(state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let stats = clusters::get_clusters_stats(&client, organization_id).await?;
    Ok(Json(stats))
}
