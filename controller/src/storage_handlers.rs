use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gantry_common::rbac::TokenClaims;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{require_org, require_platform_admin};
use crate::outbox::Outbox;
use crate::secret_models::UpdateAssignmentsRequest;
use crate::server::AppState;
use crate::storage_db;
use crate::storage_models::CreateStorageRequest;
use crate::storages;

pub async fn create_storage(
    State(state): State<AppState>,
    claims: TokenClaims,
    Json(request): Json<CreateStorageRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let storage = storages::create_storage_in_organization(
        &tx,
        &mut outbox,
        organization_id,
        &request,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(storage)))
}

pub async fn list_storages(
    State(state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let storages_in_org =
        storage_db::get_storages_in_organization(&client, organization_id).await?;
    let mut enriched = Vec::with_capacity(storages_in_org.len());
    for storage in storages_in_org {
        let assignments =
            storage_db::get_project_storages_for_storage(&client, storage.id).await?;
        enriched.push(serde_json::json!({
            "storage": storage,
            "project_storages": assignments,
        }));
    }
    Ok(Json(serde_json::json!({ "storages": enriched })))
}

pub async fn get_storage(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(storage_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let storage = storage_db::get_storage_in_organization(&client, organization_id, storage_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Storage with ID {storage_id} not found")))?;
    let assignments = storage_db::get_project_storages_for_storage(&client, storage.id).await?;
    Ok(Json(serde_json::json!({
        "storage": storage,
        "project_storages": assignments,
    })))
}

pub async fn update_storage_assignments(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(storage_id): Path<Uuid>,
    Json(request): Json<UpdateAssignmentsRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let storage = storage_db::get_storage_in_organization(&tx, organization_id, storage_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Storage with ID {storage_id} not found")))?;
    storages::update_storage_assignments(
        &tx,
        &mut outbox,
        organization_id,
        &storage,
        &request.project_ids,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_storage(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(storage_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let storage = storage_db::get_storage_in_organization(&tx, organization_id, storage_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Storage with ID {storage_id} not found")))?;
    storages::submit_delete_storage(&tx, &mut outbox, &storage, &claims.principal()).await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_project_storage(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_storage_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    storages::submit_delete_project_storage(
        &tx,
        &mut outbox,
        organization_id,
        project_storage_id,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::ACCEPTED)
}
