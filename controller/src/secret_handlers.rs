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
use crate::secret_db;
use crate::secret_models::{CreateSecretRequest, UpdateAssignmentsRequest};
use crate::secrets;
use crate::server::AppState;

pub async fn create_secret(
    State(state): State<AppState>,
    claims: TokenClaims,
    Json(request): Json<CreateSecretRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let secret = secrets::create_secret_in_organization(
        &tx,
        &mut outbox,
        organization_id,
        &request,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(secret)))
}

pub async fn list_secrets(
    State(state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let secrets_in_org =
        secret_db::get_secrets_in_organization(&client, organization_id, None).await?;
    let mut enriched = Vec::with_capacity(secrets_in_org.len());
    for secret in secrets_in_org {
        let assignments = secret_db::get_project_secrets_for_secret(&client, secret.id).await?;
        enriched.push(serde_json::json!({
            "secret": secret,
            "project_secrets": assignments,
        }));
    }
    Ok(Json(serde_json::json!({ "secrets": enriched })))
}

pub async fn get_secret(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(secret_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let secret = secret_db::get_secret_in_organization(&client, organization_id, secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Secret with ID {secret_id} not found")))?;
    let assignments = secret_db::get_project_secrets_for_secret(&client, secret.id).await?;
    Ok(Json(serde_json::json!({
        "secret": secret,
        "project_secrets": assignments,
    })))
}

pub async fn update_secret_assignments(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(secret_id): Path<Uuid>,
    Json(request): Json<UpdateAssignmentsRequest>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let secret = secret_db::get_secret_in_organization(&tx, organization_id, secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Secret with ID {secret_id} not found")))?;
    secrets::update_secret_assignments(
        &tx,
        &mut outbox,
        organization_id,
        &secret,
        &request.project_ids,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_secret(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(secret_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let secret = secret_db::get_secret_in_organization(&tx, organization_id, secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Secret with ID {secret_id} not found")))?;
    secrets::submit_delete_secret(&tx, &mut outbox, &secret, &claims.principal()).await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_project_secret(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_secret_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_platform_admin(&claims)?;
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    secrets::submit_delete_project_secret(
        &tx,
        &mut outbox,
        organization_id,
        project_secret_id,
        &claims.principal(),
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::ACCEPTED)
}
