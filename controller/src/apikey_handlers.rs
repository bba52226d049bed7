use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gantry_common::rbac::TokenClaims;
use uuid::Uuid;

use crate::apikey_db;
use crate::apikey_models::{CreateApiKeyRequest, RenewApiKeyRequest, UpdateApiKeyBindingsRequest};
use crate::apikeys;
use crate::error::ApiResult;
use crate::handlers::{require_org, require_project_access};
use crate::server::AppState;

pub async fn create_api_key(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
    Json(request): Json<CreateApiKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let key = apikeys::create_api_key(
        &client,
        &state.cluster_auth,
        &project,
        &request,
        &claims.principal(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(key)))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let keys = apikey_db::get_api_keys_for_project(&client, project.id).await?;
    Ok(Json(serde_json::json!({ "api_keys": keys })))
}

pub async fn get_api_key(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path((project_id, api_key_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let details =
        apikeys::get_api_key_details(&client, &state.cluster_auth, &project, api_key_id).await?;
    Ok(Json(details))
}

pub async fn update_api_key_bindings(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path((project_id, api_key_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateApiKeyBindingsRequest>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let details = apikeys::update_api_key_bindings(
        &client,
        &state.cluster_auth,
        &project,
        api_key_id,
        &request,
    )
    .await?;
    Ok(Json(details))
}

pub async fn delete_api_key(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path((project_id, api_key_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    apikeys::delete_api_key(&client, &state.cluster_auth, &project, api_key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn renew_api_key(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path((project_id, api_key_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RenewApiKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let result = apikeys::renew_api_key(
        &client,
        &state.cluster_auth,
        &project,
        api_key_id,
        request.increment.as_deref(),
    )
    .await?;
    Ok(Json(result))
}
