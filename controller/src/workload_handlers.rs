use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gantry_common::rbac::TokenClaims;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{require_org, require_project_access};
use crate::outbox::Outbox;
use crate::server::AppState;
use crate::workload_db;
use crate::workload_models::SubmitWorkloadRequest;
use crate::workloads;

pub async fn submit_workload(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
    Json(request): Json<SubmitWorkloadRequest>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let project = require_project_access(&tx, &claims, organization_id, project_id).await?;
    let workload =
        workloads::submit_workload(&tx, &mut outbox, &project, &request, &claims.principal())
            .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(workload)))
}

pub async fn list_workloads(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path(project_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;
    let client = state.pool.get().await?;
    let project = require_project_access(&client, &claims, organization_id, project_id).await?;
    let workloads = workload_db::get_workloads_for_project(&client, project.id).await?;
    Ok(Json(serde_json::json!({ "workloads": workloads })))
}

pub async fn delete_workload(
    State(state): State<AppState>,
    claims: TokenClaims,
    Path((project_id, workload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let organization_id = require_org(&claims)?;

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await.map_err(ApiError::from)?;
    let mut outbox = Outbox::new();

    let project = require_project_access(&tx, &claims, organization_id, project_id).await?;
    let workload = workload_db::get_workload(&tx, workload_id)
        .await?
        .filter(|w| w.project_id == project.id)
        .ok_or_else(|| ApiError::not_found(format!("Workload {workload_id} not found")))?;
    workloads::submit_delete_workload(&tx, &mut outbox, &project, &workload, &claims.principal())
        .await?;

    tx.commit().await.map_err(ApiError::from)?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(StatusCode::ACCEPTED)
}
