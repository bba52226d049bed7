//! Workload submission and status ingest.
//!
//! The controller ships a labeled manifest stream and afterwards only
//! observes: component statuses arrive from the dispatcher's watchers and
//! roll up into the workload status.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{
    ComponentStatus, Message, WorkloadComponentKind, WorkloadStatus,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::outbox::Outbox;
use crate::project_models::Project;
use crate::status::resolve_workload_status;
use crate::workload_db;
use crate::workload_models::{SubmitWorkloadRequest, Workload, WorkloadType};

pub async fn submit_workload(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    project: &Project,
    request: &SubmitWorkloadRequest,
    user: &str,
) -> ApiResult<Workload> {
    let workload = workload_db::insert_workload(
        client,
        None,
        project.id,
        &request.name,
        request.workload_type,
        WorkloadStatus::Pending,
        request.cluster_auth_group_id.as_deref(),
        request.aim_id,
        user,
    )
    .await?;
    outbox.enqueue(
        project.cluster_id,
        Message::WorkloadCreate {
            workload_id: workload.id,
            manifest: request.manifest.clone(),
        },
    );
    Ok(workload)
}

pub async fn submit_delete_workload(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    project: &Project,
    workload: &Workload,
    _user: &str,
) -> ApiResult<()> {
    if workload.status == WorkloadStatus::Deleting {
        return Err(ApiError::conflict("Workload is already marked for deletion"));
    }
    workload_db::update_workload_status(
        client,
        workload.id,
        WorkloadStatus::Deleting,
        Some("Workload is being deleted"),
        Utc::now(),
    )
    .await?;
    outbox.enqueue(
        project.cluster_id,
        Message::DeleteWorkload {
            workload_id: workload.id,
        },
    );
    Ok(())
}

/// Direct workload status, e.g. the synthetic Deleted published when a
/// cascade delete found nothing to remove.
pub async fn handle_workload_status(
    client: &impl GenericClient,
    workload_id: Uuid,
    status: WorkloadStatus,
    status_reason: Option<&str>,
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let Some(workload) = workload_db::get_workload(client, workload_id).await? else {
        tracing::warn!(%workload_id, "status update for unknown workload dropped");
        return Ok(());
    };
    if message_updated_at < workload.updated_at {
        tracing::info!(%workload_id, "stale workload status ignored");
        return Ok(());
    }
    workload_db::update_workload_status(client, workload.id, status, status_reason, message_updated_at)
        .await?;
    Ok(())
}

pub async fn handle_component_status(
    client: &impl GenericClient,
    component_id: Uuid,
    workload_id: Uuid,
    status: ComponentStatus,
    status_reason: Option<&str>,
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let Some(component) = workload_db::get_component(client, component_id).await? else {
        tracing::warn!(
            %component_id,
            %workload_id,
            "status for unknown component dropped (auto-discovery may still be in flight)"
        );
        return Ok(());
    };
    if message_updated_at < component.updated_at {
        tracing::info!(%component_id, "stale component status ignored");
        return Ok(());
    }

    workload_db::update_component_status(
        client,
        component.id,
        status,
        status_reason,
        message_updated_at,
    )
    .await?;

    refresh_workload_status(client, workload_id, message_updated_at).await
}

/// The dispatcher noticed a resource it did not create on our behalf;
/// register the component (and a carrier workload when needed) before its
/// status stream starts.
#[allow(clippy::too_many_arguments)]
pub async fn handle_auto_discovered_component(
    client: &impl GenericClient,
    project_id: Uuid,
    workload_id: Uuid,
    component_id: Uuid,
    name: &str,
    kind: WorkloadComponentKind,
    api_version: &str,
    submitter: Option<&str>,
) -> ApiResult<()> {
    let creator = submitter.unwrap_or("system");
    if workload_db::get_workload(client, workload_id).await?.is_none() {
        // Duplicate deliveries race here; losing the insert is fine.
        match workload_db::insert_workload(
            client,
            Some(workload_id),
            project_id,
            name,
            WorkloadType::Custom,
            WorkloadStatus::Pending,
            None,
            None,
            creator,
        )
        .await
        {
            Ok(_) | Err(ApiError::Conflict(_)) => {}
            Err(err) => return Err(err),
        }
    }
    workload_db::insert_component(
        client,
        component_id,
        workload_id,
        name,
        kind,
        api_version,
        ComponentStatus::Pending,
        creator,
    )
    .await?;
    Ok(())
}

async fn refresh_workload_status(
    client: &impl GenericClient,
    workload_id: Uuid,
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let Some(workload) = workload_db::get_workload(client, workload_id).await? else {
        return Ok(());
    };
    let components = workload_db::get_components_for_workload(client, workload_id).await?;
    let statuses: Vec<ComponentStatus> = components.iter().map(|c| c.status).collect();
    let (status, reason) =
        resolve_workload_status(&statuses, workload.status == WorkloadStatus::Deleting);
    if status != workload.status {
        workload_db::update_workload_status(
            client,
            workload.id,
            status,
            Some(&reason),
            message_updated_at,
        )
        .await?;
    }
    Ok(())
}
