//! Quota engine: validation, allocation materialization and drift handling.
//!
//! The controller never edits individual cluster queues; every change
//! re-emits the full allocation for the cluster, including the dynamic
//! catch-all entry, and the dispatcher applies it as one unit.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{Message, QuotaAllocation, QuotaStatus, default_priority_classes};
use std::collections::HashMap;
use uuid::Uuid;

use crate::cluster_db;
use crate::cluster_models::{Cluster, ClusterWithResources, compute_cluster_resources};
use crate::error::{ApiError, ApiResult};
use crate::identity::IdentityAdmin;
use crate::outbox::Outbox;
use crate::project_db;
use crate::projects;
use crate::quota_db;
use crate::quota_models::{
    Quota, QuotaSpec, allocation_for, catch_all_allocation, mismatch_reason,
    quota_matches_allocation, removed_reason, resources_changed, validate_quota_against_cluster,
};
use crate::validate::DEFAULT_CATCH_ALL_QUOTA_NAME;

pub async fn cluster_resource_view(
    client: &impl GenericClient,
    cluster: &Cluster,
) -> ApiResult<ClusterWithResources> {
    let nodes = cluster_db::get_cluster_nodes(client, cluster.id).await?;
    let quotas = quota_db::get_quotas_for_cluster(client, cluster.id).await?;
    Ok(compute_cluster_resources(cluster.clone(), &nodes, &quotas))
}

/// Enqueue the full allocation for `cluster`: one entry per active quota
/// plus the catch-all remainder.
pub async fn send_quotas_allocation(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    cluster: &Cluster,
) -> ApiResult<()> {
    let projects = project_db::get_projects_in_cluster(client, cluster.id).await?;
    let quotas = quota_db::get_quotas_for_cluster(client, cluster.id).await?;
    let quotas_by_project: HashMap<Uuid, &Quota> =
        quotas.iter().map(|q| (q.project_id, q)).collect();

    let mut quota_allocations: Vec<QuotaAllocation> = projects
        .iter()
        .filter_map(|project| {
            let quota = quotas_by_project.get(&project.id)?;
            (!matches!(quota.status, QuotaStatus::Deleting | QuotaStatus::Deleted))
                .then(|| allocation_for(&project.name, quota))
        })
        .collect();

    let nodes = cluster_db::get_cluster_nodes(client, cluster.id).await?;
    let view = compute_cluster_resources(cluster.clone(), &nodes, &quotas);
    quota_allocations.push(catch_all_allocation(&view));

    outbox.enqueue(
        cluster.id,
        Message::ClusterQuotasAllocation {
            gpu_vendor: view.gpu_info.as_ref().map(|g| g.vendor),
            quota_allocations,
            priority_classes: default_priority_classes(),
        },
    );
    Ok(())
}

/// Create the quota for a new project and push the updated allocation.
pub async fn create_quota_for_project(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    cluster: &Cluster,
    project_id: Uuid,
    spec: &QuotaSpec,
    creator: &str,
) -> ApiResult<Quota> {
    let view = cluster_resource_view(client, cluster).await?;
    let errors = validate_quota_against_cluster(&view, spec, None);
    if !errors.is_empty() {
        return Err(ApiError::validation(format!(
            "Quota exceeds available cluster resources: {}",
            errors.join(", ")
        )));
    }
    let quota =
        quota_db::insert_quota(client, project_id, cluster.id, spec, QuotaStatus::Pending, creator)
            .await?;
    send_quotas_allocation(client, outbox, cluster).await?;
    Ok(quota)
}

/// Edit a project quota. An edit that changes nothing goes straight to
/// Ready and publishes nothing.
pub async fn update_project_quota(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    cluster: &Cluster,
    quota: &Quota,
    spec: &QuotaSpec,
    updater: &str,
) -> ApiResult<Quota> {
    let view = cluster_resource_view(client, cluster).await?;
    let errors = validate_quota_against_cluster(&view, spec, Some(quota));
    if !errors.is_empty() {
        return Err(ApiError::validation(format!(
            "Quota exceeds available cluster resources: {}",
            errors.join(", ")
        )));
    }

    if resources_changed(quota, spec) {
        let updated = quota_db::update_quota_resources(
            client,
            quota.id,
            spec,
            QuotaStatus::Pending,
            None,
            updater,
            None,
        )
        .await?;
        send_quotas_allocation(client, outbox, cluster).await?;
        Ok(updated)
    } else {
        tracing::info!(quota_id = %quota.id, "no resource changes, skipping cluster message");
        quota_db::update_quota_resources(
            client,
            quota.id,
            spec,
            QuotaStatus::Ready,
            None,
            updater,
            None,
        )
        .await
    }
}

/// Mark the quota Deleting and re-emit the allocation without it.
pub async fn delete_quota_for_project(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    cluster: &Cluster,
    quota: &Quota,
    updater: &str,
) -> ApiResult<()> {
    quota_db::update_quota_status(client, quota.id, QuotaStatus::Deleting, None, updater, None)
        .await?;
    send_quotas_allocation(client, outbox, cluster).await?;
    Ok(())
}

/// Reconcile the applied queue set reported by the dispatcher against our
/// quota rows.
pub async fn handle_quotas_status(
    client: &impl GenericClient,
    identity: &IdentityAdmin,
    cluster: &Cluster,
    applied: &[QuotaAllocation],
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let projects = project_db::get_projects_in_cluster(client, cluster.id).await?;
    let quotas = quota_db::get_quotas_for_cluster(client, cluster.id).await?;
    let quotas_by_project_id: HashMap<Uuid, &Quota> =
        quotas.iter().map(|q| (q.project_id, q)).collect();

    // Only quotas written before this snapshot are fair game; newer edits
    // will be judged by the next status report.
    let mut pending_review: HashMap<String, (&crate::project_models::Project, &Quota)> = projects
        .iter()
        .filter_map(|project| {
            let quota = quotas_by_project_id.get(&project.id)?;
            (quota.updated_at <= message_updated_at)
                .then_some((project.name.clone(), (project, *quota)))
        })
        .collect();

    for allocation in applied {
        if allocation.quota_name == DEFAULT_CATCH_ALL_QUOTA_NAME {
            continue;
        }
        let Some((project, quota)) = pending_review.remove(&allocation.quota_name) else {
            tracing::warn!(
                quota_name = %allocation.quota_name,
                cluster_id = %cluster.id,
                "applied quota has no matching project, skipping"
            );
            continue;
        };

        if quota_matches_allocation(quota, allocation) {
            if quota.status != QuotaStatus::Ready {
                quota_db::update_quota_status(
                    client,
                    quota.id,
                    QuotaStatus::Ready,
                    None,
                    "system",
                    Some(message_updated_at),
                )
                .await?;
                projects::refresh_project_status(client, identity, project.id).await?;
            }
        } else {
            quota_db::update_quota_status(
                client,
                quota.id,
                QuotaStatus::Failed,
                Some(&mismatch_reason(allocation)),
                "system",
                Some(message_updated_at),
            )
            .await?;
            projects::refresh_project_status(client, identity, project.id).await?;
        }
    }

    // Whatever is left was configured here but absent on the cluster.
    for (project, quota) in pending_review.values() {
        if !matches!(quota.status, QuotaStatus::Deleting | QuotaStatus::Deleted) {
            let reason = quota
                .status_reason
                .clone()
                .unwrap_or_else(|| removed_reason(quota));
            quota_db::update_quota_resources(
                client,
                quota.id,
                &QuotaSpec::zero(),
                QuotaStatus::Failed,
                Some(&reason),
                "system",
                Some(message_updated_at),
            )
            .await?;
            tracing::warn!(project = %project.name, "quota has been removed from the cluster");
            projects::refresh_project_status(client, identity, project.id).await?;
        } else {
            quota_db::update_quota_status(
                client,
                quota.id,
                QuotaStatus::Deleted,
                Some("Quota marked as deleted"),
                "system",
                None,
            )
            .await?;
            projects::refresh_project_status(client, identity, project.id).await?;
        }
    }

    Ok(())
}

/// The dispatcher could not apply the queue config: fail every quota that
/// was still waiting on it.
pub async fn handle_quotas_failure(
    client: &impl GenericClient,
    identity: &IdentityAdmin,
    cluster: &Cluster,
    reason: Option<&str>,
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let projects = project_db::get_projects_in_cluster(client, cluster.id).await?;
    for project in projects {
        let Some(quota) = quota_db::get_quota_by_project(client, project.id).await? else {
            continue;
        };
        if quota.status != QuotaStatus::Pending || quota.updated_at >= message_updated_at {
            continue;
        }
        quota_db::update_quota_status(
            client,
            quota.id,
            QuotaStatus::Failed,
            reason.or(Some("Cluster failed to apply quota configuration")),
            "system",
            Some(message_updated_at),
        )
        .await?;
        projects::refresh_project_status(client, identity, project.id).await?;
        tracing::info!(project = %project.name, "pending quota marked as failed");
    }
    Ok(())
}
