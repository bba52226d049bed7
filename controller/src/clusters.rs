//! Cluster service: provisioning, heartbeats and node inventory.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::NodeReport;
use std::collections::HashMap;

use crate::cluster_db;
use crate::cluster_models::{
    Cluster, ClusterNode, ClustersStats, ClusterWithResources, quota_counts_as_allocated,
};
use crate::error::{ApiError, ApiResult};
use crate::org_db;
use crate::outbox::Outbox;
use crate::quota_db;
use crate::quotas;

pub async fn get_cluster_with_resources(
    client: &impl GenericClient,
    cluster: &Cluster,
) -> ApiResult<ClusterWithResources> {
    quotas::cluster_resource_view(client, cluster).await
}

pub async fn get_clusters_stats(
    client: &impl GenericClient,
    organization_id: uuid::Uuid,
) -> ApiResult<ClustersStats> {
    let clusters = cluster_db::get_clusters_in_organization(client, organization_id).await?;
    let quotas = quota_db::get_quotas_for_organization(client, organization_id).await?;
    let nodes = cluster_db::get_cluster_nodes_in_organization(client, organization_id).await?;

    let allocated: Vec<_> = quotas
        .iter()
        .filter(|q| quota_counts_as_allocated(q.status))
        .collect();
    Ok(ClustersStats {
        total_cluster_count: clusters.len(),
        total_node_count: nodes.len(),
        available_node_count: nodes.iter().filter(|n| n.is_ready).count(),
        total_gpu_node_count: nodes.iter().filter(|n| n.gpu_count > 0).count(),
        total_gpu_count: nodes.iter().map(|n| n.gpu_count as i64).sum(),
        available_gpu_count: nodes
            .iter()
            .filter(|n| n.is_ready)
            .map(|n| n.gpu_count as i64)
            .sum(),
        allocated_gpu_count: allocated.iter().map(|q| q.gpu_count as i64).sum(),
    })
}

/// Heartbeat: adopt the reported cluster name when it is new or changed and
/// the organization matches, then advance the heartbeat timestamp.
pub async fn handle_heartbeat(
    client: &impl GenericClient,
    cluster: &Cluster,
    cluster_name: &str,
    organization_name: &str,
    last_heartbeat_at: DateTime<Utc>,
) -> ApiResult<()> {
    let name_matches = cluster
        .name
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(cluster_name));

    if !name_matches {
        let organization = org_db::get_organization(client, cluster.organization_id).await?;
        let org_matches = organization
            .as_ref()
            .is_some_and(|org| org.name.eq_ignore_ascii_case(organization_name));
        if !org_matches {
            tracing::error!(
                organization_name,
                cluster_id = %cluster.id,
                "organization mismatch in heartbeat, dropping"
            );
            return Ok(());
        }
        cluster_db::update_cluster_name(client, cluster.id, cluster_name, "system").await?;
    }

    cluster_db::advance_last_heartbeat(client, cluster.id, last_heartbeat_at).await?;
    Ok(())
}

/// Replace the stored node set with the reported one, keyed by case-folded
/// name. Known nodes only move forward in `updated_at`. When the set changed
/// materially, the quota allocation is re-emitted because the catch-all
/// depends on capacity.
pub async fn handle_cluster_nodes(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    cluster: &Cluster,
    reports: &[NodeReport],
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let existing = cluster_db::get_cluster_nodes(client, cluster.id).await?;
    let mut existing_by_name: HashMap<String, &ClusterNode> = existing
        .iter()
        .map(|node| (node.name.to_lowercase(), node))
        .collect();

    let mut nodes_changed = false;

    for report in reports {
        match existing_by_name.remove(&report.name.to_lowercase()) {
            None => {
                cluster_db::insert_node(client, cluster.id, report, message_updated_at).await?;
                nodes_changed = true;
            }
            Some(node) => {
                if node.updated_at >= message_updated_at {
                    continue; // outdated message
                }
                if node.differs_from(report) {
                    cluster_db::update_node(client, node.id, report, message_updated_at).await?;
                    nodes_changed = true;
                }
            }
        }
    }

    let vanished: Vec<uuid::Uuid> = existing_by_name.values().map(|n| n.id).collect();
    if !vanished.is_empty() {
        cluster_db::delete_nodes(client, &vanished).await?;
        nodes_changed = true;
    }

    if nodes_changed {
        quotas::send_quotas_allocation(client, outbox, cluster).await?;
        tracing::info!(
            cluster_id = %cluster.id,
            "re-emitted quota allocation after node changes"
        );
    }
    Ok(())
}

/// A cluster can only be deleted once nothing depends on it.
pub async fn ensure_cluster_deletable(
    client: &impl GenericClient,
    cluster: &Cluster,
) -> ApiResult<()> {
    let projects = crate::project_db::get_projects_in_cluster(client, cluster.id).await?;
    if !projects.is_empty() {
        return Err(ApiError::conflict(format!(
            "Cannot delete cluster {} because it has associated projects",
            cluster.id
        )));
    }
    Ok(())
}
