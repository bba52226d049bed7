use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{GpuVendor, NodeReport};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::cluster_models::{Cluster, ClusterNode};
use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};

const CLUSTER_COLUMNS: &str =
    "id, organization_id, name, base_url, kube_api_url, last_heartbeat_at, \
     created_at, updated_at, created_by, updated_by";

fn cluster_from_row(row: &Row) -> Cluster {
    Cluster {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        name: row.get("name"),
        base_url: row.get("base_url"),
        kube_api_url: row.get("kube_api_url"),
        last_heartbeat_at: row.get("last_heartbeat_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
    }
}

const NODE_COLUMNS: &str =
    "id, cluster_id, name, cpu_milli_cores, memory_bytes, ephemeral_storage_bytes, gpu_count, \
     gpu_vendor, gpu_type, gpu_vram_bytes_per_device, gpu_product_name, is_ready, status, updated_at";

fn node_from_row(row: &Row) -> ClusterNode {
    let vendor: Option<String> = row.get("gpu_vendor");
    ClusterNode {
        id: row.get("id"),
        cluster_id: row.get("cluster_id"),
        name: row.get("name"),
        cpu_milli_cores: row.get("cpu_milli_cores"),
        memory_bytes: row.get("memory_bytes"),
        ephemeral_storage_bytes: row.get("ephemeral_storage_bytes"),
        gpu_count: row.get("gpu_count"),
        gpu_vendor: vendor.as_deref().and_then(status_from_text::<GpuVendor>),
        gpu_type: row.get("gpu_type"),
        gpu_vram_bytes_per_device: row.get("gpu_vram_bytes_per_device"),
        gpu_product_name: row.get("gpu_product_name"),
        is_ready: row.get("is_ready"),
        status: row.get("status"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn insert_cluster(
    client: &impl GenericClient,
    organization_id: Uuid,
    base_url: Option<&str>,
    kube_api_url: Option<&str>,
    creator: &str,
) -> ApiResult<Cluster> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO clusters (organization_id, base_url, kube_api_url, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $4)
                RETURNING {CLUSTER_COLUMNS}
                "#
            ),
            &[&organization_id, &base_url, &kube_api_url, &creator],
        )
        .await?;
    Ok(cluster_from_row(&row))
}

pub async fn get_cluster(client: &impl GenericClient, cluster_id: Uuid) -> ApiResult<Option<Cluster>> {
    let row = client
        .query_opt(
            &format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE id = $1"),
            &[&cluster_id],
        )
        .await?;
    Ok(row.as_ref().map(cluster_from_row))
}

pub async fn get_cluster_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
    cluster_id: Uuid,
) -> ApiResult<Option<Cluster>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE id = $1 AND organization_id = $2"
            ),
            &[&cluster_id, &organization_id],
        )
        .await?;
    Ok(row.as_ref().map(cluster_from_row))
}

pub async fn get_clusters_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
) -> ApiResult<Vec<Cluster>> {
    let rows = client
        .query(
            &format!(
                "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE organization_id = $1 ORDER BY created_at"
            ),
            &[&organization_id],
        )
        .await?;
    Ok(rows.iter().map(cluster_from_row).collect())
}

pub async fn update_cluster_name(
    client: &impl GenericClient,
    cluster_id: Uuid,
    name: &str,
    updater: &str,
) -> ApiResult<Cluster> {
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE clusters SET name = $2, updated_by = $3, updated_at = now()
                WHERE id = $1
                RETURNING {CLUSTER_COLUMNS}
                "#
            ),
            &[&cluster_id, &name, &updater],
        )
        .await?;
    row.as_ref()
        .map(cluster_from_row)
        .ok_or_else(|| ApiError::not_found(format!("Cluster {cluster_id} not found")))
}

pub async fn update_cluster_urls(
    client: &impl GenericClient,
    cluster_id: Uuid,
    base_url: Option<&str>,
    kube_api_url: Option<&str>,
    updater: &str,
) -> ApiResult<Cluster> {
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE clusters
                SET base_url = COALESCE($2, base_url),
                    kube_api_url = COALESCE($3, kube_api_url),
                    updated_by = $4, updated_at = now()
                WHERE id = $1
                RETURNING {CLUSTER_COLUMNS}
                "#
            ),
            &[&cluster_id, &base_url, &kube_api_url, &updater],
        )
        .await?;
    row.as_ref()
        .map(cluster_from_row)
        .ok_or_else(|| ApiError::not_found(format!("Cluster {cluster_id} not found")))
}

/// Heartbeats only ever move forward.
pub async fn advance_last_heartbeat(
    client: &impl GenericClient,
    cluster_id: Uuid,
    at: DateTime<Utc>,
) -> ApiResult<()> {
    client
        .execute(
            r#"
            UPDATE clusters
            SET last_heartbeat_at = $2, updated_at = now(), updated_by = 'system'
            WHERE id = $1 AND (last_heartbeat_at IS NULL OR last_heartbeat_at < $2)
            "#,
            &[&cluster_id, &at],
        )
        .await?;
    Ok(())
}

pub async fn delete_cluster(client: &impl GenericClient, cluster_id: Uuid) -> ApiResult<()> {
    client
        .execute("DELETE FROM clusters WHERE id = $1", &[&cluster_id])
        .await?;
    Ok(())
}

pub async fn get_cluster_nodes(
    client: &impl GenericClient,
    cluster_id: Uuid,
) -> ApiResult<Vec<ClusterNode>> {
    let rows = client
        .query(
            &format!("SELECT {NODE_COLUMNS} FROM cluster_nodes WHERE cluster_id = $1 ORDER BY name"),
            &[&cluster_id],
        )
        .await?;
    Ok(rows.iter().map(node_from_row).collect())
}

pub async fn get_cluster_nodes_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
) -> ApiResult<Vec<ClusterNode>> {
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {} FROM cluster_nodes n
                JOIN clusters c ON c.id = n.cluster_id
                WHERE c.organization_id = $1
                "#,
                NODE_COLUMNS
                    .split(", ")
                    .map(|c| format!("n.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            &[&organization_id],
        )
        .await?;
    Ok(rows.iter().map(node_from_row).collect())
}

pub async fn insert_node(
    client: &impl GenericClient,
    cluster_id: Uuid,
    report: &NodeReport,
    updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let gpu = report.gpu_information.as_ref();
    client
        .execute(
            r#"
            INSERT INTO cluster_nodes
                (cluster_id, name, cpu_milli_cores, memory_bytes, ephemeral_storage_bytes,
                 gpu_count, gpu_vendor, gpu_type, gpu_vram_bytes_per_device, gpu_product_name,
                 is_ready, status, created_by, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'system', 'system', $13, $13)
            "#,
            &[
                &cluster_id,
                &report.name,
                &report.cpu_milli_cores,
                &report.memory_bytes,
                &report.ephemeral_storage_bytes,
                &gpu.map(|g| g.count).unwrap_or(0),
                &gpu.map(|g| status_to_text(&g.vendor)),
                &gpu.map(|g| g.device_type.as_str()),
                &gpu.map(|g| g.vram_bytes_per_device).unwrap_or(0),
                &gpu.map(|g| g.product_name.as_str()),
                &report.is_ready,
                &report.status,
                &updated_at,
            ],
        )
        .await?;
    Ok(())
}

pub async fn update_node(
    client: &impl GenericClient,
    node_id: Uuid,
    report: &NodeReport,
    updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let gpu = report.gpu_information.as_ref();
    client
        .execute(
            r#"
            UPDATE cluster_nodes
            SET cpu_milli_cores = $2, memory_bytes = $3, ephemeral_storage_bytes = $4,
                gpu_count = $5, gpu_vendor = $6, gpu_type = $7, gpu_vram_bytes_per_device = $8,
                gpu_product_name = $9, is_ready = $10, status = $11,
                updated_by = 'system', updated_at = $12
            WHERE id = $1
            "#,
            &[
                &node_id,
                &report.cpu_milli_cores,
                &report.memory_bytes,
                &report.ephemeral_storage_bytes,
                &gpu.map(|g| g.count).unwrap_or(0),
                &gpu.map(|g| status_to_text(&g.vendor)),
                &gpu.map(|g| g.device_type.as_str()),
                &gpu.map(|g| g.vram_bytes_per_device).unwrap_or(0),
                &gpu.map(|g| g.product_name.as_str()),
                &report.is_ready,
                &report.status,
                &updated_at,
            ],
        )
        .await?;
    Ok(())
}

pub async fn delete_nodes(client: &impl GenericClient, node_ids: &[Uuid]) -> ApiResult<()> {
    client
        .execute("DELETE FROM cluster_nodes WHERE id = ANY($1)", &[&node_ids])
        .await?;
    Ok(())
}
