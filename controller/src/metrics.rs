//! Allocated-capacity gauges, refreshed from the database.

use deadpool_postgres::Pool;
use metrics::gauge;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub fn spawn_metrics_refresher(pool: Pool, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = refresh_allocation_gauges(&pool).await {
                tracing::warn!(?err, "failed to refresh allocation gauges");
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(REFRESH_INTERVAL) => {}
            }
        }
    })
}

async fn refresh_allocation_gauges(pool: &Pool) -> anyhow::Result<()> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT p.id AS project_id, p.cluster_id, o.name AS organization,
                   COALESCE(c.name, '') AS cluster_name,
                   q.gpu_count,
                   COALESCE((SELECT n.gpu_vram_bytes_per_device FROM cluster_nodes n
                             WHERE n.cluster_id = p.cluster_id AND n.gpu_count > 0
                             LIMIT 1), 0) AS gpu_vram_bytes_per_device
            FROM projects p
            JOIN organizations o ON o.id = p.organization_id
            JOIN clusters c ON c.id = p.cluster_id
            JOIN quotas q ON q.project_id = p.id
            "#,
            &[],
        )
        .await?;

    for row in rows {
        let project_id: uuid::Uuid = row.get("project_id");
        let cluster_id: uuid::Uuid = row.get("cluster_id");
        let organization: String = row.get("organization");
        let cluster_name: String = row.get("cluster_name");
        let gpu_count: i32 = row.get("gpu_count");
        let vram_per_device: i64 = row.get("gpu_vram_bytes_per_device");

        let labels = [
            ("project_id", project_id.to_string()),
            ("cluster_id", cluster_id.to_string()),
            ("organization", organization),
            ("cluster_name", cluster_name),
        ];
        gauge!("gantry_allocated_gpus", &labels).set(gpu_count as f64);
        gauge!("gantry_allocated_gpu_vram_megabytes", &labels)
            .set((gpu_count as i64 * vram_per_device) as f64 / (1024.0 * 1024.0));
    }
    Ok(())
}
