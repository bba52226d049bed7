//! AIM catalog reconciliation.
//!
//! The dispatcher periodically reports the full set of inference-model
//! images present on its cluster; the controller diffs that against its
//! table keyed by image reference. Rows that disappear are soft-deleted so
//! history (and references from workloads) survive.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::AimClusterModel;
use serde::Serialize;
use std::collections::HashMap;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::ApiResult;

pub const AIM_STATUS_DELETED: &str = "Deleted";

#[derive(Debug, Clone, Serialize)]
pub struct Aim {
    pub id: Uuid,
    pub resource_name: String,
    pub image_reference: String,
    pub labels: serde_json::Value,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

const AIM_COLUMNS: &str = "id, resource_name, image_reference, labels, status, updated_at";

fn aim_from_row(row: &Row) -> Aim {
    Aim {
        id: row.get("id"),
        resource_name: row.get("resource_name"),
        image_reference: row.get("image_reference"),
        labels: row.get("labels"),
        status: row.get("status"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn get_aims(client: &impl GenericClient) -> ApiResult<Vec<Aim>> {
    let rows = client
        .query(
            &format!("SELECT {AIM_COLUMNS} FROM aims ORDER BY resource_name"),
            &[],
        )
        .await?;
    Ok(rows.iter().map(aim_from_row).collect())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

pub async fn reconcile_aims_from_cluster(
    client: &impl GenericClient,
    models: &[AimClusterModel],
) -> ApiResult<ReconcileCounts> {
    let mut counts = ReconcileCounts::default();

    let existing = get_aims(client).await?;
    let existing_by_image: HashMap<&str, &Aim> = existing
        .iter()
        .map(|aim| (aim.image_reference.as_str(), aim))
        .collect();
    let reported: std::collections::HashSet<&str> =
        models.iter().map(|m| m.image_reference.as_str()).collect();

    for model in models {
        match existing_by_image.get(model.image_reference.as_str()) {
            None => {
                client
                    .execute(
                        r#"
                        INSERT INTO aims (resource_name, image_reference, labels, status,
                                          created_by, updated_by)
                        VALUES ($1, $2, $3, $4, 'system', 'system')
                        "#,
                        &[&model.resource_name, &model.image_reference, &model.labels, &model.status],
                    )
                    .await?;
                counts.added += 1;
            }
            Some(aim) => {
                let changed = aim.resource_name != model.resource_name
                    || aim.labels != model.labels
                    || aim.status != model.status;
                if changed {
                    client
                        .execute(
                            r#"
                            UPDATE aims
                            SET resource_name = $2, labels = $3, status = $4,
                                updated_by = 'system', updated_at = now()
                            WHERE id = $1
                            "#,
                            &[&aim.id, &model.resource_name, &model.labels, &model.status],
                        )
                        .await?;
                    counts.updated += 1;
                } else {
                    counts.skipped += 1;
                }
            }
        }
    }

    for aim in &existing {
        if reported.contains(aim.image_reference.as_str()) {
            continue;
        }
        if aim.status.as_deref() == Some(AIM_STATUS_DELETED) {
            counts.skipped += 1;
        } else {
            client
                .execute(
                    r#"
                    UPDATE aims
                    SET status = $2, updated_by = 'system', updated_at = now()
                    WHERE id = $1
                    "#,
                    &[&aim.id, &AIM_STATUS_DELETED],
                )
                .await?;
            counts.deleted += 1;
        }
    }

    tracing::info!(
        added = counts.added,
        updated = counts.updated,
        deleted = counts.deleted,
        skipped = counts.skipped,
        cluster_total = models.len(),
        "aim catalog reconciled"
    );
    Ok(counts)
}
