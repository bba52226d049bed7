use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize a status enum to its wire name for a TEXT column.
pub fn status_to_text<T: Serialize>(status: &T) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => s,
        other => panic!("status did not serialize to a string: {other:?}"),
    }
}

/// Parse a TEXT column back into a status enum.
pub fn status_from_text<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string())).ok()
}

/// Initialize the database schema, creating tables if they don't exist.
pub async fn init_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await.context("failed to get db connection")?;

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            keycloak_organization_id TEXT,
            keycloak_group_id TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS organizations_name_key
            ON organizations (lower(name))
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            name TEXT,
            base_url TEXT,
            kube_api_url TEXT,
            last_heartbeat_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS clusters_org_name_key
            ON clusters (organization_id, lower(name)) WHERE name IS NOT NULL
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS cluster_nodes (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            cluster_id UUID NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            cpu_milli_cores BIGINT NOT NULL,
            memory_bytes BIGINT NOT NULL,
            ephemeral_storage_bytes BIGINT NOT NULL,
            gpu_count INT NOT NULL DEFAULT 0,
            gpu_vendor TEXT,
            gpu_type TEXT,
            gpu_vram_bytes_per_device BIGINT NOT NULL DEFAULT 0,
            gpu_product_name TEXT,
            is_ready BOOL NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS cluster_nodes_cluster_name_key
            ON cluster_nodes (cluster_id, lower(name))
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            cluster_id UUID NOT NULL REFERENCES clusters(id),
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            keycloak_group_id TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (organization_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS quotas (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            cluster_id UUID NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            cpu_milli_cores BIGINT NOT NULL,
            memory_bytes BIGINT NOT NULL,
            ephemeral_storage_bytes BIGINT NOT NULL,
            gpu_count INT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (project_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS namespaces (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            cluster_id UUID NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (project_id, cluster_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS secrets (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            scope TEXT NOT NULL,
            kind TEXT NOT NULL,
            use_case TEXT NOT NULL,
            manifest TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (organization_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS project_secrets (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            secret_id UUID NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (secret_id, project_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS storages (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            secret_id UUID NOT NULL REFERENCES secrets(id),
            bucket_url TEXT NOT NULL,
            access_key_name TEXT NOT NULL,
            secret_key_name TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (organization_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS project_storages (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            storage_id UUID NOT NULL REFERENCES storages(id) ON DELETE CASCADE,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (storage_id, project_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS project_storage_configmaps (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            project_storage_id UUID NOT NULL REFERENCES project_storages(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (project_storage_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS workloads (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            workload_type TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            cluster_auth_group_id TEXT,
            aim_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (project_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS workload_components (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            workload_id UUID NOT NULL REFERENCES workloads(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            api_version TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            truncated_key TEXT NOT NULL,
            cluster_auth_key_id TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (project_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS aims (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            resource_name TEXT NOT NULL,
            image_reference TEXT NOT NULL,
            labels JSONB NOT NULL DEFAULT '{}'::jsonb,
            status TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (image_reference)
        )
        "#,
    ];

    for statement in statements {
        client
            .execute(statement, &[])
            .await
            .with_context(|| format!("failed to run schema statement: {}", statement.lines().nth(1).unwrap_or("").trim()))?;
    }

    tracing::info!("database schema initialized");
    Ok(())
}
