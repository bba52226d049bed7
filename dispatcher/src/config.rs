//! Dispatcher identity, frozen at startup.

use anyhow::{Context, Result, bail};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};

pub const CLUSTER_CONFIG_MAP_NAME: &str = "gpu-config";
pub const CLUSTER_CONFIG_MAP_NAMESPACE: &str = "gpu-config";

/// Organization and cluster names this dispatcher reports as. Resolved once
/// in `main` and passed by value; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub org_name: String,
    pub cluster_name: String,
}

/// Environment first, the well-known cluster ConfigMap second.
pub async fn resolve_app_config(
    client: &Client,
    org_name: Option<String>,
    cluster_name: Option<String>,
) -> Result<AppConfig> {
    if let (Some(org_name), Some(cluster_name)) = (org_name.clone(), cluster_name.clone()) {
        return Ok(AppConfig {
            org_name,
            cluster_name,
        });
    }

    tracing::info!(
        "ORG_NAME/KUBE_CLUSTER_NAME not set, reading the {} ConfigMap",
        CLUSTER_CONFIG_MAP_NAME
    );
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), CLUSTER_CONFIG_MAP_NAMESPACE);
    let config_map = api
        .get(CLUSTER_CONFIG_MAP_NAME)
        .await
        .with_context(|| format!("failed to read ConfigMap {CLUSTER_CONFIG_MAP_NAME}"))?;
    let data = config_map.data.unwrap_or_default();

    let org_name = org_name.or_else(|| data.get("org_name").cloned());
    let cluster_name = cluster_name.or_else(|| data.get("cluster_name").cloned());
    match (org_name, cluster_name) {
        (Some(org_name), Some(cluster_name)) => Ok(AppConfig {
            org_name,
            cluster_name,
        }),
        _ => bail!("organization name or cluster name is undefined"),
    }
}
