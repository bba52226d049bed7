//! RabbitMQ fabric: vhost/user provisioning and per-cluster publishing.
//!
//! Each cluster owns the vhost `vh_{cluster_id}` with queue `{cluster_id}`
//! used only for controller -> dispatcher traffic; the shared
//! `vh_airm_common` vhost carries everything coming back. The dispatcher's
//! AMQP user can only read from its own vhost and only write to the common
//! one.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use gantry_common::{args::RabbitArgs, messages, messages::Message, rabbit};
use lapin::Channel;
use rand::RngCore;
use reqwest::StatusCode;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::outbox::ClusterPublisher;

pub struct Fabric {
    args: RabbitArgs,
    http: reqwest::Client,
    channels: Mutex<HashMap<Uuid, Channel>>,
}

impl Fabric {
    pub fn new(args: RabbitArgs) -> Self {
        Self {
            args,
            http: reqwest::Client::new(),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotently create the shared inbound vhost and queue.
    pub async fn ensure_common_vhost(&self) -> Result<()> {
        self.management_put(&format!("vhosts/{}", messages::COMMON_VHOST), None)
            .await?;
        let connection = rabbit::connect(&self.args, messages::COMMON_VHOST).await?;
        rabbit::open_channel(&connection, messages::COMMON_QUEUE).await?;
        tracing::info!(vhost = messages::COMMON_VHOST, "common vhost configured");
        Ok(())
    }

    /// Create the cluster's vhost, user and directional permissions, and
    /// declare its queue. Returns the user secret, which is never stored.
    pub async fn provision_cluster(&self, cluster_id: Uuid) -> Result<String> {
        let vhost = messages::cluster_vhost(cluster_id);
        let user = format!("{cluster_id}");
        let mut secret_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut secret_bytes);
        let user_secret = hex::encode(secret_bytes);

        self.management_put(&format!("vhosts/{vhost}"), None).await?;
        self.management_put(
            &format!("users/{user}"),
            Some(serde_json::json!({"password": user_secret, "tags": "management"})),
        )
        .await?;
        // Dispatcher may only read from its own vhost...
        self.management_put(
            &format!("permissions/{vhost}/{user}"),
            Some(serde_json::json!({"configure": ".*", "write": "^$", "read": ".*"})),
        )
        .await?;
        // ...and only write to the common one.
        self.management_put(
            &format!("permissions/{}/{user}", messages::COMMON_VHOST),
            Some(serde_json::json!({"configure": ".*", "write": ".*", "read": "^$"})),
        )
        .await?;

        let connection = rabbit::connect(&self.args, &vhost).await?;
        rabbit::open_channel(&connection, &messages::cluster_queue(cluster_id)).await?;

        tracing::info!(%cluster_id, "provisioned cluster vhost and user");
        Ok(user_secret)
    }

    /// Remove the cluster's user and vhost; absent resources are tolerated.
    pub async fn deprovision_cluster(&self, cluster_id: Uuid) -> Result<()> {
        self.channels.lock().await.remove(&cluster_id);
        self.management_delete(&format!("users/{cluster_id}")).await?;
        self.management_delete(&format!("vhosts/{}", messages::cluster_vhost(cluster_id)))
            .await?;
        Ok(())
    }

    async fn management_put(&self, path: &str, body: Option<serde_json::Value>) -> Result<()> {
        let url = format!("{}/{}", self.args.rabbitmq_management_url, path);
        let mut request = self
            .http
            .put(&url)
            .basic_auth(&self.args.rabbitmq_user, Some(&self.args.rabbitmq_password));
        if let Some(body) = body {
            request = request.json(&body);
        } else {
            request = request.json(&serde_json::json!({}));
        }
        let response = request.send().await.with_context(|| format!("PUT {url}"))?;
        if !response.status().is_success() {
            bail!("PUT {url} returned {}", response.status());
        }
        Ok(())
    }

    async fn management_delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/{}", self.args.rabbitmq_management_url, path);
        let response = self
            .http
            .delete(&url)
            .basic_auth(&self.args.rabbitmq_user, Some(&self.args.rabbitmq_password))
            .send()
            .await
            .with_context(|| format!("DELETE {url}"))?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            bail!("DELETE {url} returned {}", response.status());
        }
        Ok(())
    }

    async fn cluster_channel(&self, cluster_id: Uuid) -> Result<Channel> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(&cluster_id)
            && channel.status().connected()
        {
            return Ok(channel.clone());
        }
        let connection = rabbit::connect(&self.args, &messages::cluster_vhost(cluster_id)).await?;
        let channel = rabbit::open_channel(&connection, &messages::cluster_queue(cluster_id)).await?;
        channels.insert(cluster_id, channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl ClusterPublisher for Fabric {
    async fn publish_to_cluster(&self, cluster_id: Uuid, message: &Message) -> Result<()> {
        let queue = messages::cluster_queue(cluster_id);
        let channel = self.cluster_channel(cluster_id).await?;
        match rabbit::publish(&channel, &queue, message).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Stale channel after a broker restart: rebuild once and retry.
                tracing::warn!(%cluster_id, ?err, "publish failed, reopening channel");
                self.channels.lock().await.remove(&cluster_id);
                let channel = self.cluster_channel(cluster_id).await?;
                rabbit::publish(&channel, &queue, message).await
            }
        }
    }
}
