//! Publisher for the shared feedback queue (dispatcher -> controller).

use anyhow::Result;
use gantry_common::args::RabbitArgs;
use gantry_common::messages::{self, Message};
use gantry_common::rabbit;
use lapin::Channel;
use tokio::sync::Mutex;

/// Lazily-connected channel to the common vhost. The channel is rebuilt on
/// the first failed publish; one retry per call.
pub struct FeedbackPublisher {
    args: RabbitArgs,
    channel: Mutex<Option<Channel>>,
}

impl FeedbackPublisher {
    pub fn new(args: RabbitArgs) -> Self {
        Self {
            args,
            channel: Mutex::new(None),
        }
    }

    async fn channel(&self) -> Result<Channel> {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref()
            && channel.status().connected()
        {
            return Ok(channel.clone());
        }
        let connection = rabbit::connect(&self.args, messages::COMMON_VHOST).await?;
        let channel = rabbit::open_channel(&connection, messages::COMMON_QUEUE).await?;
        *guard = Some(channel.clone());
        Ok(channel)
    }

    pub async fn publish(&self, message: &Message) -> Result<()> {
        let channel = self.channel().await?;
        match rabbit::publish(&channel, messages::COMMON_QUEUE, message).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(?err, "publish to feedback queue failed, reconnecting");
                *self.channel.lock().await = None;
                let channel = self.channel().await?;
                rabbit::publish(&channel, messages::COMMON_QUEUE, message).await
            }
        }
    }
}
