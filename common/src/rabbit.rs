//! Thin lapin wrappers shared by the controller and dispatcher.
//!
//! Publishers run with confirms enabled and wait for the broker ack before
//! reporting success; consumers use manual ack with requeue-on-error. Queues
//! are declared durable and are safe to re-declare on every connect.

use anyhow::{Context, Result, bail};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::args::RabbitArgs;
use crate::messages::Message;

pub async fn connect(args: &RabbitArgs, vhost: &str) -> Result<Connection> {
    let uri = args.amqp_uri(vhost);
    Connection::connect(&uri, ConnectionProperties::default())
        .await
        .with_context(|| format!("Failed to connect to {}", args.uri_redacted(vhost)))
}

/// Open a confirm-enabled channel and make sure the queue exists.
pub async fn open_channel(connection: &Connection, queue: &str) -> Result<Channel> {
    let channel = connection
        .create_channel()
        .await
        .context("Failed to create AMQP channel")?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .context("Failed to enable publisher confirms")?;
    declare_queue(&channel, queue).await?;
    Ok(channel)
}

pub async fn declare_queue(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("Failed to declare queue {queue}"))?;
    Ok(())
}

/// Publish one message to the default exchange and wait for the broker ack.
pub async fn publish(channel: &Channel, queue: &str, message: &Message) -> Result<()> {
    let payload = serde_json::to_vec(message).context("Failed to encode message")?;
    let confirm = channel
        .basic_publish(
            "",
            queue,
            BasicPublishOptions::default(),
            &payload,
            BasicProperties::default().with_content_type("application/json".into()),
        )
        .await
        .with_context(|| format!("Failed to publish {} to {queue}", message.message_type()))?
        .await
        .context("Broker did not confirm publish")?;
    if matches!(confirm, Confirmation::Nack(_)) {
        bail!("Broker nacked {} published to {queue}", message.message_type());
    }
    Ok(())
}

/// Consume `queue` until cancelled, acking per message.
///
/// The handler receives the parsed message plus the AMQP `user_id` property,
/// which the controller uses as the sending cluster's identity. Handler
/// errors (and unparseable bodies) nack with requeue.
pub async fn consume<F, Fut>(
    channel: &Channel,
    queue: &str,
    consumer_tag: &str,
    cancel: CancellationToken,
    handler: F,
) -> Result<()>
where
    F: Fn(Message, Option<String>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut consumer = channel
        .basic_consume(
            queue,
            consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("Failed to start consumer on {queue}"))?;

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(queue, "consumer cancelled");
                return Ok(());
            }
            delivery = consumer.next() => delivery,
        };
        let Some(delivery) = delivery else {
            bail!("Consumer stream for {queue} closed");
        };
        let delivery = delivery.context("Failed to receive delivery")?;

        let user_id = delivery
            .properties
            .user_id()
            .as_ref()
            .map(|id| id.as_str().to_string());

        let outcome = match serde_json::from_slice::<Message>(&delivery.data) {
            Ok(message) => {
                tracing::info!(queue, message_type = message.message_type(), "message received");
                handler(message, user_id).await
            }
            Err(err) => Err(anyhow::anyhow!("Failed to parse message body: {err}")),
        };

        match outcome {
            Ok(()) => {
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .context("Failed to ack delivery")?;
            }
            Err(err) => {
                tracing::error!(queue, ?err, "message handler failed, requeueing");
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
                    .context("Failed to nack delivery")?;
            }
        }
    }
}
