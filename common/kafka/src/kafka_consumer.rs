use std::sync::{Arc, Weak};

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};

use crate::config::{ConsumerConfig, KafkaConfig};

/// A subscribed consumer for a single topic, yielding raw payloads.
///
/// Offset storing is manual: the caller receives a [`MessageOffset`] with
/// every payload and stores it once the message is fully handled. Stored
/// offsets are committed in the background by librdkafka.
#[derive(Clone)]
pub struct TopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Consumer gone")]
    Gone,
}

impl TopicConsumer {
    pub fn new(
        common_config: KafkaConfig,
        consumer_config: ConsumerConfig,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                consumer_config.kafka_consumer_offset_reset,
            )
            .set(
                "auto.commit.interval.ms",
                consumer_config
                    .kafka_consumer_auto_commit_interval_ms
                    .to_string(),
            );

        client_config.set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        let inner = Inner {
            consumer,
            topic: consumer_config.kafka_consumer_topic,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Blocks until the next message arrives. An empty payload comes back as
    /// an empty byte slice; the caller decides what to do with it.
    pub async fn recv(&self) -> Result<(Vec<u8>, MessageOffset), KafkaError> {
        let message = self.inner.consumer.recv().await?;

        let offset = MessageOffset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let payload = message.payload().unwrap_or_default().to_vec();
        Ok((payload, offset))
    }
}

/// The broker position of a received message. Storing it marks the message
/// as handled, so it will not be redelivered through normal flow.
pub struct MessageOffset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl MessageOffset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }
}
