use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common_kafka::kafka_consumer::TopicConsumer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// One message pulled from the broker. Acknowledging it marks it handled so
/// it will not be redelivered; the consumer loop does this exactly once per
/// message, whatever the processing outcome.
pub struct IncomingMessage {
    payload: Vec<u8>,
    acker: Box<dyn FnOnce() + Send>,
}

impl IncomingMessage {
    pub fn new(payload: Vec<u8>, acker: Box<dyn FnOnce() + Send>) -> Self {
        Self { payload, acker }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn ack(self) {
        (self.acker)();
    }
}

/// Where the consumer loop gets its messages from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn recv(&self) -> Result<IncomingMessage, SourceError>;
}

/// The production source: a subscribed Kafka consumer. Acknowledgement
/// stores the message offset; the stored offset is committed in the
/// background.
pub struct KafkaSource {
    consumer: TopicConsumer,
}

impl KafkaSource {
    pub fn new(consumer: TopicConsumer) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&self) -> Result<IncomingMessage, SourceError> {
        let (payload, offset) = self.consumer.recv().await?;
        let acker = Box::new(move || {
            // If the offset cannot be stored, kafka is gone and so are we
            offset.store().expect("failed to store message offset");
        });
        Ok(IncomingMessage::new(payload, acker))
    }
}

/// Serves a fixed list of payloads, then blocks forever; counts
/// acknowledgements. Always available for testing.
pub struct MockMessageSource {
    messages: Mutex<VecDeque<Vec<u8>>>,
    acked: Arc<AtomicUsize>,
}

impl MockMessageSource {
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            messages: Mutex::new(payloads.into()),
            acked: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acked_count(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for MockMessageSource {
    async fn recv(&self) -> Result<IncomingMessage, SourceError> {
        let next = self
            .messages
            .lock()
            .expect("poisoned MockMessageSource lock")
            .pop_front();

        match next {
            Some(payload) => {
                let acked = self.acked.clone();
                Ok(IncomingMessage::new(
                    payload,
                    Box::new(move || {
                        acked.fetch_add(1, Ordering::SeqCst);
                    }),
                ))
            }
            // Emulate a quiet topic: block until the consumer is closed.
            None => futures::future::pending().await,
        }
    }
}
