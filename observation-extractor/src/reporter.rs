//! Error reporting to the import reporter topic.

use async_trait::async_trait;
use common_kafka::kafka_producer::{send_payload, KafkaContext, KafkaProduceError};
use rdkafka::producer::FutureProducer;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::schema::{ReportEvent, SchemaError};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("instance id is required for an error report")]
    MissingInstanceId,
    #[error("error context is required for an error report")]
    MissingContext,
    #[error(transparent)]
    Encode(#[from] SchemaError),
    #[error(transparent)]
    Produce(#[from] KafkaProduceError),
}

/// Side channel through which per-message failures reach operators.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn notify(&self, instance_id: &str, context: &str, cause: &str)
        -> Result<(), ReportError>;
}

/// Publishes an Avro [`ReportEvent`] to the report topic for every failure.
pub struct KafkaReporter {
    producer: Arc<FutureProducer<KafkaContext>>,
    topic: String,
    service_name: String,
}

impl KafkaReporter {
    pub fn new(
        producer: Arc<FutureProducer<KafkaContext>>,
        topic: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            producer,
            topic: topic.into(),
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl ErrorReporter for KafkaReporter {
    async fn notify(
        &self,
        instance_id: &str,
        context: &str,
        cause: &str,
    ) -> Result<(), ReportError> {
        if instance_id.is_empty() {
            return Err(ReportError::MissingInstanceId);
        }
        if context.is_empty() {
            return Err(ReportError::MissingContext);
        }

        let report = ReportEvent {
            instance_id: instance_id.to_string(),
            event_type: "error".to_string(),
            event_message: format!("{context}: {cause}"),
            service_name: self.service_name.clone(),
        };

        info!(instance_id, context, "sending error report");
        let payload = report.to_avro()?;
        send_payload(self.producer.as_ref(), &self.topic, None, &payload).await?;
        Ok(())
    }
}

/// Captures reports in memory for assertions, always available.
#[derive(Default)]
pub struct MockReporter {
    notifications: std::sync::Mutex<Vec<(String, String, String)>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(String, String, String)> {
        self.notifications
            .lock()
            .expect("poisoned MockReporter lock")
            .clone()
    }
}

#[async_trait]
impl ErrorReporter for MockReporter {
    async fn notify(
        &self,
        instance_id: &str,
        context: &str,
        cause: &str,
    ) -> Result<(), ReportError> {
        if instance_id.is_empty() {
            return Err(ReportError::MissingInstanceId);
        }
        self.notifications
            .lock()
            .expect("poisoned MockReporter lock")
            .push((
                instance_id.to_string(),
                context.to_string(),
                cause.to_string(),
            ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_reporter_records_notifications() {
        let reporter = MockReporter::new();
        reporter
            .notify("instance-1", "failed to handle event", "boom")
            .await
            .unwrap();

        let notifications = reporter.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, "instance-1");
        assert_eq!(notifications[0].1, "failed to handle event");
    }

    #[tokio::test]
    async fn empty_instance_id_is_rejected() {
        let reporter = MockReporter::new();
        let err = reporter.notify("", "context", "boom").await.unwrap_err();
        assert!(matches!(err, ReportError::MissingInstanceId));
    }
}
