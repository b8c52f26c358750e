use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{EventHandler, MessageSource};
use crate::reporter::ErrorReporter;
use crate::schema::FileNotification;

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("shutdown deadline exceeded before the consumer loop stopped")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("consumer loop is already running")]
    AlreadyStarted,
}

// How long the loop waits on a quiet topic before re-reporting liveness.
const IDLE_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// The long-running loop pulling file notifications off the broker.
///
/// One message is in flight at a time: the next message is not read until
/// the current one is fully handled and acknowledged, so a slow extraction
/// backpressures intake by design.
pub struct Consumer {
    started: AtomicBool,
    closing: CancellationToken,
    closed: CancellationToken,
}

impl Default for Consumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumer {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            closing: CancellationToken::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Spawns the consumer loop; a consumer runs at most one loop over its
    /// lifetime. Every message is acknowledged exactly once, whatever the
    /// outcome: malformed payloads can never succeed on redelivery, and
    /// handler failures are surfaced through the error reporter instead of
    /// being retried.
    pub fn start(
        &self,
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn EventHandler>,
        reporter: Arc<dyn ErrorReporter>,
        liveness: HealthHandle,
    ) -> Result<(), StartError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyStarted);
        }

        let closing = self.closing.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            loop {
                liveness.report_healthy();

                let message = tokio::select! {
                    _ = closing.cancelled() => break,
                    // recv can park for a long time on a quiet topic, so we
                    // race it against a timer and re-report on every wakeup
                    _ = tokio::time::sleep(IDLE_REPORT_INTERVAL) => continue,
                    received = source.recv() => match received {
                        Ok(message) => message,
                        Err(e) => {
                            error!(error = ?e, "failed to receive message");
                            continue;
                        }
                    },
                };

                let notification = match FileNotification::from_avro(message.payload()) {
                    Ok(notification) => notification,
                    Err(e) => {
                        error!(error = ?e, "failed to decode file notification, discarding message");
                        message.ack();
                        continue;
                    }
                };

                debug!(
                    instance_id = %notification.instance_id,
                    file_url = %notification.file_url,
                    "event received"
                );

                if let Err(e) = handler.handle(&notification).await {
                    error!(
                        instance_id = %notification.instance_id,
                        error = ?e,
                        "failed to handle event"
                    );
                    if let Err(report_err) = reporter
                        .notify(
                            &notification.instance_id,
                            "failed to handle event",
                            &e.to_string(),
                        )
                        .await
                    {
                        error!(
                            error = ?report_err,
                            "error reporter returned an unexpected error"
                        );
                    }
                }

                message.ack();
            }

            info!("closing event consumer loop");
            closed.cancel();
        });

        Ok(())
    }

    /// Signals the loop to stop and waits for it to exit. In-flight handler
    /// work is allowed to finish; no new message is accepted after the
    /// signal. Safe to call after the loop has already stopped.
    pub async fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        self.closing.cancel();

        match tokio::time::timeout(timeout, self.closed.cancelled()).await {
            Ok(()) => {
                info!("successfully closed event consumer");
                Ok(())
            }
            Err(_) => {
                info!("shutdown deadline exceeded, skipping graceful shutdown of event consumer");
                Err(CloseError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HandlerError, MockMessageSource};
    use crate::reporter::MockReporter;
    use crate::store::LocationError;
    use async_trait::async_trait;
    use health::HealthRegistry;
    use std::sync::Mutex;

    /// Records handled notifications; fails when configured to.
    #[derive(Default)]
    struct RecordingHandler {
        handled: Mutex<Vec<FileNotification>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, notification: &FileNotification) -> Result<(), HandlerError> {
            self.handled
                .lock()
                .expect("poisoned")
                .push(notification.clone());
            if self.fail {
                return Err(HandlerError::Location(LocationError::MissingKey));
            }
            Ok(())
        }
    }

    fn liveness() -> HealthHandle {
        HealthRegistry::new("liveness").register("consumer", Duration::from_secs(30))
    }

    fn valid_payload(instance_id: &str) -> Vec<u8> {
        FileNotification {
            file_url: "s3://bucket/key".to_string(),
            instance_id: instance_id.to_string(),
        }
        .to_avro()
        .unwrap()
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(check());
    }

    #[tokio::test]
    async fn malformed_message_is_acked_and_skipped() {
        let source = Arc::new(MockMessageSource::new(vec![
            b"not avro".to_vec(),
            valid_payload("I1"),
        ]));
        let handler = Arc::new(RecordingHandler::default());
        let reporter = Arc::new(MockReporter::new());

        let consumer = Consumer::new();
        consumer
            .start(source.clone(), handler.clone(), reporter.clone(), liveness())
            .unwrap();

        wait_for(|| source.acked_count() == 2).await;

        let handled = handler.handled.lock().expect("poisoned").clone();
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].instance_id, "I1");
        assert!(reporter.notifications().is_empty());

        consumer.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn handler_failure_is_reported_and_message_still_acked() {
        let source = Arc::new(MockMessageSource::new(vec![valid_payload("I1")]));
        let handler = Arc::new(RecordingHandler {
            fail: true,
            ..Default::default()
        });
        let reporter = Arc::new(MockReporter::new());

        let consumer = Consumer::new();
        consumer
            .start(source.clone(), handler, reporter.clone(), liveness())
            .unwrap();

        wait_for(|| source.acked_count() == 1).await;

        let notifications = reporter.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, "I1");
        assert_eq!(notifications[0].1, "failed to handle event");

        consumer.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_after_loop_exit() {
        let source = Arc::new(MockMessageSource::new(vec![]));
        let consumer = Consumer::new();
        consumer
            .start(
                source,
                Arc::new(RecordingHandler::default()),
                Arc::new(MockReporter::new()),
                liveness(),
            )
            .unwrap();

        consumer.close(Duration::from_secs(1)).await.unwrap();
        // The loop already stopped; closing again returns without blocking.
        consumer.close(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let consumer = Consumer::new();
        consumer
            .start(
                Arc::new(MockMessageSource::new(vec![])),
                Arc::new(RecordingHandler::default()),
                Arc::new(MockReporter::new()),
                liveness(),
            )
            .unwrap();

        let err = consumer
            .start(
                Arc::new(MockMessageSource::new(vec![])),
                Arc::new(RecordingHandler::default()),
                Arc::new(MockReporter::new()),
                liveness(),
            )
            .unwrap_err();
        assert!(matches!(err, StartError::AlreadyStarted));

        consumer.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn idle_consumer_keeps_reporting_liveness() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("extraction", Duration::from_millis(1500));

        let consumer = Consumer::new();
        consumer
            .start(
                Arc::new(MockMessageSource::new(vec![])),
                Arc::new(RecordingHandler::default()),
                Arc::new(MockReporter::new()),
                handle,
            )
            .unwrap();

        // Long enough that the startup report alone would have lapsed; the
        // loop must have re-reported while the topic was quiet.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(registry.get_status().healthy);

        consumer.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn close_times_out_if_the_loop_never_started() {
        let consumer = Consumer::new();
        let err = consumer.close(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, CloseError::Timeout));
    }
}
