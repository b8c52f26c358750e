use std::sync::Arc;

use axum::{routing::get, Router};
use common_kafka::kafka_consumer::TopicConsumer;
use common_kafka::kafka_producer::{create_kafka_producer, send_payload, KafkaContext};
use futures::future::ready;
use observation_extractor::{
    app_context::AppContext,
    config::Config,
    event::{Consumer, CsvHandler, KafkaSource},
    observation::MessageWriter,
    reporter::KafkaReporter,
};
use rdkafka::producer::{FutureProducer, Producer};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "observation-extractor";

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "observation extractor service"
}

fn start_health_liveness_server(config: &Config, context: Arc<AppContext>) -> JoinHandle<()> {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || ready(context.liveness.get_status())),
        );
    let bind = format!("{}:{}", config.host, config.port);
    tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .expect("failed to bind liveness server");
        axum::serve(listener, router)
            .await
            .expect("failed to serve liveness endpoints");
    })
}

/// Drains encoded observation events off the publish channel and produces
/// them. Runs until every sender is gone and the channel is empty.
fn start_publisher(
    mut rx: mpsc::Receiver<Vec<u8>>,
    producer: Arc<FutureProducer<KafkaContext>>,
    topic: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = send_payload(producer.as_ref(), &topic, None, &payload).await {
                error!(error = ?e, "failed to produce observation event");
            }
        }
        info!("publish channel drained, stopping publisher");
    })
}

async fn shutdown_signal() {
    let mut term = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = term.recv() => {},
        _ = tokio::signal::ctrl_c() => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults()?;
    let context = Arc::new(AppContext::new(config.clone()).await);

    start_health_liveness_server(&config, context.clone());

    let producer_liveness = context
        .liveness
        .register("rdkafka", config.liveness_deadline());
    let producer = Arc::new(create_kafka_producer(&config.kafka, producer_liveness).await?);

    let kafka_consumer = TopicConsumer::new(config.kafka.clone(), config.consumer.clone())?;
    info!(
        "Subscribed to topic: {}",
        config.consumer.kafka_consumer_topic
    );

    let shutdown = CancellationToken::new();
    let (tx, rx) = mpsc::channel(config.publish_channel_capacity);
    let publisher = start_publisher(rx, producer.clone(), config.observation_topic.clone());

    let writer = MessageWriter::new(tx, shutdown.clone());
    let handler = Arc::new(CsvHandler::new(
        context.clients.clone(),
        context.secrets.clone(),
        config.vault_path.clone(),
        writer,
    ));
    let reporter = Arc::new(KafkaReporter::new(
        producer.clone(),
        config.report_topic.clone(),
        SERVICE_NAME,
    ));

    let consumer = Consumer::new();
    consumer.start(
        Arc::new(KafkaSource::new(kafka_consumer)),
        handler,
        reporter,
        context.worker_liveness.clone(),
    )?;

    shutdown_signal().await;
    info!("Shutting down...");

    // Stop taking new messages first; the in-flight extraction gets until
    // the deadline to finish before its writes start failing.
    if let Err(e) = consumer.close(config.graceful_shutdown_timeout()).await {
        error!(error = ?e, "consumer did not stop in time");
    }
    shutdown.cancel();

    // All writer clones are gone once the consumer loop has stopped, so the
    // publisher drains whatever is queued and exits.
    if tokio::time::timeout(config.graceful_shutdown_timeout(), publisher)
        .await
        .is_err()
    {
        error!("publisher did not drain in time");
    }

    if let Err(e) = producer.flush(config.graceful_shutdown_timeout()) {
        error!(error = ?e, "failed to flush producer");
    }

    info!("Shutdown complete");
    Ok(())
}
