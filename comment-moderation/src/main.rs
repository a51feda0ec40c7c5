use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use comment_moderation::app::ModerationService;
use comment_moderation::config::Config;

const OTEL_EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

fn init_tracer(sink_url: &str, sampling_rate: f64, service_name: &str) -> Result<Tracer> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    sampling_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    Value::from(service_name.to_string()),
                )])),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(sink_url)
                .with_timeout(OTEL_EXPORT_TIMEOUT),
        )
        .install_batch(runtime::Tokio)
        .context("failed to initialize OpenTelemetry tracer")?;

    Ok(tracer)
}

fn env_filter(debug: bool) -> Result<EnvFilter> {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    Ok(EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
        .add_directive("rdkafka=warn".parse()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_with_defaults().context("invalid configuration")?;

    // Pretty output with span timings when debugging, JSON otherwise
    let log_layer = {
        let base_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);

        if config.debug {
            base_layer
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(true)
                .with_filter(env_filter(true)?)
                .boxed()
        } else {
            base_layer
                .json()
                .with_filter(env_filter(false)?)
                .boxed()
        }
    };

    let otel_layer = match config.otel_endpoint() {
        Some(endpoint) => Some(
            OpenTelemetryLayer::new(init_tracer(
                &endpoint,
                config.otel_sampling_rate,
                &config.otel_service_name,
            )?)
            .with_filter(LevelFilter::INFO),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(log_layer)
        .with(otel_layer)
        .init();

    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    info!(
        input_topic = %config.consumer.kafka_consumer_topic,
        output_topic = %config.kafka_producer_topic,
        metrics = %config.bind_address(),
        "Starting comment moderation"
    );

    ModerationService::new(config).run().await;

    opentelemetry::global::shutdown_tracer_provider();
    Ok(())
}
