//! # Telemetry Features
//!
//! Console logging through `tracing-subscriber` is always on. OpenTelemetry
//! export is optional and selected with features.
//!
//! ## Feature matrix
//!
//! - `otel-tracing`: Enables OpenTelemetry distributed tracing (via spans).
//! - `otel-metrics`: Enables OpenTelemetry metrics (counters, histograms).
//! - `otel-stdout`: Enables the stdout exporter.
//!
//! ## Feature constraints
//!
//! - The stdout exporter requires at least one of `otel-tracing` or
//!   `otel-metrics`.
//!
//! ## Span behavior
//!
//! - Spans created via `tracing::info_span!` (or `#[tracing::instrument]`) are
//!   exported to any enabled telemetry backend
//! - Events outside of a span are only shown in log output (via
//!   `fmt::layer()`), not exported
//!
//! ## Example usage
//!
//! ```bash
//! cargo run -p leaderboard-server --features otel-tracing,otel-metrics,otel-stdout
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

#[cfg(all(
    feature = "otel-stdout",
    not(any(feature = "otel-tracing", feature = "otel-metrics"))
))]
compile_error!(
    "The 'otel-stdout' feature requires at least one of 'otel-tracing' or 'otel-metrics' to be enabled."
);

// Core imports - always needed
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "otel-tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel-tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Failures are printed to stderr
    /// since the subscriber may already be unable to deliver them.
    pub fn shutdown(&self) {
        #[cfg(feature = "otel-tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-tracing")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
    let scope = InstrumentationScope::builder("leaderboard")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console output is independent of the `otel-stdout` exporter; it prints
    // spans and events in human-readable form.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel-tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-tracing")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("leaderboard")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otel-metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "otel-stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "otel-tracing")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "otel-stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "otel-metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static REJECTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static UPDATE_DURATION_US: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static PIPELINE_PENDING: OnceLock<Gauge<u64>> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Total HTTP requests by route")
            .build(),
    );

    let _ = REJECTED.set(
        meter
            .u64_counter("rejected_requests")
            .with_description("Requests answered with an error status, by route")
            .build(),
    );

    let _ = UPDATE_DURATION_US.set(
        meter
            .f64_histogram("update_duration")
            .with_unit("us")
            .with_description("Time to store and enqueue a score update")
            .build(),
    );

    let _ = PIPELINE_PENDING.set(
        meter
            .u64_gauge("pipeline_pending")
            .with_description("Score updates queued for the rebuilder")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "otel-metrics")]
pub fn increment_requests(route: &'static str) {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[KeyValue::new("route", route)]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_requests(_route: &'static str) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_rejected(route: &'static str) {
    if let Some(counter) = REJECTED.get() {
        counter.add(1, &[KeyValue::new("route", route)]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_rejected(_route: &'static str) {}

#[cfg(feature = "otel-metrics")]
pub fn record_update_duration(duration_us: f64) {
    if let Some(histogram) = UPDATE_DURATION_US.get() {
        histogram.record(duration_us, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_update_duration(_duration_us: f64) {}

#[cfg(feature = "otel-metrics")]
pub fn record_pipeline_pending(pending: u64) {
    if let Some(gauge) = PIPELINE_PENDING.get() {
        gauge.record(pending, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_pipeline_pending(_pending: u64) {}
