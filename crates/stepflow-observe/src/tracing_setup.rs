//! Logging for the `stepflow` binary.
//!
//! Compile phases run inside `#[instrument]` spans; this module decides where
//! their events go. Human-readable lines always go to stderr because stdout
//! carries diagrams and JSON. With `--otel` the same spans are also exported
//! as OpenTelemetry traces through the stdout exporter.
//!
//! ```no_run
//! stepflow_observe::tracing_setup::init_tracing("warn", false).unwrap();
//! // ... compile ...
//! stepflow_observe::tracing_setup::shutdown_tracing();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Service name attached to exported compile spans.
const TRACER_NAME: &str = "stepflow";

/// Provider kept alive for [`shutdown_tracing`]; unset without `--otel`.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// `RUST_LOG` wins over the verbosity chosen on the command line.
pub fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber.
///
/// `default_filter` is the directive used when `RUST_LOG` is unset. Fails when
/// a subscriber is already installed.
pub fn init_tracing(default_filter: &str, enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let span_export = enable_otel.then(|| {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME));
        opentelemetry::global::set_tracer_provider(provider.clone());
        let _ = TRACER_PROVIDER.set(provider);
        layer
    });

    tracing_subscriber::registry()
        .with(build_filter(default_filter))
        .with(stderr_layer)
        .with(span_export)
        .try_init()?;

    tracing::debug!(otel = enable_otel, "Logging initialized");
    Ok(())
}

/// Export any buffered compile spans. Does nothing unless `--otel` was given.
pub fn shutdown_tracing() {
    let Some(provider) = TRACER_PROVIDER.get() else {
        return;
    };
    match provider.shutdown() {
        Ok(()) => tracing::debug!("Span exporter flushed"),
        Err(e) => tracing::warn!(error = %e, "Span exporter did not shut down cleanly"),
    }
}
