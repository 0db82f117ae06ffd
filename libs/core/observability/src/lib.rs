//! Observability utilities for the quote costing platform.
//!
//! This crate provides:
//! - Prometheus metrics recording and rendering
//! - Costing metrics for lookups, recomputes and quote aggregates
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, render_metrics, CostingMetrics};
//!
//! // Initialize metrics recorder
//! init_metrics()?;
//!
//! // Record costing operations
//! CostingMetrics::record_lookup("instance", "provider-1", 3, 2);
//! CostingMetrics::record_aggregate_pass(12);
//!
//! // Expose the text format from any transport
//! let body = render_metrics();
//! ```

pub mod costing;

pub use costing::{CostingMetrics, CostingTimer};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup. Later calls return
/// the handle installed by the first one.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;

        info!("Prometheus metrics recorder initialized");

        register_metric_descriptions();

        Ok(handle)
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Render the metrics in the Prometheus text format
pub fn render_metrics() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    // Lookup metrics
    describe_counter!(
        "costing_lookups_total",
        "Total price lookups by resource kind and provider"
    );
    describe_histogram!(
        "costing_lookup_candidates",
        "Number of candidates returned by a lookup"
    );
    describe_counter!(
        "costing_lookup_no_match_total",
        "Lookups that found no matching price"
    );

    // Propagation metrics
    describe_counter!(
        "costing_recomputes_total",
        "Per-resource cost recomputations by resource kind"
    );
    describe_counter!(
        "costing_incompatible_total",
        "Resolved prices rejected on revalidation, by offending field"
    );
    describe_counter!(
        "costing_aggregate_passes_total",
        "Quote aggregate recomputations"
    );
    describe_histogram!(
        "costing_aggregate_resources",
        "Number of live resources summed by an aggregate pass"
    );
    describe_counter!(
        "costing_removals_total",
        "Resources removed from a quote by resource kind"
    );
    describe_counter!(
        "costing_batch_entries_total",
        "Batch import entries by outcome"
    );
    describe_histogram!(
        "costing_operation_duration_seconds",
        "Costing operation duration in seconds"
    );

    // Quote state
    describe_gauge!("quote_cost", "Last computed minimal monthly cost of a quote");
    describe_gauge!("quote_max_cost", "Last computed maximal monthly cost of a quote");
}
