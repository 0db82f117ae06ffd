//! Costing-specific metrics: lookups, recomputes and quote aggregates.

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Costing metrics recorder
pub struct CostingMetrics;

impl CostingMetrics {
    // =========================================================================
    // Lookup Metrics
    // =========================================================================

    /// Record a price lookup
    pub fn record_lookup(kind: &str, provider: &str, candidates: usize, duration_ms: u64) {
        counter!(
            "costing_lookups_total",
            "kind" => kind.to_string(),
            "provider" => provider.to_string()
        )
        .increment(1);
        histogram!("costing_lookup_candidates", "kind" => kind.to_string())
            .record(candidates as f64);

        tracing::debug!(
            kind = kind,
            provider = provider,
            candidates = candidates,
            duration_ms = duration_ms,
            "Looked up prices"
        );
    }

    /// Record a lookup that found no matching price
    pub fn record_no_match(kind: &str, provider: &str) {
        counter!(
            "costing_lookup_no_match_total",
            "kind" => kind.to_string(),
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    // =========================================================================
    // Propagation Metrics
    // =========================================================================

    /// Record a per-resource recompute
    pub fn record_recompute(kind: &str) {
        counter!("costing_recomputes_total", "kind" => kind.to_string()).increment(1);
    }

    /// Record a resolved price rejected on revalidation
    pub fn record_incompatible(kind: &str, field: &str) {
        counter!(
            "costing_incompatible_total",
            "kind" => kind.to_string(),
            "field" => field.to_string()
        )
        .increment(1);
    }

    /// Record one quote aggregate pass over `resources` live resources
    pub fn record_aggregate_pass(resources: usize) {
        counter!("costing_aggregate_passes_total").increment(1);
        histogram!("costing_aggregate_resources").record(resources as f64);
    }

    /// Record the removal of resources of one kind
    pub fn record_removal(kind: &str, count: usize) {
        counter!("costing_removals_total", "kind" => kind.to_string()).increment(count as u64);
    }

    /// Record the outcome of a batch import
    pub fn record_batch(policy: &str, created: usize, failed: usize) {
        counter!(
            "costing_batch_entries_total",
            "policy" => policy.to_string(),
            "outcome" => "created"
        )
        .increment(created as u64);
        counter!(
            "costing_batch_entries_total",
            "policy" => policy.to_string(),
            "outcome" => "failed"
        )
        .increment(failed as u64);

        tracing::info!(
            policy = policy,
            created = created,
            failed = failed,
            "Batch import completed"
        );
    }

    // =========================================================================
    // Gauge Metrics (Current State)
    // =========================================================================

    /// Set the last computed totals of a quote
    pub fn set_quote_total(provider: &str, cost: f64, max_cost: f64) {
        gauge!("quote_cost", "provider" => provider.to_string()).set(cost);
        gauge!("quote_max_cost", "provider" => provider.to_string()).set(max_cost);
    }
}

/// Timer guard for automatic duration recording.
///
/// Records the duration when `stop()` is called or when dropped.
pub struct CostingTimer {
    start: Instant,
    operation: &'static str,
    stopped: bool,
}

impl CostingTimer {
    /// Start a new timer for an operation
    pub fn new(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
            stopped: false,
        }
    }

    /// Stop the timer and record the duration. Returns duration in milliseconds.
    pub fn stop(&mut self) -> u64 {
        if self.stopped {
            return 0;
        }
        self.stopped = true;

        let duration = self.start.elapsed();
        histogram!("costing_operation_duration_seconds", "operation" => self.operation)
            .record(duration.as_secs_f64());

        duration.as_millis() as u64
    }
}

impl Drop for CostingTimer {
    fn drop(&mut self) {
        if !self.stopped {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_stops_once() {
        let mut timer = CostingTimer::new("recompute");
        timer.stop();
        assert_eq!(timer.stop(), 0);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        CostingMetrics::record_lookup("instance", "provider-1", 3, 1);
        CostingMetrics::record_aggregate_pass(4);
        CostingMetrics::set_quote_total("provider-1", 10.0, 20.0);
    }
}
