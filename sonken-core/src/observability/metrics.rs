//! Core metrics definitions.
//!
//! Names follow Prometheus conventions: `_total` for counters, `_seconds`
//! for duration histograms.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register descriptions so every metric appears in `/metrics` with metadata.
pub fn register_core_metrics() {
    // Samplers
    describe_counter!(
        "sonken_sampler_ticks_total",
        "Sampler ticks (by sampler, outcome: recorded, skipped, failed)"
    );
    describe_histogram!(
        "sonken_sampler_tick_duration_seconds",
        "Time spent in one sampler tick (by sampler)"
    );
    describe_gauge!("sonken_active_monitors", "Projects currently under monitoring");
    describe_counter!(
        "sonken_target_connections_total",
        "Connections opened to project databases"
    );
    describe_counter!("sonken_slow_queries_total", "Slow queries recorded");

    // Broadcast
    describe_counter!(
        "sonken_broadcast_messages_total",
        "Live-update messages broadcast (by type)"
    );
    describe_gauge!("sonken_broadcast_clients", "Connected live-update clients");

    // State database
    describe_counter!("sonken_db_errors_total", "State database errors (by operation)");
}
