//! Optional metrics instrumentation.
//!
//! When the `observe` feature is enabled, the tick driver emits counters
//! via the [`metrics`] crate; a downstream application must install a
//! recorder (e.g. `metrics-exporter-prometheus`) to collect them. Without
//! the feature every function here is a no-op.

/// Record one completed tick and how many tasks it dispatched.
///
/// - `carillon.ticks_total` – incremented per tick
/// - `carillon.dispatches_total` – incremented per dispatched task
#[inline]
pub fn record_tick(dispatched: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("carillon.ticks_total").increment(1);
        metrics::counter!("carillon.dispatches_total").increment(dispatched as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = dispatched;
    }
}

/// Record a late tick and how many whole minutes were skipped.
///
/// - `carillon.late_ticks_total` – counter
/// - `carillon.lateness_minutes` – histogram of skipped minutes
#[inline]
pub fn record_lateness(skipped_minutes: i64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("carillon.late_ticks_total").increment(1);
        metrics::histogram!("carillon.lateness_minutes").record(skipped_minutes as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = skipped_minutes;
    }
}
