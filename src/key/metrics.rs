use super::errors::MetricsErrorKind;

/// Trait for recording metrics from a [`KeyStore`](super::KeyStore).
///
/// Implement this trait to integrate with your metrics system (e.g., Prometheus, `StatsD`).
/// Prefer stable, low-cardinality labels when recording metrics.
///
/// # Example
///
/// ```no_run
/// use bearer_auth::key::{MetricsErrorKind, MetricsRecorder};
/// use std::sync::Arc;
///
/// struct MyMetrics;
///
/// impl MetricsRecorder for MyMetrics {
///     fn record_refresh(&self, key_count: usize) {
///         println!("key set refreshed: {key_count} keys");
///     }
///
///     fn record_error(&self, kind: MetricsErrorKind) {
///         println!("Error: {}", kind.as_str());
///     }
/// }
///
/// let metrics = Arc::new(MyMetrics);
/// // Use with KeyStoreBuilder::metrics()
/// ```
pub trait MetricsRecorder: Send + Sync {
    /// Records a successful refresh that published `key_count` keys.
    fn record_refresh(&self, key_count: usize);

    /// Records an error with a structured error kind.
    fn record_error(&self, kind: MetricsErrorKind);
}
