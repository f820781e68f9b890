use prometheus::{IntCounter, Registry};

/// Counters describing poller activity
#[derive(Clone)]
pub struct ProbeMetrics {
    pub polls: IntCounter,
    pub transient_retries: IntCounter,
    pub jobs_completed: IntCounter,
    pub jobs_failed: IntCounter,
    pub fetch_failures: IntCounter,
}

impl ProbeMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            polls: IntCounter::new("dataprobe_polls_total", "Job status polls issued")?,
            transient_retries: IntCounter::new(
                "dataprobe_poll_retries_total",
                "Polls retried after a transient transport failure",
            )?,
            jobs_completed: IntCounter::new(
                "dataprobe_jobs_completed_total",
                "Analysis jobs that reached their terminal step",
            )?,
            jobs_failed: IntCounter::new(
                "dataprobe_jobs_failed_total",
                "Analysis jobs that failed, timed out or could not be polled",
            )?,
            fetch_failures: IntCounter::new(
                "dataprobe_fetch_failures_total",
                "Preview or profile fetches that failed",
            )?,
        };
        registry.register(Box::new(metrics.polls.clone()))?;
        registry.register(Box::new(metrics.transient_retries.clone()))?;
        registry.register(Box::new(metrics.jobs_completed.clone()))?;
        registry.register(Box::new(metrics.jobs_failed.clone()))?;
        registry.register(Box::new(metrics.fetch_failures.clone()))?;
        Ok(metrics)
    }

    /// Counters bound to a private registry, for callers that do not export
    pub fn unregistered() -> Self {
        Self::new(&Registry::new()).expect("fresh registry accepts probe counters")
    }
}
