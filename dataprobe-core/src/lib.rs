//! DataProbe: tracks remote dataset analysis jobs and shapes their results

pub mod config;
pub mod errors;
pub mod filter;
pub mod job;
pub mod logger;
pub mod metrics;
pub mod poller;
pub mod preview;
pub mod profile;
pub mod service;
pub mod store;

// Re-exports
pub use config::{load_config, ProbeConfig};
pub use errors::{DataProbeError, Result};
pub use filter::{filter_columns, FilterOutcome};
pub use job::{DatasetDescriptor, JobHandle, JobStatus, SampleStrategy, SourceType, Step, StepStatus};
pub use metrics::ProbeMetrics;
pub use poller::{JobPoller, ProbeEvent, TrackedJob};
pub use preview::{shape_preview, ColumnSpec, DisplayTable, PageRequest, Pin, PreviewPayload};
pub use profile::{
    shape_profile, FeatureColumn, FeatureSeries, FeatureType, ProfileReport, ProfileReportRaw,
};
pub use service::{AnalysisService, HttpAnalysisService};
pub use store::{JobPhase, RunId, ViewModel, ViewModelStore};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Capacity of the event channel handed out by [`DataProbe::track`]
const EVENT_BUFFER: usize = 64;

/// A run spawned on the runtime by [`DataProbe::track`]
pub struct TrackingSession {
    /// Progress and result events, in order
    pub events: mpsc::Receiver<ProbeEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<TrackedJob>>,
}

impl TrackingSession {
    /// Stop the run. The request in flight settles, nothing is published
    /// afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for polling to finish and the fan-out to start.
    pub async fn finish(self) -> Result<TrackedJob> {
        self.task.await?
    }
}

/// Main DataProbe interface for the presentation layer
pub struct DataProbe {
    poller: Arc<JobPoller>,
}

impl DataProbe {
    /// Create a probe over any analysis service implementation
    pub fn new(service: Arc<dyn AnalysisService>, config: ProbeConfig) -> Self {
        Self::with_metrics(service, config, ProbeMetrics::unregistered())
    }

    pub fn with_metrics(
        service: Arc<dyn AnalysisService>,
        config: ProbeConfig,
        metrics: ProbeMetrics,
    ) -> Self {
        let store = Arc::new(ViewModelStore::new());
        Self {
            poller: Arc::new(JobPoller::new(service, store, config, metrics)),
        }
    }

    /// Create a probe talking HTTP to `config.base_url`
    pub fn connect(config: ProbeConfig) -> Result<Self> {
        config.validate()?;
        let service = HttpAnalysisService::new(config.base_url.clone(), config.request_timeout())?;
        info!(base_url = %config.base_url, "Connecting to analysis service");
        Ok(Self::new(Arc::new(service), config))
    }

    pub fn store(&self) -> Arc<ViewModelStore> {
        self.poller.store().clone()
    }

    pub fn config(&self) -> &ProbeConfig {
        self.poller.config()
    }

    /// Register and track a dataset on a background task.
    pub fn track(&self, descriptor: DatasetDescriptor) -> TrackingSession {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let poller = self.poller.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move { poller.register_and_track(&descriptor, tx, token).await });

        TrackingSession {
            events: rx,
            cancel,
            task,
        }
    }

    /// Register and track a dataset on the current task.
    pub async fn run(
        &self,
        descriptor: &DatasetDescriptor,
        events: mpsc::Sender<ProbeEvent>,
        cancel: CancellationToken,
    ) -> Result<TrackedJob> {
        self.poller.register_and_track(descriptor, events, cancel).await
    }

    /// Filter the profiled column list by name.
    ///
    /// A non-empty query stores and returns the matching columns of the
    /// current report. An empty query drops the filtered view and returns
    /// [`FilterOutcome::Refetch`]; call [`DataProbe::refresh_profile`] to
    /// replace the report.
    pub fn apply_filter(&self, query: &str) -> FilterOutcome {
        let store = self.poller.store();
        let columns = store
            .profile()
            .map(|report| report.columns.clone())
            .unwrap_or_default();

        let outcome = filter_columns(query, &columns);
        match &outcome {
            FilterOutcome::Matches(matches) => store.set_filtered(matches.clone()),
            FilterOutcome::Refetch => store.clear_filter(),
        }
        outcome
    }

    /// Apply a filter, re-fetching the profile when the query is cleared.
    /// Returns the columns to display.
    pub async fn filter_or_refresh(&self, query: &str) -> Result<Vec<FeatureColumn>> {
        match self.apply_filter(query) {
            FilterOutcome::Matches(columns) => Ok(columns),
            FilterOutcome::Refetch => Ok(self.refresh_profile().await?.columns),
        }
    }

    pub async fn refresh_profile(&self) -> Result<ProfileReport> {
        self.poller.refresh_profile().await
    }

    /// Fetch any preview page of the current job and replace the stored table.
    pub async fn load_preview_page(&self, page_num: u32, page_size: u32) -> Result<DisplayTable> {
        self.poller
            .load_preview_page(PageRequest { page_num, page_size })
            .await
    }
}
