//! Registration, status polling and result fan-out for one analysis run
//!
//! A run registers the dataset, polls the job one request at a time until the
//! third step succeeds, then fetches the preview page and the feature profile
//! as two independent tasks. Every intermediate status is published before it
//! is evaluated so a UI can render per-step progress.
//!
//! Cancellation is cooperative: the token is checked before each poll, before
//! each fetch and before each publication, and interrupts both the delay
//! between polls and a send blocked on a full event channel. A request already
//! on the wire is allowed to settle.

use crate::job::{DatasetDescriptor, JobHandle, JobState, JobStatus};
use crate::metrics::ProbeMetrics;
use crate::preview::{shape_preview, DisplayTable, PageRequest};
use crate::profile::{shape_profile, ProfileReport};
use crate::service::AnalysisService;
use crate::store::{JobPhase, RunId, ViewModelStore};
use crate::{DataProbeError, ProbeConfig, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events published to the presentation layer, in order of occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeEvent {
    Registered(JobHandle),
    Progress(JobStatus),
    Preview(DisplayTable),
    PreviewFailed { message: String },
    Profile(ProfileReport),
    ProfileFailed { message: String },
    Failed { message: String },
}

/// Forwards events to the consumer and applies them to the store for one
/// run, unless that run has been cancelled.
#[derive(Clone)]
pub(crate) struct Publisher {
    store: Arc<ViewModelStore>,
    run: RunId,
    events: Option<mpsc::Sender<ProbeEvent>>,
    cancel: CancellationToken,
}

impl Publisher {
    pub(crate) fn new(
        store: Arc<ViewModelStore>,
        run: RunId,
        events: Option<mpsc::Sender<ProbeEvent>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            run,
            events,
            cancel,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(DataProbeError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn publish(&self, event: ProbeEvent) -> Result<()> {
        self.ensure_active()?;
        if let Some(events) = &self.events {
            // The store only ever sees events the consumer was handed.
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DataProbeError::Cancelled),
                sent = events.send(event.clone()) => sent,
            };
            // A dropped receiver means the consumer walked away.
            if sent.is_err() {
                debug!("Event receiver dropped, cancelling run");
                self.cancel.cancel();
                return Err(DataProbeError::Cancelled);
            }
        }
        if !apply_event(&self.store, self.run, event) {
            debug!("Run superseded, update discarded");
        }
        Ok(())
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DataProbeError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn apply_event(store: &ViewModelStore, run: RunId, event: ProbeEvent) -> bool {
    match event {
        ProbeEvent::Registered(job) => store.set_job(run, job),
        ProbeEvent::Progress(status) => store.set_progress(run, status),
        ProbeEvent::Preview(table) => store.set_preview(run, table),
        ProbeEvent::Profile(report) => store.set_profile(run, report),
        ProbeEvent::Failed { message } => store.fail(run, message),
        ProbeEvent::PreviewFailed { .. } | ProbeEvent::ProfileFailed { .. } => true,
    }
}

/// Handles to the two fan-out fetches started once the job completed.
///
/// The branches are independent: either may finish first, and one failing
/// does not affect the other.
#[derive(Debug)]
pub struct TrackedJob {
    pub job: JobHandle,
    pub preview: JoinHandle<Result<DisplayTable>>,
    pub profile: JoinHandle<Result<ProfileReport>>,
}

impl TrackedJob {
    /// Wait for both fetches.
    pub async fn join(self) -> (Result<DisplayTable>, Result<ProfileReport>) {
        let (preview, profile) = tokio::join!(self.preview, self.profile);
        (flatten(preview), flatten(profile))
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.map_err(DataProbeError::from)?
}

pub struct JobPoller {
    service: Arc<dyn AnalysisService>,
    store: Arc<ViewModelStore>,
    config: ProbeConfig,
    metrics: ProbeMetrics,
}

impl JobPoller {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        store: Arc<ViewModelStore>,
        config: ProbeConfig,
        metrics: ProbeMetrics,
    ) -> Self {
        Self {
            service,
            store,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<ViewModelStore> {
        &self.store
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Register the dataset, poll its job to completion and start the fan-out.
    ///
    /// Returns once the fan-out tasks are spawned; their results arrive on
    /// `events` and through the returned [`TrackedJob`]. A terminal error is
    /// also published as [`ProbeEvent::Failed`] unless the run was cancelled.
    pub async fn register_and_track(
        &self,
        descriptor: &DatasetDescriptor,
        events: mpsc::Sender<ProbeEvent>,
        cancel: CancellationToken,
    ) -> Result<TrackedJob> {
        let run = self.store.begin_run();
        let publisher = Publisher::new(self.store.clone(), run, Some(events), cancel);
        let result = self.track(descriptor, &publisher).await;

        match &result {
            Ok(tracked) => {
                info!(job = %tracked.job, "Analysis job complete, fetching results");
                self.metrics.jobs_completed.inc();
            }
            Err(DataProbeError::Cancelled) => {
                info!("Tracking cancelled");
                self.store.set_phase(run, JobPhase::Cancelled);
            }
            Err(err) => {
                warn!(error = %err, "Tracking failed");
                self.metrics.jobs_failed.inc();
                let _ = publisher
                    .publish(ProbeEvent::Failed {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
        result
    }

    async fn track(
        &self,
        descriptor: &DatasetDescriptor,
        publisher: &Publisher,
    ) -> Result<TrackedJob> {
        publisher.ensure_active()?;

        let job: JobHandle = self
            .service
            .register(descriptor)
            .await
            .map_err(|e| DataProbeError::Registration(e.to_string()))?
            .into();
        info!(dataset = %job.dataset_name, job = %job.analyze_job_name, "Dataset registered");
        publisher.publish(ProbeEvent::Registered(job.clone())).await?;

        self.poll_until_complete(&job, publisher).await?;

        Ok(self.fan_out(&job, publisher))
    }

    async fn poll_until_complete(&self, job: &JobHandle, publisher: &Publisher) -> Result<JobStatus> {
        let mut transient = self.transient_backoff();
        let mut attempts: u32 = 0;

        loop {
            publisher.ensure_active()?;
            if let Some(max) = self.config.max_poll_attempts {
                if attempts >= max {
                    return Err(DataProbeError::PollLimitExceeded { attempts });
                }
            }
            attempts += 1;
            self.metrics.polls.inc();

            let status = match self.service.poll_status(job).await {
                Ok(status) => status,
                Err(err) if err.is_transient() => match transient.next_backoff() {
                    Some(delay) => {
                        warn!(attempt = attempts, error = %err, ?delay, "Transient poll failure, retrying");
                        self.metrics.transient_retries.inc();
                        publisher.pause(delay).await?;
                        continue;
                    }
                    None => return Err(DataProbeError::PollTransport(err.to_string())),
                },
                Err(err) => return Err(DataProbeError::PollTransport(err.to_string())),
            };
            transient.reset();

            let state = status.state();
            publisher.publish(ProbeEvent::Progress(status.clone())).await?;

            match state {
                JobState::Complete => return Ok(status),
                JobState::Failed { step, kind, reason } => {
                    return Err(DataProbeError::JobFailed { step, kind, reason });
                }
                JobState::InProgress => {
                    debug!(
                        attempt = attempts,
                        steps = status.steps.len(),
                        succeeded = status.succeeded_steps(),
                        "Job still running"
                    );
                }
            }

            publisher.pause(self.config.poll_interval()).await?;
        }
    }

    fn transient_backoff(&self) -> ExponentialBackoff {
        let initial = self.config.poll_interval().max(Duration::from_millis(1));
        let mut backoff = ExponentialBackoff {
            initial_interval: initial,
            max_interval: initial * 8,
            max_elapsed_time: Some(self.config.transient_retry_window()),
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    fn fan_out(&self, job: &JobHandle, publisher: &Publisher) -> TrackedJob {
        let page = PageRequest::first(self.config.preview_page_size);

        let preview = tokio::spawn(load_preview(
            self.service.clone(),
            job.clone(),
            page,
            publisher.clone(),
            self.metrics.clone(),
        ));
        let profile = tokio::spawn(load_profile(
            self.service.clone(),
            job.clone(),
            publisher.clone(),
            self.metrics.clone(),
        ));

        TrackedJob {
            job: job.clone(),
            preview,
            profile,
        }
    }

    /// Fetch and store a preview page for the job currently in the store.
    pub async fn load_preview_page(&self, page: PageRequest) -> Result<DisplayTable> {
        let job = self.store.job().ok_or(DataProbeError::NoActiveJob)?;
        let publisher = self.detached_publisher();
        load_preview(self.service.clone(), job, page, publisher, self.metrics.clone()).await
    }

    /// Fetch a fresh profile for the job currently in the store and replace
    /// the stored report wholesale.
    pub async fn refresh_profile(&self) -> Result<ProfileReport> {
        let job = self.store.job().ok_or(DataProbeError::NoActiveJob)?;
        let publisher = self.detached_publisher();
        load_profile(self.service.clone(), job, publisher, self.metrics.clone()).await
    }

    /// Store-only publisher scoped to the run current at the time of the call
    fn detached_publisher(&self) -> Publisher {
        Publisher::new(
            self.store.clone(),
            self.store.current_run(),
            None,
            CancellationToken::new(),
        )
    }
}

async fn load_preview(
    service: Arc<dyn AnalysisService>,
    job: JobHandle,
    page: PageRequest,
    publisher: Publisher,
    metrics: ProbeMetrics,
) -> Result<DisplayTable> {
    publisher.ensure_active()?;
    let shaped = match service.fetch_preview(&job, page).await {
        Ok(payload) => shape_preview(&payload),
        Err(err) => Err(err),
    };

    match shaped {
        Ok(table) => {
            debug!(job = %job, rows = table.rows.len(), page = page.page_num, "Preview loaded");
            publisher.publish(ProbeEvent::Preview(table.clone())).await?;
            Ok(table)
        }
        Err(err) => {
            warn!(job = %job, error = %err, "Preview fetch failed");
            metrics.fetch_failures.inc();
            publisher
                .publish(ProbeEvent::PreviewFailed {
                    message: err.to_string(),
                })
                .await?;
            Err(err)
        }
    }
}

async fn load_profile(
    service: Arc<dyn AnalysisService>,
    job: JobHandle,
    publisher: Publisher,
    metrics: ProbeMetrics,
) -> Result<ProfileReport> {
    publisher.ensure_active()?;
    let shaped = match service.fetch_profile(&job).await {
        Ok(raw) => shape_profile(&raw),
        Err(err) => Err(err),
    };

    match shaped {
        Ok(report) => {
            debug!(job = %job, columns = report.columns.len(), "Profile loaded");
            publisher.publish(ProbeEvent::Profile(report.clone())).await?;
            Ok(report)
        }
        Err(err) => {
            warn!(job = %job, error = %err, "Profile fetch failed");
            metrics.fetch_failures.inc();
            publisher
                .publish(ProbeEvent::ProfileFailed {
                    message: err.to_string(),
                })
                .await?;
            Err(err)
        }
    }
}
