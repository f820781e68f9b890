//! View-model state shared between the poller and the presentation layer
//!
//! Every artifact is replaced wholesale; readers get an `Arc` to the value
//! that was current when they asked and never observe a half-applied update.

use crate::job::{JobHandle, JobStatus};
use crate::preview::DisplayTable;
use crate::profile::{FeatureColumn, ProfileReport};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Registering,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewModel {
    pub phase: JobPhase,
    pub job: Option<JobHandle>,
    pub progress: Option<Arc<JobStatus>>,
    pub preview: Option<Arc<DisplayTable>>,
    pub profile: Option<Arc<ProfileReport>>,
    /// Filtered view over `profile.columns`; `None` shows the full list
    pub filtered_columns: Option<Arc<Vec<FeatureColumn>>>,
    pub error: Option<String>,
}

impl ViewModel {
    /// Columns the column list should currently render
    pub fn visible_columns(&self) -> Vec<FeatureColumn> {
        if let Some(filtered) = &self.filtered_columns {
            return filtered.as_ref().clone();
        }
        self.profile
            .as_ref()
            .map(|p| p.columns.clone())
            .unwrap_or_default()
    }
}

/// Identifies one tracked run. Writes tagged with a superseded run are
/// dropped, so a straggling fan-out cannot overwrite the next run's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunId(u64);

#[derive(Debug, Default)]
struct State {
    run: RunId,
    view: ViewModel,
}

/// Thread-safe holder of the latest [`ViewModel`]
#[derive(Debug, Default)]
pub struct ViewModelStore {
    inner: RwLock<State>,
}

impl ViewModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewModel {
        self.inner.read().view.clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.inner.read().view.phase
    }

    pub fn job(&self) -> Option<JobHandle> {
        self.inner.read().view.job.clone()
    }

    pub fn progress(&self) -> Option<Arc<JobStatus>> {
        self.inner.read().view.progress.clone()
    }

    pub fn preview(&self) -> Option<Arc<DisplayTable>> {
        self.inner.read().view.preview.clone()
    }

    pub fn profile(&self) -> Option<Arc<ProfileReport>> {
        self.inner.read().view.profile.clone()
    }

    pub fn current_run(&self) -> RunId {
        self.inner.read().run
    }

    /// Start tracking a new run; drops everything from the previous one.
    pub fn begin_run(&self) -> RunId {
        let mut state = self.inner.write();
        state.run = RunId(state.run.0 + 1);
        state.view = ViewModel {
            phase: JobPhase::Registering,
            ..ViewModel::default()
        };
        state.run
    }

    /// Apply `update` if `run` is still the current run. Returns whether it was applied.
    fn update_run(&self, run: RunId, update: impl FnOnce(&mut ViewModel)) -> bool {
        let mut state = self.inner.write();
        if state.run != run {
            return false;
        }
        update(&mut state.view);
        true
    }

    pub fn set_job(&self, run: RunId, job: JobHandle) -> bool {
        self.update_run(run, |view| {
            view.job = Some(job);
            view.phase = JobPhase::Polling;
        })
    }

    pub fn set_progress(&self, run: RunId, status: JobStatus) -> bool {
        self.update_run(run, |view| {
            if status.is_complete() {
                view.phase = JobPhase::Completed;
            }
            view.progress = Some(Arc::new(status));
        })
    }

    pub fn set_phase(&self, run: RunId, phase: JobPhase) -> bool {
        self.update_run(run, |view| view.phase = phase)
    }

    pub fn set_preview(&self, run: RunId, table: DisplayTable) -> bool {
        self.update_run(run, |view| view.preview = Some(Arc::new(table)))
    }

    /// Replace the report and discard any filtered view of the old one.
    pub fn set_profile(&self, run: RunId, report: ProfileReport) -> bool {
        self.update_run(run, |view| {
            view.profile = Some(Arc::new(report));
            view.filtered_columns = None;
        })
    }

    pub fn fail(&self, run: RunId, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update_run(run, |view| {
            view.phase = JobPhase::Failed;
            view.error = Some(message);
        })
    }

    pub fn set_filtered(&self, columns: Vec<FeatureColumn>) {
        self.inner.write().view.filtered_columns = Some(Arc::new(columns));
    }

    pub fn clear_filter(&self) {
        self.inner.write().view.filtered_columns = None;
    }
}
