//! Scripted in-memory analysis service shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dataprobe_core::job::RegistrationResponse;
use dataprobe_core::{
    AnalysisService, DataProbeError, DatasetDescriptor, JobHandle, JobStatus, PageRequest,
    PreviewPayload, ProfileReportRaw, Result, Step, StepStatus,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub enum PollReply {
    Status(JobStatus),
    Transient,
    Permanent,
}

pub fn status(steps: &[StepStatus]) -> PollReply {
    PollReply::Status(JobStatus::new(steps.iter().copied().map(Step::new).collect()))
}

pub fn sample_preview() -> PreviewPayload {
    serde_json::from_value(json!({
        "headers": ["age", "job", "balance"],
        "rows": [[58, "management", 2143], [44, "technician", 29]],
        "count": 4521,
    }))
    .unwrap()
}

pub fn sample_profile() -> ProfileReportRaw {
    serde_json::from_value(json!({
        "name": "bank_marketing",
        "n_rows": 4521,
        "file_path": "/data/bank.csv",
        "feature_summary": {"continuous": 2, "categorical": 1, "datetime": 0, "text": 0},
        "features": [
            {"name": "age", "type": "continuous",
             "missing": {"value": 0, "percentage": 0.0},
             "unique": {"value": 67, "percentage": 1.5},
             "extension": {"bins": [
                 {"begin": 19.0, "end": 45.0, "value": 3000},
                 {"begin": 45.0, "end": 87.0, "value": 1521}]}},
            {"name": "job", "type": "categorical"},
            {"name": "balance_avg", "type": "continuous",
             "extension": {"bins": [{"begin": -3313.0, "end": 71188.0, "value": 4521}]}},
        ],
    }))
    .unwrap()
}

/// Replays scripted poll replies; the last status repeats once the script
/// runs out.
pub struct ScriptedService {
    pub registration_error: Option<String>,
    polls: Mutex<VecDeque<PollReply>>,
    last_status: Mutex<JobStatus>,
    pub preview: Mutex<std::result::Result<PreviewPayload, String>>,
    pub profile: Mutex<std::result::Result<ProfileReportRaw, String>>,
    pub poll_count: AtomicUsize,
    pub profile_count: AtomicUsize,
    pub preview_pages: Mutex<Vec<PageRequest>>,
    /// When set, each fetch records its request and then waits for a permit
    pub fetch_gate: Option<Arc<Semaphore>>,
}

impl ScriptedService {
    pub fn new(polls: Vec<PollReply>) -> Self {
        Self {
            registration_error: None,
            polls: Mutex::new(polls.into()),
            last_status: Mutex::new(JobStatus::new(vec![Step::new(StepStatus::Pending)])),
            preview: Mutex::new(Ok(sample_preview())),
            profile: Mutex::new(Ok(sample_profile())),
            poll_count: AtomicUsize::new(0),
            profile_count: AtomicUsize::new(0),
            preview_pages: Mutex::new(Vec::new()),
            fetch_gate: None,
        }
    }

    /// Hold every preview and profile fetch until permits are added to the
    /// returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.fetch_gate = Some(gate.clone());
        (self, gate)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.fetch_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    pub fn completing_after(pending_polls: usize) -> Self {
        let mut polls = vec![status(&[StepStatus::Pending]); pending_polls];
        polls.push(status(&[StepStatus::Succeed, StepStatus::Succeed, StepStatus::Succeed]));
        Self::new(polls)
    }

    pub fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub fn profiles(&self) -> usize {
        self.profile_count.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<PageRequest> {
        self.preview_pages.lock().clone()
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn register(&self, descriptor: &DatasetDescriptor) -> Result<RegistrationResponse> {
        if let Some(message) = &self.registration_error {
            return Err(DataProbeError::Api {
                code: 1,
                message: message.clone(),
            });
        }
        let stem = descriptor
            .file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(RegistrationResponse {
            temporary_dataset_name: format!("{}_tmp", stem),
            analyze_job_name: "job_analyze_1".to_string(),
        })
    }

    async fn poll_status(&self, _job: &JobHandle) -> Result<JobStatus> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().pop_front();
        match next {
            Some(PollReply::Status(status)) => {
                *self.last_status.lock() = status.clone();
                Ok(status)
            }
            Some(PollReply::Transient) => {
                Err(DataProbeError::PollTransport("connection reset".to_string()))
            }
            Some(PollReply::Permanent) => Err(DataProbeError::Api {
                code: 404,
                message: "job not found".to_string(),
            }),
            None => Ok(self.last_status.lock().clone()),
        }
    }

    async fn fetch_preview(&self, _job: &JobHandle, page: PageRequest) -> Result<PreviewPayload> {
        self.preview_pages.lock().push(page);
        self.pass_gate().await;
        self.preview.lock().clone().map_err(|message| DataProbeError::Api {
            code: 500,
            message,
        })
    }

    async fn fetch_profile(&self, _job: &JobHandle) -> Result<ProfileReportRaw> {
        self.profile_count.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        self.profile.lock().clone().map_err(|message| DataProbeError::Api {
            code: 500,
            message,
        })
    }
}
