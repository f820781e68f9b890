//! Analysis job model: registration request, job handle and step status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of steps an analysis job runs through (registration, load, analyze)
pub const JOB_STEP_COUNT: usize = 3;

/// How the dataset reached the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Upload,
    Import,
}

/// Which rows the service should analyze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStrategy {
    WholeData,
    RandomRows,
    ByPercentage,
}

/// Registration request describing the dataset to analyze
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub file_path: PathBuf,
    pub source_type: SourceType,
    pub sample_strategy: SampleStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// Seconds the upload took, reported back for the job timeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_took: Option<f64>,
}

impl DatasetDescriptor {
    /// Descriptor for an uploaded file analyzed in full
    pub fn upload(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            source_type: SourceType::Upload,
            sample_strategy: SampleStrategy::WholeData,
            n_rows: None,
            percentage: None,
            upload_took: None,
        }
    }

    /// Descriptor for a file already present on the service host
    pub fn import(file_path: impl Into<PathBuf>) -> Self {
        Self {
            source_type: SourceType::Import,
            ..Self::upload(file_path)
        }
    }

    pub fn with_random_rows(mut self, n_rows: u64) -> Self {
        self.sample_strategy = SampleStrategy::RandomRows;
        self.n_rows = Some(n_rows);
        self.percentage = None;
        self
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.sample_strategy = SampleStrategy::ByPercentage;
        self.percentage = Some(percentage);
        self.n_rows = None;
        self
    }
}

/// Names returned by a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub temporary_dataset_name: String,
    pub analyze_job_name: String,
}

/// Identifies one analysis run. Every poll and fetch is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub dataset_name: String,
    pub analyze_job_name: String,
}

impl From<RegistrationResponse> for JobHandle {
    fn from(resp: RegistrationResponse) -> Self {
        Self {
            dataset_name: resp.temporary_dataset_name,
            analyze_job_name: resp.analyze_job_name,
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset_name, self.analyze_job_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeed,
    Failed,
}

/// One stage of the remote job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<serde_json::Value>,
}

impl Step {
    pub fn new(status: StepStatus) -> Self {
        Self {
            kind: None,
            status,
            took: None,
            datetime: None,
            extension: None,
        }
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("unknown")
    }
}

/// Where a job stands after one poll
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    InProgress,
    Complete,
    Failed { step: usize, kind: String, reason: String },
}

/// Snapshot of the job's steps returned by one poll
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobStatus {
    pub steps: Vec<Step>,
}

impl JobStatus {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Complete exactly when the third step has succeeded.
    pub fn is_complete(&self) -> bool {
        self.steps.len() == JOB_STEP_COUNT
            && self.steps[JOB_STEP_COUNT - 1].status == StepStatus::Succeed
    }

    /// First step reporting `failed`, with its index
    pub fn failed_step(&self) -> Option<(usize, &Step)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, step)| step.status == StepStatus::Failed)
    }

    pub fn state(&self) -> JobState {
        if let Some((index, step)) = self.failed_step() {
            return JobState::Failed {
                step: index,
                kind: step.kind().to_string(),
                reason: failure_reason(step),
            };
        }
        if self.is_complete() {
            JobState::Complete
        } else {
            JobState::InProgress
        }
    }

    /// Number of steps that have succeeded so far
    pub fn succeeded_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Succeed)
            .count()
    }
}

fn failure_reason(step: &Step) -> String {
    step.extension
        .as_ref()
        .and_then(|ext| {
            ext.get("reason")
                .or_else(|| ext.get("message"))
                .and_then(|v| v.as_str())
        })
        .unwrap_or("no reason reported")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use StepStatus::*;

    fn status(steps: &[StepStatus]) -> JobStatus {
        JobStatus::new(steps.iter().copied().map(Step::new).collect())
    }

    #[test]
    fn complete_only_when_third_step_succeeds() {
        assert!(!status(&[]).is_complete());
        assert!(!status(&[Pending]).is_complete());
        assert!(!status(&[Succeed, Succeed]).is_complete());
        assert!(!status(&[Succeed, Succeed, Running]).is_complete());
        assert!(status(&[Succeed, Succeed, Succeed]).is_complete());
        assert!(!status(&[Succeed, Succeed, Succeed, Succeed]).is_complete());
    }

    #[test]
    fn failed_step_wins_over_progress() {
        let s = status(&[Succeed, Failed]);
        assert_eq!(s.failed_step().map(|(i, _)| i), Some(1));
        assert!(matches!(s.state(), JobState::Failed { step: 1, .. }));
        assert_eq!(status(&[Succeed, Running]).state(), JobState::InProgress);
        assert_eq!(status(&[Succeed, Succeed, Succeed]).state(), JobState::Complete);
    }

    #[test]
    fn failure_reason_read_from_extension() {
        let json = r#"{"steps":[{"type":"upload","status":"succeed"},
            {"type":"load","status":"failed","extension":{"reason":"bad encoding"}}]}"#;
        let s: JobStatus = serde_json::from_str(json).unwrap();
        assert_eq!(
            s.state(),
            JobState::Failed {
                step: 1,
                kind: "load".into(),
                reason: "bad encoding".into()
            }
        );
    }

    #[test]
    fn descriptor_serializes_snake_case() {
        let d = DatasetDescriptor::import("/data/bank.csv").with_random_rows(1000);
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["source_type"], "import");
        assert_eq!(v["sample_strategy"], "random_rows");
        assert_eq!(v["n_rows"], 1000);
        assert!(v.get("percentage").is_none());
    }
}
