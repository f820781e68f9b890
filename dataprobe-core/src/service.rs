//! Remote analysis service: the trait the poller drives, and its HTTP client

use crate::job::{DatasetDescriptor, JobHandle, JobStatus, RegistrationResponse};
use crate::preview::{PageRequest, PreviewPayload};
use crate::profile::ProfileReportRaw;
use crate::{DataProbeError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The four operations of the remote analysis service.
///
/// Implementations perform one request per call and never retry; retry
/// policy belongs to the caller.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn register(&self, descriptor: &DatasetDescriptor) -> Result<RegistrationResponse>;
    async fn poll_status(&self, job: &JobHandle) -> Result<JobStatus>;
    async fn fetch_preview(&self, job: &JobHandle, page: PageRequest) -> Result<PreviewPayload>;
    async fn fetch_profile(&self, job: &JobHandle) -> Result<ProfileReportRaw>;
}

/// Response envelope wrapping every service payload
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Value,
}

/// HTTP client for the analysis service's JSON API
#[derive(Clone)]
pub struct HttpAnalysisService {
    client: Client,
    base_url: Url,
}

impl HttpAnalysisService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw)
            .map_err(|e| DataProbeError::Configuration(format!("invalid base URL '{}': {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DataProbeError::Configuration(format!(
                "base URL '{}' cannot carry a path",
                raw
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Service URL with each name pushed as one percent-encoded path segment
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["api", "temporary-dataset"])
                .extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let envelope: Envelope = request.send().await?.error_for_status()?.json().await?;
        if envelope.code != 0 {
            let message = match envelope.data {
                Value::String(s) => s,
                Value::Null => "no message".to_string(),
                other => other.to_string(),
            };
            return Err(DataProbeError::Api {
                code: envelope.code,
                message,
            });
        }
        Ok(serde_json::from_value(envelope.data)?)
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn register(&self, descriptor: &DatasetDescriptor) -> Result<RegistrationResponse> {
        debug!(file = %descriptor.file_path.display(), "Registering temporary dataset");
        self.send(self.client.post(self.url(&[])).json(descriptor))
            .await
    }

    async fn poll_status(&self, job: &JobHandle) -> Result<JobStatus> {
        let url = self.url(&[job.dataset_name.as_str(), "analyze-job", job.analyze_job_name.as_str()]);
        self.send(self.client.get(url)).await
    }

    async fn fetch_preview(&self, job: &JobHandle, page: PageRequest) -> Result<PreviewPayload> {
        let url = self.url(&[job.dataset_name.as_str(), "preview"]);
        let request = self.client.get(url).query(&[
            ("page_num", page.page_num.to_string()),
            ("page_size", page.page_size.to_string()),
        ]);
        self.send(request).await
    }

    async fn fetch_profile(&self, job: &JobHandle) -> Result<ProfileReportRaw> {
        let url = self.url(&[job.dataset_name.as_str()]);
        let request = self
            .client
            .get(url)
            .query(&[("analyze_job_name", job.analyze_job_name.as_str())]);
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let service = HttpAnalysisService::with_client(Client::new(), "http://localhost:8000/").unwrap();
        assert_eq!(
            service.url(&["ds_1", "preview"]).as_str(),
            "http://localhost:8000/api/temporary-dataset/ds_1/preview"
        );
    }

    #[test]
    fn base_url_path_prefix_kept() {
        let service = HttpAnalysisService::with_client(Client::new(), "http://localhost:8000/probe/").unwrap();
        assert_eq!(
            service.url(&[]).as_str(),
            "http://localhost:8000/probe/api/temporary-dataset"
        );
    }

    #[test]
    fn names_are_encoded_as_single_segments() {
        let service = HttpAnalysisService::with_client(Client::new(), "http://localhost:8000").unwrap();
        let url = service.url(&["sales/2024?q#1", "analyze-job", "job 7"]);
        assert_eq!(
            url.path(),
            "/api/temporary-dataset/sales%2F2024%3Fq%231/analyze-job/job%207"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn unparseable_base_url_rejected() {
        let err = HttpAnalysisService::with_client(Client::new(), "not a url").err().unwrap();
        assert!(matches!(err, DataProbeError::Configuration(_)));
    }
}
