use anyhow::Result;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use dataprobe_core::job::{DatasetDescriptor, SampleStrategy, Step, StepStatus, JOB_STEP_COUNT};
use governor::{DefaultDirectRateLimiter, Quota};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::Filter;

/// Error code returned in the envelope for unknown datasets or jobs
pub const NOT_FOUND_CODE: i64 = 4004;

const STEP_KINDS: [&str; JOB_STEP_COUNT] = ["upload", "load", "analyze"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioType {
    BankMarketing,
    OrderHistory,
}

impl ScenarioType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "order-history" | "orders" => ScenarioType::OrderHistory,
            _ => ScenarioType::BankMarketing,
        }
    }

    fn dataset_name(&self) -> &'static str {
        match self {
            ScenarioType::BankMarketing => "bank_marketing",
            ScenarioType::OrderHistory => "order_history",
        }
    }

    fn total_rows(&self) -> u64 {
        match self {
            ScenarioType::BankMarketing => 4521,
            ScenarioType::OrderHistory => 1200,
        }
    }

    fn headers(&self) -> Vec<&'static str> {
        match self {
            ScenarioType::BankMarketing => vec!["age", "job", "marital", "balance", "y"],
            ScenarioType::OrderHistory => vec!["order_id", "order_date", "region", "amount"],
        }
    }

    fn row(&self, index: u64) -> Vec<Value> {
        match self {
            ScenarioType::BankMarketing => {
                const JOBS: [&str; 6] =
                    ["management", "technician", "blue-collar", "admin.", "services", "retired"];
                const MARITAL: [&str; 3] = ["married", "single", "divorced"];
                vec![
                    json!(19 + (index * 7) % 68),
                    json!(JOBS[(index % 6) as usize]),
                    json!(MARITAL[(index % 3) as usize]),
                    json!((index as i64 * 137) % 9000 - 500),
                    json!(if index % 9 == 0 { "yes" } else { "no" }),
                ]
            }
            ScenarioType::OrderHistory => {
                const REGIONS: [&str; 4] = ["north", "south", "east", "west"];
                let start = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).single().unwrap_or_default();
                let placed = start + ChronoDuration::hours(index as i64 * 29);
                vec![
                    json!(format!("ORD-{:06}", index + 1)),
                    json!(placed.format("%Y-%m-%d %H:%M:%S").to_string()),
                    json!(REGIONS[(index % 4) as usize]),
                    json!(((index * 1913) % 50_000) as f64 / 100.0),
                ]
            }
        }
    }

    fn features(&self, n_rows: u64) -> Value {
        let share = |fraction: f64| (n_rows as f64 * fraction).round() as u64;
        match self {
            ScenarioType::BankMarketing => json!([
                {"name": "age", "type": "continuous", "data_type": "int64",
                 "missing": {"value": 0, "percentage": 0.0},
                 "unique": {"value": 67, "percentage": 1.48},
                 "extension": {"bins": [
                     {"begin": 19.0, "end": 32.6, "value": share(0.31)},
                     {"begin": 32.6, "end": 46.2, "value": share(0.42)},
                     {"begin": 46.2, "end": 59.8, "value": share(0.22)},
                     {"begin": 59.8, "end": 87.0, "value": share(0.05)}]}},
                {"name": "job", "type": "categorical", "data_type": "object",
                 "missing": {"value": share(0.008), "percentage": 0.8},
                 "unique": {"value": 12, "percentage": 0.27},
                 "extension": {"value_count": [
                     {"type": "management", "value": share(0.21)},
                     {"type": "blue-collar", "value": share(0.21)},
                     {"type": "technician", "value": share(0.17)}]}},
                {"name": "marital", "type": "categorical", "data_type": "object",
                 "missing": {"value": 0, "percentage": 0.0},
                 "unique": {"value": 3, "percentage": 0.07}},
                {"name": "balance", "type": "continuous", "data_type": "int64",
                 "missing": {"value": 0, "percentage": 0.0},
                 "unique": {"value": 2353, "percentage": 52.0},
                 "extension": {"bins": [
                     {"begin": -3313.0, "end": 0.0, "value": share(0.08)},
                     {"begin": 0.0, "end": 5000.0, "value": share(0.86)},
                     {"begin": 5000.0, "end": 71188.0, "value": share(0.06)}]}},
                {"name": "y", "type": "categorical", "data_type": "object",
                 "missing": {"value": 0, "percentage": 0.0},
                 "unique": {"value": 2, "percentage": 0.04}},
            ]),
            ScenarioType::OrderHistory => {
                let by_hour: Vec<u64> = (0..25).map(|h| share(if h < 24 { 1.0 / 24.0 } else { 0.0 })).collect();
                let by_week: Vec<u64> = (0..7).map(|_| share(1.0 / 7.0)).collect();
                let by_month: Vec<u64> = (0..12).map(|_| share(1.0 / 12.0)).collect();
                json!([
                    {"name": "order_id", "type": "text", "data_type": "object",
                     "unique": {"value": n_rows, "percentage": 100.0}},
                    {"name": "order_date", "type": "datetime", "data_type": "datetime64",
                     "missing": {"value": 0, "percentage": 0.0},
                     "extension": {
                         "by_hour": by_hour,
                         "by_week": by_week,
                         "by_month": by_month,
                         "by_year": [
                             {"year": 2019, "value": share(0.33)},
                             {"year": 2020, "value": share(0.34)},
                             {"year": 2021, "value": share(0.33)}]}},
                    {"name": "region", "type": "categorical", "data_type": "object",
                     "unique": {"value": 4, "percentage": 0.33}},
                    {"name": "amount", "type": "continuous", "data_type": "float64",
                     "missing": {"value": share(0.02), "percentage": 2.0},
                     "extension": {"bins": [
                         {"begin": 0.0, "end": 250.0, "value": share(0.5)},
                         {"begin": 250.0, "end": 500.0, "value": share(0.5)}]}},
                ])
            }
        }
    }

    fn feature_summary(&self) -> Value {
        match self {
            ScenarioType::BankMarketing => {
                json!({"continuous": 2, "categorical": 3, "datetime": 0, "text": 0})
            }
            ScenarioType::OrderHistory => {
                json!({"continuous": 1, "categorical": 1, "datetime": 1, "text": 1})
            }
        }
    }
}

/// Behaviour knobs for the mock analysis service
#[derive(Debug, Clone)]
pub struct MockOptions {
    pub scenario: ScenarioType,
    /// Status polls each step stays running for before it succeeds
    pub polls_per_step: u32,
    /// Index of a step that fails instead of succeeding
    pub fail_step: Option<usize>,
    /// Fraction of requests answered with a simulated 500
    pub error_rate: f32,
    pub latency_ms: (u64, u64),
    /// Requests per second before answering 429
    pub rate_limit: Option<u32>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            scenario: ScenarioType::BankMarketing,
            polls_per_step: 1,
            fail_step: None,
            error_rate: 0.0,
            latency_ms: (0, 0),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone)]
struct MockJob {
    analyze_job_name: String,
    file_path: String,
    n_rows: u64,
    polls: u32,
    created: chrono::DateTime<Utc>,
}

pub struct MockAnalysisServer {
    options: MockOptions,
    jobs: Mutex<HashMap<String, MockJob>>,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl MockAnalysisServer {
    pub fn new(options: MockOptions) -> Self {
        let rate_limiter = options
            .rate_limit
            .and_then(NonZeroU32::new)
            .map(|rate| Arc::new(governor::RateLimiter::direct(Quota::per_second(rate))));

        Self {
            options,
            jobs: Mutex::new(HashMap::new()),
            rate_limiter,
        }
    }

    /// Rate limiting, latency and random failures shared by every route
    async fn simulate_conditions(&self) -> Result<(), warp::Rejection> {
        if let Some(limiter) = &self.rate_limiter {
            if limiter.check().is_err() {
                return Err(warp::reject::custom(RateLimitError));
            }
        }

        let (min, max) = self.options.latency_ms;
        if max > min {
            let latency = rand::random::<u64>() % (max - min) + min;
            sleep(Duration::from_millis(latency)).await;
        } else if min > 0 {
            sleep(Duration::from_millis(min)).await;
        }

        if rand::random::<f32>() < self.options.error_rate {
            return Err(warp::reject::custom(SimulatedError));
        }
        Ok(())
    }

    pub fn register(&self, descriptor: &DatasetDescriptor) -> Value {
        let total = self.options.scenario.total_rows();
        let n_rows = match descriptor.sample_strategy {
            SampleStrategy::WholeData => total,
            SampleStrategy::RandomRows => descriptor.n_rows.unwrap_or(total).min(total),
            SampleStrategy::ByPercentage => {
                let pct = descriptor.percentage.unwrap_or(100.0).clamp(0.0, 100.0);
                (total as f64 * pct / 100.0).round() as u64
            }
        };

        let stem = descriptor
            .file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let id = Uuid::new_v4().simple().to_string();
        let dataset_name = format!("{}_{}", stem, &id[..8]);
        let job = MockJob {
            analyze_job_name: format!("job_analyze_{}", &id[8..16]),
            file_path: descriptor.file_path.display().to_string(),
            n_rows,
            polls: 0,
            created: Utc::now(),
        };

        info!(dataset = %dataset_name, job = %job.analyze_job_name, n_rows, "Registered temporary dataset");
        let data = json!({
            "temporary_dataset_name": dataset_name,
            "analyze_job_name": job.analyze_job_name,
        });
        self.jobs.lock().insert(dataset_name, job);
        data
    }

    /// Advance the job by one poll and report its steps
    pub fn poll(&self, dataset_name: &str, analyze_job_name: &str) -> Option<Vec<Step>> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(dataset_name)
            .filter(|job| job.analyze_job_name == analyze_job_name)?;
        job.polls += 1;

        let per_step = self.options.polls_per_step.max(1);
        let reached = ((job.polls / per_step) as usize).min(JOB_STEP_COUNT);
        let visible = (reached + 1).min(JOB_STEP_COUNT);

        let steps = (0..visible)
            .map(|index| {
                let status = if self.options.fail_step == Some(index) && index <= reached {
                    StepStatus::Failed
                } else if index < reached {
                    StepStatus::Succeed
                } else if index == 0 {
                    StepStatus::Pending
                } else {
                    StepStatus::Running
                };
                let mut step = Step::new(status);
                step.kind = Some(STEP_KINDS[index].to_string());
                step.datetime = Some(json!(job.created.timestamp()));
                if status == StepStatus::Succeed {
                    step.took = Some(0.1 * (index + 1) as f64);
                }
                if status == StepStatus::Failed {
                    step.extension = Some(json!({"reason": format!("simulated {} failure", STEP_KINDS[index])}));
                }
                step
            })
            .collect();

        debug!(dataset = dataset_name, polls = job.polls, reached, "Job polled");
        Some(steps)
    }

    pub fn preview(&self, dataset_name: &str, page_num: u32, page_size: u32) -> Option<Value> {
        let n_rows = self.jobs.lock().get(dataset_name)?.n_rows;
        let scenario = self.options.scenario;
        let start = u64::from(page_num.max(1) - 1) * u64::from(page_size);
        let end = (start + u64::from(page_size)).min(n_rows);
        let rows: Vec<Vec<Value>> = (start..end).map(|i| scenario.row(i)).collect();

        Some(json!({
            "headers": scenario.headers(),
            "rows": rows,
            "count": n_rows,
        }))
    }

    pub fn profile(&self, dataset_name: &str, analyze_job_name: &str) -> Option<Value> {
        let job = self
            .jobs
            .lock()
            .get(dataset_name)
            .filter(|job| job.analyze_job_name == analyze_job_name)
            .cloned()?;
        let scenario = self.options.scenario;

        Some(json!({
            "name": scenario.dataset_name(),
            "n_rows": job.n_rows,
            "file_path": job.file_path,
            "feature_summary": scenario.feature_summary(),
            "features": scenario.features(job.n_rows),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    page_num: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    analyze_job_name: String,
}

fn ok(data: Value) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({"code": 0, "data": data})),
        StatusCode::OK,
    )
}

fn not_found(what: &str) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({"code": NOT_FOUND_CODE, "data": format!("{} not found", what)})),
        StatusCode::OK,
    )
}

fn with_server(
    server: Arc<MockAnalysisServer>,
) -> impl Filter<Extract = (Arc<MockAnalysisServer>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

/// All routes of the mock service, including rejection handling
pub fn routes(
    server: Arc<MockAnalysisServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let register = warp::path!("api" / "temporary-dataset")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_server(server.clone()))
        .and_then(handle_register);

    let poll = warp::path!("api" / "temporary-dataset" / String / "analyze-job" / String)
        .and(warp::get())
        .and(with_server(server.clone()))
        .and_then(handle_poll);

    let preview = warp::path!("api" / "temporary-dataset" / String / "preview")
        .and(warp::get())
        .and(warp::query::<PreviewQuery>())
        .and(with_server(server.clone()))
        .and_then(handle_preview);

    let profile = warp::path!("api" / "temporary-dataset" / String)
        .and(warp::get())
        .and(warp::query::<ProfileQuery>())
        .and(with_server(server))
        .and_then(handle_profile);

    let health_route = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    register
        .or(poll)
        .or(preview)
        .or(profile)
        .or(health_route)
        .recover(handle_rejection)
}

/// Bind the mock service; port 0 picks a free port.
pub fn bind(
    server: Arc<MockAnalysisServer>,
    addr: SocketAddr,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let (bound, serving) = warp::serve(routes(server)).try_bind_ephemeral(addr)?;
    Ok((bound, serving))
}

pub async fn start_mock_server(port: u16, options: MockOptions) -> Result<()> {
    info!("Starting mock analysis service on port {} with scenario {:?}", port, options.scenario);

    let server = Arc::new(MockAnalysisServer::new(options));
    let (addr, serving) = bind(server, ([127, 0, 0, 1], port).into())?;

    info!("Mock analysis service ready at http://{}", addr);
    serving.await;

    Ok(())
}

async fn handle_register(
    descriptor: DatasetDescriptor,
    server: Arc<MockAnalysisServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    server.simulate_conditions().await?;
    Ok(ok(server.register(&descriptor)))
}

async fn handle_poll(
    dataset_name: String,
    analyze_job_name: String,
    server: Arc<MockAnalysisServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    server.simulate_conditions().await?;
    Ok(match server.poll(&dataset_name, &analyze_job_name) {
        Some(steps) => ok(json!({ "steps": steps })),
        None => not_found("analyze job"),
    })
}

async fn handle_preview(
    dataset_name: String,
    query: PreviewQuery,
    server: Arc<MockAnalysisServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    server.simulate_conditions().await?;
    Ok(match server.preview(&dataset_name, query.page_num, query.page_size) {
        Some(data) => ok(data),
        None => not_found("dataset"),
    })
}

async fn handle_profile(
    dataset_name: String,
    query: ProfileQuery,
    server: Arc<MockAnalysisServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    server.simulate_conditions().await?;
    Ok(match server.profile(&dataset_name, &query.analyze_job_name) {
        Some(data) => ok(data),
        None => not_found("dataset"),
    })
}

async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (status, kind, message) = if err.find::<RateLimitError>().is_some() {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "Rate limit exceeded. Please try again later.",
        )
    } else if err.find::<SimulatedError>().is_some() {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Simulated server error for testing",
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "No such route")
    } else {
        (StatusCode::BAD_REQUEST, "bad_request", "Malformed request")
    };

    let response = json!({"error": {"type": kind, "message": message}});
    Ok(warp::reply::with_status(warp::reply::json(&response), status))
}

#[derive(Debug)]
struct RateLimitError;
impl warp::reject::Reject for RateLimitError {}

#[derive(Debug)]
struct SimulatedError;
impl warp::reject::Reject for SimulatedError {}
