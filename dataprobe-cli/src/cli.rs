use crate::mock_server::{MockOptions, ScenarioType};
use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dataprobe_core::{
    load_config, DataProbe, DatasetDescriptor, DisplayTable, FeatureColumn, FeatureSeries,
    JobStatus, Pin, ProbeConfig, ProbeEvent, StepStatus,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dataprobe")]
#[command(about = "Track dataset analysis jobs and inspect their preview and profile")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a dataset, wait for its analysis and print the results
    Probe(ProbeArgs),
    /// Start mock analysis service
    MockServer(MockServerArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceArg {
    Upload,
    Import,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[arg(short, long)]
    pub file: PathBuf,
    #[arg(long, value_enum, default_value = "upload")]
    pub source: SourceArg,
    /// Analyze a random sample of this many rows
    #[arg(long, conflicts_with = "percentage")]
    pub rows: Option<u64>,
    /// Analyze this percentage of the rows
    #[arg(long)]
    pub percentage: Option<f64>,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long)]
    pub max_polls: Option<u32>,
    /// Only list profiled columns whose name contains this text
    #[arg(long)]
    pub filter: Option<String>,
    /// Preview page to show
    #[arg(long, default_value = "1")]
    pub page: u32,
    /// Print the final view model as JSON
    #[arg(long)]
    pub json: bool,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MockServerArgs {
    #[arg(short, long, default_value = "8000")]
    pub port: u16,
    #[arg(short, long)]
    pub scenario: Option<String>,
    #[arg(long, default_value = "1")]
    pub polls_per_step: u32,
    /// Make this step (0-based) fail
    #[arg(long)]
    pub fail_step: Option<usize>,
    #[arg(long, default_value = "0.0")]
    pub error_rate: f32,
    #[arg(long)]
    pub rate_limit: Option<u32>,
}

impl MockServerArgs {
    pub fn options(&self) -> MockOptions {
        MockOptions {
            scenario: self
                .scenario
                .as_deref()
                .map(ScenarioType::from_str)
                .unwrap_or(ScenarioType::BankMarketing),
            polls_per_step: self.polls_per_step,
            fail_step: self.fail_step,
            error_rate: self.error_rate,
            rate_limit: self.rate_limit,
            ..MockOptions::default()
        }
    }
}

impl ProbeArgs {
    /// File/env configuration with command-line overrides applied
    pub fn config(&self) -> Result<ProbeConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(interval) = self.poll_interval_ms {
            config.poll_interval_ms = interval;
        }
        if let Some(max) = self.max_polls {
            config.max_poll_attempts = Some(max);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn descriptor(&self) -> DatasetDescriptor {
        let descriptor = match self.source {
            SourceArg::Upload => DatasetDescriptor::upload(&self.file),
            SourceArg::Import => DatasetDescriptor::import(&self.file),
        };
        match (self.rows, self.percentage) {
            (Some(rows), _) => descriptor.with_random_rows(rows),
            (None, Some(pct)) => descriptor.with_percentage(pct),
            (None, None) => descriptor,
        }
    }
}

pub async fn probe_command(args: ProbeArgs, config: ProbeConfig) -> Result<()> {
    info!("Probing {} via {}", args.file.display(), config.base_url);

    let probe = DataProbe::connect(config)?;
    let mut session = probe.track(args.descriptor());

    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling analysis");
            cancel.cancel();
        }
    });

    while let Some(event) = session.events.recv().await {
        if !args.json {
            if let Some(line) = render_event(&event) {
                println!("{}", line);
            }
        }
    }

    let tracked = session.finish().await?;
    let (preview, profile) = tracked.join().await;
    if let (Err(preview_err), Err(profile_err)) = (&preview, &profile) {
        bail!("No results: preview failed ({}), profile failed ({})", preview_err, profile_err);
    }

    if args.page != 1 {
        let page_size = probe.config().preview_page_size;
        probe.load_preview_page(args.page, page_size).await?;
    }
    if let Some(query) = &args.filter {
        probe.filter_or_refresh(query).await?;
    }

    let view = probe.store().snapshot();
    let rendered = if args.json {
        serde_json::to_string_pretty(&view)?
    } else {
        let mut out = String::new();
        if let Some(table) = &view.preview {
            out.push_str(&render_preview(table));
        }
        if let Some(report) = &view.profile {
            out.push_str(&format!(
                "\n📊 {} ({} rows, {})\n",
                report.dataset_display_name, report.row_count, report.source_file_path
            ));
            out.push_str(&format!(
                "Continuous: {}  Categorical: {}  Datetime: {}  Text: {}\n",
                report.continuous_count,
                report.categorical_count,
                report.datetime_count,
                report.text_count
            ));
            out.push_str(&render_columns(&view.visible_columns()));
        }
        out
    };

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &rendered).await?;
            info!("Results saved to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

/// One human-readable line per event; `None` for events with nothing to say
pub fn render_event(event: &ProbeEvent) -> Option<String> {
    match event {
        ProbeEvent::Registered(job) => Some(format!("🔍 Registered {}", job)),
        ProbeEvent::Progress(status) => Some(render_progress(status)),
        ProbeEvent::PreviewFailed { message } => Some(format!("⚠️  Preview unavailable: {}", message)),
        ProbeEvent::ProfileFailed { message } => Some(format!("⚠️  Profile unavailable: {}", message)),
        ProbeEvent::Failed { message } => Some(format!("❌ {}", message)),
        ProbeEvent::Preview(_) | ProbeEvent::Profile(_) => None,
    }
}

pub fn render_progress(status: &JobStatus) -> String {
    let steps: Vec<String> = status
        .steps
        .iter()
        .map(|step| {
            let mark = match step.status {
                StepStatus::Pending => "…",
                StepStatus::Running => "▶",
                StepStatus::Succeed => "✓",
                StepStatus::Failed => "✗",
            };
            format!("{} {}", mark, step.kind())
        })
        .collect();
    format!("   [{}]", steps.join(" | "))
}

pub fn render_preview(table: &DisplayTable) -> String {
    let mut out = String::new();
    match table.total_rows {
        Some(total) => out.push_str(&format!("\n📋 Preview ({} of {} rows)\n", table.rows.len(), total)),
        None => out.push_str(&format!("\n📋 Preview ({} rows)\n", table.rows.len())),
    }

    let header: Vec<String> = table
        .columns
        .iter()
        .map(|column| match column.pinned {
            Pin::Start => format!("|{}", column.title),
            Pin::End => format!("{}|", column.title),
            Pin::None => column.title.clone(),
        })
        .collect();
    out.push_str(&header.join("\t"));
    out.push('\n');

    for row in &table.rows {
        let cells: Vec<String> = table
            .columns
            .iter()
            .map(|column| match row.get(&column.key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            })
            .collect();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out
}

pub fn render_columns(columns: &[FeatureColumn]) -> String {
    let mut out = String::new();
    for column in columns {
        let missing = column
            .missing_ratio
            .map(|ratio| format!(", {:.1}% missing", ratio * 100.0))
            .unwrap_or_default();
        let detail = match &column.series {
            FeatureSeries::Histogram { bins } => format!(", {} bins", bins.len()),
            FeatureSeries::Datetime(series) => format!(", {} years", series.year.len()),
            FeatureSeries::None => String::new(),
        };
        out.push_str(&format!(
            "✓ {} ({:?}{}{})\n",
            column.name, column.inferred_type, missing, detail
        ));
    }
    out
}
