//! Shapes the per-column feature profile into chart-ready series
//!
//! The service reports one entry per column with an inferred type and a
//! type-specific `extension`. Continuous columns carry histogram bins, datetime
//! columns carry bucket counts by hour, weekday, month and year. Shaping turns
//! those into labelled series a chart can plot directly and assigns each
//! column a positional key for list rendering.

use crate::{DataProbeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hour-of-day labels. The service emits an inclusive upper boundary bucket,
/// hence 25 entries.
pub const HOUR_LABELS: [&str; 25] = [
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16",
    "17", "18", "19", "20", "21", "22", "23", "24",
];

pub const WEEK_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Continuous,
    Categorical,
    Datetime,
    Text,
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Raw payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureSummary {
    #[serde(default)]
    pub continuous: u64,
    #[serde(default)]
    pub categorical: u64,
    #[serde(default)]
    pub datetime: u64,
    #[serde(default)]
    pub text: u64,
}

/// Count with its share of all rows, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CountStat {
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    pub name: String,
    #[serde(rename = "type")]
    pub inferred_type: FeatureType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<CountStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<CountStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Value>,
}

/// Feature profile exactly as the service returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReportRaw {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub n_rows: u64,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub feature_summary: FeatureSummary,
    #[serde(default)]
    pub features: Vec<RawFeature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct RawBin {
    begin: f64,
    end: f64,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct ContinuousExtension {
    bins: Vec<RawBin>,
}

#[derive(Debug, Deserialize)]
struct RawYearBucket {
    year: Value,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct DatetimeExtension {
    by_hour: Vec<u64>,
    by_week: Vec<u64>,
    by_month: Vec<u64>,
    by_year: Vec<RawYearBucket>,
}

// ---------------------------------------------------------------------------
// Shaped report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub range: [f64; 2],
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatetimeSeries {
    pub hour: Vec<LabeledValue>,
    pub week: Vec<LabeledValue>,
    pub month: Vec<LabeledValue>,
    pub year: Vec<LabeledValue>,
}

/// Chart series derived from a column's extension
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSeries {
    #[default]
    None,
    Histogram { bins: Vec<HistogramBin> },
    Datetime(DatetimeSeries),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    /// Position in the report; stable within one shaping call only
    pub key: usize,
    pub name: String,
    pub inferred_type: FeatureType,
    pub data_type: Option<String>,
    /// Fraction of rows with no value, 0.0..=1.0
    pub missing_ratio: Option<f64>,
    pub distinct_count: Option<u64>,
    pub extension: Option<Value>,
    pub series: FeatureSeries,
}

impl FeatureColumn {
    pub fn histogram(&self) -> Option<&[HistogramBin]> {
        match &self.series {
            FeatureSeries::Histogram { bins } => Some(bins),
            _ => None,
        }
    }

    pub fn datetime(&self) -> Option<&DatetimeSeries> {
        match &self.series {
            FeatureSeries::Datetime(series) => Some(series),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileReport {
    pub continuous_count: u64,
    pub categorical_count: u64,
    pub datetime_count: u64,
    pub text_count: u64,
    pub columns: Vec<FeatureColumn>,
    pub row_count: u64,
    pub source_file_path: String,
    pub dataset_display_name: String,
}

/// Shape a raw feature profile.
///
/// Fails with [`DataProbeError::ProfileShape`] when a continuous or datetime
/// column's extension is missing, undecodable, or has a bucket array whose
/// length differs from its label vocabulary.
pub fn shape_profile(raw: &ProfileReportRaw) -> Result<ProfileReport> {
    let columns = raw
        .features
        .iter()
        .enumerate()
        .map(|(key, feature)| shape_feature(key, feature))
        .collect::<Result<Vec<_>>>()?;

    Ok(ProfileReport {
        continuous_count: raw.feature_summary.continuous,
        categorical_count: raw.feature_summary.categorical,
        datetime_count: raw.feature_summary.datetime,
        text_count: raw.feature_summary.text,
        columns,
        row_count: raw.n_rows,
        source_file_path: raw.file_path.clone(),
        dataset_display_name: raw.name.clone(),
    })
}

fn shape_feature(key: usize, feature: &RawFeature) -> Result<FeatureColumn> {
    let series = match feature.inferred_type {
        FeatureType::Continuous => {
            let ext: ContinuousExtension = decode_extension(feature)?;
            FeatureSeries::Histogram {
                bins: ext
                    .bins
                    .iter()
                    .map(|bin| HistogramBin {
                        range: [bin.begin, bin.end],
                        count: bin.value,
                    })
                    .collect(),
            }
        }
        FeatureType::Datetime => {
            let ext: DatetimeExtension = decode_extension(feature)?;
            FeatureSeries::Datetime(datetime_series(&feature.name, ext)?)
        }
        _ => FeatureSeries::None,
    };

    Ok(FeatureColumn {
        key,
        name: feature.name.clone(),
        inferred_type: feature.inferred_type,
        data_type: feature.data_type.clone(),
        missing_ratio: feature.missing.map(|m| m.percentage / 100.0),
        distinct_count: feature.unique.map(|u| u.value),
        extension: feature.extension.clone(),
        series,
    })
}

fn decode_extension<T: serde::de::DeserializeOwned>(feature: &RawFeature) -> Result<T> {
    let ext = feature.extension.as_ref().ok_or_else(|| {
        DataProbeError::ProfileShape(format!("column '{}' has no extension", feature.name))
    })?;
    T::deserialize(ext).map_err(|e| {
        DataProbeError::ProfileShape(format!(
            "column '{}' has an invalid extension: {}",
            feature.name, e
        ))
    })
}

fn datetime_series(column: &str, ext: DatetimeExtension) -> Result<DatetimeSeries> {
    let year = ext
        .by_year
        .into_iter()
        .map(|bucket| LabeledValue {
            label: year_label(&bucket.year),
            value: bucket.value,
        })
        .collect();

    Ok(DatetimeSeries {
        hour: zip_labels(column, "by_hour", &HOUR_LABELS, &ext.by_hour)?,
        week: zip_labels(column, "by_week", &WEEK_LABELS, &ext.by_week)?,
        month: zip_labels(column, "by_month", &MONTH_LABELS, &ext.by_month)?,
        year,
    })
}

fn zip_labels(column: &str, field: &str, labels: &[&str], values: &[u64]) -> Result<Vec<LabeledValue>> {
    if labels.len() != values.len() {
        return Err(DataProbeError::ProfileShape(format!(
            "column '{}' {} has {} buckets, expected {}",
            column,
            field,
            values.len(),
            labels.len()
        )));
    }
    Ok(labels
        .iter()
        .zip(values)
        .map(|(label, value)| LabeledValue {
            label: (*label).to_string(),
            value: *value,
        })
        .collect())
}

fn year_label(year: &Value) -> String {
    match year {
        Value::String(s) => s.clone(),
        // 2019.0 renders as "2019"
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
