use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Collision severity, stored in the warehouse as its canonical label.
///
/// The DfT export encodes severity as 1 (fatal), 2 (serious), 3 (slight);
/// both the numeric codes and the labels are accepted during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Severity {
    Fatal,
    Serious,
    Slight,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "Fatal",
            Self::Serious => "Serious",
            Self::Slight => "Slight",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" => Some(Self::Fatal),
            "2" => Some(Self::Serious),
            "3" => Some(Self::Slight),
            other => match other.to_ascii_lowercase().as_str() {
                "fatal" => Some(Self::Fatal),
                "serious" => Some(Self::Serious),
                "slight" => Some(Self::Slight),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CSV record as it arrives from the DfT export, before any coercion.
///
/// Every field is optional so that a missing column or empty cell surfaces
/// during normalization rather than as a deserialization failure.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawCollisionRow {
    #[serde(default)]
    pub accident_index: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub accident_severity: Option<String>,
    #[serde(default)]
    pub number_of_casualties: Option<String>,
    #[serde(default)]
    pub number_of_vehicles: Option<String>,
    #[serde(default)]
    pub road_type: Option<String>,
    #[serde(default)]
    pub speed_limit: Option<String>,
    #[serde(default)]
    pub weather_conditions: Option<String>,
    #[serde(default)]
    pub light_conditions: Option<String>,
    #[serde(default)]
    pub urban_or_rural_area: Option<String>,
}

/// Why a raw row was rejected during normalization.
#[derive(Debug, PartialEq, Eq)]
pub enum RowError {
    Missing(&'static str),
    Invalid { field: &'static str, value: String },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "missing required field `{field}`"),
            Self::Invalid { field, value } => {
                write!(f, "invalid value `{value}` for field `{field}`")
            }
        }
    }
}

impl RawCollisionRow {
    /// Coerces the raw text fields into a typed record.
    ///
    /// Identifier, date, severity, casualties and vehicles are required;
    /// failing any of them rejects the row. Optional fields fall back to
    /// `None` when absent or unparseable, and coordinates outside the valid
    /// latitude/longitude ranges are dropped rather than stored.
    pub fn normalize(&self) -> Result<CollisionRecord, RowError> {
        let accident_index = clean(&self.accident_index)
            .ok_or(RowError::Missing("accident_index"))?
            .to_string();

        let date_raw = clean(&self.date).ok_or(RowError::Missing("date"))?;
        let date = parse_date(date_raw).ok_or_else(|| invalid("date", date_raw))?;

        let severity_raw =
            clean(&self.accident_severity).ok_or(RowError::Missing("accident_severity"))?;
        let severity = Severity::parse(severity_raw)
            .ok_or_else(|| invalid("accident_severity", severity_raw))?;

        let casualties = parse_count(&self.number_of_casualties, "number_of_casualties")?;
        let vehicles = parse_count(&self.number_of_vehicles, "number_of_vehicles")?;

        let raw_json = serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"));

        Ok(CollisionRecord {
            accident_index,
            year: date.year(),
            date,
            time: clean(&self.time).and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok()),
            latitude: parse_coordinate(&self.latitude, 90.0),
            longitude: parse_coordinate(&self.longitude, 180.0),
            severity,
            casualties,
            vehicles,
            road_type: clean(&self.road_type).map(str::to_string),
            speed_limit: clean(&self.speed_limit).and_then(|v| v.parse().ok()),
            weather: clean(&self.weather_conditions).map(str::to_string),
            light_conditions: clean(&self.light_conditions).map(str::to_string),
            urban_or_rural: clean(&self.urban_or_rural_area).map(str::to_string),
            raw_json,
        })
    }
}

fn clean(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(field: &'static str, value: &str) -> RowError {
    RowError::Invalid {
        field,
        value: value.to_string(),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // DfT publishes DD/MM/YYYY; accept ISO dates as well.
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn parse_count(value: &Option<String>, field: &'static str) -> Result<i16, RowError> {
    let raw = clean(value).ok_or(RowError::Missing(field))?;
    raw.parse::<i16>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| invalid(field, raw))
}

fn parse_coordinate(value: &Option<String>, bound: f64) -> Option<f64> {
    clean(value)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.abs() <= bound)
}

/// One parsed, validated collision, ready for insertion.
#[derive(Debug, Clone)]
pub struct CollisionRecord {
    pub accident_index: String,
    pub date: NaiveDate,
    pub year: i32,
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub severity: Severity,
    pub casualties: i16,
    pub vehicles: i16,
    pub road_type: Option<String>,
    pub speed_limit: Option<i16>,
    pub weather: Option<String>,
    pub light_conditions: Option<String>,
    pub urban_or_rural: Option<String>,
    pub raw_json: String,
}

/// The three headline numbers shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Kpis {
    pub total: i64,
    pub avg_casualties: f64,
    pub avg_vehicles: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyCount {
    pub month: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadTypeCount {
    pub road_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Severity,
}

/// Everything the presentation layer needs for one filter combination.
/// Recomputed on every call; nothing here is persisted.
#[derive(Debug, Clone, Default)]
pub struct AggregateView {
    pub kpis: Kpis,
    pub monthly: Vec<MonthlyCount>,
    pub road_types: Vec<RoadTypeCount>,
    pub points: Vec<MapPoint>,
}

/// Per-file ingestion bookkeeping.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub rows_loaded: u64,
    pub rows_skipped: u64,
    pub rows_deduped: u64,
}

impl FileReport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            rows_loaded: 0,
            rows_skipped: 0,
            rows_deduped: 0,
        }
    }
}

/// Whole-run ingestion bookkeeping, reported once after all files finish.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub files_attempted: usize,
    pub files_missing: usize,
    pub reports: Vec<FileReport>,
}

impl LoadSummary {
    pub fn rows_loaded(&self) -> u64 {
        self.reports.iter().map(|r| r.rows_loaded).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.reports.iter().map(|r| r.rows_skipped).sum()
    }

    pub fn rows_deduped(&self) -> u64 {
        self.reports.iter().map(|r| r.rows_deduped).sum()
    }
}

/// How a load request resolved.
#[derive(Debug)]
pub enum LoadOutcome {
    Completed(LoadSummary),
    /// The table already held rows, so the run was skipped wholesale.
    AlreadyLoaded,
    /// Another loader holds the advisory lock.
    LoadInProgress,
}
