//! Scheduler run log: one row per significant scheduler event.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle event recorded in the `job_run_log` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The scheduler was started.
    Started,
    /// A monitoring cycle finished (possibly with skipped batches).
    CycleCompleted,
    /// A monitoring cycle hit an unexpected error.
    CycleError,
    /// The scheduler was stopped.
    Stopped,
}

impl JobStatus {
    /// Returns the status as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::CycleCompleted => "cycle_completed",
            Self::CycleError => "cycle_error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "cycle_completed" => Ok(Self::CycleCompleted),
            "cycle_error" => Ok(Self::CycleError),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Aggregates attached to a [`JobRun`]. Fields irrelevant to a status stay
/// at their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobRunMetadata {
    /// Wall-clock duration of the cycle in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Configurations that had pricing data and went through alert evaluation.
    #[serde(default)]
    pub processed: u64,
    /// Alerts raised during the cycle.
    #[serde(default)]
    pub alerts: u64,
    /// Batches the cycle was split into.
    #[serde(default)]
    pub batches: u64,
    /// Batches skipped because pricing stayed unavailable or the batch failed.
    #[serde(default)]
    pub skipped_batches: u64,
    /// Per-ASIN evaluation failures.
    #[serde(default)]
    pub failed_items: u64,
    /// Error description for `cycle_error` rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Interval the scheduler runs at, recorded on `started`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
}

/// Append-only scheduler log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobRun {
    /// Row identifier.
    #[schema(value_type = String, format = Uuid)]
    pub id: uuid::Uuid,
    /// Event being recorded.
    pub status: JobStatus,
    /// Aggregates for the event.
    pub metadata: JobRunMetadata,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl JobRun {
    /// Creates a new row stamped with the current time.
    #[must_use]
    pub fn new(status: JobStatus, metadata: JobRunMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            status,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate counts over a window of [`JobRun`] rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct JobStatistics {
    /// Window length in days.
    pub days: u32,
    /// Completed plus failed cycles.
    pub total_cycles: u64,
    /// Cycles that completed.
    pub completed_cycles: u64,
    /// Cycles that ended in `cycle_error`.
    pub error_cycles: u64,
    /// Configurations processed across completed cycles.
    pub total_processed: u64,
    /// Alerts raised across completed cycles.
    pub total_alerts: u64,
    /// Skipped batches across completed cycles.
    pub skipped_batches: u64,
    /// Mean duration of completed cycles in milliseconds.
    pub average_duration_ms: u64,
    /// Timestamp of the most recent cycle in the window.
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl JobStatistics {
    /// Folds the rows of a `days`-long window into aggregate counts.
    #[must_use]
    pub fn from_runs(days: u32, runs: &[JobRun]) -> Self {
        let mut stats = Self {
            days,
            ..Self::default()
        };
        let mut total_duration: u64 = 0;

        for run in runs {
            match run.status {
                JobStatus::CycleCompleted => {
                    stats.completed_cycles += 1;
                    stats.total_processed += run.metadata.processed;
                    stats.total_alerts += run.metadata.alerts;
                    stats.skipped_batches += run.metadata.skipped_batches;
                    total_duration = total_duration.saturating_add(run.metadata.duration_ms);
                }
                JobStatus::CycleError => stats.error_cycles += 1,
                JobStatus::Started | JobStatus::Stopped => continue,
            }
            if stats.last_cycle_at.is_none_or(|t| run.created_at > t) {
                stats.last_cycle_at = Some(run.created_at);
            }
        }

        stats.total_cycles = stats.completed_cycles + stats.error_cycles;
        if stats.completed_cycles > 0 {
            stats.average_duration_ms = total_duration / stats.completed_cycles;
        }
        stats
    }
}
