//! Scan report rendering

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use colored::Colorize;
use eyre::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{TaskResult, TaskStatus};
use crate::engine::Mode;

/// Result counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub timeout: usize,
}

impl Summary {
    pub fn from_results(results: &[TaskResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            summary.total += 1;
            match result.status() {
                TaskStatus::Success => summary.success += 1,
                TaskStatus::Error => summary.error += 1,
                TaskStatus::Timeout => summary.timeout += 1,
            }
            summary
        })
    }
}

/// Everything one `scan` produced
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub target: String,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<TaskResult>,
}

impl ScanReport {
    /// Build a report; results are sorted by priority, then label
    pub fn new(
        target: impl Into<String>,
        mode: Mode,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        mut results: Vec<TaskResult>,
    ) -> Self {
        results.sort_by(|a, b| (a.priority, &a.label).cmp(&(b.priority, &b.label)));
        Self {
            run_id: Uuid::now_v7(),
            target: target.into(),
            mode,
            started_at,
            finished_at,
            summary: Summary::from_results(&results),
            results,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to `<base>/<target>/scan/scan_<started>.json`
    pub fn save(&self, base_dir: &Path) -> Result<PathBuf> {
        let dir = base_dir.join(path_safe(&self.target)).join("scan");
        fs::create_dir_all(&dir).context(format!("Failed to create output directory {}", dir.display()))?;

        let path = dir.join(format!("scan_{}.json", self.started_at.format("%Y%m%d_%H%M%S")));
        fs::write(&path, self.to_json()?).context(format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "ScanReport::save: report written");
        Ok(path)
    }

    /// One line per result, then the summary
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Scan of {} ({} mode, {} ms)\n",
            self.target.bold(),
            self.mode,
            (self.finished_at - self.started_at).num_milliseconds()
        );

        for result in &self.results {
            let status = match result.status() {
                TaskStatus::Success => "success".green(),
                TaskStatus::Error => "error".red(),
                TaskStatus::Timeout => "timeout".yellow(),
            };
            let detail = match (result.outcome.result(), result.outcome.error()) {
                (Some(value), _) => describe(value),
                (None, Some(error)) => error.to_string(),
                (None, None) => String::new(),
            };
            out.push_str(&format!(
                "  [{}] {:<12} {:<8} {}\n",
                result.priority, result.label, status, detail
            ));
        }

        out.push_str(&format!(
            "{} total, {} success, {} error, {} timeout\n",
            self.summary.total,
            self.summary.success.to_string().green(),
            self.summary.error.to_string().red(),
            self.summary.timeout.to_string().yellow()
        ));
        out
    }
}

/// Target name usable as a single path component
fn path_safe(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Short human form of a probe's output
fn describe(value: &serde_json::Value) -> String {
    if let Some(open) = value.get("open").and_then(|v| v.as_bool()) {
        let service = value.get("service").and_then(|v| v.as_str()).unwrap_or("unknown");
        let state = if open { "open".green() } else { "closed".dimmed() };
        return format!("{} ({})", state, service);
    }
    if let Some(addresses) = value.get("addresses").and_then(|v| v.as_array()) {
        let list: Vec<&str> = addresses.iter().filter_map(|a| a.as_str()).collect();
        return list.join(", ");
    }
    value.to_string()
}
