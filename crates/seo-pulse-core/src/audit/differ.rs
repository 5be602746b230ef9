use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::{AuditError, Issue, IssueType, Priority, Report, ReportMetadata, Trend};

const MILLIS_PER_DAY: i64 = 86_400_000;
/// Sentinel percentage for issues with no usable baseline.
const NO_BASELINE_PERCENT: &str = "100";

/// URL count, type and priority of an issue in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub urls: u64,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub priority: Priority,
}

impl From<&Issue> for IssueSnapshot {
    fn from(issue: &Issue) -> Self {
        Self {
            urls: issue.url_count,
            issue_type: issue.issue_type.clone(),
            priority: issue.priority.clone(),
        }
    }
}

/// Change of a single current issue relative to the previous report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueChange {
    pub issue_name: String,
    pub current: IssueSnapshot,
    pub previous: Option<IssueSnapshot>,
    pub change: i64,
    pub percentage_change: String,
    pub trend: Trend,
}

/// Current/previous values of an aggregate metric.
///
/// The trend of an aggregate always treats a lower value as an improvement,
/// including the opportunity bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    pub current: u64,
    pub previous: u64,
    pub change: i64,
    pub percentage_change: String,
    pub trend: Trend,
}

impl MetricDelta {
    pub fn new(current: u64, previous: u64) -> Self {
        let change = signed_delta(current, previous);
        Self {
            current,
            previous,
            change,
            percentage_change: format_percent(change, previous.max(1)),
            trend: if current < previous {
                Trend::Improved
            } else {
                Trend::Worse
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMetrics {
    #[serde(rename = "Issue")]
    pub issue: MetricDelta,
    #[serde(rename = "Warning")]
    pub warning: MetricDelta,
    #[serde(rename = "Opportunity")]
    pub opportunity: MetricDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetrics {
    pub total_issues: MetricDelta,
    pub total_urls: MetricDelta,
    pub by_type: TypeMetrics,
}

impl ComparisonMetrics {
    fn between(current: &ReportMetadata, previous: &ReportMetadata) -> Self {
        let bucket = |issue_type: IssueType| {
            MetricDelta::new(current.urls_for(&issue_type), previous.urls_for(&issue_type))
        };
        Self {
            total_issues: MetricDelta::new(current.total_issues, previous.total_issues),
            total_urls: MetricDelta::new(current.total_urls, previous.total_urls),
            by_type: TypeMetrics {
                issue: bucket(IssueType::Issue),
                warning: bucket(IssueType::Warning),
                opportunity: bucket(IssueType::Opportunity),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDates {
    pub current: DateTime<Utc>,
    pub previous: DateTime<Utc>,
    /// Whole days elapsed, rounded down.
    pub days_between: i64,
}

/// Number of per-issue entries in each trend, plus issues that disappeared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub improved: usize,
    pub worse: usize,
    pub unchanged: usize,
    pub new: usize,
    pub resolved: usize,
}

impl TrendSummary {
    fn record(&mut self, trend: Trend) {
        match trend {
            Trend::Improved => self.improved += 1,
            Trend::Worse => self.worse += 1,
            Trend::Unchanged => self.unchanged += 1,
            Trend::New => self.new += 1,
        }
    }
}

/// Structured diff between the current and previous report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub dates: ComparisonDates,
    pub metrics: ComparisonMetrics,
    /// One entry per current issue, in the current report's order.
    pub issue_changes: Vec<IssueChange>,
    pub summary: TrendSummary,
}

impl ComparisonResult {
    pub fn change_for(&self, issue_name: &str) -> Option<&IssueChange> {
        self.issue_changes
            .iter()
            .find(|change| change.issue_name == issue_name)
    }
}

fn signed_delta(current: u64, previous: u64) -> i64 {
    let delta = i128::from(current) - i128::from(previous);
    delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// One decimal place, rounding halves away from zero (`6.25` becomes `6.3`).
fn format_percent(change: i64, base: u64) -> String {
    let percent = change as f64 / base as f64 * 100.0;
    format!("{:.1}", (percent * 10.0).round() / 10.0)
}

/// Whether a non-zero change is good news for an issue of this type:
/// opportunities improve by growing, everything else by shrinking.
fn is_improvement(issue_type: &IssueType, change: i64) -> bool {
    match issue_type {
        IssueType::Opportunity => change > 0,
        _ => change < 0,
    }
}

fn compare_issue(current: &Issue, previous: Option<&Issue>) -> IssueChange {
    let Some(previous) = previous else {
        return IssueChange {
            issue_name: current.name.clone(),
            current: IssueSnapshot::from(current),
            previous: None,
            change: signed_delta(current.url_count, 0),
            percentage_change: NO_BASELINE_PERCENT.to_string(),
            trend: Trend::New,
        };
    };

    let change = signed_delta(current.url_count, previous.url_count);
    let percentage_change = if previous.url_count != 0 {
        format_percent(change, previous.url_count)
    } else {
        NO_BASELINE_PERCENT.to_string()
    };
    let trend = if change == 0 {
        Trend::Unchanged
    } else if is_improvement(&current.issue_type, change) {
        Trend::Improved
    } else {
        Trend::Worse
    };

    IssueChange {
        issue_name: current.name.clone(),
        current: IssueSnapshot::from(current),
        previous: Some(IssueSnapshot::from(previous)),
        change,
        percentage_change,
        trend,
    }
}

/// Diff two reports already ordered as current and previous.
///
/// Issues are matched by name. Current issues missing from `previous` are
/// `new`; previous issues missing from `current` are only counted as resolved.
#[instrument(
    name = "diff_reports",
    skip_all,
    fields(
        current_issues = current.issues.len(),
        previous_issues = previous.issues.len()
    )
)]
pub fn diff(current: &Report, previous: &Report) -> ComparisonResult {
    let mut previous_by_name: HashMap<&str, &Issue> = HashMap::new();
    for issue in &previous.issues {
        previous_by_name.entry(issue.name.as_str()).or_insert(issue);
    }

    let mut summary = TrendSummary::default();
    let issue_changes: Vec<IssueChange> = current
        .issues
        .iter()
        .map(|issue| {
            let previous = previous_by_name.get(issue.name.as_str()).copied();
            let change = compare_issue(issue, previous);
            trace!(
                issue = %change.issue_name,
                change = change.change,
                trend = %change.trend,
                "reconciled issue"
            );
            summary.record(change.trend);
            change
        })
        .collect();

    let current_names: HashSet<&str> = current.issues.iter().map(|i| i.name.as_str()).collect();
    summary.resolved = previous
        .issues
        .iter()
        .filter(|issue| !current_names.contains(issue.name.as_str()))
        .count();

    let elapsed = current.scan_date - previous.scan_date;
    let dates = ComparisonDates {
        current: current.scan_date,
        previous: previous.scan_date,
        days_between: elapsed.num_milliseconds().div_euclid(MILLIS_PER_DAY),
    };

    debug!(
        improved = summary.improved,
        worse = summary.worse,
        new = summary.new,
        resolved = summary.resolved,
        "comparison computed"
    );

    ComparisonResult {
        dates,
        metrics: ComparisonMetrics::between(&current.metadata(), &previous.metadata()),
        issue_changes,
        summary,
    }
}

/// Order a report history newest first; equal scan dates keep their input order.
pub fn order_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.scan_date.cmp(&a.scan_date));
}

/// Compare the two most recent reports of a history.
///
/// Fails with [`AuditError::InsufficientHistory`] when fewer than two reports
/// are available instead of diffing against an empty baseline.
pub fn compare_latest(mut reports: Vec<Report>) -> Result<ComparisonResult, AuditError> {
    if reports.len() < 2 {
        return Err(AuditError::InsufficientHistory {
            reports_found: reports.len(),
        });
    }
    order_newest_first(&mut reports);
    Ok(diff(&reports[0], &reports[1]))
}
