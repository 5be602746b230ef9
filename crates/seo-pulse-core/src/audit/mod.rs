use std::{collections::BTreeMap, fmt};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod assembler;
pub mod differ;
pub mod file_repository;
pub mod import;
pub mod scoring;
pub mod taxonomy;

/// Finding category: defect, advisory, or growth opportunity.
///
/// Labels outside the known set are kept verbatim so scoring can fall back
/// to its default weights instead of rejecting the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum IssueType {
    Issue,
    Warning,
    Opportunity,
    Unknown(String),
}

impl IssueType {
    pub fn label(&self) -> &str {
        match self {
            Self::Issue => "Issue",
            Self::Warning => "Warning",
            Self::Opportunity => "Opportunity",
            Self::Unknown(label) => label,
        }
    }
}

impl Default for IssueType {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<Option<String>> for IssueType {
    fn from(raw: Option<String>) -> Self {
        let raw = raw.unwrap_or_default();
        match raw.as_str() {
            "Issue" => Self::Issue,
            "Warning" => Self::Warning,
            "Opportunity" => Self::Opportunity,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for IssueType {
    fn from(raw: &str) -> Self {
        Self::from(Some(raw.to_string()))
    }
}

impl From<IssueType> for String {
    fn from(value: IssueType) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Severity attached to a finding by the audit tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Priority {
    High,
    Medium,
    Low,
    Unknown(String),
}

impl Priority {
    pub fn label(&self) -> &str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Unknown(label) => label,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<Option<String>> for Priority {
    fn from(raw: Option<String>) -> Self {
        let raw = raw.unwrap_or_default();
        match raw.as_str() {
            "High" => Self::High,
            "Medium" => Self::Medium,
            "Low" => Self::Low,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for Priority {
    fn from(raw: &str) -> Self {
        Self::from(Some(raw.to_string()))
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One categorized audit finding within a report.
///
/// Field names follow the stored snapshot documents (`issueName`, `urls`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Identity key across reports and the taxonomy matching key.
    #[serde(rename = "issueName", alias = "name", default)]
    pub name: String,
    #[serde(rename = "issueType", alias = "type", default)]
    pub issue_type: IssueType,
    #[serde(rename = "issuePriority", alias = "priority", default)]
    pub priority: Priority,
    /// Number of affected URLs, coerced from free-form export text.
    #[serde(
        rename = "urls",
        alias = "urlCount",
        default,
        deserialize_with = "deserialize_url_count"
    )]
    pub url_count: u64,
    #[serde(
        rename = "percentageOfTotal",
        alias = "percentOfTotal",
        default,
        deserialize_with = "deserialize_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub percent_of_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "howToFix", default, skip_serializing_if = "Option::is_none")]
    pub how_to_fix: Option<String>,
}

impl Issue {
    pub fn new(
        name: impl Into<String>,
        issue_type: impl Into<IssueType>,
        priority: impl Into<Priority>,
        url_count: u64,
    ) -> Self {
        Self {
            name: name.into(),
            issue_type: issue_type.into(),
            priority: priority.into(),
            url_count,
            percent_of_total: None,
            description: None,
            how_to_fix: None,
        }
    }
}

/// Strip every non-digit character and parse what remains, defaulting to zero.
///
/// `"1,204 URLs"` becomes `1204`; empty or overflowing input becomes `0`.
pub fn parse_url_count(raw: &str) -> u64 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Unsigned(u64),
    Float(f64),
    Text(String),
}

fn deserialize_url_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawCount> = Option::deserialize(deserializer).unwrap_or(None);
    Ok(match raw {
        Some(RawCount::Unsigned(value)) => value,
        Some(RawCount::Float(value)) if value.is_finite() && value > 0.0 => value.trunc() as u64,
        Some(RawCount::Float(_)) => 0,
        Some(RawCount::Text(text)) => parse_url_count(&text),
        None => 0,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPercent {
    Number(f64),
    Text(String),
}

fn deserialize_percent<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawPercent> = Option::deserialize(deserializer).unwrap_or(None);
    Ok(match raw {
        Some(RawPercent::Number(value)) if value.is_finite() => Some(value),
        Some(RawPercent::Text(text)) => parse_percent(&text),
        _ => None,
    })
}

/// Parse a share such as `"12.5%"` or `"12.5"`; anything else is absent.
pub(crate) fn parse_percent(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// One full audit snapshot for a domain at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Opaque tenant identifier; only the storage adapter looks at it.
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "domain_name", alias = "domain")]
    pub domain: String,
    #[serde(rename = "scan_date", alias = "scanDate")]
    pub scan_date: DateTime<Utc>,
    #[serde(rename = "all_issues", alias = "issues", default)]
    pub issues: Vec<Issue>,
}

impl Report {
    pub fn new(domain: impl Into<String>, scan_date: DateTime<Utc>, issues: Vec<Issue>) -> Self {
        Self {
            client_id: None,
            domain: domain.into(),
            scan_date,
            issues,
        }
    }

    pub fn metadata(&self) -> ReportMetadata {
        ReportMetadata::from_issues(&self.issues)
    }
}

/// Totals derived from a report's issue list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub total_issues: u64,
    pub total_urls: u64,
    /// Affected-URL sums keyed by issue type label.
    pub urls_by_issue_type: BTreeMap<String, u64>,
}

impl ReportMetadata {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut urls_by_issue_type = BTreeMap::new();
        let mut total_urls = 0u64;
        for issue in issues {
            total_urls = total_urls.saturating_add(issue.url_count);
            let bucket = urls_by_issue_type
                .entry(issue.issue_type.label().to_string())
                .or_insert(0u64);
            *bucket = bucket.saturating_add(issue.url_count);
        }
        Self {
            total_issues: issues.len() as u64,
            total_urls,
            urls_by_issue_type,
        }
    }

    pub fn urls_for(&self, issue_type: &IssueType) -> u64 {
        self.urls_by_issue_type
            .get(issue_type.label())
            .copied()
            .unwrap_or(0)
    }
}

/// Description and remediation text keyed by issue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTemplate {
    #[serde(rename = "issueName")]
    pub issue_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "howToFix", default)]
    pub how_to_fix: Option<String>,
}

/// Direction of change for a single issue or an aggregate metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    New,
    Improved,
    Worse,
    Unchanged,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Improved => "improved",
            Self::Worse => "worse",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failures surfaced to callers of the audit pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditError {
    #[error("no reports found for domain `{domain}`")]
    NoReports { domain: String },
    #[error("not enough reports for comparison (found {reports_found})")]
    InsufficientHistory { reports_found: usize },
    #[error("failed to load reports: {message}")]
    Storage { message: String },
}

impl AuditError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::Storage {
            message: format!("{err:#}"),
        }
    }
}

/// Read-only access to stored report snapshots, so files, databases or
/// in-memory fixtures can back the pipeline interchangeably.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// All reports for `domain`, optionally restricted to one tenant. Order is unspecified.
    async fn load_reports(&self, client_id: Option<&str>, domain: &str) -> AnyResult<Vec<Report>>;

    /// Distinct domains with at least one stored report, sorted.
    async fn list_domains(&self, client_id: Option<&str>) -> AnyResult<Vec<String>>;

    /// Issue templates used to attach descriptions and fix instructions.
    async fn load_templates(&self) -> AnyResult<Vec<IssueTemplate>>;
}
