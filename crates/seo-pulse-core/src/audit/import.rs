use std::{
    fs::{self, OpenOptions},
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_percent, parse_url_count, Issue, IssueType, Priority, Report, ReportMetadata};

/// One row of a crawler "issues overview" export. Columns the export adds
/// beyond these are ignored.
#[derive(Debug, Deserialize)]
struct OverviewRow {
    #[serde(rename = "Issue Name", default)]
    issue_name: Option<String>,
    #[serde(rename = "Issue Type", default)]
    issue_type: Option<String>,
    #[serde(rename = "Issue Priority", default)]
    issue_priority: Option<String>,
    #[serde(rename = "URLs", default)]
    urls: Option<String>,
    #[serde(rename = "% of Total", default)]
    percent_of_total: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "How To Fix", default)]
    how_to_fix: Option<String>,
}

impl OverviewRow {
    fn into_issue(self) -> Issue {
        Issue {
            name: clean(self.issue_name).unwrap_or_default(),
            issue_type: IssueType::from(clean(self.issue_type)),
            priority: Priority::from(clean(self.issue_priority)),
            url_count: clean(self.urls)
                .map(|urls| parse_url_count(&urls))
                .unwrap_or(0),
            percent_of_total: clean(self.percent_of_total).and_then(|raw| parse_percent(&raw)),
            description: clean(self.description),
            how_to_fix: clean(self.how_to_fix),
        }
    }
}

/// Trim a cell and drop one pair of surrounding quotes; blank cells are absent.
fn clean(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    let is_quote = |c: u8| c == b'"' || c == b'\'';
    let bytes = trimmed.as_bytes();
    let quoted = bytes.len() > 2 && is_quote(bytes[0]) && is_quote(bytes[bytes.len() - 1]);
    let unquoted = if quoted {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    };
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}

/// Parse an issues overview CSV export into issues, in file order.
pub fn read_issue_overview<R: Read>(reader: R) -> Result<Vec<Issue>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut issues = Vec::new();
    for (index, row) in csv_reader.deserialize::<OverviewRow>().enumerate() {
        // Line 1 is the header.
        let row = row.with_context(|| format!("invalid issues overview row {}", index + 2))?;
        issues.push(row.into_issue());
    }
    Ok(issues)
}

/// Guess a domain from an export file name: the segment after the last `_`
/// of the file stem (`issues_overview_report_shop.csv` gives `shop`).
pub fn domain_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('_')
        .next()
        .map(str::trim)
        .filter(|domain| !domain.is_empty())
        .map(str::to_string)
}

/// Totals stored beside an imported report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    #[serde(flatten)]
    pub totals: ReportMetadata,
    pub generated_at: NaiveDate,
}

/// A report in the document layout the file repository reads back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSnapshot {
    #[serde(flatten)]
    pub report: Report,
    pub metadata: SnapshotMetadata,
}

impl StoredSnapshot {
    pub fn new(report: Report) -> Self {
        let metadata = SnapshotMetadata {
            totals: report.metadata(),
            generated_at: report.scan_date.date_naive(),
        };
        Self { report, metadata }
    }

    /// Build a snapshot from an issues overview export.
    pub fn from_overview<R: Read>(
        reader: R,
        domain: impl Into<String>,
        client_id: Option<String>,
        scan_date: DateTime<Utc>,
    ) -> Result<Self> {
        let mut report = Report::new(domain, scan_date, read_issue_overview(reader)?);
        report.client_id = client_id;
        debug!(
            domain = %report.domain,
            issues = report.issues.len(),
            "parsed issues overview"
        );
        Ok(Self::new(report))
    }

    /// Default file name: `<domain>_<YYYY-MM-DD_HHMMSS>.json`, with characters
    /// unsafe in file names replaced by `-`.
    pub fn file_name(&self) -> String {
        let domain: String = self
            .report
            .domain
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!(
            "{domain}_{}.json",
            self.report.scan_date.format("%Y-%m-%d_%H%M%S")
        )
    }

    /// Write the snapshot as pretty JSON. Existing files are only replaced
    /// when `overwrite` is set.
    pub fn write_to(&self, path: &Path, overwrite: bool) -> Result<()> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options
            .open(path)
            .with_context(|| format!("failed to create report snapshot at {}", path.display()))?;
        let json = serde_json::to_string_pretty(self).context("failed to encode report snapshot")?;
        writeln!(file, "{json}")
            .with_context(|| format!("failed to write report snapshot at {}", path.display()))?;
        Ok(())
    }
}
