use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{IssueTemplate, Report, ReportRepository};

const TEMPLATES_FILE: &str = "templates.json";

/// Loads report snapshots from `*.json` documents under a base directory.
///
/// Each document holds either one report or an array of reports. An optional
/// `templates.json` in the same directory supplies issue templates.
pub struct FileReportRepository {
    base_path: PathBuf,
    reports: OnceCell<Vec<Report>>,
    templates: OnceCell<Vec<IssueTemplate>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotDocument {
    Many(Vec<Report>),
    One(Box<Report>),
}

impl FileReportRepository {
    /// Create a repository rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            reports: OnceCell::new(),
            templates: OnceCell::new(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn templates_path(&self) -> PathBuf {
        self.base_path.join(TEMPLATES_FILE)
    }

    fn snapshot_paths(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.base_path).with_context(|| {
            format!(
                "failed to read report directory {}",
                self.base_path.display()
            )
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list {}", self.base_path.display()))?
                .path();
            let is_snapshot = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != TEMPLATES_FILE);
            if is_snapshot && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn load_snapshot(path: &Path) -> Result<Vec<Report>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read report snapshot at {}", path.display()))?;
        let document: SnapshotDocument = serde_json::from_str(&raw).with_context(|| {
            format!("invalid report snapshot structure in {}", path.display())
        })?;
        Ok(match document {
            SnapshotDocument::Many(reports) => reports,
            SnapshotDocument::One(report) => vec![*report],
        })
    }

    fn all_reports(&self) -> Result<&[Report]> {
        let reports = self.reports.get_or_try_init(|| {
            let mut reports = Vec::new();
            for path in self.snapshot_paths()? {
                let loaded = Self::load_snapshot(&path)?;
                if loaded.is_empty() {
                    warn!(path = %path.display(), "report snapshot contains no reports");
                }
                reports.extend(loaded);
            }
            debug!(
                count = reports.len(),
                base = %self.base_path.display(),
                "loaded report snapshots"
            );
            Ok::<_, anyhow::Error>(reports)
        })?;
        Ok(reports)
    }

    fn tenant_reports<'a>(
        &'a self,
        client_id: Option<&'a str>,
    ) -> Result<impl Iterator<Item = &'a Report> + 'a> {
        Ok(self.all_reports()?.iter().filter(move |report| match client_id {
            Some(id) => report.client_id.as_deref() == Some(id),
            None => true,
        }))
    }
}

#[async_trait::async_trait]
impl ReportRepository for FileReportRepository {
    async fn load_reports(&self, client_id: Option<&str>, domain: &str) -> Result<Vec<Report>> {
        Ok(self
            .tenant_reports(client_id)?
            .filter(|report| report.domain == domain)
            .cloned()
            .collect())
    }

    async fn list_domains(&self, client_id: Option<&str>) -> Result<Vec<String>> {
        let domains: BTreeSet<&str> = self
            .tenant_reports(client_id)?
            .map(|report| report.domain.as_str())
            .collect();
        Ok(domains.into_iter().map(str::to_string).collect())
    }

    async fn load_templates(&self) -> Result<Vec<IssueTemplate>> {
        let templates = self.templates.get_or_try_init(|| {
            let path = self.templates_path();
            if !path.exists() {
                return Ok(Vec::new());
            }
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read issue templates at {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| {
                format!("invalid JSON structure in issue templates at {}", path.display())
            })
        })?;
        Ok(templates.clone())
    }
}
