use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::{
    differ::{compare_latest, diff, order_newest_first, ComparisonResult},
    scoring::{risk_score, HealthBreakdown},
    taxonomy::{classify, group_issues, IssueDistribution, IssueGroup},
    AuditError, Issue, IssueTemplate, Report, ReportMetadata, ReportRepository,
};

/// Issue templates indexed by issue name.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    by_name: HashMap<String, IssueTemplate>,
}

impl TemplateCatalog {
    /// Index templates by name. Stored names and texts may carry stray
    /// surrounding double quotes, which are removed. The first template wins
    /// for duplicate names.
    pub fn new(templates: impl IntoIterator<Item = IssueTemplate>) -> Self {
        let mut by_name = HashMap::new();
        for template in templates {
            let template = IssueTemplate {
                issue_name: strip_quotes(&template.issue_name).to_string(),
                description: template.description.as_deref().map(strip_quotes).map(str::to_string),
                how_to_fix: template.how_to_fix.as_deref().map(strip_quotes).map(str::to_string),
            };
            by_name
                .entry(template.issue_name.clone())
                .or_insert(template);
        }
        Self { by_name }
    }

    pub fn get(&self, issue_name: &str) -> Option<&IssueTemplate> {
        self.by_name.get(issue_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn strip_quotes(raw: &str) -> &str {
    let raw = raw.strip_prefix('"').unwrap_or(raw);
    raw.strip_suffix('"').unwrap_or(raw)
}

/// An issue annotated with its taxonomy group and risk score.
///
/// Annotations live beside the issue's own fields; template text only fills
/// a description or fix instruction the issue does not already carry.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedIssue {
    #[serde(flatten)]
    pub issue: Issue,
    pub group: &'static str,
    pub score: f64,
}

impl EnrichedIssue {
    pub fn new(issue: &Issue, templates: &TemplateCatalog) -> Self {
        let mut issue = issue.clone();
        if let Some(template) = templates.get(&issue.name) {
            if issue.description.is_none() {
                issue.description = template.description.clone();
            }
            if issue.how_to_fix.is_none() {
                issue.how_to_fix = template.how_to_fix.clone();
            }
        }
        Self {
            group: classify(Some(&issue.name)),
            score: risk_score(&issue),
            issue,
        }
    }
}

/// Everything presentation layers need for one domain's latest report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub domain: String,
    pub scan_date: DateTime<Utc>,
    pub health_score: u8,
    pub health: HealthBreakdown,
    pub metadata: ReportMetadata,
    /// Current issues in report order.
    pub issues: Vec<EnrichedIssue>,
    /// Present when an earlier report exists; entries join to `issues` by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonResult>,
}

/// Combine a report history into a single response.
///
/// The newest report (by scan date, stable for ties) is enriched and scored;
/// the second newest, when present, becomes the comparison baseline.
pub fn assemble(
    mut reports: Vec<Report>,
    templates: &TemplateCatalog,
) -> Result<AuditResponse, AuditError> {
    order_newest_first(&mut reports);
    let mut history = reports.into_iter();
    let Some(current) = history.next() else {
        return Err(AuditError::NoReports {
            domain: String::new(),
        });
    };
    let comparison = history.next().map(|previous| diff(&current, &previous));

    let issues = current
        .issues
        .iter()
        .map(|issue| EnrichedIssue::new(issue, templates))
        .collect();
    let health = HealthBreakdown::from_issues(&current.issues);

    Ok(AuditResponse {
        metadata: current.metadata(),
        domain: current.domain,
        scan_date: current.scan_date,
        health_score: health.score,
        health,
        issues,
        comparison,
    })
}

/// Grouped view of the newest report in a history.
pub fn group_latest(mut reports: Vec<Report>) -> Option<Vec<IssueGroup>> {
    order_newest_first(&mut reports);
    reports.first().map(|report| group_issues(&report.issues))
}

/// Loads report histories from a repository and runs them through the pipeline.
pub struct AuditService<R: ReportRepository> {
    repo: Arc<R>,
}

impl<R: ReportRepository> AuditService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    async fn history(
        &self,
        client_id: Option<&str>,
        domain: &str,
    ) -> Result<Vec<Report>, AuditError> {
        let reports = self
            .repo
            .load_reports(client_id, domain)
            .await
            .map_err(AuditError::storage)?;
        if reports.is_empty() {
            return Err(AuditError::NoReports {
                domain: domain.to_string(),
            });
        }
        Ok(reports)
    }

    async fn templates(&self) -> TemplateCatalog {
        match self.repo.load_templates().await {
            Ok(templates) => TemplateCatalog::new(templates),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "issue templates unavailable");
                TemplateCatalog::default()
            }
        }
    }

    /// Enriched latest report with health score and, when possible, a comparison.
    #[instrument(name = "audit_summary", skip(self))]
    pub async fn summary(
        &self,
        client_id: Option<&str>,
        domain: &str,
    ) -> Result<AuditResponse, AuditError> {
        let reports = self.history(client_id, domain).await?;
        let templates = self.templates().await;
        let report_count = reports.len();
        let response = assemble(reports, &templates)?;
        debug!(
            reports = report_count,
            issues = response.issues.len(),
            health_score = response.health_score,
            compared = response.comparison.is_some(),
            "summary assembled"
        );
        Ok(response)
    }

    /// Comparison of the two most recent reports.
    #[instrument(name = "audit_compare", skip(self))]
    pub async fn compare(
        &self,
        client_id: Option<&str>,
        domain: &str,
    ) -> Result<ComparisonResult, AuditError> {
        let reports = self
            .repo
            .load_reports(client_id, domain)
            .await
            .map_err(AuditError::storage)?;
        compare_latest(reports)
    }

    /// Latest report bucketed into taxonomy groups.
    #[instrument(name = "audit_groups", skip(self))]
    pub async fn groups(
        &self,
        client_id: Option<&str>,
        domain: &str,
    ) -> Result<Vec<IssueGroup>, AuditError> {
        let reports = self.history(client_id, domain).await?;
        Ok(group_latest(reports).unwrap_or_default())
    }

    /// URLs per taxonomy group and issues per priority in the latest report.
    #[instrument(name = "audit_distribution", skip(self))]
    pub async fn distribution(
        &self,
        client_id: Option<&str>,
        domain: &str,
    ) -> Result<IssueDistribution, AuditError> {
        let mut reports = self.history(client_id, domain).await?;
        order_newest_first(&mut reports);
        Ok(reports
            .first()
            .map(|report| IssueDistribution::from_issues(&report.issues))
            .unwrap_or_default())
    }

    pub async fn domains(&self, client_id: Option<&str>) -> Result<Vec<String>, AuditError> {
        self.repo
            .list_domains(client_id)
            .await
            .map_err(AuditError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Trend;
    use anyhow::Result;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 30, 0).unwrap()
    }

    fn sample_history() -> Vec<Report> {
        vec![
            Report::new(
                "shop.example",
                at(1),
                vec![
                    Issue::new("Missing Meta Description", "Warning", "Medium", 40),
                    Issue::new("Broken Links", "Issue", "High", 12),
                ],
            ),
            Report::new(
                "shop.example",
                at(8),
                vec![
                    Issue::new("Broken Links", "Issue", "High", 3),
                    Issue::new("Images Missing Alt Text", "Issue", "Low", 9),
                ],
            ),
        ]
    }

    #[test]
    fn assembles_latest_report_with_comparison() {
        let response = assemble(sample_history(), &TemplateCatalog::default()).unwrap();
        assert_eq!(response.scan_date, at(8));
        assert_eq!(response.issues.len(), 2);
        assert_eq!(response.issues[0].group, "Links");
        assert_eq!(response.issues[1].group, "Images");
        let newest = &sample_history()[1];
        assert_eq!(
            response.health_score,
            crate::audit::scoring::health_score(&newest.issues)
        );

        let comparison = response.comparison.expect("two reports should compare");
        assert_eq!(comparison.summary.improved, 1);
        assert_eq!(comparison.summary.new, 1);
        assert_eq!(comparison.summary.resolved, 1);
        assert_eq!(comparison.dates.days_between, 7);
        assert_eq!(
            comparison.change_for("Broken Links").map(|c| c.trend),
            Some(Trend::Improved)
        );
    }

    #[test]
    fn single_report_has_no_comparison() {
        let mut history = sample_history();
        history.truncate(1);
        let response = assemble(history, &TemplateCatalog::default()).unwrap();
        assert!(response.comparison.is_none());
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("comparison").is_none());
    }

    #[test]
    fn empty_history_is_reported() {
        let err = assemble(Vec::new(), &TemplateCatalog::default()).unwrap_err();
        assert!(matches!(err, AuditError::NoReports { .. }));
    }

    #[test]
    fn templates_fill_only_missing_fields() {
        let catalog = TemplateCatalog::new(vec![IssueTemplate {
            issue_name: "\"Broken Links\"".into(),
            description: Some("\"Links that return 4xx\"".into()),
            how_to_fix: Some("Update or remove the link.".into()),
        }]);
        let mut issue = Issue::new("Broken Links", "Issue", "High", 3);
        issue.how_to_fix = Some("Ask the content team.".into());

        let enriched = EnrichedIssue::new(&issue, &catalog);
        assert_eq!(enriched.issue.description.as_deref(), Some("Links that return 4xx"));
        assert_eq!(enriched.issue.how_to_fix.as_deref(), Some("Ask the content team."));
        assert_eq!(enriched.issue.url_count, 3);
    }

    #[test]
    fn enriched_issue_serializes_flat() {
        let enriched = EnrichedIssue::new(
            &Issue::new("Missing H1", "Issue", "High", 99),
            &TemplateCatalog::default(),
        );
        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["issueName"], "Missing H1");
        assert_eq!(value["group"], "Headers");
        assert_eq!(value["score"], 4.0);
        assert!(value.get("description").is_none());
    }

    struct StaticRepo {
        reports: Vec<Report>,
        templates: Option<Vec<IssueTemplate>>,
    }

    #[async_trait::async_trait]
    impl ReportRepository for StaticRepo {
        async fn load_reports(&self, client_id: Option<&str>, domain: &str) -> Result<Vec<Report>> {
            Ok(self
                .reports
                .iter()
                .filter(|r| r.domain == domain)
                .filter(|r| client_id.map_or(true, |id| r.client_id.as_deref() == Some(id)))
                .cloned()
                .collect())
        }

        async fn list_domains(&self, _client_id: Option<&str>) -> Result<Vec<String>> {
            Ok(vec!["shop.example".into()])
        }

        async fn load_templates(&self) -> Result<Vec<IssueTemplate>> {
            self.templates
                .clone()
                .ok_or_else(|| anyhow::anyhow!("template store offline"))
        }
    }

    #[tokio::test]
    async fn service_survives_missing_templates() {
        let service = AuditService::new(Arc::new(StaticRepo {
            reports: sample_history(),
            templates: None,
        }));
        let response = service.summary(None, "shop.example").await.unwrap();
        assert!(response.issues.iter().all(|i| i.issue.description.is_none()));
    }

    #[tokio::test]
    async fn service_reports_unknown_domain() {
        let service = AuditService::new(Arc::new(StaticRepo {
            reports: sample_history(),
            templates: Some(Vec::new()),
        }));
        let err = service.summary(None, "other.example").await.unwrap_err();
        assert_eq!(
            err,
            AuditError::NoReports {
                domain: "other.example".into()
            }
        );
        let err = service.compare(None, "other.example").await.unwrap_err();
        assert_eq!(err, AuditError::InsufficientHistory { reports_found: 0 });
    }

    #[tokio::test]
    async fn service_filters_by_tenant() {
        let mut reports = sample_history();
        reports[0].client_id = Some("tenant-a".into());
        reports[1].client_id = Some("tenant-b".into());
        let service = AuditService::new(Arc::new(StaticRepo {
            reports,
            templates: Some(Vec::new()),
        }));
        let err = service.compare(Some("tenant-a"), "shop.example").await.unwrap_err();
        assert_eq!(err, AuditError::InsufficientHistory { reports_found: 1 });
        let groups = service.groups(Some("tenant-b"), "shop.example").await.unwrap();
        assert_eq!(groups[0].group, "Links");
    }

    #[tokio::test]
    async fn service_distribution_uses_latest_report() {
        let service = AuditService::new(Arc::new(StaticRepo {
            reports: sample_history(),
            templates: Some(Vec::new()),
        }));
        let distribution = service.distribution(None, "shop.example").await.unwrap();
        assert_eq!(distribution.urls_by_group.get("Links"), Some(&3));
        assert_eq!(distribution.urls_by_group.get("Images"), Some(&9));
        assert!(!distribution.urls_by_group.contains_key("Meta Description"));
        assert_eq!(distribution.issues_by_priority.get("High"), Some(&1));
        assert_eq!(distribution.issues_by_priority.get("Low"), Some(&1));
    }
}
