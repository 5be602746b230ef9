pub mod audit;
pub mod report;

pub use audit::{
    assembler::{assemble, AuditResponse, AuditService, EnrichedIssue, TemplateCatalog},
    differ::{compare_latest, diff, ComparisonResult, IssueChange, MetricDelta, TrendSummary},
    file_repository::FileReportRepository,
    import::{domain_from_file_name, read_issue_overview, SnapshotMetadata, StoredSnapshot},
    parse_url_count,
    scoring::{health_score, risk_score, HealthBreakdown},
    taxonomy::{classify, group_issues, IssueDistribution, IssueGroup, OTHER_GROUP, TAXONOMY},
    AuditError, Issue, IssueTemplate, IssueType, Priority, Report, ReportMetadata,
    ReportRepository, Trend,
};
pub use report::{
    render_comparison, render_distribution, render_groups, render_summary, render_value,
    OutputFormat,
};
