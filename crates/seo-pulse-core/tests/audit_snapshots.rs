use std::{path::PathBuf, sync::Arc};

use insta::assert_json_snapshot;
use seo_pulse_core::{
    audit::{assembler::AuditService, file_repository::FileReportRepository},
    health_score, Trend,
};
use serde_json::json;

const CLIENT_ID: &str = "6750d1d3aaba4edf40a3b8f1";

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn reports_dir() -> PathBuf {
    workspace_root().join("reports")
}

fn service() -> AuditService<FileReportRepository> {
    AuditService::new(Arc::new(FileReportRepository::new(reports_dir())))
}

#[tokio::test(flavor = "current_thread")]
async fn shop_summary_snapshot() {
    let response = service()
        .summary(Some(CLIENT_ID), "shop.example")
        .await
        .unwrap_or_else(|err| panic!("summary failed: {err}"));
    let comparison = response
        .comparison
        .as_ref()
        .expect("shop.example has two reports");

    let snapshot = json!({
        "comparison": {
            "changes": comparison.issue_changes.iter().map(|change| json!({
                "change": change.change,
                "issue": change.issue_name,
                "percentageChange": change.percentage_change,
                "trend": change.trend,
            })).collect::<Vec<_>>(),
            "daysBetween": comparison.dates.days_between,
            "summary": {
                "improved": comparison.summary.improved,
                "new": comparison.summary.new,
                "resolved": comparison.summary.resolved,
                "unchanged": comparison.summary.unchanged,
                "worse": comparison.summary.worse,
            },
        },
        "domain": response.domain,
        "healthScore": response.health_score,
        "issues": response.issues.iter().map(|enriched| json!({
            "group": enriched.group,
            "name": enriched.issue.name,
            "urls": enriched.issue.url_count,
        })).collect::<Vec<_>>(),
    });
    assert_json_snapshot!("shop_example_summary", snapshot);
}

#[tokio::test(flavor = "current_thread")]
async fn templates_enrich_summary() {
    let response = service()
        .summary(Some(CLIENT_ID), "shop.example")
        .await
        .unwrap();
    let broken = &response.issues[0];
    assert_eq!(broken.issue.name, "Broken Links");
    assert_eq!(
        broken.issue.description.as_deref(),
        Some("Internal links pointing to URLs that return a 4XX or 5XX response.")
    );
    let mixed = response
        .issues
        .iter()
        .find(|enriched| enriched.issue.name == "Mixed Content")
        .unwrap();
    assert!(mixed.issue.description.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn summary_score_is_reproducible() {
    let first = service().summary(None, "shop.example").await.unwrap();
    let second = service().summary(None, "shop.example").await.unwrap();
    assert_eq!(first.health_score, second.health_score);
    let issues: Vec<_> = first.issues.iter().map(|e| e.issue.clone()).collect();
    assert_eq!(first.health_score, health_score(&issues));
}

#[tokio::test(flavor = "current_thread")]
async fn single_report_domain_cannot_compare() {
    let service = service();
    let err = service
        .compare(Some(CLIENT_ID), "blog.example")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "not enough reports for comparison (found 1)");

    let summary = service.summary(Some(CLIENT_ID), "blog.example").await.unwrap();
    assert!(summary.comparison.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn lists_tenant_domains() {
    let domains = service().domains(Some(CLIENT_ID)).await.unwrap();
    assert_eq!(domains, vec!["blog.example", "shop.example"]);
    assert!(service().domains(Some("someone-else")).await.unwrap().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn groups_follow_risk_order() {
    let groups = service()
        .groups(Some(CLIENT_ID), "shop.example")
        .await
        .unwrap();
    let names: Vec<_> = groups.iter().map(|g| g.group.as_str()).collect();
    assert_eq!(
        names,
        vec!["Links", "Security", "Meta Description", "Images", "Performance"]
    );
    let comparison = service()
        .compare(Some(CLIENT_ID), "shop.example")
        .await
        .unwrap();
    assert_eq!(
        comparison.change_for("Compression").map(|c| c.trend),
        Some(Trend::Improved)
    );
}
