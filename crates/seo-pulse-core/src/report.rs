use std::{fmt::Write, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::audit::{
    assembler::AuditResponse,
    differ::{ComparisonResult, MetricDelta},
    taxonomy::{IssueDistribution, IssueGroup},
};

/// Format styles supported by the renderers.
///
/// Deserialization goes through [`FromStr`], so config files and environment
/// variables accept the same spellings as the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(anyhow::anyhow!(
                "unknown output format `{other}` (expected human, json or yaml)"
            )),
        }
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = anyhow::Error;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

/// Serialize any value as pretty JSON or YAML. Human output has no generic form.
pub fn render_value<T: Serialize + ?Sized>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(value)?)),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        OutputFormat::Human => Err(anyhow::anyhow!("human output has no generic rendering")),
    }
}

/// Produce a summary of the latest report in the desired format.
pub fn render_summary(response: &AuditResponse, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_summary_human(response),
        _ => render_value(response, format),
    }
}

/// Produce a report comparison in the desired format.
pub fn render_comparison(
    comparison: &ComparisonResult,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            write_comparison(&mut out, comparison)?;
            Ok(out)
        }
        _ => render_value(comparison, format),
    }
}

/// Produce the grouped issue view in the desired format.
pub fn render_groups(groups: &[IssueGroup], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_groups_human(groups),
        _ => render_value(groups, format),
    }
}

/// Produce URL-per-group and issue-per-priority totals in the desired format.
pub fn render_distribution(
    distribution: &IssueDistribution,
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format != OutputFormat::Human {
        return render_value(distribution, format);
    }
    let mut out = String::new();
    writeln!(out, "URLs by group:")?;
    for (group, urls) in &distribution.urls_by_group {
        writeln!(out, "  {group:<18} {urls}")?;
    }
    writeln!(out, "Issues by priority:")?;
    for (priority, count) in &distribution.issues_by_priority {
        let label = if priority.is_empty() { "(none)" } else { priority };
        writeln!(out, "  {label:<18} {count}")?;
    }
    Ok(out)
}

fn render_summary_human(response: &AuditResponse) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Domain: {}", response.domain)?;
    writeln!(out, "Scanned: {}", response.scan_date.format("%Y-%m-%d %H:%M UTC"))?;
    writeln!(out, "Health Score: {}/100", response.health_score)?;
    writeln!(
        out,
        "Issues: {} • Affected URLs: {}",
        response.metadata.total_issues, response.metadata.total_urls
    )?;
    writeln!(out)?;

    if response.issues.is_empty() {
        writeln!(out, "No issues reported.")?;
    } else {
        writeln!(out, "Issues:")?;
        for enriched in &response.issues {
            let issue = &enriched.issue;
            writeln!(
                out,
                "  - {name} [{kind}/{priority}] {urls} URL(s) • score {score:.2} • {group}",
                name = issue.name,
                kind = issue.issue_type,
                priority = issue.priority,
                urls = issue.url_count,
                score = enriched.score,
                group = enriched.group,
            )?;
            if let Some(description) = &issue.description {
                writeln!(out, "    {}", single_line(description))?;
            }
            if let Some(fix) = &issue.how_to_fix {
                writeln!(out, "    Fix: {}", single_line(fix))?;
            }
        }
    }

    if let Some(comparison) = &response.comparison {
        writeln!(out)?;
        write_comparison(&mut out, comparison)?;
    }
    Ok(out)
}

fn write_comparison(out: &mut String, comparison: &ComparisonResult) -> anyhow::Result<()> {
    writeln!(
        out,
        "Comparison: {} vs {} ({} day(s) apart)",
        comparison.dates.current.format("%Y-%m-%d"),
        comparison.dates.previous.format("%Y-%m-%d"),
        comparison.dates.days_between
    )?;
    let metrics = &comparison.metrics;
    write_metric(out, "Total issues", &metrics.total_issues)?;
    write_metric(out, "Total URLs", &metrics.total_urls)?;
    write_metric(out, "Issue URLs", &metrics.by_type.issue)?;
    write_metric(out, "Warning URLs", &metrics.by_type.warning)?;
    write_metric(out, "Opportunity URLs", &metrics.by_type.opportunity)?;

    writeln!(out)?;
    writeln!(out, "Issue changes:")?;
    for change in &comparison.issue_changes {
        let previous = change
            .previous
            .as_ref()
            .map(|snapshot| snapshot.urls.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "  - {name:<40} {previous:>7} -> {current:<7} {change:+} ({pct}%) {trend}",
            name = change.issue_name,
            current = change.current.urls,
            change = change.change,
            pct = change.percentage_change,
            trend = change.trend,
        )?;
    }

    let summary = &comparison.summary;
    writeln!(
        out,
        "\nSummary: {} improved • {} worse • {} unchanged • {} new • {} resolved",
        summary.improved, summary.worse, summary.unchanged, summary.new, summary.resolved
    )?;
    Ok(())
}

fn write_metric(out: &mut String, label: &str, metric: &MetricDelta) -> anyhow::Result<()> {
    writeln!(
        out,
        "  {label:>16}: {previous} -> {current} ({change:+}, {pct}%) {trend}",
        previous = metric.previous,
        current = metric.current,
        change = metric.change,
        pct = metric.percentage_change,
        trend = metric.trend,
    )?;
    Ok(())
}

fn render_groups_human(groups: &[IssueGroup]) -> anyhow::Result<String> {
    let mut out = String::new();
    if groups.is_empty() {
        writeln!(out, "No issues reported.")?;
        return Ok(out);
    }
    for group in groups {
        writeln!(
            out,
            "{} (total score {:.2}, {} issue(s))",
            group.group,
            group.total_score,
            group.issues.len()
        )?;
        for issue in &group.issues {
            writeln!(
                out,
                "  - {} [{}/{}] {} URL(s)",
                issue.name, issue.issue_type, issue.priority, issue.url_count
            )?;
        }
    }
    Ok(out)
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{
        assembler::{assemble, TemplateCatalog},
        taxonomy::group_issues,
        Issue, IssueTemplate, Report,
    };
    use chrono::{TimeZone, Utc};

    fn sample_response(with_history: bool) -> AuditResponse {
        let mut reports = vec![Report::new(
            "shop.example",
            Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap(),
            vec![
                Issue::new("Broken Links", "Issue", "High", 3),
                Issue::new("Missing Alt Text", "Warning", "Low", 14),
            ],
        )];
        if with_history {
            reports.push(Report::new(
                "shop.example",
                Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
                vec![Issue::new("Broken Links", "Issue", "High", 9)],
            ));
        }
        let templates = TemplateCatalog::new(vec![IssueTemplate {
            issue_name: "Broken Links".into(),
            description: Some("Links pointing to\nmissing pages".into()),
            how_to_fix: None,
        }]);
        assemble(reports, &templates).unwrap()
    }

    #[test]
    fn human_summary_contains_score_and_issues() {
        let output = render_summary(&sample_response(false), OutputFormat::Human).unwrap();
        assert!(output.contains("Health Score"));
        assert!(output.contains("Broken Links [Issue/High]"));
        assert!(output.contains("Links pointing to missing pages"));
        assert!(!output.contains("Comparison"));
    }

    #[test]
    fn human_summary_includes_comparison_when_available() {
        let output = render_summary(&sample_response(true), OutputFormat::Human).unwrap();
        assert!(output.contains("Comparison: 2024-06-10 vs 2024-06-03 (7 day(s) apart)"));
        assert!(output.contains("1 improved"));
        assert!(output.contains("1 new"));
    }

    #[test]
    fn json_summary_serializes() {
        let response = sample_response(true);
        let output = render_summary(&response, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["healthScore"], serde_json::json!(response.health_score));
        assert!(value["issues"].is_array());
        assert_eq!(value["comparison"]["summary"]["new"], 1);
    }

    #[test]
    fn yaml_comparison_serializes() {
        let response = sample_response(true);
        let comparison = response.comparison.as_ref().unwrap();
        let output = render_comparison(comparison, OutputFormat::Yaml).unwrap();
        assert!(output.contains("issueChanges:"));
        assert!(output.contains("daysBetween: 7"));
    }

    #[test]
    fn human_groups_list_members() {
        let issues: Vec<_> = sample_response(false)
            .issues
            .into_iter()
            .map(|enriched| enriched.issue)
            .collect();
        let groups = group_issues(&issues);
        let output = render_groups(&groups, OutputFormat::Human).unwrap();
        assert!(output.starts_with("Links"));
        assert!(output.contains("Images"));
    }

    #[test]
    fn distribution_renders_both_tables() {
        let issues = vec![
            Issue::new("Broken Links", "Issue", "High", 12),
            Issue::new("Untitled", "Warning", "", 2),
        ];
        let distribution = IssueDistribution::from_issues(&issues);
        let output = render_distribution(&distribution, OutputFormat::Human).unwrap();
        assert!(output.contains("URLs by group:"));
        assert!(output.contains("Links"));
        assert!(output.contains("(none)"));

        let json = render_distribution(&distribution, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["urlsByGroup"]["Links"], 12);
        assert_eq!(value["issuesByPriority"]["High"], 1);
    }

    #[test]
    fn parses_output_formats() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn deserializes_formats_like_the_command_line() {
        let format: OutputFormat = serde_json::from_str("\"JSON\"").unwrap();
        assert_eq!(format, OutputFormat::Json);
        let format: OutputFormat = serde_json::from_str("\"Yml\"").unwrap();
        assert_eq!(format, OutputFormat::Yaml);
        assert!(serde_json::from_str::<OutputFormat>("\"xml\"").is_err());
        assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), "\"json\"");
    }
}
