use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::warn;

use super::{scoring::risk_score, Issue};

/// Group returned when no taxonomy pattern matches.
pub const OTHER_GROUP: &str = "Other";

/// Ordered taxonomy table. Declaration order decides which group wins when a
/// name satisfies patterns from several groups.
pub const TAXONOMY: &[(&str, &[&str])] = &[
    (
        "Meta Description",
        &[
            "Meta Description",
            "Meta Description Length",
            "Missing Meta Description",
            "Duplicate Meta Description",
        ],
    ),
    (
        "Canonicals",
        &[
            "Canonicals",
            "Canonicalised",
            "Non-Indexable Canonical",
            "Missing Canonical",
        ],
    ),
    (
        "Response Codes",
        &[
            "Internal Server Error",
            "Client Error",
            "404",
            "500",
            "301",
            "302",
            "Status Code",
        ],
    ),
    (
        "Headers",
        &["H1", "H2", "Missing H1", "Multiple H1", "Long H1", "Header"],
    ),
    (
        "Security",
        &["HTTPS", "SSL", "Mixed Content", "Security Headers", "HTTP"],
    ),
    (
        "Links",
        &[
            "Broken Links",
            "Internal Links",
            "External Links",
            "Nofollow Links",
            "Link",
        ],
    ),
    (
        "Images",
        &[
            "Image",
            "Alt Text",
            "Missing Alt",
            "Large Images",
            "Broken Images",
        ],
    ),
    (
        "Page Content",
        &[
            "Page Titles",
            "Title",
            "Content Length",
            "Duplicate Content",
            "Word Count",
        ],
    ),
    (
        "URLs",
        &["URL", "URL Length", "URL Structure", "URL Path", "Repetitive Path"],
    ),
    (
        "Performance",
        &["Load Time", "Page Size", "Compression", "Cache", "Speed"],
    ),
    (
        "Mobile",
        &[
            "Mobile Friendly",
            "Viewport",
            "Mobile Layout",
            "Touch Elements",
        ],
    ),
    ("Indexation", &["Index", "Noindex", "Robots", "Sitemap"]),
];

/// Lowercased taxonomy patterns plus an automaton answering
/// "which patterns occur inside this name" in one pass.
struct TaxonomyIndex {
    patterns: Vec<(usize, String)>,
    automaton: Option<AhoCorasick>,
}

impl TaxonomyIndex {
    fn build() -> Self {
        let patterns: Vec<(usize, String)> = TAXONOMY
            .iter()
            .enumerate()
            .flat_map(|(group_idx, (_, patterns))| {
                patterns
                    .iter()
                    .map(move |pattern| (group_idx, pattern.to_lowercase()))
            })
            .collect();
        let automaton = match AhoCorasick::new(patterns.iter().map(|(_, p)| p.as_str())) {
            Ok(automaton) => Some(automaton),
            Err(err) => {
                warn!(error = %err, "taxonomy automaton unavailable; using linear scan");
                None
            }
        };
        Self {
            patterns,
            automaton,
        }
    }

    /// Earliest group with a pattern contained in `lowered`.
    fn first_contained(&self, lowered: &str) -> Option<usize> {
        match &self.automaton {
            Some(automaton) => automaton
                .find_overlapping_iter(lowered)
                .map(|mat| self.patterns[mat.pattern().as_usize()].0)
                .min(),
            None => self
                .patterns
                .iter()
                .find(|(_, pattern)| lowered.contains(pattern.as_str()))
                .map(|(group_idx, _)| *group_idx),
        }
    }

    /// Earliest group with a pattern that itself contains `lowered`.
    fn first_containing(&self, lowered: &str) -> Option<usize> {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.contains(lowered))
            .map(|(group_idx, _)| *group_idx)
    }

    fn classify(&self, lowered: &str) -> Option<usize> {
        match (self.first_contained(lowered), self.first_containing(lowered)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

static INDEX: Lazy<TaxonomyIndex> = Lazy::new(TaxonomyIndex::build);

/// Map a raw issue name onto its taxonomy group.
///
/// Matching is case-insensitive and bidirectional: a group matches when the
/// name contains one of its patterns or a pattern contains the name. Missing
/// or empty names resolve to [`OTHER_GROUP`].
pub fn classify(issue_name: Option<&str>) -> &'static str {
    let Some(name) = issue_name.filter(|name| !name.is_empty()) else {
        return OTHER_GROUP;
    };
    let lowered = name.to_lowercase();
    INDEX
        .classify(&lowered)
        .map(|group_idx| TAXONOMY[group_idx].0)
        .unwrap_or(OTHER_GROUP)
}

/// Issues sharing a taxonomy group, with their combined risk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueGroup {
    pub group: String,
    pub total_score: f64,
    pub issues: Vec<Issue>,
}

/// Bucket issues by taxonomy group.
///
/// Groups are ordered by descending total risk score and issues within a group
/// by descending risk score; ties keep their input order.
pub fn group_issues(issues: &[Issue]) -> Vec<IssueGroup> {
    let mut order: Vec<&'static str> = Vec::new();
    let mut buckets: HashMap<&'static str, Vec<(f64, Issue)>> = HashMap::new();
    for issue in issues {
        let group = classify(Some(&issue.name));
        let bucket = buckets.entry(group).or_insert_with(|| {
            order.push(group);
            Vec::new()
        });
        bucket.push((risk_score(issue), issue.clone()));
    }

    let mut groups: Vec<IssueGroup> = order
        .into_iter()
        .filter_map(|group| buckets.remove(group).map(|bucket| (group, bucket)))
        .map(|(group, mut bucket)| {
            bucket.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
            IssueGroup {
                group: group.to_string(),
                total_score: bucket.iter().map(|(score, _)| score).sum(),
                issues: bucket.into_iter().map(|(_, issue)| issue).collect(),
            }
        })
        .collect();
    groups.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    groups
}

/// Chart-style totals for one report: affected URLs per taxonomy group and
/// number of issues per priority label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDistribution {
    pub urls_by_group: BTreeMap<&'static str, u64>,
    pub issues_by_priority: BTreeMap<String, u64>,
}

impl IssueDistribution {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut distribution = Self::default();
        for issue in issues {
            let urls = distribution
                .urls_by_group
                .entry(classify(Some(&issue.name)))
                .or_insert(0);
            *urls = urls.saturating_add(issue.url_count);
            *distribution
                .issues_by_priority
                .entry(issue.priority.label().to_string())
                .or_insert(0) += 1;
        }
        distribution
    }
}
