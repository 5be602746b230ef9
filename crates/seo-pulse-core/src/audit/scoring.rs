//! Per-issue risk scores and the aggregate 0–100 health score.

use serde::{Deserialize, Serialize};

use super::{Issue, IssueType, Priority};

/// Weight lookup keyed by priority, with a value for labels outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub fallback: f64,
}

impl PriorityWeights {
    pub fn weight(&self, priority: &Priority) -> f64 {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
            Priority::Unknown(_) => self.fallback,
        }
    }
}

/// Weight lookup keyed by issue type, with a value for labels outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeWeights {
    pub issue: f64,
    pub warning: f64,
    pub opportunity: f64,
    pub fallback: f64,
}

impl TypeWeights {
    pub fn weight(&self, issue_type: &IssueType) -> f64 {
        match issue_type {
            IssueType::Issue => self.issue,
            IssueType::Warning => self.warning,
            IssueType::Opportunity => self.opportunity,
            IssueType::Unknown(_) => self.fallback,
        }
    }
}

/// Weights used for the per-issue risk score.
pub const RISK_PRIORITY_WEIGHTS: PriorityWeights = PriorityWeights {
    high: 100.0,
    medium: 50.0,
    low: 25.0,
    fallback: 0.0,
};

pub const RISK_TYPE_WEIGHTS: TypeWeights = TypeWeights {
    issue: 2.0,
    warning: 1.0,
    opportunity: 0.5,
    fallback: 0.0,
};

/// Deductions used for the aggregate health score.
pub const HEALTH_PRIORITY_DEDUCTIONS: PriorityWeights = PriorityWeights {
    high: -3.0,
    medium: -2.0,
    low: -1.0,
    fallback: -1.0,
};

pub const HEALTH_TYPE_DEDUCTIONS: TypeWeights = TypeWeights {
    issue: 1.5,
    warning: 1.0,
    opportunity: 0.5,
    fallback: 1.0,
};

/// Worst-case deduction for one issue: High priority at type weight 1.5.
pub const MAX_DEDUCTION_PER_ISSUE: f64 = 3.0 * 1.5;

const PERFECT_HEALTH: u8 = 100;

/// Sub-linear dampening of affected-URL volume; `+1` keeps zero counts at zero.
fn url_dampening(url_count: u64) -> f64 {
    (url_count as f64 + 1.0).log10()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Risk score for a single issue, rounded to two decimals. Used for ordering and emphasis.
pub fn risk_score(issue: &Issue) -> f64 {
    let priority = RISK_PRIORITY_WEIGHTS.weight(&issue.priority);
    let kind = RISK_TYPE_WEIGHTS.weight(&issue.issue_type);
    round2(priority * kind * url_dampening(issue.url_count) / 100.0)
}

/// Health deduction contributed by one issue (always non-negative).
pub fn deduction(issue: &Issue) -> f64 {
    let priority = HEALTH_PRIORITY_DEDUCTIONS.weight(&issue.priority);
    let kind = HEALTH_TYPE_DEDUCTIONS.weight(&issue.issue_type);
    let url_factor = url_dampening(issue.url_count) / 2.0;
    (priority * kind * url_factor).abs()
}

/// Explainable decomposition of a report's health score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBreakdown {
    pub total_deductions: f64,
    pub max_possible: f64,
    pub score: u8,
}

impl HealthBreakdown {
    pub fn from_issues(issues: &[Issue]) -> Self {
        if issues.is_empty() {
            return Self {
                total_deductions: 0.0,
                max_possible: 0.0,
                score: PERFECT_HEALTH,
            };
        }
        // Summed in sorted order so permutations of the list agree bit-for-bit.
        let mut deductions: Vec<f64> = issues.iter().map(deduction).collect();
        deductions.sort_by(f64::total_cmp);
        let total_deductions: f64 = deductions.iter().sum();
        let max_possible = issues.len() as f64 * MAX_DEDUCTION_PER_ISSUE;
        let raw = 100.0 - total_deductions / max_possible * 100.0;
        let score = raw.round().clamp(0.0, f64::from(PERFECT_HEALTH)) as u8;
        Self {
            total_deductions,
            max_possible,
            score,
        }
    }
}

/// Aggregate health score in `0..=100`; an empty issue list scores 100.
///
/// The denominator grows with the number of issues, so the score measures how
/// close this particular set of findings is to its own worst case.
pub fn health_score(issues: &[Issue]) -> u8 {
    HealthBreakdown::from_issues(issues).score
}
