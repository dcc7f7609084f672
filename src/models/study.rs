//! Study records scraped from a studies page.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Index of a study inside a [`StudyRepository`](crate::repository::StudyRepository).
///
/// Handles are only meaningful for the repository that issued them. Charts
/// hold these instead of copies so a status flip is visible everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudyId(pub usize);

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "study#{}", self.0)
    }
}

/// Study design features detected from the summary text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StudyFeature {
    PeerReviewed,
    PrePrint,
    Retrospective,
    Prospective,
    Rct,
    DoubleBlind,
    SingleBlind,
    ClusterRandomized,
    Psm,
}

/// Primary outcome reported for a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub description: String,
    /// Positive when the treatment improved the outcome.
    pub improvement_percent: f64,
    pub p_value: f64,
    /// The p-value exactly as printed, e.g. `p=0.03`.
    pub p_value_text: String,
}

/// Mutable status of a study. Only the timeline writes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudyStatus {
    /// The study's date is on or before the timeline's current date.
    pub is_published: bool,
    /// Removed from aggregates by the user.
    pub is_excluded: bool,
    /// Selected by the host page as part of the analysis.
    pub is_in_analysis: bool,
}

/// One ingested research record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub title: String,
    pub author: String,
    /// Identity key; unique within a repository.
    pub details_url: String,
    pub date: NaiveDate,
    pub num_authors: Option<u32>,
    pub stage: Option<String>,
    pub short_outcome: Option<String>,
    pub primary_outcome: Option<Outcome>,
    pub features: BTreeSet<StudyFeature>,
    #[serde(default)]
    pub status: StudyStatus,
}

impl Study {
    /// Create a bare study with only identity fields set.
    pub fn new(title: &str, author: &str, details_url: &str, date: NaiveDate) -> Self {
        Self {
            title: title.to_string(),
            author: author.to_string(),
            details_url: details_url.to_string(),
            date,
            num_authors: None,
            stage: None,
            short_outcome: None,
            primary_outcome: None,
            features: BTreeSet::new(),
            status: StudyStatus {
                is_published: true,
                ..Default::default()
            },
        }
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.short_outcome = Some(outcome.description.clone());
        self.primary_outcome = Some(outcome);
        self
    }

    pub fn is_published(&self) -> bool {
        self.status.is_published
    }

    pub fn is_excluded(&self) -> bool {
        self.status.is_excluded
    }

    pub fn is_in_analysis(&self) -> bool {
        self.status.is_in_analysis
    }

    /// Published and not excluded: the study feeds aggregates.
    pub fn is_eligible(&self) -> bool {
        self.status.is_published && !self.status.is_excluded
    }

    pub fn has_feature(&self, feature: StudyFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Stage text contains `needle`, e.g. `"early"` matches `"early treatment"`.
    pub fn stage_contains(&self, needle: &str) -> bool {
        self.stage.as_deref().is_some_and(|s| s.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_study_is_published_and_included() {
        let study = Study::new("Trial", "Smith", "https://x/a", date(2021, 1, 1));
        assert!(study.is_published());
        assert!(!study.is_excluded());
        assert!(study.is_eligible());
        assert!(!study.is_in_analysis());
    }

    #[test]
    fn test_eligibility_requires_both_flags() {
        let mut study = Study::new("Trial", "Smith", "https://x/a", date(2021, 1, 1));
        study.status.is_excluded = true;
        assert!(!study.is_eligible());
        study.status.is_excluded = false;
        study.status.is_published = false;
        assert!(!study.is_eligible());
    }

    #[test]
    fn test_stage_contains() {
        let study =
            Study::new("Trial", "Smith", "https://x/a", date(2021, 1, 1)).with_stage("early treatment");
        assert!(study.stage_contains("early"));
        assert!(!study.stage_contains("late"));
    }
}
