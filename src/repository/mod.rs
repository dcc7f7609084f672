//! In-memory study repository.
//!
//! Studies are stored in date order and addressed by [`StudyId`]. The
//! repository lives for one page view; nothing is persisted.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use chrono::NaiveDate;
use tracing::debug;

use crate::models::{Study, StudyId, StudyStatus};

/// Date-ordered collection of studies with identity lookup by details URL.
#[derive(Debug, Clone, Default)]
pub struct StudyRepository {
    studies: Vec<Study>,
    by_url: HashMap<String, StudyId>,
}

impl StudyRepository {
    /// Build a repository, keeping the first study for each details URL.
    ///
    /// Studies are sorted by date; ties keep their input order.
    pub fn new(studies: Vec<Study>) -> Self {
        let mut unique: Vec<Study> = Vec::with_capacity(studies.len());
        let mut seen = HashSet::new();
        for study in studies {
            if seen.insert(study.details_url.clone()) {
                unique.push(study);
            } else {
                debug!("Dropping duplicate study {}", study.details_url);
            }
        }
        unique.sort_by_key(|s| s.date);

        let by_url = unique
            .iter()
            .enumerate()
            .map(|(i, s)| (s.details_url.clone(), StudyId(i)))
            .collect();

        Self {
            studies: unique,
            by_url,
        }
    }

    pub fn len(&self) -> usize {
        self.studies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.studies.is_empty()
    }

    /// Get a study by handle.
    pub fn get(&self, id: StudyId) -> Option<&Study> {
        self.studies.get(id.0)
    }

    /// Look up a study by its details URL.
    pub fn find_by_url(&self, url: &str) -> Option<StudyId> {
        self.by_url.get(url).copied()
    }

    /// All handles in date order.
    pub fn ids(&self) -> impl Iterator<Item = StudyId> + '_ {
        (0..self.studies.len()).map(StudyId)
    }

    /// All studies with their handles, in date order.
    pub fn iter(&self) -> impl Iterator<Item = (StudyId, &Study)> {
        self.studies.iter().enumerate().map(|(i, s)| (StudyId(i), s))
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.studies.first().map(|s| s.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.studies.last().map(|s| s.date)
    }

    /// Published and not excluded. Unknown handles are not eligible.
    pub fn is_eligible(&self, id: StudyId) -> bool {
        self.get(id).is_some_and(Study::is_eligible)
    }

    /// Indices of studies dated in `(min(a, b), max(a, b)]`.
    ///
    /// Only these studies can change publish state when the timeline moves
    /// between `a` and `b`.
    pub fn between(&self, a: NaiveDate, b: NaiveDate) -> Range<usize> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let start = self.studies.partition_point(|s| s.date <= low);
        let end = self.studies.partition_point(|s| s.date <= high);
        start..end
    }

    /// Mark the given studies as part of the host page's analysis.
    pub fn mark_in_analysis(&mut self, ids: &[StudyId]) {
        for id in ids {
            if let Some(study) = self.studies.get_mut(id.0) {
                study.status.is_in_analysis = true;
            }
        }
    }

    /// Handles of studies in the analysis, in date order.
    pub fn in_analysis(&self) -> Vec<StudyId> {
        self.iter()
            .filter(|(_, s)| s.is_in_analysis())
            .map(|(id, _)| id)
            .collect()
    }

    pub(crate) fn status_mut(&mut self, id: StudyId) -> Option<&mut StudyStatus> {
        self.studies.get_mut(id.0).map(|s| &mut s.status)
    }
}
