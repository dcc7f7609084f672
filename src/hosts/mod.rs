//! Built-in host profiles.
//!
//! A profile names the studies page to ingest, the selector that picks the
//! studies in the analysis, and the charts to bind, in binding order. Box
//! plot groups are expressions over charts bound earlier in the list.

mod hcqmeta;
mod ivmmeta;
mod vdmeta;

use std::collections::HashMap;

use crate::charts::ForestOptions;
use crate::models::StudyId;
use crate::repository::StudyRepository;

/// Where a box-plot group takes its studies from.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupSource {
    /// Every study of a bound chart, in chart order.
    Chart(&'static str),
    /// One summary group of a bound forest plot.
    ForestGroup(&'static str, usize),
    /// Every row of a bound forest plot, in date order.
    AllForestGroups(&'static str),
    /// Studies of `source` whose stage contains the text.
    StageContains(Box<GroupSource>, &'static str),
    /// Studies of `source` whose stage is anything but the text.
    StageIsNot(Box<GroupSource>, &'static str),
    /// Studies of the first source missing from the second.
    Difference(Box<GroupSource>, Box<GroupSource>),
}

/// Studies and groups of a chart that bound successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundGroups {
    pub studies: Vec<StudyId>,
    pub groups: Vec<Vec<StudyId>>,
}

impl GroupSource {
    pub fn stage_contains(self, text: &'static str) -> Self {
        Self::StageContains(Box::new(self), text)
    }

    pub fn stage_is_not(self, text: &'static str) -> Self {
        Self::StageIsNot(Box::new(self), text)
    }

    pub fn without(self, other: GroupSource) -> Self {
        Self::Difference(Box::new(self), Box::new(other))
    }

    /// Evaluate against the charts bound so far. `None` when a referenced
    /// chart or forest group is missing.
    pub fn resolve(
        &self,
        bound: &HashMap<String, BoundGroups>,
        studies: &StudyRepository,
    ) -> Option<Vec<StudyId>> {
        match self {
            Self::Chart(name) => bound.get(*name).map(|b| b.studies.clone()),
            Self::ForestGroup(name, index) => bound.get(*name)?.groups.get(*index).cloned(),
            Self::AllForestGroups(name) => {
                let mut all: Vec<StudyId> = bound.get(*name)?.groups.concat();
                all.sort_by_key(|id| studies.get(*id).map(|s| s.date));
                Some(all)
            }
            Self::StageContains(source, text) => Some(
                source
                    .resolve(bound, studies)?
                    .into_iter()
                    .filter(|id| studies.get(*id).is_some_and(|s| s.stage_contains(text)))
                    .collect(),
            ),
            Self::StageIsNot(source, text) => Some(
                source
                    .resolve(bound, studies)?
                    .into_iter()
                    .filter(|id| {
                        studies
                            .get(*id)
                            .is_some_and(|s| s.stage.as_deref() != Some(*text))
                    })
                    .collect(),
            ),
            Self::Difference(left, right) => {
                let right = right.resolve(bound, studies)?;
                Some(
                    left.resolve(bound, studies)?
                        .into_iter()
                        .filter(|id| !right.contains(id))
                        .collect(),
                )
            }
        }
    }
}

/// What to bind at a selector.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartKind {
    Bar,
    Forest(ForestOptions),
    Box {
        groups: Vec<GroupSource>,
        /// Only bind when this forest plot has exactly this many groups.
        requires_forest_groups: Option<(&'static str, usize)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub selector: &'static str,
    pub kind: ChartKind,
}

impl ChartSpec {
    pub fn bar(selector: &'static str) -> Self {
        Self {
            selector,
            kind: ChartKind::Bar,
        }
    }

    pub fn forest(selector: &'static str) -> Self {
        Self {
            selector,
            kind: ChartKind::Forest(ForestOptions::default()),
        }
    }

    pub fn titled_forest(selector: &'static str, title: &str) -> Self {
        Self {
            selector,
            kind: ChartKind::Forest(ForestOptions::titled(title)),
        }
    }

    pub fn box_plot(selector: &'static str, groups: Vec<GroupSource>) -> Self {
        Self {
            selector,
            kind: ChartKind::Box {
                groups,
                requires_forest_groups: None,
            },
        }
    }

    /// Box plot drawn from a forest plot's groups, bound only when the forest
    /// has `count` groups.
    pub fn forest_box_plot(
        selector: &'static str,
        forest: &'static str,
        count: usize,
        groups: Vec<GroupSource>,
    ) -> Self {
        Self {
            selector,
            kind: ChartKind::Box {
                groups,
                requires_forest_groups: Some((forest, count)),
            },
        }
    }
}

/// Everything needed to bring up one host's page.
#[derive(Debug, Clone, PartialEq)]
pub struct HostProfile {
    pub hostname: &'static str,
    pub studies_url: &'static str,
    pub inclusion_selector: &'static str,
    pub charts: Vec<ChartSpec>,
}

/// Profile for a hostname; a leading `www.` is ignored.
pub fn profile(hostname: &str) -> Option<HostProfile> {
    match hostname.trim_start_matches("www.") {
        "ivmmeta.com" => Some(ivmmeta::profile()),
        "hcqmeta.com" => Some(hcqmeta::profile()),
        "vdmeta.com" => Some(vdmeta::profile()),
        _ => None,
    }
}

/// Hostnames with a built-in profile.
pub fn hostnames() -> &'static [&'static str] {
    &["ivmmeta.com", "hcqmeta.com", "vdmeta.com"]
}
