//! Selecting the studies a host page counts as part of its analysis.

use tracing::debug;

use crate::error::IngestError;
use crate::models::StudyId;
use crate::render::ChartDocument;
use crate::repository::StudyRepository;

/// Studies named by the anchors `selector` picks out of the host page.
///
/// A match that is not itself an `a` counts through its parent. Anchors whose
/// href is not a known study are skipped. Result is in date order without
/// duplicates.
pub fn studies_in_analysis(
    page: &ChartDocument,
    selector: &str,
    studies: &StudyRepository,
) -> Result<Vec<StudyId>, IngestError> {
    let matches = page
        .select(selector)
        .map_err(|_| IngestError::InvalidSelector(selector.to_string()))?;

    let mut ids = Vec::new();
    for node in matches {
        let anchor = if page.tag_name(node).as_deref() == Some("a") {
            Some(node)
        } else {
            page.parent(node)
        };
        let Some(href) = anchor.and_then(|a| page.attr(a, "href")) else {
            debug!("Inclusion match without an href");
            continue;
        };
        if let Some(id) = studies.find_by_url(&href) {
            ids.push(id);
        }
    }
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Mark the selected studies as part of the analysis. Returns their handles.
pub fn mark_included(
    page: &ChartDocument,
    selector: &str,
    studies: &mut StudyRepository,
) -> Result<Vec<StudyId>, IngestError> {
    let ids = studies_in_analysis(page, selector, studies)?;
    studies.mark_in_analysis(&ids);
    debug!("{} of {} studies in analysis", ids.len(), studies.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Study;
    use chrono::NaiveDate;

    fn repo() -> StudyRepository {
        let date = |m| NaiveDate::from_ymd_opt(2021, m, 1).unwrap();
        StudyRepository::new(vec![
            Study::new("A", "Alpha", "https://s/a", date(1)),
            Study::new("B", "Beta", "https://s/b", date(2)),
            Study::new("C", "Gamma", "https://s/c", date(3)),
        ])
    }

    const PAGE: &str = r#"<div id="fig_fpall"><svg><g class="infolayer">
<g class="annotation"><a xlink:href="https://s/c"><text><tspan>Gamma</tspan></text></a></g>
<g class="annotation"><a xlink:href="https://s/a"><text><tspan>Alpha</tspan></text></a></g>
<g class="annotation"><a xlink:href="https://s/unknown"><text><tspan>Other</tspan></text></a></g>
</g></svg></div>"#;

    #[test]
    fn test_anchor_matches() {
        let page = ChartDocument::parse(PAGE);
        let ids = studies_in_analysis(&page, "#fig_fpall .infolayer .annotation a", &repo()).unwrap();
        assert_eq!(ids, vec![StudyId(0), StudyId(2)]);
    }

    #[test]
    fn test_text_matches_count_through_parent() {
        let page = ChartDocument::parse(PAGE);
        let mut studies = repo();
        let ids = mark_included(&page, "#fig_fpall .annotation a text", &mut studies).unwrap();
        assert_eq!(ids, vec![StudyId(0), StudyId(2)]);
        assert!(studies.get(StudyId(0)).unwrap().is_in_analysis());
        assert!(!studies.get(StudyId(1)).unwrap().is_in_analysis());
    }

    #[test]
    fn test_invalid_selector() {
        let page = ChartDocument::parse(PAGE);
        assert!(matches!(
            studies_in_analysis(&page, "a[", &repo()),
            Err(IngestError::InvalidSelector(_))
        ));
    }
}
