//! Strip showing one study: the latest published study after a date change,
//! or whichever study the pointer rests on.

use chrono::NaiveDate;

use crate::error::ChartError;
use crate::models::{Outcome, Study, StudyId};
use crate::render::document::{escape_attr, escape_text};
use crate::render::format::{percent1, short_date};
use crate::render::ChartDocument;
use crate::repository::StudyRepository;
use crate::timeline::{Subscriber, TimelineEvent};

/// What the host should show in the summary strip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryView {
    pub markup: String,
    pub visible: bool,
}

#[derive(Debug, Default)]
pub struct StudySummary {
    view: SummaryView,
}

impl StudySummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &SummaryView {
        &self.view
    }

    fn show(&mut self, study: &Study) {
        let improvement = study
            .primary_outcome
            .as_ref()
            .map(improvement_markup)
            .unwrap_or_default();
        self.view = SummaryView {
            markup: format!(
                r#"<a target="_blank" href="{}"><span class="date">{}</span> <span class="author">{}</span> {} {}</a>"#,
                escape_attr(&study.details_url),
                short_date(study.date),
                escape_text(&study.author),
                improvement,
                escape_text(&study.title),
            ),
            visible: true,
        };
    }

    fn show_latest(&mut self, date: NaiveDate, studies: &StudyRepository) {
        let latest = studies
            .iter()
            .filter(|(_, s)| s.is_in_analysis() && s.date <= date)
            .last();
        if let Some((_, study)) = latest {
            self.show(study);
        }
    }

    /// Resolve a host page link to a study. `#id` links follow the cited
    /// element's first `a[target="_blank"]`.
    pub fn resolve_link(
        page: &ChartDocument,
        href: &str,
        studies: &StudyRepository,
    ) -> Result<Option<StudyId>, ChartError> {
        if !href.starts_with('#') {
            return Ok(studies.find_by_url(href));
        }
        let Some(cited) = page.select_first(href)? else {
            return Ok(None);
        };
        Ok(page
            .select_within(cited, r#"a[target="_blank"]"#)?
            .into_iter()
            .next()
            .and_then(|a| page.attr(a, "href"))
            .and_then(|url| studies.find_by_url(&url)))
    }
}

fn improvement_markup(outcome: &Outcome) -> String {
    let percent = outcome.improvement_percent;
    if percent > 0.0 {
        format!(r#"<span class="improvement better">↓{}</span>"#, percent1(percent))
    } else if percent < 0.0 {
        format!(r#"<span class="improvement worse">↑{}</span>"#, percent1(-percent))
    } else {
        format!(r#"<span class="improvement equal">{}</span>"#, percent1(percent))
    }
}

impl Subscriber for StudySummary {
    fn on_event(&mut self, event: &TimelineEvent<'_>, studies: &StudyRepository) {
        match event {
            TimelineEvent::DateChanged { date, .. } => self.show_latest(*date, studies),
            TimelineEvent::StudyShown { study } => {
                if let Some(study) = studies.get(*study) {
                    self.show(study);
                }
            }
            TimelineEvent::StudyHidden => self.view.visible = false,
            TimelineEvent::Started { .. } | TimelineEvent::ExclusionToggled { .. } => {}
        }
    }
}
