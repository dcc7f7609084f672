//! Timeline state: current date, publish/exclusion flags and notifications.
//!
//! The [`Timeline`] is the only writer of study status flags. Every change is
//! delivered synchronously to subscribers, in registration order, before the
//! mutating call returns. Subscribers get a shared borrow of the repository
//! and cannot call back into the timeline; user actions travel as [`Intent`]s
//! applied by whoever owns the timeline.

mod scrubber;

pub use scrubber::{MarkerTone, MonthLabel, Scrubber, ScrubberMarker, ScrubberSettings, Tick};

use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::TimelineError;
use crate::models::StudyId;
use crate::repository::StudyRepository;

/// Notification delivered to every subscriber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineEvent<'a> {
    /// All charts are bound and the study set is loaded; paint everything.
    Started { date: NaiveDate },
    /// The current date moved; `changed` lists exactly the studies whose
    /// publish state flipped.
    DateChanged {
        date: NaiveDate,
        previous: NaiveDate,
        changed: &'a [StudyId],
    },
    /// A study's exclusion flag flipped.
    ExclusionToggled { study: StudyId },
    /// Transient hover focus on a study.
    StudyShown { study: StudyId },
    /// Hover focus ended.
    StudyHidden,
}

/// A visualization bound to the timeline.
///
/// Handlers must tolerate being told about a study that is already in its
/// target visual state.
pub trait Subscriber {
    fn on_event(&mut self, event: &TimelineEvent<'_>, studies: &StudyRepository);
}

/// Shared handle the timeline keeps for each subscriber.
pub type SharedSubscriber = Rc<RefCell<dyn Subscriber>>;

/// A user action against the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ChangeDate(NaiveDate),
    ToggleExclusion(StudyId),
    ShowStudy(StudyId),
    HideStudy,
}

/// Central timeline state for one page.
pub struct Timeline {
    studies: StudyRepository,
    current: NaiveDate,
    subscribers: Vec<SharedSubscriber>,
}

impl Timeline {
    /// Create a timeline positioned at `date`.
    ///
    /// Publish flags are brought in line with `date` so that
    /// `is_published == (study.date <= current)` holds from the start.
    pub fn new(mut studies: StudyRepository, date: NaiveDate) -> Self {
        let ids: Vec<StudyId> = studies.ids().collect();
        for id in ids {
            let published = studies.get(id).is_some_and(|s| s.date <= date);
            if let Some(status) = studies.status_mut(id) {
                status.is_published = published;
            }
        }

        Self {
            studies,
            current: date,
            subscribers: Vec::new(),
        }
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current
    }

    pub fn studies(&self) -> &StudyRepository {
        &self.studies
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register a subscriber. Delivery order is registration order.
    pub fn subscribe(&mut self, subscriber: SharedSubscriber) {
        self.subscribers.push(subscriber);
    }

    /// Tell subscribers to perform their first paint.
    pub fn start(&mut self) {
        debug!(
            "Timeline started at {} with {} subscribers",
            self.current,
            self.subscribers.len()
        );
        self.notify(&TimelineEvent::Started { date: self.current });
    }

    /// Move the current date and return the studies whose publish state flipped.
    ///
    /// Moving to the current date is a no-op and notifies nobody.
    pub fn change_date(&mut self, date: NaiveDate) -> Vec<StudyId> {
        if date == self.current {
            return Vec::new();
        }

        let previous = self.current;
        let backward = date < previous;
        let mut changed = Vec::new();

        // Only studies dated between the two positions can flip.
        for index in self.studies.between(previous, date) {
            let id = StudyId(index);
            let Some(study_date) = self.studies.get(id).map(|s| s.date) else {
                continue;
            };
            let Some(status) = self.studies.status_mut(id) else {
                continue;
            };

            if backward {
                if status.is_published && study_date > date {
                    status.is_published = false;
                    changed.push(id);
                }
            } else if !status.is_published && study_date <= date {
                status.is_published = true;
                changed.push(id);
            }
        }

        self.current = date;
        debug!(
            "Timeline moved {} -> {} ({} studies changed)",
            previous,
            date,
            changed.len()
        );

        self.notify(&TimelineEvent::DateChanged {
            date,
            previous,
            changed: &changed,
        });
        changed
    }

    /// Flip a study's exclusion flag and return the new value.
    pub fn toggle_exclusion(&mut self, study: StudyId) -> Result<bool, TimelineError> {
        let status = self
            .studies
            .status_mut(study)
            .ok_or(TimelineError::UnknownStudy(study))?;
        status.is_excluded = !status.is_excluded;
        let excluded = status.is_excluded;

        debug!("Study {} excluded={}", study, excluded);
        self.notify(&TimelineEvent::ExclusionToggled { study });
        Ok(excluded)
    }

    /// Focus a study transiently (hover).
    pub fn show_study(&mut self, study: StudyId) -> Result<(), TimelineError> {
        if self.studies.get(study).is_none() {
            return Err(TimelineError::UnknownStudy(study));
        }
        self.notify(&TimelineEvent::StudyShown { study });
        Ok(())
    }

    /// End transient focus.
    pub fn hide_study(&mut self) {
        self.notify(&TimelineEvent::StudyHidden);
    }

    /// Apply a user action.
    pub fn apply(&mut self, intent: Intent) -> Result<(), TimelineError> {
        match intent {
            Intent::ChangeDate(date) => {
                self.change_date(date);
            }
            Intent::ToggleExclusion(study) => {
                self.toggle_exclusion(study)?;
            }
            Intent::ShowStudy(study) => self.show_study(study)?,
            Intent::HideStudy => self.hide_study(),
        }
        Ok(())
    }

    fn notify(&self, event: &TimelineEvent<'_>) {
        for subscriber in &self.subscribers {
            subscriber.borrow_mut().on_event(event, &self.studies);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Study;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Records every event it sees.
    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Subscriber for Recorder {
        fn on_event(&mut self, event: &TimelineEvent<'_>, _studies: &StudyRepository) {
            let entry = match event {
                TimelineEvent::Started { .. } => "start".to_string(),
                TimelineEvent::DateChanged { changed, .. } => {
                    let ids: Vec<usize> = changed.iter().map(|id| id.0).collect();
                    format!("date {:?}", ids)
                }
                TimelineEvent::ExclusionToggled { study } => format!("exclude {}", study.0),
                TimelineEvent::StudyShown { study } => format!("show {}", study.0),
                TimelineEvent::StudyHidden => "hide".to_string(),
            };
            self.log.borrow_mut().push(format!("{}:{}", self.name, entry));
        }
    }

    fn three_studies() -> StudyRepository {
        StudyRepository::new(vec![
            Study::new("Jan", "A", "https://s/jan", date(2021, 1, 1)),
            Study::new("Feb", "B", "https://s/feb", date(2021, 2, 1)),
            Study::new("Mar", "C", "https://s/mar", date(2021, 3, 1)),
        ])
    }

    fn assert_publish_invariant(timeline: &Timeline) {
        for (_, study) in timeline.studies().iter() {
            assert_eq!(
                study.is_published(),
                study.date <= timeline.current_date(),
                "publish flag wrong for {}",
                study.title
            );
        }
    }

    #[test]
    fn test_new_normalizes_publish_flags() {
        let timeline = Timeline::new(three_studies(), date(2021, 2, 10));
        assert_publish_invariant(&timeline);
    }

    #[test]
    fn test_backward_change_reports_unpublished_studies() {
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        let changed = timeline.change_date(date(2021, 1, 15));
        assert_eq!(changed, vec![StudyId(1), StudyId(2)]);
        assert!(timeline.studies().get(StudyId(0)).unwrap().is_published());
        assert_publish_invariant(&timeline);
    }

    #[test]
    fn test_forward_change_reports_published_studies() {
        let mut timeline = Timeline::new(three_studies(), date(2020, 12, 1));
        let changed = timeline.change_date(date(2021, 2, 1));
        assert_eq!(changed, vec![StudyId(0), StudyId(1)]);
        assert_publish_invariant(&timeline);
    }

    #[test]
    fn test_same_date_is_noop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        timeline.subscribe(Rc::new(RefCell::new(Recorder {
            name: "a",
            log: log.clone(),
        })));

        let changed = timeline.change_date(date(2021, 3, 1));
        assert!(changed.is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_change_without_flips_still_notifies() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        timeline.subscribe(Rc::new(RefCell::new(Recorder {
            name: "a",
            log: log.clone(),
        })));

        let changed = timeline.change_date(date(2021, 3, 5));
        assert!(changed.is_empty());
        assert_eq!(*log.borrow(), vec!["a:date []".to_string()]);
    }

    #[test]
    fn test_subscribers_notified_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        for name in ["first", "second"] {
            timeline.subscribe(Rc::new(RefCell::new(Recorder {
                name,
                log: log.clone(),
            })));
        }

        timeline.start();
        timeline.change_date(date(2021, 2, 15));

        assert_eq!(
            *log.borrow(),
            vec![
                "first:start".to_string(),
                "second:start".to_string(),
                "first:date [2]".to_string(),
                "second:date [2]".to_string(),
            ]
        );
    }

    #[test]
    fn test_toggle_exclusion_is_self_inverse() {
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        assert_eq!(timeline.toggle_exclusion(StudyId(1)), Ok(true));
        assert!(timeline.studies().get(StudyId(1)).unwrap().is_excluded());
        assert_eq!(timeline.toggle_exclusion(StudyId(1)), Ok(false));
        assert!(!timeline.studies().get(StudyId(1)).unwrap().is_excluded());
    }

    #[test]
    fn test_toggle_unknown_study() {
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        assert_eq!(
            timeline.toggle_exclusion(StudyId(9)),
            Err(TimelineError::UnknownStudy(StudyId(9)))
        );
    }

    #[test]
    fn test_apply_intents() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timeline = Timeline::new(three_studies(), date(2021, 3, 1));
        timeline.subscribe(Rc::new(RefCell::new(Recorder {
            name: "a",
            log: log.clone(),
        })));

        timeline.apply(Intent::ToggleExclusion(StudyId(0))).unwrap();
        timeline.apply(Intent::ShowStudy(StudyId(2))).unwrap();
        timeline.apply(Intent::HideStudy).unwrap();
        timeline.apply(Intent::ChangeDate(date(2021, 1, 5))).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "a:exclude 0".to_string(),
                "a:show 2".to_string(),
                "a:hide".to_string(),
                "a:date [1, 2]".to_string(),
            ]
        );
    }

    fn published(timeline: &Timeline) -> Vec<bool> {
        timeline
            .studies()
            .iter()
            .map(|(_, study)| study.is_published())
            .collect()
    }

    proptest! {
        #[test]
        fn date_changes_keep_publish_flags_and_report_exact_flips(
            study_days in prop::collection::vec(0i64..365, 0..12),
            start_day in -30i64..400,
            moves in prop::collection::vec(-30i64..400, 1..20),
        ) {
            let origin = date(2020, 6, 1);
            let studies = study_days
                .iter()
                .enumerate()
                .map(|(i, day)| {
                    let url = format!("https://s/{}", i);
                    Study::new("Study", "Author", &url, origin + chrono::Duration::days(*day))
                })
                .collect();
            let mut timeline =
                Timeline::new(StudyRepository::new(studies), origin + chrono::Duration::days(start_day));
            assert_publish_invariant(&timeline);

            for day in moves {
                let before = published(&timeline);
                let mut changed = timeline.change_date(origin + chrono::Duration::days(day));
                assert_publish_invariant(&timeline);

                let after = published(&timeline);
                let expected: Vec<StudyId> = (0..before.len())
                    .filter(|i| before[*i] != after[*i])
                    .map(StudyId)
                    .collect();
                changed.sort_by_key(|id| id.0);
                prop_assert_eq!(changed, expected);
            }
        }
    }
}
