//! Timeline scrubber: maps drag positions and autoplay ticks to dates.
//!
//! The scrubber is the only component that produces [`Intent::ChangeDate`](super::Intent).
//! It owns no timer; the session calls [`Scrubber::tick`] on its poll interval
//! and passes the current instant so the arithmetic stays testable.

use std::time::{Duration, Instant};

use chrono::{Datelike, Months, NaiveDate};
use tracing::debug;

use crate::models::StudyId;
use crate::repository::StudyRepository;

/// Autoplay tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrubberSettings {
    /// How often the session polls [`Scrubber::tick`].
    pub poll_interval: Duration,
    /// Simulated hours advanced per real elapsed millisecond.
    pub hours_per_ms: f64,
}

impl Default for ScrubberSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            hours_per_ms: 1.0,
        }
    }
}

/// Which way a study's outcome points, for marker colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerTone {
    /// Outcome improved (lower risk).
    Lower,
    /// Outcome worsened.
    Higher,
    Neutral,
}

/// A study tick on the scrubber axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrubberMarker {
    pub study: StudyId,
    /// Position along the axis, 0-100.
    pub percent: f64,
    pub tone: MarkerTone,
}

/// A month label on the scrubber axis.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthLabel {
    pub label: String,
    pub percent: f64,
}

/// Result of one autoplay poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not playing; the poll loop should stop.
    Idle,
    /// Playing but a drag is in progress; poll again without moving.
    Held,
    /// Moved to this date; poll again.
    Advanced(NaiveDate),
    /// Reached the end and paused.
    Finished(NaiveDate),
}

/// Drag and autoplay driver for the timeline.
#[derive(Debug, Clone)]
pub struct Scrubber {
    settings: ScrubberSettings,
    start_date: NaiveDate,
    total_days: i64,
    min_days: i64,
    max_days: i64,
    cur_hour: f64,
    playing: bool,
    dragging: bool,
    prev_tick: Option<Instant>,
    markers: Vec<ScrubberMarker>,
    months: Vec<MonthLabel>,
}

fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn end_of_month(date: NaiveDate) -> NaiveDate {
    start_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

impl Scrubber {
    /// Build a scrubber spanning the given studies (in date order).
    ///
    /// The axis runs from the start of the first study's month to the end of
    /// the last study's month; positions are clamped between the first
    /// study's date and `today`. Returns `None` for an empty study list.
    pub fn new(
        studies: &StudyRepository,
        ids: &[StudyId],
        today: NaiveDate,
        settings: ScrubberSettings,
    ) -> Option<Self> {
        let first = ids.first().and_then(|id| studies.get(*id))?.date;
        let last = ids.last().and_then(|id| studies.get(*id))?.date;

        let start_date = start_of_month(first);
        let end_date = end_of_month(last);
        let total_days = (end_date - start_date).num_days().max(1);
        let min_days = (first - start_date).num_days();
        let max_days = (today - start_date).num_days().clamp(min_days, total_days);

        let markers = ids
            .iter()
            .filter_map(|id| studies.get(*id).map(|s| (*id, s)))
            .map(|(id, study)| {
                let day = (study.date - start_date).num_days();
                let tone = match study.primary_outcome.as_ref() {
                    Some(o) if o.improvement_percent > 0.0 => MarkerTone::Lower,
                    Some(o) if o.improvement_percent < 0.0 => MarkerTone::Higher,
                    _ => MarkerTone::Neutral,
                };
                ScrubberMarker {
                    study: id,
                    percent: day as f64 / total_days as f64 * 100.0,
                    tone,
                }
            })
            .collect();

        let month_count = (end_date.year() - start_date.year()) * 12
            + end_date.month() as i32
            - start_date.month() as i32
            + 1;
        let months = (0..month_count.max(0) as u32)
            .filter_map(|i| {
                let month = start_date.checked_add_months(Months::new(i))?;
                Some(MonthLabel {
                    label: month.format("%b").to_string(),
                    percent: i as f64 / month_count as f64 * 100.0,
                })
            })
            .collect();

        Some(Self {
            settings,
            start_date,
            total_days,
            min_days,
            max_days,
            cur_hour: (max_days * 24) as f64,
            playing: false,
            dragging: false,
            prev_tick: None,
            markers,
            months,
        })
    }

    pub fn settings(&self) -> &ScrubberSettings {
        &self.settings
    }

    pub fn markers(&self) -> &[ScrubberMarker] {
        &self.markers
    }

    pub fn months(&self) -> &[MonthLabel] {
        &self.months
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Position of the current-date marker, 0-100.
    pub fn marker_percent(&self) -> f64 {
        self.cur_hour / (self.total_days * 24) as f64 * 100.0
    }

    /// Date under the playhead.
    pub fn current_date(&self) -> NaiveDate {
        self.date_at_hour(self.cur_hour)
    }

    /// Latest date the scrubber can reach.
    pub fn max_date(&self) -> NaiveDate {
        self.start_date + chrono::Duration::days(self.max_days)
    }

    /// Date for a pointer at `fraction` (0-1) of the axis width, clamped.
    pub fn date_at_fraction(&self, fraction: f64) -> NaiveDate {
        self.start_date + chrono::Duration::days(self.days_at_fraction(fraction))
    }

    fn days_at_fraction(&self, fraction: f64) -> i64 {
        let days = (self.total_days as f64 * fraction).round() as i64;
        days.clamp(self.min_days, self.max_days)
    }

    fn date_at_hour(&self, hour: f64) -> NaiveDate {
        self.start_date + chrono::Duration::days((hour / 24.0).floor() as i64)
    }

    /// Pointer pressed on the axis. Autoplay is held until [`Self::drag_end`].
    pub fn drag_start(&mut self, fraction: f64) -> NaiveDate {
        self.dragging = true;
        self.seek(fraction)
    }

    /// Pointer moved while pressed.
    pub fn drag_to(&mut self, fraction: f64) -> Option<NaiveDate> {
        if !self.dragging {
            return None;
        }
        Some(self.seek(fraction))
    }

    /// Pointer released; autoplay resumes measuring from `now`.
    pub fn drag_end(&mut self, now: Instant) {
        self.dragging = false;
        self.prev_tick = Some(now);
    }

    fn seek(&mut self, fraction: f64) -> NaiveDate {
        let days = self.days_at_fraction(fraction);
        self.cur_hour = (days * 24) as f64;
        self.start_date + chrono::Duration::days(days)
    }

    /// Start autoplay. Returns a date when playback rewinds to the start.
    pub fn play(&mut self, now: Instant) -> Option<NaiveDate> {
        self.playing = true;
        self.prev_tick = Some(now);
        debug!("Autoplay started at hour {}", self.cur_hour);

        let max_hours = (self.max_days * 24) as f64;
        if self.cur_hour >= max_hours {
            self.cur_hour = (self.min_days * 24) as f64;
            return Some(self.current_date());
        }
        None
    }

    /// Stop autoplay. A later [`Self::tick`] reports [`Tick::Idle`].
    pub fn pause(&mut self) {
        if self.playing {
            debug!("Autoplay paused at hour {}", self.cur_hour);
        }
        self.playing = false;
    }

    /// Toggle autoplay.
    pub fn toggle_play(&mut self, now: Instant) -> Option<NaiveDate> {
        if self.playing {
            self.pause();
            None
        } else {
            self.play(now)
        }
    }

    /// Advance autoplay by the wall-clock time elapsed since the last tick.
    pub fn tick(&mut self, now: Instant) -> Tick {
        if !self.playing {
            return Tick::Idle;
        }
        if self.dragging {
            return Tick::Held;
        }

        let elapsed = self
            .prev_tick
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);
        self.prev_tick = Some(now);

        let max_hours = (self.max_days * 24) as f64;
        let delta_hours = elapsed.as_secs_f64() * 1000.0 * self.settings.hours_per_ms;
        self.cur_hour = (self.cur_hour + delta_hours).min(max_hours);
        let date = self.current_date();

        if self.cur_hour >= max_hours {
            self.pause();
            return Tick::Finished(date);
        }
        Tick::Advanced(date)
    }
}
