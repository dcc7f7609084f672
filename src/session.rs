//! One host page: repository, timeline, charts and the aggregation loop.
//!
//! A [`Page`] is built once per page load by [`Page::initialise`] and then
//! driven either by [`Page::handle`] directly or by [`Page::run`], which
//! multiplexes host events, aggregation results, autoplay ticks and
//! animation frames on the current task.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::charts::{BarChart, BoxPlot, Chart, ChartOptions, ForestPlot, StudySummary, SummaryView};
use crate::config::Settings;
use crate::error::{AggregationError, ChartError, IngestError, TimelineError};
use crate::hosts::{self, BoundGroups, ChartKind, ChartSpec, HostProfile};
use crate::models::{AggregationResponse, PooledSummary, StudyId};
use crate::render::ChartDocument;
use crate::repository::StudyRepository;
use crate::scrapers::{mark_included, scrape_studies, HttpClient};
use crate::services::Aggregator;
use crate::timeline::{Intent, Scrubber, Subscriber, Tick, Timeline};

/// Where the studies page comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudiesSource {
    /// GET the host's studies URL.
    Fetch,
    /// Already-loaded studies page markup.
    Markup(String),
}

/// Input from the host page.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Pointer pressed on the scrubber axis at `fraction` (0-1) of its width.
    ScrubStart { fraction: f64 },
    ScrubMove { fraction: f64 },
    ScrubEnd,
    TogglePlay,
    Pause,
    /// Click inside a chart, in SVG user coordinates.
    PointerClick { chart: String, x: f64, y: f64 },
    /// Pointer resting inside a chart, in SVG user coordinates.
    PointerHover { chart: String, x: f64, y: f64 },
    /// Pointer resting on a page link.
    LinkHover { href: String },
    PointerLeave,
}

/// A finished aggregation, routed back to the chart that asked for it.
#[derive(Debug)]
struct Completed {
    chart: usize,
    generation: u64,
    date: NaiveDate,
    result: Result<Vec<Option<PooledSummary>>, AggregationError>,
}

/// A bound page.
pub struct Page {
    hostname: String,
    settings: Settings,
    page: ChartDocument,
    timeline: Timeline,
    scrubber: Option<Scrubber>,
    charts: Vec<Rc<RefCell<dyn Chart>>>,
    summary: Rc<RefCell<StudySummary>>,
    aggregator: Arc<dyn Aggregator>,
    completed_tx: mpsc::UnboundedSender<Completed>,
    completed_rx: Option<mpsc::UnboundedReceiver<Completed>>,
    in_flight: usize,
}

impl Page {
    /// Bring up the page for a built-in host.
    pub async fn initialise(
        hostname: &str,
        page_markup: &str,
        source: StudiesSource,
        settings: Settings,
        aggregator: Arc<dyn Aggregator>,
        today: NaiveDate,
    ) -> anyhow::Result<Self> {
        let profile =
            hosts::profile(hostname).ok_or_else(|| IngestError::UnknownHost(hostname.to_string()))?;
        Self::with_profile(profile, page_markup, source, settings, aggregator, today).await
    }

    /// Bring up a page described by `profile`.
    ///
    /// Ingestion failures are fatal. A chart that fails to bind is logged and
    /// left out; the rest of the page still works.
    pub async fn with_profile(
        profile: HostProfile,
        page_markup: &str,
        source: StudiesSource,
        settings: Settings,
        aggregator: Arc<dyn Aggregator>,
        today: NaiveDate,
    ) -> anyhow::Result<Self> {
        let studies_url = settings
            .studies_url(profile.hostname, profile.studies_url)
            .to_string();

        let html = match source {
            StudiesSource::Markup(html) => html,
            StudiesSource::Fetch => {
                let client =
                    HttpClient::with_user_agent(settings.request_timeout(), settings.user_agent.as_deref())?;
                client
                    .fetch_studies_page(&studies_url)
                    .await
                    .with_context(|| format!("fetching studies for {}", profile.hostname))?
            }
        };

        let mut studies = StudyRepository::new(scrape_studies(&html, &studies_url)?);
        let page = ChartDocument::parse(page_markup);
        let in_analysis = mark_included(&page, profile.inclusion_selector, &mut studies)?;

        let scrubber = Scrubber::new(&studies, &in_analysis, today, settings.scrubber());
        let start = scrubber
            .as_ref()
            .map(Scrubber::current_date)
            .unwrap_or(today);
        let timeline = Timeline::new(studies, start);

        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let mut this = Self {
            hostname: profile.hostname.to_string(),
            settings,
            page,
            timeline,
            scrubber,
            charts: Vec::new(),
            summary: Rc::new(RefCell::new(StudySummary::new())),
            aggregator,
            completed_tx,
            completed_rx: Some(completed_rx),
            in_flight: 0,
        };

        let options = this.settings.chart_options(&this.hostname);
        let mut bound: HashMap<String, BoundGroups> = HashMap::new();
        for spec in &profile.charts {
            match this.bind_chart(spec, &options, &bound) {
                Ok(Some(groups)) => {
                    bound.insert(spec.selector.to_string(), groups);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping chart {}: {}", spec.selector, e),
            }
        }
        this.timeline.subscribe(this.summary.clone());

        info!(
            "{}: {} studies ({} in analysis), {} of {} charts bound",
            this.hostname,
            this.timeline.studies().len(),
            in_analysis.len(),
            this.charts.len(),
            profile.charts.len()
        );

        this.timeline.start();
        this.dispatch();
        Ok(this)
    }

    /// Build one chart from its fragment of the host page. `Ok(None)` when
    /// the fragment or a box plot's source groups are absent.
    fn bind_chart(
        &mut self,
        spec: &ChartSpec,
        options: &ChartOptions,
        bound: &HashMap<String, BoundGroups>,
    ) -> Result<Option<BoundGroups>, ChartError> {
        let Some(node) = self.page.select_first(spec.selector)? else {
            debug!("No markup for chart {}", spec.selector);
            return Ok(None);
        };
        let markup = self.page.render_node(node);
        let studies = self.timeline.studies();

        let groups = match &spec.kind {
            ChartKind::Bar => {
                let chart = BarChart::new(spec.selector, &markup, studies, options)?;
                self.attach(chart)
            }
            ChartKind::Forest(forest) => {
                let chart = ForestPlot::new(spec.selector, &markup, studies, forest, options)?;
                self.attach(chart)
            }
            ChartKind::Box {
                groups,
                requires_forest_groups,
            } => {
                if let Some((forest, count)) = requires_forest_groups {
                    let actual = bound.get(*forest).map(|b| b.groups.len());
                    if actual != Some(*count) {
                        debug!(
                            "Skipping {}: {} has {:?} groups, needs {}",
                            spec.selector, forest, actual, count
                        );
                        return Ok(None);
                    }
                }
                let Some(groups) = groups
                    .iter()
                    .map(|source| source.resolve(bound, studies))
                    .collect::<Option<Vec<_>>>()
                else {
                    debug!("Skipping {}: a source chart is missing", spec.selector);
                    return Ok(None);
                };
                let chart = BoxPlot::new(spec.selector, &markup, studies, groups, options)?;
                self.attach(chart)
            }
        };
        Ok(Some(groups))
    }

    fn attach<C: Chart + Subscriber + 'static>(&mut self, chart: C) -> BoundGroups {
        let groups = BoundGroups {
            studies: chart.studies(),
            groups: chart.groups(),
        };
        let chart = Rc::new(RefCell::new(chart));
        self.timeline.subscribe(chart.clone());
        self.charts.push(chart);
        groups
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn studies(&self) -> &StudyRepository {
        self.timeline.studies()
    }

    pub fn scrubber(&self) -> Option<&Scrubber> {
        self.scrubber.as_ref()
    }

    /// Selectors of the charts that bound, in subscription order.
    pub fn chart_names(&self) -> Vec<String> {
        self.charts
            .iter()
            .map(|chart| chart.borrow().name().to_string())
            .collect()
    }

    /// Current markup of a chart, for the host to swap in.
    pub fn render(&self, chart: &str) -> Option<String> {
        self.find_chart(chart).map(|c| c.borrow().render())
    }

    pub fn summary(&self) -> SummaryView {
        self.summary.borrow().view().clone()
    }

    /// Aggregations dispatched but not yet applied or discarded.
    pub fn pending_aggregations(&self) -> usize {
        self.in_flight
    }

    fn find_chart(&self, name: &str) -> Option<&Rc<RefCell<dyn Chart>>> {
        self.charts.iter().find(|c| c.borrow().name() == name)
    }

    // =========================================================================
    // Host events
    // =========================================================================

    /// Apply one host event. Must run inside a tokio runtime, since date
    /// changes dispatch aggregation tasks.
    pub fn handle(&mut self, event: HostEvent) -> Result<(), TimelineError> {
        let now = Instant::now();
        let intent = match event {
            HostEvent::ScrubStart { fraction } => self
                .scrubber
                .as_mut()
                .map(|s| Intent::ChangeDate(s.drag_start(fraction))),
            HostEvent::ScrubMove { fraction } => self
                .scrubber
                .as_mut()
                .and_then(|s| s.drag_to(fraction))
                .map(Intent::ChangeDate),
            HostEvent::ScrubEnd => {
                if let Some(scrubber) = self.scrubber.as_mut() {
                    scrubber.drag_end(now);
                }
                None
            }
            HostEvent::TogglePlay => self
                .scrubber
                .as_mut()
                .and_then(|s| s.toggle_play(now))
                .map(Intent::ChangeDate),
            HostEvent::Pause => {
                if let Some(scrubber) = self.scrubber.as_mut() {
                    scrubber.pause();
                }
                None
            }
            HostEvent::PointerClick { chart, x, y } => {
                self.hit_test(&chart, x, y).map(Intent::ToggleExclusion)
            }
            HostEvent::PointerHover { chart, x, y } => Some(
                self.hit_test(&chart, x, y)
                    .map(Intent::ShowStudy)
                    .unwrap_or(Intent::HideStudy),
            ),
            HostEvent::LinkHover { href } => {
                match StudySummary::resolve_link(&self.page, &href, self.timeline.studies()) {
                    Ok(study) => study.map(Intent::ShowStudy),
                    Err(e) => {
                        debug!("Ignoring hover on {}: {}", href, e);
                        None
                    }
                }
            }
            HostEvent::PointerLeave => Some(Intent::HideStudy),
        };

        if let Some(intent) = intent {
            self.timeline.apply(intent)?;
            self.dispatch();
        }
        Ok(())
    }

    fn hit_test(&self, chart: &str, x: f64, y: f64) -> Option<StudyId> {
        self.find_chart(chart)?
            .borrow()
            .hit_test(x, y, self.timeline.studies())
    }

    /// Advance autoplay to `now`.
    pub fn autoplay(&mut self, now: Instant) {
        let Some(scrubber) = self.scrubber.as_mut() else {
            return;
        };
        match scrubber.tick(now) {
            Tick::Advanced(date) => {
                self.timeline.change_date(date);
                self.dispatch();
            }
            Tick::Finished(date) => {
                info!("Autoplay reached {}", date);
                self.timeline.change_date(date);
                self.dispatch();
            }
            Tick::Idle | Tick::Held => {}
        }
    }

    /// Advance chart animations by one frame. Returns `true` while anything moves.
    pub fn animate(&mut self, elapsed: std::time::Duration) -> bool {
        let mut moving = false;
        for chart in &self.charts {
            moving |= chart.borrow_mut().animate(elapsed);
        }
        moving
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    /// Spawn a task for every aggregation request the charts queued.
    fn dispatch(&mut self) {
        for (index, chart) in self.charts.iter().enumerate() {
            let requests = chart.borrow_mut().take_requests();
            for request in requests {
                debug!(
                    "Dispatching aggregation for {} (generation {}, {} groups)",
                    chart.borrow().name(),
                    request.generation,
                    request.groups.len()
                );
                let aggregator = Arc::clone(&self.aggregator);
                let tx = self.completed_tx.clone();
                self.in_flight += 1;
                tokio::spawn(async move {
                    let groups = request.groups;
                    // A panic in the aggregator surfaces as a failed aggregation.
                    let call = tokio::spawn(async move { aggregator.summarize(groups).await });
                    let result = match call.await {
                        Ok(result) => result,
                        Err(e) => Err(AggregationError::Failed(format!(
                            "aggregation task failed: {}",
                            e
                        ))),
                    };
                    let _ = tx.send(Completed {
                        chart: index,
                        generation: request.generation,
                        date: request.date,
                        result,
                    });
                });
            }
        }
    }

    fn complete(&mut self, done: Completed) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Some(chart) = self.charts.get(done.chart) else {
            return;
        };
        match done.result {
            Ok(summaries) => {
                let response = AggregationResponse {
                    generation: done.generation,
                    date: done.date,
                    summaries,
                };
                chart
                    .borrow_mut()
                    .apply_summaries(response, self.timeline.studies());
            }
            Err(e) => warn!(
                "Aggregation for {} failed, keeping previous summary: {}",
                chart.borrow().name(),
                e
            ),
        }
    }

    /// Wait for every dispatched aggregation and apply the results.
    pub async fn settle(&mut self) {
        let Some(mut rx) = self.completed_rx.take() else {
            return;
        };
        while self.in_flight > 0 {
            match rx.recv().await {
                Some(done) => self.complete(done),
                None => break,
            }
        }
        self.completed_rx = Some(rx);
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Drive the page until the host closes `events`.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<HostEvent>) -> anyhow::Result<()> {
        let mut completed = self
            .completed_rx
            .take()
            .context("page event loop is already running")?;

        let mut autoplay = interval(self.settings.scrubber().poll_interval);
        autoplay.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = interval(self.settings.animation_frame());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle(event) {
                            warn!("Ignoring host event: {}", e);
                        }
                    }
                    None => break,
                },
                Some(done) = completed.recv() => self.complete(done),
                now = autoplay.tick() => self.autoplay(now.into_std()),
                now = frames.tick() => {
                    let now = now.into_std();
                    self.animate(now.saturating_duration_since(last_frame));
                    last_frame = now;
                }
            }
        }

        debug!("Host event channel closed for {}", self.hostname);
        self.completed_rx = Some(completed);
        Ok(())
    }
}
