//! Forest plot: one row per study grouped into summary bands, with pooled
//! diamonds recomputed through the aggregation boundary.

mod layout;

use std::collections::HashMap;
use std::iter;

use chrono::NaiveDate;
use tracing::debug;

use self::layout::{ArmCounts, Layout, SummaryBand};
use super::{Chart, ChartOptions, DatedChart, HitBox};
use crate::error::ChartError;
use crate::models::{AggregationRequest, AggregationResponse, PooledSummary, StudyId};
use crate::render::format::{percent0, thousands};
use crate::render::path::PathBuilder;
use crate::render::ChartDocument;
use crate::repository::StudyRepository;
use crate::timeline::{Subscriber, TimelineEvent};

const IMPROVEMENT_COLOUR: &str = "rgb(0, 117, 76)";
const WORSENING_COLOUR: &str = "rgb(158, 11, 0)";
const SUPERSCRIPT_TWO: &str = r#"<tspan style="font-size:70%" dy="-0.6em">2</tspan><tspan dy="0.42em">&ZeroWidthSpace;</tspan>"#;

/// Per-chart options beyond [`ChartOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForestOptions {
    /// Title text with a `%s` placeholder for the number of eligible rows.
    pub title: Option<String>,
}

impl ForestOptions {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
        }
    }
}

/// A forest plot bound to its studies.
#[derive(Debug)]
pub struct ForestPlot {
    name: String,
    document: ChartDocument,
    dated: DatedChart,
    layout: Layout,
    title_pattern: Option<String>,
    index: HashMap<StudyId, usize>,
    hit_boxes: Vec<Option<HitBox>>,
    final_study_date: Option<NaiveDate>,
    latest_date: Option<NaiveDate>,
    generation: u64,
    applied_generation: u64,
    outbox: Vec<AggregationRequest>,
}

impl ForestPlot {
    pub fn new(
        name: &str,
        markup: &str,
        studies: &StudyRepository,
        forest: &ForestOptions,
        options: &ChartOptions,
    ) -> Result<Self, ChartError> {
        let mut document = ChartDocument::parse(markup);
        let layout = Layout::bind(&mut document, studies, forest.title.as_deref())?;
        let dated = DatedChart::bind(&document, &options.hostname)?;

        let index = layout
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.study, i))
            .collect();
        let hit_boxes = layout
            .rows
            .iter()
            .map(|row| HitBox::of_path(&document, row.hitbox))
            .collect();
        let final_study_date = layout.rows.last().map(|row| row.date);

        debug!(
            chart = name,
            rows = layout.rows.len(),
            groups = layout.groups,
            summaries = layout.summaries.len(),
            "Bound forest plot"
        );

        Ok(Self {
            name: name.to_string(),
            document,
            dated,
            title_pattern: if layout.titles.is_empty() {
                None
            } else {
                forest.title.clone()
            },
            layout,
            index,
            hit_boxes,
            final_study_date,
            latest_date: None,
            generation: 0,
            applied_generation: 0,
            outbox: Vec::new(),
        })
    }

    /// Whether the last band pools every named group.
    fn has_combined_band(&self) -> bool {
        self.layout.summaries.len() > self.layout.groups
    }

    fn paint_row(&mut self, i: usize, studies: &StudyRepository) {
        let row = &self.layout.rows[i];
        let Some(study) = studies.get(row.study) else {
            return;
        };
        let doc = &mut self.document;
        let hidden = !study.is_published();
        let excluded = study.is_excluded();

        for node in iter::once(row.author)
            .chain(row.texts.iter().copied())
            .chain(row.points.iter().copied())
            .chain(row.paths.iter().copied())
            .chain(iter::once(row.hitbox))
        {
            doc.toggle_class(node, "hidden", hidden);
        }

        doc.set_style(
            row.author,
            "text-decoration",
            if excluded { "line-through" } else { "none" },
        );
        doc.set_style(row.author, "opacity", if excluded { "0.7" } else { "1" });
        for node in &row.texts {
            doc.set_style(*node, "opacity", if excluded { "0.3" } else { "1" });
        }
        for node in &row.points {
            doc.set_style(*node, "opacity", if excluded { "0.2" } else { "0.7" });
        }
        for node in &row.paths {
            doc.set_style(*node, "opacity", if excluded { "0.1" } else { "0.5" });
        }
        doc.set_style(
            row.hitbox,
            "cursor",
            if excluded { "crosshair" } else { "not-allowed" },
        );
    }

    /// Repaint rows, then refresh title, counts and queue a pooled request.
    fn update(&mut self, rows: &[usize], studies: &StudyRepository) {
        for i in rows {
            self.paint_row(*i, studies);
        }
        self.update_title(studies);
        self.update_counts(studies);
        self.queue_request(studies);
    }

    fn update_title(&mut self, studies: &StudyRepository) {
        let Some(pattern) = &self.title_pattern else {
            return;
        };
        let count = self
            .layout
            .rows
            .iter()
            .filter(|row| studies.is_eligible(row.study))
            .count();
        let count = if count > 0 {
            thousands(count as u64)
        } else {
            String::new()
        };
        let text = pattern.replace("%s", &count);
        for title in &self.layout.titles {
            self.document.set_text(*title, text.clone());
        }
    }

    fn update_counts(&mut self, studies: &StudyRepository) {
        let mut total = (ArmCounts::default(), ArmCounts::default());
        for group in 0..self.layout.groups {
            let mut counts = (ArmCounts::default(), ArmCounts::default());
            for row in self.layout.group_rows(group) {
                if studies.is_eligible(row.study) {
                    counts.0.add(row.treatment);
                    counts.1.add(row.control);
                }
            }
            total.0.add(counts.0);
            total.1.add(counts.1);
            self.paint_counts(group, counts);
        }
        if self.has_combined_band() {
            self.paint_counts(self.layout.summaries.len() - 1, total);
        }
    }

    fn paint_counts(&mut self, band: usize, (treatment, control): (ArmCounts, ArmCounts)) {
        let Some(summary) = self.layout.summaries.get(band) else {
            return;
        };
        let (treatment_text, control_text) = if treatment.number > 0 && control.number > 0 {
            (fraction(treatment), fraction(control))
        } else {
            (String::new(), String::new())
        };
        if let Some(node) = summary.treatment {
            self.document.set_text(node, treatment_text);
        }
        if let Some(node) = summary.control {
            self.document.set_text(node, control_text);
        }
    }

    fn queue_request(&mut self, studies: &StudyRepository) {
        let Some(date) = self.latest_date else {
            return;
        };
        let mut groups: Vec<Vec<_>> = (0..self.layout.groups)
            .map(|group| {
                self.layout
                    .group_rows(group)
                    .filter(|row| studies.is_eligible(row.study))
                    .filter_map(|row| row.effect)
                    .collect()
            })
            .collect();
        if self.has_combined_band() {
            groups.push(groups.concat());
        }

        self.generation += 1;
        debug!(
            chart = %self.name,
            generation = self.generation,
            %date,
            "Queued aggregation request"
        );
        self.outbox.push(AggregationRequest {
            generation: self.generation,
            date,
            groups,
        });
    }

    fn paint_band(
        &mut self,
        band: usize,
        summary: Option<PooledSummary>,
        date: NaiveDate,
        restore_heterogeneity: bool,
    ) {
        let combined = band >= self.layout.groups;
        let axis = self.layout.axis;
        let Some(target) = self.layout.summaries.get(band) else {
            return;
        };
        let doc = &mut self.document;

        let Some(summary) = summary else {
            for node in [target.percent, target.effect, Some(target.improvement)]
                .into_iter()
                .flatten()
            {
                doc.set_text(node, "");
            }
            doc.toggle_class(target.diamond, "hidden", true);
            if let Some(node) = target.heterogeneity {
                doc.set_text(node, "");
            }
            return;
        };

        if let Some(node) = target.heterogeneity {
            if restore_heterogeneity {
                doc.set_inner_html(node, target.original_heterogeneity.clone());
            } else {
                doc.set_inner_html(node, heterogeneity_markup(&summary, combined));
            }
        }

        let colour = if summary.is_improvement() {
            IMPROVEMENT_COLOUR
        } else {
            WORSENING_COLOUR
        };
        let percent = percent0((1.0 - summary.ratio) * 100.0);
        if let Some(node) = target.percent {
            doc.set_text(node, percent.clone());
        }
        if let Some(node) = target.effect {
            doc.set_text(
                node,
                format!(
                    "{:.2} [{:.2}-{:.2}]",
                    summary.ratio, summary.ci_lower, summary.ci_upper
                ),
            );
        }
        doc.set_text(target.improvement, format!("{} improvement", percent));
        doc.set_style(target.improvement, "fill", colour);

        doc.set_attr(target.diamond, "d", diamond_path(target, &summary, |v| axis.x(v)));
        doc.set_style(target.diamond, "stroke", colour);
        doc.set_style(
            target.diamond,
            "fill",
            if summary.is_significant() { colour } else { "none" },
        );
        doc.toggle_class(target.diamond, "hidden", false);
        debug!(chart = %self.name, band, %date, ratio = summary.ratio, "Painted pooled summary");
    }

    /// Rows in date order.
    pub fn row_studies(&self) -> Vec<StudyId> {
        self.layout.rows.iter().map(|row| row.study).collect()
    }

    pub fn summary_count(&self) -> usize {
        self.layout.summaries.len()
    }
}

fn fraction(counts: ArmCounts) -> String {
    format!("{}/{}", thousands(counts.events), thousands(counts.number))
}

fn heterogeneity_markup(summary: &PooledSummary, combined: bool) -> String {
    let mut markup = format!(
        "Tau&ZeroWidthSpace;{sup} = {:.2}; I&ZeroWidthSpace;{sup} = {:.1}%",
        summary.tau2,
        summary.i2,
        sup = SUPERSCRIPT_TWO
    );
    if combined && summary.z != 0.0 {
        markup.push_str(&format!("; Z = {:.2}", summary.z));
    }
    markup
}

fn diamond_path(band: &SummaryBand, summary: &PooledSummary, x: impl Fn(f64) -> f64) -> String {
    let (y1, y2, y3) = band.diamond_y;
    let (x1, x2, x3) = (x(summary.ci_lower), x(summary.ratio), x(summary.ci_upper));
    PathBuilder::new()
        .move_to(x1, y1)
        .line_to(x2, y2)
        .line_to(x3, y1)
        .line_to(x2, y3)
        .line_to(x1, y1)
        .build()
}

impl Subscriber for ForestPlot {
    fn on_event(&mut self, event: &TimelineEvent<'_>, studies: &StudyRepository) {
        match event {
            TimelineEvent::Started { date } => {
                self.latest_date = Some(*date);
                let all: Vec<usize> = (0..self.layout.rows.len()).collect();
                if self
                    .layout
                    .rows
                    .iter()
                    .all(|row| studies.is_eligible(row.study))
                {
                    // The source page already shows the full analysis.
                    for i in all {
                        self.paint_row(i, studies);
                    }
                } else {
                    self.update(&all, studies);
                }
            }
            TimelineEvent::DateChanged { date, changed, .. } => {
                let touched: Vec<usize> = changed
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .collect();
                if !touched.is_empty() {
                    self.latest_date = Some(*date);
                    self.update(&touched, studies);
                }
            }
            TimelineEvent::ExclusionToggled { study } => {
                if let Some(i) = self.index.get(study).copied() {
                    self.update(&[i], studies);
                }
            }
            TimelineEvent::StudyShown { .. } | TimelineEvent::StudyHidden => {}
        }
        self.dated.on_event(&mut self.document, event);
    }
}

impl Chart for ForestPlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn document(&self) -> &ChartDocument {
        &self.document
    }

    fn studies(&self) -> Vec<StudyId> {
        self.row_studies()
    }

    fn groups(&self) -> Vec<Vec<StudyId>> {
        (0..self.layout.groups)
            .map(|group| self.layout.group_rows(group).map(|row| row.study).collect())
            .collect()
    }

    fn hit_test(&self, x: f64, y: f64, studies: &StudyRepository) -> Option<StudyId> {
        self.layout
            .rows
            .iter()
            .zip(&self.hit_boxes)
            .filter(|(row, _)| studies.get(row.study).is_some_and(|s| s.is_published()))
            .find(|(_, hit)| hit.is_some_and(|hit| hit.contains(x, y)))
            .map(|(row, _)| row.study)
    }

    fn take_requests(&mut self) -> Vec<AggregationRequest> {
        std::mem::take(&mut self.outbox)
    }

    fn apply_summaries(&mut self, response: AggregationResponse, studies: &StudyRepository) -> bool {
        if response.generation <= self.applied_generation {
            debug!(
                chart = %self.name,
                generation = response.generation,
                applied = self.applied_generation,
                "Discarding stale aggregation response"
            );
            return false;
        }
        self.applied_generation = response.generation;

        let has_exclusions = self
            .layout
            .rows
            .iter()
            .any(|row| studies.get(row.study).is_some_and(|s| s.is_excluded()));
        let restore = !has_exclusions
            && self
                .final_study_date
                .is_some_and(|last| response.date >= last);

        for band in 0..self.layout.summaries.len() {
            let summary = response.summaries.get(band).copied().flatten();
            self.paint_band(band, summary, response.date, restore);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Study;
    use crate::timeline::Timeline;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn repo() -> StudyRepository {
        StudyRepository::new(vec![
            Study::new("A", "Alpha", "https://s/a", date(2021, 1, 1)),
            Study::new("B", "Beta", "https://s/b", date(2021, 2, 1)),
            Study::new("C", "Gamma", "https://s/c", date(2021, 3, 1)),
        ])
    }

    fn cell(x: u32, y: u32, text: &str) -> String {
        format!(
            r#"<g class="annotation"><g class="cursor-pointer" transform="translate({},{})"><text class="annotation-text">{}</text></g></g>"#,
            x, y, text
        )
    }

    fn row(y: u32, href: &str, author: &str, cells: [&str; 4]) -> String {
        let mut out = format!(
            r#"<g class="annotation"><g class="cursor-pointer" transform="translate(5,{})"><a xlink:href="{}"><rect height="20" width="80"></rect><text class="annotation-text">{}</text></a></g></g>"#,
            y, href, author
        );
        for (x, text) in [400, 500, 560, 620].into_iter().zip(cells) {
            out.push_str(&cell(x, y, text));
        }
        out
    }

    fn band(y: u32, improvement: &str, cells: [&str; 4], heterogeneity: &str) -> String {
        let mut out = format!(
            r#"<g class="annotation"><g class="cursor-pointer" transform="translate(5,{})"><rect height="20" width="80"></rect><text class="annotation-text"><tspan style="font-weight:bold">{}</tspan></text></g></g>"#,
            y, improvement
        );
        for (x, text) in [400, 500, 560, 620].into_iter().zip(cells) {
            out.push_str(&cell(x, y, text));
        }
        out.push_str(&cell(300, y + 16, heterogeneity));
        out
    }

    fn markup() -> String {
        let mut svg = String::from(
            r#"<div id="fig_fp"><svg viewBox="0 0 700 200"><rect width="700" height="200"></rect>
<g class="cartesianlayer"><g class="subplot xy"><g class="plot" transform="translate(100,20)">
<g class="scatterlayer"><g class="trace scatter"><g class="points">
<path class="point" transform="translate(50,15)" d="M3,0H-3Z"></path>
<path class="point" transform="translate(80,35)" d="M3,0H-3Z"></path>
<path class="point" transform="translate(60,80)" d="M3,0H-3Z"></path>
</g></g></g></g></g></g>
<g class="layer-subplot"><g class="shapelayer">
<path class="js-line" d="M120,80L150,75L180,80L150,85L120,80Z" style="stroke: rgb(0, 117, 76);"></path>
<path class="js-fill" d="M120,80L150,75L180,80L150,85Z"></path>
<path class="js-line" d="M120,120L150,115L180,120L150,125L120,120Z" style="stroke: rgb(0, 117, 76);"></path>
<path class="js-line" d="M120,150L150,145L180,150L150,155L120,150Z" style="stroke: rgb(0, 117, 76);"></path>
<path d="M130,40H190"></path>
<path d="M140,60H210"></path>
<path d="M120,100H200"></path>
<path d="M300,0V200"></path>
<path d="M100,0V200"></path>
</g></g>
<g class="infolayer">"#,
        );
        svg.push_str(
            r#"<g class="annotation"><g class="cursor-pointer" transform="translate(10,5)"><text class="annotation-text"><tspan style="font-weight:bold">All 3 ivermectin COVID-19 studies</tspan></text></g></g>"#,
        );
        svg.push_str(&cell(600, 0, "ivmmeta.com 3/1/21"));
        svg.push_str(&row(30, "https://s/a", "Alpha", ["0.40 [0.20-0.80]", "2/100", "5/100", "60%"]));
        svg.push_str(&row(50, "https://s/b", "Beta", ["0.80 [0.50-1.20]", "10/200", "12/210", "20%"]));
        svg.push_str(&band(
            70,
            "52% improvement",
            ["0.48 [0.30-0.77]", "12/300", "17/310", "52%"],
            "Tau2 = 0.10; I2 = 20.0%",
        ));
        svg.push_str(&row(90, "https://s/c", "Gamma", ["0.50 [0.30-0.90]", "3/1,000", "6/1,000", "50%"]));
        svg.push_str(&band(
            110,
            "50% improvement",
            ["0.50 [0.30-0.90]", "3/1,000", "6/1,000", "50%"],
            "Tau2 = 0.00; I2 = 0.0%",
        ));
        svg.push_str(&band(
            140,
            "51% improvement",
            ["0.49 [0.33-0.72]", "15/1,300", "23/1,310", "51%"],
            "Tau2 = 0.05; I2 = 10.0%",
        ));
        svg.push_str(r#"</g><g class="layer-above"></g></svg></div>"#);
        svg
    }

    fn setup() -> (Timeline, Rc<RefCell<ForestPlot>>) {
        let repo = repo();
        let chart = ForestPlot::new(
            "#fig_fp",
            &markup(),
            &repo,
            &ForestOptions::titled("All %s ivermectin COVID-19 studies"),
            &ChartOptions::new("ivmmeta.com"),
        )
        .unwrap();
        let chart = Rc::new(RefCell::new(chart));
        let mut timeline = Timeline::new(repo, date(2021, 3, 1));
        timeline.subscribe(chart.clone());
        timeline.start();
        (timeline, chart)
    }

    fn pooled(ratio: f64, lower: f64, upper: f64) -> PooledSummary {
        PooledSummary {
            ratio,
            ci_lower: lower,
            ci_upper: upper,
            tau2: 0.05,
            i2: 12.5,
            z: 2.5,
        }
    }

    #[test]
    fn test_binds_rows_groups_and_axis() {
        let (_timeline, chart) = setup();
        let chart = chart.borrow();
        assert_eq!(chart.layout.rows.len(), 3);
        assert_eq!(chart.summary_count(), 3);
        assert_eq!(chart.layout.groups, 2);
        assert_eq!(chart.groups(), vec![vec![StudyId(0), StudyId(1)], vec![StudyId(2)]]);
        assert_eq!(chart.layout.axis.x(1.0), 200.0);

        let first = &chart.layout.rows[0];
        assert_eq!(first.texts.len(), 4);
        assert_eq!(first.points.len(), 1);
        assert_eq!(first.paths.len(), 1);
        assert_eq!(first.treatment, ArmCounts { events: 2, number: 100 });
        assert_eq!(chart.layout.summaries[0].diamond_y, (80.0, 75.0, 85.0));
    }

    #[test]
    fn test_fills_removed_and_diamonds_filled() {
        let (_timeline, chart) = setup();
        let chart = chart.borrow();
        assert!(!chart.render().contains("js-fill"));
        let diamond = chart.layout.summaries[0].diamond;
        assert_eq!(
            chart.document.style(diamond, "fill").as_deref(),
            Some("rgb(0, 117, 76)")
        );
    }

    #[test]
    fn test_start_with_everything_eligible_keeps_source_values() {
        let (_timeline, chart) = setup();
        let mut chart = chart.borrow_mut();
        assert!(chart.take_requests().is_empty());
        let title = chart.layout.titles[0];
        assert_eq!(chart.document.text(title), "All 3 ivermectin COVID-19 studies");
    }

    #[test]
    fn test_date_change_hides_rows_and_requests_pooling() {
        let (mut timeline, chart) = setup();
        timeline.change_date(date(2021, 1, 15));
        let mut chart = chart.borrow_mut();

        let beta = &chart.layout.rows[1];
        assert!(chart.document.has_class(beta.author, "hidden"));
        assert!(chart.document.has_class(beta.hitbox, "hidden"));
        assert!(beta.texts.iter().all(|n| chart.document.has_class(*n, "hidden")));

        let title = chart.layout.titles[0];
        assert_eq!(chart.document.text(title), "All 1 ivermectin COVID-19 studies");

        let bands = &chart.layout.summaries;
        assert_eq!(chart.document.text(bands[0].treatment.unwrap()), "2/100");
        assert_eq!(chart.document.text(bands[0].control.unwrap()), "5/100");
        assert_eq!(chart.document.text(bands[1].treatment.unwrap()), "");
        assert_eq!(chart.document.text(bands[2].treatment.unwrap()), "2/100");

        let requests = chart.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].generation, 1);
        assert_eq!(requests[0].date, date(2021, 1, 15));
        let alpha = crate::models::EffectSize::new(0.4, 0.2, 0.8);
        assert_eq!(requests[0].groups, vec![vec![alpha], vec![], vec![alpha]]);
    }

    #[test]
    fn test_counts_use_thousands_separators() {
        let (mut timeline, chart) = setup();
        timeline.toggle_exclusion(StudyId(0)).unwrap();
        let chart = chart.borrow();
        let bands = &chart.layout.summaries;
        assert_eq!(chart.document.text(bands[0].treatment.unwrap()), "10/200");
        assert_eq!(chart.document.text(bands[2].treatment.unwrap()), "13/1,200");
        assert_eq!(chart.document.text(bands[2].control.unwrap()), "18/1,210");
    }

    #[test]
    fn test_apply_summaries_draws_diamonds() {
        let (mut timeline, chart) = setup();
        timeline.change_date(date(2021, 1, 15));
        let mut chart = chart.borrow_mut();
        let request = chart.take_requests().remove(0);

        let applied = chart.apply_summaries(
            AggregationResponse {
                generation: request.generation,
                date: request.date,
                summaries: vec![Some(pooled(0.4, 0.2, 0.8)), None, Some(pooled(1.2, 0.9, 1.6))],
            },
            timeline.studies(),
        );
        assert!(applied);

        let bands = &chart.layout.summaries;
        let doc = &chart.document;
        assert_eq!(
            doc.attr(bands[0].diamond, "d").as_deref(),
            Some("M40,80L80,75L160,80L80,85L40,80")
        );
        assert_eq!(doc.style(bands[0].diamond, "fill").as_deref(), Some(IMPROVEMENT_COLOUR));
        assert_eq!(doc.text(bands[0].percent.unwrap()), "60%");
        assert_eq!(doc.text(bands[0].effect.unwrap()), "0.40 [0.20-0.80]");
        assert_eq!(doc.text(bands[0].improvement), "60% improvement");
        let heterogeneity = doc.inner_html(bands[0].heterogeneity.unwrap());
        assert!(heterogeneity.contains("= 0.05; I"));
        assert!(heterogeneity.ends_with("= 12.5%"));

        assert!(doc.has_class(bands[1].diamond, "hidden"));
        assert_eq!(doc.text(bands[1].improvement), "");

        // Worse than null and not significant: red and hollow.
        assert_eq!(doc.style(bands[2].diamond, "stroke").as_deref(), Some(WORSENING_COLOUR));
        assert_eq!(doc.style(bands[2].diamond, "fill").as_deref(), Some("none"));
        assert_eq!(doc.text(bands[2].improvement), "-20% improvement");
        assert!(doc.inner_html(bands[2].heterogeneity.unwrap()).ends_with("; Z = 2.50"));
    }

    #[test]
    fn test_half_percent_rounds_up() {
        let (mut timeline, chart) = setup();
        timeline.change_date(date(2021, 1, 15));
        let mut chart = chart.borrow_mut();
        let request = chart.take_requests().remove(0);
        chart.apply_summaries(
            AggregationResponse {
                generation: request.generation,
                date: request.date,
                summaries: vec![Some(pooled(1.125, 0.9, 1.4)), None, Some(pooled(0.875, 0.7, 1.1))],
            },
            timeline.studies(),
        );

        let bands = &chart.layout.summaries;
        let doc = &chart.document;
        assert_eq!(doc.text(bands[0].percent.unwrap()), "-12%");
        assert_eq!(doc.text(bands[0].improvement), "-12% improvement");
        assert_eq!(doc.text(bands[2].percent.unwrap()), "13%");
        assert_eq!(doc.text(bands[2].improvement), "13% improvement");
    }

    #[test]
    fn test_stale_response_discarded() {
        let (mut timeline, chart) = setup();
        timeline.change_date(date(2021, 1, 15));
        timeline.change_date(date(2021, 2, 15));
        let mut chart = chart.borrow_mut();
        let requests = chart.take_requests();
        assert_eq!(requests.len(), 2);

        let respond = |request: &AggregationRequest| AggregationResponse {
            generation: request.generation,
            date: request.date,
            summaries: vec![Some(pooled(0.5, 0.3, 0.9)); request.groups.len()],
        };
        assert!(chart.apply_summaries(respond(&requests[1]), timeline.studies()));
        assert!(!chart.apply_summaries(respond(&requests[0]), timeline.studies()));
    }

    #[test]
    fn test_final_date_restores_source_heterogeneity() {
        let (mut timeline, chart) = setup();
        timeline.change_date(date(2021, 1, 15));
        timeline.change_date(date(2021, 3, 1));
        let mut chart = chart.borrow_mut();
        let request = chart.take_requests().pop().unwrap();
        chart.apply_summaries(
            AggregationResponse {
                generation: request.generation,
                date: request.date,
                summaries: vec![Some(pooled(0.5, 0.3, 0.9)); 3],
            },
            timeline.studies(),
        );
        let node = chart.layout.summaries[0].heterogeneity.unwrap();
        assert_eq!(chart.document.inner_html(node), "Tau2 = 0.10; I2 = 20.0%");
    }

    #[test]
    fn test_exclusion_is_self_inverse() {
        let (mut timeline, chart) = setup();
        let (author, hitbox) = {
            let chart = chart.borrow();
            let row = &chart.layout.rows[1];
            (
                chart.document.render_node(row.author),
                chart.document.render_node(row.hitbox),
            )
        };

        timeline.toggle_exclusion(StudyId(1)).unwrap();
        {
            let chart = chart.borrow();
            let row = &chart.layout.rows[1];
            assert_eq!(
                chart.document.style(row.author, "text-decoration").as_deref(),
                Some("line-through")
            );
            assert_eq!(chart.document.style(row.hitbox, "cursor").as_deref(), Some("crosshair"));
            assert_eq!(chart.document.style(row.points[0], "opacity").as_deref(), Some("0.2"));
        }

        timeline.toggle_exclusion(StudyId(1)).unwrap();
        let chart = chart.borrow();
        let row = &chart.layout.rows[1];
        assert_eq!(chart.document.render_node(row.author), author);
        assert_eq!(chart.document.render_node(row.hitbox), hitbox);
    }

    #[test]
    fn test_hit_test_on_row_hitboxes() {
        let (mut timeline, chart) = setup();
        assert_eq!(chart.borrow().hit_test(10.0, 40.0, timeline.studies()), Some(StudyId(0)));
        assert_eq!(chart.borrow().hit_test(650.0, 100.0, timeline.studies()), Some(StudyId(2)));

        timeline.change_date(date(2021, 1, 15));
        assert_eq!(chart.borrow().hit_test(650.0, 100.0, timeline.studies()), None);
        assert_eq!(chart.borrow().hit_test(10.0, 75.0, timeline.studies()), None);
    }

    #[test]
    fn test_unknown_study_fails() {
        let repo = StudyRepository::new(vec![Study::new("A", "Alpha", "https://s/a", date(2021, 1, 1))]);
        let err = ForestPlot::new(
            "#fig_fp",
            &markup(),
            &repo,
            &ForestOptions::default(),
            &ChartOptions::new("ivmmeta.com"),
        )
        .unwrap_err();
        assert!(matches!(err, ChartError::MissingStudy(href) if href == "https://s/b"));
    }
}
