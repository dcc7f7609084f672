//! Box plot: per-group median, quartile box and whiskers over the x
//! positions of the currently eligible studies.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tracing::debug;

use super::stats::BoxStats;
use super::{ancestor_offset, position, view_box, Chart, ChartOptions, DatedChart};
use crate::error::ChartError;
use crate::models::StudyId;
use crate::render::path::{parse_band, translate, PathBuilder};
use crate::render::{ChartDocument, NodeHandle, Spring};
use crate::repository::StudyRepository;
use crate::timeline::{Subscriber, TimelineEvent};

const DEFAULT_VIEW_BOX_WIDTH: f64 = 1000.0;
const POINT_HIT_RADIUS: f64 = 6.0;

#[derive(Debug)]
struct BoxPoint {
    study: StudyId,
    node: NodeHandle,
    x: f64,
    /// Position in SVG user coordinates, for hit testing.
    centre: (f64, f64),
}

#[derive(Debug)]
struct GroupGlyphs {
    marker: NodeHandle,
    spring: Spring,
    bar_y: f64,
    y1: f64,
    y2: f64,
    zero_x: f64,
    lower_bar: NodeHandle,
    higher_bar: NodeHandle,
    iqr_lower: NodeHandle,
    iqr_higher: NodeHandle,
}

/// A box plot over caller-supplied study groups.
#[derive(Debug)]
pub struct BoxPlot {
    name: String,
    document: ChartDocument,
    dated: DatedChart,
    /// Groups in caller order.
    group_ids: Vec<Vec<StudyId>>,
    /// Points per trace. Traces are drawn in reverse group order.
    traces: Vec<Vec<BoxPoint>>,
    glyphs: Vec<GroupGlyphs>,
    stats: Vec<Option<BoxStats>>,
    /// Study -> (trace, point) positions. A study may sit in several groups.
    index: HashMap<StudyId, Vec<(usize, usize)>>,
}

impl BoxPlot {
    /// Bind a box plot. Trace `i` holds the points of group `len - 1 - i`,
    /// in group order, and the `i`-th median marker belongs to trace `i`.
    pub fn new(
        name: &str,
        markup: &str,
        studies: &StudyRepository,
        groups: Vec<Vec<StudyId>>,
        options: &ChartOptions,
    ) -> Result<Self, ChartError> {
        let mut document = ChartDocument::parse(markup);
        let zero_x = view_box(&document)?
            .map(|(w, _)| w)
            .unwrap_or(DEFAULT_VIEW_BOX_WIDTH)
            / 2.0;

        let layer_subplot = document
            .select_first(".layer-subplot")?
            .ok_or(ChartError::MissingElement(".layer-subplot"))?;
        let scatters = document.select(".trace.scatter")?;
        let markers = document.select(".layer-above .shapelayer path")?;

        let mut traces = Vec::with_capacity(groups.len());
        let mut glyphs = Vec::with_capacity(groups.len());
        for (trace_index, group) in groups.iter().rev().enumerate() {
            let scatter = scatters.get(trace_index).copied().ok_or_else(|| {
                ChartError::StructuralMismatch(format!("no scatter trace {}", trace_index))
            })?;
            let points = document.select_within(scatter, ".point")?;
            if points.len() != group.len() {
                return Err(ChartError::StructuralMismatch(format!(
                    "trace {} has {} points for {} studies",
                    trace_index,
                    points.len(),
                    group.len()
                )));
            }

            let marker = markers.get(trace_index).copied().ok_or_else(|| {
                ChartError::StructuralMismatch(format!("no median marker {}", trace_index))
            })?;
            glyphs.push(Self::bind_glyphs(&mut document, marker, zero_x, options)?);

            let mut trace = Vec::with_capacity(group.len());
            for (study, node) in group.iter().zip(points) {
                if studies.get(*study).is_none() {
                    return Err(ChartError::MissingStudy(study.to_string()));
                }
                let transform = document.attr(node, "transform").unwrap_or_default();
                let (x, y) = position(&document, node)
                    .ok_or(ChartError::UnparsableGeometry(transform))?;
                let (dx, dy) = ancestor_offset(&document, node);
                trace.push(BoxPoint {
                    study: *study,
                    node,
                    x,
                    centre: (x + dx, y + dy),
                });
            }
            traces.push(trace);
        }

        for glyph in &glyphs {
            for node in [glyph.iqr_lower, glyph.iqr_higher, glyph.lower_bar, glyph.higher_bar] {
                document.append(layer_subplot, node)?;
            }
        }
        for shapes in document.select_within(layer_subplot, ".shapelayer")? {
            document.set_style(shapes, "display", "none");
        }

        let mut index: HashMap<StudyId, Vec<(usize, usize)>> = HashMap::new();
        for (t, trace) in traces.iter().enumerate() {
            for (p, point) in trace.iter().enumerate() {
                index.entry(point.study).or_default().push((t, p));
            }
        }

        let dated = DatedChart::bind(&document, &options.hostname)?;
        debug!("Bound box plot {} with {} groups", name, groups.len());

        Ok(Self {
            name: name.to_string(),
            document,
            dated,
            stats: vec![None; traces.len()],
            group_ids: groups,
            traces,
            glyphs,
            index,
        })
    }

    fn bind_glyphs(
        document: &mut ChartDocument,
        marker: NodeHandle,
        zero_x: f64,
        options: &ChartOptions,
    ) -> Result<GroupGlyphs, ChartError> {
        let d = document.attr(marker, "d").unwrap_or_default();
        let band = parse_band(&d).ok_or(ChartError::UnparsableGeometry(d))?;
        let half = band.width() / 2.0;
        let centre = band.x1.min(band.x2) + half;

        // Draw the marker around the origin and move it with a transform.
        let centred = PathBuilder::new()
            .move_to(-half, band.y1)
            .horizontal(half)
            .vertical(band.y2)
            .horizontal(-half)
            .close()
            .build();
        document.set_attr(marker, "d", centred);
        document.set_attr(marker, "transform", translate(centre, 0.0));

        let mut spring = options.spring();
        spring.set_current_value(centre);

        Ok(GroupGlyphs {
            marker,
            spring,
            bar_y: band.mid_y(),
            y1: band.y1,
            y2: band.y2,
            zero_x,
            lower_bar: document.create("path", &[("class", "lower-bar")]),
            higher_bar: document.create("path", &[("class", "higher-bar")]),
            iqr_lower: document.create("path", &[("class", "iqr-lower")]),
            iqr_higher: document.create("path", &[("class", "iqr-higher")]),
        })
    }

    fn paint_point(&mut self, trace: usize, point: usize, studies: &StudyRepository) {
        let Some(point) = self.traces.get(trace).and_then(|t| t.get(point)) else {
            return;
        };
        let Some(study) = studies.get(point.study) else {
            return;
        };
        let opacity = match (study.is_published(), study.is_excluded()) {
            (false, _) => "0",
            (true, true) => "0.3",
            (true, false) => "1",
        };
        self.document.set_style(point.node, "opacity", opacity);
    }

    fn update_group(&mut self, trace: usize, studies: &StudyRepository) {
        let Some(points) = self.traces.get(trace) else {
            return;
        };
        let values: Vec<f64> = points
            .iter()
            .filter(|p| studies.is_eligible(p.study))
            .map(|p| p.x)
            .collect();
        let stats = BoxStats::from_values(&values);
        let Some(glyph) = self.glyphs.get_mut(trace) else {
            return;
        };
        let doc = &mut self.document;
        self.stats[trace] = stats;

        let Some(s) = stats else {
            doc.set_style(glyph.marker, "opacity", "0");
            for node in [glyph.lower_bar, glyph.higher_bar, glyph.iqr_lower, glyph.iqr_higher] {
                doc.toggle_class(node, "hidden", true);
            }
            return;
        };

        let zero = glyph.zero_x;
        if s.min < zero {
            let d = PathBuilder::new()
                .move_to(s.min, glyph.bar_y)
                .line_to(s.max.min(zero), glyph.bar_y)
                .build();
            doc.set_attr(glyph.lower_bar, "d", d);
        }
        doc.toggle_class(glyph.lower_bar, "hidden", s.min >= zero);

        if s.max > zero {
            let d = PathBuilder::new()
                .move_to(s.min.max(zero), glyph.bar_y)
                .line_to(s.max, glyph.bar_y)
                .build();
            doc.set_attr(glyph.higher_bar, "d", d);
        }
        doc.toggle_class(glyph.higher_bar, "hidden", s.max <= zero);

        glyph.spring.set_end_value(s.median);
        doc.set_style(glyph.marker, "opacity", "1");
        doc.toggle_class(glyph.marker, "median-lower", s.median < zero);
        doc.toggle_class(glyph.marker, "median-higher", s.median > zero);

        if s.q1 < zero {
            let x2 = s.q3.min(zero);
            let d = PathBuilder::new()
                .move_to(s.q1, glyph.y1)
                .horizontal(x2)
                .vertical(glyph.y2)
                .horizontal(s.q1)
                .build();
            doc.set_attr(glyph.iqr_lower, "d", d);
        }
        doc.toggle_class(glyph.iqr_lower, "hidden", s.q1 >= zero);

        if s.q3 > zero {
            let x1 = s.q1.max(zero);
            let d = PathBuilder::new()
                .move_to(x1, glyph.y1)
                .horizontal(s.q3)
                .vertical(glyph.y2)
                .horizontal(x1)
                .build();
            doc.set_attr(glyph.iqr_higher, "d", d);
        }
        doc.toggle_class(glyph.iqr_higher, "hidden", s.q3 <= zero);
    }

    fn repaint(&mut self, changed: &[StudyId], studies: &StudyRepository) {
        let mut touched = BTreeSet::new();
        for id in changed {
            let Some(positions) = self.index.get(id).cloned() else {
                continue;
            };
            for (trace, point) in positions {
                self.paint_point(trace, point, studies);
                touched.insert(trace);
            }
        }
        for trace in touched {
            self.update_group(trace, studies);
        }
    }

    /// Summary statistics of a group, by caller group index.
    pub fn group_stats(&self, group: usize) -> Option<BoxStats> {
        let trace = self.group_ids.len().checked_sub(group + 1)?;
        self.stats.get(trace).copied().flatten()
    }

    /// Current animated median position of a group, by caller group index.
    pub fn median_position(&self, group: usize) -> Option<f64> {
        let trace = self.group_ids.len().checked_sub(group + 1)?;
        self.glyphs.get(trace).map(|g| g.spring.current_value())
    }
}

impl Subscriber for BoxPlot {
    fn on_event(&mut self, event: &TimelineEvent<'_>, studies: &StudyRepository) {
        match event {
            TimelineEvent::Started { .. } => {
                for trace in 0..self.traces.len() {
                    for point in 0..self.traces[trace].len() {
                        self.paint_point(trace, point, studies);
                    }
                    self.update_group(trace, studies);
                }
            }
            TimelineEvent::DateChanged { changed, .. } => self.repaint(changed, studies),
            TimelineEvent::ExclusionToggled { study } => self.repaint(&[*study], studies),
            TimelineEvent::StudyShown { .. } | TimelineEvent::StudyHidden => {}
        }
        self.dated.on_event(&mut self.document, event);
    }
}

impl Chart for BoxPlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn document(&self) -> &ChartDocument {
        &self.document
    }

    fn studies(&self) -> Vec<StudyId> {
        let mut seen = BTreeSet::new();
        self.group_ids
            .iter()
            .flatten()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }

    fn groups(&self) -> Vec<Vec<StudyId>> {
        self.group_ids.clone()
    }

    fn hit_test(&self, x: f64, y: f64, studies: &StudyRepository) -> Option<StudyId> {
        self.traces
            .iter()
            .flatten()
            .filter(|p| studies.get(p.study).is_some_and(|s| s.is_published()))
            .find(|p| {
                let (px, py) = p.centre;
                (px - x).hypot(py - y) <= POINT_HIT_RADIUS
            })
            .map(|p| p.study)
    }

    fn animate(&mut self, elapsed: Duration) -> bool {
        let mut moving = false;
        for glyph in &mut self.glyphs {
            if glyph.spring.advance(elapsed) {
                moving = true;
            }
            self.document.set_attr(
                glyph.marker,
                "transform",
                translate(glyph.spring.current_value(), 0.0),
            );
        }
        moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Study;
    use crate::timeline::Timeline;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn repo() -> StudyRepository {
        StudyRepository::new(vec![
            Study::new("A", "A", "https://s/a", date(2021, 1, 1)).with_stage("early"),
            Study::new("B", "B", "https://s/b", date(2021, 2, 1)).with_stage("early"),
            Study::new("C", "C", "https://s/c", date(2021, 3, 1)).with_stage("late"),
            Study::new("D", "D", "https://s/d", date(2021, 4, 1)).with_stage("early"),
        ])
    }

    // Trace 0 is the "all" group (4 points), trace 1 the "early" group (3 points).
    const SVG: &str = r#"<div><svg viewBox="0 0 200 100">
<g class="cartesianlayer"><g class="subplot xy"><g class="layer-subplot"><g class="shapelayer"><path d="M0,0H1"></path></g></g>
<g class="plot" transform="translate(0,0)"><g class="scatterlayer">
<g class="trace scatter"><g class="points">
<path class="point" transform="translate(40,70)"></path>
<path class="point" transform="translate(80,70)"></path>
<path class="point" transform="translate(150,70)"></path>
<path class="point" transform="translate(120,70)"></path>
</g></g>
<g class="trace scatter"><g class="points">
<path class="point" transform="translate(40,30)"></path>
<path class="point" transform="translate(80,30)"></path>
<path class="point" transform="translate(120,30)"></path>
</g></g>
</g></g></g></g>
<g class="layer-above"><g class="shapelayer">
<path d="M95,80H105V60H95Z"></path>
<path d="M60,40H70V20H60Z"></path>
</g></g>
</svg></div>"#;

    fn setup() -> (Timeline, Rc<RefCell<BoxPlot>>) {
        let repo = repo();
        let early = vec![StudyId(0), StudyId(1), StudyId(3)];
        let all = vec![StudyId(0), StudyId(1), StudyId(2), StudyId(3)];
        let plot = BoxPlot::new("#fig_plotsp", SVG, &repo, vec![early, all], &ChartOptions::new("x"))
            .unwrap();
        let plot = Rc::new(RefCell::new(plot));
        let mut timeline = Timeline::new(repo, date(2021, 4, 1));
        timeline.subscribe(plot.clone());
        timeline.start();
        (timeline, plot)
    }

    #[test]
    fn test_point_count_mismatch_fails() {
        let repo = repo();
        let err = BoxPlot::new(
            "#fig",
            SVG,
            &repo,
            vec![vec![StudyId(0)], vec![StudyId(0)]],
            &ChartOptions::new("x"),
        )
        .unwrap_err();
        assert!(matches!(err, ChartError::StructuralMismatch(_)));
    }

    #[test]
    fn test_initial_stats() {
        let (_timeline, plot) = setup();
        let plot = plot.borrow();
        let early = plot.group_stats(0).unwrap();
        assert_eq!(early.median, 80.0);
        assert_eq!(early.q1, 60.0);
        assert_eq!(early.q3, 100.0);

        let all = plot.group_stats(1).unwrap();
        assert_eq!(all.median, 100.0);
        assert!(all.q1 <= all.median && all.median <= all.q3);
    }

    #[test]
    fn test_marker_recentred() {
        let (_timeline, plot) = setup();
        let plot = plot.borrow();
        let marker = plot.glyphs[1].marker;
        assert_eq!(plot.document.attr(marker, "d").as_deref(), Some("M-5,40H5V20H-5Z"));
        assert_eq!(plot.glyphs[1].bar_y, 30.0);
    }

    #[test]
    fn test_whiskers_split_at_zero_line() {
        let (_timeline, plot) = setup();
        let plot = plot.borrow();
        let g = &plot.glyphs[1];
        assert_eq!(plot.document.attr(g.lower_bar, "d").as_deref(), Some("M40,30L100,30"));
        assert_eq!(plot.document.attr(g.higher_bar, "d").as_deref(), Some("M100,30L120,30"));
        assert_eq!(plot.document.attr(g.iqr_lower, "d").as_deref(), Some("M60,40H100V20H60"));
        // q3 sits exactly on the zero line
        assert!(plot.document.has_class(g.iqr_higher, "hidden"));
        assert!(plot.document.has_class(g.marker, "median-lower"));
    }

    #[test]
    fn test_fewer_than_two_points_hides_glyphs() {
        let (mut timeline, plot) = setup();
        timeline.change_date(date(2021, 1, 15));
        let plot = plot.borrow();
        assert_eq!(plot.group_stats(0), None);
        let g = &plot.glyphs[1];
        assert_eq!(plot.document.style(g.marker, "opacity").as_deref(), Some("0"));
        for node in [g.lower_bar, g.higher_bar, g.iqr_lower, g.iqr_higher] {
            assert!(plot.document.has_class(node, "hidden"));
        }
    }

    #[test]
    fn test_exclusion_removes_point_from_quantiles() {
        let (mut timeline, plot) = setup();
        timeline.toggle_exclusion(StudyId(3)).unwrap();
        assert_eq!(plot.borrow().group_stats(0).unwrap().median, 60.0);

        timeline.toggle_exclusion(StudyId(1)).unwrap();
        assert_eq!(plot.borrow().group_stats(0), None);

        timeline.toggle_exclusion(StudyId(1)).unwrap();
        timeline.toggle_exclusion(StudyId(3)).unwrap();
        assert_eq!(plot.borrow().group_stats(0).unwrap().median, 80.0);
    }

    #[test]
    fn test_median_marker_animates() {
        let (mut timeline, plot) = setup();
        timeline.toggle_exclusion(StudyId(3)).unwrap();
        let mut plot = plot.borrow_mut();
        for _ in 0..500 {
            plot.animate(Duration::from_millis(16));
        }
        assert_eq!(plot.median_position(0), Some(60.0));
        let marker = plot.glyphs[1].marker;
        assert_eq!(plot.document.attr(marker, "transform").as_deref(), Some("translate(60,0)"));
    }

    #[test]
    fn test_shapes_hidden_and_glyphs_appended() {
        let (_timeline, plot) = setup();
        let out = plot.borrow().render();
        assert!(out.contains(r#"class="shapelayer" style="display: none;""#));
        assert!(out.contains(r#"class="iqr-lower"#));
        assert!(out.contains(r#"class="higher-bar"#));
    }
}
