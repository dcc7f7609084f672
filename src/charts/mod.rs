//! Visualizations bound to pre-rendered chart markup.
//!
//! Each chart parses its own fragment into a [`ChartDocument`], joins the
//! markup against the [`StudyRepository`] at construction (failing with a
//! [`ChartError`] on any mismatch), and afterwards repaints only the studies
//! named by each [`TimelineEvent`](crate::timeline::TimelineEvent).

mod bar;
mod box_plot;
mod dated;
mod forest;
pub mod stats;
mod summary;

pub use bar::BarChart;
pub use box_plot::BoxPlot;
pub use dated::DatedChart;
pub use forest::{ForestOptions, ForestPlot};
pub use summary::{StudySummary, SummaryView};

use std::time::Duration;

use crate::error::ChartError;
use crate::models::{AggregationRequest, AggregationResponse, StudyId};
use crate::render::path::{self, parse_translate};
use crate::render::{ChartDocument, NodeHandle, Spring, SpringConfig};
use crate::repository::StudyRepository;

/// Per-page options shared by every chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    /// Hostname shown on the dated label, e.g. `ivmmeta.com`.
    pub hostname: String,
    /// Rendered pixel width of the chart container, when the host knows it.
    pub element_width: Option<f64>,
    pub spring: SpringConfig,
    pub overshoot_clamping: bool,
}

impl ChartOptions {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            element_width: None,
            spring: SpringConfig::from_origami(150.0, 10.0),
            overshoot_clamping: true,
        }
    }

    pub(crate) fn spring(&self) -> Spring {
        Spring::new(self.spring, self.overshoot_clamping)
    }
}

/// Operations the page performs on a bound chart besides event delivery.
pub trait Chart {
    /// Selector the chart was bound from.
    fn name(&self) -> &str;

    fn document(&self) -> &ChartDocument;

    /// Studies bound to the chart, in chart order.
    fn studies(&self) -> Vec<StudyId>;

    /// Study groups the chart displays. Single-group charts return one group.
    fn groups(&self) -> Vec<Vec<StudyId>> {
        vec![self.studies()]
    }

    /// Study under a point in SVG user coordinates, if it can be toggled.
    fn hit_test(&self, _x: f64, _y: f64, _studies: &StudyRepository) -> Option<StudyId> {
        None
    }

    /// Advance running animations. Returns `true` while anything still moves.
    fn animate(&mut self, _elapsed: Duration) -> bool {
        false
    }

    /// Drain aggregation requests queued by the last repaint.
    fn take_requests(&mut self) -> Vec<AggregationRequest> {
        Vec::new()
    }

    /// Apply pooled results. Returns `false` if the response was stale.
    fn apply_summaries(&mut self, _response: AggregationResponse, _studies: &StudyRepository) -> bool {
        false
    }

    /// Current markup with all edits applied.
    fn render(&self) -> String {
        self.document().render()
    }
}

/// Width and height of the first `svg` viewBox.
pub(crate) fn view_box(doc: &ChartDocument) -> Result<Option<(f64, f64)>, ChartError> {
    let Some(svg) = doc.select_first("svg")? else {
        return Ok(None);
    };
    let Some(view_box) = doc.attr(svg, "viewBox") else {
        return Ok(None);
    };
    let parts: Vec<f64> = view_box
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect();
    if parts.len() != 4 {
        return Ok(None);
    }
    Ok(Some((parts[2] - parts[0], parts[3] - parts[1])))
}

/// `translate()` of an element's own transform attribute.
pub(crate) fn position(doc: &ChartDocument, node: NodeHandle) -> Option<(f64, f64)> {
    doc.attr(node, "transform")
        .as_deref()
        .and_then(parse_translate)
}

/// Sum of the translations applied by `node`'s ancestors.
pub(crate) fn ancestor_offset(doc: &ChartDocument, node: NodeHandle) -> (f64, f64) {
    let mut offset = (0.0, 0.0);
    let mut current = doc.parent(node);
    while let Some(parent) = current {
        if let Some((x, y)) = position(doc, parent) {
            offset.0 += x;
            offset.1 += y;
        }
        current = doc.parent(parent);
    }
    offset
}

/// Axis-aligned box of a path in SVG user coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HitBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl HitBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Bounds of an absolute path, shifted by the ancestors' translations.
    pub fn of_path(doc: &ChartDocument, node: NodeHandle) -> Option<Self> {
        let d = doc.attr(node, "d")?;
        let (min_x, min_y, max_x, max_y) = path::bounds(&d)?;
        let (dx, dy) = ancestor_offset(doc, node);
        Some(Self {
            min_x: min_x + dx,
            min_y: min_y + dy,
            max_x: max_x + dx,
            max_y: max_y + dy,
        })
    }
}
