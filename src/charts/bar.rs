//! Bar chart: one bar and one label per study, with an optional p-curve
//! reveal overlay clipped to the rightmost visible bar.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use super::{position, view_box, Chart, ChartOptions, DatedChart, HitBox};
use crate::error::ChartError;
use crate::models::StudyId;
use crate::render::path::horizontal_mid;
use crate::render::{ChartDocument, NodeHandle, Spring};
use crate::repository::StudyRepository;
use crate::timeline::{Subscriber, TimelineEvent};

const DEFAULT_VIEW_BOX: (f64, f64) = (1500.0, 500.0);
const LABEL_SLACK: f64 = 10.0;

static CLIP_COUNTER: AtomicUsize = AtomicUsize::new(0);

static DATE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z][a-z] \d\d?").expect("date label regex is valid"));

#[derive(Debug)]
struct Bar {
    study: StudyId,
    bar: NodeHandle,
    label: NodeHandle,
    mid_x: f64,
    hit_box: Option<HitBox>,
}

#[derive(Debug)]
struct PCurveLabel {
    node: NodeHandle,
    /// Right edge of the label.
    x: f64,
}

#[derive(Debug)]
struct PCurve {
    clip_rect: NodeHandle,
    spring: Spring,
    labels: Vec<PCurveLabel>,
}

/// A bar chart bound to its studies.
#[derive(Debug)]
pub struct BarChart {
    name: String,
    document: ChartDocument,
    dated: DatedChart,
    bars: Vec<Bar>,
    index: HashMap<StudyId, usize>,
    p_curve: Option<PCurve>,
    full_width: f64,
}

impl BarChart {
    /// Bind a bar chart. The n-th annotation link names the study of the n-th
    /// `.point` bar.
    pub fn new(
        name: &str,
        markup: &str,
        studies: &StudyRepository,
        options: &ChartOptions,
    ) -> Result<Self, ChartError> {
        let mut document = ChartDocument::parse(markup);

        let mut links = Vec::new();
        for annotation in document.select(".annotation")? {
            if let Some(link) = document.select_within(annotation, "a")?.into_iter().next() {
                links.push((annotation, link));
            }
        }

        let points = document.select(".point")?;
        if points.len() < links.len() {
            return Err(ChartError::StructuralMismatch(format!(
                "{} bars for {} labelled studies",
                points.len(),
                links.len()
            )));
        }

        let mut bars = Vec::with_capacity(links.len());
        for ((label, link), bar) in links.into_iter().zip(points) {
            let href = document
                .attr(link, "href")
                .ok_or(ChartError::MissingElement("bar label href"))?;
            let study = studies
                .find_by_url(&href)
                .ok_or_else(|| ChartError::MissingStudy(href.clone()))?;

            let path = document
                .select_within(bar, "path")?
                .into_iter()
                .next()
                .ok_or(ChartError::MissingElement("bar path"))?;
            let d = document.attr(path, "d").unwrap_or_default();
            let mid_x =
                horizontal_mid(&d).ok_or_else(|| ChartError::UnparsableGeometry(d.clone()))?;

            bars.push(Bar {
                study,
                bar,
                label,
                mid_x,
                hit_box: HitBox::of_path(&document, path),
            });
        }

        let (vb_width, vb_height) = view_box(&document)?.unwrap_or(DEFAULT_VIEW_BOX);
        let p_curve = Self::bind_p_curve(&mut document, options, vb_width, vb_height)?;
        let dated = DatedChart::bind(&document, &options.hostname)?;
        let index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.study, i))
            .collect();

        debug!(
            "Bound bar chart {} with {} bars (p-curve: {})",
            name,
            bars.len(),
            p_curve.is_some()
        );

        Ok(Self {
            name: name.to_string(),
            document,
            dated,
            bars,
            index,
            p_curve,
            full_width: vb_width,
        })
    }

    fn bind_p_curve(
        document: &mut ChartDocument,
        options: &ChartOptions,
        vb_width: f64,
        vb_height: f64,
    ) -> Result<Option<PCurve>, ChartError> {
        let curves = document.select(".scatterlayer .lines path")?;
        if curves.is_empty() {
            return Ok(None);
        }
        let defs = document
            .select_first("defs")?
            .ok_or(ChartError::MissingElement("defs"))?;

        let clip_id = format!("clippcurve{}", CLIP_COUNTER.fetch_add(1, Ordering::Relaxed) + 1);
        let width = vb_width.to_string();
        let height = vb_height.to_string();
        let clip_rect = document.create("rect", &[("width", &width), ("height", &height)]);
        let clip_path = document.create("clipPath", &[("id", &clip_id)]);
        document.append(clip_path, clip_rect)?;
        document.append(defs, clip_path)?;
        for curve in curves {
            document.set_attr(curve, "clip-path", format!("url(#{})", clip_id));
        }

        let element_width = options.element_width.unwrap_or(vb_width);
        let mut labels = Vec::new();
        for tspan in document.select("tspan.line")? {
            if !DATE_LABEL_RE.is_match(document.text(tspan).trim()) {
                continue;
            }
            let Some(group) = document.closest(tspan, ".cursor-pointer")? else {
                continue;
            };
            let Some((x, _)) = position(document, group) else {
                continue;
            };
            let rect_width = document
                .select_within(group, "rect")?
                .into_iter()
                .next()
                .and_then(|rect| document.attr(rect, "width"))
                .and_then(|w| w.parse::<f64>().ok());
            if let Some(rect_width) = rect_width {
                labels.push(PCurveLabel {
                    node: group,
                    x: x + rect_width / vb_width * element_width,
                });
            }
        }

        let mut spring = options.spring();
        spring.set_current_value(vb_width);

        Ok(Some(PCurve {
            clip_rect,
            spring,
            labels,
        }))
    }

    fn paint_bar(&mut self, index: usize, studies: &StudyRepository) {
        let Some(bar) = self.bars.get(index) else {
            return;
        };
        let Some(study) = studies.get(bar.study) else {
            return;
        };
        let doc = &mut self.document;

        if !study.is_published() {
            for node in [bar.bar, bar.label] {
                doc.set_style(node, "opacity", "0");
                doc.set_style(node, "pointer-events", "none");
            }
            return;
        }

        let excluded = study.is_excluded();
        doc.set_style(bar.bar, "opacity", if excluded { "0.3" } else { "1" });
        doc.set_style(bar.label, "opacity", if excluded { "0.7" } else { "1" });
        doc.set_style(
            bar.label,
            "text-decoration",
            if excluded { "line-through" } else { "none" },
        );
        for node in [bar.bar, bar.label] {
            doc.set_style(node, "pointer-events", "");
            doc.set_style(node, "cursor", "pointer");
        }
    }

    fn update_p_curve(&mut self, studies: &StudyRepository) {
        let Some(p_curve) = self.p_curve.as_mut() else {
            return;
        };

        let any_excluded = self.bars.iter().any(|bar| {
            studies.get(bar.study).is_some_and(|s| s.is_excluded())
        });
        if any_excluded {
            p_curve.spring.set_current_value(0.0);
            self.document.set_attr(p_curve.clip_rect, "width", "0");
            for label in &p_curve.labels {
                self.document.toggle_class(label.node, "hidden", true);
            }
            return;
        }

        let width = self
            .bars
            .iter()
            .filter(|bar| studies.is_eligible(bar.study))
            .map(|bar| bar.mid_x)
            .fold(0.0, f64::max);
        p_curve.spring.set_end_value(width);
        for label in &p_curve.labels {
            self.document
                .toggle_class(label.node, "hidden", label.x > width + LABEL_SLACK);
        }
    }

    /// Current width of the p-curve reveal, if the chart has one.
    pub fn p_curve_width(&self) -> Option<f64> {
        self.p_curve.as_ref().map(|p| p.spring.current_value())
    }

    /// Width the p-curve reveal is heading to.
    pub fn p_curve_target(&self) -> Option<f64> {
        self.p_curve.as_ref().map(|p| p.spring.end_value())
    }

    pub fn full_width(&self) -> f64 {
        self.full_width
    }
}

impl Subscriber for BarChart {
    fn on_event(&mut self, event: &TimelineEvent<'_>, studies: &StudyRepository) {
        match event {
            TimelineEvent::Started { .. } => {
                for i in 0..self.bars.len() {
                    self.paint_bar(i, studies);
                }
                self.update_p_curve(studies);
            }
            TimelineEvent::DateChanged { changed, .. } => {
                let touched: Vec<usize> = changed
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .collect();
                if !touched.is_empty() {
                    for i in touched {
                        self.paint_bar(i, studies);
                    }
                    self.update_p_curve(studies);
                }
            }
            TimelineEvent::ExclusionToggled { study } => {
                if let Some(i) = self.index.get(study).copied() {
                    self.paint_bar(i, studies);
                    self.update_p_curve(studies);
                }
            }
            TimelineEvent::StudyShown { .. } | TimelineEvent::StudyHidden => {}
        }
        self.dated.on_event(&mut self.document, event);
    }
}

impl Chart for BarChart {
    fn name(&self) -> &str {
        &self.name
    }

    fn document(&self) -> &ChartDocument {
        &self.document
    }

    fn studies(&self) -> Vec<StudyId> {
        self.bars.iter().map(|bar| bar.study).collect()
    }

    fn hit_test(&self, x: f64, y: f64, studies: &StudyRepository) -> Option<StudyId> {
        self.bars
            .iter()
            .filter(|bar| studies.get(bar.study).is_some_and(|s| s.is_published()))
            .find(|bar| bar.hit_box.is_some_and(|hit| hit.contains(x, y)))
            .map(|bar| bar.study)
    }

    fn animate(&mut self, elapsed: Duration) -> bool {
        let Some(p_curve) = self.p_curve.as_mut() else {
            return false;
        };
        let moving = p_curve.spring.advance(elapsed);
        self.document.set_attr(
            p_curve.clip_rect,
            "width",
            p_curve.spring.current_value().to_string(),
        );
        moving
    }
}
