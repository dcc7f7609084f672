//! Binding a rendered forest plot: summary bands, study rows and the x axis.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::super::{position, view_box};
use crate::error::ChartError;
use crate::models::{EffectSize, StudyId};
use crate::render::format::parse_count;
use crate::render::path::{last_pair_y, parse_path, start_x, PathBuilder};
use crate::render::{ChartDocument, NodeHandle};
use crate::repository::StudyRepository;

const DEFAULT_VIEW_BOX_WIDTH: f64 = 700.0;
const BOLD_TSPAN: &str = r#"tspan[style="font-weight:bold"]"#;
const HITBOX_STYLE: &str = "opacity: 0; cursor: not-allowed;";

static EFFECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([.\d]+) \[([.\d]+)-([.\d]+)\]").expect("effect regex is valid")
});
static PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([,\d]+)/([,\d]+)").expect("pair regex is valid"));
static TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([,\d]+)$").expect("total regex is valid"));
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+)%$").expect("percent regex is valid"));

/// Events over sample size for one arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmCounts {
    pub events: u64,
    pub number: u64,
}

impl ArmCounts {
    pub fn add(&mut self, other: ArmCounts) {
        self.events += other.events;
        self.number += other.number;
    }
}

/// Text cells recognised in a row or summary band.
#[derive(Debug, Default)]
pub(super) struct Cells {
    pub effect: Option<(EffectSize, NodeHandle)>,
    pub treatment: Option<(ArmCounts, NodeHandle)>,
    pub control: Option<(ArmCounts, NodeHandle)>,
    pub percent: Option<(i64, NodeHandle)>,
}

impl Cells {
    /// Classify cells by their text. The first effect-size cell wins; the
    /// first count cell is the treatment arm, the second the control arm.
    pub fn parse(doc: &ChartDocument, nodes: &[NodeHandle]) -> Self {
        let mut cells = Cells::default();
        for node in nodes {
            let text = doc.text(*node);

            if cells.effect.is_none() {
                if let Some(effect) = parse_effect(&text) {
                    cells.effect = Some((effect, *node));
                    continue;
                }
            }

            if cells.treatment.is_none() || cells.control.is_none() {
                let counts = PAIR_RE
                    .captures(&text)
                    .and_then(|c| {
                        Some(ArmCounts {
                            events: parse_count(c.get(1)?.as_str())?,
                            number: parse_count(c.get(2)?.as_str())?,
                        })
                    })
                    .or_else(|| {
                        TOTAL_RE.captures(&text).and_then(|c| {
                            Some(ArmCounts {
                                events: 0,
                                number: parse_count(c.get(1)?.as_str())?,
                            })
                        })
                    });
                if let Some(counts) = counts {
                    if cells.treatment.is_none() {
                        cells.treatment = Some((counts, *node));
                    } else {
                        cells.control = Some((counts, *node));
                    }
                    continue;
                }
            }

            if cells.percent.is_none() {
                if let Some(percent) = PERCENT_RE
                    .captures(&text)
                    .and_then(|c| c.get(1)?.as_str().parse().ok())
                {
                    cells.percent = Some((percent, *node));
                }
            }
        }
        cells
    }
}

fn parse_effect(text: &str) -> Option<EffectSize> {
    let caps = EFFECT_RE.captures(text)?;
    Some(EffectSize::new(
        caps.get(1)?.as_str().parse().ok()?,
        caps.get(2)?.as_str().parse().ok()?,
        caps.get(3)?.as_str().parse().ok()?,
    ))
}

/// A pre-rendered summary band: pooled texts, diamond and heterogeneity line.
#[derive(Debug)]
pub(super) struct SummaryBand {
    pub y: f64,
    pub improvement: NodeHandle,
    pub percent: Option<NodeHandle>,
    pub effect: Option<NodeHandle>,
    pub treatment: Option<NodeHandle>,
    pub control: Option<NodeHandle>,
    pub heterogeneity: Option<NodeHandle>,
    pub original_heterogeneity: String,
    pub diamond: NodeHandle,
    /// Left/right tip y, top y and bottom y of the diamond.
    pub diamond_y: (f64, f64, f64),
}

/// One study row.
#[derive(Debug)]
pub(super) struct Row {
    pub study: StudyId,
    pub date: NaiveDate,
    pub group: usize,
    pub y: f64,
    pub height: f64,
    pub author: NodeHandle,
    pub texts: Vec<NodeHandle>,
    pub points: Vec<NodeHandle>,
    pub paths: Vec<NodeHandle>,
    pub hitbox: NodeHandle,
    pub effect: Option<EffectSize>,
    pub treatment: ArmCounts,
    pub control: ArmCounts,
}

/// Maps effect sizes onto the diamond's x coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Axis {
    pub unity_x: f64,
    pub offset: f64,
}

impl Axis {
    pub fn x(&self, value: f64) -> f64 {
        value * self.unity_x - self.offset
    }
}

#[derive(Debug)]
pub(super) struct Layout {
    pub titles: Vec<NodeHandle>,
    pub summaries: Vec<SummaryBand>,
    pub rows: Vec<Row>,
    /// Number of named groups; a trailing band beyond them is the combined one.
    pub groups: usize,
    pub axis: Axis,
    pub svg_width: f64,
}

fn required_position(doc: &ChartDocument, node: NodeHandle) -> Result<(f64, f64), ChartError> {
    position(doc, node).ok_or_else(|| {
        ChartError::UnparsableGeometry(doc.attr(node, "transform").unwrap_or_default())
    })
}

fn rect_height(doc: &ChartDocument, group: NodeHandle) -> Result<Option<f64>, ChartError> {
    Ok(doc
        .select_within(group, "rect")?
        .into_iter()
        .next()
        .and_then(|rect| doc.attr(rect, "height"))
        .and_then(|h| h.parse().ok()))
}

/// Element siblings of `node` matching `css`.
fn siblings(doc: &ChartDocument, node: NodeHandle, css: &str) -> Result<Vec<NodeHandle>, ChartError> {
    let Some(parent) = doc.parent(node) else {
        return Ok(Vec::new());
    };
    Ok(doc
        .select_within(parent, css)?
        .into_iter()
        .filter(|n| *n != node && doc.parent(*n) == Some(parent))
        .collect())
}

/// Y of the first `.cursor-pointer` inside `annotation`.
fn annotation_y(doc: &ChartDocument, annotation: NodeHandle) -> Result<Option<f64>, ChartError> {
    Ok(doc
        .select_within(annotation, ".cursor-pointer")?
        .into_iter()
        .next()
        .and_then(|g| position(doc, g))
        .map(|(_, y)| y))
}

fn diamond_y(d: &str) -> Option<(f64, f64, f64)> {
    let vertices: Vec<f64> = parse_path(d)?
        .into_iter()
        .filter(|s| s.command == 'M' || s.command == 'L')
        .flat_map(|s| s.args.chunks_exact(2).map(|p| p[1]).collect::<Vec<_>>())
        .collect();
    Some((*vertices.first()?, *vertices.get(1)?, *vertices.get(3)?))
}

impl Layout {
    /// Bind the plot's structure, creating one hitbox per row.
    pub fn bind(
        doc: &mut ChartDocument,
        studies: &StudyRepository,
        title_pattern: Option<&str>,
    ) -> Result<Self, ChartError> {
        let svg_width = view_box(doc)?
            .map(|(w, _)| w)
            .unwrap_or(DEFAULT_VIEW_BOX_WIDTH);

        let titles = match title_pattern {
            Some(pattern) => {
                let re = Regex::new(&regex::escape(pattern).replace("%s", r"([\d,]+)"))
                    .map_err(|e| ChartError::InvalidSelector(e.to_string()))?;
                doc.select(BOLD_TSPAN)?
                    .into_iter()
                    .filter(|node| re.is_match(&doc.text(*node)))
                    .collect()
            }
            None => Vec::new(),
        };

        let diamonds = Self::prepare_diamonds(doc)?;
        let summaries = Self::bind_summaries(doc, &diamonds)?;
        let axis = Self::bind_axis(doc)?;
        let (plot_y, points, paths) = Self::plot_marks(doc)?;

        let layer_above = doc
            .select_first(".layer-above")?
            .ok_or(ChartError::MissingElement(".layer-above"))?;

        let mut rows = Vec::new();
        for rect in doc.select(".annotation a rect")? {
            let link = doc
                .closest(rect, "a")?
                .ok_or(ChartError::MissingElement("row link"))?;
            let href = doc
                .attr(link, "href")
                .ok_or(ChartError::MissingElement("row link href"))?;
            let study = studies
                .find_by_url(&href)
                .ok_or_else(|| ChartError::MissingStudy(href.clone()))?;
            let date = studies
                .get(study)
                .map(|s| s.date)
                .ok_or_else(|| ChartError::MissingStudy(href.clone()))?;

            let group_node = doc
                .closest(link, ".cursor-pointer")?
                .ok_or(ChartError::MissingElement("row .cursor-pointer"))?;
            let (_, y) = required_position(doc, group_node)?;
            let height: f64 = doc
                .attr(rect, "height")
                .and_then(|h| h.parse().ok())
                .ok_or(ChartError::MissingElement("row rect height"))?;

            let group = summaries
                .iter()
                .position(|s| s.y > y)
                .ok_or_else(|| {
                    ChartError::StructuralMismatch(format!("row for {} below last summary", href))
                })?;

            let hitbox_d = PathBuilder::new()
                .move_to(0.0, y)
                .horizontal(svg_width)
                .vertical(y + height)
                .horizontal(0.0)
                .build();
            let hitbox = doc.create("path", &[("d", &hitbox_d), ("style", HITBOX_STYLE)]);
            doc.append(layer_above, hitbox)?;

            let author = doc
                .closest(group_node, ".annotation")?
                .ok_or(ChartError::MissingElement("row .annotation"))?;
            let mut texts = Vec::new();
            for sibling in siblings(doc, author, ".annotation")? {
                let Some(sy) = annotation_y(doc, sibling)? else {
                    continue;
                };
                if sy < y - 1.0 || sy > y + height / 2.0 {
                    continue;
                }
                doc.set_style(sibling, "pointer-events", "none");
                texts.push(sibling);
            }

            let mut cell_nodes = vec![author];
            cell_nodes.extend(texts.iter().copied());
            let cells = Cells::parse(doc, &cell_nodes);

            let in_row = |py: f64| py >= y + 2.0 && py <= y + height - 1.0;
            let row_points = points
                .iter()
                .find(|(_, py)| in_row(*py + plot_y))
                .map(|(node, _)| *node)
                .into_iter()
                .collect();
            let row_paths = paths
                .iter()
                .filter(|(_, py)| in_row(*py))
                .map(|(node, _)| *node)
                .collect();

            rows.push(Row {
                study,
                date,
                group,
                y,
                height,
                author,
                texts,
                points: row_points,
                paths: row_paths,
                hitbox,
                effect: cells.effect.map(|(e, _)| e),
                treatment: cells.treatment.map(|(c, _)| c).unwrap_or_default(),
                control: cells.control.map(|(c, _)| c).unwrap_or_default(),
            });
        }

        rows.sort_by_key(|row| row.date);

        let mut groups = summaries.len();
        if groups > 0 && !rows.iter().any(|row| row.group == groups - 1) {
            groups -= 1;
        }

        Ok(Self {
            titles,
            summaries,
            rows,
            groups,
            axis,
            svg_width,
        })
    }

    /// Drop the separate fill glyphs and let each diamond fill itself.
    fn prepare_diamonds(doc: &mut ChartDocument) -> Result<Vec<NodeHandle>, ChartError> {
        let fills = doc.select(".js-fill")?;
        let diamonds = doc.select(".js-line")?;
        for diamond in &diamonds {
            let fill = if fills.is_empty() {
                "none".to_string()
            } else {
                doc.style(*diamond, "stroke")
                    .or_else(|| doc.attr(*diamond, "stroke"))
                    .unwrap_or_else(|| "none".to_string())
            };
            doc.set_style(*diamond, "fill", fill);
        }
        for fill in fills {
            doc.remove(fill);
        }
        Ok(diamonds)
    }

    fn bind_summaries(
        doc: &ChartDocument,
        diamonds: &[NodeHandle],
    ) -> Result<Vec<SummaryBand>, ChartError> {
        let heterogeneity: Vec<NodeHandle> = doc
            .select(".annotation-text, tspan.line")?
            .into_iter()
            .filter(|node| doc.text(*node).starts_with("Tau"))
            .collect();

        let mut summaries: Vec<SummaryBand> = Vec::new();
        for tspan in doc.select(BOLD_TSPAN)? {
            if !doc.text(tspan).ends_with("improvement") {
                continue;
            }
            let group = doc
                .closest(tspan, ".cursor-pointer")?
                .ok_or(ChartError::MissingElement("summary .cursor-pointer"))?;
            let (_, y) = required_position(doc, group)?;
            let height = rect_height(doc, group)?.unwrap_or(0.0);

            let mut cell_nodes = Vec::new();
            if let Some(annotation) = doc.closest(group, ".annotation")? {
                for sibling in siblings(doc, annotation, ".annotation")? {
                    for pointer in doc.select_within(sibling, ".cursor-pointer")? {
                        let Some((_, py)) = position(doc, pointer) else {
                            continue;
                        };
                        if py >= y && py < y + height {
                            cell_nodes.extend(doc.select_within(pointer, ".annotation-text")?);
                        }
                    }
                }
            }
            let cells = Cells::parse(doc, &cell_nodes);

            let index = summaries.len();
            let diamond = diamonds
                .get(index)
                .copied()
                .ok_or(ChartError::MissingElement("summary diamond"))?;
            let d = doc.attr(diamond, "d").unwrap_or_default();
            let diamond_y = diamond_y(&d).ok_or(ChartError::UnparsableGeometry(d))?;

            let heterogeneity = heterogeneity.get(index).copied();
            summaries.push(SummaryBand {
                y,
                improvement: tspan,
                percent: cells.percent.map(|(_, n)| n),
                effect: cells.effect.map(|(_, n)| n),
                treatment: cells.treatment.map(|(_, n)| n),
                control: cells.control.map(|(_, n)| n),
                original_heterogeneity: heterogeneity
                    .map(|n| doc.inner_html(n))
                    .unwrap_or_default(),
                heterogeneity,
                diamond,
                diamond_y,
            });
        }
        Ok(summaries)
    }

    /// Reference lines: the last shape is the null-effect line, the one before
    /// it the unity line.
    fn bind_axis(doc: &ChartDocument) -> Result<Axis, ChartError> {
        let plot = doc
            .select_first(".plot")?
            .ok_or(ChartError::MissingElement(".plot"))?;
        let (plot_x, _) = required_position(doc, plot)?;

        let shapes = doc.select(".layer-subplot .shapelayer path")?;
        let line_x = |node: Option<&NodeHandle>, what: &'static str| -> Result<f64, ChartError> {
            let node = node.ok_or(ChartError::MissingElement(what))?;
            let d = doc.attr(*node, "d").unwrap_or_default();
            start_x(&d).ok_or(ChartError::UnparsableGeometry(d))
        };
        let zero_x = line_x(shapes.last(), "null-effect line")?;
        let unity_x = line_x(shapes.len().checked_sub(2).and_then(|i| shapes.get(i)), "unity line")?;

        Ok(Axis {
            unity_x: unity_x - zero_x,
            offset: plot_x - zero_x,
        })
    }

    /// Plot y offset, plotted points with their local y, shape paths with y.
    #[allow(clippy::type_complexity)]
    fn plot_marks(
        doc: &ChartDocument,
    ) -> Result<(f64, Vec<(NodeHandle, f64)>, Vec<(NodeHandle, f64)>), ChartError> {
        let plot = doc
            .select_first(".plot")?
            .ok_or(ChartError::MissingElement(".plot"))?;
        let (_, plot_y) = required_position(doc, plot)?;

        let points = doc
            .select_within(plot, ".points .point")?
            .into_iter()
            .filter_map(|node| position(doc, node).map(|(_, y)| (node, y)))
            .collect();
        let paths = doc
            .select(".layer-subplot .shapelayer path")?
            .into_iter()
            .filter_map(|node| {
                let d = doc.attr(node, "d")?;
                last_pair_y(&d).map(|y| (node, y))
            })
            .collect();
        Ok((plot_y, points, paths))
    }

    /// Rows in a named group, in date order.
    pub fn group_rows(&self, group: usize) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(move |row| row.group == group)
    }
}
