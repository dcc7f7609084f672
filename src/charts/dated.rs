//! Date decoration shared by every chart: a tinted background and a label
//! that follows the timeline date.

use chrono::NaiveDate;

use crate::error::ChartError;
use crate::render::format::short_date;
use crate::render::{ChartDocument, NodeHandle};
use crate::timeline::TimelineEvent;

const BACKGROUND_FILL: &str = "#f7eaf7";
const BACKGROUND_OPACITY: &str = "0.3";

/// Background tint plus `hostname M/d/yy` label.
#[derive(Debug, Clone)]
pub struct DatedChart {
    hostname: String,
    background: Option<NodeHandle>,
    label: Option<NodeHandle>,
}

impl DatedChart {
    /// Locate the background rect and the last annotation text starting with
    /// `hostname`. Both are optional.
    pub fn bind(doc: &ChartDocument, hostname: &str) -> Result<Self, ChartError> {
        let background = doc.select_first("svg rect")?;
        let label = doc
            .select(".annotation-text")?
            .into_iter()
            .filter(|node| doc.text(*node).starts_with(hostname))
            .last();

        Ok(Self {
            hostname: hostname.to_string(),
            background,
            label,
        })
    }

    pub fn on_event(&self, doc: &mut ChartDocument, event: &TimelineEvent<'_>) {
        match event {
            TimelineEvent::Started { date } => {
                if let Some(background) = self.background {
                    doc.set_style(background, "fill", BACKGROUND_FILL);
                    doc.set_style(background, "fill-opacity", BACKGROUND_OPACITY);
                }
                self.paint_label(doc, *date);
            }
            TimelineEvent::DateChanged { date, .. } => self.paint_label(doc, *date),
            _ => {}
        }
    }

    fn paint_label(&self, doc: &mut ChartDocument, date: NaiveDate) {
        if let Some(label) = self.label {
            doc.set_text(label, format!("{} {}", self.hostname, short_date(date)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r#"<div><svg><rect class="bg" style="fill: white"></rect><g class="infolayer"><g class="annotation"><text class="annotation-text">ivmmeta.com 1/1/21</text></g></g></svg></div>"#;

    #[test]
    fn test_start_paints_background_and_label() {
        let mut doc = ChartDocument::parse(SVG);
        let dated = DatedChart::bind(&doc, "ivmmeta.com").unwrap();
        assert!(dated.label.is_some());

        let date = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        dated.on_event(&mut doc, &TimelineEvent::Started { date });

        let rect = doc.select_first("rect").unwrap().unwrap();
        assert_eq!(doc.style(rect, "fill").as_deref(), Some("#f7eaf7"));
        assert_eq!(doc.style(rect, "fill-opacity").as_deref(), Some("0.3"));
        let label = doc.select_first(".annotation-text").unwrap().unwrap();
        assert_eq!(doc.text(label), "ivmmeta.com 3/4/21");
    }

    #[test]
    fn test_date_change_updates_label() {
        let mut doc = ChartDocument::parse(SVG);
        let dated = DatedChart::bind(&doc, "ivmmeta.com").unwrap();
        let date = NaiveDate::from_ymd_opt(2020, 12, 25).unwrap();
        dated.on_event(
            &mut doc,
            &TimelineEvent::DateChanged {
                date,
                previous: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                changed: &[],
            },
        );
        let label = doc.select_first(".annotation-text").unwrap().unwrap();
        assert_eq!(doc.text(label), "ivmmeta.com 12/25/20");
    }

    #[test]
    fn test_other_host_has_no_label() {
        let mut doc = ChartDocument::parse(SVG);
        let dated = DatedChart::bind(&doc, "hcqmeta.com").unwrap();
        assert!(dated.label.is_none());

        let date = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        dated.on_event(&mut doc, &TimelineEvent::Started { date });
        let label = doc.select_first(".annotation-text").unwrap().unwrap();
        assert_eq!(doc.text(label), "ivmmeta.com 1/1/21");
    }
}
