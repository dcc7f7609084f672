//! Scraping study records from a host's studies page.
//!
//! The page is one large table. A study spans consecutive `<tr>` rows whose
//! ids share a prefix after the first character; the row holding a `.date`
//! cell opens the study.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::error::IngestError;
use crate::models::{Outcome, Study, StudyFeature};

static PREPRINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"preprint\s(\d\d?/\d\d?(?:/\d\d?)?)").expect("preprint regex is valid")
});
static AUTHORS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+) authors?\b").expect("authors regex is valid"));
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d)%").expect("percent regex is valid"));
static P_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d*\.?\d+)").expect("p-value regex is valid"));
static META_ANALYSIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmeta analysis\b").expect("meta analysis regex is valid"));

/// Study design keywords, checked against the info and summary text.
static NON_RANDOMIZED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnon-randomized\b").expect("design regex is valid"));
static CLUSTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcluster randomized|cluster rct\b").expect("design regex is valid")
});
static RCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brandomized controlled trial|rct\b").expect("design regex is valid")
});
static RETROSPECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bretrospective\b").expect("design regex is valid"));
static PROSPECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)prospective\b").expect("design regex is valid"));
static DOUBLE_BLIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdouble blind\b").expect("design regex is valid"));
static SINGLE_BLIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)single blind\b").expect("design regex is valid"));
static PSM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpropensity score|psm\b").expect("design regex is valid")
});
static PEER_REVIEWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpeer[\s-]?reviewed\b").expect("design regex is valid"));
static PREPRINT_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpre-?print\b").expect("design regex is valid"));

fn selector(source: &str) -> Result<Selector, IngestError> {
    Selector::parse(source).map_err(|_| IngestError::InvalidSelector(source.to_string()))
}

/// Compiled selectors used while scraping one page.
struct Selectors {
    date: Selector,
    author: Selector,
    ainfo: Selector,
    summary: Selector,
    title: Selector,
    link: Selector,
    outcome: Selector,
    worse: Selector,
    stage: Selector,
    xref: Selector,
}

impl Selectors {
    fn new() -> Result<Self, IngestError> {
        Ok(Self {
            date: selector(".date")?,
            author: selector(".author")?,
            ainfo: selector(".ainfo")?,
            summary: selector(".xsummary")?,
            title: selector(".xtitle")?,
            link: selector(".xstage .ul a")?,
            outcome: selector(".outcome")?,
            worse: selector(".worse")?,
            stage: selector(".stage")?,
            xref: selector(".xref")?,
        })
    }
}

/// Rows belonging to one study.
struct StudyRows<'a> {
    rows: Vec<ElementRef<'a>>,
}

impl<'a> StudyRows<'a> {
    fn find(&self, sel: &Selector) -> impl Iterator<Item = ElementRef<'a>> + '_ {
        let sel = sel.clone();
        self.rows
            .iter()
            .flat_map(move |row| row.select(&sel).collect::<Vec<_>>())
    }

    fn first(&self, sel: &Selector) -> Option<ElementRef<'a>> {
        self.find(sel).next()
    }

    fn text(&self, sel: &Selector) -> String {
        self.find(sel).map(|el| el.text().collect::<String>()).collect()
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Parse `M/d/y`; two-digit years are taken as 20yy.
pub fn parse_us_date(text: &str) -> Option<NaiveDate> {
    let mut parts = text.trim().split('/').map(|p| p.trim().parse::<i32>());
    let month = parts.next()?.ok()?;
    let day = parts.next()?.ok()?;
    let mut year = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

/// Scrape every study on a studies page. `base_url` is the page URL that
/// relative study links are joined to.
pub fn scrape_studies(html: &str, base_url: &str) -> Result<Vec<Study>, IngestError> {
    let document = Html::parse_document(html);
    let selectors = Selectors::new()?;
    let base_url = base_url.trim_end_matches('/');

    let mut studies = Vec::new();
    let mut seen = HashSet::new();

    for date_cell in document.select(&selectors.date) {
        let Some(first_row) = date_cell.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let Some(id) = first_row.value().attr("id") else {
            continue;
        };
        let prefix: String = id.chars().skip(1).collect();

        let mut rows = vec![first_row];
        let continuation = first_row
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|row| {
                row.value()
                    .attr("id")
                    .is_some_and(|id| id.chars().skip(1).collect::<String>().starts_with(&prefix))
            });
        rows.extend(continuation);

        let Some(study) = scrape_study(&StudyRows { rows }, base_url, &selectors) else {
            debug!("Skipping unparsable study row {}", id);
            continue;
        };
        if seen.insert(study.details_url.clone()) {
            studies.push(study);
        }
    }

    if studies.is_empty() {
        return Err(IngestError::NoStudies);
    }

    studies.sort_by_key(|s| s.date);
    info!("Scraped {} studies from {}", studies.len(), base_url);
    Ok(studies)
}

/// Absolute links are kept; anything else is appended to the studies URL.
fn details_url(base_url: &str, href: &str) -> String {
    if Url::parse(href).is_ok() {
        href.to_string()
    } else {
        format!("{}/{}", base_url, href.trim_start_matches('/'))
    }
}

fn scrape_study(rows: &StudyRows<'_>, base_url: &str, sel: &Selectors) -> Option<Study> {
    let author_el = rows.first(&sel.author);
    let info = rows.text(&sel.ainfo);
    let summary = format!("{} {}", info, rows.text(&sel.summary));

    let info_parts: Vec<&str> = info.split(',').collect();
    if info_parts.len() <= 1 {
        return None;
    }
    let mut date = parse_us_date(info_parts[1])?;

    let heading = author_el
        .and_then(|a| a.parent())
        .and_then(ElementRef::wrap)
        .map(element_text)
        .unwrap_or_default();
    if let Some(caps) = PREPRINT_RE.captures(&heading) {
        let preprint = &caps[1];
        let preprint = if preprint.matches('/').count() == 1 {
            format!("{}/{:02}", preprint, date.year() % 100)
        } else {
            preprint.to_string()
        };
        if let Some(preprint_date) = parse_us_date(&preprint) {
            date = preprint_date;
        }
    }

    let href = rows.first(&sel.link)?.value().attr("href")?;
    let mut study = Study::new(
        rows.text(&sel.title).trim(),
        author_el.map(element_text).unwrap_or_default().trim(),
        &details_url(base_url, href),
        date,
    );

    study.num_authors = AUTHORS_RE
        .captures(&info)
        .and_then(|caps| caps[1].parse().ok());

    let Some(outcome_el) = rows.first(&sel.outcome) else {
        return Some(study);
    };
    let outcome_text = element_text(outcome_el);
    let outcome_parts: Vec<&str> = outcome_text.split(',').collect();
    if outcome_parts.len() < 3 {
        return Some(study);
    }
    let Some(percent) = PERCENT_RE
        .captures(outcome_parts[1])
        .and_then(|caps| caps[1].parse::<f64>().ok())
    else {
        return Some(study);
    };

    let stage = rows.text(&sel.stage).trim().to_lowercase();
    if stage == "n/a" || stage == "meta" {
        return Some(study);
    }

    let xref = rows.first(&sel.xref).map(element_text).unwrap_or_default();
    if META_ANALYSIS_RE.is_match(&xref) {
        return Some(study);
    }

    let sign = if outcome_el.select(&sel.worse).next().is_some() {
        -1.0
    } else {
        1.0
    };
    let p_value_text = outcome_parts[2].trim().to_string();
    let Some(p_value) = P_VALUE_RE
        .captures(&p_value_text)
        .and_then(|caps| caps[1].parse().ok())
    else {
        return Some(study);
    };

    study = study
        .with_outcome(Outcome {
            description: outcome_parts[0].trim().to_string(),
            improvement_percent: percent * sign,
            p_value,
            p_value_text,
        })
        .with_stage(&stage);
    study.features = detect_features(&summary, &xref);

    Some(study)
}

fn detect_features(summary: &str, xref: &str) -> std::collections::BTreeSet<StudyFeature> {
    let mut features = std::collections::BTreeSet::new();

    if NON_RANDOMIZED_RE.is_match(summary) {
        features.insert(StudyFeature::Prospective);
    } else if CLUSTER_RE.is_match(summary) {
        features.insert(StudyFeature::ClusterRandomized);
        features.insert(StudyFeature::Rct);
    } else if RCT_RE.is_match(summary) {
        features.insert(StudyFeature::Rct);
    } else if RETROSPECTIVE_RE.is_match(summary) {
        features.insert(StudyFeature::Retrospective);
    } else if PROSPECTIVE_RE.is_match(summary) {
        features.insert(StudyFeature::Prospective);
    }

    if DOUBLE_BLIND_RE.is_match(summary) {
        features.insert(StudyFeature::DoubleBlind);
        features.insert(StudyFeature::Rct);
    } else if SINGLE_BLIND_RE.is_match(summary) {
        features.insert(StudyFeature::SingleBlind);
        features.insert(StudyFeature::Rct);
    }

    if PSM_RE.is_match(summary) {
        features.insert(StudyFeature::Psm);
    }

    if PEER_REVIEWED_RE.is_match(xref) {
        features.insert(StudyFeature::PeerReviewed);
    } else if PREPRINT_REF_RE.is_match(xref) {
        features.insert(StudyFeature::PrePrint);
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><table>
<tr id="s1"><td class="date">3/1</td><td><span class="xtitle">Ivermectin for early COVID</span></td></tr>
<tr id="s1a"><td><b><span class="author">Alpha</span> et al.</b></td><td class="ainfo">Alpha et al., 3/1/2021, double blind randomized controlled trial, 12 authors</td></tr>
<tr id="s1b"><td class="xstage"><span class="ul"><a href="alpha.html">details</a></span></td><td class="stage">Early</td><td class="outcome">death, <span class="better">75.0%</span> lower, p=0.03</td><td class="xref">peer-reviewed</td></tr>
<tr id="s2"><td class="date">1/5</td><td><span class="xtitle">Retrospective cohort</span></td></tr>
<tr id="s2a"><td><b><span class="author">Beta</span> preprint 12/20/20</b></td><td class="ainfo">Beta, 1/5/21, retrospective, 1 author</td><td class="xsummary">PSM analysis</td></tr>
<tr id="s2b"><td class="xstage"><span class="ul"><a href="beta.html">details</a></span></td><td class="stage">Late</td><td class="outcome">hospitalization, <span class="worse">12.5%</span> higher, p=0.4</td><td class="xref">preprint</td></tr>
<tr id="s3"><td class="date">2/2</td><td><span class="xtitle">A meta analysis</span></td></tr>
<tr id="s3a"><td><span class="author">Gamma</span> preprint 1/15</td><td class="ainfo">Gamma, 2/2/2021</td></tr>
<tr id="s3b"><td class="xstage"><span class="ul"><a href="gamma.html">details</a></span></td><td class="stage">Meta</td><td class="outcome">death, 20.0% lower, p=0.1</td></tr>
<tr id="s4"><td class="date">2/3</td><td><span class="xtitle">Duplicate</span></td></tr>
<tr id="s4a"><td><span class="author">Alpha</span></td><td class="ainfo">Alpha, 2/3/2021</td></tr>
<tr id="s4b"><td class="xstage"><span class="ul"><a href="alpha.html">details</a></span></td></tr>
<tr id="s5"><td class="date">?</td><td class="ainfo">no date here</td></tr>
</table></body></html>"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_us_date() {
        assert_eq!(parse_us_date("3/1/2021"), Some(date(2021, 3, 1)));
        assert_eq!(parse_us_date(" 1/5/21"), Some(date(2021, 1, 5)));
        assert_eq!(parse_us_date("13/1/21"), None);
        assert_eq!(parse_us_date("1/5"), None);
    }

    #[test]
    fn test_scrape_studies() {
        let studies = scrape_studies(PAGE, "https://c19ivermectin.com/").unwrap();
        let urls: Vec<&str> = studies.iter().map(|s| s.details_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://c19ivermectin.com/beta.html",
                "https://c19ivermectin.com/gamma.html",
                "https://c19ivermectin.com/alpha.html",
            ]
        );

        let alpha = &studies[2];
        assert_eq!(alpha.title, "Ivermectin for early COVID");
        assert_eq!(alpha.author, "Alpha");
        assert_eq!(alpha.date, date(2021, 3, 1));
        assert_eq!(alpha.num_authors, Some(12));
        assert_eq!(alpha.stage.as_deref(), Some("early"));
        let outcome = alpha.primary_outcome.as_ref().unwrap();
        assert_eq!(outcome.description, "death");
        assert_eq!(outcome.improvement_percent, 75.0);
        assert_eq!(outcome.p_value, 0.03);
        assert_eq!(outcome.p_value_text, "p=0.03");
        assert!(alpha.has_feature(StudyFeature::Rct));
        assert!(alpha.has_feature(StudyFeature::DoubleBlind));
        assert!(alpha.has_feature(StudyFeature::PeerReviewed));
    }

    #[test]
    fn test_preprint_date_and_worse_outcome() {
        let studies = scrape_studies(PAGE, "https://c19ivermectin.com").unwrap();
        let beta = &studies[0];
        assert_eq!(beta.date, date(2020, 12, 20));
        assert_eq!(beta.num_authors, Some(1));
        assert_eq!(beta.primary_outcome.as_ref().unwrap().improvement_percent, -12.5);
        assert!(beta.has_feature(StudyFeature::Retrospective));
        assert!(beta.has_feature(StudyFeature::Psm));
        assert!(beta.has_feature(StudyFeature::PrePrint));
    }

    #[test]
    fn test_meta_stage_has_no_outcome() {
        let studies = scrape_studies(PAGE, "https://c19ivermectin.com").unwrap();
        let gamma = &studies[1];
        // "preprint 1/15" takes the year of the listed date.
        assert_eq!(gamma.date, date(2021, 1, 15));
        assert!(gamma.primary_outcome.is_none());
        assert!(gamma.stage.is_none());
    }

    #[test]
    fn test_details_url() {
        assert_eq!(
            details_url("https://c19hcq.com", "/smith.html"),
            "https://c19hcq.com/smith.html"
        );
        assert_eq!(
            details_url("https://c19hcq.com", "https://doi.org/10.1/x"),
            "https://doi.org/10.1/x"
        );
    }

    #[test]
    fn test_empty_page() {
        assert!(matches!(
            scrape_studies("<html><body></body></html>", "https://x"),
            Err(IngestError::NoStudies)
        ));
    }
}
