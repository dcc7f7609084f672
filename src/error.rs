//! Error types for ingestion, chart binding and aggregation.

use thiserror::Error;

use crate::models::StudyId;

/// Errors raised while binding a chart to its rendered markup.
///
/// A chart that fails to bind stays out of the page; other charts are
/// unaffected.
#[derive(Debug, Error)]
pub enum ChartError {
    /// The markup does not have the shape the chart expects.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A required element is absent.
    #[error("missing element: {0}")]
    MissingElement(&'static str),

    /// A chart annotation names a study the repository does not know.
    #[error("no study for href {0}")]
    MissingStudy(String),

    /// A transform or path attribute could not be parsed.
    #[error("unparsable geometry: {0}")]
    UnparsableGeometry(String),

    /// A selector string was rejected by the CSS parser.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
}

/// Errors raised while loading the study set for a page.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no host profile for {0}")]
    UnknownHost(String),

    #[error("studies page contained no studies")]
    NoStudies,

    #[error("invalid selector: {0}")]
    InvalidSelector(String),
}

/// Errors raised by timeline mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("unknown study {0}")]
    UnknownStudy(StudyId),
}

/// Errors raised by an [`Aggregator`](crate::services::meta::Aggregator).
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("aggregation failed: {0}")]
    Failed(String),
}
