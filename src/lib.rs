//! metatimeline: time-scrubbable overlays for pre-rendered meta-analysis
//! charts.
//!
//! A host page carries forest plots, box plots and bar charts rendered ahead
//! of time for the full study set. This crate binds those charts to a
//! repository of scraped studies and re-styles them as a timeline moves
//! back and forth, so the page shows what the evidence looked like on any
//! given date. Excluding a study re-pools the affected forest plots through
//! an [`Aggregator`](services::Aggregator).

pub mod charts;
pub mod config;
pub mod error;
pub mod hosts;
pub mod logging;
pub mod models;
pub mod render;
pub mod repository;
pub mod scrapers;
pub mod services;
pub mod session;
pub mod timeline;

pub use config::{Config, Settings};
pub use error::{AggregationError, ChartError, IngestError, TimelineError};
pub use session::{HostEvent, Page, StudiesSource};
pub use timeline::{Intent, Timeline, TimelineEvent};
