//! Study ingestion: fetching and scraping the studies page, and selecting
//! the studies a host page includes in its analysis.

pub mod http_client;
pub mod inclusion;
pub mod studies;

pub use http_client::{resolve_user_agent, HttpClient};
pub use inclusion::{mark_included, studies_in_analysis};
pub use studies::{parse_us_date, scrape_studies};
