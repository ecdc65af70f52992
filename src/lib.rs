//! Incremental scraper for travel-review places, place listings and reviews.
//!
//! A run owns one [`Session`](process::Session): a browser tab for the script heavy
//! pages, an http client for the static ones and the output files rows are appended to.

pub mod config;
mod error;
pub mod logging;
mod macros;
pub mod model;
pub mod parse;
pub mod process;
pub mod request;
pub mod sink;

pub use error::{Error, Result};

pub const TA_WEBPAGE: &str = "https://www.tripadvisor.com";
const TA_SEARCH_ENDPOINT: &str = "/Search";
/// Reviews shown per review page.
pub const PAGE_SIZE: usize = 10;
/// Seconds to wait for a page or element to become ready.
pub const MAX_WAIT: u64 = 10;
pub const MAX_RETRY: u32 = 10;
/// Date format after "wrote a review" in a review header, e.g. `Mar 14, 2020`.
pub const REVIEW_DATE_FORMAT: &str = "%b %d, %Y";
