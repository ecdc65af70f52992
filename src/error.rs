use std::time::Duration;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseMissingSelector(String),
    #[error("Required field `{0}` is missing from the page.")]
    RequiredField(&'static str),
    #[error("Couldn't find `{segment}` identifier in url: {url}")]
    InvalidSourceUrl { url: String, segment: &'static str },
    #[error("Couldn't parse review date from: {0:?}")]
    InvalidReviewDate(String),

    #[error("Timed out after {timeout:?} waiting for element: {selector}")]
    WaitTimeout { selector: String, timeout: Duration },
    #[error("Required page control is not available: {0}")]
    ActionUnavailable(String),
    #[error("Browser Error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
    #[error("Scrape was cancelled.")]
    Cancelled,

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Config Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
    #[error("Couldn't initialize logging: {0}")]
    Logging(String),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}
