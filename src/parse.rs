use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::model::{PlaceRecord, Ranking, ReviewBatch, ReviewRecord, Watermark};
use crate::{Error, Result, REVIEW_DATE_FORMAT};

static PLACE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-d(\d+)-").unwrap());
static GEO_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-g(\d+)-").unwrap());
static REVIEW_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wrote\s+a\s+review\s+(.+)$").unwrap());

const HEADING: &str = "h1#HEADING";
const REVIEW_COUNT: &str = "span.reviewCount";
const BUBBLE_RATING: &str = "span.ui_bubble_rating";
const ADDRESS: &str = "span.detail";
const RANKING: &str = "span.header_popularity";
const TAGS: &str = "span.attractionCategories";

const REVIEW_CONTAINER: &str = "div.Dq9MAugU";
const REVIEW_INNER: &str = "div.oETBfkHU";
const REVIEW_HEADER: &str = "div._2fxQ4TOx";
const REVIEW_USERNAME: &str = "a.ui_header_link";
const REVIEW_LOCATION: &str = "span._3J15flPT";
const REVIEW_USER_COUNTS: &str = "span._1fk70GUn";
const REVIEW_TITLE: &str = "a.ocfR3SKN";
const REVIEW_CAPTION: &str = "q.IRsGHoPm";

const RESULT_TITLE: &str = "div.result-title";

/// Parses a rendered place page into a `PlaceRecord`.
///
/// Only the heading and the bubble rating are required, every other field falls back to
/// its default when the page doesn't carry it.
pub fn extract_place(html: &str, source_url: &str) -> Result<PlaceRecord> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let (id, geo_id) = place_ids(source_url)?;

    let name = first_text(root, &create_selector(HEADING)?)
        .ok_or(Error::RequiredField("name"))?;
    let rating = first_rating(root, &create_selector(BUBBLE_RATING)?)
        .ok_or(Error::RequiredField("rating"))?;

    let review_count = place_review_count(root)?;
    let address = first_text(root, &create_selector(ADDRESS)?);
    if address.is_none() {
        debug!("no address found for {source_url}");
    }
    let ranking = first_text(root, &create_selector(RANKING)?).map(|text| parse_ranking(&text));
    let tags = first_text(root, &create_selector(TAGS)?)
        .map(|text| parse_tags(&text))
        .unwrap_or_default();

    Ok(PlaceRecord {
        id,
        geo_id,
        name,
        review_count,
        rating,
        address,
        ranking,
        tags,
        url: source_url.trim().to_string(),
    })
}

/// Review count summary shown at the top of a place page. Zero when absent.
pub fn extract_review_total(html: &str) -> Result<u64> {
    let doc = Html::parse_document(html);
    place_review_count(doc.root_element())
}

/// Parses every review container on the page in document order.
///
/// Reviews older than the watermark are dropped and flag the batch as having crossed the
/// boundary; the rest of the page is still processed. A review whose date can't be read
/// is skipped with a warning.
pub fn extract_review_batch(html: &str, watermark: Watermark) -> Result<ReviewBatch> {
    extract_review_batch_on(html, watermark, Local::now().date_naive())
}

/// `extract_review_batch` with relative dates ("Today", "Yesterday") resolved against
/// `today`.
pub fn extract_review_batch_on(
    html: &str,
    watermark: Watermark,
    today: NaiveDate,
) -> Result<ReviewBatch> {
    let doc = Html::parse_document(html);
    let selectors = ReviewSelectors::new()?;

    let mut batch = ReviewBatch::default();
    for container in doc.select(&selectors.container) {
        let review = match parse_review(container, &selectors, today) {
            Ok(review) => review,
            Err(Error::InvalidReviewDate(header)) => {
                warn!("skipping review with unreadable date: {header:?}");
                batch.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        batch.scanned += 1;

        if watermark.admits(review.timestamp) {
            batch.records.push(review);
        } else {
            debug!(
                "review {} from {} is older than {}",
                review.id, review.timestamp, watermark.min_date
            );
            batch.found_boundary = true;
        }
    }
    Ok(batch)
}

/// Returns one absolute url per entry of a search results page.
///
/// The destination path lives in the inline `onclick` handler of every result title, as
/// its 4th comma separated argument.
pub fn extract_result_urls(html: &str, base_url: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let result_selector = create_selector(RESULT_TITLE)?;

    let mut urls = Vec::new();
    for (idx, result) in doc.select(&result_selector).enumerate() {
        let path = result.value().attr("onclick").and_then(onclick_destination);
        match path {
            Some(path) => urls.push(format!("{}{}", base_url.trim_end_matches('/'), path)),
            None => warn!("search result {idx} has no destination in its onclick handler"),
        }
    }
    Ok(urls)
}

/// Decodes a bubble rating class token, `bubble_45` -> `4.5`.
pub fn decode_rating(class_token: &str) -> Option<f32> {
    let digits = class_token.get(class_token.len().checked_sub(2)?..)?;
    let mut chars = digits.chars();
    let whole = chars.next()?.to_digit(10)?;
    let tenth = chars.next()?.to_digit(10)?;
    if tenth != 0 && tenth != 5 {
        debug!("rating token {class_token} is off the half-bubble grid");
        return None;
    }
    let rating = whole as f32 + tenth as f32 / 10.0;
    (rating <= 5.0).then_some(rating)
}

/// Collapses carriage returns, line feeds and tabs into plain spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.replace(['\r', '\n', '\t'], " ")
}

/// Recovers the place id (`-d<digits>-`) and geo id (`-g<digits>-`) from a place url.
pub fn place_ids(url: &str) -> Result<(u64, u64)> {
    let id = capture_number(&PLACE_ID_RE, url).ok_or_else(|| Error::InvalidSourceUrl {
        url: url.to_string(),
        segment: "-d<id>-",
    })?;
    let geo_id = capture_number(&GEO_ID_RE, url).ok_or_else(|| Error::InvalidSourceUrl {
        url: url.to_string(),
        segment: "-g<id>-",
    })?;
    Ok((id, geo_id))
}

/// Parses `"#3 of 120 things to do"`. Position and length are either both present or both
/// missing.
pub fn parse_ranking(text: &str) -> Ranking {
    let mut words = text.split_whitespace();
    let position = words
        .next()
        .and_then(|w| w.strip_prefix('#'))
        .and_then(|w| w.replace(',', "").parse::<u32>().ok());
    let length = words
        .nth(1)
        .and_then(|w| w.replace(',', "").parse::<u32>().ok());

    let (position, length) = match (position, length) {
        (Some(pos), Some(len)) => (Some(pos), Some(len)),
        _ => (None, None),
    };
    Ranking {
        text: text.to_string(),
        position,
        length,
    }
}

pub fn parse_tags(text: &str) -> Vec<String> {
    text.replace("Other", "")
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

fn parse_review(
    container: ElementRef,
    sel: &ReviewSelectors,
    today: NaiveDate,
) -> Result<ReviewRecord> {
    let inner = container
        .select(&sel.inner)
        .next()
        .ok_or(Error::RequiredField("review body"))?;
    let id = inner
        .value()
        .attr("data-reviewid")
        .ok_or(Error::RequiredField("review id"))?
        .to_string();
    let rating = first_rating(inner, &sel.rating).ok_or(Error::RequiredField("review rating"))?;
    let header = first_text(container, &sel.header).ok_or(Error::RequiredField("review date"))?;
    let timestamp = parse_review_date(&header, today)?;

    let username = first_text(container, &sel.username).unwrap_or_else(|| {
        debug!("review {id} has no username");
        String::new()
    });
    let title = first_text(inner, &sel.title)
        .map(|t| normalize_whitespace(&t))
        .unwrap_or_default();
    let caption = first_text(inner, &sel.caption)
        .map(|t| normalize_whitespace(&t))
        .unwrap_or_default();
    let location = first_text(container, &sel.location);
    let reviewer_review_count = first_text(container, &sel.user_counts).and_then(|t| parse_count(&t));

    Ok(ReviewRecord {
        id,
        title,
        caption,
        timestamp,
        rating,
        username,
        reviewer_review_count,
        location,
    })
}

/// Fresh reviews are dated "Today" or "Yesterday" instead of `Mar 14, 2020`.
fn parse_review_date(header: &str, today: NaiveDate) -> Result<NaiveDate> {
    REVIEW_DATE_RE
        .captures(header.trim())
        .and_then(|caps| {
            let raw = caps[1].trim();
            match raw.to_lowercase().as_str() {
                "today" => Some(today),
                "yesterday" => today.pred_opt(),
                _ => NaiveDate::parse_from_str(raw, REVIEW_DATE_FORMAT).ok(),
            }
        })
        .ok_or_else(|| Error::InvalidReviewDate(header.to_string()))
}

fn place_review_count(root: ElementRef) -> Result<u64> {
    let count = first_text(root, &create_selector(REVIEW_COUNT)?)
        .and_then(|text| parse_count(&text))
        .unwrap_or_else(|| {
            debug!("review count unavailable, defaulting to 0");
            0
        });
    Ok(count)
}

/// `"1,234 reviews"` -> `1234`.
fn parse_count(text: &str) -> Option<u64> {
    text.split_whitespace()
        .next()?
        .replace([',', '.'], "")
        .parse()
        .ok()
}

fn onclick_destination(handler: &str) -> Option<&str> {
    let token = handler.split(',').nth(3)?.trim_start();
    let token = token
        .strip_prefix(['\'', '"'])
        .unwrap_or(token);
    let token = token.strip_suffix(['\'', '"']).unwrap_or(token);
    (!token.is_empty()).then_some(token)
}

fn first_text(scope: ElementRef, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

fn first_rating(scope: ElementRef, selector: &Selector) -> Option<f32> {
    scope.select(selector).find_map(|el| {
        el.value()
            .classes()
            .filter(|class| class.starts_with("bubble_"))
            .find_map(decode_rating)
    })
}

fn capture_number(re: &Regex, haystack: &str) -> Option<u64> {
    re.captures(haystack)?.get(1)?.as_str().parse().ok()
}

struct ReviewSelectors {
    container: Selector,
    inner: Selector,
    header: Selector,
    username: Selector,
    location: Selector,
    user_counts: Selector,
    rating: Selector,
    title: Selector,
    caption: Selector,
}

impl ReviewSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            container: create_selector(REVIEW_CONTAINER)?,
            inner: create_selector(REVIEW_INNER)?,
            header: create_selector(REVIEW_HEADER)?,
            username: create_selector(REVIEW_USERNAME)?,
            location: create_selector(REVIEW_LOCATION)?,
            user_counts: create_selector(REVIEW_USER_COUNTS)?,
            rating: create_selector(BUBBLE_RATING)?,
            title: create_selector(REVIEW_TITLE)?,
            caption: create_selector(REVIEW_CAPTION)?,
        })
    }
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}
