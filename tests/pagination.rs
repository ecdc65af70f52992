use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tripscrape::config::Settings;
use tripscrape::model::Watermark;
use tripscrape::process::{review_page_url, Session, StopReason};
use tripscrape::request::{ActionOutcome, PageRenderer};
use tripscrape::{Result, PAGE_SIZE};

const PLACE: &str =
    "https://www.tripadvisor.com/Attraction_Review-g187791-d192285-Reviews-Colosseum-Rome.html";

/// Serves a fixed set of review pages keyed by url.
#[derive(Default)]
struct ReviewSite {
    pages: HashMap<String, String>,
    current: String,
    fetches: Arc<Mutex<Vec<String>>>,
}

impl ReviewSite {
    /// `total` reviews, all written on `date`, split into pages of `PAGE_SIZE`.
    fn with_reviews(total: usize, date: &str) -> Self {
        let mut site = ReviewSite::default();
        for offset in (0..total).step_by(PAGE_SIZE) {
            let count = PAGE_SIZE.min(total - offset);
            let reviews: String = (offset..offset + count)
                .map(|id| {
                    format!(
                        r#"<div class="Dq9MAugU T870kzTX LnVzGwUB">
                             <div class="_2fxQ4TOx"><a class="ui_header_link _1r_My98y">user{id}</a> wrote a review {date}</div>
                             <div class="oETBfkHU" data-reviewid="{id}">
                               <span class="ui_bubble_rating bubble_35"></span>
                               <a class="ocfR3SKN">Title {id}</a><q class="IRsGHoPm">Caption {id}</q>
                             </div>
                           </div>"#
                    )
                })
                .collect();
            let html = format!(
                r#"<html><body><h1 id="HEADING">Colosseum</h1>
                   <span class="reviewCount">{total} reviews</span>{reviews}</body></html>"#
            );
            site.pages
                .insert(review_page_url(PLACE, offset).unwrap(), html);
        }
        site
    }
}

#[async_trait]
impl PageRenderer for ReviewSite {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.current = url.to_string();
        Ok(())
    }

    async fn wait_for(&mut self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn try_click(&mut self, _selector: &str) -> Result<ActionOutcome> {
        Ok(ActionOutcome::NotAvailable)
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.pages.get(&self.current).cloned().unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn settings(dir: &Path) -> Settings {
    Settings {
        output_dir: dir.to_path_buf(),
        review_file: "reviews.csv".into(),
        place_file: "places.csv".into(),
        url_file: "urls.txt".into(),
        log_file: "run.log".into(),
        base_url: "https://www.tripadvisor.com".into(),
        max_wait_secs: 1,
        max_retry: 0,
        settle_millis: 0,
        headless: true,
        accept_language: "en_GB".into(),
    }
}

fn watermark() -> Watermark {
    Watermark::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
}

#[tokio::test]
async fn short_last_page_ends_the_scrape() {
    let dir = tempfile::tempdir().unwrap();
    let site = ReviewSite::with_reviews(25, "Jun 5, 2021");
    let mut session = Session::with_renderer(site, settings(dir.path()));

    let summary = session.scrape_reviews(PLACE, watermark(), "en").await.unwrap();

    assert_eq!(summary.total, 25);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.written, 25);
    assert_eq!(summary.stopped, StopReason::ShortPage);
    session.close().await.unwrap();

    let csv = std::fs::read_to_string(dir.path().join("reviews.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("id_review,title,caption,timestamp,rating,username,n_review_user,location")
    );
    assert_eq!(
        lines.next(),
        Some("0,Title 0,Caption 0,2021-06-05,3.5,user0,,")
    );
    assert_eq!(lines.count(), 24);
}

#[tokio::test]
async fn fetches_step_through_offsets_by_page_size() {
    let dir = tempfile::tempdir().unwrap();
    let site = ReviewSite::with_reviews(25, "Jun 5, 2021");
    let fetches = Arc::clone(&site.fetches);
    let mut session = Session::with_renderer(site, settings(dir.path()));

    session.scrape_reviews(PLACE, watermark(), "en").await.unwrap();

    let expected: Vec<String> = [0, 10, 20]
        .into_iter()
        .map(|offset| review_page_url(PLACE, offset).unwrap())
        .collect();
    assert_eq!(*fetches.lock().unwrap(), expected);
}

#[tokio::test]
async fn full_last_page_stops_at_the_total() {
    let dir = tempfile::tempdir().unwrap();
    let site = ReviewSite::with_reviews(20, "Jun 5, 2021");
    let mut session = Session::with_renderer(site, settings(dir.path()));

    let summary = session.scrape_reviews(PLACE, watermark(), "en").await.unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.stopped, StopReason::ReachedTotal);
}

#[tokio::test]
async fn old_reviews_stop_on_the_first_page() {
    let dir = tempfile::tempdir().unwrap();
    let site = ReviewSite::with_reviews(40, "Jun 5, 2019");
    let mut session = Session::with_renderer(site, settings(dir.path()));

    let summary = session.scrape_reviews(PLACE, watermark(), "en").await.unwrap();

    assert_eq!(summary.pages, 1);
    assert_eq!(summary.written, 0);
    assert_eq!(summary.stopped, StopReason::Boundary);
}
