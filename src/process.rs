use chrono::Local;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::model::{PlaceRecord, Section, Watermark};
use crate::parse::{extract_place, extract_result_urls, extract_review_batch, extract_review_total};
use crate::request::{request_page_html, ActionOutcome, ChromiumRenderer, PageRenderer};
use crate::sink::{write_url_list, CsvSink};
use crate::{info_time, Error, Result, PAGE_SIZE, TA_SEARCH_ENDPOINT};

const PAGE_READY: &str = "h1#HEADING";
const EXPAND_REVIEWS: &str = "span._3maEfNCR";
const ALL_LANGUAGES: &str = "label[for='LanguageFilter_0']";
const ACCEPT_COOKIES: &str = "button#_evidon-accept-button";
const SEARCH_RESULTS: &str = "div.search-results-list";

/// Why a review scrape stopped paginating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The place has no reviews at all.
    NoReviews,
    /// A review older than the watermark was found.
    Boundary,
    /// A page came back with fewer reviews than a full page.
    ShortPage,
    /// Every review the place reports has been visited.
    ReachedTotal,
}

/// Which review language filter ended up applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFilter {
    Requested,
    AllLanguages,
    Unfiltered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    pub total: u64,
    pub pages: usize,
    pub written: usize,
    pub language: LanguageFilter,
    pub stopped: StopReason,
}

/// The one browser, http client and set of output files of a run.
///
/// Everything is released by `close`, which has to be called on every exit path.
pub struct Session<R = ChromiumRenderer> {
    renderer: R,
    client: Client,
    settings: Settings,
    reviews: Option<CsvSink>,
    places: Option<CsvSink>,
    cookies_checked: bool,
}

impl Session<ChromiumRenderer> {
    /// Chromium is started on the first browser action, not here.
    pub fn open(settings: Settings) -> Self {
        let renderer = ChromiumRenderer::new(&settings);
        Self::with_renderer(renderer, settings)
    }
}

impl<R: PageRenderer> Session<R> {
    pub fn with_renderer(renderer: R, settings: Settings) -> Self {
        Self {
            renderer,
            client: Client::new(),
            settings,
            reviews: None,
            places: None,
            cookies_checked: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Collects the urls of one search results page for `query`, filtered to `section`,
    /// and writes them to the url list file.
    pub async fn scrape_place_listings(&mut self, query: &str, section: Section) -> Result<Vec<String>> {
        info!("Scraping {} in {query} urls", section.filter_id().to_lowercase());
        let search_url = search_url(&self.settings.base_url, query)?;
        self.renderer.navigate(search_url.as_str()).await?;
        self.accept_cookies().await?;

        let filter = format!("a.search-filter[data-filter-id='{section}']");
        self.renderer.wait_for(&filter, self.settings.max_wait()).await?;
        if !self.renderer.try_click(&filter).await?.performed() {
            return Err(Error::ActionUnavailable(filter));
        }
        self.renderer
            .wait_for(SEARCH_RESULTS, self.settings.max_wait())
            .await?;

        let html = self.renderer.html().await?;
        let base_url = self.settings.base_url.clone();
        let urls = parse_off_thread(html, move |html| extract_result_urls(html, &base_url)).await?;

        write_url_list(self.settings.url_path(), &urls).await?;
        info!("Found {} urls for {query}", urls.len());
        Ok(urls)
    }

    /// Scrapes the metadata of one place and appends it to the place file.
    pub async fn scrape_place(&mut self, url: &str) -> Result<PlaceRecord> {
        info!("Scraping place metadata for url: {}", url.trim());
        let html = request_page_html(&self.client, url.trim()).await?;
        let source_url = url.to_string();
        let place = parse_off_thread(html, move |html| extract_place(html, &source_url)).await?;

        let sink = self.place_sink()?;
        sink.write_place(&place)?;
        sink.flush()?;
        Ok(place)
    }

    /// Writes every review of `url` that isn't older than the watermark, newest pages
    /// first, stopping at the first page that reaches past it.
    pub async fn scrape_reviews(
        &mut self,
        url: &str,
        watermark: Watermark,
        lang: &str,
    ) -> Result<ReviewSummary> {
        let start_time = Local::now();
        let url = url.trim();
        // Fail on an unusable url before touching the browser.
        review_page_url(url, PAGE_SIZE)?;

        self.renderer.navigate(url).await?;
        self.accept_cookies().await?;
        self.renderer
            .wait_for(PAGE_READY, self.settings.max_wait())
            .await?;
        let total = parse_off_thread(self.renderer.html().await?, extract_review_total).await?;

        let mut summary = ReviewSummary {
            total,
            pages: 0,
            written: 0,
            language: LanguageFilter::Unfiltered,
            stopped: StopReason::NoReviews,
        };
        if total == 0 {
            info!("No reviews for {url}");
            return Ok(summary);
        }
        summary.language = self.select_language(lang).await?;

        let mut offset = 0;
        loop {
            let page_time = Local::now();
            if offset > 0 {
                self.renderer.navigate(&review_page_url(url, offset)?).await?;
                self.renderer
                    .wait_for(PAGE_READY, self.settings.max_wait())
                    .await?;
                self.reapply_language(summary.language, lang).await?;
            }
            self.expand_reviews().await?;

            let html = self.renderer.html().await?;
            let batch =
                parse_off_thread(html, move |html| extract_review_batch(html, watermark)).await?;

            let sink = self.review_sink()?;
            for review in &batch.records {
                sink.write_review(review)?;
            }
            sink.flush()?;
            summary.pages += 1;
            summary.written += batch.records.len();
            info_time!(
                page_time,
                "Page at offset {offset}: {} new of {} reviews",
                batch.records.len(),
                batch.scanned
            );

            let stop = if batch.found_boundary {
                Some(StopReason::Boundary)
            } else if batch.scanned + batch.skipped < PAGE_SIZE {
                Some(StopReason::ShortPage)
            } else if (offset + PAGE_SIZE) as u64 >= total {
                Some(StopReason::ReachedTotal)
            } else {
                None
            };
            if let Some(reason) = stop {
                summary.stopped = reason;
                break;
            }
            offset += PAGE_SIZE;
        }

        info_time!(
            start_time,
            "Wrote {} reviews from {} pages of {url} ({:?})",
            summary.written,
            summary.pages,
            summary.stopped
        );
        Ok(summary)
    }

    /// Flushes the output files and shuts the browser down.
    pub async fn close(mut self) -> Result<()> {
        let mut flushed = Ok(());
        for sink in [self.reviews.as_mut(), self.places.as_mut()].into_iter().flatten() {
            debug!("{} rows written to {}", sink.rows_written(), sink.path().display());
            if let Err(e) = sink.flush() {
                warn!("couldn't flush {}: {e}", sink.path().display());
                flushed = Err(e);
            }
        }
        // The browser goes down even when a file couldn't be flushed.
        self.renderer.close().await?;
        flushed
    }

    async fn select_language(&mut self, lang: &str) -> Result<LanguageFilter> {
        if self.renderer.try_click(&language_option(lang)).await?.performed() {
            debug!("review language set to {lang}");
            return Ok(LanguageFilter::Requested);
        }
        info!("Language {lang} not available, falling back to all languages");
        if self.renderer.try_click(ALL_LANGUAGES).await?.performed() {
            return Ok(LanguageFilter::AllLanguages);
        }
        warn!("No language filter available, scraping unfiltered");
        Ok(LanguageFilter::Unfiltered)
    }

    /// Later pages are loaded by url, which can drop the filter picked on the first one.
    async fn reapply_language(&mut self, filter: LanguageFilter, lang: &str) -> Result<()> {
        let option = match filter {
            LanguageFilter::Requested => language_option(lang),
            LanguageFilter::AllLanguages => ALL_LANGUAGES.to_string(),
            LanguageFilter::Unfiltered => return Ok(()),
        };
        if !self.renderer.try_click(&option).await?.performed() {
            warn!("language option {option} missing on a later page");
        }
        Ok(())
    }

    async fn expand_reviews(&mut self) -> Result<()> {
        if self.renderer.try_click(EXPAND_REVIEWS).await? == ActionOutcome::NotAvailable {
            info!("Expansion of reviews failed: no reviews to expand.");
        }
        Ok(())
    }

    /// The consent banner only shows up once per browser session.
    async fn accept_cookies(&mut self) -> Result<()> {
        if self.cookies_checked {
            return Ok(());
        }
        self.cookies_checked = true;
        match self.renderer.try_click(ACCEPT_COOKIES).await? {
            ActionOutcome::Performed => debug!("accepted cookie banner"),
            ActionOutcome::NotAvailable => debug!("no cookie banner"),
        }
        Ok(())
    }

    fn review_sink(&mut self) -> Result<&mut CsvSink> {
        let sink = match self.reviews.take() {
            Some(sink) => sink,
            None => CsvSink::open(self.settings.review_path())?,
        };
        Ok(self.reviews.insert(sink))
    }

    fn place_sink(&mut self) -> Result<&mut CsvSink> {
        let sink = match self.places.take() {
            Some(sink) => sink,
            None => CsvSink::open(self.settings.place_path())?,
        };
        Ok(self.places.insert(sink))
    }
}

/// Url of the review page starting at `offset`, the site pages reviews with an
/// `-or<offset>` segment.
pub fn review_page_url(url: &str, offset: usize) -> Result<String> {
    if !url.contains("-Reviews-") {
        return Err(Error::InvalidSourceUrl {
            url: url.to_string(),
            segment: "-Reviews-",
        });
    }
    if offset == 0 {
        return Ok(url.to_string());
    }
    Ok(url.replacen("-Reviews-", &format!("-Reviews-or{offset}-"), 1))
}

fn language_option(lang: &str) -> String {
    format!("input[name='filterLang'][value='{lang}']")
}

fn search_url(base_url: &str, query: &str) -> Result<Url> {
    let endpoint = format!("{}{TA_SEARCH_ENDPOINT}", base_url.trim_end_matches('/'));
    Url::parse_with_params(
        &endpoint,
        &[
            ("geo", "1"),
            ("uiOrigin", "MASTHEAD"),
            ("q", query),
            ("supportedSearchTypes", "find_near_stand_alone_query"),
            ("enableNearPage", "true"),
        ],
    )
    .map_err(|_| Error::InvalidSourceUrl {
        url: endpoint,
        segment: "base url",
    })
}

/// `scraper::Html` isn't `Send`, so documents are parsed on the blocking pool.
async fn parse_off_thread<T, F>(html: String, parse: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&str) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || parse(&html)).await?
}
