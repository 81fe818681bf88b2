use std::{
    collections::HashSet,
    fmt,
    time::Instant,
};

use chrono::{Duration, NaiveDate, Utc};
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::ArxivConfig,
    error::{ConfigError, FetchError},
    model::PaperRecord,
    parser::{parse_feed, ParsedFeed},
};

/// One paginated query against the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubRequest {
    Topic(String),
    Author(String),
}

impl SubRequest {
    /// Builds the topic request (if any) followed by one request per author.
    pub fn plan(query: Option<&str>, authors: &[String]) -> Result<Vec<SubRequest>, ConfigError> {
        let mut plan = Vec::new();
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            plan.push(SubRequest::Topic(q.to_string()));
        }
        plan.extend(
            authors.iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(|a| SubRequest::Author(a.to_string())),
        );
        if plan.is_empty() {
            return Err(ConfigError::NoCriteria);
        }
        Ok(plan)
    }

    pub fn search_query(&self) -> String {
        match self {
            SubRequest::Topic(q) => format!("all:\"{}\"", q.replace('"', "")),
            SubRequest::Author(a) => format!("au:\"{}\"", a.replace('"', "")),
        }
    }
}

impl fmt::Display for SubRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubRequest::Topic(q) => write!(f, "query {:?}", q),
            SubRequest::Author(a) => write!(f, "author {:?}", a),
        }
    }
}

/// Inclusive range of publication dates kept by a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window of `days_back` days up to and including `today`. Spans reaching
    /// past the calendar range start at the earliest representable date.
    pub fn ending(today: NaiveDate, days_back: u32) -> Self {
        DateWindow {
            start: today
                .checked_sub_signed(Duration::days(i64::from(days_back)))
                .unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Result of a fetch, including what went wrong along the way.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<PaperRecord>,
    /// sub-requests whose retries were exhausted.
    pub failed: Vec<SubRequest>,
    pub skipped_entries: usize,
}

#[derive(Debug)]
pub struct ArxivFetcher {
    client: Client,
    config: ArxivConfig,
    last_request: Option<Instant>,
}

impl ArxivFetcher {
    pub fn new(config: ArxivConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;
        Ok(ArxivFetcher {
            client,
            config,
            last_request: None,
        })
    }

    /// Fetches papers published within the last `days_back` days.
    /// Failed sub-requests are logged and contribute nothing.
    pub async fn fetch(
        &mut self,
        query: Option<&str>,
        authors: &[String],
        days_back: u32,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, ConfigError> {
        let today = Utc::now().date_naive();
        let outcome = self.fetch_detailed(query, authors, days_back, max_results, today).await?;
        Ok(outcome.records)
    }

    pub async fn fetch_detailed(
        &mut self,
        query: Option<&str>,
        authors: &[String],
        days_back: u32,
        max_results: usize,
        today: NaiveDate,
    ) -> Result<FetchOutcome, ConfigError> {
        let plan = SubRequest::plan(query, authors)?;
        let window = DateWindow::ending(today, days_back);
        let mut seen: HashSet<String> = HashSet::new();
        let mut outcome = FetchOutcome::default();

        for sub in plan {
            let remaining = max_results.saturating_sub(outcome.records.len());
            if remaining == 0 {
                debug!(%sub, "result cap reached, skipping");
                continue;
            }
            match self.run_sub_request(&sub, window, remaining, &seen).await {
                Ok((records, skipped)) => {
                    info!(%sub, found = records.len(), "sub-request finished");
                    outcome.skipped_entries += skipped;
                    for record in records {
                        seen.insert(record.id.clone());
                        outcome.records.push(record);
                    }
                }
                Err(e) => {
                    warn!(%sub, error = %e, "sub-request failed, continuing without its results");
                    outcome.failed.push(sub);
                }
            }
        }

        info!(
            papers = outcome.records.len(),
            failed = outcome.failed.len(),
            from = %window.start,
            to = %window.end,
            "fetch complete"
        );
        Ok(outcome)
    }

    /// Pages through one sub-request. Returns the new in-window records and the
    /// number of entries that failed validation.
    #[instrument(skip(self, sub, seen), fields(sub = %sub))]
    async fn run_sub_request(
        &mut self,
        sub: &SubRequest,
        window: DateWindow,
        limit: usize,
        seen: &HashSet<String>,
    ) -> Result<(Vec<PaperRecord>, usize), FetchError> {
        let search_query = sub.search_query();
        let page_size = self.config.page_size.max(1);
        let mut records: Vec<PaperRecord> = Vec::new();
        let mut local: HashSet<String> = HashSet::new();
        let mut skipped = 0;
        let mut start = 0;

        loop {
            let page = self.fetch_page_with_retry(&search_query, start, page_size).await?;
            for failure in &page.failures {
                warn!(error = %failure, "skipping entry");
            }
            skipped += page.failures.len();
            let oldest = page.oldest_date();
            let entry_count = page.entry_count;
            debug!(start, entries = entry_count, "page received");

            for record in page.records {
                if !window.contains(record.published_date) {
                    continue;
                }
                if seen.contains(&record.id) || !local.insert(record.id.clone()) {
                    continue;
                }
                records.push(record);
                if records.len() >= limit {
                    return Ok((records, skipped));
                }
            }

            start += entry_count;
            let exhausted = entry_count < page_size
                || page.total_results.map_or(false, |total| start >= total);
            let past_window = oldest.map_or(false, |date| date < window.start);
            if exhausted || past_window {
                break;
            }
        }
        Ok((records, skipped))
    }

    async fn fetch_page_with_retry(
        &mut self,
        search_query: &str,
        start: usize,
        page_size: usize,
    ) -> Result<ParsedFeed, FetchError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_page(search_query, start, page_size).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < attempts => {
                    warn!(attempt, max_attempts = attempts, error = %e, "request failed, retrying");
                    sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_page(
        &mut self,
        search_query: &str,
        start: usize,
        page_size: usize,
    ) -> Result<ParsedFeed, FetchError> {
        self.wait_for_rate_limit().await;
        let response = self.client
            .get(&self.config.base_url)
            .query(&[
                ("search_query", search_query),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .query(&[("start", start), ("max_results", page_size)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.text().await?;
        parse_feed(&body)
    }

    async fn wait_for_rate_limit(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.config.request_interval {
                sleep(self.config.request_interval - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use mockito::{Matcher, Server};

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 16).unwrap()
    }

    fn test_config(base_url: String, page_size: usize) -> ArxivConfig {
        ArxivConfig {
            base_url,
            page_size,
            max_attempts: 2,
            retry_delay: StdDuration::ZERO,
            request_interval: StdDuration::ZERO,
            timeout: StdDuration::from_secs(5),
            ..ArxivConfig::default()
        }
    }

    fn entry(id: &str, published: &str) -> String {
        format!(
            concat!(
                "<entry><id>http://arxiv.org/abs/{}v1</id>",
                "<published>{}T12:00:00Z</published>",
                "<title>Paper {}</title><summary>Abstract of {}</summary>",
                "<author><name>Clough, Katy</name></author></entry>"
            ),
            id, published, id, id
        )
    }

    fn feed(total: usize, entries: &[String]) -> String {
        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
                "<feed xmlns=\"http://www.w3.org/2005/Atom\" ",
                "xmlns:opensearch=\"http://a9.com/-/spec/opensearch/1.1/\">",
                "<opensearch:totalResults>{}</opensearch:totalResults>{}</feed>"
            ),
            total,
            entries.concat()
        )
    }

    fn query_matcher(search_query: &str, start: usize) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("search_query".into(), search_query.into()),
            Matcher::UrlEncoded("start".into(), start.to_string()),
        ])
    }

    #[test]
    fn test_plan_requires_criteria() {
        assert!(matches!(SubRequest::plan(Some("  "), &[]), Err(ConfigError::NoCriteria)));
        let plan = SubRequest::plan(Some("numerical relativity"), &["Katy Clough".into()]).unwrap();
        assert_eq!(
            plan,
            vec![
                SubRequest::Topic("numerical relativity".into()),
                SubRequest::Author("Katy Clough".into())
            ]
        );
        assert_eq!(plan[0].search_query(), "all:\"numerical relativity\"");
        assert_eq!(plan[1].search_query(), "au:\"Katy Clough\"");
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        let window = DateWindow::ending(today(), 15);
        assert!(window.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
        assert!(window.contains(today()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2025, 7, 17).unwrap()));
    }

    #[test]
    fn test_window_clamps_huge_days_back() {
        let window = DateWindow::ending(today(), u32::MAX);
        assert_eq!(window.start, NaiveDate::MIN);
        assert_eq!(window.end, today());
        assert!(window.contains(NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()));
    }

    #[tokio::test]
    async fn test_paginates_and_filters_window() {
        let mut server = Server::new_async().await;
        let q = "all:\"numerical relativity\"";
        let page0 = server
            .mock("GET", "/api/query")
            .match_query(query_matcher(q, 0))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(3, &[entry("2507.00003", "2025-07-10"), entry("2507.00002", "2025-07-01")]))
            .expect(1)
            .create_async()
            .await;
        let page1 = server
            .mock("GET", "/api/query")
            .match_query(query_matcher(q, 2))
            .with_status(200)
            .with_body(feed(3, &[entry("2506.00001", "2025-06-30")]))
            .expect(1)
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 2)).unwrap();
        let outcome = fetcher
            .fetch_detailed(Some("numerical relativity"), &[], 15, 100, today())
            .await
            .unwrap();

        let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2507.00003", "2507.00002"]);
        assert!(outcome.failed.is_empty());
        page0.assert_async().await;
        page1.assert_async().await;
    }

    #[tokio::test]
    async fn test_stops_paging_once_past_window() {
        let mut server = Server::new_async().await;
        let q = "all:\"numerical relativity\"";
        let page0 = server
            .mock("GET", "/api/query")
            .match_query(query_matcher(q, 0))
            .with_status(200)
            .with_body(feed(10, &[entry("2507.00003", "2025-07-10"), entry("2506.00020", "2025-06-20")]))
            .expect(1)
            .create_async()
            .await;
        let page1 = server
            .mock("GET", "/api/query")
            .match_query(query_matcher(q, 2))
            .with_status(200)
            .with_body(feed(10, &[entry("2506.00010", "2025-06-10")]))
            .expect(0)
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 2)).unwrap();
        let outcome = fetcher
            .fetch_detailed(Some("numerical relativity"), &[], 15, 100, today())
            .await
            .unwrap();

        let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2507.00003"]);
        page0.assert_async().await;
        page1.assert_async().await;
    }

    #[tokio::test]
    async fn test_requests_are_spaced_by_interval() {
        let mut server = Server::new_async().await;
        let requests = server
            .mock("GET", "/api/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(feed(1, &[entry("2507.00011", "2025-07-14")]))
            .expect(3)
            .create_async()
            .await;

        let interval = StdDuration::from_millis(100);
        let config = ArxivConfig {
            request_interval: interval,
            ..test_config(format!("{}/api/query", server.url()), 10)
        };
        let mut fetcher = ArxivFetcher::new(config).unwrap();
        let authors = vec!["Katy Clough".to_string(), "Josu Aurrekoetxea".to_string()];
        let started = Instant::now();
        fetcher
            .fetch_detailed(Some("boson stars"), &authors, 30, 100, today())
            .await
            .unwrap();

        assert!(started.elapsed() >= interval * 2);
        requests.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_entries_are_counted() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(feed(2, &[entry("2507.00012", "2025-07-14"), entry("2507.00013", "yesterday")]))
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 10)).unwrap();
        let outcome = fetcher
            .fetch_detailed(None, &["Katy Clough".into()], 30, 100, today())
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped_entries, 1);
    }

    #[tokio::test]
    async fn test_dedups_across_sub_requests_and_caps_results() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/query")
            .match_query(query_matcher("all:\"boson stars\"", 0))
            .with_status(200)
            .with_body(feed(2, &[entry("2507.00005", "2025-07-12"), entry("2507.00004", "2025-07-11")]))
            .create_async()
            .await;
        server
            .mock("GET", "/api/query")
            .match_query(query_matcher("au:\"Katy Clough\"", 0))
            .with_status(200)
            .with_body(feed(3, &[
                entry("2507.00005", "2025-07-12"),
                entry("2507.00006", "2025-07-09"),
                entry("2507.00007", "2025-07-08"),
            ]))
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 10)).unwrap();
        let outcome = fetcher
            .fetch_detailed(Some("boson stars"), &["Katy Clough".into()], 30, 3, today())
            .await
            .unwrap();

        let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2507.00005", "2507.00004", "2507.00006"]);
    }

    #[tokio::test]
    async fn test_failed_sub_request_is_not_fatal() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/api/query")
            .match_query(query_matcher("all:\"boson stars\"", 0))
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/api/query")
            .match_query(query_matcher("au:\"Katy Clough\"", 0))
            .with_status(200)
            .with_body(feed(1, &[entry("2507.00009", "2025-07-14")]))
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 10)).unwrap();
        let outcome = fetcher
            .fetch_detailed(Some("boson stars"), &["Katy Clough".into()], 30, 100, today())
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.failed, vec![SubRequest::Topic("boson stars".into())]);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_recovers_from_malformed_body() {
        let mut server = Server::new_async().await;
        let q = "au:\"Katy Clough\"";
        let bad = server
            .mock("GET", "/api/query")
            .match_query(query_matcher(q, 0))
            .with_status(200)
            .with_body("<html>rate limited</html>")
            .expect(1)
            .create_async()
            .await;
        let good = server
            .mock("GET", "/api/query")
            .match_query(query_matcher(q, 0))
            .with_status(200)
            .with_body(feed(1, &[entry("2507.00010", "2025-07-15")]))
            .expect(1)
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 10)).unwrap();
        let outcome = fetcher
            .fetch_detailed(None, &["Katy Clough".into()], 30, 100, today())
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.failed.is_empty());
        bad.assert_async().await;
        good.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/query")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut fetcher = ArxivFetcher::new(test_config(format!("{}/api/query", server.url()), 10)).unwrap();
        let outcome = fetcher
            .fetch_detailed(Some("boson stars"), &["Katy Clough".into()], 30, 100, today())
            .await
            .unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_no_criteria_is_config_error() {
        let mut fetcher = ArxivFetcher::new(test_config("http://127.0.0.1:9/api/query".into(), 10)).unwrap();
        let result = fetcher.fetch(None, &[], 30, 100).await;
        assert!(matches!(result, Err(ConfigError::NoCriteria)));
    }
}
