//! GBIF occurrence search paging.
//!
//! One request per `(status, offset)` pair against the occurrence search
//! endpoint, filtered by the query geometry (WKT) and the
//! `iucnRedListCategory`. A status is paged from offset 0 until a page
//! comes back empty or GBIF reports `endOfRecords`.
//!
//! See <https://techdocs.gbif.org/en/openapi/v1/occurrence#/Searching%20occurrences>

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use species_map_http::{HttpClient, HttpError, HttpRequest, Sleeper};
use species_map_occurrence_models::{OccurrenceRecord, RecordKey, ThreatStatus};

use crate::OccurrenceError;
use crate::collection::OccurrenceSet;
use crate::progress::{ProgressCallback, null_progress};
use crate::retry::{RetryError, RetryPolicy, retry_after_delay, retry_with_policy};

/// Public GBIF occurrence search endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.gbif.org/v1/occurrence/search";

/// Records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 300;

/// Pause between consecutive pages of the same status.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(200);

/// What to fetch and how fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Statuses to page through, in order. Repeats are ignored.
    pub statuses: Vec<ThreatStatus>,
    /// Records per page. Never below 1.
    pub page_size: u32,
    /// Pause between consecutive pages of the same status.
    pub page_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            statuses: ThreatStatus::DEFAULT.to_vec(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

impl FetchOptions {
    /// Replaces the status list.
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[ThreatStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Sets the page size, raising 0 to 1.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the pause between pages.
    #[must_use]
    pub const fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Statuses in first-seen order with repeats dropped.
    #[must_use]
    pub fn unique_statuses(&self) -> Vec<ThreatStatus> {
        let mut seen = BTreeSet::new();
        self.statuses
            .iter()
            .copied()
            .filter(|status| seen.insert(*status))
            .collect()
    }
}

/// One page of GBIF search results.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GbifPage {
    results: Option<Vec<OccurrenceRecord>>,
    end_of_records: Option<bool>,
}

/// Pages GBIF occurrence search results into a deduplicated collection.
pub struct OccurrenceFetcher {
    http: Arc<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    base_url: String,
    retry: RetryPolicy<HttpError>,
    progress: Arc<dyn ProgressCallback>,
}

impl OccurrenceFetcher {
    /// Creates a fetcher against the public GBIF endpoint with the default
    /// retry policy and no progress reporting.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            http,
            sleeper,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::http(),
            progress: null_progress(),
        }
    }

    /// Overrides the occurrence search URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.clone_into(&mut self.base_url);
        self
    }

    /// Overrides the per-page retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy<HttpError>) -> Self {
        self.retry = retry;
        self
    }

    /// Reports fetched record counts to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetches every occurrence inside `geometry_wkt` matching any of the
    /// requested statuses.
    ///
    /// Statuses are paged one after another into a single collection keyed
    /// by GBIF identifier, so a record listed under two statuses appears
    /// once (holding the later copy). Records without an identifier are
    /// keyed by where they were seen. Output order is first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError::Transient`] if a page still fails after
    /// the retry budget, and [`OccurrenceError::Failed`] as soon as a page
    /// fails in a way retrying cannot fix. No partial result is returned.
    pub async fn fetch_occurrences(
        &self,
        geometry_wkt: &str,
        options: &FetchOptions,
    ) -> Result<Vec<OccurrenceRecord>, OccurrenceError> {
        let page_size = options.page_size.max(1);
        let mut occurrences = OccurrenceSet::new();

        for status in options.unique_statuses() {
            self.progress
                .set_message(format!("Fetching {status} ({}) occurrences", status.label()));
            let before = occurrences.len();
            let mut offset = 0_u64;

            loop {
                let page = self
                    .request_page(geometry_wkt, status, offset, page_size)
                    .await?;
                let results = page.results.unwrap_or_default();
                if results.is_empty() {
                    break;
                }

                let count = results.len();
                for record in results {
                    let key = record.identifier().map_or_else(
                        || RecordKey::Synthetic {
                            status,
                            offset,
                            ordinal: occurrences.len(),
                        },
                        RecordKey::Id,
                    );
                    occurrences.insert(key, record);
                }
                log::debug!("  {status} offset {offset}: {count} records");
                self.progress.inc(u64::try_from(count).unwrap_or(u64::MAX));

                if page.end_of_records.unwrap_or(false) {
                    break;
                }
                offset += u64::from(page_size);
                self.sleeper.sleep(options.page_delay).await;
            }

            log::info!(
                "{status}: {} new occurrences ({} total)",
                occurrences.len() - before,
                occurrences.len()
            );
        }

        self.progress
            .finish(format!("{} occurrences fetched", occurrences.len()));
        Ok(occurrences.into_records())
    }

    /// Fetches one page, retrying transient failures.
    ///
    /// A rate-limited response first waits out its `Retry-After` hint,
    /// then counts as an ordinary transient failure for the retry policy.
    async fn request_page(
        &self,
        geometry_wkt: &str,
        status: ThreatStatus,
        offset: u64,
        page_size: u32,
    ) -> Result<GbifPage, OccurrenceError> {
        let request = HttpRequest::new(&self.base_url)
            .with_query("geometry", geometry_wkt)
            .with_query("iucnRedListCategory", status)
            .with_query("limit", page_size)
            .with_query("offset", offset);

        let result = retry_with_policy(&self.retry, self.sleeper.as_ref(), |attempt| {
            let request = &request;
            async move {
                let response = self.http.get(request).await?;
                if response.is_rate_limited() {
                    let wait = retry_after_delay(response.header("retry-after"));
                    log::warn!(
                        "Rate limited on {status}@{offset} (attempt {attempt}), waiting {wait:?}"
                    );
                    self.sleeper.sleep(wait).await;
                }
                response.error_for_status()?.json::<GbifPage>()
            }
        })
        .await;

        result.map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => OccurrenceError::Transient {
                status,
                offset,
                attempts,
                source: last,
            },
            RetryError::Permanent { error, .. } => OccurrenceError::Failed {
                status,
                offset,
                source: error,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use species_map_http::HttpResponse;
    use species_map_http::testing::{FakeHttpClient, RecordingSleeper, json_response};
    use std::sync::atomic::{AtomicU64, Ordering};

    const WKT: &str = "POLYGON((-74.2 41.8, -74.1 41.8, -74.1 41.9, -74.2 41.9, -74.2 41.8))";

    fn page(records: &[serde_json::Value], end_of_records: bool) -> HttpResponse {
        json_response(
            200,
            &serde_json::json!({
                "offset": 0,
                "limit": 2,
                "endOfRecords": end_of_records,
                "results": records,
            }),
        )
    }

    fn occurrence(id: u64, name: &str) -> serde_json::Value {
        serde_json::json!({"gbifID": id, "scientificName": name})
    }

    fn ids(records: &[OccurrenceRecord]) -> Vec<String> {
        records.iter().filter_map(OccurrenceRecord::identifier).collect()
    }

    fn fetcher(http: &Arc<FakeHttpClient>, sleeper: &Arc<RecordingSleeper>) -> OccurrenceFetcher {
        OccurrenceFetcher::new(http.clone(), sleeper.clone())
    }

    fn options(statuses: &[ThreatStatus]) -> FetchOptions {
        FetchOptions::default()
            .with_statuses(statuses)
            .with_page_size(2)
    }

    /// Routes on `(iucnRedListCategory, offset)`.
    fn routed(
        route: impl Fn(&str, &str) -> HttpResponse + Send + Sync + 'static,
    ) -> Arc<FakeHttpClient> {
        Arc::new(FakeHttpClient::new(move |request| {
            Ok(route(
                request.query_value("iucnRedListCategory").unwrap_or_default(),
                request.query_value("offset").unwrap_or_default(),
            ))
        }))
    }

    #[tokio::test]
    async fn pages_until_end_of_records() {
        let http = routed(|_, offset| match offset {
            "0" => page(&[occurrence(1, "a"), occurrence(2, "b")], false),
            "2" => page(&[occurrence(3, "c")], true),
            other => panic!("unexpected offset {other}"),
        });
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::CriticallyEndangered]))
            .await
            .unwrap();

        assert_eq!(ids(&records), ["1", "2", "3"]);
        assert_eq!(http.request_count(), 2);
        assert_eq!(sleeper.sleeps(), [DEFAULT_PAGE_DELAY]);
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let http = routed(|_, offset| match offset {
            "0" => page(&[occurrence(1, "a"), occurrence(2, "b")], false),
            _ => page(&[], false),
        });
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::Endangered]))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(http.request_count(), 2);
        assert_eq!(sleeper.sleeps(), [DEFAULT_PAGE_DELAY]);
    }

    #[tokio::test]
    async fn empty_first_page_issues_no_delay() {
        let http = routed(|_, _| page(&[], false));
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &FetchOptions::default())
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(http.request_count(), 4);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn null_results_count_as_empty() {
        let http = routed(|_, _| json_response(200, &serde_json::json!({"results": null})));
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::Vulnerable]))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn record_in_two_statuses_is_kept_once() {
        let http = routed(|status, _| match status {
            "CR" => page(&[occurrence(1, "a"), occurrence(2, "from CR")], true),
            "EN" => page(&[occurrence(2, "from EN"), occurrence(3, "c")], true),
            other => panic!("unexpected status {other}"),
        });
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(
                WKT,
                &options(&[ThreatStatus::CriticallyEndangered, ThreatStatus::Endangered]),
            )
            .await
            .unwrap();

        assert_eq!(ids(&records), ["1", "2", "3"]);
        assert_eq!(records[1].get_str("scientificName"), Some("from EN"));
    }

    #[tokio::test]
    async fn repeated_status_is_paged_once() {
        let http = routed(|_, _| page(&[serde_json::json!({"scientificName": "no id"})], true));
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(
                WKT,
                &options(&[ThreatStatus::NearThreatened, ThreatStatus::NearThreatened]),
            )
            .await
            .unwrap();

        assert_eq!(http.request_count(), 1);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn records_without_identifier_are_all_kept() {
        let http = routed(|status, _| {
            let anonymous = serde_json::json!({"scientificName": status});
            match status {
                "CR" => page(&[anonymous.clone(), anonymous], true),
                _ => page(&[anonymous], true),
            }
        });
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(
                WKT,
                &options(&[ThreatStatus::CriticallyEndangered, ThreatStatus::Endangered]),
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.identifier().is_none()));
    }

    #[tokio::test]
    async fn sends_geometry_status_and_paging_params() {
        let http = routed(|_, _| page(&[], true));
        let sleeper = Arc::new(RecordingSleeper::new());

        fetcher(&http, &sleeper)
            .with_base_url("http://localhost:9000/occurrence/search")
            .fetch_occurrences(
                WKT,
                &FetchOptions::default().with_statuses(&[ThreatStatus::Vulnerable]),
            )
            .await
            .unwrap();

        let request = &http.requests()[0];
        assert_eq!(request.url, "http://localhost:9000/occurrence/search");
        assert_eq!(request.query_value("geometry"), Some(WKT));
        assert_eq!(request.query_value("iucnRedListCategory"), Some("VU"));
        assert_eq!(request.query_value("limit"), Some("300"));
        assert_eq!(request.query_value("offset"), Some("0"));
    }

    #[tokio::test]
    async fn rate_limit_waits_for_retry_after_then_recovers() {
        let http = Arc::new(FakeHttpClient::scripted(vec![
            Ok(page(&[occurrence(1, "a"), occurrence(2, "b")], false)),
            Ok(HttpResponse::new(429, "slow down").with_header("Retry-After", "2")),
            Ok(page(&[occurrence(3, "c")], true)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::CriticallyEndangered]))
            .await
            .unwrap();

        assert_eq!(ids(&records), ["1", "2", "3"]);
        assert_eq!(http.request_count(), 3);
        assert_eq!(
            sleeper.sleeps(),
            [
                DEFAULT_PAGE_DELAY,
                Duration::from_secs(2),
                Duration::from_secs(1),
            ]
        );
        assert!(sleeper.total() >= Duration::from_secs(2));
        let offsets: Vec<String> = http
            .requests()
            .iter()
            .map(|r| r.query_value("offset").unwrap().to_string())
            .collect();
        assert_eq!(offsets, ["0", "2", "2"]);
    }

    #[tokio::test]
    async fn rate_limit_without_hint_waits_one_second() {
        let http = Arc::new(FakeHttpClient::scripted(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(page(&[], true)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::Endangered]))
            .await
            .unwrap();

        assert_eq!(
            sleeper.sleeps(),
            [Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn oversized_retry_after_is_capped() {
        let http = Arc::new(FakeHttpClient::scripted(vec![
            Ok(HttpResponse::new(429, "").with_header("Retry-After", "1e30")),
            Ok(page(&[occurrence(7, "g")], true)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let records = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::Endangered]))
            .await
            .unwrap();

        assert_eq!(ids(&records), ["7"]);
        assert_eq!(
            sleeper.sleeps(),
            [crate::retry::RATE_LIMIT_CEILING, Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn client_error_fails_immediately() {
        let http = routed(|_, _| HttpResponse::new(400, "bad geometry"));
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::CriticallyEndangered]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OccurrenceError::Failed {
                status: ThreatStatus::CriticallyEndangered,
                offset: 0,
                source: HttpError::Status { status: 400, .. },
            }
        ));
        assert_eq!(http.request_count(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn undecodable_page_fails_immediately() {
        let http = routed(|_, _| HttpResponse::new(200, "<html>oops</html>"));
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::CriticallyEndangered]))
            .await
            .unwrap_err();

        assert!(matches!(err.http_error(), HttpError::Json(_)));
        assert_eq!(http.request_count(), 1);
    }

    #[tokio::test]
    async fn persistent_server_error_exhausts_budget() {
        let http = routed(|_, _| HttpResponse::new(503, "unavailable"));
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::CriticallyEndangered]))
            .await
            .unwrap_err();

        match err {
            OccurrenceError::Transient {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(source.status(), Some(503));
            }
            other @ OccurrenceError::Failed { .. } => panic!("expected transient, got {other}"),
        }
        assert_eq!(http.request_count(), 5);
        assert_eq!(
            sleeper.sleeps(),
            [1, 2, 4, 8].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test]
    async fn failure_after_pages_returns_no_partial_result() {
        let http = routed(|_, offset| match offset {
            "0" => page(&[occurrence(1, "a"), occurrence(2, "b")], false),
            _ => HttpResponse::new(403, "forbidden"),
        });
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = fetcher(&http, &sleeper)
            .fetch_occurrences(WKT, &options(&[ThreatStatus::CriticallyEndangered]))
            .await
            .unwrap_err();
        assert!(matches!(err, OccurrenceError::Failed { offset: 2, .. }));
    }

    #[derive(Default)]
    struct CountingProgress {
        count: AtomicU64,
    }

    impl ProgressCallback for CountingProgress {
        fn inc(&self, delta: u64) {
            self.count.fetch_add(delta, Ordering::Relaxed);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
    }

    #[tokio::test]
    async fn progress_counts_every_fetched_record() {
        let http = routed(|status, _| match status {
            "CR" => page(&[occurrence(1, "a"), occurrence(2, "b")], true),
            _ => page(&[occurrence(2, "b")], true),
        });
        let sleeper = Arc::new(RecordingSleeper::new());
        let progress = Arc::new(CountingProgress::default());

        let records = fetcher(&http, &sleeper)
            .with_progress(progress.clone())
            .fetch_occurrences(
                WKT,
                &options(&[ThreatStatus::CriticallyEndangered, ThreatStatus::Endangered]),
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(progress.count.load(Ordering::Relaxed), 3);
    }
}
