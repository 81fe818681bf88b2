use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    config::{ArxivConfig, PageConfig, QueryConfig},
    error::PipelineError,
    fetcher::ArxivFetcher,
    format::HtmlFormatter,
    storage::{write_atomic, MergeStats, PaperStore},
};

/// Counts from one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub failed_requests: usize,
    /// feed entries dropped because they failed validation.
    pub skipped_entries: usize,
    pub merge: MergeStats,
    pub total: usize,
}

/// Fetch, merge, persist, render. The store is saved before the page is
/// written, and only once the whole fetch has finished.
pub struct Pipeline {
    fetcher: ArxivFetcher,
    formatter: HtmlFormatter,
    query: QueryConfig,
}

impl Pipeline {
    /// Rejects a run without search criteria before touching the network or disk.
    pub fn new(arxiv: ArxivConfig, query: QueryConfig, page: PageConfig) -> Result<Self, PipelineError> {
        query.validate()?;
        let fetcher = ArxivFetcher::new(arxiv).map_err(PipelineError::Client)?;
        let formatter = HtmlFormatter::new(page)?;
        Ok(Pipeline {
            fetcher,
            formatter,
            query,
        })
    }

    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&mut self, now: DateTime<Utc>) -> Result<RunReport, PipelineError> {
        let store = PaperStore::load(&self.query.store);
        info!(path = %self.query.store.display(), papers = store.len(), "store loaded");

        let outcome = self.fetcher
            .fetch_detailed(
                self.query.query.as_deref(),
                &self.query.authors,
                self.query.days_back,
                self.query.max_results,
                now.date_naive(),
            )
            .await?;
        let fetched = outcome.records.len();
        let failed_requests = outcome.failed.len();
        let skipped_entries = outcome.skipped_entries;

        let (store, merge) = store.merge(outcome.records);
        store.save(&self.query.store)?;

        let html = self.formatter.render(store.records(), now)?;
        write_atomic(&self.query.output, html.as_bytes())?;

        let report = RunReport {
            fetched,
            failed_requests,
            skipped_entries,
            merge,
            total: store.len(),
        };
        info!(
            fetched = report.fetched,
            skipped = report.skipped_entries,
            added = report.merge.added,
            refreshed = report.merge.refreshed,
            total = report.total,
            output = %self.query.output.display(),
            "page written"
        );
        Ok(report)
    }
}
