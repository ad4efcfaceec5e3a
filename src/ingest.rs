use chrono_tz::Tz;
use log::{error, info};

use crate::db::ReportStore;
use crate::error::{IngestError, StoreError};
use crate::extractor::{Feed, filter_reports, parse_report};
use crate::feed::FeedSource;
use crate::models::{NewReport, Report};
use crate::sequence::{FailurePolicy, run_sequential};
use crate::snatcher::PhotoSnatch;

/// Fetch → parse → filter → store → snatch, for the surf report feed.
pub struct Ingestor<'a, F, S, P> {
    feed: &'a F,
    store: &'a S,
    snatcher: &'a P,
    tz: Tz,
}

impl<'a, F, S, P> Ingestor<'a, F, S, P>
where
    F: FeedSource,
    S: ReportStore,
    P: PhotoSnatch,
{
    pub fn new(feed: &'a F, store: &'a S, snatcher: &'a P, tz: Tz) -> Self {
        Self {
            feed,
            store,
            snatcher,
            tz,
        }
    }

    /// Hit one page of the feed and create any reports we're missing.
    ///
    /// Reports are created in feed order, one at a time, and a new report's photos are all
    /// snatched before the next report is looked at. A report that fails to save is logged and
    /// skipped; a page that can't be fetched or parsed fails as a whole.
    pub async fn ingest_page(&self, page: u32) -> Result<(), IngestError> {
        info!("Processing RSS feed...");
        self.process_page(page).await.inspect_err(|e| {
            error!("Error processing RSS feed page {}: {}", page, e);
        })
    }

    async fn process_page(&self, page: u32) -> Result<(), IngestError> {
        let xml = self.feed.fetch_page(page).await?;
        let feed = Feed::parse(&xml)?;
        if feed.is_empty() {
            info!("Page {} has no posts", page);
            return Ok(());
        }
        let total = feed.len();

        let reports = filter_reports(feed)
            .into_iter()
            .map(|post| parse_report(post, self.tz))
            .collect::<Result<Vec<NewReport>, _>>()?;
        info!("{} of {} posts look like surf reports", reports.len(), total);

        let results = run_sequential(
            reports.iter().map(|report| move || self.ingest_report(report)),
            FailurePolicy::Continue,
        )
        .await?;

        let created = results.iter().filter(|r| matches!(r, Some(true))).count();
        info!("Finished processing RSS feed ({} new reports)", created);
        Ok(())
    }

    async fn ingest_report(&self, report: &NewReport) -> Result<bool, StoreError> {
        let outcome = self.store.create_report(report)?;
        if outcome.created {
            info!("Created report {}.", report.guid);
            self.snatch_photos(&outcome.report).await;
        }
        Ok(outcome.created)
    }

    /// Download every photo of a report, in order. Returns how many made it.
    pub async fn snatch_photos(&self, report: &Report) -> usize {
        let tasks = report.images.iter().enumerate().map(|(index, url)| {
            let filename = Report::photo_filename(report.guid, index);
            move || async move { self.snatcher.snatch(url, &filename).await }
        });

        let saved = run_sequential(tasks, FailurePolicy::Continue)
            .await
            .unwrap_or_default()
            .iter()
            .flatten()
            .count();

        if saved < report.images.len() {
            error!(
                "Only snatched {} of {} photos for report {}",
                saved,
                report.images.len(),
                report.guid
            );
        }
        saved
    }

    /// Sync the whole history of the feed: keep paging until the feed says there's no more.
    /// Returns the number of pages processed.
    pub async fn crawl_all(&self) -> Result<u32, IngestError> {
        let mut page = 1;
        loop {
            info!("fetching RSS page {}", page);
            match self.ingest_page(page).await {
                Ok(()) => page += 1,
                Err(e) if e.is_not_found() => {
                    let fetched = page - 1;
                    info!("Finished. Fetched {} pages.", fetched);
                    return Ok(fetched);
                }
                Err(e) => {
                    match &e {
                        IngestError::Fetch(fetch) => error!(
                            "error fetching RSS page {} (status {:?}): {}",
                            page,
                            fetch.status(),
                            e
                        ),
                        _ => error!("error fetching RSS page {}: {}", page, e),
                    }
                    return Err(e);
                }
            }
        }
    }
}
