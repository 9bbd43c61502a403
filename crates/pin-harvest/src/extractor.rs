//! Turns pin containers into ledger rows and downloads.
//!
//! The responsive candidate list is trusted to be sorted ascending, so the
//! last entry is taken as the largest variant without comparing descriptors.
//! Ledger rows are written before the download runs; a failed download
//! leaves its rows in place.

use crate::fetcher::AssetFetcher;
use crate::ledger::DedupLedger;
use crate::run_dir::RunDirectory;
use crate::session::BrowserSession;
use crate::types::{Candidate, DownloadOutcome, HarvestError, HarvestResult, SkipReason};

/// Parse a `srcset` value into `url descriptor` candidates, in source order.
pub fn parse_srcset(srcset: &str) -> Vec<Candidate> {
    srcset
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            Some(Candidate {
                url: url.to_string(),
                descriptor: parts.next().map(str::to_string),
            })
        })
        .collect()
}

fn skip_reason(e: HarvestError) -> SkipReason {
    match e {
        HarvestError::Ledger(e) => SkipReason::LedgerError(e.to_string()),
        other => SkipReason::Unreadable(other.to_string()),
    }
}

/// Per-run extraction stage; borrows the run's ledger and fetcher.
pub struct VariantExtractor<'a> {
    ledger: &'a DedupLedger,
    fetcher: &'a AssetFetcher,
    run_dir: &'a RunDirectory,
    overwrite_existing: bool,
}

impl<'a> VariantExtractor<'a> {
    pub fn new(
        ledger: &'a DedupLedger,
        fetcher: &'a AssetFetcher,
        run_dir: &'a RunDirectory,
        overwrite_existing: bool,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            run_dir,
            overwrite_existing,
        }
    }

    /// Process containers one at a time, in discovery order.
    pub async fn extract_all<S: BrowserSession>(
        &self,
        session: &S,
        containers: &[S::Element],
    ) -> Vec<DownloadOutcome> {
        let mut outcomes = Vec::with_capacity(containers.len());
        for (i, container) in containers.iter().enumerate() {
            let outcome = self.extract(session, container).await;
            tracing::debug!("container {}: {:?}", i + 1, outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Process one container. Failures are folded into the outcome.
    pub async fn extract<S: BrowserSession>(
        &self,
        session: &S,
        container: &S::Element,
    ) -> DownloadOutcome {
        match self.try_extract(session, container).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Skipping container: {e}");
                DownloadOutcome::Skipped(skip_reason(e))
            }
        }
    }

    async fn try_extract<S: BrowserSession>(
        &self,
        session: &S,
        container: &S::Element,
    ) -> HarvestResult<DownloadOutcome> {
        let Some(img) = session.query_selector(container, "img").await? else {
            tracing::debug!("Container has no img element");
            return Ok(DownloadOutcome::Skipped(SkipReason::NoImageElement));
        };

        let srcset = session.get_attribute(&img, "srcset").await?;
        let src = session.get_attribute(&img, "src").await?;

        let candidates = srcset.as_deref().map(parse_srcset).unwrap_or_default();
        if !candidates.is_empty() {
            return self.handle_candidates(&candidates).await;
        }

        match src.filter(|s| !s.trim().is_empty()) {
            Some(src) => self.handle_single_source(src.trim()).await,
            None => {
                tracing::debug!("img has neither srcset nor src");
                Ok(DownloadOutcome::Skipped(SkipReason::NoSourceAttribute))
            }
        }
    }

    async fn handle_candidates(&self, candidates: &[Candidate]) -> HarvestResult<DownloadOutcome> {
        let Some(largest) = candidates.last() else {
            return Ok(DownloadOutcome::Skipped(SkipReason::NoSourceAttribute));
        };

        if let Some(record) = self.ledger.exists(&largest.url)? {
            tracing::info!(
                "Image {} already collected by run {}",
                largest.url,
                record.origin_run_directory
            );
            return Ok(DownloadOutcome::AlreadyCollected {
                url: largest.url.clone(),
                origin_run_directory: record.origin_run_directory,
            });
        }

        let run_label = self.run_dir.label();
        for candidate in candidates {
            self.ledger
                .insert(&candidate.url, &run_label, candidate.descriptor.as_deref())?;
        }

        tracing::info!(
            "Largest variant ({}) of {} candidates: {}",
            largest.descriptor.as_deref().unwrap_or("?"),
            candidates.len(),
            largest.url
        );
        Ok(self.download(&largest.url).await)
    }

    async fn handle_single_source(&self, src: &str) -> HarvestResult<DownloadOutcome> {
        let existing = self.ledger.exists(src)?;
        if let Some(record) = &existing {
            if !self.overwrite_existing {
                tracing::info!(
                    "Image {src} already collected by run {}",
                    record.origin_run_directory
                );
                return Ok(DownloadOutcome::AlreadyCollected {
                    url: src.to_string(),
                    origin_run_directory: record.origin_run_directory.clone(),
                });
            }
            tracing::info!("Overwrite requested, downloading {src} again");
        }

        self.ledger.insert(src, &self.run_dir.label(), None)?;
        Ok(self.download(src).await)
    }

    async fn download(&self, url: &str) -> DownloadOutcome {
        if self.fetcher.fetch(url, self.run_dir.path(), None).await {
            DownloadOutcome::Downloaded {
                url: url.to_string(),
                file_name: crate::fetcher::file_name_from_url(url).unwrap_or_default(),
            }
        } else {
            DownloadOutcome::Failed {
                url: url.to_string(),
            }
        }
    }
}
