//! One harvest invocation from start to finish.

use chrono::Local;

use crate::config::HarvestOptions;
use crate::extractor::VariantExtractor;
use crate::fetcher::AssetFetcher;
use crate::ledger::DedupLedger;
use crate::orchestrator::ScrollOrchestrator;
use crate::run_dir::RunDirectory;
use crate::session::BrowserSession;
use crate::types::{HarvestReport, HarvestResult};

/// Harvest `options.target_url` through `session`.
///
/// Creates a fresh run directory, opens the ledger for the duration of the
/// scroll loop, and closes it again whether the loop ends normally, early on
/// the sentinel, or with a navigation failure.
pub async fn harvest<S: BrowserSession>(
    session: &S,
    options: &HarvestOptions,
) -> HarvestResult<HarvestReport> {
    options.validate()?;

    let fetcher = AssetFetcher::new(&options.fetch)?;
    let run_dir = RunDirectory::create(&options.output_root, Local::now())?;
    let ledger = DedupLedger::open(&options.ledger_path)?;
    tracing::info!(
        "Harvest started: target={}, run={}, ledger={}",
        options.target_url,
        run_dir,
        options.ledger_path.display()
    );

    let mut report = HarvestReport {
        run_directory: run_dir.path().to_path_buf(),
        ..HarvestReport::default()
    };

    let outcome = {
        let extractor =
            VariantExtractor::new(&ledger, &fetcher, &run_dir, options.overwrite_existing);
        ScrollOrchestrator::new(options.scroll.clone())
            .run(session, &options.target_url, &extractor, &mut report)
            .await
    };

    if let Err(e) = ledger.close() {
        tracing::warn!("Ledger close failed: {e}");
    }

    outcome?;
    tracing::info!(
        "Harvest finished: {} downloaded, {} already collected, {} failed, {} skipped",
        report.downloaded,
        report.already_collected,
        report.failed,
        report.skipped
    );
    Ok(report)
}
