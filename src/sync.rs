//! Sync pass orchestration: fetch → reconcile → enrich → persist.
//!
//! Each pass is synchronous and single-threaded: one network fetch, a
//! bounded number of file reads and writes, no internal retries. A fetch
//! failure aborts the pass before anything is written.
//!
//! A sync pass is NOT safe to invoke concurrently with itself: the
//! memo-exists check and the memo write are not atomic, so two
//! overlapping passes can both enrich the same submission. Callers that
//! expose sync behind an endpoint must hold a single-flight lock.

use chrono::Utc;
use log::info;

use crate::config::Config;
use crate::enrich::{enrich_batch, EnrichmentService};
use crate::error::PassError;
use crate::ledger::{rebuild_from_memos, Ledger};
use crate::memo_store::{BackfillOutcome, MemoStore};
use crate::reconcile::reconcile;
use crate::sheet::fetch_submissions;
use crate::types::{EnrichOutcome, ReconcileReport, Submission, SyncSummary};

/// Everything one sync pass produced, for reporting.
#[derive(Debug)]
pub struct SyncResult {
    pub summary: SyncSummary,
    pub report: ReconcileReport,
    pub outcome: EnrichOutcome,
}

/// Full sync pass against the live sheet.
pub fn run_sync(
    config: &Config,
    max_batch: usize,
    service: &dyn EnrichmentService,
) -> Result<SyncResult, PassError> {
    let submissions = fetch_submissions(&config.sheet_url)?;
    sync_snapshot(&submissions, config, max_batch, service)
}

/// Sync against an already-fetched snapshot. Split out so the pipeline
/// around the network boundary is testable end to end.
pub fn sync_snapshot(
    submissions: &[Submission],
    config: &Config,
    max_batch: usize,
    service: &dyn EnrichmentService,
) -> Result<SyncResult, PassError> {
    let store = MemoStore::new(&config.analysis_dir);
    let mut ledger = Ledger::load(&config.ledger_path)?;

    let memos = store.list_memos()?;
    let existing_analyses = memos.len();

    let report = reconcile(submissions, &ledger, &memos);
    let outcome = enrich_batch(&report.new_submissions, max_batch, service, &store, &mut ledger);

    let with_token = submissions.iter().filter(|s| s.has_token()).count();
    ledger.finalize_sync(with_token);
    ledger.store(&config.ledger_path)?;

    let summary = SyncSummary {
        total_in_sheet: submissions.len(),
        existing_analyses,
        new_companies: report.new_submissions.len(),
        new_company_names: report
            .new_submissions
            .iter()
            .map(|s| s.company_name.clone())
            .collect(),
        enriched: outcome.succeeded.len(),
        failed: outcome.failed.len(),
        timestamp: Utc::now().to_rfc3339(),
    };

    info!(
        "sync: {} in sheet, {} existing, {} new, {} enriched, {} failed, {} deferred",
        summary.total_in_sheet,
        summary.existing_analyses,
        summary.new_companies,
        summary.enriched,
        summary.failed,
        outcome.deferred,
    );

    Ok(SyncResult { summary, report, outcome })
}

/// Report-only pass: fetch and reconcile, write nothing.
pub fn run_reconcile(config: &Config) -> Result<ReconcileReport, PassError> {
    let submissions = fetch_submissions(&config.sheet_url)?;
    let store = MemoStore::new(&config.analysis_dir);
    let ledger = Ledger::load(&config.ledger_path)?;
    Ok(reconcile(&submissions, &ledger, &store.list_memos()?))
}

/// Rebuild the ledger from the memo store plus a fresh snapshot and
/// persist it. The existing ledger file is only replaced after the fetch
/// and the full rebuild succeed.
pub fn run_rebuild(config: &Config) -> Result<Ledger, PassError> {
    let submissions = fetch_submissions(&config.sheet_url)?;
    let store = MemoStore::new(&config.analysis_dir);
    let ledger = rebuild_from_memos(&store, &submissions)?;
    ledger.store(&config.ledger_path)?;
    Ok(ledger)
}

/// Backfill missing tokens and submission dates on existing memos.
pub fn run_backfill(config: &Config) -> Result<BackfillOutcome, PassError> {
    let submissions = fetch_submissions(&config.sheet_url)?;
    let store = MemoStore::new(&config.analysis_dir);
    Ok(store.backfill_from_sheet(&submissions)?)
}
