//! Reconciliation engine: compare the submission sheet, the token
//! ledger, and the memo store; compute new work and surface every
//! inconsistency.
//!
//! Identity policy: the durable token wins. Company names are user-typed
//! free text that drifts across resubmissions; the token is assigned once
//! by the source. Name matching survives only as a fallback for rows that
//! never captured a token. A submission with a fresh token that misses
//! the ledger is new even when its name would have matched a stale entry.

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::identity::normalize_key;
use crate::ledger::Ledger;
use crate::types::{
    DuplicateGroup, MemoSummary, NameCollision, ReconcileReport, Submission, TokenRecord,
};

/// How a submission was matched against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Token present and already analyzed.
    ByToken,
    /// No token on the row; a ledger entry's normalized name matched.
    ByName,
    /// No coverage — enrichment queue.
    New,
}

/// Ordered matching strategies: token first, normalized name only when
/// the row carries no token.
pub fn classify_submission(
    submission: &Submission,
    analyzed_tokens: &BTreeSet<&str>,
    ledger_names: &BTreeSet<String>,
) -> Coverage {
    if submission.has_token() {
        if analyzed_tokens.contains(submission.token.as_str()) {
            return Coverage::ByToken;
        }
        return Coverage::New;
    }

    if ledger_names.contains(&normalize_key(&submission.company_name)) {
        return Coverage::ByName;
    }

    Coverage::New
}

/// One full reconciliation pass over a fresh submission snapshot.
///
/// Pure with respect to its inputs: nothing here reads or writes disk.
/// The caller fetches the snapshot (fatal on failure — no partial report
/// is ever produced), loads the ledger, and scans the memo store.
pub fn reconcile(
    submissions: &[Submission],
    ledger: &Ledger,
    memos: &[MemoSummary],
) -> ReconcileReport {
    let analyzed_tokens: BTreeSet<&str> = ledger.token_set().into_iter().collect();
    let ledger_names: BTreeSet<String> = ledger.normalized_name_set().into_iter().collect();

    // New work, preserving source order.
    let new_submissions: Vec<Submission> = submissions
        .iter()
        .filter(|s| classify_submission(s, &analyzed_tokens, &ledger_names) == Coverage::New)
        .cloned()
        .collect();

    // Cross-check: token sets from each of the three stores. First
    // occurrence wins when a token repeats within one store.
    let mut sheet_tokens: BTreeMap<&str, &Submission> = BTreeMap::new();
    for s in submissions.iter().filter(|s| s.has_token()) {
        sheet_tokens.entry(s.token.as_str()).or_insert(s);
    }

    let mut memo_tokens: BTreeMap<&str, &MemoSummary> = BTreeMap::new();
    for m in memos {
        if let Some(token) = m.token.as_deref().filter(|t| !t.is_empty()) {
            memo_tokens.entry(token).or_insert(m);
        }
    }

    let missing_enrichment = sheet_tokens
        .iter()
        .filter(|(token, _)| !memo_tokens.contains_key(*token))
        .map(|(token, s)| TokenRecord {
            token: token.to_string(),
            company_name: s.company_name.clone(),
        })
        .collect();

    let dangling_ledger = ledger
        .analyzed_tokens
        .iter()
        .filter(|(token, _)| !memo_tokens.contains_key(token.as_str()))
        .map(|(token, entry)| TokenRecord {
            token: token.clone(),
            company_name: entry.company_name.clone(),
        })
        .collect();

    let stale_ledger = memo_tokens
        .iter()
        .filter(|(token, _)| !analyzed_tokens.contains(*token))
        .map(|(token, m)| TokenRecord {
            token: token.to_string(),
            company_name: m.company_name.clone(),
        })
        .collect();

    let source_drift = memo_tokens
        .iter()
        .filter(|(token, _)| !sheet_tokens.contains_key(*token))
        .map(|(token, m)| TokenRecord {
            token: token.to_string(),
            company_name: m.company_name.clone(),
        })
        .collect();

    let report = ReconcileReport {
        new_submissions,
        missing_enrichment,
        dangling_ledger,
        stale_ledger,
        source_drift,
        duplicates: find_duplicate_memos(memos),
        name_collisions: find_name_collisions(submissions),
    };

    info!(
        "reconcile: {} in sheet, {} new, {} missing memo, {} dangling, {} stale, {} drifted",
        submissions.len(),
        report.new_submissions.len(),
        report.missing_enrichment.len(),
        report.dangling_ledger.len(),
        report.stale_ledger.len(),
        report.source_drift.len(),
    );

    report
}

/// Memo files grouped by their exact declared company name; any group
/// with more than one file is a duplicate. The engine never guesses which
/// file is canonical.
pub fn find_duplicate_memos(memos: &[MemoSummary]) -> Vec<DuplicateGroup> {
    let mut by_name: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for m in memos {
        by_name
            .entry(m.company_name.as_str())
            .or_default()
            .push(m.filename.as_str());
    }

    by_name
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(name, mut files)| {
            files.sort_unstable();
            DuplicateGroup {
                company_name: name.to_string(),
                files: files.into_iter().map(String::from).collect(),
            }
        })
        .collect()
}

/// Distinct submitted company names collapsing to one normalized key.
/// Tolerated for matching purposes, but always reported — never merged
/// silently.
pub fn find_name_collisions(submissions: &[Submission]) -> Vec<NameCollision> {
    let mut by_key: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for s in submissions {
        let key = normalize_key(&s.company_name);
        if key.is_empty() {
            continue;
        }
        by_key.entry(key).or_default().insert(s.company_name.as_str());
    }

    by_key
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(key, names)| NameCollision {
            normalized_name: key,
            company_names: names.into_iter().map(String::from).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerEntry;

    fn make_submission(name: &str, token: &str) -> Submission {
        Submission {
            company_name: name.to_string(),
            token: token.to_string(),
            submitted_at: "2025-05-16 17:14:43".to_string(),
            raw_fields: Default::default(),
        }
    }

    fn make_summary(name: &str, token: Option<&str>) -> MemoSummary {
        MemoSummary {
            company_name: name.to_string(),
            token: token.map(String::from),
            filename: crate::identity::memo_filename(name),
        }
    }

    fn ledger_with(entries: &[(&str, &str, &str)]) -> Ledger {
        let mut ledger = Ledger::default();
        for (token, company, file) in entries {
            ledger.upsert(
                token.to_string(),
                LedgerEntry {
                    company_name: company.to_string(),
                    analysis_file: file.to_string(),
                    matched_at: "2025-05-16T17:14:43Z".to_string(),
                },
            );
        }
        ledger
    }

    #[test]
    fn test_empty_source_is_clean() {
        let report = reconcile(&[], &Ledger::default(), &[]);
        assert!(report.is_clean());
        assert!(report.new_submissions.is_empty());
    }

    #[test]
    fn test_everything_new_on_empty_ledger() {
        let subs = vec![
            make_submission("Beacon", "tok123"),
            make_submission("Counter Fin", "tok456"),
        ];
        let report = reconcile(&subs, &Ledger::default(), &[]);
        assert_eq!(report.new_submissions.len(), 2);
        // Token-keyed rows with no memo also show in the cross-check.
        assert_eq!(report.missing_enrichment.len(), 2);
    }

    #[test]
    fn test_covered_token_never_reported_new() {
        let subs = vec![make_submission("Beacon", "tok123")];
        let ledger = ledger_with(&[("tok123", "Beacon", "beacon_comprehensive_analysis.json")]);
        let memos = vec![make_summary("Beacon", Some("tok123"))];

        let report = reconcile(&subs, &ledger, &memos);
        assert!(report.new_submissions.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_source_order_preserved() {
        let subs = vec![
            make_submission("Zeta", "t1"),
            make_submission("Alpha", "t2"),
            make_submission("Mid", "t3"),
        ];
        let report = reconcile(&subs, &Ledger::default(), &[]);
        let names: Vec<&str> = report
            .new_submissions
            .iter()
            .map(|s| s.company_name.as_str())
            .collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_name_fallback_only_without_token() {
        let ledger = ledger_with(&[("tokg", "Graphio.ai", "graphioai_comprehensive_analysis.json")]);
        let tokens: BTreeSet<&str> = ledger.token_set().into_iter().collect();
        let names: BTreeSet<String> = ledger.normalized_name_set().into_iter().collect();

        // No token, name matches a ledger entry: covered.
        let untokened = make_submission("GraphioAI", "");
        assert_eq!(
            classify_submission(&untokened, &tokens, &names),
            Coverage::ByName
        );

        // Fresh token that misses the ledger: new, even though the name
        // would have matched a stale entry.
        let resubmitted = make_submission("GraphioAI", "tok-new");
        assert_eq!(
            classify_submission(&resubmitted, &tokens, &names),
            Coverage::New
        );
    }

    #[test]
    fn test_missing_enrichment_includes_new_token() {
        // A sheet row absent from ledger and memo store appears in both
        // the new list and the sheet-but-no-memo category.
        let subs = vec![make_submission(
            "RainyDayPal",
            "zizne9pl3c7vx7tap02zizne985h6dtb",
        )];
        let report = reconcile(&subs, &Ledger::default(), &[]);

        assert_eq!(report.new_submissions.len(), 1);
        assert_eq!(
            report.missing_enrichment,
            vec![TokenRecord {
                token: "zizne9pl3c7vx7tap02zizne985h6dtb".to_string(),
                company_name: "RainyDayPal".to_string(),
            }]
        );
    }

    #[test]
    fn test_dangling_ledger_entry_reported() {
        let ledger = ledger_with(&[("tok-gone", "Ghost Co", "ghost_co_comprehensive_analysis.json")]);
        let report = reconcile(&[], &ledger, &[]);

        assert_eq!(report.dangling_ledger.len(), 1);
        assert_eq!(report.dangling_ledger[0].token, "tok-gone");
        assert!(!report.is_clean());
    }

    #[test]
    fn test_stale_ledger_reported() {
        // Memo declares a token the ledger never learned.
        let memos = vec![make_summary("Beacon", Some("tok123"))];
        let report = reconcile(&[], &Ledger::default(), &memos);

        assert_eq!(report.stale_ledger.len(), 1);
        assert_eq!(report.stale_ledger[0].token, "tok123");
    }

    #[test]
    fn test_source_drift_reported() {
        let ledger = ledger_with(&[("tok123", "Beacon", "beacon_comprehensive_analysis.json")]);
        let memos = vec![make_summary("Beacon", Some("tok123"))];

        // Sheet no longer contains tok123.
        let report = reconcile(&[], &ledger, &memos);
        assert_eq!(report.source_drift.len(), 1);
        assert_eq!(report.source_drift[0].token, "tok123");
        // But nothing is new and nothing dangles.
        assert!(report.new_submissions.is_empty());
        assert!(report.dangling_ledger.is_empty());
    }

    #[test]
    fn test_duplicate_memos_one_group() {
        let memos = vec![
            MemoSummary {
                company_name: "Acme".to_string(),
                token: Some("tok1".to_string()),
                filename: "acme_comprehensive_analysis.json".to_string(),
            },
            MemoSummary {
                company_name: "Acme".to_string(),
                token: None,
                filename: "acme_inc_comprehensive_analysis.json".to_string(),
            },
            make_summary("Beacon", Some("tok123")),
        ];

        let groups = find_duplicate_memos(&memos);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].company_name, "Acme");
        assert_eq!(groups[0].files.len(), 2);

        // The engine reports and moves on — no crash, no silent pick.
        let report = reconcile(&[], &Ledger::default(), &memos);
        assert_eq!(report.duplicates.len(), 1);
    }

    #[test]
    fn test_name_collision_reported_not_merged() {
        let subs = vec![
            make_submission("Graphio.ai", "tok1"),
            make_submission("GraphioAI", "tok2"),
            make_submission("Beacon", "tok3"),
        ];
        let collisions = find_name_collisions(&subs);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].normalized_name, "graphioai");
        assert_eq!(collisions[0].company_names.len(), 2);

        // Both colliding submissions still count as distinct new work.
        let report = reconcile(&subs, &Ledger::default(), &[]);
        assert_eq!(report.new_submissions.len(), 3);
    }

    #[test]
    fn test_identical_names_are_not_a_collision() {
        let subs = vec![
            make_submission("Beacon", "tok1"),
            make_submission("Beacon", "tok2"),
        ];
        assert!(find_name_collisions(&subs).is_empty());
    }

    #[test]
    fn test_rebuild_then_reconcile_reports_zero_new() {
        use crate::ledger::rebuild_from_memos;
        use crate::memo_store::MemoStore;
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let store = MemoStore::new(tmp.path());

        // One memo with a declared token, one legacy memo matched by name.
        let dim = |score| {
            Some(crate::types::DimensionScore {
                score,
                justification: "ok".to_string(),
                detail: Default::default(),
            })
        };
        for (name, token) in [("Beacon", Some("tok123")), ("Graphio.ai", None)] {
            let memo = crate::types::Memo {
                company_name: name.to_string(),
                website: None,
                year_founded: None,
                description: None,
                problem_statement: None,
                pitch_deck_link: None,
                demo_link: None,
                token: token.map(String::from),
                submitted_at: None,
                team: dim(4),
                tam: dim(3),
                technology: dim(4),
                traction: dim(2),
                timing: dim(5),
                terms: dim(3),
                final_recommendation: None,
                extra: Default::default(),
            };
            store.write_memo(&memo).unwrap();
        }

        let subs = vec![
            make_submission("Beacon", "tok123"),
            make_submission("GraphioAI", "tokg"),
        ];

        let ledger = rebuild_from_memos(&store, &subs).unwrap();
        let memos = store.list_memos().unwrap();
        let report = reconcile(&subs, &ledger, &memos);

        assert!(report.new_submissions.is_empty());
        assert!(report.dangling_ledger.is_empty());
        // The legacy memo still lacks a declared token on disk, so the
        // token-level cross-check keeps flagging it until a backfill
        // stamps the file.
        assert_eq!(report.missing_enrichment.len(), 1);
        assert_eq!(report.missing_enrichment[0].token, "tokg");
        assert_eq!(report.stale_ledger.len(), 0);
    }

    #[test]
    fn test_backfill_then_reconcile_is_fully_clean() {
        use crate::ledger::rebuild_from_memos;
        use crate::memo_store::MemoStore;
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let store = MemoStore::new(tmp.path());

        let dim = |score| {
            Some(crate::types::DimensionScore {
                score,
                justification: "ok".to_string(),
                detail: Default::default(),
            })
        };
        let memo = crate::types::Memo {
            company_name: "Graphio.ai".to_string(),
            website: None,
            year_founded: None,
            description: None,
            problem_statement: None,
            pitch_deck_link: None,
            demo_link: None,
            token: None,
            submitted_at: None,
            team: dim(4),
            tam: dim(3),
            technology: dim(4),
            traction: dim(2),
            timing: dim(5),
            terms: dim(3),
            final_recommendation: None,
            extra: Default::default(),
        };
        store.write_memo(&memo).unwrap();

        let subs = vec![make_submission("GraphioAI", "tokg")];
        store.backfill_from_sheet(&subs).unwrap();
        let ledger = rebuild_from_memos(&store, &subs).unwrap();
        let report = reconcile(&subs, &ledger, &store.list_memos().unwrap());

        assert!(report.is_clean());
    }
}
