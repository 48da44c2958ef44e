//! Identity ledger: the token → memo index.
//!
//! The ledger is derived data — a cache over the memo store keyed by the
//! durable submission token, fully reconstructable from the memo files
//! plus a current submission snapshot. It exists so a sync pass can answer
//! "is this token already analyzed?" without re-reading every memo.
//!
//! The ledger is an explicit value: passed into and returned from the
//! engine, persisted by thin load/store wrappers at the process boundary.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::identity::normalize_key;
use crate::memo_store::{atomic_write, MemoStore};
use crate::types::Submission;

/// One analyzed company: where its memo lives and when it was matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub company_name: String,
    pub analysis_file: String,
    pub matched_at: String,
}

/// A memo that could not be tied to any submission token — a documented,
/// queryable state, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedAnalysis {
    pub company_name: String,
    pub normalized_name: String,
    pub file: String,
}

/// The persisted ledger. On disk: one JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub analyzed_tokens: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    pub last_sync: Option<String>,
    /// Submissions carrying a token at the time of the last sync/rebuild.
    #[serde(default)]
    pub total_submissions: usize,
    #[serde(default)]
    pub analyzed_count: usize,
    #[serde(default)]
    pub unmatched_analyses: Vec<UnmatchedAnalysis>,
}

impl Ledger {
    /// Load from disk. A missing file is an empty ledger (first run);
    /// a file that exists but does not parse is an error — silently
    /// starting from empty would re-enrich everything.
    pub fn load(path: &Path) -> Result<Ledger, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no ledger at {}, starting empty", path.display());
                return Ok(Ledger::default());
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| StoreError::CorruptLedger {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Persist atomically (temp file + rename).
    pub fn store(&self, path: &Path) -> Result<(), StoreError> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            fs::create_dir_all(dir).map_err(|e| StoreError::Io {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        atomic_write(dir.unwrap_or(Path::new(".")), path, &json)
    }

    pub fn lookup_by_token(&self, token: &str) -> Option<&LedgerEntry> {
        self.analyzed_tokens.get(token)
    }

    /// Find an entry whose company name normalizes to `normalized_name`.
    pub fn lookup_by_name(&self, normalized_name: &str) -> Option<(&str, &LedgerEntry)> {
        self.analyzed_tokens
            .iter()
            .find(|(_, entry)| normalize_key(&entry.company_name) == normalized_name)
            .map(|(token, entry)| (token.as_str(), entry))
    }

    /// Tokens with ledger coverage, for O(1) membership tests.
    pub fn token_set(&self) -> HashSet<&str> {
        self.analyzed_tokens.keys().map(String::as_str).collect()
    }

    /// Normalized company names of every entry, for the name fallback.
    pub fn normalized_name_set(&self) -> HashSet<String> {
        self.analyzed_tokens
            .values()
            .map(|entry| normalize_key(&entry.company_name))
            .collect()
    }

    /// Insert or overwrite the entry for `token`. Idempotent: a repeat
    /// upsert with the same token replaces the prior entry.
    pub fn upsert(&mut self, token: String, entry: LedgerEntry) {
        if let Some(prior) = self.analyzed_tokens.get(&token) {
            if prior.analysis_file != entry.analysis_file {
                warn!(
                    "token {} moving from {} to {}",
                    token, prior.analysis_file, entry.analysis_file
                );
            }
        }
        self.analyzed_tokens.insert(token, entry);
        self.analyzed_count = self.analyzed_tokens.len();
    }

    /// Stamp sync-time bookkeeping before persisting.
    pub fn finalize_sync(&mut self, total_submissions: usize) {
        self.last_sync = Some(Utc::now().to_rfc3339());
        self.total_submissions = total_submissions;
        self.analyzed_count = self.analyzed_tokens.len();
    }
}

/// Rebuild the ledger from scratch: the memo store plus a fresh
/// submission snapshot.
///
/// Memos that declare a token keep it. Memos without one (predating token
/// capture) recover a token by normalized-name match against the
/// snapshot; memos that still cannot be matched are recorded in
/// `unmatched_analyses`. Memo files are only read, never altered.
///
/// The caller fetches the snapshot before calling this, so a fetch
/// failure leaves any existing ledger untouched; persisting the returned
/// value is the caller's final, atomic step.
pub fn rebuild_from_memos(
    store: &MemoStore,
    submissions: &[Submission],
) -> Result<Ledger, StoreError> {
    let mut token_by_name: BTreeMap<String, &Submission> = BTreeMap::new();
    let mut with_token = 0usize;
    for s in submissions {
        if s.has_token() {
            with_token += 1;
            token_by_name.insert(normalize_key(&s.company_name), s);
        }
    }

    let scan = store.scan()?;
    let mut ledger = Ledger::default();

    for summary in scan.summaries {
        let token = summary.token.clone().or_else(|| {
            token_by_name
                .get(&normalize_key(&summary.company_name))
                .map(|s| s.token.clone())
        });

        match token {
            Some(token) => {
                debug!("matched {} -> {}", summary.company_name, token);
                ledger.upsert(
                    token,
                    LedgerEntry {
                        company_name: summary.company_name,
                        analysis_file: summary.filename,
                        matched_at: Utc::now().to_rfc3339(),
                    },
                );
            }
            None => {
                ledger.unmatched_analyses.push(UnmatchedAnalysis {
                    normalized_name: normalize_key(&summary.company_name),
                    company_name: summary.company_name,
                    file: summary.filename,
                });
            }
        }
    }

    ledger.finalize_sync(with_token);
    info!(
        "ledger rebuilt: {} matched, {} unmatched, {} submissions with tokens",
        ledger.analyzed_count,
        ledger.unmatched_analyses.len(),
        with_token
    );
    Ok(ledger)
}
