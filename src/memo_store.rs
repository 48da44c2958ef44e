//! Memo store: the directory of per-company analysis files.
//!
//! One JSON object per company, filename derived from the company name
//! (`{stem}_comprehensive_analysis.json`). This module is the sole writer;
//! every write is an atomic full-file replace, so a crash never leaves a
//! truncated memo. Scans re-read the directory each call — callers that
//! need a stable snapshot materialize the result.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;

use crate::error::StoreError;
use crate::identity::{memo_filename, normalize_key, MEMO_FILE_SUFFIX};
use crate::types::{Memo, MemoSummary, Submission};

/// Handle to the analysis directory.
#[derive(Debug, Clone)]
pub struct MemoStore {
    dir: PathBuf,
}

/// Result of one directory scan: parseable memo summaries plus the files
/// that failed to parse (skipped, reported, never fatal).
#[derive(Debug, Default)]
pub struct MemoScan {
    pub summaries: Vec<MemoSummary>,
    pub corrupt: Vec<(String, String)>,
}

/// Counters from a token/date backfill pass over existing memos.
#[derive(Debug, Default, Serialize)]
pub struct BackfillOutcome {
    pub updated: Vec<String>,
    pub already_complete: usize,
    pub no_match: Vec<String>,
    pub corrupt_skipped: usize,
}

impl MemoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MemoStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Whether a memo file already exists for this company name.
    ///
    /// Not atomic with a subsequent write — two concurrent passes can
    /// both see "absent" and both enrich. Worst case is a duplicate but
    /// equivalent memo (full-file replace), not corruption.
    pub fn contains(&self, company_name: &str) -> bool {
        self.path_of(&memo_filename(company_name)).exists()
    }

    /// Scan the directory for memo files.
    ///
    /// A missing directory is an empty store. Unparseable files are
    /// collected in `corrupt` and logged, never fatal. Results are sorted
    /// by filename so reports are stable across runs.
    pub fn scan(&self) -> Result<MemoScan, StoreError> {
        let mut scan = MemoScan::default();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(scan),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.dir.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mut filenames: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(MEMO_FILE_SUFFIX))
            .collect();
        filenames.sort();

        for filename in filenames {
            match self.read_memo(&filename) {
                Ok(memo) => scan.summaries.push(MemoSummary {
                    company_name: memo.company_name,
                    token: memo.token.filter(|t| !t.is_empty()),
                    filename,
                }),
                Err(err) => {
                    warn!("skipping {}: {}", filename, err);
                    scan.corrupt.push((filename, err.to_string()));
                }
            }
        }

        Ok(scan)
    }

    /// Convenience over [`scan`](Self::scan) when the caller only needs
    /// the parseable memos.
    pub fn list_memos(&self) -> Result<Vec<MemoSummary>, StoreError> {
        Ok(self.scan()?.summaries)
    }

    /// Memo filenames currently on disk (sorted), for route resolution.
    pub fn filenames(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.dir.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(MEMO_FILE_SUFFIX))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Read and parse one memo file.
    pub fn read_memo(&self, filename: &str) -> Result<Memo, StoreError> {
        let path = self.path_of(filename);
        let content = fs::read_to_string(&path).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let memo: Memo =
            serde_json::from_str(&content).map_err(|e| StoreError::CorruptMemo {
                filename: filename.to_string(),
                message: e.to_string(),
            })?;

        if memo.company_name.is_empty() {
            return Err(StoreError::CorruptMemo {
                filename: filename.to_string(),
                message: "memo has no company_name".to_string(),
            });
        }

        Ok(memo)
    }

    /// Write a memo, replacing any existing file for the same company.
    ///
    /// Returns the filename written. The write goes through a temp file
    /// in the same directory and is renamed into place.
    pub fn write_memo(&self, memo: &Memo) -> Result<String, StoreError> {
        let filename = memo_filename(&memo.company_name);
        let path = self.path_of(&filename);

        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io {
            path: self.dir.display().to_string(),
            message: e.to_string(),
        })?;

        let json =
            serde_json::to_string_pretty(memo).map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        atomic_write(&self.dir, &path, &json)?;
        Ok(filename)
    }

    /// Backfill `token` and `submitted_at` on existing memos from a
    /// submission snapshot, matching by token first and normalized name
    /// second. Only fills absent fields; dimension content and anything
    /// else the analyst wrote is untouched.
    pub fn backfill_from_sheet(
        &self,
        submissions: &[Submission],
    ) -> Result<BackfillOutcome, StoreError> {
        let mut by_name: std::collections::HashMap<String, &Submission> =
            std::collections::HashMap::new();
        let mut by_token: std::collections::HashMap<&str, &Submission> =
            std::collections::HashMap::new();
        for s in submissions {
            by_name.insert(normalize_key(&s.company_name), s);
            if s.has_token() {
                by_token.insert(s.token.as_str(), s);
            }
        }

        let mut outcome = BackfillOutcome::default();

        for filename in self.filenames()? {
            let mut memo = match self.read_memo(&filename) {
                Ok(memo) => memo,
                Err(err) => {
                    warn!("backfill skipping {}: {}", filename, err);
                    outcome.corrupt_skipped += 1;
                    continue;
                }
            };

            if memo.has_token() && memo.submitted_at.is_some() {
                outcome.already_complete += 1;
                continue;
            }

            let matched = memo
                .token
                .as_deref()
                .and_then(|t| by_token.get(t).copied())
                .or_else(|| by_name.get(&normalize_key(&memo.company_name)).copied());

            let Some(submission) = matched else {
                outcome.no_match.push(memo.company_name.clone());
                continue;
            };

            let mut changed = false;
            if !memo.has_token() && submission.has_token() {
                memo.token = Some(submission.token.clone());
                changed = true;
            }
            if memo.submitted_at.is_none() && !submission.submitted_at.is_empty() {
                memo.submitted_at = Some(submission.submitted_at.clone());
                changed = true;
            }

            if changed {
                self.write_memo(&memo)?;
                outcome.updated.push(memo.company_name);
            } else {
                // Matched a row that has nothing to offer either.
                outcome.no_match.push(memo.company_name);
            }
        }

        Ok(outcome)
    }
}

/// Write `content` to `path` via a temp file in `dir` + rename.
pub(crate) fn atomic_write(dir: &Path, path: &Path, content: &str) -> Result<(), StoreError> {
    let io_err = |e: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.persist(path).map_err(|e| StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}
