//! Domain types shared across the pipeline.
//!
//! Persisted formats (memo files, the token ledger) use snake_case field
//! names and tolerate unknown fields — memo files are mutated in place by
//! backfill passes and must round-trip without dropping anything the
//! analyst wrote.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One row of source data: a company's application as fetched from the
/// spreadsheet export.
///
/// Submissions are transient — fetched fresh on every pass, never stored
/// locally. Identity is `token` when present, else the normalized name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub company_name: String,
    /// Durable source-assigned token. Empty for malformed rows.
    #[serde(default)]
    pub token: String,
    /// Submission timestamp, verbatim from the sheet.
    #[serde(default)]
    pub submitted_at: String,
    /// Every other source column, keyed by header name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_fields: BTreeMap<String, String>,
}

impl Submission {
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Look up a raw source column by header name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.raw_fields.get(name).map(String::as_str)
    }
}

/// The six scored evaluation dimensions, in presentation order.
pub const DIMENSION_KEYS: [&str; 6] =
    ["team", "tam", "technology", "traction", "timing", "terms"];

/// One scored dimension of a memo.
///
/// `detail` carries the analyst's nested sub-sections (founder deep-dives,
/// market sizing, red flags, ...) — preserved verbatim, never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: i64,
    #[serde(default)]
    pub justification: String,
    #[serde(flatten)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

/// Final investment recommendation for a memo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRecommendation {
    pub status: RecommendationStatus,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
}

impl FinalRecommendation {
    /// Placeholder shown for memos written before a recommendation landed.
    pub fn pending() -> Self {
        FinalRecommendation {
            status: RecommendationStatus::Pending,
            rationale: "Final recommendation is pending review.".to_string(),
            key_factors: Vec::new(),
            next_steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationStatus {
    Advance,
    Hold,
    Pass,
    Pending,
}

/// A persisted investment memo: one JSON file per company.
///
/// Dimensions are optional at the type level so that a malformed analyst
/// response still deserializes and fails structured validation (with a
/// field-level reason) instead of a blanket parse error. Valid memos
/// always carry all six — see [`crate::enrich::validate_memo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memo {
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_founded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_deck_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_link: Option<String>,
    /// Durable submission token. Absent on memos that predate token
    /// capture; recoverable via backfill or ledger rebuild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<DimensionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tam: Option<DimensionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<DimensionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traction: Option<DimensionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<DimensionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<DimensionScore>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_recommendation: Option<FinalRecommendation>,

    /// Anything else the analyst produced — round-tripped untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Memo {
    /// The six dimensions with their keys, in presentation order.
    pub fn dimensions(&self) -> [(&'static str, Option<&DimensionScore>); 6] {
        [
            ("team", self.team.as_ref()),
            ("tam", self.tam.as_ref()),
            ("technology", self.technology.as_ref()),
            ("traction", self.traction.as_ref()),
            ("timing", self.timing.as_ref()),
            ("terms", self.terms.as_ref()),
        ]
    }

    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Lightweight view of one memo file, produced by a directory scan.
#[derive(Debug, Clone, Serialize)]
pub struct MemoSummary {
    pub company_name: String,
    pub token: Option<String>,
    pub filename: String,
}

/// A token with the company name it belongs to, as reported by the
/// reconciliation cross-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRecord {
    pub token: String,
    pub company_name: String,
}

/// Memo files that declare the same exact company name.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub company_name: String,
    pub files: Vec<String>,
}

/// Distinct submitted company names that collapse to one normalized key.
#[derive(Debug, Clone, Serialize)]
pub struct NameCollision {
    pub normalized_name: String,
    pub company_names: Vec<String>,
}

/// Outcome of one reconciliation pass.
///
/// `new_submissions` preserves source order (source order tracks
/// submission chronology — a reporting convenience, not a correctness
/// requirement). The four token categories follow set arithmetic over the
/// sheet, ledger, and memo store; none is ever silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Submissions with no ledger coverage — the enrichment queue.
    pub new_submissions: Vec<Submission>,
    /// Tokens in the sheet with no memo: enrichment is missing.
    pub missing_enrichment: Vec<TokenRecord>,
    /// Tokens in the ledger with no memo: ledger integrity violation.
    pub dangling_ledger: Vec<TokenRecord>,
    /// Tokens in a memo but not the ledger: stale ledger, safe to repair
    /// by upsert (or a full rebuild).
    pub stale_ledger: Vec<TokenRecord>,
    /// Tokens in a memo but no longer in the sheet: source-side deletion
    /// or drift. Reported, never auto-deleted.
    pub source_drift: Vec<TokenRecord>,
    pub duplicates: Vec<DuplicateGroup>,
    pub name_collisions: Vec<NameCollision>,
}

impl ReconcileReport {
    /// True when there is neither new work nor any inconsistency.
    pub fn is_clean(&self) -> bool {
        self.new_submissions.is_empty() && !self.has_inconsistencies()
    }

    pub fn has_inconsistencies(&self) -> bool {
        !self.missing_enrichment.is_empty()
            || !self.dangling_ledger.is_empty()
            || !self.stale_ledger.is_empty()
            || !self.source_drift.is_empty()
            || !self.duplicates.is_empty()
            || !self.name_collisions.is_empty()
    }
}

/// One failed enrichment, with the submission it belonged to.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichFailure {
    pub submission: Submission,
    pub reason: String,
}

/// Outcome of one enrichment dispatch.
#[derive(Debug, Default, Serialize)]
pub struct EnrichOutcome {
    /// Memos written (and ledger entries upserted) this dispatch.
    pub succeeded: Vec<Memo>,
    pub failed: Vec<EnrichFailure>,
    /// Companies skipped because a memo file already existed.
    pub skipped_existing: Vec<String>,
    /// Submissions beyond the batch cap, left for the next invocation.
    pub deferred: usize,
}

/// Top-level result of a sync pass, printed as JSON for the caller.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub total_in_sheet: usize,
    pub existing_analyses: usize,
    pub new_companies: usize,
    pub new_company_names: Vec<String>,
    pub enriched: usize,
    pub failed: usize,
    pub timestamp: String,
}
