//! Error taxonomy for the triage pipeline.
//!
//! Errors are classified by blast radius:
//! - Fatal for the pass: source fetch failures (no partial results — a
//!   short "new companies" list would silently under-count).
//! - Per-file: a corrupt memo is skipped with a warning.
//! - Per-submission: a failed or invalid enrichment lands in the
//!   dispatcher's `failed` list.
//! - Not errors at all: a missing ledger file is an empty ledger.

use thiserror::Error;

/// Failures fetching or decoding the submission source.
///
/// Always fatal for the current pass: the caller may retry the whole
/// pass, but no partial submission list is ever produced.
#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("invalid sheet URL (expected …/d/<id>/…): {0}")]
    InvalidUrl(String),

    #[error("failed to fetch sheet export: {0}")]
    Transport(String),

    #[error("sheet export returned HTTP {status}")]
    Http { status: u16 },

    #[error("malformed CSV export: {0}")]
    Malformed(String),
}

/// Failures reading or writing the memo store or the ledger file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A memo file that exists but does not parse. Carries the filename
    /// and the parse error for diagnostics; callers decide whether to
    /// skip or abort.
    #[error("corrupt memo {filename}: {message}")]
    CorruptMemo { filename: String, message: String },

    #[error("corrupt ledger {path}: {message}")]
    CorruptLedger { path: String, message: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl StoreError {
    /// Per-file errors are skippable during bulk scans; anything touching
    /// the ledger or the filesystem as a whole is not.
    pub fn is_per_file(&self) -> bool {
        matches!(self, StoreError::CorruptMemo { .. })
    }
}

/// Structural problems in an analyst-produced memo. The memo is not
/// written; the failure is recorded per submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing dimension '{0}'")]
    MissingDimension(&'static str),

    #[error("dimension '{dimension}' score {score} outside 1-5")]
    ScoreOutOfRange { dimension: &'static str, score: i64 },

    #[error("dimension '{0}' has an empty justification")]
    EmptyJustification(&'static str),

    #[error("placeholder content at {0}")]
    PlaceholderContent(String),

    #[error("company name mismatch: memo says '{memo}', submission says '{submission}'")]
    CompanyMismatch { memo: String, submission: String },
}

/// Failures from the external enrichment service.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("analyst request failed: {0}")]
    Transport(String),

    #[error("analyst returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("analyst response is not a memo: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("analyst API key not set ({0})")]
    MissingApiKey(String),
}

impl EnrichError {
    /// True for failures worth retrying on a later pass (network and
    /// server-side trouble); validation failures are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrichError::Transport(_) | EnrichError::Api { status: 429 | 500..=599, .. }
        )
    }
}

/// A dashboard route that matched no memo file. Carries the known
/// filename stems so the caller can present options.
#[derive(Debug, Error)]
#[error("no memo found for '{requested}' ({n} known)", n = .known.len())]
pub struct UnresolvedRoute {
    pub requested: String,
    pub known: Vec<String>,
}

/// Configuration problems, reported at startup before any pass runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("alias '{alias}' points to nonexistent memo file '{file}'")]
    DanglingAlias { alias: String, file: String },

    #[error("config field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// Top-level error for a full pass, used by the CLI.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Source(#[from] SourceFetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EnrichError::Transport("timeout".into()).is_retryable());
        assert!(EnrichError::Api { status: 429, message: String::new() }.is_retryable());
        assert!(EnrichError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(!EnrichError::Api { status: 401, message: String::new() }.is_retryable());
        assert!(!EnrichError::Validation(ValidationError::MissingDimension("team")).is_retryable());
    }

    #[test]
    fn test_store_error_per_file() {
        let corrupt = StoreError::CorruptMemo {
            filename: "x.json".into(),
            message: "bad".into(),
        };
        assert!(corrupt.is_per_file());
        let io = StoreError::Io { path: "analysis".into(), message: "denied".into() };
        assert!(!io.is_per_file());
    }

    #[test]
    fn test_unresolved_route_display() {
        let err = UnresolvedRoute {
            requested: "graphio".into(),
            known: vec!["beacon".into(), "graphioai".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("graphio"));
        assert!(msg.contains("2 known"));
    }
}
