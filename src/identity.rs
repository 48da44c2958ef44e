//! Company identity normalization.
//!
//! Company names are user-typed free text: casing, punctuation, and
//! suffixes drift between a submission and its resubmission. Matching
//! happens on a lossy canonical key; the memo filename uses a separate,
//! human-readable slug.

/// Normalize a company name for identity comparison: lowercase + ASCII
/// alphanumeric only.
///
/// Total and deterministic — any input (including empty) produces a key.
/// The mapping is many-to-one by design; collisions are surfaced by the
/// reconciliation report, never merged silently.
pub fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Suffix shared by every memo file in the analysis directory.
pub const MEMO_FILE_SUFFIX: &str = "_comprehensive_analysis.json";

/// Convert a company name to its memo filename stem.
///
/// Example: "Counter Fin" → "counter_fin". Readable (spaces become
/// underscores) rather than fully canonical; `normalize_key` is the
/// comparison form.
pub fn filename_stem(company_name: &str) -> String {
    company_name
        .to_lowercase()
        .replace(' ', "_")
        .replace(['.', ','], "")
        .replace('&', "and")
}

/// Full memo filename for a company name.
///
/// Example: "Beacon" → "beacon_comprehensive_analysis.json".
pub fn memo_filename(company_name: &str) -> String {
    format!("{}{}", filename_stem(company_name), MEMO_FILE_SUFFIX)
}

/// Strip the memo suffix from a filename, if present.
pub fn strip_memo_suffix(filename: &str) -> &str {
    filename.strip_suffix(MEMO_FILE_SUFFIX).unwrap_or(filename)
}
