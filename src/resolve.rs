//! Route resolution: map a URL-shaped company identifier to its memo
//! file despite naming drift.
//!
//! Dashboard links carry lossily-transformed company names — spacing,
//! hyphenation, and suffixes like "AI"/"Inc" vary between what a user
//! types and what the memo filename says. Resolution tries an ordered
//! list of strategies and takes the first hit:
//!
//! 1. the alias table, for names simple transforms cannot unify;
//! 2. mechanical transforms of the input against actual filenames;
//! 3. exact case-insensitive match on the filename stem.
//!
//! The alias table is validated when the resolver is built: an alias
//! pointing at a file that is not in the store is a configuration error,
//! caught at startup rather than as a 404 in production.

use std::collections::BTreeMap;

use crate::error::{ConfigError, UnresolvedRoute};
use crate::identity::{normalize_key, strip_memo_suffix};

#[derive(Debug, Clone)]
pub struct Resolver {
    /// normalized alias → memo filename.
    aliases: BTreeMap<String, String>,
    /// Actual memo filenames on disk.
    filenames: Vec<String>,
}

impl Resolver {
    /// Build a resolver over the store's current filenames, validating
    /// every alias target.
    pub fn new(
        aliases: &BTreeMap<String, String>,
        filenames: Vec<String>,
    ) -> Result<Resolver, ConfigError> {
        for (alias, file) in aliases {
            if !filenames.iter().any(|f| f == file) {
                return Err(ConfigError::DanglingAlias {
                    alias: alias.clone(),
                    file: file.clone(),
                });
            }
        }

        Ok(Resolver {
            aliases: aliases.clone(),
            filenames,
        })
    }

    /// Resolve a display name to a memo filename, or report the miss
    /// along with the known filename stems.
    pub fn resolve(&self, display_name: &str) -> Result<String, UnresolvedRoute> {
        // 1. Alias table, on the normalized form of the input.
        if let Some(file) = self.aliases.get(&normalize_key(display_name)) {
            return Ok(file.clone());
        }

        // 2. Mechanical transforms against actual filenames.
        let lower = display_name.to_lowercase();
        let candidates = [
            lower.replace(' ', "_"),
            lower.replace(' ', "-"),
            lower.replace(' ', ""),
        ];
        for stem in &candidates {
            let candidate = memo_filename_from_stem(stem);
            if self.filenames.iter().any(|f| f == &candidate) {
                return Ok(candidate);
            }
        }

        // 3. Exact case-insensitive stem match.
        if let Some(file) = self
            .filenames
            .iter()
            .find(|f| strip_memo_suffix(f).eq_ignore_ascii_case(display_name))
        {
            return Ok(file.clone());
        }

        Err(UnresolvedRoute {
            requested: display_name.to_string(),
            known: self
                .filenames
                .iter()
                .map(|f| strip_memo_suffix(f).to_string())
                .collect(),
        })
    }
}

/// A stem is already transformed; only the suffix is missing.
fn memo_filename_from_stem(stem: &str) -> String {
    format!("{}{}", stem, crate::identity::MEMO_FILE_SUFFIX)
}
