//! Canonical spellings for station names and line codes.
//!
//! The fare tables and the station list come from different sources and
//! disagree on case, punctuation and line-code suffixes. Everything that is
//! used as a join key goes through this module first.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::FareError;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Built-in line-code variants and the canonical code they collapse onto.
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("KJL", "KJ"),
    ("AGL", "AG"),
    ("SPL", "SP"),
    ("KGL", "KG"),
    // Legacy MRT Sungai Buloh-Kajang
    ("SBK", "KG"),
    ("PYL", "PY"),
    // Legacy MRT Sungai Buloh-Serdang-Putrajaya
    ("SSP", "PY"),
    ("MRL", "MR"),
    ("BRT", "BR"),
];

/// Uppercase, drop apostrophes, hyphens to spaces, collapse whitespace, trim.
pub fn normalize_name(raw: &str) -> String {
    let upper = raw
        .to_uppercase()
        .replace(['\'', '\u{2019}'], "")
        .replace('-', " ");
    WHITESPACE.replace_all(upper.trim(), " ").into_owned()
}

/// Alias table used to resolve line identifiers to their canonical code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAliases {
    map: BTreeMap<String, String>,
}

impl Default for LineAliases {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_ALIASES.iter().copied())
    }
}

impl LineAliases {
    /// Build a table from `(alias, canonical)` pairs. Both sides are uppercased.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = pairs
            .into_iter()
            .map(|(alias, canonical)| {
                (alias.trim().to_uppercase(), canonical.trim().to_uppercase())
            })
            .collect();
        Self { map }
    }

    /// Built-in table with entries from a JSON object file merged on top.
    pub async fn load_with_overrides(path: &Path) -> Result<Self, FareError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FareError::Config(format!("read {}: {e}", path.display())))?;
        let overrides: BTreeMap<String, String> = serde_json::from_str(&text)
            .map_err(|e| FareError::Config(format!("parse {}: {e}", path.display())))?;

        let mut aliases = Self::default();
        for (alias, canonical) in &overrides {
            aliases
                .map
                .insert(alias.trim().to_uppercase(), canonical.trim().to_uppercase());
        }
        info!(
            "Loaded {} line alias overrides from {}",
            overrides.len(),
            path.display()
        );
        Ok(aliases)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Canonical line id, or `None` for absent/blank input.
    ///
    /// Codes missing from the table come back uppercased but otherwise untouched.
    pub fn normalize_line_id(&self, raw: Option<&str>) -> Option<String> {
        let upper = raw?.trim().to_uppercase();
        if upper.is_empty() {
            return None;
        }
        match self.map.get(&upper) {
            Some(canonical) => Some(canonical.clone()),
            None => Some(upper),
        }
    }
}
