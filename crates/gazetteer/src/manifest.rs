//! Parsing of the search bundle manifest.
//!
//! A bundle is described by a single JSON manifest naming the results-data
//! table and any number of sub-indexes:
//!
//! ```json
//! {
//!   "resultsDataUrl": "resultsData.csv",
//!   "indexes": [
//!     { "url": "indexes/address.json", "resultLabelPrefix": "address", "resultLabelSuffix": "suburb" }
//!   ]
//! }
//! ```
//!
//! Parsing is a pure transformation: either a fully validated
//! [`IndexManifest`] comes back, or a [`ManifestError`] — no partially
//! populated value ever escapes.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("malformed index manifest: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("manifest field `{0}` must be a non-empty string")]
    EmptyLocation(&'static str),
}

/// Columns used to compose a result's display label, as configured per
/// sub-index in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLabel {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

/// One sub-index entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRef {
    /// Location of the serialized index payload, relative to the manifest.
    pub url: String,
    pub result_label: ResultLabel,
}

/// Parsed, immutable bundle manifest.
///
/// A manifest with zero sub-indexes is valid; queries against it simply
/// yield no results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexManifest {
    pub results_data_url: Option<String>,
    pub indexes: Vec<IndexRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    results_data_url: Option<String>,
    #[serde(default)]
    indexes: Vec<RawIndex>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndex {
    url: String,
    result_label_prefix: Option<String>,
    result_label_suffix: Option<String>,
}

impl IndexManifest {
    /// Parse a manifest from an already-decoded JSON value.
    pub fn parse(raw: serde_json::Value) -> Result<Self, ManifestError> {
        Self::validate(serde_json::from_value(raw)?)
    }

    /// Parse a manifest from raw bytes.
    pub fn from_slice(raw: &[u8]) -> Result<Self, ManifestError> {
        Self::validate(serde_json::from_slice(raw)?)
    }

    fn validate(raw: RawManifest) -> Result<Self, ManifestError> {
        let results_data_url = match raw.results_data_url {
            Some(url) if url.trim().is_empty() => {
                return Err(ManifestError::EmptyLocation("resultsDataUrl"));
            }
            other => other,
        };
        let indexes = raw
            .indexes
            .into_iter()
            .map(|index| {
                if index.url.trim().is_empty() {
                    return Err(ManifestError::EmptyLocation("indexes[].url"));
                }
                Ok(IndexRef {
                    url: index.url,
                    result_label: ResultLabel {
                        prefix: non_empty(index.result_label_prefix),
                        suffix: non_empty(index.result_label_suffix),
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            results_data_url,
            indexes,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
