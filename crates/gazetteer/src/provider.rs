//! The location search provider: fan-out query execution and result shaping.
//!
//! A provider is initialized from a bundle manifest and owns the sub-index
//! set and results-data cache for its lifetime. Each query fans out to every
//! sub-index concurrently, joins the hits against the results data, and
//! returns labeled, navigable results in manifest order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use error::QueryError;
use futures::future::try_join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::camera::{LatLon, MapViewer, NavigationContext, TerrainSampler};
use crate::error::GazetteerError;
use crate::fetch::Fetcher;
use crate::index::TextIndex;
use crate::manifest::{IndexManifest, ResultLabel};
use crate::options::{ProviderConfig, SearchOptions};
use crate::results::{ResultsDataStore, Row};

/// Message reported when a query completes with zero results.
pub const NO_LOCATIONS_MESSAGE: &str = "No locations found matching your search.";
/// Generic message reported when a query fails; the underlying error is
/// logged, not shown.
pub const SEARCH_FAILED_MESSAGE: &str = "An error occurred while searching.";

const UNNAMED_RESULT: &str = "Unnamed location";

/// One ranked, geolocated, navigable search result.
///
/// Owned by the caller once returned; `navigate` replays the camera move
/// from immutable inputs captured at query time.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub name: String,
    pub location: LatLon,
    pub score: f32,
    nav: Arc<NavigationContext>,
}

impl SearchResult {
    /// Fly the map viewer to this result.
    pub async fn navigate(&self) {
        self.nav.navigate_to(self.location).await;
    }
}

/// UI-facing query outcome: a result list, a distinct "no results" message,
/// or a generic failure message.
#[derive(Debug)]
pub enum SearchOutcome {
    Results(Vec<SearchResult>),
    Empty { message: String },
    Failed { message: String },
}

/// Monotonic query sequence numbers for discarding stale responses.
///
/// The provider never cancels an in-flight query when a newer one arrives;
/// index searches are cheap and side-effect free. Callers that issue
/// overlapping queries tag each with [`QuerySeq::next`] and apply a response
/// only while its tag [`QuerySeq::is_current`].
#[derive(Debug, Default)]
pub struct QuerySeq(AtomicU64);

impl QuerySeq {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number, making it current.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_current(&self, seq: u64) -> bool {
        self.current() == seq
    }
}

/// Free-text location search over a loaded bundle.
///
/// Owns the sub-index set and the results-data cache; both are loaded at
/// most once and live until the provider is dropped.
#[derive(Debug)]
pub struct LocationSearchProvider {
    config: ProviderConfig,
    manifest: IndexManifest,
    fetcher: Arc<dyn Fetcher>,
    indexes: Vec<TextIndex>,
    results_data: ResultsDataStore,
    nav: Arc<NavigationContext>,
}

impl LocationSearchProvider {
    /// Fetch and parse the bundle manifest, then assemble the provider.
    ///
    /// Manifest fetch or parse failures abort initialization with the cause
    /// attached. Index payloads and the results data are loaded lazily on
    /// the first query; a best-effort background prefetch of the results
    /// data starts immediately so it is usually warm by then.
    #[instrument(name = "Initialize search provider", level = "info", skip_all, fields(url = %config.index_root_url))]
    pub async fn initialize(
        config: ProviderConfig,
        fetcher: Arc<dyn Fetcher>,
        viewer: Arc<dyn MapViewer>,
        terrain: Option<Arc<dyn TerrainSampler>>,
    ) -> Result<Self, GazetteerError> {
        info!("initializing location search provider");
        let raw = fetcher.fetch(&config.index_root_url).await?;
        let manifest = IndexManifest::from_slice(&raw)?;
        info!(
            num_indexes = manifest.indexes.len(),
            has_results_data = manifest.results_data_url.is_some(),
            "manifest parsed"
        );

        let indexes = manifest.indexes.iter().map(TextIndex::new).collect();
        let results_data = ResultsDataStore::new(
            manifest.results_data_url.clone(),
            config.id_column.clone(),
        );
        let nav = Arc::new(NavigationContext::new(
            viewer,
            terrain,
            config.camera,
            config.terrain_timeout,
            config.flight_duration,
        ));

        let provider = Self {
            config,
            manifest,
            fetcher,
            indexes,
            results_data,
            nav,
        };
        provider.spawn_results_prefetch();
        Ok(provider)
    }

    fn spawn_results_prefetch(&self) {
        if !self.results_data.has_url() || self.indexes.is_empty() {
            return;
        }
        let store = self.results_data.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let base_url = self.config.index_root_url.clone();
        tokio::spawn(async move {
            if let Err(err) = store.get_or_load(fetcher.as_ref(), &base_url).await {
                warn!(error = %err, "background prefetch of results data failed");
            }
        });
    }

    #[must_use]
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Eagerly load every sub-index and the results data.
    ///
    /// Optional; the first query performs the same loads. Useful when the
    /// caller wants load failures surfaced at startup rather than on first
    /// search.
    pub async fn ensure_loaded(&self) -> Result<(), QueryError> {
        if self.indexes.is_empty() {
            return Ok(());
        }
        let base_url = self.config.index_root_url.as_str();
        let loads = self
            .indexes
            .iter()
            .map(|index| index.load(self.fetcher.as_ref(), base_url));
        tokio::try_join!(
            async { try_join_all(loads).await.map_err(QueryError::from) },
            async {
                self.results_data
                    .get_or_load(self.fetcher.as_ref(), base_url)
                    .await
                    .map(|_| ())
                    .map_err(QueryError::from)
            }
        )?;
        Ok(())
    }

    /// Execute a query against every sub-index.
    ///
    /// Searches run concurrently; the merged result list preserves manifest
    /// order regardless of completion order, and each index's internal
    /// ranking is kept as-is (no cross-index re-ranking). Hits whose row is
    /// missing from the results data are dropped silently. Any index search
    /// failure fails the whole query; partial results are discarded.
    #[instrument(name = "Location search", level = "debug", skip_all, fields(query = text))]
    pub async fn search(&self, text: &str) -> Result<Vec<SearchResult>, QueryError> {
        let query = text.trim();
        if self.indexes.is_empty() {
            debug!("no sub-indexes configured, query yields no results");
            return Ok(Vec::new());
        }

        let base_url = self.config.index_root_url.as_str();
        let options = &self.config.search;

        // Fan out: each sub-index loads (first query only) and searches;
        // the results data loads alongside. try_join_all reassembles in
        // manifest order whatever the completion order was.
        let searches = self.indexes.iter().map(|index| async move {
            index.load(self.fetcher.as_ref(), base_url).await?;
            Ok::<_, QueryError>(index.search(query, options)?)
        });
        let (per_index, table) = tokio::try_join!(try_join_all(searches), async {
            self.results_data
                .get_or_load(self.fetcher.as_ref(), base_url)
                .await
                .map_err(QueryError::from)
        })?;

        let mut results = Vec::new();
        for (index, hits) in self.indexes.iter().zip(per_index) {
            for hit in hits {
                let Some(row) = table.row(hit.id) else {
                    debug!(
                        index = %index.url(),
                        id = hit.id,
                        "hit has no matching results row, dropping"
                    );
                    continue;
                };
                let Some(location) =
                    row.lat_lon(&options.latitude_column, &options.longitude_column)
                else {
                    debug!(
                        index = %index.url(),
                        id = hit.id,
                        "results row has no usable coordinates, dropping"
                    );
                    continue;
                };
                results.push(SearchResult {
                    name: result_label(options, index.result_label(), &row),
                    location,
                    score: hit.score,
                    nav: Arc::clone(&self.nav),
                });
            }
        }
        debug!(num_results = results.len(), "query complete");
        Ok(results)
    }

    /// [`search`](Self::search), wrapped for direct display: empty results
    /// become a distinct "no results" message and failures a generic error
    /// message with the detail logged.
    pub async fn search_outcome(&self, text: &str) -> SearchOutcome {
        match self.search(text).await {
            Ok(results) if results.is_empty() => SearchOutcome::Empty {
                message: NO_LOCATIONS_MESSAGE.to_string(),
            },
            Ok(results) => SearchOutcome::Results(results),
            Err(err) => {
                error!(error = %err, "search query failed");
                SearchOutcome::Failed {
                    message: SEARCH_FAILED_MESSAGE.to_string(),
                }
            }
        }
    }
}

/// Compose a result's display label: the caller-supplied rule when present,
/// otherwise the index's configured prefix/suffix columns as
/// `"{prefix} ({suffix})"`.
fn result_label(options: &SearchOptions, label: &ResultLabel, row: &Row<'_>) -> String {
    if let Some(format) = &options.label_format {
        if let Some(name) = format(row) {
            return name;
        }
    }
    match (&label.prefix, &label.suffix) {
        (Some(prefix), Some(suffix)) => match (row.get(prefix), row.get(suffix)) {
            (Some(p), Some(s)) => format!("{p} ({s})"),
            (Some(p), None) => p.to_string(),
            (None, Some(s)) => s.to_string(),
            (None, None) => UNNAMED_RESULT.to_string(),
        },
        (Some(prefix), None) => row
            .get(prefix)
            .map_or_else(|| UNNAMED_RESULT.to_string(), ToString::to_string),
        (None, Some(suffix)) => row
            .get(suffix)
            .map_or_else(|| UNNAMED_RESULT.to_string(), ToString::to_string),
        (None, None) => UNNAMED_RESULT.to_string(),
    }
}

mod error {
    use thiserror::Error;

    use crate::index::{IndexError, SearchError};
    use crate::results::DataError;

    /// Why a query failed as a whole. Per-hit row misses never produce one
    /// of these; they are dropped during the merge.
    #[derive(Error, Debug)]
    pub enum QueryError {
        #[error("index load failed: {0}")]
        Load(#[from] IndexError),
        #[error("index search failed: {0}")]
        Search(#[from] SearchError),
        #[error("results data unavailable: {0}")]
        Data(#[from] DataError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::RowTable;

    const CSV: &[u8] = b"\
code,lotplan,latitude,longitude
A1,L2,-27.5,153.0
";

    fn label_columns(prefix: Option<&str>, suffix: Option<&str>) -> ResultLabel {
        ResultLabel {
            prefix: prefix.map(String::from),
            suffix: suffix.map(String::from),
        }
    }

    #[test]
    fn label_uses_prefix_and_suffix_columns() {
        let table = RowTable::from_csv_bytes(CSV, None).expect("valid csv");
        let row = table.row(0).expect("row exists");
        let options = SearchOptions::default();

        assert_eq!(
            result_label(&options, &label_columns(Some("code"), Some("lotplan")), &row),
            "A1 (L2)"
        );
        assert_eq!(
            result_label(&options, &label_columns(Some("code"), None), &row),
            "A1"
        );
        assert_eq!(
            result_label(&options, &label_columns(None, None), &row),
            UNNAMED_RESULT
        );
        assert_eq!(
            result_label(&options, &label_columns(Some("missing"), None), &row),
            UNNAMED_RESULT
        );
    }

    #[test]
    fn caller_label_format_wins() {
        let table = RowTable::from_csv_bytes(CSV, None).expect("valid csv");
        let row = table.row(0).expect("row exists");
        let options = SearchOptions::builder()
            .label_format(Arc::new(|row: &Row<'_>| {
                row.get("lotplan").map(|l| format!("Lot {l}"))
            }))
            .build();

        assert_eq!(
            result_label(&options, &label_columns(Some("code"), Some("lotplan")), &row),
            "Lot L2"
        );
    }

    #[test]
    fn query_seq_tracks_the_latest_query() {
        let seq = QuerySeq::new();
        let first = seq.next();
        assert!(seq.is_current(first));

        let second = seq.next();
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
        assert_eq!(seq.current(), 2);
    }
}
