//! Gazetteer - Indexed Free-Text Location Search
//!
//! Gazetteer turns free text into ranked, geolocated, navigable results. It
//! loads a prebuilt search bundle — a manifest naming one or more serialized
//! text indexes and a tabular results dataset — fans each query out across
//! every index concurrently, joins the hits back against the results data to
//! recover coordinates and display fields, and hands the caller results that
//! can fly an external map viewer to the matched location.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use gazetteer::{
//!     CameraView, GazetteerError, LocationSearchProvider, MapViewer, ProviderConfig,
//!     StaticFetcher,
//! };
//!
//! struct NoopViewer;
//!
//! impl MapViewer for NoopViewer {
//!     fn zoom_to(&self, _view: &CameraView, _flight_duration: std::time::Duration) {}
//! }
//!
//! # fn main() -> Result<(), GazetteerError> {
//! // A bundle served from memory; production uses `HttpFetcher` instead.
//! let fetcher = StaticFetcher::new()
//!     .with_resource(
//!         "https://example.com/search/indexRoot.json",
//!         &br#"{
//!             "resultsDataUrl": "resultsData.csv",
//!             "indexes": [{
//!                 "url": "indexes/address.json",
//!                 "resultLabelPrefix": "address",
//!                 "resultLabelSuffix": "suburb"
//!             }]
//!         }"#[..],
//!     )
//!     .with_resource(
//!         "https://example.com/search/indexes/address.json",
//!         &br#"{
//!             "options": { "fields": ["address", "suburb"] },
//!             "documents": [{ "id": 0, "address": "1 Main Street", "suburb": "Newtown" }]
//!         }"#[..],
//!     )
//!     .with_resource(
//!         "https://example.com/search/resultsData.csv",
//!         &b"address,suburb,latitude,longitude\n1 Main Street,Newtown,-27.5,153.0\n"[..],
//!     );
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! runtime.block_on(async {
//!     let provider = LocationSearchProvider::initialize(
//!         ProviderConfig::new("https://example.com/search/indexRoot.json"),
//!         Arc::new(fetcher),
//!         Arc::new(NoopViewer),
//!         None,
//!     )
//!     .await?;
//!
//!     let results = provider.search("main").await.map_err(GazetteerError::from)?;
//!     assert_eq!(results[0].name, "1 Main Street (Newtown)");
//!
//!     // Flies the viewer to the matched location.
//!     results[0].navigate().await;
//!     Ok::<(), GazetteerError>(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Prebuilt indexes**: bundles are produced offline (see the companion
//!   `gazetteer-indexer` crate) and loaded read-only, lazily, exactly once.
//! - **Fuzzy and prefix matching**: queries tolerate typos and partial words,
//!   with per-field weighting supplied by the bundle or the caller.
//! - **Partial-failure tolerance**: hits without a matching results row are
//!   dropped quietly; a failing index fails only the current query.
//! - **Camera targets**: every result carries a bound navigation action that
//!   computes a fresh camera view, enriched best-effort by terrain height.

use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod camera;
pub mod error;
mod fetch;
mod index;
mod manifest;
mod options;
mod provider;
mod results;

pub use camera::{
    CameraOptions, CameraView, DEFAULT_FLIGHT_DURATION, DEFAULT_MIN_VIEW_DISTANCE,
    DEFAULT_PITCH_DEGREES, DEFAULT_TERRAIN_TIMEOUT, LatLon, MapViewer, NavigationContext,
    TerrainError, TerrainSampler, build_camera_view,
};
pub use error::{GazetteerError, Result};
pub use fetch::{FetchError, Fetcher, HttpFetcher, StaticFetcher, join_url};
pub use index::{Hit, IndexError, SearchError, TextIndex};
pub use manifest::{IndexManifest, IndexRef, ManifestError, ResultLabel};
pub use options::{LabelFormat, ProviderConfig, SearchOptions, SearchOptionsBuilder};
pub use provider::{
    LocationSearchProvider, NO_LOCATIONS_MESSAGE, QueryError, QuerySeq, SEARCH_FAILED_MESSAGE,
    SearchOutcome, SearchResult,
};
pub use results::{DataError, ResultsDataStore, Row, RowTable};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the Gazetteer library.
///
/// This sets up structured logging with configurable levels and filtering.
/// Call this once at the start of your application to enable detailed
/// logging output from Gazetteer operations.
///
/// # Arguments
///
/// * `level` - The minimum log level to display
///
/// # Examples
///
/// ```rust
/// use gazetteer::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), gazetteer::GazetteerError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static ()> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("tantivy=warn".parse().unwrap())
            .add_directive("hyper_util=warn".parse().unwrap());

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_initializes_once() {
        let first = init_logging(tracing::Level::WARN);
        assert!(first.is_ok());

        // Re-initialization is a no-op, never a panic or error.
        let second = init_logging(tracing::Level::DEBUG);
        assert!(second.is_ok());
    }
}
