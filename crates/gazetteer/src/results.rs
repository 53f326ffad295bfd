//! Results data: the tabular dataset joined against index hits.
//!
//! The table is a header-row CSV fetched once and cached for the life of the
//! owning provider. Every cell is kept as a string — identifiers that look
//! numeric (parcel numbers, lot/plan codes) must not lose leading zeros or
//! turn into floats. The only place a cell is ever read as a number is
//! [`Row::lat_lon`], and that never mutates the stored value.

use std::io::Cursor;
use std::sync::Arc;

use ahash::AHashMap;
use polars::prelude::{CsvReadOptions, DataFrame, PolarsError, SerReader};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::camera::LatLon;
use crate::fetch::{FetchError, Fetcher, join_url};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("manifest does not name a results data location")]
    MissingUrl,
    #[error("results data unavailable: {0}")]
    NotFound(#[from] FetchError),
    #[error("failed to parse results data: {0}")]
    ParseFailure(#[from] PolarsError),
    #[error("results data has no `{0}` column")]
    MissingIdColumn(String),
}

/// The parsed results table: row id to column name to string value.
#[derive(Debug, Clone)]
pub struct RowTable {
    frame: DataFrame,
    /// Present when rows are keyed by an id column rather than row order.
    ids: Option<AHashMap<u64, usize>>,
}

impl RowTable {
    /// Parse a header-row CSV with schema inference disabled, so every column
    /// comes back as a string.
    pub fn from_csv_bytes(raw: &[u8], id_column: Option<&str>) -> Result<Self, DataError> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(raw.to_vec()))
            .finish()?;

        let ids = match id_column {
            Some(column) => Some(Self::build_id_map(&frame, column)?),
            None => None,
        };
        Ok(Self { frame, ids })
    }

    fn build_id_map(frame: &DataFrame, column: &str) -> Result<AHashMap<u64, usize>, DataError> {
        let values = frame
            .column(column)
            .map_err(|_| DataError::MissingIdColumn(column.to_string()))?
            .str()?;
        let mut ids = AHashMap::with_capacity(values.len());
        for (row, value) in values.iter().enumerate() {
            match value.and_then(|v| v.trim().parse::<u64>().ok()) {
                Some(id) => {
                    if ids.insert(id, row).is_some() {
                        debug!(id, row, "duplicate row id, keeping the later row");
                    }
                }
                None => debug!(row, "row id is not an integer, row unreachable by id"),
            }
        }
        Ok(ids)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Look up a row by id. Pure map access; `None` when the id is absent.
    #[must_use]
    pub fn row(&self, id: u64) -> Option<Row<'_>> {
        let index = match &self.ids {
            Some(ids) => *ids.get(&id)?,
            None => usize::try_from(id).ok().filter(|i| *i < self.len())?,
        };
        Some(Row {
            frame: &self.frame,
            index,
        })
    }
}

/// A borrowed view of one results-data row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    frame: &'a DataFrame,
    index: usize,
}

impl<'a> Row<'a> {
    /// The cell value for `column`, untouched. `None` for unknown columns and
    /// empty cells.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.frame.column(column).ok()?.str().ok()?.get(self.index)
    }

    /// Read the coordinate columns as IEEE-754 doubles.
    #[must_use]
    pub fn lat_lon(&self, latitude_column: &str, longitude_column: &str) -> Option<LatLon> {
        let latitude = self.get(latitude_column)?.trim().parse::<f64>().ok()?;
        let longitude = self.get(longitude_column)?.trim().parse::<f64>().ok()?;
        Some(LatLon::new(latitude, longitude))
    }
}

/// Lazily fetched, cached results table.
///
/// The first caller performs the fetch and parse; concurrent and later
/// callers share the same outcome. Cloning shares the cache.
#[derive(Debug, Clone)]
pub struct ResultsDataStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    url: Option<String>,
    id_column: Option<String>,
    table: OnceCell<RowTable>,
}

impl ResultsDataStore {
    pub(crate) fn new(url: Option<String>, id_column: Option<String>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                url,
                id_column,
                table: OnceCell::new(),
            }),
        }
    }

    pub(crate) fn has_url(&self) -> bool {
        self.inner.url.is_some()
    }

    /// Fetch and parse the table on first use; afterwards return the cached
    /// table.
    #[instrument(name = "Load results data", level = "debug", skip_all)]
    pub async fn get_or_load(
        &self,
        fetcher: &dyn Fetcher,
        base_url: &str,
    ) -> Result<&RowTable, DataError> {
        let url = self.inner.url.as_deref().ok_or(DataError::MissingUrl)?;
        self.inner
            .table
            .get_or_try_init(|| async {
                let absolute = join_url(base_url, url);
                info!(url = %absolute, "loading results data");
                let raw = fetcher.fetch(&absolute).await?;
                let table = RowTable::from_csv_bytes(&raw, self.inner.id_column.as_deref())?;
                info!(rows = table.len(), "results data loaded");
                Ok(table)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    const CSV: &[u8] = b"\
address,suburb,parcel,latitude,longitude
1 Main St,Newtown,007001,-27.5,153.0
2 High St,Oldtown,007002,-27.6,153.1
";

    #[test]
    fn cells_stay_strings() {
        let table = RowTable::from_csv_bytes(CSV, None).expect("valid csv");
        let row = table.row(0).expect("row 0 exists");
        // A numeric-looking identifier keeps its leading zeros.
        assert_eq!(row.get("parcel"), Some("007001"));
        assert_eq!(row.get("latitude"), Some("-27.5"));
    }

    #[test]
    fn rows_are_keyed_by_order_by_default() {
        let table = RowTable::from_csv_bytes(CSV, None).expect("valid csv");
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1).and_then(|r| r.get("address")), Some("2 High St"));
        assert!(table.row(2).is_none());
    }

    #[test]
    fn rows_can_be_keyed_by_id_column() {
        let table = RowTable::from_csv_bytes(CSV, Some("parcel")).expect("valid csv");
        let row = table.row(7002).expect("parcel 007002");
        assert_eq!(row.get("address"), Some("2 High St"));
        assert!(table.row(1).is_none());
    }

    #[test]
    fn missing_id_column_is_an_error() {
        let result = RowTable::from_csv_bytes(CSV, Some("fid"));
        assert!(matches!(result, Err(DataError::MissingIdColumn(c)) if c == "fid"));
    }

    #[test]
    fn lat_lon_reads_coordinates() {
        let table = RowTable::from_csv_bytes(CSV, None).expect("valid csv");
        let location = table
            .row(0)
            .and_then(|r| r.lat_lon("latitude", "longitude"))
            .expect("coordinates parse");
        assert_eq!(location, LatLon::new(-27.5, 153.0));
    }

    #[test]
    fn unknown_column_is_none() {
        let table = RowTable::from_csv_bytes(CSV, None).expect("valid csv");
        assert_eq!(table.row(0).and_then(|r| r.get("nope")), None);
    }

    #[tokio::test]
    async fn store_loads_once_and_caches() {
        let fetcher = StaticFetcher::new().with_resource("https://x.test/bundle/data.csv", CSV);
        let store = ResultsDataStore::new(Some("data.csv".to_string()), None);
        let base = "https://x.test/bundle/indexRoot.json";

        let (first, second) = tokio::join!(
            store.get_or_load(&fetcher, base),
            store.get_or_load(&fetcher, base)
        );
        assert_eq!(first.expect("loads").len(), 2);
        assert_eq!(second.expect("loads").len(), 2);
        assert_eq!(fetcher.fetch_count("https://x.test/bundle/data.csv"), 1);

        store.get_or_load(&fetcher, base).await.expect("cached");
        assert_eq!(fetcher.fetch_count("https://x.test/bundle/data.csv"), 1);
    }

    #[tokio::test]
    async fn store_without_url_reports_missing() {
        let fetcher = StaticFetcher::new();
        let store = ResultsDataStore::new(None, None);
        let result = store.get_or_load(&fetcher, "https://x.test/root.json").await;
        assert!(matches!(result, Err(DataError::MissingUrl)));
    }
}
