//! Offline builder for gazetteer search bundles.
//!
//! The search side treats its inputs as read-only: a bundle manifest, one
//! serialized index payload per sub-index, and a results-data CSV. This crate
//! produces those artifacts from a set of string-typed records:
//!
//! ```rust
//! use gazetteer_indexer::{IndexDefinition, IndexRecord, IndexSetBuilder};
//!
//! let bundle = IndexSetBuilder::new()
//!     .record(
//!         IndexRecord::new()
//!             .field("address", "1 Main Street")
//!             .field("suburb", "Newtown")
//!             .field("latitude", "-27.5")
//!             .field("longitude", "153.0"),
//!     )
//!     .index(
//!         IndexDefinition::new("address")
//!             .field("address")
//!             .field("suburb")
//!             .weight("address", 2.0)
//!             .label_prefix("address")
//!             .label_suffix("suburb"),
//!     )
//!     .build()?;
//!
//! // bundle.write_to_dir(path) publishes the artifacts for hosting.
//! assert!(bundle.file("indexRoot.json").is_some());
//! # Ok::<(), gazetteer_indexer::IndexerError>(())
//! ```
//!
//! Every cell stays a string end to end; identifiers like parcel numbers
//! keep their leading zeros through the CSV and back out of the search side.

mod bundle;
mod definition;

pub use bundle::{IndexBundle, IndexSetBuilder, MANIFEST_FILE_NAME, RESULTS_DATA_FILE_NAME};
pub use definition::{IndexDefinition, IndexRecord};
pub use error::IndexerError;

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum IndexerError {
        #[error("no records to index")]
        NoRecords,
        #[error("required coordinate column `{0}` is missing from the records")]
        MissingCoordinateColumn(String),
        #[error("index `{0}` is defined more than once")]
        DuplicateIndex(String),
        #[error("index `{0}` has no searchable fields")]
        NoFields(String),
        #[error("index `{index}` references unknown column `{column}`")]
        UnknownColumn { index: String, column: String },
        #[error("index `{0}` uses the reserved field name `id`")]
        ReservedField(String),
        #[error("CSV error: {0}")]
        Csv(#[from] polars::prelude::PolarsError),
        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }
}
