use thiserror::Error;

#[derive(Error, Debug)]
pub enum GazetteerError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] crate::manifest::ManifestError),
    #[error("Fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),
    #[error("Index error: {0}")]
    Index(#[from] crate::index::IndexError),
    #[error("Search error: {0}")]
    Search(#[from] crate::index::SearchError),
    #[error("Results data error: {0}")]
    Data(#[from] crate::results::DataError),
    #[error("Query error: {0}")]
    Query(#[from] crate::provider::QueryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GazetteerError>;
