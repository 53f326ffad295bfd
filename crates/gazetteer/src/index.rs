//! Lazily loaded full-text indexes over the results data.
//!
//! Each sub-index named by the manifest is a serialized JSON payload holding
//! the documents to search plus the options the index was built with (field
//! list, weights, fuzziness and prefix defaults). On first use the payload is
//! fetched and deserialized into an in-memory Tantivy index; the loaded index
//! is cached for the lifetime of the owning provider.

use std::collections::{HashMap, HashSet};

pub use error::{IndexError, SearchError};
use serde::Deserialize;
use tantivy::schema::Field;
use tantivy::{
    Index, IndexWriter, TantivyDocument, Term,
    collector::TopDocs,
    query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery},
    schema::{
        FAST, INDEXED, IndexRecordOption, STORED, Schema, SchemaBuilder, TextFieldIndexing,
        TextOptions, Value,
    },
};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::fetch::{Fetcher, join_url};
use crate::manifest::{IndexRef, ResultLabel};
use crate::options::SearchOptions;

/// Relative boosts for the clause kinds making up a query. Exact term
/// matches dominate, prefix expansions rank next, fuzzy matches last.
const EXACT_BOOST: f32 = 4.0;
const PREFIX_BOOST: f32 = 2.0;
const FUZZY_BOOST: f32 = 1.0;

const MAX_FUZZY_DISTANCE: u8 = 2;
/// Tokens shorter than this never fuzzy-match; edit distance 1 on a
/// two-letter token matches nearly everything.
const MIN_FUZZY_TOKEN_LEN: usize = 3;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One ranked match from a sub-index: a results-data row id and its
/// relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: u64,
    pub score: f32,
}

/// Construction options shipped inside an index payload.
///
/// These act as per-index defaults; caller-supplied [`SearchOptions`]
/// override them per field.
#[derive(Debug, Clone, Deserialize)]
struct PayloadOptions {
    fields: Vec<String>,
    #[serde(default)]
    weights: HashMap<String, f32>,
    #[serde(default)]
    fuzzy: u8,
    #[serde(default = "default_prefix")]
    prefix: bool,
}

fn default_prefix() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct IndexPayload {
    options: PayloadOptions,
    #[serde(default)]
    documents: Vec<IndexDocument>,
}

#[derive(Debug, Deserialize)]
struct IndexDocument {
    id: u64,
    #[serde(flatten)]
    fields: HashMap<String, String>,
}

#[derive(Debug)]
struct LoadedIndex {
    index: Index,
    id_field: Field,
    text_fields: Vec<(String, Field)>,
    options: PayloadOptions,
}

impl LoadedIndex {
    fn build(payload: IndexPayload) -> Result<Self, IndexError> {
        let IndexPayload { options, documents } = payload;
        if options.fields.is_empty() {
            return Err(anyhow::anyhow!("index payload declares no searchable fields").into());
        }
        let mut seen = HashSet::new();
        for field in &options.fields {
            if field == "id" {
                return Err(anyhow::anyhow!("`id` is reserved and cannot be a search field").into());
            }
            if !seen.insert(field.as_str()) {
                return Err(anyhow::anyhow!("duplicate search field `{field}`").into());
            }
        }

        let mut schema_builder = SchemaBuilder::new();
        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_options = TextOptions::default().set_indexing_options(text_indexing);

        let id_field = schema_builder.add_u64_field("id", STORED | INDEXED | FAST);
        let text_fields: Vec<(String, Field)> = options
            .fields
            .iter()
            .map(|name| (name.clone(), schema_builder.add_text_field(name, text_options.clone())))
            .collect();
        let schema: Schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
        for document in &documents {
            let mut doc = TantivyDocument::default();
            doc.add_u64(id_field, document.id);
            for (name, field) in &text_fields {
                if let Some(value) = document.fields.get(name) {
                    doc.add_text(*field, value);
                }
            }
            writer.add_document(doc)?;
        }
        writer.commit()?;

        Ok(Self {
            index,
            id_field,
            text_fields,
            options,
        })
    }
}

/// One lazily loaded sub-index of a search bundle.
///
/// `load` is idempotent: the first caller fetches and deserializes the
/// payload, concurrent callers await that same load, and later callers get
/// the cached index. Searching before a successful load fails with
/// [`SearchError::NotLoaded`].
#[derive(Debug)]
pub struct TextIndex {
    url: String,
    result_label: ResultLabel,
    loaded: OnceCell<LoadedIndex>,
}

impl TextIndex {
    #[must_use]
    pub fn new(reference: &IndexRef) -> Self {
        Self {
            url: reference.url.clone(),
            result_label: reference.result_label.clone(),
            loaded: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn result_label(&self) -> &ResultLabel {
        &self.result_label
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Fetch and deserialize the index payload, once.
    #[instrument(name = "Load text index", level = "debug", skip(self, fetcher), fields(index = %self.url))]
    pub async fn load(&self, fetcher: &dyn Fetcher, base_url: &str) -> Result<(), IndexError> {
        self.loaded
            .get_or_try_init(|| async {
                let url = join_url(base_url, &self.url);
                info!(url = %url, "loading text index");
                let raw = fetcher.fetch(&url).await?;
                let payload: IndexPayload = serde_json::from_slice(&raw)?;
                let loaded = LoadedIndex::build(payload)?;
                info!(
                    fields = loaded.text_fields.len(),
                    "text index loaded"
                );
                Ok(loaded)
            })
            .await
            .map(|_| ())
    }

    /// Run a ranked search over the loaded index.
    ///
    /// Matches are ordered by descending relevance score; ties are broken by
    /// ascending row id so repeated queries against the same loaded state
    /// return the same ordering.
    #[instrument(name = "Search text index", level = "debug", skip_all, fields(index = %self.url, query = query_str))]
    pub fn search(
        &self,
        query_str: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Hit>, SearchError> {
        let loaded = self.loaded.get().ok_or(SearchError::NotLoaded)?;

        let query_str = query_str.trim();
        if query_str.is_empty() {
            return Ok(Vec::new());
        }

        let query = build_query(loaded, query_str, options);
        let limit = options.limit.max(1);

        let reader = loaded.index.reader()?;
        let searcher = reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = top_docs
            .into_iter()
            .map(|(score, doc_address)| {
                let doc = searcher.doc::<TantivyDocument>(doc_address)?;
                let id = doc
                    .get_first(loaded.id_field)
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| anyhow::anyhow!("indexed document is missing its row id"))?;
                Ok(Hit { id, score })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        debug!(num_results = hits.len(), "search complete");
        Ok(hits)
    }
}

/// Combine exact, prefix, and fuzzy clauses for every query token across all
/// searchable fields, each boosted by its field weight.
fn build_query(loaded: &LoadedIndex, query_str: &str, options: &SearchOptions) -> BooleanQuery {
    let fuzziness = options
        .fuzziness
        .unwrap_or(loaded.options.fuzzy)
        .min(MAX_FUZZY_DISTANCE);
    let prefix = options.prefix.unwrap_or(loaded.options.prefix);

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    let lowered = query_str.to_lowercase();
    // Split the way the default tokenizer does, so query terms line up with
    // indexed terms.
    for token in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        for (name, field) in &loaded.text_fields {
            let weight = options
                .field_weights
                .as_ref()
                .and_then(|weights| weights.get(name))
                .or_else(|| loaded.options.weights.get(name))
                .copied()
                .unwrap_or(1.0);
            if weight <= 0.0 {
                continue;
            }

            let term = Term::from_field_text(*field, token);
            let exact = TermQuery::new(term.clone(), IndexRecordOption::Basic);
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(exact), weight * EXACT_BOOST)),
            ));

            if prefix {
                let prefix_query = FuzzyTermQuery::new_prefix(term.clone(), 0, true);
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(prefix_query), weight * PREFIX_BOOST)),
                ));
            }

            if fuzziness > 0 && token.chars().count() >= MIN_FUZZY_TOKEN_LEN {
                let fuzzy_query = FuzzyTermQuery::new(term, fuzziness, true);
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(fuzzy_query), weight * FUZZY_BOOST)),
                ));
            }
        }
    }
    BooleanQuery::new(clauses)
}

mod error {
    use thiserror::Error;

    use crate::fetch::FetchError;

    #[derive(Error, Debug)]
    pub enum IndexError {
        #[error("index resource unavailable: {0}")]
        NotFound(#[from] FetchError),
        #[error("failed to parse index payload: {0}")]
        ParseFailure(#[from] serde_json::Error),
        #[error("failed to build in-memory index: {0}")]
        Build(#[from] tantivy::TantivyError),
        #[error(transparent)]
        Other(#[from] anyhow::Error),
    }

    #[derive(Error, Debug)]
    pub enum SearchError {
        #[error("index is not loaded")]
        NotLoaded,
        #[error("search execution failed: {0}")]
        Execution(#[from] tantivy::TantivyError),
        #[error(transparent)]
        Other(#[from] anyhow::Error),
    }
}
