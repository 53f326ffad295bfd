//! Bundle assembly: validate definitions against the records, then emit the
//! manifest, one payload per sub-index, and the results-data CSV.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use polars::prelude::{Column, CsvWriter, DataFrame, SerWriter};
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

use crate::IndexerError;
use crate::definition::{IndexDefinition, IndexRecord};

/// File name of the bundle manifest.
pub const MANIFEST_FILE_NAME: &str = "indexRoot.json";
/// File name of the results-data table.
pub const RESULTS_DATA_FILE_NAME: &str = "resultsData.csv";

/// Collects records and sub-index definitions, then builds an [`IndexBundle`].
///
/// Row ids are assigned by record order, matching how the search side keys
/// the results data by default.
#[derive(Debug, Default)]
pub struct IndexSetBuilder {
    records: Vec<IndexRecord>,
    definitions: Vec<IndexDefinition>,
    latitude_column: String,
    longitude_column: String,
}

impl IndexSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            definitions: Vec::new(),
            latitude_column: "latitude".to_string(),
            longitude_column: "longitude".to_string(),
        }
    }

    #[must_use]
    pub fn record(mut self, record: IndexRecord) -> Self {
        self.records.push(record);
        self
    }

    #[must_use]
    pub fn records<I>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = IndexRecord>,
    {
        self.records.extend(records);
        self
    }

    #[must_use]
    pub fn index(mut self, definition: IndexDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Names of the coordinate columns the records must carry.
    #[must_use]
    pub fn coordinate_columns(
        mut self,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        self.latitude_column = latitude.into();
        self.longitude_column = longitude.into();
        self
    }

    /// Validate and assemble the bundle.
    #[instrument(name = "Build index bundle", level = "info", skip_all, fields(num_records = self.records.len(), num_indexes = self.definitions.len()))]
    pub fn build(self) -> Result<IndexBundle, IndexerError> {
        if self.records.is_empty() {
            return Err(IndexerError::NoRecords);
        }

        let columns: BTreeSet<&str> = self.records.iter().flat_map(IndexRecord::columns).collect();
        for coordinate in [&self.latitude_column, &self.longitude_column] {
            if !columns.contains(coordinate.as_str()) {
                return Err(IndexerError::MissingCoordinateColumn(coordinate.clone()));
            }
        }
        self.validate_definitions(&columns)?;

        let mut files = Vec::with_capacity(self.definitions.len() + 2);
        files.push((MANIFEST_FILE_NAME.to_string(), self.manifest_json()?));
        files.push((RESULTS_DATA_FILE_NAME.to_string(), self.results_csv(&columns)?));
        for definition in &self.definitions {
            files.push((
                payload_file_name(definition),
                self.payload_json(definition)?,
            ));
        }

        info!(num_files = files.len(), "index bundle assembled");
        Ok(IndexBundle { files })
    }

    fn validate_definitions(&self, columns: &BTreeSet<&str>) -> Result<(), IndexerError> {
        let mut names = HashSet::new();
        for definition in &self.definitions {
            if !names.insert(definition.name.as_str()) {
                return Err(IndexerError::DuplicateIndex(definition.name.clone()));
            }
            if definition.fields.is_empty() {
                return Err(IndexerError::NoFields(definition.name.clone()));
            }
            let referenced = definition
                .fields
                .iter()
                .chain(&definition.label_prefix)
                .chain(&definition.label_suffix);
            for column in referenced {
                if column == "id" {
                    return Err(IndexerError::ReservedField(definition.name.clone()));
                }
                if !columns.contains(column.as_str()) {
                    return Err(IndexerError::UnknownColumn {
                        index: definition.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn manifest_json(&self) -> Result<Vec<u8>, IndexerError> {
        let indexes: Vec<Value> = self
            .definitions
            .iter()
            .map(|definition| {
                let mut entry = Map::new();
                entry.insert("url".to_string(), json!(payload_file_name(definition)));
                if let Some(prefix) = &definition.label_prefix {
                    entry.insert("resultLabelPrefix".to_string(), json!(prefix));
                }
                if let Some(suffix) = &definition.label_suffix {
                    entry.insert("resultLabelSuffix".to_string(), json!(suffix));
                }
                Value::Object(entry)
            })
            .collect();

        let manifest = json!({
            "resultsDataUrl": RESULTS_DATA_FILE_NAME,
            "indexes": indexes,
        });
        Ok(serde_json::to_vec_pretty(&manifest)?)
    }

    /// Serialize one sub-index: its construction options plus the searchable
    /// field values of every record, keyed by row id.
    fn payload_json(&self, definition: &IndexDefinition) -> Result<Vec<u8>, IndexerError> {
        let mut options = Map::new();
        options.insert("fields".to_string(), json!(definition.fields));
        if !definition.weights.is_empty() {
            options.insert("weights".to_string(), json!(definition.weights));
        }
        options.insert("fuzzy".to_string(), json!(definition.fuzzy));
        options.insert("prefix".to_string(), json!(definition.prefix));

        let documents: Vec<Value> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(id, record)| {
                let mut document = Map::new();
                document.insert("id".to_string(), json!(id));
                let mut has_text = false;
                for field in &definition.fields {
                    if let Some(value) = record.get(field).filter(|v| !v.is_empty()) {
                        document.insert(field.clone(), json!(value));
                        has_text = true;
                    }
                }
                has_text.then_some(Value::Object(document))
            })
            .collect();

        let payload = json!({
            "options": Value::Object(options),
            "documents": documents,
        });
        Ok(serde_json::to_vec_pretty(&payload)?)
    }

    /// Write the records as a header-row CSV. Columns come out in name
    /// order; cells are raw strings, so values like `007001` survive intact.
    fn results_csv(&self, columns: &BTreeSet<&str>) -> Result<Vec<u8>, IndexerError> {
        let series: Vec<Column> = columns
            .iter()
            .map(|column| {
                let values: Vec<String> = self
                    .records
                    .iter()
                    .map(|record| record.get(column).unwrap_or("").to_string())
                    .collect();
                Column::new((*column).into(), values)
            })
            .collect();
        let mut frame = DataFrame::new(series)?;

        let mut raw = Vec::new();
        CsvWriter::new(&mut raw)
            .include_header(true)
            .finish(&mut frame)?;
        Ok(raw)
    }
}

fn payload_file_name(definition: &IndexDefinition) -> String {
    format!("indexes/{}.json", definition.name)
}

/// A fully assembled bundle, held in memory until written out.
#[derive(Debug)]
pub struct IndexBundle {
    files: Vec<(String, Vec<u8>)>,
}

impl IndexBundle {
    /// Every artifact as a `(relative name, contents)` pair, manifest first.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(name, contents)| (name.as_str(), contents.as_slice()))
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, contents)| contents.as_slice())
    }

    #[must_use]
    pub fn manifest(&self) -> &[u8] {
        &self.files[0].1
    }

    /// Write all artifacts under `dir`, creating directories as needed.
    #[instrument(name = "Write index bundle", level = "info", skip(self))]
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), IndexerError> {
        for (name, contents) in &self.files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, contents)?;
        }
        info!(num_files = self.files.len(), dir = %dir.display(), "index bundle written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_builder() -> IndexSetBuilder {
        IndexSetBuilder::new()
            .record(
                IndexRecord::new()
                    .field("address", "1 Main Street")
                    .field("suburb", "Newtown")
                    .field("parcel", "007001")
                    .field("latitude", "-27.5")
                    .field("longitude", "153.0"),
            )
            .record(
                IndexRecord::new()
                    .field("address", "2 High Street")
                    .field("suburb", "Oldtown")
                    .field("parcel", "007002")
                    .field("latitude", "-27.6")
                    .field("longitude", "153.1"),
            )
            .index(
                IndexDefinition::new("address")
                    .fields(["address", "suburb"])
                    .weight("address", 2.0)
                    .label_prefix("address")
                    .label_suffix("suburb"),
            )
            .index(
                IndexDefinition::new("parcel")
                    .field("parcel")
                    .fuzzy(0)
                    .label_prefix("parcel"),
            )
    }

    #[test]
    fn builds_manifest_payloads_and_csv() {
        let bundle = sample_builder().build().expect("valid bundle");

        let manifest: serde_json::Value =
            serde_json::from_slice(bundle.manifest()).expect("manifest is JSON");
        assert_eq!(manifest["resultsDataUrl"], RESULTS_DATA_FILE_NAME);
        assert_eq!(manifest["indexes"][0]["url"], "indexes/address.json");
        assert_eq!(manifest["indexes"][0]["resultLabelPrefix"], "address");
        assert_eq!(manifest["indexes"][1]["url"], "indexes/parcel.json");

        let payload: serde_json::Value = serde_json::from_slice(
            bundle.file("indexes/address.json").expect("payload exists"),
        )
        .expect("payload is JSON");
        assert_eq!(payload["options"]["fields"][0], "address");
        assert_eq!(payload["options"]["weights"]["address"], 2.0);
        assert_eq!(payload["documents"][1]["id"], 1);
        assert_eq!(payload["documents"][1]["address"], "2 High Street");

        let csv = String::from_utf8(
            bundle
                .file(RESULTS_DATA_FILE_NAME)
                .expect("csv exists")
                .to_vec(),
        )
        .expect("csv is utf8");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("address,latitude,longitude,parcel,suburb")
        );
        // Leading zeros survive because cells are never retyped.
        assert!(lines.next().is_some_and(|line| line.contains("007001")));
    }

    #[test]
    fn rejects_empty_record_set() {
        let result = IndexSetBuilder::new()
            .index(IndexDefinition::new("address").field("address"))
            .build();
        assert!(matches!(result, Err(IndexerError::NoRecords)));
    }

    #[test]
    fn rejects_missing_coordinate_columns() {
        let result = IndexSetBuilder::new()
            .record(IndexRecord::new().field("address", "1 Main St"))
            .build();
        assert!(matches!(
            result,
            Err(IndexerError::MissingCoordinateColumn(c)) if c == "latitude"
        ));
    }

    #[test]
    fn rejects_unknown_field_references() {
        let result = sample_builder()
            .index(IndexDefinition::new("broken").field("nope"))
            .build();
        assert!(matches!(
            result,
            Err(IndexerError::UnknownColumn { index, column }) if index == "broken" && column == "nope"
        ));
    }

    #[test]
    fn rejects_duplicate_index_names() {
        let result = sample_builder()
            .index(IndexDefinition::new("address").field("address"))
            .build();
        assert!(matches!(result, Err(IndexerError::DuplicateIndex(n)) if n == "address"));
    }

    #[test]
    fn rejects_reserved_id_field() {
        let result = IndexSetBuilder::new()
            .record(
                IndexRecord::new()
                    .field("id", "7")
                    .field("latitude", "0")
                    .field("longitude", "0"),
            )
            .index(IndexDefinition::new("broken").field("id"))
            .build();
        assert!(matches!(result, Err(IndexerError::ReservedField(n)) if n == "broken"));
    }

    #[test]
    fn records_without_indexed_text_are_skipped() {
        let bundle = IndexSetBuilder::new()
            .record(
                IndexRecord::new()
                    .field("address", "1 Main St")
                    .field("latitude", "0")
                    .field("longitude", "0"),
            )
            .record(
                IndexRecord::new()
                    .field("address", "")
                    .field("latitude", "1")
                    .field("longitude", "1"),
            )
            .index(IndexDefinition::new("address").field("address"))
            .build()
            .expect("valid bundle");

        let payload: serde_json::Value = serde_json::from_slice(
            bundle.file("indexes/address.json").expect("payload exists"),
        )
        .expect("payload is JSON");
        let documents = payload["documents"].as_array().expect("documents array");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["id"], 0);
    }

    #[test]
    fn writes_bundle_to_disk() {
        let bundle = sample_builder().build().expect("valid bundle");
        let dir = tempfile::tempdir().expect("temp dir");
        bundle.write_to_dir(dir.path()).expect("writes cleanly");

        assert!(dir.path().join(MANIFEST_FILE_NAME).is_file());
        assert!(dir.path().join(RESULTS_DATA_FILE_NAME).is_file());
        assert!(dir.path().join("indexes/address.json").is_file());
        assert!(dir.path().join("indexes/parcel.json").is_file());
    }
}
