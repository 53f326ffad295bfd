//! Search and provider configuration.
//!
//! All tuning lives in immutable value types handed to the provider at
//! construction. Per-index defaults shipped inside an index payload apply
//! wherever a [`SearchOptions`] field is left unset.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::{CameraOptions, DEFAULT_FLIGHT_DURATION, DEFAULT_TERRAIN_TIMEOUT};
use crate::results::Row;

/// Caller-supplied label rule, consulted before the manifest's
/// prefix/suffix columns. Returning `None` falls through to the default
/// labeling.
pub type LabelFormat = Arc<dyn for<'a> Fn(&Row<'a>) -> Option<String> + Send + Sync>;

/// Options applied to every query.
#[derive(Clone)]
pub struct SearchOptions {
    /// Maximum number of hits returned per index.
    pub limit: usize,
    /// Maximum edit distance for fuzzy matching, `0` for exact terms only.
    /// `None` uses the fuzziness the index was built with.
    pub fuzziness: Option<u8>,
    /// Match on term prefixes. `None` uses the index default.
    pub prefix: Option<bool>,
    /// Per-field relevance weights, overriding the index's shipped weights.
    pub field_weights: Option<HashMap<String, f32>>,
    /// Results-data column holding the latitude.
    pub latitude_column: String,
    /// Results-data column holding the longitude.
    pub longitude_column: String,
    /// Custom label rule; see [`LabelFormat`].
    pub label_format: Option<LabelFormat>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            fuzziness: None,
            prefix: None,
            field_weights: None,
            latitude_column: "latitude".to_string(),
            longitude_column: "longitude".to_string(),
            label_format: None,
        }
    }
}

impl std::fmt::Debug for SearchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOptions")
            .field("limit", &self.limit)
            .field("fuzziness", &self.fuzziness)
            .field("prefix", &self.prefix)
            .field("field_weights", &self.field_weights)
            .field("latitude_column", &self.latitude_column)
            .field("longitude_column", &self.longitude_column)
            .field("has_label_format", &self.label_format.is_some())
            .finish()
    }
}

impl SearchOptions {
    #[must_use]
    pub fn builder() -> SearchOptionsBuilder {
        SearchOptionsBuilder::new()
    }
}

/// Builder for [`SearchOptions`] with ergonomic presets.
#[derive(Debug, Clone, Default)]
pub struct SearchOptionsBuilder {
    options: SearchOptions,
}

impl SearchOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for exact matching only: no fuzziness, no prefix expansion.
    #[must_use]
    pub fn exact() -> Self {
        let mut builder = Self::new();
        builder.options.fuzziness = Some(0);
        builder.options.prefix = Some(false);
        builder
    }

    /// Preset tolerant of typos and partial words.
    #[must_use]
    pub fn typo_tolerant() -> Self {
        let mut builder = Self::new();
        builder.options.fuzziness = Some(2);
        builder.options.prefix = Some(true);
        builder
    }

    /// Maximum number of hits returned per index.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = limit;
        self
    }

    /// Maximum fuzzy edit distance, clamped to `0..=2`.
    #[must_use]
    pub fn fuzziness(mut self, distance: u8) -> Self {
        self.options.fuzziness = Some(distance.min(2));
        self
    }

    #[must_use]
    pub fn prefix(mut self, enabled: bool) -> Self {
        self.options.prefix = Some(enabled);
        self
    }

    /// Override the relevance weight of one searchable field.
    #[must_use]
    pub fn field_weight(mut self, field: impl Into<String>, weight: f32) -> Self {
        self.options
            .field_weights
            .get_or_insert_with(HashMap::new)
            .insert(field.into(), weight);
        self
    }

    /// Names of the coordinate columns in the results data.
    #[must_use]
    pub fn coordinate_columns(
        mut self,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        self.options.latitude_column = latitude.into();
        self.options.longitude_column = longitude.into();
        self
    }

    /// Custom label rule, consulted before the manifest's prefix/suffix
    /// columns.
    #[must_use]
    pub fn label_format(mut self, format: LabelFormat) -> Self {
        self.options.label_format = Some(format);
        self
    }

    #[must_use]
    pub fn build(self) -> SearchOptions {
        self.options
    }
}

/// Immutable provider configuration, passed in at construction.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// URL of the bundle manifest.
    pub index_root_url: String,
    /// Duration of the camera flight submitted with each navigation.
    pub flight_duration: Duration,
    /// Budget for a terrain-height sample before falling back to the
    /// ground-level view.
    pub terrain_timeout: Duration,
    /// Results-data column holding each row's id. `None` keys rows by their
    /// position in the table.
    pub id_column: Option<String>,
    pub search: SearchOptions,
    pub camera: CameraOptions,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(index_root_url: impl Into<String>) -> Self {
        Self {
            index_root_url: index_root_url.into(),
            flight_duration: DEFAULT_FLIGHT_DURATION,
            terrain_timeout: DEFAULT_TERRAIN_TIMEOUT,
            id_column: None,
            search: SearchOptions::default(),
            camera: CameraOptions::default(),
        }
    }

    #[must_use]
    pub fn flight_duration(mut self, duration: Duration) -> Self {
        self.flight_duration = duration;
        self
    }

    #[must_use]
    pub fn terrain_timeout(mut self, timeout: Duration) -> Self {
        self.terrain_timeout = timeout;
        self
    }

    /// Key results-data rows by this column instead of by row order.
    #[must_use]
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn search_options(mut self, options: SearchOptions) -> Self {
        self.search = options;
        self
    }

    #[must_use]
    pub fn camera_options(mut self, options: CameraOptions) -> Self {
        self.camera = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = SearchOptions::default();
        assert_eq!(options.limit, 20);
        assert_eq!(options.fuzziness, None);
        assert_eq!(options.prefix, None);
        assert_eq!(options.latitude_column, "latitude");
        assert_eq!(options.longitude_column, "longitude");
    }

    #[test]
    fn presets() {
        let exact = SearchOptionsBuilder::exact().build();
        assert_eq!(exact.fuzziness, Some(0));
        assert_eq!(exact.prefix, Some(false));

        let tolerant = SearchOptionsBuilder::typo_tolerant().build();
        assert_eq!(tolerant.fuzziness, Some(2));
        assert_eq!(tolerant.prefix, Some(true));
    }

    #[test]
    fn fuzziness_is_clamped() {
        let options = SearchOptions::builder().fuzziness(200).build();
        assert_eq!(options.fuzziness, Some(2));
    }

    #[test]
    fn method_chaining() {
        let options = SearchOptions::builder()
            .limit(5)
            .field_weight("address", 3.0)
            .field_weight("suburb", 1.5)
            .coordinate_columns("lat", "lon")
            .build();

        assert_eq!(options.limit, 5);
        let weights = options.field_weights.expect("weights set");
        assert_eq!(weights.get("address"), Some(&3.0));
        assert_eq!(weights.get("suburb"), Some(&1.5));
        assert_eq!(options.latitude_column, "lat");
        assert_eq!(options.longitude_column, "lon");
    }

    #[test]
    fn preset_values_can_be_overridden() {
        let options = SearchOptionsBuilder::typo_tolerant().fuzziness(1).build();
        assert_eq!(options.fuzziness, Some(1));
        assert_eq!(options.prefix, Some(true));
    }

    #[test]
    fn provider_config_defaults_and_chaining() {
        let config = ProviderConfig::new("https://example.com/indexRoot.json")
            .flight_duration(Duration::from_secs(5))
            .id_column("fid");

        assert_eq!(config.index_root_url, "https://example.com/indexRoot.json");
        assert_eq!(config.flight_duration, Duration::from_secs(5));
        assert_eq!(config.terrain_timeout, DEFAULT_TERRAIN_TIMEOUT);
        assert_eq!(config.id_column.as_deref(), Some("fid"));
    }
}
