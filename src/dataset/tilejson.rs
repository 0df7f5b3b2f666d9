//! TileJSON 3.0.0 documents for the metadata endpoint.

use std::collections::BTreeMap;

use serde::Serialize;

use super::DatasetId;

pub const TILEJSON_VERSION: &str = "3.0.0";

/// A TileJSON document describing one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct TileJson {
    pub tilejson: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub attribution: &'static str,
    pub version: &'static str,
    pub scheme: &'static str,
    pub tiles: Vec<String>,
    pub minzoom: u8,
    pub maxzoom: u8,
    pub bounds: [f64; 4],
    pub vector_layers: Vec<VectorLayer>,
}

/// Entry of the `vector_layers` array.
#[derive(Debug, Clone, Serialize)]
pub struct VectorLayer {
    pub id: &'static str,
    pub description: &'static str,
    pub minzoom: u8,
    pub maxzoom: u8,
    /// Attribute name to type name
    pub fields: BTreeMap<&'static str, &'static str>,
}

impl TileJson {
    /// Build the document for `dataset`.
    ///
    /// # Arguments
    /// * `origin` - Public origin of this service, e.g. `https://tiles.example.com`
    /// * `api_key` - Key appended to the tile URL template, if any
    pub fn for_dataset(dataset: DatasetId, origin: &str, api_key: Option<&str>) -> Self {
        let config = dataset.config();

        let layer = VectorLayer {
            id: config.source_layer,
            description: config.description,
            minzoom: config.min_zoom,
            maxzoom: config.max_zoom,
            fields: config
                .fields
                .iter()
                .map(|(name, ty)| (*name, ty.as_str()))
                .collect(),
        };

        Self {
            tilejson: TILEJSON_VERSION,
            name: config.name,
            description: config.description,
            attribution: config.attribution,
            version: env!("CARGO_PKG_VERSION"),
            scheme: "xyz",
            tiles: vec![tile_url_template(origin, dataset, api_key)],
            minzoom: config.min_zoom,
            maxzoom: config.max_zoom,
            bounds: config.bounds,
            vector_layers: vec![layer],
        }
    }
}

/// Tile URL template pointing back at this service.
///
/// ```text
/// {origin}/{dataset}/{z}/{x}/{y}.mvt?key={api_key}
/// ```
pub fn tile_url_template(origin: &str, dataset: DatasetId, api_key: Option<&str>) -> String {
    let base = format!(
        "{}/{}/{{z}}/{{x}}/{{y}}.mvt",
        origin.trim_end_matches('/'),
        dataset
    );
    match api_key {
        Some(key) => format!("{}?key={}", base, urlencoding::encode(key)),
        None => base,
    }
}
