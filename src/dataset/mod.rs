//! Static dataset catalog.
//!
//! Every dataset the service knows about is a variant of [`DatasetId`]. Path
//! segments are parsed into it once at the edge; anything else is an unknown
//! dataset. The per-dataset configuration is compiled in and never changes at
//! runtime.

mod check;
mod tilejson;

use std::fmt;
use std::str::FromStr;

pub use check::{check_dataset, ArchiveSummary};
pub use tilejson::{tile_url_template, TileJson, VectorLayer, TILEJSON_VERSION};

use crate::error::TileError;

/// Web Mercator bounds: `[min_lon, min_lat, max_lon, max_lat]`.
pub const WORLD_BOUNDS: [f64; 4] = [-180.0, -85.051_128_779_806_6, 180.0, 85.051_128_779_806_6];

/// Continental United States, used by the national agricultural datasets.
const CONUS_BOUNDS: [f64; 4] = [-125.0, 24.0, -66.0, 50.0];

const USDA_ATTRIBUTION: &str = "USDA";

// =============================================================================
// Dataset Identifiers
// =============================================================================

/// A dataset served by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetId {
    /// Soil survey map units
    Ssurgo,
    /// Cropland data layer
    Cdl,
    /// Public land survey system
    Plss,
    /// Common land unit field boundaries
    Clu,
}

impl DatasetId {
    pub const ALL: [DatasetId; 4] = [
        DatasetId::Ssurgo,
        DatasetId::Cdl,
        DatasetId::Plss,
        DatasetId::Clu,
    ];

    /// Name used in URLs and archive file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetId::Ssurgo => "ssurgo",
            DatasetId::Cdl => "cdl",
            DatasetId::Plss => "plss",
            DatasetId::Clu => "clu",
        }
    }

    pub fn config(&self) -> &'static DatasetConfig {
        match self {
            DatasetId::Ssurgo => &SSURGO,
            DatasetId::Cdl => &CDL,
            DatasetId::Plss => &PLSS,
            DatasetId::Clu => &CLU,
        }
    }

    /// Names of all datasets, for error bodies and logs.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|d| d.as_str()).collect()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| TileError::UnknownDataset(s.to_string()))
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Attribute type advertised in a TileJSON `vector_layers` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
        }
    }
}

/// Static configuration of one dataset.
#[derive(Debug)]
pub struct DatasetConfig {
    pub id: DatasetId,
    pub name: &'static str,
    pub description: &'static str,
    pub attribution: &'static str,
    /// Advertised zoom range; overrides whatever the archive declares
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: [f64; 4],
    /// Archive object name relative to the origin (and prefix)
    pub archive: &'static str,
    /// Layer name inside the vector tiles
    pub source_layer: &'static str,
    pub fields: &'static [(&'static str, FieldType)],
}

static SSURGO: DatasetConfig = DatasetConfig {
    id: DatasetId::Ssurgo,
    name: "SSURGO Soils",
    description: "Soil survey map units with component and productivity attributes",
    attribution: USDA_ATTRIBUTION,
    min_zoom: 8,
    max_zoom: 15,
    bounds: WORLD_BOUNDS,
    archive: "ssurgo.pmtiles",
    source_layer: "ssurgo",
    fields: &[
        ("mukey", FieldType::String),
        ("musym", FieldType::String),
        ("muname", FieldType::String),
        ("farmlndcl", FieldType::String),
        ("nccpi", FieldType::Number),
    ],
};

static CDL: DatasetConfig = DatasetConfig {
    id: DatasetId::Cdl,
    name: "Cropland Data Layer",
    description: "Annual crop-specific land cover",
    attribution: USDA_ATTRIBUTION,
    min_zoom: 5,
    max_zoom: 14,
    bounds: CONUS_BOUNDS,
    archive: "cdl.pmtiles",
    source_layer: "cdl",
    fields: &[
        ("crop_code", FieldType::Number),
        ("crop_name", FieldType::String),
        ("year", FieldType::Number),
    ],
};

static PLSS: DatasetConfig = DatasetConfig {
    id: DatasetId::Plss,
    name: "PLSS Survey Grid",
    description: "Public land survey townships, ranges and sections",
    attribution: "Bureau of Land Management",
    min_zoom: 6,
    max_zoom: 15,
    bounds: WORLD_BOUNDS,
    archive: "plss.pmtiles",
    source_layer: "plss",
    fields: &[
        ("township", FieldType::String),
        ("range", FieldType::String),
        ("section", FieldType::Number),
        ("label", FieldType::String),
    ],
};

static CLU: DatasetConfig = DatasetConfig {
    id: DatasetId::Clu,
    name: "Common Land Units",
    description: "Farm field boundaries",
    attribution: USDA_ATTRIBUTION,
    min_zoom: 11,
    max_zoom: 15,
    bounds: WORLD_BOUNDS,
    archive: "clu.pmtiles",
    source_layer: "clu",
    fields: &[
        ("clu_id", FieldType::String),
        ("acres", FieldType::Number),
        ("state", FieldType::String),
        ("county", FieldType::String),
        ("cropland", FieldType::Boolean),
    ],
};
