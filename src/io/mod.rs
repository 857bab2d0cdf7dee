//! File access collaborators for hyperspectral and thermal products

pub mod templates;
pub mod he5;
pub mod tif;
pub mod file_name;
pub mod stac;

#[cfg(feature = "hdf5")]
pub mod hdf5_store;
#[cfg(feature = "gdal")]
pub mod gdal_raster;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::FileCategory;
use crate::core::cube::Cube;
use crate::core::transform::DigitalNumber;
use crate::types::{AllotropeError, AllotropeResult, SpectralFamily};
use templates::Template;

// Re-export main types
pub use he5::{He5Helper, He5Store, MemoryHe5Store};
pub use tif::{MemoryRaster, RasterSource, TifHelper};
pub use file_name::{AcquisitionMetadata, FileNameParser};
pub use stac::{AssetRole, StacItemBuilder};

/// A metadata attribute value as stored by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric list, widening integer lists
    pub fn as_f64_list(&self) -> Option<Vec<f64>> {
        match self {
            AttributeValue::FloatList(v) => Some(v.clone()),
            AttributeValue::IntList(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    /// Integer list; float lists are accepted when every entry is integral
    pub fn as_i64_list(&self) -> Option<Vec<i64>> {
        match self {
            AttributeValue::IntList(v) => Some(v.clone()),
            AttributeValue::FloatList(v) if v.iter().all(|x| x.fract() == 0.0) => {
                Some(v.iter().map(|&x| x as i64).collect())
            }
            _ => None,
        }
    }
}

/// Attribute table of a file or file component
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Attributes present in a file that failed to decode, keyed by name with the failure reason
pub type UndecodedAttributes = BTreeMap<String, String>;

/// Split per-attribute decode results into decoded values and failures.
///
/// `Ok(None)` marks a type with no scalar or list form; such attributes are dropped.
pub fn partition_attributes<I>(decoded: I) -> (Attributes, UndecodedAttributes)
where
    I: IntoIterator<Item = (String, AllotropeResult<Option<AttributeValue>>)>,
{
    let mut attributes = Attributes::new();
    let mut undecoded = UndecodedAttributes::new();
    for (name, result) in decoded {
        match result {
            Ok(Some(value)) => {
                attributes.insert(name, value);
            }
            Ok(None) => log::debug!("Skipping attribute {} with unsupported type", name),
            Err(e) => {
                log::warn!("Failed to decode attribute {}: {}", name, e);
                undecoded.insert(name, e.to_string());
            }
        }
    }
    (attributes, undecoded)
}

/// Fetch a required attribute, failing with a lookup error when absent
pub fn require_attribute<'a>(
    attributes: &'a Attributes,
    name: &str,
) -> AllotropeResult<&'a AttributeValue> {
    attributes
        .get(name)
        .ok_or_else(|| AllotropeError::Lookup(format!("Attribute {} not found", name)))
}

/// Kind of node in a hierarchical container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Group,
    Dataset,
}

/// Metadata for one path inside an HE5 container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct He5ComponentMetadata {
    pub kind: ComponentKind,
    /// Dataset shape; empty for groups and scalars
    pub shape: Vec<usize>,
    pub is_scalar: bool,
    pub attributes: Attributes,
}

/// Full metadata structure of an HE5 container
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct He5Metadata {
    /// Every group and dataset path in the file
    pub components: Vec<String>,
    pub component_metadata: BTreeMap<String, He5ComponentMetadata>,
    /// Attributes attached to the file root
    pub root_metadata: Attributes,
    /// Root attributes the store could not decode
    #[serde(default)]
    pub undecoded_root_metadata: UndecodedAttributes,
}

impl He5Metadata {
    /// Fetch a root attribute; one that exists but failed to decode is a metadata error
    pub fn root_attribute(&self, name: &str) -> AllotropeResult<&AttributeValue> {
        if let Some(reason) = self.undecoded_root_metadata.get(name) {
            return Err(AllotropeError::Metadata(format!(
                "Root attribute {} could not be decoded: {}",
                name, reason
            )));
        }
        require_attribute(&self.root_metadata, name)
    }
}

/// Profile, tag and bounds properties of a GeoTIFF
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TifMetadata {
    pub properties: Attributes,
}

impl TifMetadata {
    pub fn property(&self, name: &str) -> AllotropeResult<&AttributeValue> {
        require_attribute(&self.properties, name)
    }
}

/// Which bands an extraction returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Every band, ignoring the requested indices
    All,
    /// Exactly the requested bands in request order
    Specific,
}

/// Access to one product file
pub trait FileHelper {
    /// Metadata structure built when the file is opened
    type Metadata;
    /// Template keys resolving logical components to file locations
    type Component: Copy + Ord + std::fmt::Debug;
    /// Raw sample type of the band data
    type Sample: DigitalNumber;

    fn file_category(&self) -> FileCategory;

    fn file_metadata(&self) -> &Self::Metadata;

    fn template(&self) -> &Template<Self::Component>;

    /// Read bands as a cube in the file's native representation.
    ///
    /// With `masking_needed` the returned cube carries a mask of provider fill values.
    fn extract_specific_bands(
        &self,
        bands: &[usize],
        masking_needed: bool,
        spectral_family: Option<SpectralFamily>,
        mode: ExtractionMode,
    ) -> AllotropeResult<Cube<Self::Sample>>;
}

/// File helpers for products carrying per-pixel error matrices
pub trait HyperspectralFileHelper: FileHelper {
    /// Error matrix for `spectral_family` in the same layout as its cube
    fn extract_error_matrices(
        &self,
        bands: &[usize],
        spectral_family: SpectralFamily,
        mode: ExtractionMode,
    ) -> AllotropeResult<Cube<u8>>;
}

/// File helpers for single-band thermal rasters
pub trait ThermalFileHelper: FileHelper {
    /// Provider QA_PIXEL band when a quality raster is attached
    fn extract_quality_band(&self) -> AllotropeResult<Option<Array2<u16>>>;
}
