use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::transform::Transformation;

/// Per-pixel validity cube (1 = usable, 0 = excluded)
pub type ValidityCube = Array3<u8>;

/// Spectral detector family that produced a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpectralFamily {
    /// Shortwave infrared
    #[serde(rename = "SWIR")]
    Swir,
    /// Visible and near infrared
    #[serde(rename = "VNIR")]
    Vnir,
    #[serde(rename = "PANCHROMATIC")]
    Panchromatic,
}

impl SpectralFamily {
    /// Families assembled into a hyperspectral vendable, in artifact order.
    pub const PROCESSING_ORDER: [SpectralFamily; 2] = [SpectralFamily::Swir, SpectralFamily::Vnir];
}

impl std::fmt::Display for SpectralFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpectralFamily::Swir => write!(f, "SWIR"),
            SpectralFamily::Vnir => write!(f, "VNIR"),
            SpectralFamily::Panchromatic => write!(f, "PANCHROMATIC"),
        }
    }
}

/// Units a band wavelength can be expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WavelengthUnit {
    #[serde(rename = "nm")]
    Nanometers,
    #[serde(rename = "um")]
    Micrometers,
}

/// Surface temperature units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemperatureUnit {
    Kelvin,
    Celsius,
    Fahrenheit,
}

impl std::str::FromStr for TemperatureUnit {
    type Err = AllotropeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "KELVIN" | "K" => Ok(TemperatureUnit::Kelvin),
            "CELSIUS" | "C" => Ok(TemperatureUnit::Celsius),
            "FAHRENHEIT" | "F" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(AllotropeError::Config(format!("Invalid temperature unit: {}", s))),
        }
    }
}

/// Products handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    Prisma,
    EnMap,
    Landsat,
}

/// Dataset categories usable in anomaly detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetCategory {
    Hyperspectral,
    Thermal,
}

/// One spectral slice of a hyperspectral cube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperspectralBand {
    pub wavelength: f64,
    pub wavelength_unit: WavelengthUnit,
    /// Position within its spectral family (0-based)
    pub band_index: usize,
    pub full_width_at_half_maximum: Option<f64>,
    /// Provider QC flag for the band
    pub is_valid: bool,
}

/// Index- and wavelength-keyed lookups over the bands of one spectral family.
///
/// Both views are built together from the same band set and are never mutated
/// afterwards, so they always agree in cardinality and content. Several bands
/// may share a wavelength (unused channels carry a placeholder of 0.0), so the
/// wavelength view maps each key to every band at that wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct BandInformation {
    bands: Vec<HyperspectralBand>,
    by_index: BTreeMap<usize, usize>,
    by_wavelength: BTreeMap<u64, Vec<usize>>,
}

impl BandInformation {
    /// Build lookups from parallel provider arrays (wavelength, flag, FWHM).
    pub fn from_provider_lists(
        family: SpectralFamily,
        wavelengths: &[f64],
        flags: &[i64],
        fwhms: &[f64],
        unit: WavelengthUnit,
    ) -> AllotropeResult<Self> {
        if wavelengths.len() != flags.len() || wavelengths.len() != fwhms.len() {
            return Err(AllotropeError::Metadata(format!(
                "{} band metadata lists disagree: {} wavelengths, {} flags, {} FWHM values",
                family,
                wavelengths.len(),
                flags.len(),
                fwhms.len()
            )));
        }

        let bands = wavelengths
            .iter()
            .zip(flags)
            .zip(fwhms)
            .enumerate()
            .map(|(band_index, ((&wavelength, &flag), &fwhm))| HyperspectralBand {
                wavelength,
                wavelength_unit: unit,
                band_index,
                full_width_at_half_maximum: Some(fwhm),
                is_valid: flag != 0,
            })
            .collect();

        Self::from_bands(bands)
    }

    pub fn from_bands(bands: Vec<HyperspectralBand>) -> AllotropeResult<Self> {
        let mut by_index = BTreeMap::new();
        let mut by_wavelength: BTreeMap<u64, Vec<usize>> = BTreeMap::new();

        for (position, band) in bands.iter().enumerate() {
            if by_index.insert(band.band_index, position).is_some() {
                return Err(AllotropeError::Metadata(format!(
                    "Duplicate band index {}",
                    band.band_index
                )));
            }
            by_wavelength
                .entry(band.wavelength.to_bits())
                .or_default()
                .push(position);
        }

        Ok(Self {
            bands,
            by_index,
            by_wavelength,
        })
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn by_index(&self, index: usize) -> Option<&HyperspectralBand> {
        self.by_index.get(&index).map(|&position| &self.bands[position])
    }

    /// First band (lowest position) recorded at `wavelength`
    pub fn by_wavelength(&self, wavelength: f64) -> Option<&HyperspectralBand> {
        self.all_by_wavelength(wavelength).next()
    }

    /// Every band recorded at `wavelength`, in provider order
    pub fn all_by_wavelength(
        &self,
        wavelength: f64,
    ) -> impl Iterator<Item = &HyperspectralBand> + '_ {
        self.by_wavelength
            .get(&wavelength.to_bits())
            .into_iter()
            .flatten()
            .map(move |&position| &self.bands[position])
    }

    /// Number of distinct wavelength keys
    pub fn distinct_wavelengths(&self) -> usize {
        self.by_wavelength.len()
    }

    /// Bands ordered by band index
    pub fn iter(&self) -> impl Iterator<Item = &HyperspectralBand> {
        self.by_index.values().map(move |&position| &self.bands[position])
    }

    /// Bands ordered by wavelength
    pub fn iter_by_wavelength(&self) -> impl Iterator<Item = &HyperspectralBand> {
        let mut ordered: Vec<&HyperspectralBand> = self.bands.iter().collect();
        ordered.sort_by(|a, b| a.wavelength.total_cmp(&b.wavelength));
        ordered.into_iter()
    }
}

/// Band information for every spectral family of a product
pub type BandInformationMap = BTreeMap<SpectralFamily, BandInformation>;

/// Geospatial bounding box in WGS84
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// STAC ordering: `[min_lon, min_lat, max_lon, max_lat]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Error types for cube assembly
#[derive(Debug, thiserror::Error)]
pub enum AllotropeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Error in transform {transformation}: {message}")]
    Transform {
        transformation: Transformation,
        message: String,
    },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("State error: {0}")]
    State(String),

    #[error("File name error: {0}")]
    FileName(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Array(#[from] ndarray::ShapeError),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for cube assembly
pub type AllotropeResult<T> = Result<T, AllotropeError>;
