//! Processing configuration passed explicitly into every component

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{AllotropeError, AllotropeResult, TemperatureUnit};

/// File container categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    /// Hierarchical HDF-EOS5 container (hyperspectral)
    #[serde(rename = "he5")]
    Hdfs,
    /// GeoTIFF raster (thermal)
    #[serde(rename = "tif")]
    Tif,
}

impl FileCategory {
    /// Infer the category from a file extension
    pub fn from_path(path: &Path) -> AllotropeResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some("he5") => Ok(FileCategory::Hdfs),
            Some("tif") | Some("tiff") => Ok(FileCategory::Tif),
            _ => Err(AllotropeError::Config(format!(
                "Unrecognized file extension: {}",
                path.display()
            ))),
        }
    }
}

/// Where a product file lives and what kind of container it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSourceConfig {
    pub source_path: PathBuf,
    pub file_category: FileCategory,
}

impl FileSourceConfig {
    /// Create a source, inferring the category from the extension
    pub fn new<P: AsRef<Path>>(source_path: P) -> AllotropeResult<Self> {
        let source_path = source_path.as_ref().to_path_buf();
        let file_category = FileCategory::from_path(&source_path)?;
        Ok(Self {
            source_path,
            file_category,
        })
    }

    /// Create a source with an explicit category
    pub fn with_category<P: AsRef<Path>>(source_path: P, file_category: FileCategory) -> Self {
        Self {
            source_path: source_path.as_ref().to_path_buf(),
            file_category,
        }
    }

    /// File name component of the source path
    pub fn file_name(&self) -> AllotropeResult<&str> {
        self.source_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AllotropeError::Config(format!(
                    "Source path has no file name: {}",
                    self.source_path.display()
                ))
            })
    }
}

/// Where numeric kernels run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// Sequential evaluation on the calling thread
    Cpu,
    /// Rayon thread pool
    Parallel,
}

impl ComputeDevice {
    /// Parallel when the `parallel` feature is on and rayon has more than one thread
    pub fn select() -> Self {
        let device = if cfg!(feature = "parallel") && rayon::current_num_threads() > 1 {
            ComputeDevice::Parallel
        } else {
            ComputeDevice::Cpu
        };
        log::debug!("Using compute device: {:?}", device);
        device
    }
}

impl Default for ComputeDevice {
    fn default() -> Self {
        Self::select()
    }
}

impl std::str::FromStr for ComputeDevice {
    type Err = AllotropeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ComputeDevice::Cpu),
            "parallel" => Ok(ComputeDevice::Parallel),
            "auto" => Ok(ComputeDevice::select()),
            _ => Err(AllotropeError::Config(format!("Invalid compute device: {}", s))),
        }
    }
}

/// Parameters shared by the dataset builders and their components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub device: ComputeDevice,
    /// Unit of the vended thermal cube
    pub temperature_unit: TemperatureUnit,
    /// Fraction of clipped valid pixels used to fit the cloud masker
    pub cloud_sampling_ratio: f64,
    /// Seed for the training subsample; `None` draws from entropy
    pub sampling_seed: Option<u64>,
    /// Value substituted for masked DNs before reflectance evaluation
    pub masking_indicator: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            device: ComputeDevice::select(),
            temperature_unit: TemperatureUnit::Celsius,
            cloud_sampling_ratio: 0.1,
            sampling_seed: None,
            masking_indicator: 0.0,
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> AllotropeResult<()> {
        if !(self.cloud_sampling_ratio > 0.0 && self.cloud_sampling_ratio <= 1.0) {
            return Err(AllotropeError::Config(format!(
                "Cloud sampling ratio must be in (0, 1], got {}",
                self.cloud_sampling_ratio
            )));
        }
        if !self.masking_indicator.is_finite() {
            return Err(AllotropeError::Config(
                "Masking indicator must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> AllotropeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ProcessingConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded processing configuration from {}", path.as_ref().display());
        Ok(config)
    }
}
