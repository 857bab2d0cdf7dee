//! Dataset builders and the artifacts they vend

use ndarray::Array3;

use crate::core::cube::CubeRepresentation;
use crate::io::FileHelper;
use crate::types::{AllotropeResult, BandInformationMap, SpectralFamily, ValidityCube};

/// Turns one product file into an analysis-ready dataset.
///
/// Implementations own their file helper and resolve band metadata at
/// construction; `vend_dataset` either returns a complete artifact or fails.
pub trait DatasetBuilder {
    type Helper: FileHelper;
    type Vendable;

    fn file_helper(&self) -> &Self::Helper;

    /// Native layout of the provider's cubes
    fn default_cube_representation(&self) -> CubeRepresentation;

    /// Per-family band metadata, when the product carries any
    fn band_information(&self) -> Option<&BandInformationMap>;

    fn vend_dataset(&self) -> AllotropeResult<Self::Vendable>;
}

/// Normalized hyperspectral cube with its fused validity
#[derive(Debug, Clone, PartialEq)]
pub struct VendableHyperspectralDataset {
    /// BSQ surface reflectance `[C, H, W]`
    pub normalized_hyperspectral_cube: Array3<f32>,
    /// 1 where the pixel is usable; shaped like the cube
    pub validity_cube: ValidityCube,
    /// Spectral family of each channel
    pub spectral_family_order: Vec<SpectralFamily>,
    /// Central wavelength of each channel
    pub band_cw_order: Vec<f64>,
}

impl VendableHyperspectralDataset {
    pub fn channel_count(&self) -> usize {
        self.normalized_hyperspectral_cube.shape()[0]
    }
}

/// Normalized thermal cube with cloud and fill masks
#[derive(Debug, Clone, PartialEq)]
pub struct VendableThermalDataset {
    /// BSQ surface temperature `[1, H, W]`
    pub normalized_thermal_cube: Array3<f32>,
    /// Cloud validity multiplied by fill validity
    pub validity_cube: ValidityCube,
    /// 1 where the provider supplied a value
    pub zero_fill_validity_mask: ValidityCube,
    /// 0 = cloud, 1 = clear
    pub cloud_mask: ValidityCube,
    /// Provider QA_PIXEL cloud bit (1 = present)
    pub provider_cloud_mask: Option<ValidityCube>,
    /// Provider QA_PIXEL water bit (1 = present)
    pub water_mask: Option<ValidityCube>,
    /// Provider QA_PIXEL snow bit (1 = present)
    pub snow_mask: Option<ValidityCube>,
}
