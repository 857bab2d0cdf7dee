//! Landsat-9 L2SP thermal dataset builder

use ndarray::{Array2, Axis, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use crate::config::ProcessingConfig;
use crate::core::cloud_masker::{AdaptiveCloudMaskerResponse, B10AdaptiveCloudMasker};
use crate::core::cube::{Cube, CubeRepresentation};
use crate::core::dataset_builder::{DatasetBuilder, VendableThermalDataset};
use crate::core::temperature::Lc09StTransformer;
use crate::core::transform::DataTransformer;
use crate::io::{
    ExtractionMode, FileHelper, RasterSource, StacItemBuilder, ThermalFileHelper, TifHelper,
};
use crate::types::{AllotropeResult, BandInformationMap, TemperatureUnit, ValidityCube};

/// Band number of the surface temperature raster
pub const THERMAL_BAND: usize = 1;

/// QA_PIXEL bit flagging cloud
pub const QA_CLOUD_BIT: u16 = 3;
/// QA_PIXEL bit flagging snow
pub const QA_SNOW_BIT: u16 = 5;
/// QA_PIXEL bit flagging water
pub const QA_WATER_BIT: u16 = 7;

/// Builds [`VendableThermalDataset`]s from Landsat-9 surface temperature rasters
pub struct LandsatDatasetBuilder<S: RasterSource> {
    helper: TifHelper<S>,
    config: ProcessingConfig,
    transformer: Lc09StTransformer,
}

impl<S: RasterSource> LandsatDatasetBuilder<S> {
    pub fn new(helper: TifHelper<S>, config: ProcessingConfig) -> AllotropeResult<Self> {
        config.validate()?;
        Ok(Self {
            transformer: Lc09StTransformer::new(config.device),
            helper,
            config,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// STAC item describing the source file
    pub fn stac_item(&self) -> AllotropeResult<Value> {
        StacItemBuilder::new()?.from_tif(&self.helper)
    }

    /// Train a fresh masker on `temperature` and label every pixel.
    ///
    /// The cube must be in Celsius and carry the provider fill mask.
    pub fn detect_clouds(&self, temperature: &Cube<f32>) -> AllotropeResult<AdaptiveCloudMaskerResponse> {
        let mut masker = B10AdaptiveCloudMasker::new(self.config.device);
        masker.configure(self.config.cloud_sampling_ratio)?;
        match self.config.sampling_seed {
            Some(seed) => masker.train_with_rng(temperature, &mut StdRng::seed_from_u64(seed))?,
            None => masker.train(temperature)?,
        }
        masker.predict(temperature)
    }
}

/// Presence mask (1 = set) of one QA_PIXEL bit, shaped `[1, H, W]`
pub fn decode_quality_bit(quality: &Array2<u16>, bit: u16) -> ValidityCube {
    quality
        .mapv(|qa| ((qa >> bit) & 1) as u8)
        .insert_axis(Axis(0))
}

impl<S: RasterSource> DatasetBuilder for LandsatDatasetBuilder<S> {
    type Helper = TifHelper<S>;
    type Vendable = VendableThermalDataset;

    fn file_helper(&self) -> &TifHelper<S> {
        &self.helper
    }

    fn default_cube_representation(&self) -> CubeRepresentation {
        CubeRepresentation::Bsq
    }

    /// Thermal rasters carry no spectral band metadata
    fn band_information(&self) -> Option<&BandInformationMap> {
        None
    }

    fn vend_dataset(&self) -> AllotropeResult<VendableThermalDataset> {
        log::info!(
            "Building thermal dataset from {}",
            self.helper.source().source_path.display()
        );

        let raw = self.helper.extract_specific_bands(
            &[THERMAL_BAND],
            true,
            None,
            ExtractionMode::Specific,
        )?;
        let zero_fill_validity_mask: ValidityCube = match raw.mask() {
            Some(mask) => mask.mapv(|masked| u8::from(!masked)),
            None => ValidityCube::ones(raw.data().raw_dim()),
        };
        log::info!(
            "Valid pixels {} of {}",
            zero_fill_validity_mask.iter().map(|&v| v as usize).sum::<usize>(),
            zero_fill_validity_mask.len()
        );

        // The masker works in Celsius on the temperature cube paired with the provider mask
        let celsius = self.transformer.transform(&raw, &TemperatureUnit::Celsius)?;
        log::debug!(
            "Temperature range {:.2} to {:.2} C",
            celsius.data().iter().cloned().fold(f32::INFINITY, f32::min),
            celsius.data().iter().cloned().fold(f32::NEG_INFINITY, f32::max)
        );
        let detection = self.detect_clouds(&celsius)?;

        let cloud_mask: ValidityCube = detection.cloud_mask.mapv(|cloud| u8::from(!cloud));
        let mut validity_cube = cloud_mask.clone();
        Zip::from(&mut validity_cube)
            .and(&zero_fill_validity_mask)
            .for_each(|valid, &filled| *valid *= filled);
        log::info!(
            "Unclouded pixels {}",
            cloud_mask.iter().map(|&v| v as usize).sum::<usize>()
        );

        let normalized = match self.config.temperature_unit {
            TemperatureUnit::Celsius => celsius,
            unit => self.transformer.transform(&raw, &unit)?,
        };
        let (normalized_thermal_cube, _, _) = normalized.into_parts();

        let quality = self.helper.extract_quality_band()?;
        let (provider_cloud_mask, snow_mask, water_mask) = match &quality {
            Some(qa) => (
                Some(decode_quality_bit(qa, QA_CLOUD_BIT)),
                Some(decode_quality_bit(qa, QA_SNOW_BIT)),
                Some(decode_quality_bit(qa, QA_WATER_BIT)),
            ),
            None => (None, None, None),
        };

        log::info!(
            "Thermal dataset ready: {:?} ({:?})",
            normalized_thermal_cube.shape(),
            self.config.temperature_unit
        );

        Ok(VendableThermalDataset {
            normalized_thermal_cube,
            validity_cube,
            zero_fill_validity_mask,
            cloud_mask,
            provider_cloud_mask,
            water_mask,
            snow_mask,
        })
    }
}
