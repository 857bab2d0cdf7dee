//! PRISMA L2D digital number to surface reflectance

use ndarray::{Array3, Zip};
use num_traits::AsPrimitive;
use std::collections::BTreeMap;

use crate::config::ComputeDevice;
use crate::core::cube::{Cube, CubeRepresentation, LogicalAxis};
use crate::core::transform::{DataTransformer, DigitalNumber, Transformation};
use crate::io::templates::{HyperspectralFileComponent, Template};
use crate::io::He5Metadata;
use crate::types::{AllotropeError, AllotropeResult, SpectralFamily};

/// Full range of the 16-bit L2D reflectance encoding
pub const PRISMA_DIV_FACTOR: f64 = 65535.0;

/// Linear coefficients `dn * scale + offset` for one spectral family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub scale: f32,
    pub offset: f32,
}

impl ScaleFactor {
    /// Coefficients from the provider's L2 scale range
    pub fn from_range(min: f64, max: f64) -> Self {
        Self {
            scale: ((max - min) / PRISMA_DIV_FACTOR) as f32,
            offset: min as f32,
        }
    }
}

/// Scale factors keyed by spectral family
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyScaleFactors {
    factors: BTreeMap<SpectralFamily, ScaleFactor>,
}

impl FamilyScaleFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factor(mut self, family: SpectralFamily, factor: ScaleFactor) -> Self {
        self.factors.insert(family, factor);
        self
    }

    pub fn get(&self, family: SpectralFamily) -> AllotropeResult<ScaleFactor> {
        self.factors.get(&family).copied().ok_or_else(|| {
            AllotropeError::Lookup(format!("No scale factors for spectral family {}", family))
        })
    }

    /// Resolve the L2 scale range of every processed family from root metadata
    pub fn from_file_metadata(
        metadata: &He5Metadata,
        template: &Template<HyperspectralFileComponent>,
    ) -> AllotropeResult<Self> {
        let mut factors = Self::new();
        for family in SpectralFamily::PROCESSING_ORDER {
            let max = root_scalar(metadata, template, HyperspectralFileComponent::l2_scale_max(family)?)?;
            let min = root_scalar(metadata, template, HyperspectralFileComponent::l2_scale_min(family)?)?;
            let factor = ScaleFactor::from_range(min, max);
            log::debug!("{} scale factors: {:?}", family, factor);
            factors = factors.with_factor(family, factor);
        }
        Ok(factors)
    }
}

fn root_scalar(
    metadata: &He5Metadata,
    template: &Template<HyperspectralFileComponent>,
    component: HyperspectralFileComponent,
) -> AllotropeResult<f64> {
    let field = template.get(component)?.root_metadata_field_name()?;
    metadata.root_attribute(field)?.as_f64().ok_or_else(|| {
        AllotropeError::Metadata(format!("Root attribute {} is not numeric", field))
    })
}

/// Options for a reflectance evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectanceOptions {
    /// Spectral family of each channel, in channel order
    pub band_mapping: Vec<SpectralFamily>,
    pub scale_factors: FamilyScaleFactors,
    /// DN evaluated in place of masked samples
    pub masking_indicator: f32,
}

impl ReflectanceOptions {
    pub fn new(band_mapping: Vec<SpectralFamily>, scale_factors: FamilyScaleFactors) -> Self {
        Self {
            band_mapping,
            scale_factors,
            masking_indicator: 0.0,
        }
    }

    pub fn from_file_metadata(
        band_mapping: Vec<SpectralFamily>,
        metadata: &He5Metadata,
        template: &Template<HyperspectralFileComponent>,
    ) -> AllotropeResult<Self> {
        Ok(Self::new(
            band_mapping,
            FamilyScaleFactors::from_file_metadata(metadata, template)?,
        ))
    }

    pub fn with_masking_indicator(mut self, masking_indicator: f32) -> Self {
        self.masking_indicator = masking_indicator;
        self
    }
}

/// Converts L2D DNs to surface reflectance with per-family coefficients
#[derive(Debug, Clone)]
pub struct PrsL2dReflectanceTransformer {
    transformation: Transformation,
    device: ComputeDevice,
}

impl PrsL2dReflectanceTransformer {
    pub fn new(device: ComputeDevice) -> Self {
        Self::with_transformation(Transformation::PrsL2dDnToSr, device)
    }

    pub fn with_transformation(transformation: Transformation, device: ComputeDevice) -> Self {
        Self {
            transformation,
            device,
        }
    }

    /// Per-channel coefficients shaped `(C, 1, 1)` for broadcasting over a BSQ view
    fn coefficients(
        &self,
        options: &ReflectanceOptions,
    ) -> AllotropeResult<(Array3<f32>, Array3<f32>)> {
        let channels = options.band_mapping.len();
        let mut scales = Array3::<f32>::zeros((channels, 1, 1));
        let mut offsets = Array3::<f32>::zeros((channels, 1, 1));
        for (channel, &family) in options.band_mapping.iter().enumerate() {
            let factor = options.scale_factors.get(family)?;
            scales[[channel, 0, 0]] = factor.scale;
            offsets[[channel, 0, 0]] = factor.offset;
        }
        Ok((scales, offsets))
    }
}

impl Default for PrsL2dReflectanceTransformer {
    fn default() -> Self {
        Self::new(ComputeDevice::default())
    }
}

impl DataTransformer for PrsL2dReflectanceTransformer {
    type Options = ReflectanceOptions;

    fn transformation(&self) -> Transformation {
        self.transformation
    }

    fn transform<T: DigitalNumber>(
        &self,
        input: &Cube<T>,
        options: &ReflectanceOptions,
    ) -> AllotropeResult<Cube<f32>> {
        if self.transformation != Transformation::PrsL2dDnToSr {
            return Err(AllotropeError::NotImplemented(
                "Cannot support this transformation type at present".to_string(),
            ));
        }

        let channels = input.dim_of(LogicalAxis::Channel);
        if options.band_mapping.len() != channels {
            return Err(AllotropeError::Shape(format!(
                "Band mapping has {} entries for a cube with {} channels",
                options.band_mapping.len(),
                channels
            )));
        }
        let (scales, offsets) = self.coefficients(options)?;

        let representation = input.representation();
        let to_bsq = representation.permutation_to(CubeRepresentation::Bsq);
        let mut output = Array3::<f32>::zeros(input.data().raw_dim());
        log::info!("Output array shape: {:?} ({})", output.shape(), representation);

        {
            // Single output buffer in the input layout, written through a BSQ view
            let output_bsq = output.view_mut().permuted_axes(to_bsq);
            let dn_bsq = input.data_as(CubeRepresentation::Bsq);
            let fill = options.masking_indicator;

            match (input.mask_as(CubeRepresentation::Bsq), self.device) {
                (Some(mask_bsq), ComputeDevice::Parallel) => Zip::from(output_bsq)
                    .and(dn_bsq)
                    .and(mask_bsq)
                    .and_broadcast(&scales)
                    .and_broadcast(&offsets)
                    .par_for_each(|out, &dn, &masked, &scale, &offset| {
                        let dn = if masked { fill } else { dn.as_() };
                        *out = dn * scale + offset;
                    }),
                (Some(mask_bsq), ComputeDevice::Cpu) => Zip::from(output_bsq)
                    .and(dn_bsq)
                    .and(mask_bsq)
                    .and_broadcast(&scales)
                    .and_broadcast(&offsets)
                    .for_each(|out, &dn, &masked, &scale, &offset| {
                        let dn = if masked { fill } else { dn.as_() };
                        *out = dn * scale + offset;
                    }),
                (None, ComputeDevice::Parallel) => Zip::from(output_bsq)
                    .and(dn_bsq)
                    .and_broadcast(&scales)
                    .and_broadcast(&offsets)
                    .par_for_each(|out, &dn, &scale, &offset| *out = dn.as_() * scale + offset),
                (None, ComputeDevice::Cpu) => Zip::from(output_bsq)
                    .and(dn_bsq)
                    .and_broadcast(&scales)
                    .and_broadcast(&offsets)
                    .for_each(|out, &dn, &scale, &offset| *out = dn.as_() * scale + offset),
            }
        }

        Cube::dense(output, representation)
            .with_mask(input.mask().cloned())
            .map_err(|e| AllotropeError::Transform {
                transformation: self.transformation,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array;

    fn factors() -> FamilyScaleFactors {
        FamilyScaleFactors::new()
            .with_factor(SpectralFamily::Swir, ScaleFactor::from_range(0.5, 0.9))
            .with_factor(SpectralFamily::Vnir, ScaleFactor::from_range(0.4, 0.8))
    }

    #[test]
    fn test_bil_cube_uses_per_channel_coefficients() {
        // BIL [H=2, C=3, W=2]; channels: SWIR, SWIR, VNIR
        let data = Array::from_elem((2, 3, 2), 5000u16);
        let cube = Cube::dense(data, CubeRepresentation::Bil);
        let options = ReflectanceOptions::new(
            vec![SpectralFamily::Swir, SpectralFamily::Swir, SpectralFamily::Vnir],
            factors(),
        );

        for device in [ComputeDevice::Cpu, ComputeDevice::Parallel] {
            let out = PrsL2dReflectanceTransformer::new(device)
                .transform(&cube, &options)
                .unwrap();
            assert_eq!(out.representation(), CubeRepresentation::Bil);
            assert_eq!(out.shape(), &[2, 3, 2]);
            assert_abs_diff_eq!(out.data()[[1, 0, 1]], 0.5 + 5000.0 * 0.4 / 65535.0, epsilon = 1e-6);
            assert_abs_diff_eq!(out.data()[[0, 2, 0]], 0.4 + 5000.0 * 0.4 / 65535.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_masked_pixels_use_fill_value() {
        let data = Array::from_elem((1, 2, 2), 5000u16);
        let mut mask = Array3::from_elem((1, 2, 2), false);
        mask[[0, 1, 1]] = true;
        let cube = Cube::masked(data, mask.clone(), CubeRepresentation::Bsq).unwrap();
        let options = ReflectanceOptions::new(vec![SpectralFamily::Vnir], factors());

        let out = PrsL2dReflectanceTransformer::new(ComputeDevice::Cpu)
            .transform(&cube, &options)
            .unwrap();
        assert_eq!(out.mask(), Some(&mask));
        assert_abs_diff_eq!(out.data()[[0, 1, 1]], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_mapping_errors() {
        let cube = Cube::dense(Array3::<u16>::zeros((2, 1, 1)), CubeRepresentation::Bsq);
        let transformer = PrsL2dReflectanceTransformer::new(ComputeDevice::Cpu);

        let short = ReflectanceOptions::new(vec![SpectralFamily::Swir], factors());
        assert!(matches!(transformer.transform(&cube, &short), Err(AllotropeError::Shape(_))));

        let pan = ReflectanceOptions::new(
            vec![SpectralFamily::Swir, SpectralFamily::Panchromatic],
            factors(),
        );
        assert!(matches!(transformer.transform(&cube, &pan), Err(AllotropeError::Lookup(_))));

        let wrong = PrsL2dReflectanceTransformer::with_transformation(
            Transformation::Lc09DnToSt,
            ComputeDevice::Cpu,
        );
        let options = ReflectanceOptions::new(vec![SpectralFamily::Swir; 2], factors());
        assert!(matches!(
            wrong.transform(&cube, &options),
            Err(AllotropeError::NotImplemented(_))
        ));
    }
}
