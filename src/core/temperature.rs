//! Landsat-9 L2SP digital number to surface temperature

use ndarray::{Array3, Zip};
use num_traits::AsPrimitive;

use crate::config::ComputeDevice;
use crate::core::cube::Cube;
use crate::core::transform::{DataTransformer, DigitalNumber, Transformation};
use crate::types::{AllotropeError, AllotropeResult, TemperatureUnit};

/// Multiplicative factor of the L2SP surface temperature product
pub const ST_SCALING_FACTOR: f32 = 0.00341802;
/// Additive offset of the L2SP surface temperature product (Kelvin)
pub const ST_ADDITIVE_FACTOR: f32 = 149.0;
const KELVIN_OFFSET: f32 = 273.15;

/// Converts L2SP surface temperature DNs to a temperature scale
#[derive(Debug, Clone)]
pub struct Lc09StTransformer {
    transformation: Transformation,
    device: ComputeDevice,
}

impl Lc09StTransformer {
    pub fn new(device: ComputeDevice) -> Self {
        Self::with_transformation(Transformation::Lc09DnToSt, device)
    }

    pub fn with_transformation(transformation: Transformation, device: ComputeDevice) -> Self {
        Self {
            transformation,
            device,
        }
    }

    fn evaluate<T, F>(&self, input: &Array3<T>, kernel: F) -> Array3<f32>
    where
        T: DigitalNumber,
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let mut output = Array3::<f32>::zeros(input.raw_dim());
        match self.device {
            ComputeDevice::Parallel => Zip::from(&mut output)
                .and(input)
                .par_for_each(|out, &dn| *out = kernel(dn.as_())),
            ComputeDevice::Cpu => Zip::from(&mut output)
                .and(input)
                .for_each(|out, &dn| *out = kernel(dn.as_())),
        }
        output
    }
}

impl Default for Lc09StTransformer {
    fn default() -> Self {
        Self::new(ComputeDevice::default())
    }
}

impl DataTransformer for Lc09StTransformer {
    type Options = TemperatureUnit;

    fn transformation(&self) -> Transformation {
        self.transformation
    }

    fn transform<T: DigitalNumber>(
        &self,
        input: &Cube<T>,
        unit: &TemperatureUnit,
    ) -> AllotropeResult<Cube<f32>> {
        if self.transformation != Transformation::Lc09DnToSt {
            return Err(AllotropeError::NotImplemented(format!(
                "{} is not supported by the surface temperature transformer",
                self.transformation
            )));
        }
        log::debug!(
            "Converting {:?} cube of DNs to {:?} ({:?})",
            input.shape(),
            unit,
            self.device
        );

        let kelvin = |dn: f32| dn * ST_SCALING_FACTOR + ST_ADDITIVE_FACTOR;
        let output = match unit {
            TemperatureUnit::Kelvin => self.evaluate(input.data(), kelvin),
            TemperatureUnit::Celsius => self.evaluate(input.data(), |dn| kelvin(dn) - KELVIN_OFFSET),
            TemperatureUnit::Fahrenheit => self.evaluate(input.data(), |dn| {
                (kelvin(dn) - KELVIN_OFFSET) * 1.8 + 32.0
            }),
        };

        Cube::dense(output, input.representation())
            .with_mask(input.mask().cloned())
            .map_err(|e| AllotropeError::Transform {
                transformation: self.transformation,
                message: e.to_string(),
            })
    }
}
