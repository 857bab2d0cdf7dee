//! Shared contract for DN-to-physical-unit transformers

use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::core::cube::Cube;
use crate::types::AllotropeResult;

/// Supported physical-unit transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transformation {
    /// Landsat-9 L2SP digital number to surface temperature
    #[serde(rename = "LC09_DN_TO_ST")]
    Lc09DnToSt,
    /// PRISMA L2D digital number to surface reflectance
    #[serde(rename = "PRS_L2D_DN_TO_SR")]
    PrsL2dDnToSr,
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transformation::Lc09DnToSt => write!(f, "LC09_DN_TO_ST"),
            Transformation::PrsL2dDnToSr => write!(f, "PRS_L2D_DN_TO_SR"),
        }
    }
}

/// Raw sample types a transformer accepts; every one widens to `f32`
pub trait DigitalNumber: AsPrimitive<f32> + Copy + Send + Sync + 'static {}

impl<T> DigitalNumber for T where T: AsPrimitive<f32> + Copy + Send + Sync + 'static {}

/// A transformation from raw digital numbers to a physical quantity.
///
/// Masked input produces masked output carrying the identical mask; dense input
/// produces dense output. The output keeps the input representation.
pub trait DataTransformer {
    type Options;

    fn transformation(&self) -> Transformation;

    fn transform<T: DigitalNumber>(
        &self,
        input: &Cube<T>,
        options: &Self::Options,
    ) -> AllotropeResult<Cube<f32>>;
}
