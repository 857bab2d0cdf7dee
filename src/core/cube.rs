//! Cube representations and the transposition algebra between them

use ndarray::{Array3, ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use crate::config::ComputeDevice;
use crate::types::{AllotropeError, AllotropeResult};

/// Logical axes of a spectral cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalAxis {
    Height,
    Width,
    Channel,
}

/// Physical arrangements of a spectral cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CubeRepresentation {
    /// Band interleaved by line: [H, C, W]
    Bil,
    /// Band interleaved by pixel: [H, W, C]
    Bip,
    /// Band sequential: [C, H, W]
    Bsq,
}

impl CubeRepresentation {
    pub const ALL: [CubeRepresentation; 3] = [
        CubeRepresentation::Bil,
        CubeRepresentation::Bip,
        CubeRepresentation::Bsq,
    ];

    /// Logical axis stored at each physical dimension
    pub fn arrangement(&self) -> [LogicalAxis; 3] {
        use LogicalAxis::*;
        match self {
            CubeRepresentation::Bil => [Height, Channel, Width],
            CubeRepresentation::Bip => [Height, Width, Channel],
            CubeRepresentation::Bsq => [Channel, Height, Width],
        }
    }

    /// Physical dimension index holding `axis`
    pub fn axis_index(&self, axis: LogicalAxis) -> usize {
        match (self, axis) {
            (CubeRepresentation::Bil, LogicalAxis::Height) => 0,
            (CubeRepresentation::Bil, LogicalAxis::Channel) => 1,
            (CubeRepresentation::Bil, LogicalAxis::Width) => 2,
            (CubeRepresentation::Bip, LogicalAxis::Height) => 0,
            (CubeRepresentation::Bip, LogicalAxis::Width) => 1,
            (CubeRepresentation::Bip, LogicalAxis::Channel) => 2,
            (CubeRepresentation::Bsq, LogicalAxis::Channel) => 0,
            (CubeRepresentation::Bsq, LogicalAxis::Height) => 1,
            (CubeRepresentation::Bsq, LogicalAxis::Width) => 2,
        }
    }

    /// Axis order that rearranges a `self` cube into `target`.
    ///
    /// Entry `i` is the source dimension that becomes target dimension `i`,
    /// which is exactly what `permuted_axes` expects.
    pub fn permutation_to(&self, target: CubeRepresentation) -> [usize; 3] {
        let arrangement = target.arrangement();
        [
            self.axis_index(arrangement[0]),
            self.axis_index(arrangement[1]),
            self.axis_index(arrangement[2]),
        ]
    }
}

impl std::fmt::Display for CubeRepresentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CubeRepresentation::Bil => write!(f, "BIL"),
            CubeRepresentation::Bip => write!(f, "BIP"),
            CubeRepresentation::Bsq => write!(f, "BSQ"),
        }
    }
}

impl std::str::FromStr for CubeRepresentation {
    type Err = AllotropeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bil" => Ok(CubeRepresentation::Bil),
            "bip" => Ok(CubeRepresentation::Bip),
            "bsq" => Ok(CubeRepresentation::Bsq),
            _ => Err(AllotropeError::Config(format!(
                "Invalid cube representation: {}",
                s
            ))),
        }
    }
}

/// How a converted cube is handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputForm {
    /// Strided view over the original buffer, no copy
    Permuted,
    /// Standard-layout buffer
    Contiguous,
}

impl std::str::FromStr for OutputForm {
    type Err = AllotropeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permuted" | "tensor" => Ok(OutputForm::Permuted),
            "contiguous" | "numpy" => Ok(OutputForm::Contiguous),
            _ => Err(AllotropeError::Config(format!("Invalid output form: {}", s))),
        }
    }
}

/// A 3-D cube tagged with its physical arrangement and an optional invalid-pixel mask.
///
/// `mask` is `true` where a pixel is invalid and always has the shape of `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube<T> {
    data: Array3<T>,
    mask: Option<Array3<bool>>,
    representation: CubeRepresentation,
}

impl<T> Cube<T> {
    pub fn dense(data: Array3<T>, representation: CubeRepresentation) -> Self {
        Self {
            data,
            mask: None,
            representation,
        }
    }

    pub fn masked(
        data: Array3<T>,
        mask: Array3<bool>,
        representation: CubeRepresentation,
    ) -> AllotropeResult<Self> {
        if data.shape() != mask.shape() {
            return Err(AllotropeError::Shape(format!(
                "Mask shape {:?} does not match data shape {:?}",
                mask.shape(),
                data.shape()
            )));
        }
        Ok(Self {
            data,
            mask: Some(mask),
            representation,
        })
    }

    /// Attach `mask` to an existing data buffer, replacing any previous mask
    pub fn with_mask(self, mask: Option<Array3<bool>>) -> AllotropeResult<Self> {
        match mask {
            Some(mask) => Self::masked(self.data, mask, self.representation),
            None => Ok(Self::dense(self.data, self.representation)),
        }
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array3<bool>> {
        self.mask.as_ref()
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    pub fn representation(&self) -> CubeRepresentation {
        self.representation
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Extent of a logical axis
    pub fn dim_of(&self, axis: LogicalAxis) -> usize {
        self.data.shape()[self.representation.axis_index(axis)]
    }

    /// Borrow the data rearranged as `target` without copying
    pub fn data_as(&self, target: CubeRepresentation) -> ArrayView3<'_, T> {
        self.data
            .view()
            .permuted_axes(self.representation.permutation_to(target))
    }

    /// Borrow the mask rearranged as `target` without copying
    pub fn mask_as(&self, target: CubeRepresentation) -> Option<ArrayView3<'_, bool>> {
        let permutation = self.representation.permutation_to(target);
        self.mask
            .as_ref()
            .map(|mask| mask.view().permuted_axes(permutation))
    }

    pub fn into_parts(self) -> (Array3<T>, Option<Array3<bool>>, CubeRepresentation) {
        (self.data, self.mask, self.representation)
    }
}

/// Transposition between cube representations
#[derive(Debug, Clone, Copy)]
pub struct CubeOperations {
    device: ComputeDevice,
}

impl Default for CubeOperations {
    fn default() -> Self {
        Self::new(ComputeDevice::default())
    }
}

impl CubeOperations {
    pub fn new(device: ComputeDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Rearrange `cube` into `to_format`; the mask receives the identical permutation.
    pub fn convert_cube<T>(
        &self,
        cube: Cube<T>,
        to_format: CubeRepresentation,
        output_form: OutputForm,
    ) -> Cube<T>
    where
        T: Clone + Default + Send + Sync,
    {
        let from_format = cube.representation;
        let permutation = from_format.permutation_to(to_format);
        log::debug!(
            "Converting cube {:?} from {} to {} (axes {:?}, {:?})",
            cube.shape(),
            from_format,
            to_format,
            permutation,
            output_form
        );

        let (data, mask, _) = cube.into_parts();
        let data = data.permuted_axes(permutation);
        let mask = mask.map(|mask| mask.permuted_axes(permutation));

        let (data, mask) = match output_form {
            OutputForm::Permuted => (data, mask),
            OutputForm::Contiguous => (
                self.materialize(data),
                mask.map(|mask| self.materialize(mask)),
            ),
        };

        Cube {
            data,
            mask,
            representation: to_format,
        }
    }

    /// Copy a strided array into standard layout on the configured device
    fn materialize<T>(&self, array: Array3<T>) -> Array3<T>
    where
        T: Clone + Default + Send + Sync,
    {
        if array.is_standard_layout() {
            return array;
        }

        let mut contiguous = Array3::<T>::default(array.raw_dim());
        match self.device {
            ComputeDevice::Parallel => {
                Zip::from(&mut contiguous)
                    .and(&array)
                    .par_for_each(|out, value| *out = value.clone());
            }
            ComputeDevice::Cpu => {
                Zip::from(&mut contiguous)
                    .and(&array)
                    .for_each(|out, value| *out = value.clone());
            }
        }
        contiguous
    }
}
