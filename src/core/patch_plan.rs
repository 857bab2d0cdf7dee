//! Tiling plans for cutting cubes into fixed-size patches

use serde::{Deserialize, Serialize};

use crate::core::cube::{Cube, LogicalAxis};
use crate::types::{AllotropeError, AllotropeResult};

/// Patch size and stride in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub width: usize,
    pub height: usize,
    /// Step between consecutive patch origins, along both axes
    pub stride: usize,
}

/// Top-left `(row, col)` corner of every patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchingPlan {
    pub originating_request: PatchRequest,
    pub patch_coordinates: Vec<(usize, usize)>,
}

impl PatchingPlan {
    pub fn len(&self) -> usize {
        self.patch_coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patch_coordinates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchPlanGenerator;

impl PatchPlanGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Plan patches over the spatial axes of `cube`.
    ///
    /// The last origin along each axis is pulled back so the patch ends exactly
    /// at the cube edge.
    pub fn generate_patching_plan<T>(
        &self,
        cube: &Cube<T>,
        request: PatchRequest,
    ) -> AllotropeResult<PatchingPlan> {
        let height = cube.dim_of(LogicalAxis::Height);
        let width = cube.dim_of(LogicalAxis::Width);

        if request.stride == 0 {
            return Err(AllotropeError::Config(
                "Stride must be greater than 0".to_string(),
            ));
        }
        if request.height == 0 || request.width == 0 {
            return Err(AllotropeError::Config(format!(
                "Patch size {}x{} must be non-zero",
                request.height, request.width
            )));
        }
        if height < request.height {
            return Err(AllotropeError::Config(format!(
                "The input cube has a height of {} while the requested patch is larger: {}",
                height, request.height
            )));
        }
        if width < request.width {
            return Err(AllotropeError::Config(format!(
                "The input cube has a width of {} while the requested patch is larger: {}",
                width, request.width
            )));
        }

        let rows = axis_origins(height, request.height, request.stride);
        let cols = axis_origins(width, request.width, request.stride);
        let patch_coordinates: Vec<(usize, usize)> = rows
            .iter()
            .flat_map(|&row| cols.iter().map(move |&col| (row, col)))
            .collect();

        log::debug!(
            "Patch plan over {}x{}: {} rows x {} cols = {} patches",
            height,
            width,
            rows.len(),
            cols.len(),
            patch_coordinates.len()
        );

        Ok(PatchingPlan {
            originating_request: request,
            patch_coordinates,
        })
    }
}

fn axis_origins(extent: usize, size: usize, stride: usize) -> Vec<usize> {
    let mut origins = Vec::new();
    let mut origin = 0;
    while origin < extent {
        if origin + size >= extent {
            origins.push(extent - size);
            break;
        }
        origins.push(origin);
        origin += stride;
    }
    origins
}
