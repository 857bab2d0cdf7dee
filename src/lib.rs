//! allotrope: analysis-ready datasets from hyperspectral and thermal satellite products
//!
//! PRISMA L2D swaths and Landsat-9 L2SP thermal rasters are read through file
//! helpers, converted to physical units, fused with validity and cloud masks,
//! and vended as band-sequential cubes.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AllotropeError, AllotropeResult, BandInformation, BandInformationMap, BoundingBox,
    HyperspectralBand, Product, SpectralFamily, TemperatureUnit, ValidityCube,
};
pub use config::{ComputeDevice, FileCategory, FileSourceConfig, ProcessingConfig};
pub use crate::core::{
    Cube, CubeOperations, CubeRepresentation, DatasetBuilder, LandsatDatasetBuilder,
    PrismaDatasetBuilder, VendableHyperspectralDataset, VendableThermalDataset,
};
pub use io::{He5Helper, TifHelper};

#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use crate::core::{
        Cube, CubeOperations, CubeRepresentation, DataTransformer, Lc09StTransformer, OutputForm,
        PatchPlanGenerator, PatchRequest,
    };
    use crate::io::{AcquisitionMetadata, FileNameParser};
    use crate::types::{AllotropeError, TemperatureUnit};

    fn runtime_error(context: &str, error: AllotropeError) -> PyErr {
        let report = anyhow::anyhow!(error.to_string()).context(context.to_string());
        PyRuntimeError::new_err(format!("{:#}", report))
    }

    fn parse_representation(value: &str) -> PyResult<CubeRepresentation> {
        value
            .parse()
            .map_err(|e: AllotropeError| PyValueError::new_err(format!("{}", e)))
    }

    /// Python wrapper for CubeRepresentation
    #[pyclass(name = "CubeRepresentation")]
    #[derive(Clone)]
    struct PyCubeRepresentation {
        inner: CubeRepresentation,
    }

    #[pymethods]
    impl PyCubeRepresentation {
        #[new]
        fn new(representation: String) -> PyResult<Self> {
            Ok(PyCubeRepresentation {
                inner: parse_representation(&representation)?,
            })
        }

        fn arrangement(&self) -> Vec<String> {
            self.inner
                .arrangement()
                .iter()
                .map(|axis| format!("{:?}", axis).to_lowercase())
                .collect()
        }

        fn permutation_to(&self, target: &PyCubeRepresentation) -> [usize; 3] {
            self.inner.permutation_to(target.inner)
        }

        fn __str__(&self) -> String {
            format!("{}", self.inner)
        }

        fn __repr__(&self) -> String {
            format!("CubeRepresentation('{}')", self.inner)
        }
    }

    /// Python wrapper for AcquisitionMetadata
    #[pyclass(name = "AcquisitionMetadata")]
    struct PyAcquisitionMetadata {
        inner: AcquisitionMetadata,
    }

    #[pymethods]
    impl PyAcquisitionMetadata {
        #[getter]
        fn product(&self) -> String {
            format!("{:?}", self.inner.product)
        }

        #[getter]
        fn platform(&self) -> String {
            self.inner.platform.clone()
        }

        #[getter]
        fn processing_level(&self) -> String {
            format!("{}", self.inner.processing_level)
        }

        #[getter]
        fn product_type(&self) -> String {
            self.inner.product_type.clone()
        }

        #[getter]
        fn datetime(&self) -> String {
            self.inner.datetime.to_rfc3339()
        }

        #[getter]
        fn band(&self) -> Option<String> {
            self.inner.band.clone()
        }

        fn __str__(&self) -> String {
            format!(
                "AcquisitionMetadata(platform='{}', level='{}', datetime='{}')",
                self.inner.platform,
                self.inner.processing_level,
                self.inner.datetime.to_rfc3339()
            )
        }
    }

    /// Reorder a cube between BIL, BIP and BSQ; the result is C-contiguous
    #[pyfunction]
    fn convert_cube<'py>(
        py: Python<'py>,
        data: PyReadonlyArray3<'py, f32>,
        from_representation: &str,
        to_representation: &str,
    ) -> PyResult<&'py PyArray3<f32>> {
        let from = parse_representation(from_representation)?;
        let to = parse_representation(to_representation)?;
        let cube = Cube::dense(data.as_array().to_owned(), from);
        let (converted, _, _) = CubeOperations::default()
            .convert_cube(cube, to, OutputForm::Contiguous)
            .into_parts();
        Ok(converted.into_pyarray(py))
    }

    /// Landsat-9 L2SP digital numbers to surface temperature
    #[pyfunction]
    #[pyo3(signature = (data, unit = "CELSIUS", representation = "BSQ"))]
    fn surface_temperature<'py>(
        py: Python<'py>,
        data: PyReadonlyArray3<'py, u16>,
        unit: &str,
        representation: &str,
    ) -> PyResult<&'py PyArray3<f32>> {
        let unit: TemperatureUnit = unit
            .parse()
            .map_err(|e: AllotropeError| PyValueError::new_err(format!("{}", e)))?;
        let cube = Cube::dense(data.as_array().to_owned(), parse_representation(representation)?);
        let temperature = Lc09StTransformer::default()
            .transform(&cube, &unit)
            .map_err(|e| runtime_error("Surface temperature conversion failed", e))?;
        let (output, _, _) = temperature.into_parts();
        Ok(output.into_pyarray(py))
    }

    /// Top-left `(row, col)` corners of patches tiling the cube
    #[pyfunction]
    fn patching_plan(
        data: PyReadonlyArray3<'_, f32>,
        representation: &str,
        width: usize,
        height: usize,
        stride: usize,
    ) -> PyResult<Vec<(usize, usize)>> {
        let cube = Cube::dense(data.as_array().to_owned(), parse_representation(representation)?);
        let plan = PatchPlanGenerator::new()
            .generate_patching_plan(&cube, PatchRequest { width, height, stride })
            .map_err(|e| PyValueError::new_err(format!("{}", e)))?;
        Ok(plan.patch_coordinates)
    }

    #[pyfunction]
    fn parse_file_name(file_name: &str) -> PyResult<PyAcquisitionMetadata> {
        let parser = FileNameParser::new().map_err(|e| runtime_error("Parser setup failed", e))?;
        let inner = parser
            .parse(file_name)
            .map_err(|e| PyValueError::new_err(format!("{}", e)))?;
        Ok(PyAcquisitionMetadata { inner })
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyCubeRepresentation>()?;
        m.add_class::<PyAcquisitionMetadata>()?;
        m.add_function(wrap_pyfunction!(convert_cube, m)?)?;
        m.add_function(wrap_pyfunction!(surface_temperature, m)?)?;
        m.add_function(wrap_pyfunction!(patching_plan, m)?)?;
        m.add_function(wrap_pyfunction!(parse_file_name, m)?)?;
        Ok(())
    }
}
