//! GeoTIFF access for single-band thermal products

use ndarray::{stack, Array2, ArrayView2, Axis};

use crate::config::{FileCategory, FileSourceConfig};
use crate::core::cube::{Cube, CubeRepresentation};
use crate::io::templates::{Template, TemplateIdentifier, ThermalComponent};
use crate::io::{
    AttributeValue, Attributes, ExtractionMode, FileHelper, ThermalFileHelper, TifMetadata,
};
use crate::types::{AllotropeError, AllotropeResult, BoundingBox, SpectralFamily};

/// Band-addressable raster (bands are 1-based)
pub trait RasterSource {
    fn band_count(&self) -> usize;

    /// `(height, width)` in pixels
    fn size(&self) -> (usize, usize);

    fn read_band(&self, band: usize) -> AllotropeResult<Array2<u16>>;

    fn no_data_value(&self, band: usize) -> Option<f64>;

    /// Profile, tag and bounds properties
    fn properties(&self) -> AllotropeResult<Attributes>;

    /// Raster extent reprojected to WGS84
    fn wgs84_bounds(&self) -> AllotropeResult<BoundingBox>;
}

/// In-memory raster, used for staged data and tests
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    bands: Vec<Array2<u16>>,
    no_data: Option<f64>,
    properties: Attributes,
    bounds: Option<BoundingBox>,
}

impl MemoryRaster {
    pub fn new(bands: Vec<Array2<u16>>) -> AllotropeResult<Self> {
        let first = bands
            .first()
            .ok_or_else(|| AllotropeError::InvalidData("Raster needs at least one band".to_string()))?;
        if let Some(band) = bands.iter().find(|b| b.dim() != first.dim()) {
            return Err(AllotropeError::Shape(format!(
                "Band shape {:?} differs from {:?}",
                band.dim(),
                first.dim()
            )));
        }
        Ok(Self {
            bands,
            no_data: None,
            properties: Attributes::new(),
            bounds: None,
        })
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }

    pub fn with_property(mut self, name: &str, value: AttributeValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn with_wgs84_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl RasterSource for MemoryRaster {
    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn size(&self) -> (usize, usize) {
        self.bands[0].dim()
    }

    fn read_band(&self, band: usize) -> AllotropeResult<Array2<u16>> {
        band.checked_sub(1)
            .and_then(|index| self.bands.get(index))
            .cloned()
            .ok_or_else(|| AllotropeError::Lookup(format!("Band {} not present in raster", band)))
    }

    fn no_data_value(&self, _band: usize) -> Option<f64> {
        self.no_data
    }

    fn properties(&self) -> AllotropeResult<Attributes> {
        let (height, width) = self.size();
        let mut properties = self.properties.clone();
        properties.insert("width".to_string(), AttributeValue::Int(width as i64));
        properties.insert("height".to_string(), AttributeValue::Int(height as i64));
        properties.insert("count".to_string(), AttributeValue::Int(self.bands.len() as i64));
        if let Some(no_data) = self.no_data {
            properties.insert("nodata".to_string(), AttributeValue::Float(no_data));
        }
        Ok(properties)
    }

    fn wgs84_bounds(&self) -> AllotropeResult<BoundingBox> {
        self.bounds
            .ok_or_else(|| AllotropeError::Metadata("Raster has no georeferencing".to_string()))
    }
}

/// File helper for Landsat L2SP thermal GeoTIFFs.
///
/// Bands are stacked into BSQ `[B, H, W]`. A QA_PIXEL raster may be attached
/// to expose the provider's quality bits.
pub struct TifHelper<S: RasterSource> {
    source: FileSourceConfig,
    raster: S,
    quality: Option<S>,
    metadata: TifMetadata,
    template: &'static Template<ThermalComponent>,
}

impl<S: RasterSource> TifHelper<S> {
    pub fn new(source: FileSourceConfig, raster: S) -> AllotropeResult<Self> {
        if source.file_category != FileCategory::Tif {
            return Err(AllotropeError::Config(format!(
                "TifHelper requires a tif source, got {:?} for {}",
                source.file_category,
                source.source_path.display()
            )));
        }

        log::debug!(
            "Constructing metadata structure for TIF file: {}",
            source.source_path.display()
        );
        let metadata = TifMetadata {
            properties: raster.properties()?,
        };

        Ok(Self {
            source,
            raster,
            quality: None,
            metadata,
            template: TemplateIdentifier::landsat_thermal()?,
        })
    }

    /// Attach the QA_PIXEL raster of the same scene
    pub fn with_quality_source(mut self, quality: S) -> AllotropeResult<Self> {
        if quality.size() != self.raster.size() {
            return Err(AllotropeError::Shape(format!(
                "Quality raster size {:?} differs from thermal raster size {:?}",
                quality.size(),
                self.raster.size()
            )));
        }
        self.quality = Some(quality);
        Ok(self)
    }

    pub fn source(&self) -> &FileSourceConfig {
        &self.source
    }

    /// Resolve a thermal property through the template
    pub fn property(&self, component: ThermalComponent) -> AllotropeResult<&AttributeValue> {
        let name = self.template.get(component)?.property_name()?;
        self.metadata.property(name)
    }

    pub fn bounding_box(&self) -> AllotropeResult<BoundingBox> {
        self.raster.wgs84_bounds()
    }
}

impl<S: RasterSource> FileHelper for TifHelper<S> {
    type Metadata = TifMetadata;
    type Component = ThermalComponent;
    type Sample = u16;

    fn file_category(&self) -> FileCategory {
        self.source.file_category
    }

    fn file_metadata(&self) -> &TifMetadata {
        &self.metadata
    }

    fn template(&self) -> &Template<ThermalComponent> {
        self.template
    }

    /// Spectral family is not meaningful for thermal rasters and is ignored.
    fn extract_specific_bands(
        &self,
        bands: &[usize],
        masking_needed: bool,
        _spectral_family: Option<SpectralFamily>,
        mode: ExtractionMode,
    ) -> AllotropeResult<Cube<u16>> {
        let requested: Vec<usize> = match mode {
            ExtractionMode::All => (1..=self.raster.band_count()).collect(),
            ExtractionMode::Specific => bands.to_vec(),
        };
        if requested.is_empty() {
            return Err(AllotropeError::Lookup("No bands requested".to_string()));
        }
        log::debug!(
            "Extracting bands {:?} from {}",
            requested,
            self.source.source_path.display()
        );

        let band_data = requested
            .iter()
            .map(|&band| self.raster.read_band(band))
            .collect::<AllotropeResult<Vec<_>>>()?;
        let views: Vec<ArrayView2<u16>> = band_data.iter().map(|b| b.view()).collect();
        let data = stack(Axis(0), &views)?;

        if !masking_needed {
            return Ok(Cube::dense(data, CubeRepresentation::Bsq));
        }

        let mut mask = ndarray::Array3::<bool>::from_elem(data.raw_dim(), false);
        for (position, &band) in requested.iter().enumerate() {
            if let Some(no_data) = self.raster.no_data_value(band) {
                let band_values = data.index_axis(Axis(0), position);
                mask.index_axis_mut(Axis(0), position)
                    .zip_mut_with(&band_values, |masked, &dn| *masked = f64::from(dn) == no_data);
            }
        }
        Cube::masked(data, mask, CubeRepresentation::Bsq)
    }
}

impl<S: RasterSource> ThermalFileHelper for TifHelper<S> {
    fn extract_quality_band(&self) -> AllotropeResult<Option<Array2<u16>>> {
        self.quality.as_ref().map(|quality| quality.read_band(1)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn helper() -> TifHelper<MemoryRaster> {
        let raster = MemoryRaster::new(vec![
            array![[0u16, 44177], [44177, 40000]],
            array![[1u16, 2], [3, 0]],
        ])
        .unwrap()
        .with_no_data(0.0)
        .with_property("crs", AttributeValue::Text("EPSG:32645".into()));
        let source = FileSourceConfig::new("LC09_L2SP_141045_20250604_20250605_02_T1_ST_B10.TIF").unwrap();
        TifHelper::new(source, raster).unwrap()
    }

    #[test]
    fn test_extraction_masks_nodata() {
        let helper = helper();
        let cube = helper
            .extract_specific_bands(&[2, 1], true, None, ExtractionMode::Specific)
            .unwrap();
        assert_eq!(cube.representation(), CubeRepresentation::Bsq);
        assert_eq!(cube.shape(), &[2, 2, 2]);
        assert_eq!(cube.data()[[1, 0, 1]], 44177);
        let mask = cube.mask().unwrap();
        assert!(mask[[0, 1, 1]]);
        assert!(mask[[1, 0, 0]]);
        assert!(!mask[[1, 1, 1]]);
    }

    #[test]
    fn test_band_numbers_are_one_based() {
        let helper = helper();
        assert!(matches!(
            helper.extract_specific_bands(&[0], false, None, ExtractionMode::Specific),
            Err(AllotropeError::Lookup(_))
        ));
        let all = helper
            .extract_specific_bands(&[], false, None, ExtractionMode::All)
            .unwrap();
        assert_eq!(all.shape()[0], 2);
        assert!(!all.is_masked());
    }

    #[test]
    fn test_template_properties_resolve() {
        let helper = helper();
        assert_eq!(
            helper.property(ThermalComponent::Width).unwrap(),
            &AttributeValue::Int(2)
        );
        assert_eq!(
            helper.property(ThermalComponent::CoordinateReferenceSystem).unwrap().as_text(),
            Some("EPSG:32645")
        );
        assert!(matches!(
            helper.property(ThermalComponent::Transform),
            Err(AllotropeError::Lookup(_))
        ));
        assert!(helper.extract_quality_band().unwrap().is_none());
    }
}
