//! Raster source backed by GDAL

use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, Metadata};
use ndarray::Array2;
use std::path::Path;

use crate::config::FileSourceConfig;
use crate::io::tif::{RasterSource, TifHelper};
use crate::io::{AttributeValue, Attributes};
use crate::types::{AllotropeError, AllotropeResult, BoundingBox};

pub struct GdalRaster {
    dataset: Dataset,
}

impl GdalRaster {
    pub fn open<P: AsRef<Path>>(path: P) -> AllotropeResult<Self> {
        log::debug!("Opening raster {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        Ok(Self { dataset })
    }

    /// Native-CRS extent as `[left, bottom, right, top]`
    fn native_bounds(&self) -> AllotropeResult<[f64; 4]> {
        let gt = self.dataset.geo_transform()?;
        let (width, height) = self.dataset.raster_size();
        let right = gt[0] + width as f64 * gt[1];
        let bottom = gt[3] + height as f64 * gt[5];
        Ok([
            gt[0].min(right),
            gt[3].min(bottom),
            gt[0].max(right),
            gt[3].max(bottom),
        ])
    }
}

impl TifHelper<GdalRaster> {
    /// Open a thermal GeoTIFF, optionally with its QA_PIXEL companion
    pub fn open(source: FileSourceConfig, quality_path: Option<&Path>) -> AllotropeResult<Self> {
        let raster = GdalRaster::open(&source.source_path)?;
        let helper = TifHelper::new(source, raster)?;
        match quality_path {
            Some(path) => helper.with_quality_source(GdalRaster::open(path)?),
            None => Ok(helper),
        }
    }
}

impl RasterSource for GdalRaster {
    fn band_count(&self) -> usize {
        self.dataset.raster_count().max(0) as usize
    }

    fn size(&self) -> (usize, usize) {
        let (width, height) = self.dataset.raster_size();
        (height, width)
    }

    fn read_band(&self, band: usize) -> AllotropeResult<Array2<u16>> {
        if band == 0 || band > self.band_count() {
            return Err(AllotropeError::Lookup(format!("Band {} not present in raster", band)));
        }
        let (width, height) = self.dataset.raster_size();
        let rasterband = self.dataset.rasterband(band as isize)?;
        let buffer = rasterband.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
        Ok(Array2::from_shape_vec((height, width), buffer.data)?)
    }

    fn no_data_value(&self, band: usize) -> Option<f64> {
        self.dataset
            .rasterband(band as isize)
            .ok()
            .and_then(|rasterband| rasterband.no_data_value())
    }

    fn properties(&self) -> AllotropeResult<Attributes> {
        let (height, width) = self.size();
        let mut properties = Attributes::new();
        properties.insert("width".to_string(), AttributeValue::Int(width as i64));
        properties.insert("height".to_string(), AttributeValue::Int(height as i64));
        properties.insert("count".to_string(), AttributeValue::Int(self.band_count() as i64));
        properties.insert(
            "transform".to_string(),
            AttributeValue::FloatList(self.dataset.geo_transform()?.to_vec()),
        );
        properties.insert(
            "bounds".to_string(),
            AttributeValue::FloatList(self.native_bounds()?.to_vec()),
        );

        let spatial_ref = self.dataset.spatial_ref()?;
        let crs = match spatial_ref.auth_code() {
            Ok(code) => format!("EPSG:{}", code),
            Err(_) => spatial_ref.to_wkt()?,
        };
        properties.insert("crs".to_string(), AttributeValue::Text(crs));

        if let Some(no_data) = self.no_data_value(1) {
            properties.insert("nodata".to_string(), AttributeValue::Float(no_data));
        }
        if let Some(area_or_point) = self.dataset.metadata_item("AREA_OR_POINT", "") {
            properties.insert("AREA_OR_POINT".to_string(), AttributeValue::Text(area_or_point));
        }
        Ok(properties)
    }

    fn wgs84_bounds(&self) -> AllotropeResult<BoundingBox> {
        let source = self.dataset.spatial_ref()?;
        let target = SpatialRef::from_epsg(4326)?;
        let transform = CoordTransform::new(&source, &target)?;
        let bounds = transform.transform_bounds(&self.native_bounds()?, 21)?;

        // EPSG:4326 uses authority axis order (lat, lon)
        Ok(BoundingBox {
            min_lon: bounds[1],
            min_lat: bounds[0],
            max_lon: bounds[3],
            max_lat: bounds[2],
        })
    }
}
