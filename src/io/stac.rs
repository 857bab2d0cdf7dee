//! Bounding boxes and STAC items for product files

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

use crate::io::file_name::{AcquisitionMetadata, FileNameParser};
use crate::io::he5::{He5Helper, He5Store};
use crate::io::tif::{RasterSource, TifHelper};
use crate::types::{AllotropeError, AllotropeResult, BoundingBox, Product};

pub const STAC_VERSION: &str = "1.0.0";

/// Role of the primary asset of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRole {
    Hyperspectral,
    Thermal,
}

impl AssetRole {
    pub fn for_product(product: Product) -> Self {
        match product {
            Product::Prisma | Product::EnMap => AssetRole::Hyperspectral,
            Product::Landsat => AssetRole::Thermal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetRole::Hyperspectral => "hyperspectral",
            AssetRole::Thermal => "thermal",
        }
    }
}

/// WGS84 extent of a swath from its per-pixel geolocation grids.
///
/// Non-finite coordinates are ignored.
pub fn bounding_box_from_grids(
    latitudes: &Array2<f32>,
    longitudes: &Array2<f32>,
) -> AllotropeResult<BoundingBox> {
    let extent = |grid: &Array2<f32>| {
        grid.iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, &v| {
                let v = f64::from(v);
                Some(match acc {
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    None => (v, v),
                })
            })
    };

    match (extent(latitudes), extent(longitudes)) {
        (Some((min_lat, max_lat)), Some((min_lon, max_lon))) => Ok(BoundingBox {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }),
        _ => Err(AllotropeError::InvalidData(
            "Geolocation grids contain no finite coordinates".to_string(),
        )),
    }
}

/// Builds STAC 1.0 items from product files
#[derive(Debug, Clone)]
pub struct StacItemBuilder {
    parser: FileNameParser,
}

impl StacItemBuilder {
    pub fn new() -> AllotropeResult<Self> {
        Ok(Self {
            parser: FileNameParser::new()?,
        })
    }

    /// Item for a PRISMA product, bounded by its geolocation grids
    pub fn from_he5<S: He5Store>(&self, helper: &He5Helper<S>) -> AllotropeResult<Value> {
        let (latitudes, longitudes) = helper.geolocation_grids()?;
        let bounding_box = bounding_box_from_grids(&latitudes, &longitudes)?;
        self.build(&helper.source().source_path, bounding_box)
    }

    /// Item for a Landsat raster, bounded by its reprojected extent
    pub fn from_tif<S: RasterSource>(&self, helper: &TifHelper<S>) -> AllotropeResult<Value> {
        let bounding_box = helper.bounding_box()?;
        self.build(&helper.source().source_path, bounding_box)
    }

    pub fn build(&self, file_path: &Path, bounding_box: BoundingBox) -> AllotropeResult<Value> {
        let file_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AllotropeError::FileName(format!("No file name in {}", file_path.display()))
            })?;
        log::info!("Creating STAC item for {}", file_name);

        let metadata = self.parser.parse(file_name)?;
        let id = file_name.split('.').next().unwrap_or(file_name);
        Ok(item_json(id, file_path, &metadata, bounding_box))
    }
}

fn item_json(
    id: &str,
    file_path: &Path,
    metadata: &AcquisitionMetadata,
    bbox: BoundingBox,
) -> Value {
    let ring = [
        [bbox.min_lon, bbox.min_lat],
        [bbox.max_lon, bbox.min_lat],
        [bbox.max_lon, bbox.max_lat],
        [bbox.min_lon, bbox.max_lat],
        [bbox.min_lon, bbox.min_lat],
    ];

    let mut properties = json!({
        "datetime": metadata.datetime.to_rfc3339(),
        "platform": metadata.platform,
        "processing:level": metadata.processing_level.to_string(),
        "product_type": metadata.product_type,
    });
    if let (Some(band), Some(map)) = (&metadata.band, properties.as_object_mut()) {
        map.insert("band".to_string(), json!(band));
    }

    json!({
        "type": "Feature",
        "stac_version": STAC_VERSION,
        "id": id,
        "bbox": bbox.to_array(),
        "geometry": {
            "type": "Polygon",
            "coordinates": [ring],
        },
        "properties": properties,
        "assets": {
            "data": {
                "href": file_path.to_string_lossy(),
                "roles": [AssetRole::for_product(metadata.product).as_str()],
            }
        },
        "links": [],
    })
}
