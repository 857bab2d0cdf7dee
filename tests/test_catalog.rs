use allotrope::config::FileSourceConfig;
use allotrope::io::file_name::ProcessingLevel;
use allotrope::io::stac::{bounding_box_from_grids, STAC_VERSION};
use allotrope::io::{AssetRole, FileNameParser, MemoryRaster, StacItemBuilder, TifHelper};
use allotrope::types::{AllotropeError, BoundingBox, Product};
use chrono::{Datelike, Timelike};
use ndarray::{array, Array2};

const LANDSAT_FILE: &str = "LC09_L2SP_141045_20250604_20250605_02_T1_ST_B10.TIF";

#[test]
fn test_parse_product_names() {
    let parser = FileNameParser::new().expect("Failed to build parser");

    let prisma = parser
        .parse("PRS_L2D_STD_20240317101458_20240317101503_0001.he5")
        .unwrap();
    assert_eq!(prisma.product, Product::Prisma);
    assert_eq!(prisma.processing_level, ProcessingLevel::L2D);
    assert_eq!(prisma.datetime.day(), 17);
    assert_eq!(prisma.datetime.minute(), 14);

    let landsat = parser.parse(LANDSAT_FILE).unwrap();
    assert_eq!(landsat.product, Product::Landsat);
    assert_eq!(landsat.processing_level.to_string(), "L2SP");
    assert_eq!(landsat.datetime.year(), 2025);
    assert_eq!(landsat.datetime.hour(), 0);
}

#[test]
fn test_rejects_unknown_products() {
    let parser = FileNameParser::new().unwrap();
    for name in ["LC08_L2SP_141045_20250604_20250605_02_T1_ST_B10.TIF", "ENMAP01-____L2A.tif", ""] {
        assert!(matches!(parser.parse(name), Err(AllotropeError::FileName(_))), "{}", name);
    }
}

#[test]
fn test_asset_roles() {
    assert_eq!(AssetRole::for_product(Product::Prisma), AssetRole::Hyperspectral);
    assert_eq!(AssetRole::for_product(Product::EnMap), AssetRole::Hyperspectral);
    assert_eq!(AssetRole::for_product(Product::Landsat).as_str(), "thermal");
}

#[test]
fn test_swath_bounding_box() {
    let latitudes = array![[46.1f32, 46.0], [45.6, f32::NAN]];
    let longitudes = array![[8.5f32, 9.2], [8.4, 9.1]];
    let bbox = bounding_box_from_grids(&latitudes, &longitudes).unwrap();
    assert_eq!(bbox.min_lon, 8.4f32 as f64);
    assert_eq!(bbox.max_lon, 9.2f32 as f64);
    assert_eq!(bbox.min_lat, 45.6f32 as f64);
    assert_eq!(bbox.max_lat, 46.1f32 as f64);

    let empty = Array2::from_elem((2, 2), f32::NAN);
    assert!(matches!(
        bounding_box_from_grids(&empty, &longitudes),
        Err(AllotropeError::InvalidData(_))
    ));
}

#[test]
fn test_thermal_stac_item() -> anyhow::Result<()> {
    let bounds = BoundingBox {
        min_lon: 86.9,
        min_lat: 26.4,
        max_lon: 89.2,
        max_lat: 28.5,
    };
    let raster = MemoryRaster::new(vec![array![[1u16, 2], [3, 4]]])?.with_wgs84_bounds(bounds);
    let source = FileSourceConfig::new(format!("data/{}", LANDSAT_FILE))?;
    let helper = TifHelper::new(source, raster)?;

    let item = StacItemBuilder::new()?.from_tif(&helper)?;
    assert_eq!(item["type"], "Feature");
    assert_eq!(item["stac_version"], STAC_VERSION);
    assert_eq!(item["id"], "LC09_L2SP_141045_20250604_20250605_02_T1_ST_B10");
    assert_eq!(item["bbox"][2], 89.2);
    assert_eq!(item["properties"]["processing:level"], "L2SP");
    assert_eq!(item["properties"]["product_type"], "ST");
    assert_eq!(item["properties"]["datetime"], "2025-06-04T00:00:00+00:00");
    assert_eq!(item["assets"]["data"]["href"], format!("data/{}", LANDSAT_FILE));
    assert_eq!(item["geometry"]["coordinates"][0].as_array().map(Vec::len), Some(5));
    Ok(())
}

#[test]
fn test_item_requires_georeferencing() {
    let raster = MemoryRaster::new(vec![array![[1u16]]]).unwrap();
    let helper = TifHelper::new(FileSourceConfig::new(LANDSAT_FILE).unwrap(), raster).unwrap();
    assert!(matches!(
        StacItemBuilder::new().unwrap().from_tif(&helper),
        Err(AllotropeError::Metadata(_))
    ));
}
