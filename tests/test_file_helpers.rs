use allotrope::config::{ComputeDevice, FileCategory, FileSourceConfig, ProcessingConfig};
use allotrope::core::cube::{CubeRepresentation, LogicalAxis};
use allotrope::io::he5::He5Dataset;
use allotrope::io::templates::{
    HyperspectralFileComponent, ReferenceDefinition, ReferenceKind, TemplateIdentifier, ThermalComponent,
};
use allotrope::io::{
    AttributeValue, ExtractionMode, FileHelper, He5Helper, HyperspectralFileHelper, MemoryHe5Store,
    MemoryRaster, ThermalFileHelper, TifHelper,
};
use allotrope::types::{AllotropeError, SpectralFamily, TemperatureUnit};
use ndarray::{array, Array3};
use std::io::Write;

const VNIR_CUBE: &str = "HDFEOS/SWATHS/PRS_L2D_HCO/Data Fields/VNIR_Cube";
const VNIR_ERRORS: &str = "HDFEOS/SWATHS/PRS_L2D_HCO/Data Fields/VNIR_PIXEL_L2_ERR_MATRIX";

#[test]
fn test_processing_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    write!(
        file,
        r#"{{"device": "cpu", "temperature_unit": "KELVIN", "cloud_sampling_ratio": 0.25, "sampling_seed": 9}}"#
    )
    .unwrap();

    let config = ProcessingConfig::from_json_file(file.path()).expect("Failed to load config");
    assert_eq!(config.device, ComputeDevice::Cpu);
    assert_eq!(config.temperature_unit, TemperatureUnit::Kelvin);
    assert_eq!(config.cloud_sampling_ratio, 0.25);
    assert_eq!(config.sampling_seed, Some(9));
    assert_eq!(config.masking_indicator, 0.0);
}

#[test]
fn test_processing_config_file_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"cloud_sampling_ratio": 2.0}}"#).unwrap();
    assert!(matches!(
        ProcessingConfig::from_json_file(file.path()),
        Err(AllotropeError::Config(_))
    ));

    let mut broken = tempfile::NamedTempFile::new().unwrap();
    write!(broken, "{{not json").unwrap();
    assert!(matches!(
        ProcessingConfig::from_json_file(broken.path()),
        Err(AllotropeError::Json(_))
    ));

    assert!(matches!(
        ProcessingConfig::from_json_file("/nonexistent/allotrope.json"),
        Err(AllotropeError::Io(_))
    ));
}

#[test]
fn test_file_source_category() {
    assert_eq!(FileSourceConfig::new("scene.HE5").unwrap().file_category, FileCategory::Hdfs);
    assert_eq!(FileSourceConfig::new("scene.tiff").unwrap().file_category, FileCategory::Tif);
    assert!(matches!(FileSourceConfig::new("scene.nc"), Err(AllotropeError::Config(_))));

    let explicit = FileSourceConfig::with_category("scene.dat", FileCategory::Tif);
    assert_eq!(explicit.file_category, FileCategory::Tif);
    // Helpers refuse sources of the wrong category
    assert!(matches!(
        He5Helper::new(explicit, MemoryHe5Store::new()),
        Err(AllotropeError::Config(_))
    ));
}

#[test]
fn test_reference_definitions_validate() {
    assert!(matches!(
        ReferenceDefinition::file_reference("Empty path", ""),
        Err(AllotropeError::Config(_))
    ));
    let field = ReferenceDefinition::root_metadata_field("SWIR scale", "L2ScaleSwirMax").unwrap();
    assert_eq!(field.root_metadata_field_name().unwrap(), "L2ScaleSwirMax");
    assert!(matches!(field.file_name(), Err(AllotropeError::Lookup(_))));
    assert!(matches!(field.kind, ReferenceKind::RootMetadataField { .. }));
}

#[test]
fn test_templates_are_complete() {
    let prisma = TemplateIdentifier::prisma_hyperspectral().expect("PRISMA template invalid");
    assert_eq!(prisma.identifier(), TemplateIdentifier::PrismaHyperspectral);
    assert_eq!(prisma.len(), 16);
    for family in [SpectralFamily::Swir, SpectralFamily::Vnir] {
        let cube = HyperspectralFileComponent::cube_data(family).unwrap();
        assert!(prisma.get(cube).unwrap().file_name().is_ok());
        let scale = HyperspectralFileComponent::l2_scale_max(family).unwrap();
        assert!(prisma.get(scale).unwrap().root_metadata_field_name().is_ok());
    }
    assert!(HyperspectralFileComponent::cube_data(SpectralFamily::Panchromatic).is_err());

    let landsat = TemplateIdentifier::landsat_thermal().unwrap();
    assert_eq!(landsat.len(), 6);
    assert_eq!(
        landsat.get(ThermalComponent::AreaOrPoint).unwrap().property_name().unwrap(),
        "AREA_OR_POINT"
    );
    // Templates are built once
    assert!(std::ptr::eq(landsat, TemplateIdentifier::landsat_thermal().unwrap()));
}

fn vnir_helper() -> He5Helper<MemoryHe5Store> {
    // BIL [H=2, C=3, W=2]
    let cube = Array3::from_shape_fn((2, 3, 2), |(h, c, w)| (1 + h * 100 + c * 10 + w) as u16);
    let mut errors = Array3::<u8>::zeros((2, 3, 2));
    errors[[1, 2, 0]] = 4;
    let store = MemoryHe5Store::new()
        .with_dataset(VNIR_CUBE, He5Dataset::U16(cube))
        .with_dataset(VNIR_ERRORS, He5Dataset::U8(errors))
        .with_component_attribute(VNIR_CUBE, "ScaleFactor", AttributeValue::Float(1.0));
    let source = FileSourceConfig::new("PRS_L2D_STD_20231229050902_20231229050907_0001.he5").unwrap();
    He5Helper::new(source, store).expect("Failed to open store")
}

#[test]
fn test_he5_extraction_and_error_matrices() {
    let helper = vnir_helper();
    assert_eq!(helper.file_category(), FileCategory::Hdfs);

    let metadata = helper.access_dataset(VNIR_CUBE).unwrap();
    assert_eq!(metadata.shape, vec![2, 3, 2]);
    assert_eq!(metadata.attributes["ScaleFactor"].as_f64(), Some(1.0));

    let cube = helper
        .extract_specific_bands(&[2, 0], false, Some(SpectralFamily::Vnir), ExtractionMode::Specific)
        .unwrap();
    assert_eq!(cube.representation(), CubeRepresentation::Bil);
    assert_eq!(cube.dim_of(LogicalAxis::Channel), 2);
    assert_eq!(cube.data()[[1, 0, 1]], 122);
    assert_eq!(cube.data()[[1, 1, 1]], 102);
    assert!(!cube.is_masked());

    let errors = helper
        .extract_error_matrices(&[2], SpectralFamily::Vnir, ExtractionMode::Specific)
        .unwrap();
    assert_eq!(errors.shape(), &[2, 1, 2]);
    assert_eq!(errors.data()[[1, 0, 0]], 4);

    assert!(matches!(
        helper.extract_specific_bands(&[3], false, Some(SpectralFamily::Vnir), ExtractionMode::Specific),
        Err(AllotropeError::Lookup(_))
    ));
    // Geolocation grids are not staged
    assert!(matches!(helper.geolocation_grids(), Err(AllotropeError::Lookup(_))));
}

#[test]
fn test_tif_quality_band() {
    let raster = MemoryRaster::new(vec![array![[1u16, 2, 3], [4, 5, 6]]]).unwrap();
    let quality = MemoryRaster::new(vec![array![[8u16, 0, 128], [0, 0, 0]]]).unwrap();
    let source = FileSourceConfig::new("LC09_L2SP_141045_20250604_20250605_02_T1_ST_B10.TIF").unwrap();
    let helper = TifHelper::new(source.clone(), raster.clone())
        .unwrap()
        .with_quality_source(quality)
        .unwrap();

    let qa = helper.extract_quality_band().unwrap().expect("Quality band missing");
    assert_eq!(qa[[0, 2]], 128);
    assert_eq!(
        helper.property(ThermalComponent::Height).unwrap(),
        &AttributeValue::Int(2)
    );

    let mismatched = MemoryRaster::new(vec![array![[0u16, 0], [0, 0]]]).unwrap();
    assert!(matches!(
        TifHelper::new(source, raster).unwrap().with_quality_source(mismatched),
        Err(AllotropeError::Shape(_))
    ));
}
