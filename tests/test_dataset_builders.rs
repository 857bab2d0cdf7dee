use allotrope::config::{ComputeDevice, FileSourceConfig, ProcessingConfig};
use allotrope::core::cube::CubeRepresentation;
use allotrope::core::dataset_builder::DatasetBuilder;
use allotrope::core::hyperspectral_builder::PrismaDatasetBuilder;
use allotrope::core::temperature::{ST_ADDITIVE_FACTOR, ST_SCALING_FACTOR};
use allotrope::core::thermal_builder::LandsatDatasetBuilder;
use allotrope::io::he5::He5Dataset;
use allotrope::io::{AttributeValue, He5Helper, MemoryHe5Store, MemoryRaster, TifHelper};
use allotrope::types::{AllotropeError, SpectralFamily, TemperatureUnit};
use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3, Axis};

const DATA_FIELDS: &str = "HDFEOS/SWATHS/PRS_L2D_HCO/Data Fields";
const GEOLOCATION_FIELDS: &str = "HDFEOS/SWATHS/PRS_L2D_HCO/Geolocation Fields";
const PRISMA_FILE: &str = "PRS_L2D_STD_20231229050902_20231229050907_0001.he5";
const LANDSAT_FILE: &str = "LC09_L2SP_141045_20250604_20250605_02_T1_ST_B10.TIF";

const HEIGHT: usize = 4;
const WIDTH: usize = 5;
const BANDS: usize = 6;
/// SWIR bands written as provider fill
const FILLED_SWIR_BANDS: [usize; 3] = [0, 2, 4];
/// SWIR band the provider flags as invalid
const FLAGGED_SWIR_BAND: usize = 5;
/// VNIR bands written as provider fill
const FILLED_VNIR_BANDS: [usize; 3] = [1, 3, 5];
/// Unused VNIR channels: CW 0.0 and flag 0
const PLACEHOLDER_VNIR_BANDS: [usize; 2] = [0, 1];
/// Pixel written as fill in every VNIR band
const FILLED_VNIR_PIXEL: (usize, usize) = (1, 1);
/// VNIR sample carrying a non-zero error code
const ERROR_VNIR_SAMPLE: (usize, usize, usize) = (3, 4, 4);

fn config() -> ProcessingConfig {
    ProcessingConfig {
        device: ComputeDevice::Cpu,
        sampling_seed: Some(7),
        cloud_sampling_ratio: 0.5,
        ..ProcessingConfig::default()
    }
}

fn field(name: &str) -> String {
    format!("{}/{}", DATA_FIELDS, name)
}

fn vnir_wavelengths() -> Vec<f64> {
    (0..BANDS)
        .map(|b| {
            if PLACEHOLDER_VNIR_BANDS.contains(&b) {
                0.0
            } else {
                400.0 + 50.0 * b as f64
            }
        })
        .collect()
}

/// 6 SWIR + 6 VNIR PRISMA swath in BIL `[H, C, W]`
fn prisma_store(swir_wavelengths: Vec<f64>) -> MemoryHe5Store {
    let swir = Array3::from_shape_fn((HEIGHT, BANDS, WIDTH), |(_, c, _)| {
        if FILLED_SWIR_BANDS.contains(&c) {
            0
        } else {
            5000 + 100 * c as u16
        }
    });
    let vnir = Array3::from_shape_fn((HEIGHT, BANDS, WIDTH), |(h, c, w)| {
        if FILLED_VNIR_BANDS.contains(&c) || (h, w) == FILLED_VNIR_PIXEL {
            0
        } else {
            6000 + 100 * c as u16
        }
    });
    let swir_errors = Array3::<u8>::zeros((HEIGHT, BANDS, WIDTH));
    let mut vnir_errors = Array3::<u8>::zeros((HEIGHT, BANDS, WIDTH));
    vnir_errors[[ERROR_VNIR_SAMPLE.0, ERROR_VNIR_SAMPLE.1, ERROR_VNIR_SAMPLE.2]] = 1;

    let latitudes = Array2::from_shape_fn((HEIGHT, WIDTH), |(h, _)| 45.0 + h as f32 * 0.01);
    let longitudes = Array2::from_shape_fn((HEIGHT, WIDTH), |(_, w)| 9.0 + w as f32 * 0.01);

    let mut swir_flags = vec![1i64; BANDS];
    swir_flags[FLAGGED_SWIR_BAND] = 0;
    let mut vnir_flags = vec![1i64; BANDS];
    for &band in &PLACEHOLDER_VNIR_BANDS {
        vnir_flags[band] = 0;
    }

    MemoryHe5Store::new()
        .with_root_attribute("L2ScaleSwirMax", AttributeValue::Float(0.9))
        .with_root_attribute("L2ScaleSwirMin", AttributeValue::Float(0.5))
        .with_root_attribute("L2ScaleVnirMax", AttributeValue::Float(0.8))
        .with_root_attribute("L2ScaleVnirMin", AttributeValue::Float(0.4))
        .with_root_attribute("List_Cw_Swir", AttributeValue::FloatList(swir_wavelengths))
        .with_root_attribute("List_Cw_Swir_Flags", AttributeValue::IntList(swir_flags))
        .with_root_attribute("List_Fwhm_Swir", AttributeValue::FloatList(vec![12.0; BANDS]))
        .with_root_attribute("List_Cw_Vnir", AttributeValue::FloatList(vnir_wavelengths()))
        .with_root_attribute("List_Cw_Vnir_Flags", AttributeValue::IntList(vnir_flags))
        .with_root_attribute("List_Fwhm_Vnir", AttributeValue::FloatList(vec![10.0; BANDS]))
        .with_dataset(&field("SWIR_Cube"), He5Dataset::U16(swir))
        .with_dataset(&field("VNIR_Cube"), He5Dataset::U16(vnir))
        .with_dataset(&field("SWIR_PIXEL_L2_ERR_MATRIX"), He5Dataset::U8(swir_errors))
        .with_dataset(&field("VNIR_PIXEL_L2_ERR_MATRIX"), He5Dataset::U8(vnir_errors))
        .with_dataset(&format!("{}/Latitude", GEOLOCATION_FIELDS), He5Dataset::F32(latitudes))
        .with_dataset(&format!("{}/Longitude", GEOLOCATION_FIELDS), He5Dataset::F32(longitudes))
}

fn swir_wavelengths() -> Vec<f64> {
    (0..BANDS).map(|b| 1000.0 + 100.0 * b as f64).collect()
}

fn prisma_builder(store: MemoryHe5Store) -> Result<PrismaDatasetBuilder<MemoryHe5Store>, AllotropeError> {
    let source = FileSourceConfig::new(PRISMA_FILE)?;
    let helper = He5Helper::new(source, store)?;
    PrismaDatasetBuilder::new(helper, config())
}

#[test]
fn test_prisma_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let builder = prisma_builder(prisma_store(swir_wavelengths())).expect("Failed to create builder");
    assert_eq!(builder.default_cube_representation(), CubeRepresentation::Bil);
    let information = builder.band_information().expect("Band information missing");
    assert_eq!(information[&SpectralFamily::Swir].len(), BANDS);
    assert!(!information[&SpectralFamily::Swir].by_index(FLAGGED_SWIR_BAND).unwrap().is_valid);

    let dataset = builder.vend_dataset().expect("Failed to vend dataset");

    // BSQ [C, H, W] with SWIR ahead of VNIR
    assert_eq!(dataset.normalized_hyperspectral_cube.shape(), &[2 * BANDS, HEIGHT, WIDTH]);
    assert_eq!(dataset.validity_cube.shape(), dataset.normalized_hyperspectral_cube.shape());
    assert!(dataset.normalized_hyperspectral_cube.is_standard_layout());
    assert_eq!(dataset.channel_count(), 2 * BANDS);
    assert_eq!(dataset.spectral_family_order.len(), 2 * BANDS);
    assert!(dataset.spectral_family_order[..BANDS].iter().all(|&f| f == SpectralFamily::Swir));
    assert!(dataset.spectral_family_order[BANDS..].iter().all(|&f| f == SpectralFamily::Vnir));
    assert_eq!(dataset.band_cw_order[0], 1000.0);
    assert_eq!(&dataset.band_cw_order[BANDS..], vnir_wavelengths().as_slice());
    assert_eq!(dataset.band_cw_order.len(), 2 * BANDS);

    let cube = &dataset.normalized_hyperspectral_cube;
    let validity = &dataset.validity_cube;
    assert_abs_diff_eq!(cube[[1, 0, 0]], 0.5 + 5100.0 * 0.4 / 65535.0, epsilon = 1e-6);
    assert_abs_diff_eq!(cube[[BANDS + 2, 2, 2]], 0.4 + 6200.0 * 0.4 / 65535.0, epsilon = 1e-6);

    // Fill samples evaluate at DN 0, the family minimum
    for h in 0..HEIGHT {
        for w in 0..WIDTH {
            for &band in &FILLED_SWIR_BANDS {
                assert_abs_diff_eq!(cube[[band, h, w]], 0.5, epsilon = 1e-6);
            }
            for &band in &FILLED_VNIR_BANDS {
                assert_abs_diff_eq!(cube[[BANDS + band, h, w]], 0.4, epsilon = 1e-6);
            }
        }
    }
    assert_abs_diff_eq!(cube[[BANDS, FILLED_VNIR_PIXEL.0, FILLED_VNIR_PIXEL.1]], 0.4, epsilon = 1e-6);

    for c in 0..2 * BANDS {
        for h in 0..HEIGHT {
            for w in 0..WIDTH {
                let invalid_band = if c < BANDS {
                    FILLED_SWIR_BANDS.contains(&c) || c == FLAGGED_SWIR_BAND
                } else {
                    FILLED_VNIR_BANDS.contains(&(c - BANDS))
                        || PLACEHOLDER_VNIR_BANDS.contains(&(c - BANDS))
                };
                let expected_invalid = invalid_band
                    || (c >= BANDS && (h, w) == FILLED_VNIR_PIXEL)
                    || (h, c, w) == (ERROR_VNIR_SAMPLE.0, BANDS + ERROR_VNIR_SAMPLE.1, ERROR_VNIR_SAMPLE.2);
                assert_eq!(
                    validity[[c, h, w]],
                    u8::from(!expected_invalid),
                    "validity at ({}, {}, {})",
                    c,
                    h,
                    w
                );
            }
        }
    }

    // SWIR keeps bands 1 and 3; VNIR keeps bands 2 and 4 minus the fill pixel and error sample
    let valid: usize = validity.iter().map(|&v| v as usize).sum();
    assert_eq!(valid, 2 * HEIGHT * WIDTH + 2 * (HEIGHT * WIDTH - 1) - 1);
}

#[test]
fn test_prisma_placeholder_wavelengths_are_kept() {
    let builder = prisma_builder(prisma_store(swir_wavelengths())).expect("Failed to create builder");
    let vnir = &builder.band_information().expect("Band information missing")[&SpectralFamily::Vnir];

    assert_eq!(vnir.len(), BANDS);
    let placeholders: Vec<usize> = vnir.all_by_wavelength(0.0).map(|b| b.band_index).collect();
    assert_eq!(placeholders, PLACEHOLDER_VNIR_BANDS.to_vec());
    assert!(vnir.all_by_wavelength(0.0).all(|b| !b.is_valid));
    assert_eq!(vnir.by_wavelength(500.0).unwrap().band_index, 2);

    let dataset = builder.vend_dataset().expect("Failed to vend dataset");
    for &band in &PLACEHOLDER_VNIR_BANDS {
        assert!(dataset.validity_cube.index_axis(Axis(0), BANDS + band).iter().all(|&v| v == 0));
    }
}

#[test]
fn test_prisma_band_count_disagreement_is_fatal() {
    let mut wavelengths = swir_wavelengths();
    wavelengths.pop();
    // Flags and FWHM still list six bands
    let result = prisma_builder(prisma_store(wavelengths));
    assert!(matches!(result, Err(AllotropeError::Metadata(_))));
}

#[test]
fn test_prisma_missing_family_is_fatal() {
    let store = MemoryHe5Store::new()
        .with_root_attribute("List_Cw_Swir", AttributeValue::FloatList(swir_wavelengths()))
        .with_root_attribute("List_Cw_Swir_Flags", AttributeValue::IntList(vec![1; BANDS]))
        .with_root_attribute("List_Fwhm_Swir", AttributeValue::FloatList(vec![12.0; BANDS]));
    let result = prisma_builder(store);
    assert!(matches!(result, Err(AllotropeError::Lookup(_))));
}

#[test]
fn test_prisma_stac_item() {
    let builder = prisma_builder(prisma_store(swir_wavelengths())).unwrap();
    let item = builder.stac_item().expect("Failed to build STAC item");
    assert_eq!(item["id"], "PRS_L2D_STD_20231229050902_20231229050907_0001");
    assert_eq!(item["properties"]["platform"], "Prisma");
    assert_eq!(item["assets"]["data"]["roles"][0], "hyperspectral");
    assert_abs_diff_eq!(item["bbox"][0].as_f64().unwrap(), 9.0, epsilon = 1e-6);
    assert_abs_diff_eq!(item["bbox"][3].as_f64().unwrap(), 45.03, epsilon = 1e-5);
}

// Landsat

const SIDE: usize = 40;
const COLD_ROWS: usize = 4;
const FILL_ROW: usize = 20;
const FILL_COLUMNS: usize = 10;

/// DN that decodes to `celsius`
fn dn_for(celsius: f32) -> u16 {
    ((celsius + 273.15 - ST_ADDITIVE_FACTOR) / ST_SCALING_FACTOR).round() as u16
}

fn thermal_band() -> Array2<u16> {
    Array2::from_shape_fn((SIDE, SIDE), |(i, j)| {
        if i == FILL_ROW && j < FILL_COLUMNS {
            0
        } else if i < COLD_ROWS {
            dn_for(15.0 + ((i + j) % 5) as f32 * 0.1 - 0.2)
        } else {
            dn_for(29.0 + ((i * 7 + j * 13) % 21) as f32 * 0.1)
        }
    })
}

fn quality_band() -> Array2<u16> {
    Array2::from_shape_fn((SIDE, SIDE), |(i, j)| {
        if i < COLD_ROWS {
            1 << 3
        } else if j == 0 {
            1 << 7
        } else {
            21824
        }
    })
}

fn landsat_builder(
    unit: TemperatureUnit,
    with_quality: bool,
) -> Result<LandsatDatasetBuilder<MemoryRaster>, AllotropeError> {
    let raster = MemoryRaster::new(vec![thermal_band()])?.with_no_data(0.0);
    let mut helper = TifHelper::new(FileSourceConfig::new(LANDSAT_FILE)?, raster)?;
    if with_quality {
        helper = helper.with_quality_source(MemoryRaster::new(vec![quality_band()])?)?;
    }
    let config = ProcessingConfig {
        temperature_unit: unit,
        ..config()
    };
    LandsatDatasetBuilder::new(helper, config)
}

#[test]
fn test_landsat_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let builder = landsat_builder(TemperatureUnit::Celsius, true).expect("Failed to create builder");
    assert_eq!(builder.default_cube_representation(), CubeRepresentation::Bsq);
    assert!(builder.band_information().is_none());

    let dataset = builder.vend_dataset().expect("Failed to vend dataset");
    let shape = [1, SIDE, SIDE];
    assert_eq!(dataset.normalized_thermal_cube.shape(), &shape);
    assert_eq!(dataset.validity_cube.shape(), &shape);
    assert_eq!(dataset.zero_fill_validity_mask.shape(), &shape);
    assert_eq!(dataset.cloud_mask.shape(), &shape);

    assert_abs_diff_eq!(dataset.normalized_thermal_cube[[0, 0, 0]], 14.8, epsilon = 0.01);
    assert_abs_diff_eq!(dataset.normalized_thermal_cube[[0, 30, 0]], 29.0, epsilon = 0.01);

    for i in 0..SIDE {
        for j in 0..SIDE {
            let filled = i == FILL_ROW && j < FILL_COLUMNS;
            let cloud = i < COLD_ROWS;
            assert_eq!(dataset.zero_fill_validity_mask[[0, i, j]], u8::from(!filled));
            assert_eq!(dataset.cloud_mask[[0, i, j]], u8::from(!cloud), "cloud at ({}, {})", i, j);
            assert_eq!(
                dataset.validity_cube[[0, i, j]],
                dataset.cloud_mask[[0, i, j]] * dataset.zero_fill_validity_mask[[0, i, j]]
            );
        }
    }

    let provider_cloud = dataset.provider_cloud_mask.expect("Provider cloud mask missing");
    let water = dataset.water_mask.expect("Water mask missing");
    let snow = dataset.snow_mask.expect("Snow mask missing");
    assert_eq!(provider_cloud[[0, 0, 5]], 1);
    assert_eq!(provider_cloud[[0, 10, 5]], 0);
    assert_eq!(water[[0, 10, 0]], 1);
    assert_eq!(water[[0, 10, 5]], 0);
    assert!(snow.iter().all(|&s| s == 0));
}

#[test]
fn test_landsat_output_unit_and_missing_quality() {
    let celsius = landsat_builder(TemperatureUnit::Celsius, false)
        .unwrap()
        .vend_dataset()
        .unwrap();
    let kelvin = landsat_builder(TemperatureUnit::Kelvin, false)
        .unwrap()
        .vend_dataset()
        .unwrap();

    assert!(kelvin.provider_cloud_mask.is_none());
    assert!(kelvin.water_mask.is_none());
    assert!(kelvin.snow_mask.is_none());
    // Cloud detection runs in Celsius whatever the output unit
    assert_eq!(celsius.cloud_mask, kelvin.cloud_mask);
    assert_abs_diff_eq!(
        kelvin.normalized_thermal_cube[[0, 7, 7]],
        celsius.normalized_thermal_cube[[0, 7, 7]] + 273.15,
        epsilon = 1e-3
    );
}

#[test]
fn test_landsat_rejects_invalid_config() {
    let raster = MemoryRaster::new(vec![thermal_band()]).unwrap();
    let helper = TifHelper::new(FileSourceConfig::new(LANDSAT_FILE).unwrap(), raster).unwrap();
    let config = ProcessingConfig {
        cloud_sampling_ratio: 0.0,
        ..config()
    };
    assert!(matches!(
        LandsatDatasetBuilder::new(helper, config),
        Err(AllotropeError::Config(_))
    ));
}
