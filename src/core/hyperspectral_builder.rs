//! PRISMA L2D hyperspectral dataset builder

use ndarray::{concatenate, Array1, Array3, ArrayView3, Axis, Zip};
use serde_json::Value;

use crate::config::ProcessingConfig;
use crate::core::cube::{Cube, CubeOperations, CubeRepresentation, LogicalAxis, OutputForm};
use crate::core::dataset_builder::{DatasetBuilder, VendableHyperspectralDataset};
use crate::core::reflectance::{PrsL2dReflectanceTransformer, ReflectanceOptions};
use crate::core::transform::DataTransformer;
use crate::io::templates::{HyperspectralFileComponent, Template};
use crate::io::{
    ExtractionMode, FileHelper, He5Helper, He5Metadata, He5Store, HyperspectralFileHelper,
    StacItemBuilder,
};
use crate::types::{
    AllotropeError, AllotropeResult, BandInformation, BandInformationMap, SpectralFamily,
    ValidityCube, WavelengthUnit,
};

/// Reflectance and validity of one spectral family, in BIL
struct FamilyCube {
    family: SpectralFamily,
    reflectance: Array3<f32>,
    validity: ValidityCube,
}

/// Builds [`VendableHyperspectralDataset`]s from PRISMA L2D files
pub struct PrismaDatasetBuilder<S: He5Store> {
    helper: He5Helper<S>,
    config: ProcessingConfig,
    band_information: BandInformationMap,
    transformer: PrsL2dReflectanceTransformer,
    operations: CubeOperations,
}

impl<S: He5Store> PrismaDatasetBuilder<S> {
    /// Validate `config` and resolve band metadata of every processed family
    pub fn new(helper: He5Helper<S>, config: ProcessingConfig) -> AllotropeResult<Self> {
        config.validate()?;
        let band_information = extract_band_information(helper.file_metadata(), helper.template())?;

        Ok(Self {
            transformer: PrsL2dReflectanceTransformer::new(config.device),
            operations: CubeOperations::new(config.device),
            helper,
            config,
            band_information,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// STAC item describing the source file
    pub fn stac_item(&self) -> AllotropeResult<Value> {
        StacItemBuilder::new()?.from_he5(&self.helper)
    }

    fn family_information(&self, family: SpectralFamily) -> AllotropeResult<&BandInformation> {
        self.band_information.get(&family).ok_or_else(|| {
            AllotropeError::Lookup(format!("No band information for spectral family {}", family))
        })
    }

    fn process_family(&self, family: SpectralFamily) -> AllotropeResult<FamilyCube> {
        let information = self.family_information(family)?;
        let raw = self
            .helper
            .extract_specific_bands(&[], true, Some(family), ExtractionMode::All)?;

        let channels = raw.dim_of(LogicalAxis::Channel);
        if channels != information.len() {
            return Err(AllotropeError::Shape(format!(
                "{} cube has {} channels but the metadata lists {} bands",
                family,
                channels,
                information.len()
            )));
        }

        let zero_fill_validity: ValidityCube = match raw.mask() {
            Some(mask) => mask.mapv(|masked| u8::from(!masked)),
            None => Array3::ones(raw.data().raw_dim()),
        };
        log::debug!(
            "{} zero-fill validity: {} of {} samples",
            family,
            zero_fill_validity.iter().map(|&v| v as usize).sum::<usize>(),
            zero_fill_validity.len()
        );

        let options = ReflectanceOptions::from_file_metadata(
            vec![family; channels],
            self.helper.file_metadata(),
            self.helper.template(),
        )?
        .with_masking_indicator(self.config.masking_indicator);
        let (reflectance, _, _) = self.transformer.transform(&raw, &options)?.into_parts();

        let errors = self
            .helper
            .extract_error_matrices(&[], family, ExtractionMode::All)?;
        if errors.shape() != raw.shape() {
            return Err(AllotropeError::Shape(format!(
                "{} error matrix {:?} does not match cube {:?}",
                family,
                errors.shape(),
                raw.shape()
            )));
        }

        let mut validity = zero_fill_validity;
        Zip::from(&mut validity)
            .and(errors.data())
            .for_each(|valid, &error| *valid *= u8::from(error == 0));

        Ok(FamilyCube {
            family,
            reflectance,
            validity,
        })
    }

    /// Per-band provider flags shaped `(1, C, 1)` for broadcasting over a BIL cube
    fn band_flags(&self) -> AllotropeResult<Array3<u8>> {
        let mut flags = Vec::new();
        for family in SpectralFamily::PROCESSING_ORDER {
            flags.extend(self.family_information(family)?.iter().map(|b| u8::from(b.is_valid)));
        }
        let channels = flags.len();
        Ok(Array1::from(flags).into_shape((1, channels, 1))?)
    }
}

impl<S: He5Store> DatasetBuilder for PrismaDatasetBuilder<S> {
    type Helper = He5Helper<S>;
    type Vendable = VendableHyperspectralDataset;

    fn file_helper(&self) -> &He5Helper<S> {
        &self.helper
    }

    fn default_cube_representation(&self) -> CubeRepresentation {
        CubeRepresentation::Bil
    }

    fn band_information(&self) -> Option<&BandInformationMap> {
        Some(&self.band_information)
    }

    fn vend_dataset(&self) -> AllotropeResult<VendableHyperspectralDataset> {
        log::info!(
            "Building hyperspectral dataset from {}",
            self.helper.source().source_path.display()
        );

        let mut families = Vec::with_capacity(SpectralFamily::PROCESSING_ORDER.len());
        for family in SpectralFamily::PROCESSING_ORDER {
            families.push(self.process_family(family)?);
        }

        let reference = families[0].reflectance.shape().to_vec();
        for part in &families[1..] {
            let shape = part.reflectance.shape();
            if shape[0] != reference[0] || shape[2] != reference[2] {
                return Err(AllotropeError::Shape(format!(
                    "{} cube {:?} is spatially incompatible with {} cube {:?}",
                    part.family, shape, families[0].family, reference
                )));
            }
        }

        let reflectance_views: Vec<ArrayView3<f32>> =
            families.iter().map(|f| f.reflectance.view()).collect();
        let validity_views: Vec<ArrayView3<u8>> = families.iter().map(|f| f.validity.view()).collect();
        let reflectance = concatenate(Axis(1), &reflectance_views)?;
        let mut validity = concatenate(Axis(1), &validity_views)?;

        let flags = self.band_flags()?;
        Zip::from(&mut validity)
            .and_broadcast(&flags)
            .for_each(|valid, &flag| *valid *= flag);

        let representation = self.default_cube_representation();
        let cube = self.operations.convert_cube(
            Cube::dense(reflectance, representation),
            CubeRepresentation::Bsq,
            OutputForm::Contiguous,
        );
        let validity = self.operations.convert_cube(
            Cube::dense(validity, representation),
            CubeRepresentation::Bsq,
            OutputForm::Contiguous,
        );

        let mut spectral_family_order = Vec::new();
        let mut band_cw_order = Vec::new();
        for family in SpectralFamily::PROCESSING_ORDER {
            for band in self.family_information(family)?.iter() {
                spectral_family_order.push(family);
                band_cw_order.push(band.wavelength);
            }
        }

        let (normalized_hyperspectral_cube, _, _) = cube.into_parts();
        let (validity_cube, _, _) = validity.into_parts();
        log::info!(
            "Hyperspectral dataset ready: {:?} with {} valid samples",
            normalized_hyperspectral_cube.shape(),
            validity_cube.iter().map(|&v| v as usize).sum::<usize>()
        );

        Ok(VendableHyperspectralDataset {
            normalized_hyperspectral_cube,
            validity_cube,
            spectral_family_order,
            band_cw_order,
        })
    }
}

fn root_field<'a>(
    template: &'a Template<HyperspectralFileComponent>,
    component: HyperspectralFileComponent,
) -> AllotropeResult<&'a str> {
    template.get(component)?.root_metadata_field_name()
}

fn root_f64_list(
    metadata: &He5Metadata,
    template: &Template<HyperspectralFileComponent>,
    component: HyperspectralFileComponent,
) -> AllotropeResult<Vec<f64>> {
    let field = root_field(template, component)?;
    metadata.root_attribute(field)?.as_f64_list().ok_or_else(|| {
        AllotropeError::Metadata(format!("Root attribute {} is not a numeric list", field))
    })
}

fn root_i64_list(
    metadata: &He5Metadata,
    template: &Template<HyperspectralFileComponent>,
    component: HyperspectralFileComponent,
) -> AllotropeResult<Vec<i64>> {
    let field = root_field(template, component)?;
    metadata.root_attribute(field)?.as_i64_list().ok_or_else(|| {
        AllotropeError::Metadata(format!("Root attribute {} is not an integer list", field))
    })
}

/// Band information of every processed family from root metadata lists
pub fn extract_band_information(
    metadata: &He5Metadata,
    template: &Template<HyperspectralFileComponent>,
) -> AllotropeResult<BandInformationMap> {
    let mut information = BandInformationMap::new();
    for family in SpectralFamily::PROCESSING_ORDER {
        let wavelengths =
            root_f64_list(metadata, template, HyperspectralFileComponent::central_wavelengths(family)?)?;
        let flags = root_i64_list(
            metadata,
            template,
            HyperspectralFileComponent::central_wavelength_flags(family)?,
        )?;
        let fwhms = root_f64_list(metadata, template, HyperspectralFileComponent::fwhm_list(family)?)?;

        let bands = BandInformation::from_provider_lists(
            family,
            &wavelengths,
            &flags,
            &fwhms,
            WavelengthUnit::Nanometers,
        )?;
        log::debug!("{} band information: {} bands", family, bands.len());
        information.insert(family, bands);
    }
    Ok(information)
}
