//! Reference-definition templates resolving logical components to file locations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::types::{AllotropeError, AllotropeResult, SpectralFamily};

/// Where a logical component lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// A dataset path inside the container
    FileReference { file_name: String },
    /// An attribute on the container root
    RootMetadataField { field_name: String },
    /// A property reported directly by the raster driver
    DirectProperty { property_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDefinition {
    pub description: String,
    pub kind: ReferenceKind,
}

impl ReferenceDefinition {
    /// Validating constructor; the field required by `kind` must be non-empty
    pub fn new(description: impl Into<String>, kind: ReferenceKind) -> AllotropeResult<Self> {
        let (label, value) = match &kind {
            ReferenceKind::FileReference { file_name } => ("file_name", file_name),
            ReferenceKind::RootMetadataField { field_name } => ("root_metadata_field_name", field_name),
            ReferenceKind::DirectProperty { property_name } => ("property_name", property_name),
        };
        if value.trim().is_empty() {
            return Err(AllotropeError::Config(format!(
                "{} is required for {:?}",
                label, kind
            )));
        }
        Ok(Self {
            description: description.into(),
            kind,
        })
    }

    pub fn file_reference(description: &str, file_name: &str) -> AllotropeResult<Self> {
        Self::new(
            description,
            ReferenceKind::FileReference {
                file_name: file_name.to_string(),
            },
        )
    }

    pub fn root_metadata_field(description: &str, field_name: &str) -> AllotropeResult<Self> {
        Self::new(
            description,
            ReferenceKind::RootMetadataField {
                field_name: field_name.to_string(),
            },
        )
    }

    pub fn direct_property(description: &str, property_name: &str) -> AllotropeResult<Self> {
        Self::new(
            description,
            ReferenceKind::DirectProperty {
                property_name: property_name.to_string(),
            },
        )
    }

    pub fn file_name(&self) -> AllotropeResult<&str> {
        match &self.kind {
            ReferenceKind::FileReference { file_name } => Ok(file_name),
            other => Err(self.kind_mismatch("file reference", other)),
        }
    }

    pub fn root_metadata_field_name(&self) -> AllotropeResult<&str> {
        match &self.kind {
            ReferenceKind::RootMetadataField { field_name } => Ok(field_name),
            other => Err(self.kind_mismatch("root metadata field", other)),
        }
    }

    pub fn property_name(&self) -> AllotropeResult<&str> {
        match &self.kind {
            ReferenceKind::DirectProperty { property_name } => Ok(property_name),
            other => Err(self.kind_mismatch("direct property", other)),
        }
    }

    fn kind_mismatch(&self, expected: &str, found: &ReferenceKind) -> AllotropeError {
        AllotropeError::Lookup(format!(
            "Reference '{}' is not a {} ({:?})",
            self.description, expected, found
        ))
    }
}

/// Components of a hyperspectral product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HyperspectralFileComponent {
    SwirCubeData,
    VnirCubeData,
    SwirPixelErrMatrix,
    VnirPixelErrMatrix,
    SwirCentralWavelengthList,
    SwirCentralWavelengthFlags,
    SwirFwhmList,
    VnirCentralWavelengthList,
    VnirCentralWavelengthFlags,
    VnirFwhmList,
    L2ScaleMaxSwir,
    L2ScaleMinSwir,
    L2ScaleMaxVnir,
    L2ScaleMinVnir,
    Latitude,
    Longitude,
}

impl HyperspectralFileComponent {
    fn for_family(
        family: SpectralFamily,
        swir: Self,
        vnir: Self,
    ) -> AllotropeResult<Self> {
        match family {
            SpectralFamily::Swir => Ok(swir),
            SpectralFamily::Vnir => Ok(vnir),
            SpectralFamily::Panchromatic => Err(AllotropeError::Lookup(format!(
                "No file component mapped for spectral family {}",
                family
            ))),
        }
    }

    pub fn cube_data(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(family, Self::SwirCubeData, Self::VnirCubeData)
    }

    pub fn error_matrix(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(family, Self::SwirPixelErrMatrix, Self::VnirPixelErrMatrix)
    }

    pub fn central_wavelengths(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(
            family,
            Self::SwirCentralWavelengthList,
            Self::VnirCentralWavelengthList,
        )
    }

    pub fn central_wavelength_flags(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(
            family,
            Self::SwirCentralWavelengthFlags,
            Self::VnirCentralWavelengthFlags,
        )
    }

    pub fn fwhm_list(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(family, Self::SwirFwhmList, Self::VnirFwhmList)
    }

    pub fn l2_scale_max(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(family, Self::L2ScaleMaxSwir, Self::L2ScaleMaxVnir)
    }

    pub fn l2_scale_min(family: SpectralFamily) -> AllotropeResult<Self> {
        Self::for_family(family, Self::L2ScaleMinSwir, Self::L2ScaleMinVnir)
    }
}

/// Properties of a thermal raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThermalComponent {
    CoordinateReferenceSystem,
    AreaOrPoint,
    Bounds,
    Transform,
    Width,
    Height,
}

/// Immutable component -> reference table
#[derive(Debug, Clone, PartialEq)]
pub struct Template<K: Ord> {
    identifier: TemplateIdentifier,
    references: BTreeMap<K, ReferenceDefinition>,
}

impl<K: Ord + Copy + std::fmt::Debug> Template<K> {
    pub fn new(identifier: TemplateIdentifier, references: BTreeMap<K, ReferenceDefinition>) -> Self {
        Self {
            identifier,
            references,
        }
    }

    pub fn identifier(&self) -> TemplateIdentifier {
        self.identifier
    }

    pub fn get(&self, component: K) -> AllotropeResult<&ReferenceDefinition> {
        self.references.get(&component).ok_or_else(|| {
            AllotropeError::Lookup(format!(
                "Component {:?} not present in template {:?}",
                component, self.identifier
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &ReferenceDefinition)> {
        self.references.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateIdentifier {
    PrismaHyperspectral,
    LandsatThermal,
}

const PRISMA_SWATH: &str = "HDFEOS/SWATHS/PRS_L2D_HCO";

impl TemplateIdentifier {
    /// The PRISMA L2D hyperspectral template
    pub fn prisma_hyperspectral() -> AllotropeResult<&'static Template<HyperspectralFileComponent>> {
        static TEMPLATE: OnceLock<Result<Template<HyperspectralFileComponent>, String>> =
            OnceLock::new();
        TEMPLATE
            .get_or_init(|| build_prisma_hyperspectral().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| AllotropeError::Config(format!("Invalid PRISMA template: {}", e)))
    }

    /// The Landsat thermal template
    pub fn landsat_thermal() -> AllotropeResult<&'static Template<ThermalComponent>> {
        static TEMPLATE: OnceLock<Result<Template<ThermalComponent>, String>> = OnceLock::new();
        TEMPLATE
            .get_or_init(|| build_landsat_thermal().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| AllotropeError::Config(format!("Invalid Landsat template: {}", e)))
    }
}

fn build_prisma_hyperspectral() -> AllotropeResult<Template<HyperspectralFileComponent>> {
    use HyperspectralFileComponent::*;

    let data_field = |name: &str| format!("{}/Data Fields/{}", PRISMA_SWATH, name);
    let geolocation_field = |name: &str| format!("{}/Geolocation Fields/{}", PRISMA_SWATH, name);

    let mut references = BTreeMap::new();
    references.insert(
        SwirCubeData,
        ReferenceDefinition::file_reference("SWIR cube data", &data_field("SWIR_Cube"))?,
    );
    references.insert(
        VnirCubeData,
        ReferenceDefinition::file_reference("VNIR cube data", &data_field("VNIR_Cube"))?,
    );
    references.insert(
        SwirPixelErrMatrix,
        ReferenceDefinition::file_reference(
            "SWIR pixel error matrix",
            &data_field("SWIR_PIXEL_L2_ERR_MATRIX"),
        )?,
    );
    references.insert(
        VnirPixelErrMatrix,
        ReferenceDefinition::file_reference(
            "VNIR pixel error matrix",
            &data_field("VNIR_PIXEL_L2_ERR_MATRIX"),
        )?,
    );
    references.insert(
        SwirCentralWavelengthList,
        ReferenceDefinition::root_metadata_field("SWIR central wavelengths", "List_Cw_Swir")?,
    );
    references.insert(
        SwirCentralWavelengthFlags,
        ReferenceDefinition::root_metadata_field("SWIR central wavelength flags", "List_Cw_Swir_Flags")?,
    );
    references.insert(
        SwirFwhmList,
        ReferenceDefinition::root_metadata_field("SWIR band FWHMs", "List_Fwhm_Swir")?,
    );
    references.insert(
        VnirCentralWavelengthList,
        ReferenceDefinition::root_metadata_field("VNIR central wavelengths", "List_Cw_Vnir")?,
    );
    references.insert(
        VnirCentralWavelengthFlags,
        ReferenceDefinition::root_metadata_field("VNIR central wavelength flags", "List_Cw_Vnir_Flags")?,
    );
    references.insert(
        VnirFwhmList,
        ReferenceDefinition::root_metadata_field("VNIR band FWHMs", "List_Fwhm_Vnir")?,
    );
    references.insert(
        L2ScaleMaxSwir,
        ReferenceDefinition::root_metadata_field("SWIR L2 scale maximum", "L2ScaleSwirMax")?,
    );
    references.insert(
        L2ScaleMinSwir,
        ReferenceDefinition::root_metadata_field("SWIR L2 scale minimum", "L2ScaleSwirMin")?,
    );
    references.insert(
        L2ScaleMaxVnir,
        ReferenceDefinition::root_metadata_field("VNIR L2 scale maximum", "L2ScaleVnirMax")?,
    );
    references.insert(
        L2ScaleMinVnir,
        ReferenceDefinition::root_metadata_field("VNIR L2 scale minimum", "L2ScaleVnirMin")?,
    );
    references.insert(
        Latitude,
        ReferenceDefinition::file_reference("Pixel latitudes", &geolocation_field("Latitude"))?,
    );
    references.insert(
        Longitude,
        ReferenceDefinition::file_reference("Pixel longitudes", &geolocation_field("Longitude"))?,
    );

    Ok(Template::new(TemplateIdentifier::PrismaHyperspectral, references))
}

fn build_landsat_thermal() -> AllotropeResult<Template<ThermalComponent>> {
    use ThermalComponent::*;

    let mut references = BTreeMap::new();
    references.insert(
        CoordinateReferenceSystem,
        ReferenceDefinition::direct_property("Coordinate reference system of the thermal band", "crs")?,
    );
    references.insert(
        AreaOrPoint,
        ReferenceDefinition::direct_property("Pixel interpretation", "AREA_OR_POINT")?,
    );
    references.insert(
        Bounds,
        ReferenceDefinition::direct_property("Bounds of the raster in its native CRS", "bounds")?,
    );
    references.insert(
        Transform,
        ReferenceDefinition::direct_property("Affine geotransform", "transform")?,
    );
    references.insert(
        Width,
        ReferenceDefinition::direct_property("Width of the raster", "width")?,
    );
    references.insert(
        Height,
        ReferenceDefinition::direct_property("Height of the raster", "height")?,
    );

    Ok(Template::new(TemplateIdentifier::LandsatThermal, references))
}
