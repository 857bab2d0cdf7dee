//! HE5 (HDF-EOS5) access for hyperspectral products

use ndarray::{Array2, Array3, Axis};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{FileCategory, FileSourceConfig};
use crate::core::cube::{Cube, CubeRepresentation};
use crate::io::templates::{HyperspectralFileComponent, Template, TemplateIdentifier};
use crate::io::{
    AttributeValue, Attributes, ComponentKind, ExtractionMode, FileHelper, He5ComponentMetadata,
    He5Metadata, HyperspectralFileHelper, UndecodedAttributes,
};
use crate::types::{AllotropeError, AllotropeResult, Product, SpectralFamily};

/// Provider fill value for hyperspectral cubes
pub const HE5_MASKED_PIXEL_VALUE: u16 = 0;

/// Read access to a hierarchical HE5 container
pub trait He5Store {
    fn root_attributes(&self) -> AllotropeResult<Attributes>;

    /// Root attributes that exist but could not be decoded, with the reason
    fn undecoded_root_attributes(&self) -> AllotropeResult<UndecodedAttributes> {
        Ok(UndecodedAttributes::new())
    }

    /// Every group and dataset path, parents before children
    fn component_paths(&self) -> AllotropeResult<Vec<String>>;

    fn component_metadata(&self, path: &str) -> AllotropeResult<He5ComponentMetadata>;

    fn read_u16_cube(&self, path: &str) -> AllotropeResult<Array3<u16>>;

    fn read_u8_cube(&self, path: &str) -> AllotropeResult<Array3<u8>>;

    fn read_f32_grid(&self, path: &str) -> AllotropeResult<Array2<f32>>;
}

/// A dataset held by [`MemoryHe5Store`]
#[derive(Debug, Clone, PartialEq)]
pub enum He5Dataset {
    U16(Array3<u16>),
    U8(Array3<u8>),
    F32(Array2<f32>),
}

impl He5Dataset {
    fn shape(&self) -> Vec<usize> {
        match self {
            He5Dataset::U16(a) => a.shape().to_vec(),
            He5Dataset::U8(a) => a.shape().to_vec(),
            He5Dataset::F32(a) => a.shape().to_vec(),
        }
    }
}

/// In-memory HE5 container, used for staged data and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryHe5Store {
    root_attributes: Attributes,
    undecoded_root_attributes: UndecodedAttributes,
    datasets: BTreeMap<String, He5Dataset>,
    attributes: BTreeMap<String, Attributes>,
}

impl MemoryHe5Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.root_attributes.insert(name.to_string(), value);
        self
    }

    /// Stage a root attribute that the store reports as undecodable
    pub fn with_undecoded_root_attribute(mut self, name: &str, reason: &str) -> Self {
        self.undecoded_root_attributes
            .insert(name.to_string(), reason.to_string());
        self
    }

    pub fn with_dataset(mut self, path: &str, dataset: He5Dataset) -> Self {
        self.datasets.insert(path.to_string(), dataset);
        self
    }

    pub fn with_component_attribute(mut self, path: &str, name: &str, value: AttributeValue) -> Self {
        self.attributes
            .entry(path.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    fn groups(&self) -> BTreeSet<String> {
        let mut groups = BTreeSet::new();
        for path in self.datasets.keys() {
            let mut prefix = String::new();
            let parts: Vec<&str> = path.split('/').collect();
            for part in &parts[..parts.len().saturating_sub(1)] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(part);
                groups.insert(prefix.clone());
            }
        }
        groups
    }

    fn dataset(&self, path: &str) -> AllotropeResult<&He5Dataset> {
        self.datasets
            .get(path)
            .ok_or_else(|| AllotropeError::Lookup(format!("Dataset {} not found", path)))
    }
}

impl He5Store for MemoryHe5Store {
    fn root_attributes(&self) -> AllotropeResult<Attributes> {
        Ok(self.root_attributes.clone())
    }

    fn undecoded_root_attributes(&self) -> AllotropeResult<UndecodedAttributes> {
        Ok(self.undecoded_root_attributes.clone())
    }

    fn component_paths(&self) -> AllotropeResult<Vec<String>> {
        let mut paths: Vec<String> = self.groups().into_iter().collect();
        paths.extend(self.datasets.keys().cloned());
        paths.sort();
        Ok(paths)
    }

    fn component_metadata(&self, path: &str) -> AllotropeResult<He5ComponentMetadata> {
        let attributes = self.attributes.get(path).cloned().unwrap_or_default();
        if let Some(dataset) = self.datasets.get(path) {
            let shape = dataset.shape();
            return Ok(He5ComponentMetadata {
                kind: ComponentKind::Dataset,
                is_scalar: shape.is_empty(),
                shape,
                attributes,
            });
        }
        if self.groups().contains(path) {
            return Ok(He5ComponentMetadata {
                kind: ComponentKind::Group,
                shape: Vec::new(),
                is_scalar: false,
                attributes,
            });
        }
        Err(AllotropeError::Lookup(format!("Path {} not found in the file", path)))
    }

    fn read_u16_cube(&self, path: &str) -> AllotropeResult<Array3<u16>> {
        match self.dataset(path)? {
            He5Dataset::U16(cube) => Ok(cube.clone()),
            _ => Err(AllotropeError::InvalidData(format!(
                "Dataset {} is not a u16 cube",
                path
            ))),
        }
    }

    fn read_u8_cube(&self, path: &str) -> AllotropeResult<Array3<u8>> {
        match self.dataset(path)? {
            He5Dataset::U8(cube) => Ok(cube.clone()),
            _ => Err(AllotropeError::InvalidData(format!(
                "Dataset {} is not a u8 cube",
                path
            ))),
        }
    }

    fn read_f32_grid(&self, path: &str) -> AllotropeResult<Array2<f32>> {
        match self.dataset(path)? {
            He5Dataset::F32(grid) => Ok(grid.clone()),
            _ => Err(AllotropeError::InvalidData(format!(
                "Dataset {} is not an f32 grid",
                path
            ))),
        }
    }
}

/// File helper for PRISMA L2D HE5 products.
///
/// Cubes come back in the provider's BIL layout `[H, C, W]`.
pub struct He5Helper<S: He5Store> {
    source: FileSourceConfig,
    product: Product,
    store: S,
    metadata: He5Metadata,
    template: &'static Template<HyperspectralFileComponent>,
}

impl<S: He5Store> He5Helper<S> {
    pub fn new(source: FileSourceConfig, store: S) -> AllotropeResult<Self> {
        if source.file_category != FileCategory::Hdfs {
            return Err(AllotropeError::Config(format!(
                "He5Helper requires an he5 source, got {:?} for {}",
                source.file_category,
                source.source_path.display()
            )));
        }

        let metadata = construct_metadata_structure(&store)?;
        log::info!(
            "Opened {} with {} components",
            source.source_path.display(),
            metadata.components.len()
        );

        Ok(Self {
            source,
            product: Product::Prisma,
            store,
            metadata,
            template: TemplateIdentifier::prisma_hyperspectral()?,
        })
    }

    pub fn source(&self) -> &FileSourceConfig {
        &self.source
    }

    pub fn product(&self) -> Product {
        self.product
    }

    /// Metadata of a dataset path; fails when the path is unknown or a group
    pub fn access_dataset(&self, path: &str) -> AllotropeResult<&He5ComponentMetadata> {
        if !self.metadata.components.iter().any(|c| c == path) {
            return Err(AllotropeError::Lookup(format!(
                "Path {} not found in the file",
                path
            )));
        }
        let component = self.metadata.component_metadata.get(path).ok_or_else(|| {
            AllotropeError::Lookup(format!("No metadata recorded for {}", path))
        })?;
        if component.kind != ComponentKind::Dataset {
            return Err(AllotropeError::Lookup(format!("Path {} is not a dataset", path)));
        }
        Ok(component)
    }

    /// Latitude and longitude grids of the swath
    pub fn geolocation_grids(&self) -> AllotropeResult<(Array2<f32>, Array2<f32>)> {
        let latitude = self.dataset_path(HyperspectralFileComponent::Latitude)?;
        let longitude = self.dataset_path(HyperspectralFileComponent::Longitude)?;
        let latitudes = self.store.read_f32_grid(latitude)?;
        let longitudes = self.store.read_f32_grid(longitude)?;
        if latitudes.shape() != longitudes.shape() {
            return Err(AllotropeError::Shape(format!(
                "Latitude grid {:?} and longitude grid {:?} disagree",
                latitudes.shape(),
                longitudes.shape()
            )));
        }
        Ok((latitudes, longitudes))
    }

    fn dataset_path(&self, component: HyperspectralFileComponent) -> AllotropeResult<&'static str> {
        let path = self.template.get(component)?.file_name()?;
        self.access_dataset(path)?;
        Ok(path)
    }
}

/// Select the requested channels from a BIL cube
fn select_bands<T: Clone>(
    raw: Array3<T>,
    bands: &[usize],
    mode: ExtractionMode,
    path: &str,
) -> AllotropeResult<Array3<T>> {
    match mode {
        ExtractionMode::All => Ok(raw),
        ExtractionMode::Specific => {
            let channels = raw.len_of(Axis(1));
            if let Some(&band) = bands.iter().find(|&&b| b >= channels) {
                return Err(AllotropeError::Lookup(format!(
                    "Band {} out of range for {} with {} channels",
                    band, path, channels
                )));
            }
            Ok(raw.select(Axis(1), bands))
        }
    }
}

fn construct_metadata_structure<S: He5Store>(store: &S) -> AllotropeResult<He5Metadata> {
    let root_metadata = store.root_attributes()?;
    let undecoded_root_metadata = store.undecoded_root_attributes()?;
    if !undecoded_root_metadata.is_empty() {
        log::warn!(
            "{} root attributes could not be decoded: {:?}",
            undecoded_root_metadata.len(),
            undecoded_root_metadata.keys().collect::<Vec<_>>()
        );
    }
    let components = store.component_paths()?;

    let mut component_metadata = BTreeMap::new();
    for path in &components {
        component_metadata.insert(path.clone(), store.component_metadata(path)?);
    }
    log::debug!(
        "Root metadata carries {} attributes over {} components",
        root_metadata.len(),
        components.len()
    );

    Ok(He5Metadata {
        components,
        component_metadata,
        root_metadata,
        undecoded_root_metadata,
    })
}

impl<S: He5Store> FileHelper for He5Helper<S> {
    type Metadata = He5Metadata;
    type Component = HyperspectralFileComponent;
    type Sample = u16;

    fn file_category(&self) -> FileCategory {
        self.source.file_category
    }

    fn file_metadata(&self) -> &He5Metadata {
        &self.metadata
    }

    fn template(&self) -> &Template<HyperspectralFileComponent> {
        self.template
    }

    fn extract_specific_bands(
        &self,
        bands: &[usize],
        masking_needed: bool,
        spectral_family: Option<SpectralFamily>,
        mode: ExtractionMode,
    ) -> AllotropeResult<Cube<u16>> {
        let family = spectral_family.ok_or_else(|| {
            AllotropeError::Lookup("Mapping key for spectral family not provided".to_string())
        })?;
        let path = self.dataset_path(HyperspectralFileComponent::cube_data(family)?)?;

        log::debug!("Extracting {} bands ({:?}) from {}", family, mode, path);
        let raw = select_bands(self.store.read_u16_cube(path)?, bands, mode, path)?;

        if masking_needed {
            let mask = raw.mapv(|dn| dn == HE5_MASKED_PIXEL_VALUE);
            Cube::masked(raw, mask, CubeRepresentation::Bil)
        } else {
            Ok(Cube::dense(raw, CubeRepresentation::Bil))
        }
    }
}

impl<S: He5Store> HyperspectralFileHelper for He5Helper<S> {
    fn extract_error_matrices(
        &self,
        bands: &[usize],
        spectral_family: SpectralFamily,
        mode: ExtractionMode,
    ) -> AllotropeResult<Cube<u8>> {
        let path = self.dataset_path(HyperspectralFileComponent::error_matrix(spectral_family)?)?;
        log::debug!("Extracting {} error matrix from {}", spectral_family, path);
        let raw = select_bands(self.store.read_u8_cube(path)?, bands, mode, path)?;
        Ok(Cube::dense(raw, CubeRepresentation::Bil))
    }
}
