//! HE5 store backed by the HDF5 C library

use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Container, File, Group, Location};
use ndarray::{Array2, Array3, Ix2, Ix3};
use std::path::Path;

use crate::config::FileSourceConfig;
use crate::io::he5::{He5Helper, He5Store};
use crate::io::{
    partition_attributes, AttributeValue, Attributes, ComponentKind, He5ComponentMetadata,
    UndecodedAttributes,
};
use crate::types::{AllotropeError, AllotropeResult};

/// Read-only handle on an HE5 file
pub struct Hdf5Store {
    file: File,
}

impl Hdf5Store {
    pub fn open<P: AsRef<Path>>(path: P) -> AllotropeResult<Self> {
        log::debug!("Opening HDF5 file {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Ok(Self { file })
    }

    fn visit(&self, group: &Group, prefix: &str, paths: &mut Vec<String>) -> AllotropeResult<()> {
        for name in group.member_names()? {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            paths.push(path.clone());
            if let Ok(child) = group.group(&name) {
                self.visit(&child, &path, paths)?;
            }
        }
        Ok(())
    }
}

impl He5Helper<Hdf5Store> {
    /// Open an HE5 product from disk
    pub fn open(source: FileSourceConfig) -> AllotropeResult<Self> {
        let store = Hdf5Store::open(&source.source_path)?;
        He5Helper::new(source, store)
    }
}

/// Decode every attribute on `location`, keeping failures apart from the decoded values
fn clean_attributes(location: &Location) -> AllotropeResult<(Attributes, UndecodedAttributes)> {
    let mut decoded = Vec::new();
    for name in location.attr_names()? {
        let attr = location.attr(&name)?;
        let value = decode_attribute(&attr);
        decoded.push((name, value));
    }
    Ok(partition_attributes(decoded))
}

fn decode_attribute(container: &Container) -> AllotropeResult<Option<AttributeValue>> {
    let descriptor = container.dtype()?.to_descriptor()?;
    let scalar = container.is_scalar();

    let value = match descriptor {
        TypeDescriptor::Float(_) if scalar => Some(AttributeValue::Float(container.read_scalar::<f64>()?)),
        TypeDescriptor::Float(_) => Some(AttributeValue::FloatList(container.read_raw::<f64>()?)),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) if scalar => {
            Some(AttributeValue::Int(container.read_scalar::<i64>()?))
        }
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            Some(AttributeValue::IntList(container.read_raw::<i64>()?))
        }
        TypeDescriptor::VarLenAscii if scalar => Some(AttributeValue::Text(
            container.read_scalar::<VarLenAscii>()?.as_str().to_string(),
        )),
        TypeDescriptor::VarLenUnicode if scalar => Some(AttributeValue::Text(
            container.read_scalar::<VarLenUnicode>()?.as_str().to_string(),
        )),
        _ => None,
    };
    Ok(value)
}

impl He5Store for Hdf5Store {
    fn root_attributes(&self) -> AllotropeResult<Attributes> {
        Ok(clean_attributes(&self.file)?.0)
    }

    fn undecoded_root_attributes(&self) -> AllotropeResult<UndecodedAttributes> {
        Ok(clean_attributes(&self.file)?.1)
    }

    fn component_paths(&self) -> AllotropeResult<Vec<String>> {
        let mut paths = Vec::new();
        self.visit(&self.file, "", &mut paths)?;
        Ok(paths)
    }

    fn component_metadata(&self, path: &str) -> AllotropeResult<He5ComponentMetadata> {
        if let Ok(dataset) = self.file.dataset(path) {
            let shape = dataset.shape();
            return Ok(He5ComponentMetadata {
                kind: ComponentKind::Dataset,
                is_scalar: shape.is_empty(),
                shape,
                attributes: clean_attributes(&dataset)?.0,
            });
        }
        let group = self
            .file
            .group(path)
            .map_err(|_| AllotropeError::Lookup(format!("Path {} not found in the file", path)))?;
        Ok(He5ComponentMetadata {
            kind: ComponentKind::Group,
            shape: Vec::new(),
            is_scalar: false,
            attributes: clean_attributes(&group)?.0,
        })
    }

    fn read_u16_cube(&self, path: &str) -> AllotropeResult<Array3<u16>> {
        Ok(self.file.dataset(path)?.read::<u16, Ix3>()?)
    }

    fn read_u8_cube(&self, path: &str) -> AllotropeResult<Array3<u8>> {
        Ok(self.file.dataset(path)?.read::<u8, Ix3>()?)
    }

    fn read_f32_grid(&self, path: &str) -> AllotropeResult<Array2<f32>> {
        Ok(self.file.dataset(path)?.read::<f32, Ix2>()?)
    }
}
