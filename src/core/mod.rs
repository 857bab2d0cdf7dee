//! Core processing modules

pub mod cube;
pub mod transform;
pub mod temperature;
pub mod reflectance;
pub mod gaussian_mixture;
pub mod cloud_masker;
pub mod patch_plan;
pub mod dataset_builder;
pub mod hyperspectral_builder;
pub mod thermal_builder;

// Re-export main types
pub use cube::{Cube, CubeOperations, CubeRepresentation, LogicalAxis, OutputForm};
pub use transform::{DataTransformer, DigitalNumber, Transformation};
pub use temperature::Lc09StTransformer;
pub use reflectance::{FamilyScaleFactors, PrsL2dReflectanceTransformer, ReflectanceOptions, ScaleFactor};
pub use gaussian_mixture::{GaussianMixture, GaussianMixtureParams};
pub use cloud_masker::{AdaptiveCloudMaskerResponse, B10AdaptiveCloudMasker, CloudMaskerConfiguration};
pub use patch_plan::{PatchPlanGenerator, PatchRequest, PatchingPlan};
pub use dataset_builder::{DatasetBuilder, VendableHyperspectralDataset, VendableThermalDataset};
pub use hyperspectral_builder::PrismaDatasetBuilder;
pub use thermal_builder::LandsatDatasetBuilder;
