//! Adaptive cloud masking for Landsat B10 surface temperature scenes.
//!
//! The scene's temperature distribution is summarised by percentiles, a
//! five-component Gaussian mixture is anchored at physically motivated
//! temperatures, and components that sit well below the scene median are
//! declared cloud.

use ndarray::{Array3, Zip};
use rand::Rng;

use crate::config::ComputeDevice;
use crate::core::cube::Cube;
use crate::core::gaussian_mixture::{GaussianMixture, GaussianMixtureParams};
use crate::types::{AllotropeError, AllotropeResult};

pub const DEFAULT_COMPONENT_COUNT: usize = 5;
/// Percentile above which training samples are discarded
pub const TRAINING_CLIP_PERCENTILE: f64 = 95.0;
/// Degrees below the scene median under which a component is cloud
pub const CLOUD_MEDIAN_OFFSET: f64 = 12.0;
/// Label given to masked or non-finite pixels
pub const INVALID_LABEL: i8 = -1;

/// Parameters fixed by `configure`
#[derive(Debug, Clone, PartialEq)]
pub struct CloudMaskerConfiguration {
    pub expansive_percentiles: [f64; 5],
    pub restrictive_percentiles: [f64; 3],
    /// A P2 below this temperature signals significant cloud cover
    pub significant_cloud_potential_in_celsius: f64,
    pub physical_cloud_threshold_in_celsius: f64,
    pub sampling_ratio: f64,
}

impl CloudMaskerConfiguration {
    fn new(sampling_ratio: f64) -> AllotropeResult<Self> {
        if !(sampling_ratio > 0.0 && sampling_ratio <= 1.0) {
            return Err(AllotropeError::Config(format!(
                "Sampling ratio must be in (0, 1], got {}",
                sampling_ratio
            )));
        }
        Ok(Self {
            expansive_percentiles: [2.0, 8.0, 50.0, 92.0, 98.0],
            restrictive_percentiles: [2.0, 8.0, 50.0],
            significant_cloud_potential_in_celsius: 0.0,
            physical_cloud_threshold_in_celsius: 30.0,
            sampling_ratio,
        })
    }
}

#[derive(Debug, Clone)]
struct TrainedMasker {
    configuration: CloudMaskerConfiguration,
    scene_percentiles: [f64; 5],
    anchors: Vec<f64>,
    sample_count: usize,
    model: GaussianMixture,
}

#[derive(Debug, Clone)]
enum MaskerState {
    Unconfigured,
    Configured(CloudMaskerConfiguration),
    Trained(TrainedMasker),
}

/// Result of a cloud-mask prediction
#[derive(Debug, Clone)]
pub struct AdaptiveCloudMaskerResponse {
    /// `true` where a pixel is cloud; shaped like the input
    pub cloud_mask: Array3<bool>,
    /// Mixture component per pixel, [`INVALID_LABEL`] where excluded
    pub labels: Array3<i8>,
    pub n_components: usize,
    pub model: GaussianMixture,
    pub anchors: Vec<f64>,
    pub pixels_masked: usize,
    /// Expansive percentiles of the training scene
    pub scene_percentiles: [f64; 5],
    /// Means below this temperature are cloud
    pub threshold: f64,
    pub cloud_components: Vec<usize>,
}

/// Gaussian-mixture cloud masker for temperature cubes in Celsius
#[derive(Debug, Clone)]
pub struct B10AdaptiveCloudMasker {
    state: MaskerState,
    params: GaussianMixtureParams,
}

impl B10AdaptiveCloudMasker {
    pub fn new(device: ComputeDevice) -> Self {
        Self {
            state: MaskerState::Unconfigured,
            params: GaussianMixtureParams {
                device,
                ..GaussianMixtureParams::default()
            },
        }
    }

    pub fn with_params(params: GaussianMixtureParams) -> Self {
        Self {
            state: MaskerState::Unconfigured,
            params,
        }
    }

    /// Fix percentiles, physical references and the sampling ratio.
    ///
    /// Reconfiguring discards any trained model.
    pub fn configure(&mut self, sampling_ratio: f64) -> AllotropeResult<()> {
        let configuration = CloudMaskerConfiguration::new(sampling_ratio)?;
        log::debug!("Cloud masker configured: {:?}", configuration);
        self.state = MaskerState::Configured(configuration);
        Ok(())
    }

    pub fn configuration(&self) -> Option<&CloudMaskerConfiguration> {
        match &self.state {
            MaskerState::Unconfigured => None,
            MaskerState::Configured(configuration) => Some(configuration),
            MaskerState::Trained(trained) => Some(&trained.configuration),
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, MaskerState::Trained(_))
    }

    /// Train with a thread-local entropy source
    pub fn train(&mut self, cube: &Cube<f32>) -> AllotropeResult<()> {
        self.train_with_rng(cube, &mut rand::thread_rng())
    }

    /// Train, drawing the subsample from `rng`
    pub fn train_with_rng<R: Rng + ?Sized>(
        &mut self,
        cube: &Cube<f32>,
        rng: &mut R,
    ) -> AllotropeResult<()> {
        let configuration = match &self.state {
            MaskerState::Unconfigured => {
                return Err(AllotropeError::State(
                    "Model has not been configured; call configure before train".to_string(),
                ))
            }
            MaskerState::Configured(configuration) => configuration.clone(),
            MaskerState::Trained(trained) => trained.configuration.clone(),
        };

        let mut valid_pixels = valid_pixels(cube);
        if valid_pixels.is_empty() {
            return Err(AllotropeError::InvalidData(
                "No valid pixels to train the cloud masker on".to_string(),
            ));
        }
        valid_pixels.sort_by(|a, b| a.total_cmp(b));
        log::info!("Training cloud masker on {} valid pixels", valid_pixels.len());

        // Scene physics
        let mut scene_percentiles = [0.0; 5];
        for (slot, &p) in scene_percentiles.iter_mut().zip(&configuration.expansive_percentiles) {
            *slot = percentile(&valid_pixels, p);
        }
        log::debug!("Scene percentiles {:?}: {:?}", configuration.expansive_percentiles, scene_percentiles);

        // High temperature clip keeps anomalies from poisoning the cloud means
        let p95 = percentile(&valid_pixels, TRAINING_CLIP_PERCENTILE);
        let clip = valid_pixels.partition_point(|&v| v <= p95);
        let training_data = &valid_pixels[..clip];

        let anchors = if scene_percentiles[0] < configuration.significant_cloud_potential_in_celsius {
            scene_percentiles.to_vec()
        } else {
            // Force cold anchors for ice and warm clouds even when P2/P8 are warm
            vec![-10.0, 5.0, scene_percentiles[2], scene_percentiles[3], scene_percentiles[4]]
        };

        let sample_count = (training_data.len() as f64 * configuration.sampling_ratio).floor() as usize;
        log::info!("Sample count set to: {}", sample_count);
        if sample_count < DEFAULT_COMPONENT_COUNT {
            return Err(AllotropeError::InvalidData(format!(
                "Sample count {} is smaller than the {} mixture components",
                sample_count, DEFAULT_COMPONENT_COUNT
            )));
        }

        let sampled: Vec<f64> = rand::seq::index::sample(rng, training_data.len(), sample_count)
            .iter()
            .map(|index| training_data[index])
            .collect();

        let model = GaussianMixture::fit(&sampled, &anchors, &self.params)?;
        log::info!(
            "Cloud masker trained: {} components, converged={}, {} iterations",
            model.n_components(),
            model.converged(),
            model.n_iter()
        );

        self.state = MaskerState::Trained(TrainedMasker {
            configuration,
            scene_percentiles,
            anchors,
            sample_count,
            model,
        });
        Ok(())
    }

    /// Label every valid pixel and flag the cold components as cloud
    pub fn predict(&self, cube: &Cube<f32>) -> AllotropeResult<AdaptiveCloudMaskerResponse> {
        let trained = match &self.state {
            MaskerState::Trained(trained) => trained,
            _ => {
                return Err(AllotropeError::State(
                    "Model has not yet been fit; call train before predict".to_string(),
                ))
            }
        };

        let model = &trained.model;
        let threshold = trained.scene_percentiles[2] - CLOUD_MEDIAN_OFFSET;
        let cloud_components: Vec<usize> = model
            .means()
            .iter()
            .enumerate()
            .filter(|(_, &mean)| mean < threshold)
            .map(|(k, _)| k)
            .collect();
        log::debug!(
            "Dynamic threshold {:.3}, cloud components {:?}",
            threshold,
            cloud_components
        );

        let label = |value: f32, masked: bool| -> i8 {
            if masked || !value.is_finite() {
                INVALID_LABEL
            } else {
                model.predict(f64::from(value)) as i8
            }
        };
        let labels = match (cube.mask(), self.params.device) {
            (Some(mask), ComputeDevice::Parallel) => Zip::from(cube.data())
                .and(mask)
                .par_map_collect(|&v, &m| label(v, m)),
            (Some(mask), ComputeDevice::Cpu) => Zip::from(cube.data())
                .and(mask)
                .map_collect(|&v, &m| label(v, m)),
            (None, ComputeDevice::Parallel) => Zip::from(cube.data()).par_map_collect(|&v| label(v, false)),
            (None, ComputeDevice::Cpu) => Zip::from(cube.data()).map_collect(|&v| label(v, false)),
        };

        let cloud_mask = labels.mapv(|l| l >= 0 && cloud_components.contains(&(l as usize)));
        let pixels_masked = cloud_mask.iter().filter(|&&c| c).count();
        log::info!(
            "Cloud masker flagged {} of {} pixels (sampled {} for training)",
            pixels_masked,
            cloud_mask.len(),
            trained.sample_count
        );

        Ok(AdaptiveCloudMaskerResponse {
            cloud_mask,
            labels,
            n_components: model.n_components(),
            model: model.clone(),
            anchors: trained.anchors.clone(),
            pixels_masked,
            scene_percentiles: trained.scene_percentiles,
            threshold,
            cloud_components,
        })
    }
}

impl Default for B10AdaptiveCloudMasker {
    fn default() -> Self {
        Self::new(ComputeDevice::default())
    }
}

/// Finite values at unmasked positions
fn valid_pixels(cube: &Cube<f32>) -> Vec<f64> {
    match cube.mask() {
        Some(mask) => cube
            .data()
            .iter()
            .zip(mask.iter())
            .filter(|(v, &m)| !m && v.is_finite())
            .map(|(&v, _)| f64::from(v))
            .collect(),
        None => cube
            .data()
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| f64::from(v))
            .collect(),
    }
}

/// Linearly interpolated percentile of ascending `sorted` values
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cube::CubeRepresentation;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_percentile_matches_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(percentile(&values, 50.0), 2.5);
        assert_abs_diff_eq!(percentile(&values, 0.0), 1.0);
        assert_abs_diff_eq!(percentile(&values, 100.0), 4.0);
        assert_abs_diff_eq!(percentile(&values, 2.0), 1.06, epsilon = 1e-12);
    }

    #[test]
    fn test_state_machine_order() {
        let cube = Cube::dense(Array3::<f32>::from_elem((1, 4, 4), 30.0), CubeRepresentation::Bsq);
        let mut masker = B10AdaptiveCloudMasker::new(ComputeDevice::Cpu);

        assert!(matches!(masker.train(&cube), Err(AllotropeError::State(_))));
        assert!(matches!(masker.predict(&cube), Err(AllotropeError::State(_))));
        assert!(matches!(masker.configure(0.0), Err(AllotropeError::Config(_))));
        assert!(matches!(masker.configure(1.5), Err(AllotropeError::Config(_))));

        masker.configure(0.5).unwrap();
        assert!(matches!(masker.predict(&cube), Err(AllotropeError::State(_))));
        assert_eq!(masker.configuration().unwrap().expansive_percentiles, [2.0, 8.0, 50.0, 92.0, 98.0]);
    }

    #[test]
    fn test_too_few_samples_is_invalid_data() {
        let cube = Cube::dense(Array3::<f32>::from_elem((1, 2, 2), 30.0), CubeRepresentation::Bsq);
        let mut masker = B10AdaptiveCloudMasker::new(ComputeDevice::Cpu);
        masker.configure(0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            masker.train_with_rng(&cube, &mut rng),
            Err(AllotropeError::InvalidData(_))
        ));
        assert!(!masker.is_trained());
    }
}
