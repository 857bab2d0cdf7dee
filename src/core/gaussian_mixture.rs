//! One-dimensional Gaussian mixture fitted by expectation maximisation

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ComputeDevice;
use crate::types::{AllotropeError, AllotropeResult};

const LN_2PI: f64 = 1.837_877_066_409_345_5;
/// Samples per chunk when accumulating sufficient statistics
const CHUNK_SIZE: usize = 8192;
/// Responsibility mass below which a component keeps its previous moments
const VANISHING_MASS: f64 = 1e-8;

/// EM parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianMixtureParams {
    /// Non-negative regularization added to every variance
    pub reg_covar: f64,
    /// Convergence threshold on the mean log-likelihood gain
    pub tol: f64,
    pub max_iter: usize,
    pub device: ComputeDevice,
}

impl Default for GaussianMixtureParams {
    fn default() -> Self {
        Self {
            reg_covar: 1e-6,
            tol: 1e-3,
            max_iter: 100,
            device: ComputeDevice::default(),
        }
    }
}

/// A fitted mixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianMixture {
    weights: Vec<f64>,
    means: Vec<f64>,
    variances: Vec<f64>,
    converged: bool,
    n_iter: usize,
    /// Mean log-likelihood at the last E-step
    lower_bound: f64,
}

/// Per-component sums of responsibilities and their first two moments
#[derive(Debug, Clone)]
struct SufficientStatistics {
    mass: Vec<f64>,
    first: Vec<f64>,
    second: Vec<f64>,
    log_likelihood: f64,
}

impl SufficientStatistics {
    fn zeros(components: usize) -> Self {
        Self {
            mass: vec![0.0; components],
            first: vec![0.0; components],
            second: vec![0.0; components],
            log_likelihood: 0.0,
        }
    }

    fn merge(mut self, other: &SufficientStatistics) -> Self {
        for k in 0..self.mass.len() {
            self.mass[k] += other.mass[k];
            self.first[k] += other.first[k];
            self.second[k] += other.second[k];
        }
        self.log_likelihood += other.log_likelihood;
        self
    }
}

impl GaussianMixture {
    /// Fit a mixture with one component per entry of `means_init`.
    ///
    /// The first E-step uses the supplied means with equal weights and the
    /// shared sample variance.
    pub fn fit(
        samples: &[f64],
        means_init: &[f64],
        params: &GaussianMixtureParams,
    ) -> AllotropeResult<Self> {
        let n_components = means_init.len();
        if n_components == 0 {
            return Err(AllotropeError::InvalidData(
                "Mixture needs at least one component".to_string(),
            ));
        }
        if samples.len() < n_components {
            return Err(AllotropeError::InvalidData(format!(
                "Expected n_samples >= n_components but got n_components = {}, n_samples = {}",
                n_components,
                samples.len()
            )));
        }
        if samples.iter().any(|x| !x.is_finite()) {
            return Err(AllotropeError::InvalidData(
                "Mixture samples must be finite".to_string(),
            ));
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let mut model = Self {
            weights: vec![1.0 / n_components as f64; n_components],
            means: means_init.to_vec(),
            variances: vec![variance + params.reg_covar; n_components],
            converged: false,
            n_iter: 0,
            lower_bound: f64::NEG_INFINITY,
        };

        log::debug!(
            "Fitting {}-component mixture on {} samples from means {:?}",
            n_components,
            samples.len(),
            means_init
        );

        for iteration in 1..=params.max_iter {
            let previous = model.lower_bound;
            let stats = model.expectation(samples, params.device);
            model.maximization(&stats, n, params.reg_covar);
            model.lower_bound = stats.log_likelihood / n;
            model.n_iter = iteration;

            if (model.lower_bound - previous).abs() < params.tol {
                model.converged = true;
                break;
            }
        }

        if !model.converged {
            log::warn!(
                "Mixture did not converge after {} iterations (lower bound {:.6})",
                model.n_iter,
                model.lower_bound
            );
        }
        log::debug!("Fitted means {:?}, weights {:?}", model.means, model.weights);
        Ok(model)
    }

    fn expectation(&self, samples: &[f64], device: ComputeDevice) -> SufficientStatistics {
        let components = self.means.len();
        let chunk_statistics = |chunk: &[f64]| {
            let mut stats = SufficientStatistics::zeros(components);
            let mut log_prob = vec![0.0; components];
            for &x in chunk {
                let norm = self.weighted_log_prob_into(x, &mut log_prob);
                stats.log_likelihood += norm;
                for k in 0..components {
                    let r = (log_prob[k] - norm).exp();
                    stats.mass[k] += r;
                    stats.first[k] += r * x;
                    stats.second[k] += r * x * x;
                }
            }
            stats
        };

        // Chunk partials are reduced in order so the result is independent of scheduling
        let partials: Vec<SufficientStatistics> = match device {
            ComputeDevice::Parallel => samples.par_chunks(CHUNK_SIZE).map(chunk_statistics).collect(),
            ComputeDevice::Cpu => samples.chunks(CHUNK_SIZE).map(chunk_statistics).collect(),
        };
        partials
            .iter()
            .fold(SufficientStatistics::zeros(components), |acc, s| acc.merge(s))
    }

    fn maximization(&mut self, stats: &SufficientStatistics, n: f64, reg_covar: f64) {
        for k in 0..self.means.len() {
            let raw_mass = stats.mass[k];
            let mass = raw_mass + 10.0 * f64::EPSILON;
            self.weights[k] = mass / n;

            if raw_mass < VANISHING_MASS {
                continue;
            }
            let mean = stats.first[k] / mass;
            let spread = stats.second[k] - 2.0 * mean * stats.first[k] + mean * mean * raw_mass;
            self.means[k] = mean;
            self.variances[k] = (spread / mass).max(0.0) + reg_covar;
        }
    }

    /// Fill `out` with `ln(w_k) + ln N(x | mu_k, var_k)` and return their log-sum-exp
    fn weighted_log_prob_into(&self, x: f64, out: &mut [f64]) -> f64 {
        let mut max = f64::NEG_INFINITY;
        for k in 0..self.means.len() {
            let diff = x - self.means[k];
            out[k] = self.weights[k].ln()
                - 0.5 * (LN_2PI + self.variances[k].ln() + diff * diff / self.variances[k]);
            max = max.max(out[k]);
        }
        if max == f64::NEG_INFINITY {
            return max;
        }
        max + out.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
    }

    /// Most probable component for `x`
    pub fn predict(&self, x: f64) -> usize {
        let mut log_prob = vec![0.0; self.means.len()];
        self.weighted_log_prob_into(x, &mut log_prob);
        log_prob
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (k, &p)| if p > best.1 { (k, p) } else { best })
            .0
    }

    pub fn n_components(&self) -> usize {
        self.means.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }
}
