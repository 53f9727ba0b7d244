//! Diagonal-covariance Gaussian observation model, one density per senone.

use serde::{Deserialize, Serialize};

use super::{Frame, ObservationModel};
use crate::error::ScoringError;

const LN_2PI: f32 = 1.837_877_1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalGaussian {
    mean: Vec<f32>,
    /// Stored as `1 / (2σ²)`.
    precision: Vec<f32>,
    log_norm: f32,
}

impl DiagonalGaussian {
    /// `None` when dimensions differ or a variance is not strictly positive.
    pub fn new(mean: Vec<f32>, variance: Vec<f32>) -> Option<Self> {
        if mean.len() != variance.len() || variance.iter().any(|v| v.is_nan() || *v <= 0.0) {
            return None;
        }
        let log_norm = -0.5
            * variance
                .iter()
                .map(|v| LN_2PI + v.ln())
                .sum::<f32>();
        let precision = variance.iter().map(|v| 0.5 / v).collect();
        Some(Self {
            mean,
            precision,
            log_norm,
        })
    }

    /// Unit variance around `mean`.
    pub fn unit(mean: Vec<f32>) -> Self {
        let n = mean.len();
        Self {
            precision: vec![0.5; n],
            log_norm: -0.5 * LN_2PI * n as f32,
            mean,
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn log_density(&self, x: &[f32]) -> f32 {
        self.log_norm
            - self
                .mean
                .iter()
                .zip(&self.precision)
                .zip(x)
                .map(|((m, p), v)| (v - m) * (v - m) * p)
                .sum::<f32>()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaussianObservationModel {
    densities: Vec<DiagonalGaussian>,
}

impl GaussianObservationModel {
    pub fn new(densities: Vec<DiagonalGaussian>) -> Self {
        Self { densities }
    }

    /// Add a density and return its senone id.
    pub fn push(&mut self, density: DiagonalGaussian) -> u32 {
        self.densities.push(density);
        (self.densities.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }
}

impl ObservationModel for GaussianObservationModel {
    fn log_likelihood(&self, senone: u32, frame: &Frame) -> Result<f32, ScoringError> {
        let g = self
            .densities
            .get(senone as usize)
            .ok_or_else(|| ScoringError::Observation {
                senone,
                frame: frame.index,
                reason: "unknown senone".into(),
            })?;
        if g.dim() != frame.features.len() {
            return Err(ScoringError::Observation {
                senone,
                frame: frame.index,
                reason: format!(
                    "feature dimension {} does not match density dimension {}",
                    frame.features.len(),
                    g.dim()
                ),
            });
        }
        Ok(g.log_density(&frame.features))
    }
}
