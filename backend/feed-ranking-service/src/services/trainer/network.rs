//! Compact feed-forward network for per-user relevance scoring.
//!
//! Topology is fixed: 11 inputs, hidden layers of 18/10/6, one sigmoid
//! output. Training is plain stochastic gradient descent with
//! mean-squared-error loss, stopping at a target error or an iteration
//! cap, whichever comes first.
//!
//! The serialized form is a layer list of weight/bias arrays. That shape
//! is the persistence contract for the ranking model cache; it is not
//! tied to any external model format.

use super::TrainingExample;
use crate::error::{AppError, Result};
use crate::services::features::FEATURE_DIM;
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Hidden layer widths between the feature input and the scalar output.
pub const HIDDEN_LAYERS: [usize; 3] = [18, 10, 6];

/// Gradient-descent hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_iterations: u32,
    pub target_error: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            max_iterations: 1000,
            target_error: 0.005,
        }
    }
}

/// Outcome of one training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingReport {
    /// Mean squared error over the set after the final iteration.
    pub error: f64,
    /// Iterations actually performed.
    pub iterations: u32,
}

#[derive(Debug, Clone)]
struct Layer {
    /// Row-major (output × input) weight matrix.
    weights: Array2<f64>,
    biases: Array1<f64>,
}

/// Serialized network: the cache persistence contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModel {
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    layers: Vec<Layer>,
}

impl FeedForwardNetwork {
    /// Fresh network with uniform random weights in [-0.5, 0.5].
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut sizes = vec![FEATURE_DIM];
        sizes.extend_from_slice(&HIDDEN_LAYERS);
        sizes.push(1);

        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (input, output) = (pair[0], pair[1]);
                Layer {
                    weights: Array2::from_shape_fn((output, input), |_| rng.gen_range(-0.5..0.5)),
                    biases: Array1::from_shape_fn(output, |_| rng.gen_range(-0.5..0.5)),
                }
            })
            .collect();

        Self { layers }
    }

    /// Score one feature vector; output is in (0, 1).
    pub fn predict(&self, features: &[f64; FEATURE_DIM]) -> f64 {
        let activations = self.forward(Array1::from_iter(features.iter().copied()));
        activations.last().map(|out| out[0]).unwrap_or(0.0)
    }

    /// Forward pass keeping every layer's activation (index 0 = input).
    fn forward(&self, input: Array1<f64>) -> Vec<Array1<f64>> {
        let mut activations = vec![input];
        for layer in &self.layers {
            let prev = activations.last().expect("input activation present");
            let z = layer.weights.dot(prev) + &layer.biases;
            activations.push(z.mapv(sigmoid));
        }
        activations
    }

    /// Train with per-example SGD. One iteration is a full pass over the
    /// set; stops early once the mean squared error drops to the target.
    pub fn train(&mut self, examples: &[TrainingExample], config: &TrainingConfig) -> TrainingReport {
        let mut report = TrainingReport {
            error: f64::MAX,
            iterations: 0,
        };

        for iteration in 1..=config.max_iterations {
            let mut squared_error_sum = 0.0;

            for example in examples {
                let input = Array1::from_iter(example.features.iter().copied());
                let activations = self.forward(input);
                let output = activations.last().expect("output activation present")[0];
                let error = output - example.label;
                squared_error_sum += error * error;

                self.backpropagate(&activations, error, config.learning_rate);
            }

            report.error = squared_error_sum / examples.len().max(1) as f64;
            report.iterations = iteration;

            if report.error <= config.target_error {
                break;
            }
        }

        report
    }

    /// One SGD update from a single example's cached activations.
    fn backpropagate(&mut self, activations: &[Array1<f64>], output_error: f64, learning_rate: f64) {
        // Output delta through the sigmoid derivative.
        let output = activations.last().expect("output activation present");
        let mut delta = Array1::from_elem(1, output_error * output[0] * (1.0 - output[0]));

        for layer_idx in (0..self.layers.len()).rev() {
            let upstream = &activations[layer_idx];

            let weight_grad =
                Array2::from_shape_fn(self.layers[layer_idx].weights.dim(), |(i, j)| {
                    delta[i] * upstream[j]
                });

            // Delta for the next-lower layer, before this layer's weights move.
            let next_delta = if layer_idx > 0 {
                let propagated = self.layers[layer_idx].weights.t().dot(&delta);
                Some(Array1::from_shape_fn(upstream.len(), |j| {
                    propagated[j] * upstream[j] * (1.0 - upstream[j])
                }))
            } else {
                None
            };

            let layer = &mut self.layers[layer_idx];
            layer.weights = &layer.weights - &(weight_grad * learning_rate);
            layer.biases = &layer.biases - &(&delta * learning_rate);

            if let Some(d) = next_delta {
                delta = d;
            }
        }
    }

    pub fn to_serialized(&self) -> SerializedModel {
        SerializedModel {
            layers: self
                .layers
                .iter()
                .map(|layer| SerializedLayer {
                    weights: layer
                        .weights
                        .outer_iter()
                        .map(|row| row.to_vec())
                        .collect(),
                    biases: layer.biases.to_vec(),
                })
                .collect(),
        }
    }

    /// Rebuild from the serialized form. Callers are expected to have run
    /// [`validate_shape`] first; this still refuses malformed input.
    pub fn from_serialized(model: &SerializedModel) -> Result<Self> {
        if !validate_shape(model) {
            return Err(AppError::Serialization(
                "serialized model failed shape validation".to_string(),
            ));
        }

        let layers = model
            .layers
            .iter()
            .map(|layer| {
                let rows = layer.weights.len();
                let cols = layer.weights[0].len();
                let flat: Vec<f64> = layer.weights.iter().flatten().copied().collect();
                let weights = Array2::from_shape_vec((rows, cols), flat)
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                Ok(Layer {
                    weights,
                    biases: Array1::from_vec(layer.biases.clone()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layers })
    }
}

/// Structural shape check for a serialized model: the layer chain must run
/// from the feature dimension to a single output, with every weight row
/// matching the upstream width and every bias matching its layer width.
pub fn validate_shape(model: &SerializedModel) -> bool {
    if model.layers.is_empty() {
        return false;
    }

    let mut upstream = FEATURE_DIM;
    for layer in &model.layers {
        let output = layer.weights.len();
        if output == 0 || layer.biases.len() != output {
            return false;
        }
        if layer.weights.iter().any(|row| row.len() != upstream) {
            return false;
        }
        upstream = output;
    }

    upstream == 1
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
