//! Classifier architecture assembly
//!
//! Turns a small set of tunable knobs (layer widths, dropout rate, L2
//! penalty, optimizer) into a fully specified, compiled model description.
//! Every hidden block is Dense → BatchNorm → PReLU (→ Dropout when the rate
//! is positive), followed by a Dense classification head and a softmax. The
//! batch-norm sits between the linear transform and the activation so the
//! pre-activation statistics are what get normalized.
//!
//! Assembly is a one-shot pure transformation: same inputs, same
//! architecture, no state across calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nn::{LossFunction, OptimizerSpec};

/// Rejected hyperparameter configurations and dimensions.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("hidden_layers must contain at least one layer")]
    EmptyHiddenLayers,

    #[error("hidden layer {index} has zero width")]
    ZeroWidthLayer { index: usize },

    #[error("n_input must be positive")]
    ZeroInputDim,

    #[error("n_class must be at least 2, got {0}")]
    TooFewClasses(usize),

    #[error("dropout_rate must be within [0, 1], got {0}")]
    DropoutOutOfRange(f64),

    #[error("l2_penalty must be non-negative, got {0}")]
    NegativeL2(f64),

    #[error("first dense layer does not declare an input dimension")]
    MissingInputDim,
}

/// Tunable knobs for a classifier architecture.
///
/// These are the commonly tuned parameters; the activation function and the
/// dense/batch-norm/activation ordering are fixed design choices, not
/// hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterConfig {
    /// Widths of the hidden layers, in order. Must be non-empty.
    pub hidden_layers: Vec<usize>,
    /// Dropout rate in [0, 1]. A rate of 0 omits dropout layers entirely.
    pub dropout_rate: f64,
    /// L2 weight penalty applied to every hidden dense layer.
    pub l2_penalty: f64,
    /// Training method for the compiled model.
    pub optimizer: OptimizerSpec,
}

impl Default for HyperparameterConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 64, 64],
            dropout_rate: 0.0,
            l2_penalty: 0.1,
            optimizer: OptimizerSpec::adam(),
        }
    }
}

/// Fixed (non-tunable) activation choices in an assembled architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    /// Learned-slope rectified linear unit, one slope per channel.
    PReLU,
    /// Row-wise softmax producing a class-probability distribution.
    Softmax,
}

/// One layer of an assembled architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerSpec {
    Dense {
        width: usize,
        l2_penalty: f64,
        /// Only the first dense layer declares its input width; later
        /// layers infer it from the previous layer's output.
        input_dim: Option<usize>,
    },
    BatchNorm,
    Activation(ActivationKind),
    Dropout {
        rate: f64,
    },
}

/// Metrics tracked while a compiled model trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Accuracy,
}

/// The final artifact of model assembly: an ordered layer sequence plus the
/// loss, optimizer and metrics it was compiled with. Immutable once built;
/// [`crate::nn::Sequential::materialize`] turns it into a trainable network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModel {
    pub layers: Vec<LayerSpec>,
    pub loss: LossFunction,
    pub optimizer: OptimizerSpec,
    pub metrics: Vec<Metric>,
}

impl CompiledModel {
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of dropout layers in the architecture.
    pub fn num_dropout_layers(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| matches!(l, LayerSpec::Dropout { .. }))
            .count()
    }
}

/// Assemble and compile a feedforward classifier.
///
/// `n_input` is the feature count and `n_class` the number of target
/// classes; both are supplied by the caller rather than read from ambient
/// state so that repeated calls with different shapes cannot go stale.
///
/// For each hidden width, in order: a dense layer (the first one declares
/// `input_dim = n_input`, every one carries the L2 penalty), batch
/// normalization, then a PReLU activation, then dropout if the rate is
/// positive. The head is a dense layer of width `n_class` with no
/// regularization, followed by a softmax. Binary problems get binary
/// cross-entropy, anything with more than two classes gets categorical
/// cross-entropy.
pub fn build_classifier(
    config: &HyperparameterConfig,
    n_input: usize,
    n_class: usize,
) -> Result<CompiledModel, BuildError> {
    if config.hidden_layers.is_empty() {
        return Err(BuildError::EmptyHiddenLayers);
    }
    if let Some(index) = config.hidden_layers.iter().position(|&w| w == 0) {
        return Err(BuildError::ZeroWidthLayer { index });
    }
    if n_input == 0 {
        return Err(BuildError::ZeroInputDim);
    }
    if n_class < 2 {
        return Err(BuildError::TooFewClasses(n_class));
    }
    if !(0.0..=1.0).contains(&config.dropout_rate) {
        return Err(BuildError::DropoutOutOfRange(config.dropout_rate));
    }
    if config.l2_penalty < 0.0 {
        return Err(BuildError::NegativeL2(config.l2_penalty));
    }

    let mut layers = Vec::new();

    for (index, &width) in config.hidden_layers.iter().enumerate() {
        layers.push(LayerSpec::Dense {
            width,
            l2_penalty: config.l2_penalty,
            // only the first layer declares the feature count
            input_dim: (index == 0).then_some(n_input),
        });

        // batch norm goes between the linear transform and the activation
        layers.push(LayerSpec::BatchNorm);
        layers.push(LayerSpec::Activation(ActivationKind::PReLU));

        if config.dropout_rate > 0.0 {
            layers.push(LayerSpec::Dropout {
                rate: config.dropout_rate,
            });
        }
    }

    // Classification head: plain dense projection to class scores, then
    // softmax. No regularization or normalization on the head.
    layers.push(LayerSpec::Dense {
        width: n_class,
        l2_penalty: 0.0,
        input_dim: None,
    });
    layers.push(LayerSpec::Activation(ActivationKind::Softmax));

    let loss = if n_class > 2 {
        LossFunction::CategoricalCrossEntropy
    } else {
        LossFunction::BinaryCrossEntropy
    };

    Ok(CompiledModel {
        layers,
        loss,
        optimizer: config.optimizer,
        metrics: vec![Metric::Accuracy],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_block_ordering() {
        let config = HyperparameterConfig {
            hidden_layers: vec![32],
            dropout_rate: 0.2,
            ..Default::default()
        };
        let model = build_classifier(&config, 10, 3).unwrap();

        assert!(matches!(model.layers[0], LayerSpec::Dense { .. }));
        assert!(matches!(model.layers[1], LayerSpec::BatchNorm));
        assert!(matches!(
            model.layers[2],
            LayerSpec::Activation(ActivationKind::PReLU)
        ));
        assert!(matches!(model.layers[3], LayerSpec::Dropout { rate } if rate == 0.2));
    }

    #[test]
    fn test_head_has_no_regularization() {
        let config = HyperparameterConfig::default();
        let model = build_classifier(&config, 10, 4).unwrap();

        let head = &model.layers[model.num_layers() - 2];
        assert_eq!(
            *head,
            LayerSpec::Dense {
                width: 4,
                l2_penalty: 0.0,
                input_dim: None
            }
        );
        assert_eq!(
            model.layers[model.num_layers() - 1],
            LayerSpec::Activation(ActivationKind::Softmax)
        );
    }

    #[test]
    fn test_rejects_bad_configs() {
        let base = HyperparameterConfig::default();

        let empty = HyperparameterConfig {
            hidden_layers: vec![],
            ..base.clone()
        };
        assert_eq!(
            build_classifier(&empty, 10, 3),
            Err(BuildError::EmptyHiddenLayers)
        );

        let zero_width = HyperparameterConfig {
            hidden_layers: vec![64, 0],
            ..base.clone()
        };
        assert_eq!(
            build_classifier(&zero_width, 10, 3),
            Err(BuildError::ZeroWidthLayer { index: 1 })
        );

        let bad_dropout = HyperparameterConfig {
            dropout_rate: 1.5,
            ..base.clone()
        };
        assert_eq!(
            build_classifier(&bad_dropout, 10, 3),
            Err(BuildError::DropoutOutOfRange(1.5))
        );

        let bad_l2 = HyperparameterConfig {
            l2_penalty: -0.1,
            ..base.clone()
        };
        assert_eq!(
            build_classifier(&bad_l2, 10, 3),
            Err(BuildError::NegativeL2(-0.1))
        );

        assert_eq!(build_classifier(&base, 0, 3), Err(BuildError::ZeroInputDim));
        assert_eq!(
            build_classifier(&base, 10, 1),
            Err(BuildError::TooFewClasses(1))
        );
    }
}
