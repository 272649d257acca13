//! Sequential network execution
//!
//! Materializes a [`CompiledModel`] into live layers and runs training,
//! prediction and evaluation over them. The architecture decisions all
//! happen in [`crate::model`]; this module only executes what was compiled.

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::layer::{BatchNorm1d, DenseLayer, Dropout, Layer, PReLU, Softmax};
use crate::model::{ActivationKind, BuildError, CompiledModel, LayerSpec};

/// Loss function attached to a compiled classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    /// For two-class problems.
    BinaryCrossEntropy,
    /// For problems with more than two classes.
    CategoricalCrossEntropy,
}

/// A feedforward network executing an ordered layer sequence.
pub struct Sequential {
    layers: Vec<Layer>,
    loss: LossFunction,
}

impl Sequential {
    /// Instantiate the layers a compiled model describes.
    ///
    /// Walks the layer specs tracking the current width so that dense
    /// layers after the first can infer their input dimension. Each
    /// materialization draws fresh weights; materializing the same model
    /// twice yields architecturally identical but independent networks.
    pub fn materialize(model: &CompiledModel) -> Result<Self, BuildError> {
        let optimizer = model.optimizer.build();
        let mut layers = Vec::with_capacity(model.layers.len());
        let mut current_dim: Option<usize> = None;

        for spec in &model.layers {
            match *spec {
                LayerSpec::Dense {
                    width,
                    l2_penalty,
                    input_dim,
                } => {
                    let input_size = input_dim
                        .or(current_dim)
                        .ok_or(BuildError::MissingInputDim)?;
                    layers.push(Layer::Dense(DenseLayer::new(
                        input_size,
                        width,
                        l2_penalty,
                        optimizer.as_ref(),
                    )));
                    current_dim = Some(width);
                }
                LayerSpec::BatchNorm => {
                    let dim = current_dim.ok_or(BuildError::MissingInputDim)?;
                    layers.push(Layer::BatchNorm(BatchNorm1d::new(dim, optimizer.as_ref())));
                }
                LayerSpec::Activation(ActivationKind::PReLU) => {
                    let dim = current_dim.ok_or(BuildError::MissingInputDim)?;
                    layers.push(Layer::PReLU(PReLU::new(dim, optimizer.as_ref())));
                }
                LayerSpec::Activation(ActivationKind::Softmax) => {
                    layers.push(Layer::Softmax(Softmax));
                }
                LayerSpec::Dropout { rate } => {
                    layers.push(Layer::Dropout(Dropout::new(rate)));
                }
            }
        }

        Ok(Self {
            layers,
            loss: model.loss,
        })
    }

    pub fn loss_function(&self) -> LossFunction {
        self.loss
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Forward pass through every layer.
    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        let mut output = input.clone();
        for layer in &mut self.layers {
            output = layer.forward(&output, training);
        }
        output
    }

    /// Class-probability predictions (inference mode).
    pub fn predict(&mut self, input: &Array2<f64>) -> Array2<f64> {
        self.forward(input, false)
    }

    /// Hard class predictions via row-wise argmax.
    pub fn predict_classes(&mut self, input: &Array2<f64>) -> Array1<usize> {
        let probabilities = self.predict(input);
        let classes: Vec<usize> = probabilities
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0)
            })
            .collect();
        Array1::from_vec(classes)
    }

    /// Cross-entropy loss of predictions against one-hot targets.
    pub fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let n = predictions.nrows() as f64;
        let epsilon = 1e-15;
        let p = predictions.mapv(|v| v.clamp(epsilon, 1.0 - epsilon));

        match self.loss {
            LossFunction::BinaryCrossEntropy => {
                let loss =
                    targets * &p.mapv(f64::ln) + &(1.0 - targets) * &(1.0 - &p).mapv(f64::ln);
                -loss.sum() / n
            }
            LossFunction::CategoricalCrossEntropy => {
                let loss = targets * &p.mapv(f64::ln);
                -loss.sum() / n
            }
        }
    }

    /// Backward pass and parameter update for one batch.
    ///
    /// The starting gradient is the fused softmax/cross-entropy form
    /// `(p - t) / n`, taken with respect to the pre-softmax scores; the
    /// softmax layer itself passes it through.
    fn backward(&mut self, predictions: &Array2<f64>, targets: &Array2<f64>) {
        let n = predictions.nrows() as f64;
        let mut gradient = (predictions - targets) / n;

        for layer in self.layers.iter_mut().rev() {
            gradient = layer.backward(&gradient);
            layer.step();
        }
    }

    /// Train for one epoch over shuffled mini-batches, returning mean loss.
    pub fn train_epoch(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
        batch_size: usize,
    ) -> f64 {
        let n_samples = x_train.nrows();
        let batch_size = batch_size.max(1).min(n_samples);
        let n_batches = n_samples.div_ceil(batch_size);
        let mut total_loss = 0.0;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(&mut rand::thread_rng());

        for batch_idx in 0..n_batches {
            let start = batch_idx * batch_size;
            let end = (start + batch_size).min(n_samples);
            let batch_indices = &indices[start..end];

            let x_batch = x_train.select(Axis(0), batch_indices);
            let y_batch = y_train.select(Axis(0), batch_indices);

            let predictions = self.forward(&x_batch, true);
            total_loss += self.compute_loss(&predictions, &y_batch);
            self.backward(&predictions, &y_batch);
        }

        total_loss / n_batches as f64
    }

    /// Train the network, returning the per-epoch losses.
    pub fn fit(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
        epochs: usize,
        batch_size: usize,
    ) -> Vec<f64> {
        let mut losses = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            let loss = self.train_epoch(x_train, y_train, batch_size);
            log::debug!("epoch {}/{}: loss = {:.6}", epoch + 1, epochs, loss);
            losses.push(loss);
        }

        losses
    }

    /// Loss on held-out data (inference mode).
    pub fn evaluate(&mut self, x_test: &Array2<f64>, y_test: &Array2<f64>) -> f64 {
        let predictions = self.predict(x_test);
        self.compute_loss(&predictions, y_test)
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    /// Log a per-layer summary of the network.
    pub fn summary(&self) {
        log::info!("Sequential network ({:?} loss)", self.loss);
        for (i, layer) in self.layers.iter().enumerate() {
            log::info!(
                "  layer {}: {} ({} params)",
                i + 1,
                layer.name(),
                layer.num_parameters()
            );
        }
        log::info!("  total parameters: {}", self.num_parameters());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{build_classifier, HyperparameterConfig};
    use crate::nn::OptimizerSpec;
    use approx::assert_relative_eq;

    fn small_model(n_class: usize) -> CompiledModel {
        let config = HyperparameterConfig {
            hidden_layers: vec![8],
            dropout_rate: 0.0,
            l2_penalty: 0.0,
            optimizer: OptimizerSpec::sgd(),
        };
        build_classifier(&config, 4, n_class).unwrap()
    }

    #[test]
    fn test_materialize_layer_count() {
        let model = small_model(3);
        let network = Sequential::materialize(&model).unwrap();
        assert_eq!(network.num_layers(), model.num_layers());
    }

    #[test]
    fn test_predict_shape_and_distribution() {
        let model = small_model(3);
        let mut network = Sequential::materialize(&model).unwrap();

        let input = Array2::ones((5, 4));
        let probabilities = network.predict(&input);
        assert_eq!(probabilities.dim(), (5, 3));

        for row in probabilities.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_predict_classes_in_range() {
        let model = small_model(4);
        let mut network = Sequential::materialize(&model).unwrap();

        let input = Array2::ones((6, 4));
        let classes = network.predict_classes(&input);
        assert_eq!(classes.len(), 6);
        assert!(classes.iter().all(|&c| c < 4));
    }

    #[test]
    fn test_loss_of_perfect_prediction_is_small() {
        let model = small_model(3);
        let network = Sequential::materialize(&model).unwrap();

        let targets =
            Array2::from_shape_vec((2, 3), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        let loss = network.compute_loss(&targets, &targets);
        assert!(loss < 1e-10);
    }

    #[test]
    fn test_training_reduces_loss() {
        let model = small_model(2);
        let mut network = Sequential::materialize(&model).unwrap();

        // Linearly separable two-class problem on the first feature.
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..32 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let offset = (i / 2) as f64 * 0.05;
            x.extend_from_slice(&[sign * (1.0 + offset), offset, -offset, sign]);
            if sign > 0.0 {
                y.extend_from_slice(&[1.0, 0.0]);
            } else {
                y.extend_from_slice(&[0.0, 1.0]);
            }
        }
        let x = Array2::from_shape_vec((32, 4), x).unwrap();
        let y = Array2::from_shape_vec((32, 2), y).unwrap();

        let initial = network.evaluate(&x, &y);
        network.fit(&x, &y, 50, 8);
        let trained = network.evaluate(&x, &y);

        assert!(trained < initial);
    }
}
