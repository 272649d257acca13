//! Network layers
//!
//! Concrete layers a compiled architecture materializes into: dense
//! (fully connected), 1-D batch normalization, PReLU, dropout and the
//! softmax head. Each layer caches what its backward pass needs during
//! `forward` and owns the optimizer state for its parameter tensors.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use super::optimizer::Optimizer;

/// Fully connected linear transformation: `z = x @ W + b`.
///
/// The activation is *not* part of this layer; architectures insert their
/// activation as a separate layer after normalization.
pub struct DenseLayer {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
    pub input_size: usize,
    pub output_size: usize,
    /// L2 weight penalty folded into the weight gradient.
    pub l2_penalty: f64,

    last_input: Option<Array2<f64>>,
    weight_gradient: Option<Array2<f64>>,
    bias_gradient: Option<Array1<f64>>,
    opt_weights: Box<dyn Optimizer>,
    opt_biases: Box<dyn Optimizer>,
}

impl DenseLayer {
    /// Create a dense layer with Xavier/Glorot uniform initialization.
    pub fn new(
        input_size: usize,
        output_size: usize,
        l2_penalty: f64,
        optimizer: &dyn Optimizer,
    ) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weights = Array2::random((input_size, output_size), Uniform::new(-limit, limit));
        let biases = Array1::zeros(output_size);

        Self {
            weights,
            biases,
            input_size,
            output_size,
            l2_penalty,
            last_input: None,
            weight_gradient: None,
            bias_gradient: None,
            opt_weights: optimizer.clone_box(),
            opt_biases: optimizer.clone_box(),
        }
    }

    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        if training {
            self.last_input = Some(input.clone());
        }
        input.dot(&self.weights) + &self.biases
    }

    pub fn backward(&mut self, output_gradient: &Array2<f64>) -> Array2<f64> {
        let input = self
            .last_input
            .as_ref()
            .expect("forward must run before backward");

        let mut weight_gradient = input.t().dot(output_gradient);
        if self.l2_penalty > 0.0 {
            // d/dW of l2 * ||W||^2
            weight_gradient = weight_gradient + &(&self.weights * (2.0 * self.l2_penalty));
        }

        let input_gradient = output_gradient.dot(&self.weights.t());

        self.bias_gradient = Some(output_gradient.sum_axis(Axis(0)));
        self.weight_gradient = Some(weight_gradient);

        input_gradient
    }

    pub fn step(&mut self) {
        if let (Some(wg), Some(bg)) = (self.weight_gradient.take(), self.bias_gradient.take()) {
            self.opt_weights.step_matrix(&mut self.weights, &wg);
            self.opt_biases.step_vector(&mut self.biases, &bg);
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Batch normalization over the feature axis.
///
/// Training uses per-batch statistics and keeps running estimates; inference
/// normalizes with the running mean and variance.
pub struct BatchNorm1d {
    pub gamma: Array1<f64>,
    pub beta: Array1<f64>,
    pub running_mean: Array1<f64>,
    pub running_var: Array1<f64>,
    pub num_features: usize,
    momentum: f64,
    eps: f64,

    cache: Option<(Array2<f64>, Array1<f64>)>,
    gamma_gradient: Option<Array1<f64>>,
    beta_gradient: Option<Array1<f64>>,
    opt_gamma: Box<dyn Optimizer>,
    opt_beta: Box<dyn Optimizer>,
}

impl BatchNorm1d {
    pub fn new(num_features: usize, optimizer: &dyn Optimizer) -> Self {
        Self {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            num_features,
            momentum: 0.9,
            eps: 1e-5,
            cache: None,
            gamma_gradient: None,
            beta_gradient: None,
            opt_gamma: optimizer.clone_box(),
            opt_beta: optimizer.clone_box(),
        }
    }

    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        if training {
            let mean = input
                .mean_axis(Axis(0))
                .expect("batch norm requires a non-empty batch");
            let centered = input - &mean;
            let var = (&centered * &centered)
                .mean_axis(Axis(0))
                .expect("batch norm requires a non-empty batch");
            let std = (&var + self.eps).mapv(f64::sqrt);

            let x_hat = centered / &std;
            let output = &x_hat * &self.gamma + &self.beta;

            self.running_mean = &self.running_mean * self.momentum + &mean * (1.0 - self.momentum);
            self.running_var = &self.running_var * self.momentum + &var * (1.0 - self.momentum);
            self.cache = Some((x_hat, std));

            output
        } else {
            let std = (&self.running_var + self.eps).mapv(f64::sqrt);
            let x_hat = (input - &self.running_mean) / &std;
            &x_hat * &self.gamma + &self.beta
        }
    }

    pub fn backward(&mut self, output_gradient: &Array2<f64>) -> Array2<f64> {
        let (x_hat, std) = self
            .cache
            .as_ref()
            .expect("forward must run before backward");
        let n = output_gradient.nrows() as f64;

        self.gamma_gradient = Some((output_gradient * x_hat).sum_axis(Axis(0)));
        self.beta_gradient = Some(output_gradient.sum_axis(Axis(0)));

        let dx_hat = output_gradient * &self.gamma;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * x_hat).sum_axis(Axis(0));
        let denom = std * n;

        (&(dx_hat * n) - &sum_dx_hat - &(x_hat * &sum_dx_hat_x_hat)) / &denom
    }

    pub fn step(&mut self) {
        if let (Some(gg), Some(bg)) = (self.gamma_gradient.take(), self.beta_gradient.take()) {
            self.opt_gamma.step_vector(&mut self.gamma, &gg);
            self.opt_beta.step_vector(&mut self.beta, &bg);
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}

/// Parametric ReLU: `y = max(0, x) + alpha * min(0, x)` with one learned
/// slope per channel.
pub struct PReLU {
    pub alpha: Array1<f64>,
    pub num_features: usize,

    last_input: Option<Array2<f64>>,
    alpha_gradient: Option<Array1<f64>>,
    opt_alpha: Box<dyn Optimizer>,
}

impl PReLU {
    pub fn new(num_features: usize, optimizer: &dyn Optimizer) -> Self {
        Self {
            alpha: Array1::from_elem(num_features, 0.25),
            num_features,
            last_input: None,
            alpha_gradient: None,
            opt_alpha: optimizer.clone_box(),
        }
    }

    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        if training {
            self.last_input = Some(input.clone());
        }

        let mut output = input.clone();
        for mut row in output.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                if *v < 0.0 {
                    *v *= self.alpha[j];
                }
            }
        }
        output
    }

    pub fn backward(&mut self, output_gradient: &Array2<f64>) -> Array2<f64> {
        let input = self
            .last_input
            .as_ref()
            .expect("forward must run before backward");

        let mut alpha_gradient = Array1::zeros(self.num_features);
        let mut input_gradient = output_gradient.clone();

        for (mut grad_row, input_row) in input_gradient.rows_mut().into_iter().zip(input.rows()) {
            for (j, (g, &x)) in grad_row.iter_mut().zip(input_row.iter()).enumerate() {
                if x < 0.0 {
                    alpha_gradient[j] += *g * x;
                    *g *= self.alpha[j];
                }
            }
        }

        self.alpha_gradient = Some(alpha_gradient);
        input_gradient
    }

    pub fn step(&mut self) {
        if let Some(ag) = self.alpha_gradient.take() {
            self.opt_alpha.step_vector(&mut self.alpha, &ag);
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.alpha.len()
    }
}

/// Inverted dropout: zeroes activations with probability `rate` during
/// training and rescales the survivors, identity at inference.
pub struct Dropout {
    pub rate: f64,
    mask: Option<Array2<f64>>,
}

impl Dropout {
    pub fn new(rate: f64) -> Self {
        Self { rate, mask: None }
    }

    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        if !training || self.rate <= 0.0 {
            self.mask = None;
            return input.clone();
        }

        let mut rng = rand::thread_rng();
        let keep_scale = 1.0 / (1.0 - self.rate);
        let mask = Array2::from_shape_fn(input.dim(), |_| {
            if rng.gen::<f64>() < self.rate {
                0.0
            } else {
                keep_scale
            }
        });

        let output = input * &mask;
        self.mask = Some(mask);
        output
    }

    pub fn backward(&mut self, output_gradient: &Array2<f64>) -> Array2<f64> {
        match &self.mask {
            Some(mask) => output_gradient * mask,
            None => output_gradient.clone(),
        }
    }
}

/// Row-wise softmax head.
pub struct Softmax;

impl Softmax {
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let mut output = input.clone();
        for mut row in output.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
        output
    }
}

/// A materialized layer of a sequential network.
///
/// The variant set is closed and small, so an enum carries the dispatch;
/// no trait objects needed at this seam.
pub enum Layer {
    Dense(DenseLayer),
    BatchNorm(BatchNorm1d),
    PReLU(PReLU),
    Dropout(Dropout),
    Softmax(Softmax),
}

impl Layer {
    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        match self {
            Layer::Dense(l) => l.forward(input, training),
            Layer::BatchNorm(l) => l.forward(input, training),
            Layer::PReLU(l) => l.forward(input, training),
            Layer::Dropout(l) => l.forward(input, training),
            Layer::Softmax(l) => l.forward(input),
        }
    }

    /// Propagate the gradient and stash parameter gradients for [`Self::step`].
    ///
    /// The softmax head is transparent here: the loss gradient is computed
    /// against the pre-softmax scores (the usual fused softmax/cross-entropy
    /// form), so there is nothing left for it to do.
    pub fn backward(&mut self, output_gradient: &Array2<f64>) -> Array2<f64> {
        match self {
            Layer::Dense(l) => l.backward(output_gradient),
            Layer::BatchNorm(l) => l.backward(output_gradient),
            Layer::PReLU(l) => l.backward(output_gradient),
            Layer::Dropout(l) => l.backward(output_gradient),
            Layer::Softmax(_) => output_gradient.clone(),
        }
    }

    /// Apply the pending parameter update, if this layer has parameters.
    pub fn step(&mut self) {
        match self {
            Layer::Dense(l) => l.step(),
            Layer::BatchNorm(l) => l.step(),
            Layer::PReLU(l) => l.step(),
            Layer::Dropout(_) | Layer::Softmax(_) => {}
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            Layer::Dense(l) => l.num_parameters(),
            Layer::BatchNorm(l) => l.num_parameters(),
            Layer::PReLU(l) => l.num_parameters(),
            Layer::Dropout(_) | Layer::Softmax(_) => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layer::Dense(_) => "Dense",
            Layer::BatchNorm(_) => "BatchNorm",
            Layer::PReLU(_) => "PReLU",
            Layer::Dropout(_) => "Dropout",
            Layer::Softmax(_) => "Softmax",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::optimizer::SGD;
    use approx::assert_relative_eq;

    #[test]
    fn test_dense_forward_shape() {
        let opt = SGD::new(0.01);
        let mut layer = DenseLayer::new(4, 3, 0.0, &opt);
        let input = Array2::ones((2, 4));
        let output = layer.forward(&input, false);
        assert_eq!(output.dim(), (2, 3));
    }

    #[test]
    fn test_dense_num_parameters() {
        let opt = SGD::new(0.01);
        let layer = DenseLayer::new(10, 5, 0.0, &opt);
        assert_eq!(layer.num_parameters(), 10 * 5 + 5);
    }

    #[test]
    fn test_dense_l2_pulls_weights_toward_zero() {
        let opt = SGD::new(0.1);
        let mut layer = DenseLayer::new(2, 2, 0.5, &opt);
        layer.weights.fill(1.0);

        let input = Array2::zeros((1, 2));
        let _ = layer.forward(&input, true);
        // Zero input means the data gradient vanishes; only the penalty acts.
        let _ = layer.backward(&Array2::zeros((1, 2)));
        layer.step();

        assert!(layer.weights[[0, 0]] < 1.0);
    }

    #[test]
    fn test_batchnorm_normalizes_batch() {
        let opt = SGD::new(0.01);
        let mut bn = BatchNorm1d::new(2, &opt);
        let input =
            Array2::from_shape_vec((4, 2), vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0])
                .unwrap();
        let output = bn.forward(&input, true);

        for col in output.columns() {
            let mean: f64 = col.sum() / col.len() as f64;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_batchnorm_inference_uses_running_stats() {
        let opt = SGD::new(0.01);
        let mut bn = BatchNorm1d::new(2, &opt);
        let input = Array2::from_shape_vec((2, 2), vec![5.0, -5.0, 7.0, -7.0]).unwrap();

        // Fresh running stats are mean 0 / var 1, so inference is identity.
        let output = bn.forward(&input, false);
        assert_relative_eq!(output[[0, 0]], 5.0, epsilon = 1e-4);

        // After a training pass the running stats have moved.
        let _ = bn.forward(&input, true);
        let shifted = bn.forward(&input, false);
        assert!((shifted[[0, 0]] - 5.0).abs() > 1e-3);
    }

    #[test]
    fn test_prelu_scales_negative_inputs() {
        let opt = SGD::new(0.01);
        let mut prelu = PReLU::new(2, &opt);
        let input = Array2::from_shape_vec((1, 2), vec![-2.0, 3.0]).unwrap();
        let output = prelu.forward(&input, false);

        assert_relative_eq!(output[[0, 0]], -0.5, epsilon = 1e-10);
        assert_relative_eq!(output[[0, 1]], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_prelu_backward_gradients() {
        let opt = SGD::new(0.01);
        let mut prelu = PReLU::new(2, &opt);
        let input = Array2::from_shape_vec((1, 2), vec![-2.0, 3.0]).unwrap();
        let _ = prelu.forward(&input, true);

        let grad = prelu.backward(&Array2::ones((1, 2)));
        assert_relative_eq!(grad[[0, 0]], 0.25, epsilon = 1e-10);
        assert_relative_eq!(grad[[0, 1]], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_dropout_identity_at_inference() {
        let mut dropout = Dropout::new(0.5);
        let input = Array2::ones((3, 4));
        let output = dropout.forward(&input, false);
        assert_eq!(output, input);
    }

    #[test]
    fn test_dropout_preserves_expected_scale() {
        let mut dropout = Dropout::new(0.5);
        let input = Array2::ones((1, 1000));
        let output = dropout.forward(&input, true);

        // Survivors are rescaled by 1/(1-rate)
        assert!(output.iter().all(|&v| v == 0.0 || v == 2.0));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let softmax = Softmax;
        let input = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0]).unwrap();
        let output = softmax.forward(&input);

        for row in output.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
        assert!(output.iter().all(|&p| p > 0.0 && p < 1.0));
    }
}
