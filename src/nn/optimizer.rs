//! Optimization Algorithms
//!
//! Implements the optimizers available to compiled models:
//! - SGD (Stochastic Gradient Descent, with optional momentum)
//! - Adam (Adaptive Moment Estimation)
//!
//! Each optimizer instance owns the state for exactly one parameter tensor;
//! layers with several tensors hold one clone per tensor (see
//! [`Optimizer::clone_box`]).

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Configuration-level optimizer identifier.
///
/// This is what a hyperparameter configuration carries: a name plus its
/// tunable scalars, not a live optimizer. [`OptimizerSpec::build`] turns it
/// into a concrete prototype that a network clones per parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum OptimizerSpec {
    Sgd { learning_rate: f64, momentum: f64 },
    Adam { learning_rate: f64 },
}

impl OptimizerSpec {
    /// Adam with the conventional 0.001 learning rate.
    pub fn adam() -> Self {
        Self::Adam {
            learning_rate: 0.001,
        }
    }

    /// Plain SGD with a 0.01 learning rate.
    pub fn sgd() -> Self {
        Self::Sgd {
            learning_rate: 0.01,
            momentum: 0.0,
        }
    }

    /// Instantiate the concrete optimizer this spec names.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            Self::Sgd {
                learning_rate,
                momentum,
            } => Box::new(SGD::new(learning_rate).with_momentum(momentum)),
            Self::Adam { learning_rate } => Box::new(Adam::new(learning_rate)),
        }
    }
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self::adam()
    }
}

/// Raised when parsing an optimizer name that is not recognized.
#[derive(Debug, Error, PartialEq)]
#[error("unknown optimizer '{0}', expected 'adam' or 'sgd'")]
pub struct UnknownOptimizer(pub String);

impl FromStr for OptimizerSpec {
    type Err = UnknownOptimizer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::adam()),
            "sgd" => Ok(Self::sgd()),
            other => Err(UnknownOptimizer(other.to_string())),
        }
    }
}

/// Optimizer trait for per-tensor parameter updates.
pub trait Optimizer: Send + Sync {
    /// Update a matrix-shaped parameter given its gradient.
    fn step_matrix(&mut self, param: &mut Array2<f64>, gradient: &Array2<f64>);

    /// Update a vector-shaped parameter given its gradient.
    fn step_vector(&mut self, param: &mut Array1<f64>, gradient: &Array1<f64>);

    /// Reset optimizer state (for a new training run).
    fn reset(&mut self);

    /// Clone the optimizer so each parameter tensor gets its own state.
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

/// Stochastic Gradient Descent with optional momentum
#[derive(Clone)]
pub struct SGD {
    pub learning_rate: f64,
    pub momentum: f64,
    velocity_m: Option<Array2<f64>>,
    velocity_v: Option<Array1<f64>>,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            velocity_m: None,
            velocity_v: None,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for SGD {
    fn step_matrix(&mut self, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        if self.momentum > 0.0 {
            let v = self
                .velocity_m
                .get_or_insert_with(|| Array2::zeros(param.dim()));
            *v = &*v * self.momentum - gradient * self.learning_rate;
            *param = &*param + &*v;
        } else {
            *param = &*param - &(gradient * self.learning_rate);
        }
    }

    fn step_vector(&mut self, param: &mut Array1<f64>, gradient: &Array1<f64>) {
        if self.momentum > 0.0 {
            let v = self
                .velocity_v
                .get_or_insert_with(|| Array1::zeros(param.len()));
            *v = &*v * self.momentum - gradient * self.learning_rate;
            *param = &*param + &*v;
        } else {
            *param = &*param - &(gradient * self.learning_rate);
        }
    }

    fn reset(&mut self) {
        self.velocity_m = None;
        self.velocity_v = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: usize,
    m_m: Option<Array2<f64>>,
    v_m: Option<Array2<f64>>,
    m_v: Option<Array1<f64>>,
    v_v: Option<Array1<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m_m: None,
            v_m: None,
            m_v: None,
            v_v: None,
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

impl Optimizer for Adam {
    fn step_matrix(&mut self, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        self.t += 1;

        let m = self.m_m.get_or_insert_with(|| Array2::zeros(param.dim()));
        let v = self.v_m.get_or_insert_with(|| Array2::zeros(param.dim()));

        // Biased moment estimates
        *m = &*m * self.beta1 + gradient * (1.0 - self.beta1);
        *v = &*v * self.beta2 + &(gradient * gradient) * (1.0 - self.beta2);

        // Bias-corrected estimates
        let m_hat = &*m / (1.0 - self.beta1.powi(self.t as i32));
        let v_hat = &*v / (1.0 - self.beta2.powi(self.t as i32));

        *param =
            &*param - &(&m_hat * self.learning_rate / &(v_hat.mapv(f64::sqrt) + self.epsilon));
    }

    fn step_vector(&mut self, param: &mut Array1<f64>, gradient: &Array1<f64>) {
        self.t += 1;

        let m = self.m_v.get_or_insert_with(|| Array1::zeros(param.len()));
        let v = self.v_v.get_or_insert_with(|| Array1::zeros(param.len()));

        *m = &*m * self.beta1 + gradient * (1.0 - self.beta1);
        *v = &*v * self.beta2 + &(gradient * gradient) * (1.0 - self.beta2);

        let m_hat = &*m / (1.0 - self.beta1.powi(self.t as i32));
        let v_hat = &*v / (1.0 - self.beta2.powi(self.t as i32));

        *param =
            &*param - &(&m_hat * self.learning_rate / &(v_hat.mapv(f64::sqrt) + self.epsilon));
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m_m = None;
        self.v_m = None;
        self.m_v = None;
        self.v_v = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_update() {
        let mut optimizer = SGD::new(0.01);
        let mut weights = Array2::ones((3, 2));
        let gradients = Array2::ones((3, 2));
        optimizer.step_matrix(&mut weights, &gradients);

        assert!((weights[[0, 0]] - 0.99).abs() < 1e-10);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut optimizer = SGD::new(0.1).with_momentum(0.9);
        let mut weights = Array1::zeros(2);
        let gradients = Array1::ones(2);

        optimizer.step_vector(&mut weights, &gradients);
        let first = weights[0];
        optimizer.step_vector(&mut weights, &gradients);
        let second_step = weights[0] - first;

        // Velocity grows across steps
        assert!(second_step.abs() > first.abs());
    }

    #[test]
    fn test_adam_update() {
        let mut optimizer = Adam::new(0.001);
        let mut weights = Array2::ones((3, 2));
        let gradients = Array2::ones((3, 2));

        for _ in 0..10 {
            optimizer.step_matrix(&mut weights, &gradients);
        }

        assert!(weights[[0, 0]] < 1.0);
    }

    #[test]
    fn test_adam_vector_only() {
        // A vector-only tensor (e.g. a batch-norm gamma) must get a valid
        // bias correction on its first step.
        let mut optimizer = Adam::new(0.001);
        let mut gamma = Array1::ones(4);
        let gradients = Array1::ones(4);
        optimizer.step_vector(&mut gamma, &gradients);

        assert!(gamma.iter().all(|v| v.is_finite()));
        assert!(gamma[0] < 1.0);
    }

    #[test]
    fn test_spec_parsing() {
        assert_eq!(
            "adam".parse::<OptimizerSpec>().unwrap(),
            OptimizerSpec::adam()
        );
        assert_eq!("SGD".parse::<OptimizerSpec>().unwrap(), OptimizerSpec::sgd());
        assert!("rmsprop".parse::<OptimizerSpec>().is_err());
    }
}
