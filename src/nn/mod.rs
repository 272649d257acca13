//! Sequential neural-network engine
//!
//! Provides the building blocks that compiled architectures execute on:
//! - Layers (dense, batch norm, PReLU, dropout, softmax)
//! - The `Sequential` container with training and prediction
//! - Optimizers (SGD, Adam) and their configuration-level specs

pub mod layer;
pub mod network;
pub mod optimizer;

pub use layer::{BatchNorm1d, DenseLayer, Dropout, Layer, PReLU, Softmax};
pub use network::{LossFunction, Sequential};
pub use optimizer::{Adam, Optimizer, OptimizerSpec, UnknownOptimizer, SGD};
