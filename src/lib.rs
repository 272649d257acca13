//! # MLP Search - Feedforward Classifier Tuning
//!
//! This library assembles feedforward neural-network classifiers from a
//! small set of tunable knobs and selects among candidate configurations
//! with randomized search and k-fold cross-validation.
//!
//! ## Modules
//!
//! - `model` - Architecture assembly: hyperparameters in, compiled model out
//! - `nn` - Sequential engine (layers, optimizers, training)
//! - `search` - Randomized search, cross-validation and metrics
//!
//! ## Example
//!
//! ```
//! use mlp_search::model::{build_classifier, HyperparameterConfig};
//!
//! let config = HyperparameterConfig::default();
//! let model = build_classifier(&config, 20, 3).unwrap();
//! assert_eq!(model.num_layers(), 11);
//! ```

pub mod model;
pub mod nn;
pub mod search;

pub use model::{build_classifier, BuildError, CompiledModel, HyperparameterConfig};
pub use nn::{LossFunction, OptimizerSpec, Sequential};
pub use search::{RandomizedSearchCv, SearchOutcome, SearchSpace};
