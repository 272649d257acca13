//! Randomized hyperparameter search with cross-validation
//!
//! Samples candidate configurations from a [`SearchSpace`], scores each one
//! with shuffled k-fold cross-validation (mean fold accuracy) and reports
//! every trial plus the best configuration found. A configuration the
//! builder rejects becomes a failed trial, not a fatal error; the search
//! moves on to the next candidate.

pub mod cross_validation;
pub mod metrics;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{build_classifier, HyperparameterConfig};
use crate::nn::{OptimizerSpec, Sequential};
use cross_validation::{CVScores, CrossValidator};
use metrics::{one_hot, Metrics};

/// Candidate-value lists for each tunable hyperparameter.
///
/// Randomized search draws one entry per list to form a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub hidden_layers: Vec<Vec<usize>>,
    pub dropout_rate: Vec<f64>,
    pub l2_penalty: Vec<f64>,
    pub optimizer: Vec<OptimizerSpec>,
}

impl Default for SearchSpace {
    /// The conventional starting grid: two depth/width shapes, three
    /// dropout rates, three L2 strengths, Adam.
    fn default() -> Self {
        Self {
            hidden_layers: vec![vec![64, 64, 64], vec![128, 32, 32, 32, 32]],
            dropout_rate: vec![0.0, 0.2, 0.5],
            l2_penalty: vec![0.01, 0.1, 0.5],
            optimizer: vec![OptimizerSpec::adam()],
        }
    }
}

impl SearchSpace {
    /// Draw one candidate configuration uniformly from the space.
    ///
    /// Panics if any candidate list is empty.
    pub fn sample(&self, rng: &mut impl Rng) -> HyperparameterConfig {
        assert!(
            !self.hidden_layers.is_empty()
                && !self.dropout_rate.is_empty()
                && !self.l2_penalty.is_empty()
                && !self.optimizer.is_empty(),
            "every candidate list in the search space must be non-empty"
        );

        HyperparameterConfig {
            hidden_layers: self.hidden_layers.choose(rng).cloned().unwrap_or_default(),
            dropout_rate: *self.dropout_rate.choose(rng).unwrap_or(&0.0),
            l2_penalty: *self.l2_penalty.choose(rng).unwrap_or(&0.0),
            optimizer: *self
                .optimizer
                .choose(rng)
                .unwrap_or(&OptimizerSpec::adam()),
        }
    }
}

/// Outcome of evaluating one sampled configuration.
#[derive(Debug, Clone, Serialize)]
pub struct TrialResult {
    pub config: HyperparameterConfig,
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
    pub std_accuracy: f64,
    /// Set when the configuration failed to build; such trials score nothing.
    pub error: Option<String>,
}

impl TrialResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// All trials of a finished search, best first by mean accuracy.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub trials: Vec<TrialResult>,
    pub best: Option<TrialResult>,
}

/// Randomized search over a [`SearchSpace`] with k-fold cross-validation.
pub struct RandomizedSearchCv {
    pub n_iter: usize,
    pub cv_folds: usize,
    pub epochs: usize,
    pub batch_size: usize,
}

impl RandomizedSearchCv {
    pub fn new(n_iter: usize, cv_folds: usize) -> Self {
        Self {
            n_iter,
            cv_folds,
            epochs: 15,
            batch_size: 1024,
        }
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run the search over `(x, y)` where `y` holds integer class labels
    /// in `0..n_class`. The feature count comes from `x`; the same shuffled
    /// folds score every candidate so trials stay comparable.
    pub fn fit(
        &self,
        space: &SearchSpace,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_class: usize,
    ) -> SearchOutcome {
        assert_eq!(x.nrows(), y.len(), "feature rows and labels must align");

        let n_input = x.ncols();
        let splits = CrossValidator::k_fold(x.nrows(), self.cv_folds, true);
        let mut rng = rand::thread_rng();
        let mut trials = Vec::with_capacity(self.n_iter);

        for trial_idx in 0..self.n_iter {
            let config = space.sample(&mut rng);

            let compiled = match build_classifier(&config, n_input, n_class) {
                Ok(compiled) => compiled,
                Err(err) => {
                    log::warn!("trial {}: rejected config: {}", trial_idx + 1, err);
                    trials.push(TrialResult {
                        config,
                        fold_accuracies: Vec::new(),
                        mean_accuracy: 0.0,
                        std_accuracy: 0.0,
                        error: Some(err.to_string()),
                    });
                    continue;
                }
            };

            let mut fold_accuracies = Vec::with_capacity(splits.len());
            let mut failure = None;

            for split in &splits {
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train: Array1<usize> =
                    split.train_indices.iter().map(|&i| y[i]).collect();
                let x_test = x.select(Axis(0), &split.test_indices);
                let y_test: Array1<usize> =
                    split.test_indices.iter().map(|&i| y[i]).collect();

                // Fresh weights per fold
                let mut network = match Sequential::materialize(&compiled) {
                    Ok(network) => network,
                    Err(err) => {
                        failure = Some(err.to_string());
                        break;
                    }
                };

                network.fit(
                    &x_train,
                    &one_hot(&y_train, n_class),
                    self.epochs,
                    self.batch_size,
                );

                let predictions = network.predict_classes(&x_test);
                fold_accuracies.push(Metrics::accuracy(&y_test, &predictions));
            }

            let trial = match failure {
                Some(error) => TrialResult {
                    config,
                    fold_accuracies: Vec::new(),
                    mean_accuracy: 0.0,
                    std_accuracy: 0.0,
                    error: Some(error),
                },
                None => {
                    let scores = CVScores::from_scores(fold_accuracies);
                    log::info!("trial {}/{}: {}", trial_idx + 1, self.n_iter, scores.summary());
                    TrialResult {
                        config,
                        mean_accuracy: scores.mean,
                        std_accuracy: scores.std,
                        fold_accuracies: scores.scores,
                        error: None,
                    }
                }
            };
            trials.push(trial);
        }

        let best = trials
            .iter()
            .filter(|t| t.is_ok())
            .max_by(|a, b| a.mean_accuracy.total_cmp(&b.mean_accuracy))
            .cloned();

        SearchOutcome { trials, best }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stays_inside_space() {
        let space = SearchSpace::default();
        let mut rng = rand::thread_rng();

        for _ in 0..20 {
            let config = space.sample(&mut rng);
            assert!(space.hidden_layers.contains(&config.hidden_layers));
            assert!(space.dropout_rate.contains(&config.dropout_rate));
            assert!(space.l2_penalty.contains(&config.l2_penalty));
            assert!(space.optimizer.contains(&config.optimizer));
        }
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn test_sample_rejects_empty_list() {
        let space = SearchSpace {
            dropout_rate: vec![],
            ..SearchSpace::default()
        };
        space.sample(&mut rand::thread_rng());
    }
}
