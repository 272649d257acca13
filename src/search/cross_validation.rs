//! Cross-validation utilities for model selection
//!
//! K-fold splitting over sample indices plus summary statistics for the
//! per-fold scores.

use rand::seq::SliceRandom;
use rand::thread_rng;

/// Cross-validation split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Cross-validator
pub struct CrossValidator;

impl CrossValidator {
    /// K-Fold cross-validation splits
    ///
    /// # Arguments
    /// * `n_samples` - Total number of samples
    /// * `n_folds` - Number of folds
    /// * `shuffle` - Whether to shuffle indices
    pub fn k_fold(n_samples: usize, n_folds: usize, shuffle: bool) -> Vec<CVSplit> {
        assert!(n_folds > 1, "n_folds must be > 1");
        assert!(n_samples >= n_folds, "n_samples must be >= n_folds");

        let mut indices: Vec<usize> = (0..n_samples).collect();

        if shuffle {
            let mut rng = thread_rng();
            indices.shuffle(&mut rng);
        }

        let fold_size = n_samples / n_folds;
        let mut splits = Vec::with_capacity(n_folds);

        for i in 0..n_folds {
            let test_start = i * fold_size;
            let test_end = if i == n_folds - 1 {
                n_samples
            } else {
                (i + 1) * fold_size
            };

            let test_indices: Vec<usize> = indices[test_start..test_end].to_vec();
            let train_indices: Vec<usize> = indices[..test_start]
                .iter()
                .chain(indices[test_end..].iter())
                .cloned()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
            });
        }

        splits
    }
}

/// Summary statistics for cross-validation scores
#[derive(Debug, Clone)]
pub struct CVScores {
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl CVScores {
    /// Calculate summary statistics from scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Self {
            scores,
            mean,
            std,
            min,
            max,
        }
    }

    /// Print a summary of the scores
    pub fn summary(&self) -> String {
        format!(
            "CV Scores: mean={:.4} (+/- {:.4}), min={:.4}, max={:.4}",
            self.mean,
            self.std * 2.0,
            self.min,
            self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let splits = CrossValidator::k_fold(10, 5, false);

        assert_eq!(splits.len(), 5);

        // Each test fold should have 2 samples
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            assert_eq!(split.train_indices.len(), 8);
        }

        // All indices should be covered
        let all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        assert_eq!(all_test.len(), 10);
    }

    #[test]
    fn test_k_fold_shuffled_covers_all_indices() {
        let splits = CrossValidator::k_fold(20, 4, true);

        let mut all_test: Vec<usize> =
            splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..20).collect::<Vec<usize>>());

        // Training and test must not overlap within a split
        for split in &splits {
            for train_idx in &split.train_indices {
                assert!(!split.test_indices.contains(train_idx));
            }
        }
    }

    #[test]
    fn test_cv_scores_summary() {
        let scores = CVScores::from_scores(vec![0.8, 0.9, 1.0]);
        assert!((scores.mean - 0.9).abs() < 1e-10);
        assert!((scores.min - 0.8).abs() < 1e-10);
        assert!((scores.max - 1.0).abs() < 1e-10);
        assert!(scores.summary().contains("mean=0.9000"));
    }
}
