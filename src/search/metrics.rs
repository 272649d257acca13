//! Evaluation metrics and target encoding for model selection

use ndarray::{Array1, Array2};

/// Metrics calculator
pub struct Metrics;

impl Metrics {
    /// Calculate accuracy: (correct predictions) / (total predictions)
    pub fn accuracy(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> f64 {
        assert_eq!(y_true.len(), y_pred.len(), "Arrays must have same length");

        if y_true.is_empty() {
            return 0.0;
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();

        correct as f64 / y_true.len() as f64
    }
}

/// One-hot encode integer class labels into an `(n_samples, n_class)` matrix.
pub fn one_hot(labels: &Array1<usize>, n_class: usize) -> Array2<f64> {
    let mut encoded = Array2::zeros((labels.len(), n_class));
    for (i, &label) in labels.iter().enumerate() {
        assert!(
            label < n_class,
            "label {} out of range for {} classes",
            label,
            n_class
        );
        encoded[[i, label]] = 1.0;
    }
    encoded
}
