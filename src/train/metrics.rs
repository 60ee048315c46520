//! Validation metrics for binary classification

use super::EpochSnapshot;
use crate::Tensor;
use serde::{Deserialize, Serialize};

/// Trait for evaluation metrics
pub trait Metric {
    /// Compute the metric given predicted probabilities and binary targets
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32;

    /// Name of the metric
    fn name(&self) -> &str;

    /// Whether higher values are better (true) or lower (false)
    fn higher_is_better(&self) -> bool {
        true
    }
}

/// Improvement direction for a monitored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricMode {
    Max,
    Min,
}

impl MetricMode {
    /// Strict improvement test; ties never count
    pub fn improved(&self, value: f32, best: f32) -> bool {
        match self {
            MetricMode::Max => value > best,
            MetricMode::Min => value < best,
        }
    }
}

/// Which per-epoch scalar an observer or checkpoint selector watches
///
/// Configurable because the reference pipelines disagree among themselves
/// about which validation metric is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredMetric {
    ValLoss,
    ValAccuracy,
    ValPrecision,
    ValRecall,
    ValRocAuc,
    ValPrAuc,
}

impl MonitoredMetric {
    pub fn value(&self, snapshot: &EpochSnapshot) -> f32 {
        match self {
            MonitoredMetric::ValLoss => snapshot.val_loss,
            MonitoredMetric::ValAccuracy => snapshot.val_accuracy,
            MonitoredMetric::ValPrecision => snapshot.val_precision,
            MonitoredMetric::ValRecall => snapshot.val_recall,
            MonitoredMetric::ValRocAuc => snapshot.val_roc_auc,
            MonitoredMetric::ValPrAuc => snapshot.val_pr_auc,
        }
    }

    pub fn default_mode(&self) -> MetricMode {
        match self {
            MonitoredMetric::ValLoss => MetricMode::Min,
            _ => MetricMode::Max,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MonitoredMetric::ValLoss => "val_loss",
            MonitoredMetric::ValAccuracy => "val_accuracy",
            MonitoredMetric::ValPrecision => "val_precision",
            MonitoredMetric::ValRecall => "val_recall",
            MonitoredMetric::ValRocAuc => "val_roc_auc",
            MonitoredMetric::ValPrAuc => "val_pr_auc",
        }
    }
}

/// Fraction of correct thresholded predictions
#[derive(Debug, Clone)]
pub struct Accuracy {
    threshold: f32,
}

impl Accuracy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Metric for Accuracy {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(predictions.len(), targets.len());
        if predictions.is_empty() {
            return 0.0;
        }

        let correct = predictions
            .data()
            .iter()
            .zip(targets.data().iter())
            .filter(|(&p, &t)| {
                let pred_class = if p >= self.threshold { 1.0 } else { 0.0 };
                (pred_class - t).abs() < 0.5
            })
            .count();

        correct as f32 / predictions.len() as f32
    }

    fn name(&self) -> &str {
        "Accuracy"
    }
}

/// True positives / predicted positives
#[derive(Debug, Clone)]
pub struct Precision {
    threshold: f32,
}

impl Precision {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Metric for Precision {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(predictions.len(), targets.len());

        let mut true_positives = 0;
        let mut predicted_positives = 0;
        for (&p, &t) in predictions.data().iter().zip(targets.data().iter()) {
            if p >= self.threshold {
                predicted_positives += 1;
                if t >= 0.5 {
                    true_positives += 1;
                }
            }
        }

        if predicted_positives == 0 {
            return 0.0;
        }
        true_positives as f32 / predicted_positives as f32
    }

    fn name(&self) -> &str {
        "Precision"
    }
}

/// True positives / actual positives
#[derive(Debug, Clone)]
pub struct Recall {
    threshold: f32,
}

impl Recall {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for Recall {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Metric for Recall {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(predictions.len(), targets.len());

        let mut true_positives = 0;
        let mut actual_positives = 0;
        for (&p, &t) in predictions.data().iter().zip(targets.data().iter()) {
            if t >= 0.5 {
                actual_positives += 1;
                if p >= self.threshold {
                    true_positives += 1;
                }
            }
        }

        if actual_positives == 0 {
            return 0.0;
        }
        true_positives as f32 / actual_positives as f32
    }

    fn name(&self) -> &str {
        "Recall"
    }
}

/// Sort sample indices by descending score (stable on ties)
fn ranked_indices(predictions: &Tensor) -> Vec<usize> {
    let scores = predictions.data();
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Area under the ROC curve, computed from the threshold-free ranking
///
/// Degenerate inputs with a single class present score 0.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocAuc;

impl Metric for RocAuc {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(predictions.len(), targets.len());

        let labels = targets.data();
        let n_pos = labels.iter().filter(|&&t| t >= 0.5).count();
        let n_neg = labels.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return 0.5;
        }

        // Sum over positives of the negatives ranked below them
        let mut seen_neg = 0usize;
        let mut pairs_won = 0usize;
        let mut order = ranked_indices(predictions);
        order.reverse(); // ascending score
        for &i in &order {
            if labels[i] >= 0.5 {
                pairs_won += seen_neg;
            } else {
                seen_neg += 1;
            }
        }

        pairs_won as f32 / (n_pos * n_neg) as f32
    }

    fn name(&self) -> &str {
        "ROC-AUC"
    }
}

/// Area under the precision-recall curve (average precision)
///
/// Step integration over the descending-score ranking; returns 0.0 when no
/// positive samples exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrAuc;

impl Metric for PrAuc {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(predictions.len(), targets.len());

        let labels = targets.data();
        let n_pos = labels.iter().filter(|&&t| t >= 0.5).count();
        if n_pos == 0 {
            return 0.0;
        }

        let mut true_positives = 0usize;
        let mut auc = 0.0;
        for (rank, &i) in ranked_indices(predictions).iter().enumerate() {
            if labels[i] >= 0.5 {
                true_positives += 1;
                let precision = true_positives as f32 / (rank + 1) as f32;
                auc += precision / n_pos as f32;
            }
        }

        auc
    }

    fn name(&self) -> &str {
        "PR-AUC"
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn samples() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        proptest::collection::vec((0.0f32..=1.0, prop_oneof![Just(0.0f32), Just(1.0f32)]), 1..60)
            .prop_map(|pairs| pairs.into_iter().unzip())
    }

    proptest! {
        #[test]
        fn thresholded_metrics_stay_in_unit_interval((scores, labels) in samples()) {
            let pred = Tensor::from_vec(scores, false);
            let target = Tensor::from_vec(labels, false);

            for value in [
                Accuracy::default().compute(&pred, &target),
                Precision::default().compute(&pred, &target),
                Recall::default().compute(&pred, &target),
            ] {
                prop_assert!((0.0..=1.0).contains(&value));
            }
        }

        #[test]
        fn auc_metrics_stay_in_unit_interval((scores, labels) in samples()) {
            let pred = Tensor::from_vec(scores, false);
            let target = Tensor::from_vec(labels, false);

            let roc = RocAuc.compute(&pred, &target);
            let pr = PrAuc.compute(&pred, &target);
            prop_assert!((0.0..=1.0).contains(&roc));
            prop_assert!((0.0..=1.0 + 1e-5).contains(&pr));
        }

        #[test]
        fn perfectly_separated_scores_maximize_ranking_metrics(
            n_pos in 1usize..12,
            n_neg in 1usize..12,
        ) {
            let mut scores = vec![0.9f32; n_pos];
            scores.extend(vec![0.1f32; n_neg]);
            let mut labels = vec![1.0f32; n_pos];
            labels.extend(vec![0.0f32; n_neg]);

            let pred = Tensor::from_vec(scores, false);
            let target = Tensor::from_vec(labels, false);
            prop_assert!((RocAuc.compute(&pred, &target) - 1.0).abs() < 1e-5);
            prop_assert!((PrAuc.compute(&pred, &target) - 1.0).abs() < 1e-5);
        }
    }
}
