//! Epoch-end observers
//!
//! After each validation pass the orchestrator hands the epoch snapshot to
//! every observer and combines their signals: any `Stop` wins over
//! `Continue`, and `ScaleLr` factors multiply cumulatively before being
//! applied to the live optimizer.

use super::{EpochSnapshot, MetricMode, MonitoredMetric};
use tracing::info;

/// What an observer wants the orchestrator to do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpochSignal {
    Continue,
    /// End the current phase after this epoch
    Stop,
    /// Multiply the current learning rate by this factor
    ScaleLr(f32),
}

/// Capability polled once per completed epoch
pub trait EpochObserver {
    fn on_epoch_end(&mut self, snapshot: &EpochSnapshot) -> EpochSignal;
}

/// Stop a phase when the monitored metric stops improving
///
/// Improvement is strict under the configured mode; `patience` consecutive
/// non-improving epochs end the phase.
pub struct EarlyStopping {
    monitor: MonitoredMetric,
    mode: MetricMode,
    patience: usize,
    best: Option<f32>,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(monitor: MonitoredMetric, mode: MetricMode, patience: usize) -> Self {
        Self {
            monitor,
            mode,
            patience,
            best: None,
            stale_epochs: 0,
        }
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }
}

impl EpochObserver for EarlyStopping {
    fn on_epoch_end(&mut self, snapshot: &EpochSnapshot) -> EpochSignal {
        let value = self.monitor.value(snapshot);

        let improved = match self.best {
            Some(best) => self.mode.improved(value, best),
            None => true,
        };

        if improved {
            self.best = Some(value);
            self.stale_epochs = 0;
            return EpochSignal::Continue;
        }

        self.stale_epochs += 1;
        if self.stale_epochs >= self.patience {
            info!(
                monitor = self.monitor.name(),
                patience = self.patience,
                "early stopping triggered"
            );
            EpochSignal::Stop
        } else {
            EpochSignal::Continue
        }
    }
}

/// Halve the learning rate when validation loss plateaus
///
/// Runs its own patience window, independent of early stopping and phase
/// transitions; it can fire multiple times within one phase.
pub struct ReduceLrOnPlateau {
    monitor: MonitoredMetric,
    mode: MetricMode,
    patience: usize,
    factor: f32,
    best: Option<f32>,
    stale_epochs: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(patience: usize, factor: f32) -> Self {
        Self {
            monitor: MonitoredMetric::ValLoss,
            mode: MetricMode::Min,
            patience,
            factor,
            best: None,
            stale_epochs: 0,
        }
    }
}

impl EpochObserver for ReduceLrOnPlateau {
    fn on_epoch_end(&mut self, snapshot: &EpochSnapshot) -> EpochSignal {
        let value = self.monitor.value(snapshot);

        let improved = match self.best {
            Some(best) => self.mode.improved(value, best),
            None => true,
        };

        if improved {
            self.best = Some(value);
            self.stale_epochs = 0;
            return EpochSignal::Continue;
        }

        self.stale_epochs += 1;
        if self.stale_epochs >= self.patience {
            self.stale_epochs = 0;
            info!(factor = self.factor, "validation loss plateau, reducing learning rate");
            EpochSignal::ScaleLr(self.factor)
        } else {
            EpochSignal::Continue
        }
    }
}

/// Logs each epoch's metrics; never influences control flow
#[derive(Default)]
pub struct ProgressObserver;

impl EpochObserver for ProgressObserver {
    fn on_epoch_end(&mut self, snapshot: &EpochSnapshot) -> EpochSignal {
        info!(
            phase = %snapshot.phase,
            epoch = snapshot.epoch,
            train_loss = snapshot.train_loss,
            val_loss = snapshot.val_loss,
            val_accuracy = snapshot.val_accuracy,
            val_pr_auc = snapshot.val_pr_auc,
            lr = snapshot.lr,
            "epoch complete"
        );
        EpochSignal::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(pr_auc: f32, val_loss: f32) -> EpochSnapshot {
        EpochSnapshot {
            phase: "warmup".to_string(),
            epoch: 1,
            train_loss: 0.5,
            val_loss,
            val_accuracy: 0.0,
            val_precision: 0.0,
            val_recall: 0.0,
            val_roc_auc: 0.0,
            val_pr_auc: pr_auc,
            lr: 1e-3,
        }
    }

    #[test]
    fn test_early_stopping_scenario() {
        // Peak at the 2nd value, then 3 non-improvements with patience 3
        let mut stopper = EarlyStopping::new(MonitoredMetric::ValPrAuc, MetricMode::Max, 3);
        let values = [0.70, 0.72, 0.71, 0.71, 0.71];
        let mut signals = Vec::new();
        for v in values {
            signals.push(stopper.on_epoch_end(&snapshot_with(v, 0.5)));
        }

        assert_eq!(signals[0], EpochSignal::Continue);
        assert_eq!(signals[1], EpochSignal::Continue);
        assert_eq!(signals[2], EpochSignal::Continue);
        assert_eq!(signals[3], EpochSignal::Continue);
        assert_eq!(signals[4], EpochSignal::Stop);
        assert_eq!(stopper.best(), Some(0.72));
    }

    #[test]
    fn test_early_stopping_ties_do_not_count_as_improvement() {
        let mut stopper = EarlyStopping::new(MonitoredMetric::ValPrAuc, MetricMode::Max, 2);
        assert_eq!(stopper.on_epoch_end(&snapshot_with(0.7, 0.5)), EpochSignal::Continue);
        assert_eq!(stopper.on_epoch_end(&snapshot_with(0.7, 0.5)), EpochSignal::Continue);
        assert_eq!(stopper.on_epoch_end(&snapshot_with(0.7, 0.5)), EpochSignal::Stop);
    }

    #[test]
    fn test_reduce_lr_fires_and_can_fire_again() {
        let mut reducer = ReduceLrOnPlateau::new(2, 0.5);
        assert_eq!(reducer.on_epoch_end(&snapshot_with(0.0, 0.50)), EpochSignal::Continue);
        assert_eq!(reducer.on_epoch_end(&snapshot_with(0.0, 0.55)), EpochSignal::Continue);
        assert_eq!(
            reducer.on_epoch_end(&snapshot_with(0.0, 0.55)),
            EpochSignal::ScaleLr(0.5)
        );
        // Patience resets after firing
        assert_eq!(reducer.on_epoch_end(&snapshot_with(0.0, 0.55)), EpochSignal::Continue);
        assert_eq!(
            reducer.on_epoch_end(&snapshot_with(0.0, 0.55)),
            EpochSignal::ScaleLr(0.5)
        );
    }

    #[test]
    fn test_reduce_lr_resets_on_improvement() {
        let mut reducer = ReduceLrOnPlateau::new(2, 0.5);
        reducer.on_epoch_end(&snapshot_with(0.0, 0.50));
        reducer.on_epoch_end(&snapshot_with(0.0, 0.55));
        assert_eq!(reducer.on_epoch_end(&snapshot_with(0.0, 0.40)), EpochSignal::Continue);
        assert_eq!(reducer.on_epoch_end(&snapshot_with(0.0, 0.45)), EpochSignal::Continue);
    }

    #[test]
    fn test_progress_observer_always_continues() {
        let mut progress = ProgressObserver;
        assert_eq!(
            progress.on_epoch_end(&snapshot_with(0.9, 0.1)),
            EpochSignal::Continue
        );
    }
}
