//! Best-weight checkpoint selection

use super::{MetricMode, MonitoredMetric};
use crate::error::Result;
use crate::io::SaveConfig;
use crate::model::Backbone;
use crate::Error;
use ndarray::Array1;
use std::path::PathBuf;
use tracing::{debug, info};

/// Persists the model only on strict improvement of the monitored metric
///
/// Keeps the best weights in memory as well, so a phase can end on a worse
/// epoch and still hand its best weights to the next phase. Each phase gets
/// its own selector with its own destination, since the two phases train
/// different layer partitions. Persist failures are fatal; a run that
/// silently lost its artifact would be worthless.
pub struct CheckpointSelector {
    path: PathBuf,
    monitor: MonitoredMetric,
    mode: MetricMode,
    save_config: SaveConfig,
    artifact_name: String,
    best_value: Option<f32>,
    best_epoch: Option<usize>,
    best_weights: Option<Vec<Array1<f32>>>,
}

impl CheckpointSelector {
    pub fn new(
        path: PathBuf,
        monitor: MonitoredMetric,
        mode: MetricMode,
        save_config: SaveConfig,
        artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            path,
            monitor,
            mode,
            save_config,
            artifact_name: artifact_name.into(),
            best_value: None,
            best_epoch: None,
            best_weights: None,
        }
    }

    /// Consider this epoch's monitored value; persist on strict improvement
    ///
    /// Returns whether a new checkpoint was written.
    pub fn observe(&mut self, value: f32, epoch: usize, model: &Backbone) -> Result<bool> {
        let improved = match self.best_value {
            Some(best) => self.mode.improved(value, best),
            None => true,
        };
        if !improved {
            debug!(
                monitor = self.monitor.name(),
                value,
                best = self.best_value.unwrap_or(f32::NAN),
                "no improvement, checkpoint unchanged"
            );
            return Ok(false);
        }

        self.best_value = Some(value);
        self.best_epoch = Some(epoch);
        self.best_weights = Some(model.snapshot());

        let artifact = model.to_artifact(&self.artifact_name)?;
        crate::io::save_model(&artifact, &self.path, &self.save_config).map_err(|e| {
            Error::Checkpoint(format!(
                "failed to persist checkpoint to {}: {e}",
                self.path.display()
            ))
        })?;

        info!(
            monitor = self.monitor.name(),
            value,
            epoch,
            path = %self.path.display(),
            "checkpoint saved"
        );
        Ok(true)
    }

    pub fn best_value(&self) -> Option<f32> {
        self.best_value
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Copy the best-observed weights back into the model
    ///
    /// Returns false when no epoch has improved yet (weights untouched).
    pub fn restore_best(&self, model: &mut Backbone) -> Result<bool> {
        match &self.best_weights {
            Some(weights) => {
                model.restore(weights)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
