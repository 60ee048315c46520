//! Per-epoch metric history

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scalar metrics for one completed epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSnapshot {
    /// Phase label ("warmup" / "finetune")
    pub phase: String,
    /// 1-based epoch index within the phase
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    pub val_precision: f32,
    pub val_recall: f32,
    pub val_roc_auc: f32,
    pub val_pr_auc: f32,
    /// Learning rate in effect during the epoch
    pub lr: f32,
}

/// Append-only sequence of epoch snapshots
///
/// One entry per completed epoch across both phases; entries are never
/// mutated after append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricHistory {
    snapshots: Vec<EpochSnapshot>,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: EpochSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn snapshots(&self) -> &[EpochSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&EpochSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Externalize the full history as pretty JSON
    pub fn export(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
