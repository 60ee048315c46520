//! Opaque hyperparameter record
//!
//! A key/value bundle written once at data-prep time and re-read unchanged
//! by training and evaluation. The pipeline never interprets values beyond
//! the keys it was handed.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// File name the training run uses to park its record next to the final
/// model artifact; evaluation looks it up there
pub const GENERATOR_PARAMS_FILE: &str = "generator_params.json";

/// Immutable configuration bundle shared across pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratorParams(BTreeMap<String, serde_json::Value>);

impl GeneratorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Persist as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously persisted record
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
