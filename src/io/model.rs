//! Model structure for serialization

use crate::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model metadata carried inside every artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name/identifier
    pub name: String,

    /// Architecture tag, interpreted by the classifier's rebuild path
    pub architecture: String,

    /// Artifact schema version
    pub version: String,

    /// Architecture hyperparameters needed to rebuild the network
    pub custom: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: "0.1.0".to_string(),
            custom: HashMap::new(),
        }
    }

    /// Add custom metadata field
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Information about a model parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name (e.g., "block0.weight", "head.bias")
    pub name: String,

    /// Parameter shape
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: String,

    /// Whether this parameter was trainable when saved
    pub requires_grad: bool,
}

/// Serializable model state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub metadata: ModelMetadata,
    pub parameters: Vec<ParameterInfo>,
    /// Flattened parameter data, concatenated in `parameters` order
    pub data: Vec<f32>,
}

/// High-level model abstraction for I/O
pub struct Model {
    pub metadata: ModelMetadata,
    pub parameters: Vec<(String, Tensor)>,
}

impl Model {
    pub fn new(metadata: ModelMetadata, parameters: Vec<(String, Tensor)>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    /// Get parameter by name
    pub fn get_parameter(&self, name: &str) -> Option<&Tensor> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Convert model to serializable state
    pub fn to_state(&self) -> ModelState {
        let mut data = Vec::new();
        let parameters: Vec<ParameterInfo> = self
            .parameters
            .iter()
            .map(|(name, tensor)| {
                data.extend(tensor.data().iter().copied());
                ParameterInfo {
                    name: name.clone(),
                    shape: vec![tensor.len()],
                    dtype: "f32".to_string(),
                    requires_grad: tensor.requires_grad(),
                }
            })
            .collect();

        ModelState {
            metadata: self.metadata.clone(),
            parameters,
            data,
        }
    }

    /// Create model from serializable state
    pub fn from_state(state: ModelState) -> Self {
        let mut offset = 0;
        let parameters: Vec<(String, Tensor)> = state
            .parameters
            .into_iter()
            .map(|info| {
                let size: usize = info.shape.iter().product();
                let data = state.data[offset..offset + size].to_vec();
                offset += size;
                (info.name, Tensor::from_vec(data, info.requires_grad))
            })
            .collect();

        Self {
            metadata: state.metadata,
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_with_custom_fields() {
        let meta = ModelMetadata::new("leaf-classifier", "patch-dense")
            .with_custom("image_size", serde_json::json!(128))
            .with_custom("n_blocks", serde_json::json!(4));

        assert_eq!(meta.custom.len(), 2);
        assert_eq!(meta.custom.get("n_blocks").unwrap(), &serde_json::json!(4));
    }

    #[test]
    fn test_state_round_trip() {
        let params = vec![
            (
                "block0.weight".to_string(),
                Tensor::from_vec(vec![1.0, 2.0, 3.0], false),
            ),
            ("head.bias".to_string(), Tensor::from_vec(vec![0.1], true)),
        ];
        let original = Model::new(ModelMetadata::new("leaf-classifier", "patch-dense"), params);

        let restored = Model::from_state(original.to_state());

        assert_eq!(original.metadata.name, restored.metadata.name);
        assert_eq!(original.parameters.len(), restored.parameters.len());
        assert_eq!(
            original.get_parameter("block0.weight").unwrap().data(),
            restored.get_parameter("block0.weight").unwrap().data()
        );
        assert!(restored.get_parameter("head.bias").unwrap().requires_grad());
    }
}
