//! Model loading

use super::format::ModelFormat;
use super::model::{Model, ModelMetadata, ModelState};
use crate::{Error, Result, Tensor};
use std::path::Path;

/// Load a model artifact, detecting the format from the file extension
pub fn load_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Serialization(format!("artifact has no extension: {}", path.display())))?;

    let format = ModelFormat::from_extension(ext)
        .ok_or_else(|| Error::Serialization(format!("unsupported artifact extension: {ext}")))?;

    match format {
        ModelFormat::SafeTensors => load_safetensors(path),
        ModelFormat::Json => {
            let content = std::fs::read_to_string(path)?;
            let state: ModelState = serde_json::from_str(&content)
                .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?;
            Ok(Model::from_state(state))
        }
    }
}

fn load_safetensors(path: &Path) -> Result<Model> {
    let data = std::fs::read(path)?;

    let (_, st_metadata) = safetensors::SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let custom_meta = st_metadata.metadata();
    let lookup = |key: &str| -> String {
        custom_meta
            .as_ref()
            .and_then(|m| m.get(key).cloned())
            .unwrap_or_else(|| "unknown".to_string())
    };
    let mut metadata = ModelMetadata::new(lookup("name"), lookup("architecture"));
    if let Some(map) = custom_meta.as_ref() {
        for (key, value) in map {
            if matches!(key.as_str(), "name" | "architecture" | "version") {
                continue;
            }
            let parsed = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            metadata = metadata.with_custom(key.clone(), parsed);
        }
    }

    let safetensors = safetensors::SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut parameters: Vec<(String, Tensor)> = Vec::new();
    for name in safetensors.names() {
        let view = safetensors
            .tensor(name)
            .map_err(|e| Error::Serialization(format!("missing tensor {name}: {e}")))?;
        let values: &[f32] = bytemuck::cast_slice(view.data());
        parameters.push((name.to_string(), Tensor::from_vec(values.to_vec(), false)));
    }
    // safetensors stores names in its own order; artifact consumers look
    // parameters up by name, not position
    parameters.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(Model::new(metadata, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{save_model, SaveConfig};
    use tempfile::TempDir;

    fn sample_model() -> Model {
        let params = vec![
            (
                "block0.weight".to_string(),
                Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false),
            ),
            ("head.bias".to_string(), Tensor::from_vec(vec![0.5], true)),
        ];
        Model::new(
            ModelMetadata::new("leaf-classifier", "patch-dense")
                .with_custom("image_size", serde_json::json!(64)),
            params,
        )
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let original = sample_model();
        save_model(&original, &path, &SaveConfig::default()).unwrap();

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.metadata.name, "leaf-classifier");
        assert_eq!(
            loaded.get_parameter("block0.weight").unwrap().data(),
            original.get_parameter("block0.weight").unwrap().data()
        );
    }

    #[test]
    fn test_safetensors_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");
        let original = sample_model();
        save_model(&original, &path, &SaveConfig::new(ModelFormat::SafeTensors)).unwrap();

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.metadata.name, "leaf-classifier");
        assert_eq!(
            loaded.metadata.custom.get("image_size"),
            Some(&serde_json::json!(64))
        );
        assert_eq!(
            loaded.get_parameter("head.bias").unwrap().data(),
            original.get_parameter("head.bias").unwrap().data()
        );
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"junk").unwrap();
        assert!(matches!(
            load_model(&path),
            Err(Error::Serialization(_))
        ));
    }
}
