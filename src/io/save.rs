//! Model saving

use super::format::{ModelFormat, SaveConfig};
use super::model::Model;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::Path;

/// Save a model artifact atomically
///
/// The payload is written to a sibling temp file and renamed into place, so
/// a concurrent reader observes either the previous complete artifact or the
/// new complete one, never a partial write.
pub fn save_model(model: &Model, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();

    let bytes = match config.format {
        ModelFormat::SafeTensors => serialize_safetensors(model)?,
        ModelFormat::Json => {
            let state = model.to_state();
            let json = if config.pretty {
                serde_json::to_string_pretty(&state)
            } else {
                serde_json::to_string(&state)
            }
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
            json.into_bytes()
        }
    };

    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Checkpoint(format!("invalid artifact path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn serialize_safetensors(model: &Model) -> Result<Vec<u8>> {
    // Collect byte buffers first so TensorViews can borrow them
    let tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = model
        .parameters
        .iter()
        .map(|(name, tensor)| {
            let data: Vec<f32> = tensor.data().to_vec();
            let bytes: Vec<u8> = bytemuck::cast_slice(&data).to_vec();
            (name.clone(), bytes, vec![tensor.len()])
        })
        .collect();

    let views: Vec<(&str, TensorView<'_>)> = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map_err(|e| Error::Serialization(format!("tensor view failed: {e}")))?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<_>>()?;

    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), model.metadata.name.clone());
    metadata.insert(
        "architecture".to_string(),
        model.metadata.architecture.clone(),
    );
    metadata.insert("version".to_string(), model.metadata.version.clone());
    for (key, value) in &model.metadata.custom {
        metadata.insert(key.clone(), value.to_string());
    }

    safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))
}
