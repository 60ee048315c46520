//! Backbone feature extractor with a binary classification head
//!
//! The network is a parameter-free patch-pooling embed followed by dense
//! feature blocks and a single sigmoid unit. The blocks are the transferable
//! part: they can be frozen or unfrozen between training phases without
//! touching their weight values.

use crate::autograd::{add, dropout, matvec, relu, sigmoid};
use crate::error::Result;
use crate::io::{Model, ModelMetadata};
use crate::{Error, Tensor};
use ndarray::Array1;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Network shape hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Architecture {
    /// Input images are `image_size × image_size` RGB
    pub image_size: u32,
    /// Patch grid side; the embed emits `3 · grid²` features
    pub grid: usize,
    /// Width of each dense feature block
    pub hidden_dim: usize,
    /// Number of dense feature blocks
    pub n_blocks: usize,
    /// Head dropout probability, applied during training only
    pub dropout: f32,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            image_size: 128,
            grid: 8,
            hidden_dim: 64,
            n_blocks: 4,
            dropout: 0.2,
        }
    }
}

impl Architecture {
    pub fn embed_dim(&self) -> usize {
        3 * self.grid * self.grid
    }

    pub fn input_len(&self) -> usize {
        3 * (self.image_size as usize) * (self.image_size as usize)
    }

    fn block_in_dim(&self, block: usize) -> usize {
        if block == 0 {
            self.embed_dim()
        } else {
            self.hidden_dim
        }
    }
}

/// Feature extractor plus sigmoid head
///
/// Parameters live in one contiguous list: block `i` owns slots `2i`
/// (weight) and `2i + 1` (bias), the head owns the final two slots. The
/// optimizer steps over this list in place; frozen entries carry no
/// gradient and are skipped.
pub struct Backbone {
    arch: Architecture,
    params: Vec<Tensor>,
}

impl Backbone {
    /// Initialize with seeded Xavier-uniform weights, all blocks trainable
    pub fn init(arch: Architecture, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = Vec::with_capacity(2 * arch.n_blocks + 2);

        for block in 0..arch.n_blocks {
            let in_dim = arch.block_in_dim(block);
            params.push(xavier(&mut rng, arch.hidden_dim, in_dim));
            params.push(Tensor::zeros(arch.hidden_dim, true));
        }
        params.push(xavier(&mut rng, 1, arch.hidden_dim));
        params.push(Tensor::zeros(1, true));

        Self { arch, params }
    }

    pub fn arch(&self) -> &Architecture {
        &self.arch
    }

    pub fn n_blocks(&self) -> usize {
        self.arch.n_blocks
    }

    pub fn params(&self) -> &[Tensor] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    /// Forward pass over one flattened normalized image
    ///
    /// Deterministic given fixed weights when `training` is false; with
    /// `training` true the head dropout mask is freshly sampled. A wrong
    /// input length is a fatal shape mismatch.
    pub fn forward(&self, image: &Array1<f32>, training: bool) -> Result<Tensor> {
        if image.len() != self.arch.input_len() {
            return Err(Error::Training(format!(
                "input length {} does not match expected {} ({}x{}x3)",
                image.len(),
                self.arch.input_len(),
                self.arch.image_size,
                self.arch.image_size
            )));
        }

        let embedded = Tensor::new(self.embed(image), false);

        let mut x = embedded;
        for block in 0..self.arch.n_blocks {
            let w = &self.params[2 * block];
            let b = &self.params[2 * block + 1];
            let in_dim = self.arch.block_in_dim(block);
            x = relu(&add(&matvec(w, &x, self.arch.hidden_dim, in_dim), b));
        }

        if training && self.arch.dropout > 0.0 {
            x = dropout(&x, self.arch.dropout);
        }

        let head_w = &self.params[2 * self.arch.n_blocks];
        let head_b = &self.params[2 * self.arch.n_blocks + 1];
        Ok(sigmoid(&add(
            &matvec(head_w, &x, 1, self.arch.hidden_dim),
            head_b,
        )))
    }

    /// Average-pool the image over a `grid × grid` patch layout, per channel
    ///
    /// Input is pixel-interleaved RGB row-major; output is channel-major
    /// patch features. No learned parameters.
    fn embed(&self, image: &Array1<f32>) -> Array1<f32> {
        let size = self.arch.image_size as usize;
        let grid = self.arch.grid;
        let mut features = Array1::zeros(self.arch.embed_dim());

        for gy in 0..grid {
            let y0 = gy * size / grid;
            let y1 = ((gy + 1) * size / grid).max(y0 + 1);
            for gx in 0..grid {
                let x0 = gx * size / grid;
                let x1 = ((gx + 1) * size / grid).max(x0 + 1);
                let count = ((y1 - y0) * (x1 - x0)) as f32;

                let mut sums = [0.0f32; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let base = (y * size + x) * 3;
                        sums[0] += image[base];
                        sums[1] += image[base + 1];
                        sums[2] += image[base + 2];
                    }
                }
                for (c, sum) in sums.iter().enumerate() {
                    features[c * grid * grid + gy * grid + gx] = sum / count;
                }
            }
        }

        features
    }

    /// Re-partition block layers into frozen vs. trainable sets
    ///
    /// `predicate(block_index)` selects the trainable blocks; weight values
    /// are untouched. The head is always trainable.
    pub fn set_trainable(&mut self, predicate: impl Fn(usize) -> bool) {
        for block in 0..self.arch.n_blocks {
            let trainable = predicate(block);
            self.params[2 * block].set_requires_grad(trainable);
            self.params[2 * block + 1].set_requires_grad(trainable);
        }
        self.params[2 * self.arch.n_blocks].set_requires_grad(true);
        self.params[2 * self.arch.n_blocks + 1].set_requires_grad(true);
    }

    /// Number of currently trainable parameter tensors
    pub fn trainable_count(&self) -> usize {
        self.params.iter().filter(|p| p.requires_grad()).count()
    }

    /// Copy current weight values out
    pub fn snapshot(&self) -> Vec<Array1<f32>> {
        self.params.iter().map(|p| p.data().clone()).collect()
    }

    /// Copy weight values back in, preserving the trainable partition
    pub fn restore(&mut self, snapshot: &[Array1<f32>]) -> Result<()> {
        if snapshot.len() != self.params.len() {
            return Err(Error::Training(format!(
                "weight snapshot has {} tensors, model has {}",
                snapshot.len(),
                self.params.len()
            )));
        }
        for (param, saved) in self.params.iter_mut().zip(snapshot) {
            if param.len() != saved.len() {
                return Err(Error::Training(
                    "weight snapshot tensor shape mismatch".to_string(),
                ));
            }
            *param.data_mut() = saved.clone();
        }
        Ok(())
    }

    fn param_name(&self, index: usize) -> String {
        if index < 2 * self.arch.n_blocks {
            let block = index / 2;
            let kind = if index % 2 == 0 { "weight" } else { "bias" };
            format!("block{block}.{kind}")
        } else if index == 2 * self.arch.n_blocks {
            "head.weight".to_string()
        } else {
            "head.bias".to_string()
        }
    }

    /// Package the network as a persistable artifact
    pub fn to_artifact(&self, name: &str) -> Result<Model> {
        let arch_json = serde_json::to_value(&self.arch)?;
        let metadata = ModelMetadata::new(name, "patch-dense").with_custom("arch", arch_json);

        let parameters = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (self.param_name(i), p.clone()))
            .collect();

        Ok(Model::new(metadata, parameters))
    }

    /// Rebuild the network from a persisted artifact
    pub fn from_artifact(model: &Model) -> Result<Self> {
        let arch_value = model.metadata.custom.get("arch").ok_or_else(|| {
            Error::Serialization("artifact metadata is missing the architecture record".to_string())
        })?;
        let arch: Architecture = serde_json::from_value(arch_value.clone())?;

        let mut backbone = Self::init(arch, 0);
        for index in 0..backbone.params.len() {
            let name = backbone.param_name(index);
            let saved = model.get_parameter(&name).ok_or_else(|| {
                Error::Serialization(format!("artifact is missing parameter {name}"))
            })?;
            if saved.len() != backbone.params[index].len() {
                return Err(Error::Serialization(format!(
                    "parameter {name} has length {}, expected {}",
                    saved.len(),
                    backbone.params[index].len()
                )));
            }
            *backbone.params[index].data_mut() = saved.data().clone();
        }
        Ok(backbone)
    }

    /// Load an artifact file and rebuild the network
    pub fn from_pretrained(path: &Path) -> Result<Self> {
        let model = crate::io::load_model(path)?;
        Self::from_artifact(&model)
    }
}

fn xavier(rng: &mut StdRng, out_dim: usize, in_dim: usize) -> Tensor {
    let bound = (6.0 / (in_dim + out_dim) as f32).sqrt();
    let data: Vec<f32> = (0..out_dim * in_dim)
        .map(|_| rng.gen_range(-bound..bound))
        .collect();
    Tensor::from_vec(data, true)
}
