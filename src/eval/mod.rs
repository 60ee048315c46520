//! Held-out evaluation of a persisted artifact

use crate::augment::AugmentationPolicy;
use crate::data::{DatasetLoader, LoaderOptions, Split};
use crate::error::Result;
use crate::model::Backbone;
use crate::train::{Accuracy, BinaryCrossEntropy, LossFn, Metric};
use crate::{Error, Tensor};
use std::path::Path;
use tracing::info;

/// Evaluation outcome over a held-out directory
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
    pub samples: usize,
}

/// Load an artifact and score it over a two-class directory tree
///
/// The stream is rescale-only (no augmentation, no shuffling) and covers
/// every usable file under the directory; the image size comes from the
/// artifact's architecture record.
pub fn evaluate_directory(artifact: &Path, data_root: &Path, batch_size: usize) -> Result<Evaluation> {
    let model = Backbone::from_pretrained(artifact)?;

    let loader = DatasetLoader::open(
        data_root,
        LoaderOptions {
            image_size: model.arch().image_size,
            batch_size,
            // Everything lands in the validation split
            split_fraction: 0.0,
            seed: 0,
        },
    )?;

    let identity = AugmentationPolicy::identity();
    let mut predictions = Vec::new();
    let mut targets = Vec::new();

    for batch in loader.stream(Split::Validation, &identity) {
        for (image, &label) in batch.images.iter().zip(batch.labels.iter()) {
            let output = model.forward(image, false)?;
            predictions.push(output.data()[0]);
            targets.push(label);
        }
    }

    if predictions.is_empty() {
        return Err(Error::DataSource(format!(
            "no decodable images under {}",
            data_root.display()
        )));
    }

    let samples = predictions.len();
    let predictions = Tensor::from_vec(predictions, false);
    let targets = Tensor::from_vec(targets, false);

    let evaluation = Evaluation {
        loss: BinaryCrossEntropy.forward(&predictions, &targets).data()[0],
        accuracy: Accuracy::default().compute(&predictions, &targets),
        samples,
    };

    info!(
        loss = evaluation.loss,
        accuracy = evaluation.accuracy,
        samples = evaluation.samples,
        "evaluation complete"
    );
    Ok(evaluation)
}
