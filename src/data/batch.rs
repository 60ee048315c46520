//! Batch type

use ndarray::Array1;

/// A fixed-size ordered group of samples
///
/// All images in a batch share tensor length; the last batch of a stream may
/// hold fewer samples than the nominal batch size, but never zero. Carries
/// plain arrays only, so batches can cross the prefetch channel.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Flattened normalized images, one per sample
    pub images: Vec<Array1<f32>>,
    /// Binary labels, aligned with `images`
    pub labels: Array1<f32>,
}

impl Batch {
    pub fn new(images: Vec<Array1<f32>>, labels: Array1<f32>) -> Self {
        debug_assert_eq!(images.len(), labels.len());
        Self { images, labels }
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_len() {
        let batch = Batch::new(
            vec![Array1::zeros(4), Array1::zeros(4)],
            Array1::from(vec![0.0, 1.0]),
        );
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
