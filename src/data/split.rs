//! Offline dataset partitioning
//!
//! Prepares a train/val/test directory tree from a flat two-class image
//! pool, ahead of any training run.

use crate::error::Result;
use crate::Error;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Fractional assignment of the pool to train/val/test
#[derive(Debug, Clone, Copy)]
pub struct SplitProportions {
    pub train: f32,
    pub val: f32,
    pub test: f32,
}

impl Default for SplitProportions {
    fn default() -> Self {
        Self {
            train: 0.70,
            val: 0.15,
            test: 0.15,
        }
    }
}

impl SplitProportions {
    fn validate(&self) -> Result<()> {
        let sum = self.train + self.val + self.test;
        if !(0.999..=1.001).contains(&sum) {
            return Err(Error::Config(format!(
                "split proportions must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Partition a two-class image pool into train/val/test directory trees
///
/// Shuffles each class with the given seed, then copies files into
/// `dst/{train,val,test}/<class>/`. Returns per-subset file counts in
/// (train, val, test) order.
pub fn split_pool(
    src: &Path,
    dst: &Path,
    proportions: SplitProportions,
    seed: u64,
) -> Result<(usize, usize, usize)> {
    proportions.validate()?;
    if !src.is_dir() {
        return Err(Error::DataSource(format!(
            "split source directory not found: {}",
            src.display()
        )));
    }

    let mut class_dirs: Vec<PathBuf> = fs::read_dir(src)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    class_dirs.sort();

    if class_dirs.len() != 2 {
        return Err(Error::DataSource(format!(
            "expected exactly 2 class sub-directories under {}, found {}",
            src.display(),
            class_dirs.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = (0, 0, 0);

    for class_dir in &class_dirs {
        let class_name = class_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files: Vec<PathBuf> = fs::read_dir(class_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files.shuffle(&mut rng);

        let n = files.len();
        let n_train = (n as f32 * proportions.train).floor() as usize;
        let n_val = (n as f32 * proportions.val).floor() as usize;

        for (i, file) in files.iter().enumerate() {
            let subset = if i < n_train {
                counts.0 += 1;
                "train"
            } else if i < n_train + n_val {
                counts.1 += 1;
                "val"
            } else {
                counts.2 += 1;
                "test"
            };

            let out_dir = dst.join(subset).join(&class_name);
            fs::create_dir_all(&out_dir)?;
            let name = file
                .file_name()
                .ok_or_else(|| Error::DataSource(format!("bad file name: {}", file.display())))?;
            fs::copy(file, out_dir.join(name))?;
        }
    }

    info!(
        train = counts.0,
        val = counts.1,
        test = counts.2,
        dst = %dst.display(),
        "dataset split complete"
    );
    Ok(counts)
}
