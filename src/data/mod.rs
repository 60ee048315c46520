//! Dataset loading and batching
//!
//! Turns a two-class labeled directory tree into restartable batch streams
//! with a deterministic train/validation split.

mod batch;
mod loader;
mod params;
mod split;

pub use batch::Batch;
pub use loader::{BatchStream, DatasetLoader, LoaderOptions, Split};
pub use params::{GeneratorParams, GENERATOR_PARAMS_FILE};
pub use split::{split_pool, SplitProportions};
