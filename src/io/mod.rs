//! Model artifact persistence
//!
//! Artifacts carry both architecture metadata and flattened weights, so a
//! saved model fully reconstructs without re-running training. Writes go
//! through a temp-file-then-rename step so concurrent readers only ever see
//! a complete artifact.

mod format;
mod load;
mod model;
mod save;

pub use format::{ModelFormat, SaveConfig};
pub use load::load_model;
pub use model::{Model, ModelMetadata, ModelState, ParameterInfo};
pub use save::save_model;
