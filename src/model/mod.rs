//! Classifier model

mod backbone;

pub use backbone::{Architecture, Backbone};
