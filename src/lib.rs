//! Leaf photograph diagnosis service.
//!
//! An uploaded image is validated, normalized to the classifier's input
//! shape, scored against a fixed 38-class vocabulary and, when the model is
//! confident enough, mapped to a treatment recommendation.

pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod knowledge;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod preprocess;
