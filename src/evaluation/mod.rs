//! Evaluation module
//!
//! Test-set predictions, score rows for the ROC curves, and the per-class
//! ROC computation built on them.

pub mod evaluator;

pub use evaluator::{collect_scores, predict, Predictions, ScoredPredictions, Scoring};
