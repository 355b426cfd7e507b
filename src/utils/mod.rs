//! Utilities: errors, logging, metrics, and chart rendering
//!
//! ## Metrics
//!
//! - Confusion matrix over the observed label set
//! - Per-class precision, recall, F1 and the text classification report
//! - ROC curves and trapezoidal AUC
//! - Running loss/accuracy accumulators for the epoch loops

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod roc;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use metrics::{ClassificationReport, ConfusionMatrix};
pub use roc::{auc, roc_curve, ClassRoc, RocCurve};
