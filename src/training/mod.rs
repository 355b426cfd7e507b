//! Training module
//!
//! - Per-batch optimization with cross-entropy loss and Adam
//! - Per-epoch validation on the inner backend
//! - The epoch history the curves and reports are drawn from

pub mod history;
pub mod supervised;

pub use history::{EpochRecord, MetricsHistory, PhaseMetrics};
pub use supervised::{count_correct, run_training, train_epoch, validate_epoch, EpochProgress};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 20;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 1e-4;

/// Batches between progress lines
pub const DEFAULT_LOG_EVERY: usize = 10;
