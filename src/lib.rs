//! # J-wave VGG16 fine-tuning
//!
//! Fine-tunes an ImageNet-pretrained VGG16 on a folder-labeled image dataset
//! with the Burn framework, then evaluates it on a held-out test split.
//!
//! ## Modules
//!
//! - `dataset`: Class-folder discovery, preprocessing, and batching
//! - `model`: VGG16 architecture, classifier heads, and pretrained weight loading
//! - `training`: The Adam/cross-entropy fine-tuning loop and per-epoch history
//! - `evaluation`: Test-set predictions and softmax scores for ROC curves
//! - `pipeline`: The end-to-end run and its report files
//! - `utils`: Errors, logging, metrics, ROC, and chart rendering
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jwave_finetune::backend::{default_device, TrainingBackend};
//! use jwave_finetune::{run_pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let summary = run_pipeline::<TrainingBackend>(&config, &default_device())?;
//! println!("Test Accuracy: {:.2}%", summary.test_accuracy);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::PipelineConfig;
pub use dataset::{ImageDataset, ImageFolder};
pub use model::{HeadPolicy, ModelBuilder, Vgg16, Vgg16Config};
pub use pipeline::{run_pipeline, RunSummary};
pub use training::MetricsHistory;
pub use utils::error::{Error, Result};

/// Side length images are resized to before entering the network
pub const IMAGE_SIZE: usize = 224;

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
