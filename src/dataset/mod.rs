//! Dataset module
//!
//! - Scanning `train_data`/`val_data`/`test_data` style image folders
//! - The fixed resize + ImageNet normalization transform
//! - Burn `Dataset`/`Batcher` implementations and batch ordering

pub mod burn_dataset;
pub mod loader;
pub mod preprocess;

pub use burn_dataset::{BatchPlan, ImageBatch, ImageBatcher, ImageDataset, ImageItem};
pub use loader::{DatasetStats, ImageFolder, ImageSample};
pub use preprocess::{Preprocessor, IMAGENET_MEAN, IMAGENET_STD, IMAGE_EXTENSIONS};
