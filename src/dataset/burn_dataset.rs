//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` over an [`ImageFolder`] split,
//! plus the per-epoch batch ordering used by the training and evaluation
//! loops.

use std::sync::atomic::{AtomicUsize, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::{ImageFolder, ImageSample};
use crate::dataset::preprocess::Preprocessor;
use crate::utils::error::{Error, Result};

/// A single preprocessed item ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageItem {
    /// Normalized image as a flattened CHW array `[3 * H * W]`
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
}

/// Folder split implementing Burn's `Dataset` trait
///
/// Images are decoded on demand unless the dataset was built with
/// [`ImageDataset::new_cached`].
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Vec<ImageSample>,
    preprocessor: Preprocessor,
    cached_items: Option<Vec<ImageItem>>,
}

impl ImageDataset {
    /// Lazily loading dataset
    pub fn new(samples: Vec<ImageSample>, preprocessor: Preprocessor) -> Self {
        Self {
            samples,
            preprocessor,
            cached_items: None,
        }
    }

    /// Decode every image up front, in parallel
    pub fn new_cached(samples: Vec<ImageSample>, preprocessor: Preprocessor) -> Result<Self> {
        let total = samples.len();
        tracing::info!("Pre-loading {} images into memory", total);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let loaded = AtomicUsize::new(0);
        let cached_items = samples
            .par_iter()
            .map(|sample| {
                let image = preprocessor.load(&sample.path)?;
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                Ok(ImageItem {
                    image,
                    label: sample.label,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        pb.finish_with_message(format!("Loaded {} images", cached_items.len()));

        Ok(Self {
            samples,
            preprocessor,
            cached_items: Some(cached_items),
        })
    }

    /// Build from a scanned folder, optionally pre-loading every image
    pub fn from_folder(folder: &ImageFolder, preprocessor: Preprocessor, cache: bool) -> Result<Self> {
        if cache {
            Self::new_cached(folder.samples.clone(), preprocessor)
        } else {
            Ok(Self::new(folder.samples.clone(), preprocessor))
        }
    }

    pub fn image_size(&self) -> usize {
        self.preprocessor.image_size
    }

    pub fn is_cached(&self) -> bool {
        self.cached_items.is_some()
    }

    /// Labels in sample order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Load one item, surfacing decode failures
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        if let Some(ref cached) = self.cached_items {
            return cached
                .get(index)
                .cloned()
                .ok_or_else(|| out_of_range(index, cached.len()));
        }

        let sample = self
            .samples
            .get(index)
            .ok_or_else(|| out_of_range(index, self.samples.len()))?;

        Ok(ImageItem {
            image: self.preprocessor.load(&sample.path)?,
            label: sample.label,
        })
    }

    /// Load the items at `indices`, decoding in parallel when not cached
    pub fn load_batch(&self, indices: &[usize]) -> Result<Vec<ImageItem>> {
        if self.is_cached() {
            return indices.iter().map(|&i| self.try_get(i)).collect();
        }
        indices.par_iter().map(|&i| self.try_get(i)).collect()
    }
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::Dataset(format!("index {} out of range for {} samples", index, len))
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::error!("{}", err);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images with their targets
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images with shape `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks preprocessed items into tensors
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

/// Index order for one pass over a dataset
#[derive(Debug, Clone)]
pub struct BatchPlan {
    indices: Vec<usize>,
    batch_size: usize,
}

impl BatchPlan {
    /// In-order batches
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        Self {
            indices: (0..len).collect(),
            batch_size: batch_size.max(1),
        }
    }

    /// Batches over a fresh permutation drawn from `rng`
    pub fn shuffled(len: usize, batch_size: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut plan = Self::sequential(len, batch_size);
        plan.indices.shuffle(rng);
        plan
    }

    /// `ceil(len / batch_size)`; the last batch may be short
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn batches(&self) -> impl Iterator<Item = &[usize]> {
        self.indices.chunks(self.batch_size)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
