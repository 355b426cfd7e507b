//! Pretrained weights and head replacement
//!
//! Loads ImageNet VGG16 weights (torchvision `.pth` or a burn record) and
//! applies the configured [`HeadPolicy`].

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{CompactRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::vgg::{HeadKind, Vgg16, Vgg16Config};
use crate::utils::error::{Error, Result};

/// torchvision `features.<i>` indices of the 13 convolutions
const TORCHVISION_CONV_INDICES: [usize; 13] = [0, 2, 5, 7, 10, 12, 14, 17, 19, 21, 24, 26, 28];

/// torchvision `classifier.<i>` indices of the three linear layers
const TORCHVISION_LINEAR_KEYS: [(usize, &str); 3] = [(0, "fc1"), (3, "fc2"), (6, "fc3")];

/// What the trained model ends in
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HeadPolicy {
    /// Build the custom head, then reload the pretrained network and train
    /// its original 1000-way classifier
    #[default]
    Overwritten,
    /// Train the truncated classifier plus the custom head
    Custom,
}

impl std::fmt::Display for HeadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadPolicy::Overwritten => write!(f, "overwritten"),
            HeadPolicy::Custom => write!(f, "custom"),
        }
    }
}

/// Key remapping from torchvision parameter names to [`Vgg16`] fields
fn torchvision_load_args(path: &Path) -> LoadArgs {
    let mut args = LoadArgs::new(path.to_path_buf());

    for (position, index) in TORCHVISION_CONV_INDICES.iter().enumerate() {
        args = args.with_key_remap(
            &format!(r"^features\.{}\.(.+)$", index),
            &format!("convs.{}.$1", position),
        );
    }
    for (index, name) in TORCHVISION_LINEAR_KEYS {
        args = args.with_key_remap(
            &format!(r"^classifier\.{}\.(.+)$", index),
            &format!("classifier.{}.$1", name),
        );
    }

    args
}

/// Load weights into a network described by `config`
///
/// `.pth`/`.pt` files are read as PyTorch checkpoints, anything else as a
/// burn `CompactRecorder` file.
pub fn load_pretrained<B: Backend>(
    config: &Vgg16Config,
    path: &Path,
    device: &B::Device,
) -> Result<Vgg16<B>> {
    if !path.exists() {
        return Err(Error::PathNotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let model = config.init::<B>(device);
    let model = match extension.as_str() {
        "pth" | "pt" => {
            let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load(torchvision_load_args(path), device)?;
            model.load_record(record)
        }
        _ => model.load_file(path, &CompactRecorder::new(), device)?,
    };

    info!("Loaded pretrained weights from {:?}", path);
    Ok(model)
}

/// A constructed network and how its head came to be
#[derive(Debug)]
pub struct BuiltModel<B: Backend> {
    pub model: Vgg16<B>,
    pub head_kind: HeadKind,
    /// The custom head was built and then thrown away by the reload
    pub custom_head_discarded: bool,
}

/// Builds the network that gets fine-tuned
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pub config: Vgg16Config,
    pub weights: Option<PathBuf>,
    pub policy: HeadPolicy,
}

impl ModelBuilder {
    pub fn new(config: Vgg16Config, weights: Option<PathBuf>, policy: HeadPolicy) -> Self {
        Self {
            config,
            weights,
            policy,
        }
    }

    fn base_model<B: Backend>(&self, device: &B::Device) -> Result<Vgg16<B>> {
        match &self.weights {
            Some(path) => load_pretrained(&self.config, path, device),
            None => {
                warn!("No pretrained weights configured, using random initialization");
                Ok(self.config.init(device))
            }
        }
    }

    /// Load the backbone, attach a head for `num_classes`, apply the policy
    pub fn build<B: Backend>(&self, num_classes: usize, device: &B::Device) -> Result<BuiltModel<B>> {
        if num_classes == 0 {
            return Err(Error::Model("cannot build a head for zero classes".to_string()));
        }

        let model = self.base_model::<B>(device)?.with_custom_head(num_classes, device);
        info!("Custom head attached for {} classes", num_classes);

        let built = match self.policy {
            HeadPolicy::Custom => BuiltModel {
                head_kind: model.head_kind(),
                model,
                custom_head_discarded: false,
            },
            HeadPolicy::Overwritten => {
                if num_classes > self.config.num_classes {
                    return Err(Error::Model(format!(
                        "{} classes do not fit the {}-way original classifier",
                        num_classes, self.config.num_classes
                    )));
                }
                warn!(
                    "Custom head discarded: the model is reloaded and trained with its original {}-way classifier",
                    self.config.num_classes
                );
                let model = self.base_model::<B>(device)?;
                BuiltModel {
                    head_kind: model.head_kind(),
                    model,
                    custom_head_discarded: true,
                }
            }
        };

        for line in built.model.head_summary() {
            tracing::debug!("  {}", line);
        }
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::vgg::tests::tiny_config;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_overwritten_policy_keeps_original_head() {
        let device = NdArrayDevice::default();
        let built = ModelBuilder::new(tiny_config(), None, HeadPolicy::Overwritten)
            .build::<TestBackend>(3, &device)
            .unwrap();

        assert_eq!(built.head_kind, HeadKind::Original);
        assert!(built.custom_head_discarded);
        assert_eq!(built.model.num_outputs(), 6);
    }

    #[test]
    fn test_custom_policy_trains_custom_head() {
        let device = NdArrayDevice::default();
        let built = ModelBuilder::new(tiny_config(), None, HeadPolicy::Custom)
            .build::<TestBackend>(3, &device)
            .unwrap();

        assert_eq!(built.head_kind, HeadKind::Custom);
        assert!(!built.custom_head_discarded);
        assert_eq!(built.model.num_outputs(), 3);
    }

    #[test]
    fn test_overwritten_rejects_too_many_classes() {
        let device = NdArrayDevice::default();
        let result = ModelBuilder::new(tiny_config(), None, HeadPolicy::Overwritten)
            .build::<TestBackend>(7, &device);
        assert!(matches!(result, Err(Error::Model(_))));
    }

    #[test]
    fn test_missing_weights_file() {
        let device = NdArrayDevice::default();
        let builder = ModelBuilder::new(
            tiny_config(),
            Some(PathBuf::from("/nonexistent/vgg16.pth")),
            HeadPolicy::Custom,
        );
        let result = builder.build::<TestBackend>(2, &device);
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_same_weights_same_head() {
        let tmp = TempDir::new().unwrap();
        let device = NdArrayDevice::default();

        tiny_config()
            .init::<TestBackend>(&device)
            .save_file(tmp.path().join("vgg_tiny"), &CompactRecorder::new())
            .unwrap();
        let weights = tmp.path().join("vgg_tiny.mpk");

        let builder = ModelBuilder::new(tiny_config(), Some(weights), HeadPolicy::Custom);
        let first = builder.build::<TestBackend>(2, &device).unwrap();
        let second = builder.build::<TestBackend>(2, &device).unwrap();

        assert_eq!(first.model.head_summary(), second.model.head_summary());
        assert!(first
            .model
            .head_summary()
            .iter()
            .any(|line| line.starts_with("Conv2d")));

        let fc1_a: Vec<f32> = first.model.classifier.fc1.weight.val().into_data().iter::<f32>().collect();
        let fc1_b: Vec<f32> = second.model.classifier.fc1.weight.val().into_data().iter::<f32>().collect();
        assert_eq!(fc1_a, fc1_b);
    }

    #[test]
    fn test_head_policy_display() {
        assert_eq!(HeadPolicy::default(), HeadPolicy::Overwritten);
        assert_eq!(HeadPolicy::Custom.to_string(), "custom");
    }
}
