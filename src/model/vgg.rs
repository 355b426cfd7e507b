//! VGG16 Architecture
//!
//! Layer layout and parameter names follow the torchvision checkpoint so the
//! ImageNet weights can be mapped onto it. The classifier can be swapped for
//! a small 1×1-conv head sized to the target label set.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// Channel multipliers of the 13 convolutions, relative to `base_channels`
const CONV_MULTIPLIERS: [usize; 13] = [1, 1, 2, 2, 4, 4, 4, 8, 8, 8, 8, 8, 8];

/// Convolutions followed by a 2×2 max pool
const POOL_AFTER: [usize; 5] = [1, 3, 6, 9, 12];

/// Width of the replacement head
pub const HEAD_WIDTH: usize = 512;

/// Configuration for [`Vgg16`]
#[derive(Config, Debug)]
pub struct Vgg16Config {
    /// Outputs of the original classifier (1000 for ImageNet)
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Channels of the first conv block
    #[config(default = "64")]
    pub base_channels: usize,

    /// Width of the two hidden classifier layers
    #[config(default = "4096")]
    pub hidden_units: usize,

    /// Side of the adaptive average pool before the classifier
    #[config(default = "7")]
    pub pool_output: usize,

    #[config(default = "0.5")]
    pub dropout: f64,
}

impl Vgg16Config {
    /// Features entering the classifier (`512 * 7 * 7` at full size)
    pub fn flattened_features(&self) -> usize {
        self.base_channels * 8 * self.pool_output * self.pool_output
    }

    /// Randomly initialized network with the original classifier
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        let mut in_channels = 3;
        let convs = CONV_MULTIPLIERS
            .iter()
            .map(|m| {
                let out_channels = self.base_channels * m;
                let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device);
                in_channels = out_channels;
                conv
            })
            .collect();

        Vgg16 {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([self.pool_output, self.pool_output]).init(),
            classifier: Classifier {
                fc1: LinearConfig::new(self.flattened_features(), self.hidden_units).init(device),
                fc2: LinearConfig::new(self.hidden_units, self.hidden_units).init(device),
                fc3: Some(LinearConfig::new(self.hidden_units, self.num_classes).init(device)),
                dropout: DropoutConfig::new(self.dropout).init(),
            },
            custom_head: None,
        }
    }
}

/// Fully connected classifier
///
/// `fc3` is `None` once the last three layers have been cut off.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub fc3: Option<Linear<B>>,
    pub dropout: Dropout,
}

impl<B: Backend> Classifier<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        let x = self.fc2.forward(x);

        match &self.fc3 {
            Some(fc3) => {
                let x = Relu::new().forward(x);
                let x = self.dropout.forward(x);
                fc3.forward(x)
            }
            None => x,
        }
    }
}

/// 1×1 conv head appended to the truncated classifier
///
/// Input is the `[N, hidden]` output of `fc2`, viewed as `[N, hidden, 1, 1]`.
/// Output rows are probabilities.
#[derive(Module, Debug)]
pub struct CustomHead<B: Backend> {
    pub conv: Conv2d<B>,
    pub pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> CustomHead<B> {
    pub fn new(in_features: usize, num_classes: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_features, HEAD_WIDTH], [1, 1]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(HEAD_WIDTH, HEAD_WIDTH).init(device),
            fc2: LinearConfig::new(HEAD_WIDTH, num_classes).init(device),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.fc2.weight.dims()[1]
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, features] = x.dims();
        let x = x.reshape([batch_size, features, 1, 1]);

        let x = self.conv.forward(x);
        let x = Relu::new().forward(x);
        let x = self.pool.forward(x);
        let x = x.reshape([batch_size, HEAD_WIDTH]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.fc2.forward(x);

        softmax(x, 1)
    }
}

/// Which classifier a [`Vgg16`] currently ends in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadKind {
    /// The 3-layer classifier the network was built or loaded with
    Original,
    /// Truncated classifier followed by [`CustomHead`]
    Custom,
    /// Truncated classifier with nothing appended
    Truncated,
}

impl std::fmt::Display for HeadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadKind::Original => write!(f, "original"),
            HeadKind::Custom => write!(f, "custom"),
            HeadKind::Truncated => write!(f, "truncated"),
        }
    }
}

/// VGG16 network
///
/// `convs` holds the 13 convolutions; the ReLU and pooling layers of the
/// torchvision `features` block carry no parameters.
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool: MaxPool2d,
    pub avgpool: AdaptiveAvgPool2d,
    pub classifier: Classifier<B>,
    pub custom_head: Option<CustomHead<B>>,
}

impl<B: Backend> Vgg16<B> {
    /// Convolutional feature extractor: `[N, 3, H, W]` → `[N, C, H/32, W/32]`
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        for (i, conv) in self.convs.iter().enumerate() {
            x = Relu::new().forward(conv.forward(x));
            if POOL_AFTER.contains(&i) {
                x = self.pool.forward(x);
            }
        }
        x
    }

    /// Class scores `[N, num_classes]`
    ///
    /// Logits for the original classifier, probabilities for the custom head.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.features(x);
        let x = self.avgpool.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.classifier.forward(x);
        match &self.custom_head {
            Some(head) => head.forward(x),
            None => x,
        }
    }

    /// Drop the last three classifier layers (ReLU, Dropout, Linear)
    pub fn truncate_classifier(mut self) -> Self {
        self.classifier.fc3 = None;
        self
    }

    /// Truncate the classifier and append a fresh [`CustomHead`]
    pub fn with_custom_head(self, num_classes: usize, device: &B::Device) -> Self {
        let mut model = self.truncate_classifier();
        let hidden = model.classifier.fc2.weight.dims()[1];
        model.custom_head = Some(CustomHead::new(hidden, num_classes, device));
        model
    }

    pub fn head_kind(&self) -> HeadKind {
        match (&self.classifier.fc3, &self.custom_head) {
            (_, Some(_)) => HeadKind::Custom,
            (Some(_), None) => HeadKind::Original,
            (None, None) => HeadKind::Truncated,
        }
    }

    /// Width of the output row
    pub fn num_outputs(&self) -> usize {
        match (&self.classifier.fc3, &self.custom_head) {
            (_, Some(head)) => head.num_classes(),
            (Some(fc3), None) => fc3.weight.dims()[1],
            (None, None) => self.classifier.fc2.weight.dims()[1],
        }
    }

    /// Layer-by-layer description of everything after the pooling stage
    pub fn head_summary(&self) -> Vec<String> {
        let linear = |layer: &Linear<B>| {
            let [input, output] = layer.weight.dims();
            format!("Linear(in_features={}, out_features={})", input, output)
        };
        let dropout = format!("Dropout(p={})", self.classifier.dropout.prob);

        let mut lines = vec![
            linear(&self.classifier.fc1),
            "ReLU".to_string(),
            dropout.clone(),
            linear(&self.classifier.fc2),
        ];

        if let Some(fc3) = &self.classifier.fc3 {
            lines.extend(["ReLU".to_string(), dropout, linear(fc3)]);
        }

        if let Some(head) = &self.custom_head {
            let [out_channels, in_channels, kh, kw] = head.conv.weight.dims();
            lines.extend([
                format!(
                    "Conv2d({}, {}, kernel_size=({}, {}))",
                    in_channels, out_channels, kh, kw
                ),
                "ReLU".to_string(),
                "AdaptiveAvgPool2d(output_size=(1, 1))".to_string(),
                "Flatten".to_string(),
                linear(&head.fc1),
                "ReLU".to_string(),
                linear(&head.fc2),
                "Softmax(dim=1)".to_string(),
            ]);
        }

        lines
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    /// Scaled-down network that accepts 32×32 inputs
    pub(crate) fn tiny_config() -> Vgg16Config {
        Vgg16Config::new()
            .with_num_classes(6)
            .with_base_channels(2)
            .with_hidden_units(16)
            .with_pool_output(1)
    }

    #[test]
    fn test_original_forward_shape() {
        let device = NdArrayDevice::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 6]);
        assert_eq!(model.head_kind(), HeadKind::Original);
        assert_eq!(model.num_outputs(), 6);
        assert_eq!(model.convs.len(), 13);
    }

    #[test]
    fn test_full_size_dimensions() {
        let config = Vgg16Config::new();
        assert_eq!(config.flattened_features(), 25088);
        assert_eq!(config.num_classes, 1000);
    }

    #[test]
    fn test_custom_head_outputs_probabilities() {
        let device = NdArrayDevice::default();
        let model = tiny_config()
            .init::<TestBackend>(&device)
            .with_custom_head(3, &device);

        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 3]);
        assert_eq!(model.head_kind(), HeadKind::Custom);
        let sums: Vec<f32> = output.sum_dim(1).into_data().iter::<f32>().collect();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_truncated_classifier() {
        let device = NdArrayDevice::default();
        let model = tiny_config().init::<TestBackend>(&device).truncate_classifier();

        assert_eq!(model.head_kind(), HeadKind::Truncated);
        assert_eq!(model.num_outputs(), 16);
        assert_eq!(model.head_summary().len(), 4);
    }

    #[test]
    fn test_head_summary() {
        let device = NdArrayDevice::default();
        let original = tiny_config().init::<TestBackend>(&device);
        assert_eq!(
            original.head_summary(),
            vec![
                "Linear(in_features=16, out_features=16)",
                "ReLU",
                "Dropout(p=0.5)",
                "Linear(in_features=16, out_features=16)",
                "ReLU",
                "Dropout(p=0.5)",
                "Linear(in_features=16, out_features=6)",
            ]
        );

        let custom = original.with_custom_head(4, &device).head_summary();
        assert_eq!(custom.len(), 12);
        assert_eq!(custom[4], "Conv2d(16, 512, kernel_size=(1, 1))");
        assert_eq!(custom[10], "Linear(in_features=512, out_features=4)");
        assert_eq!(custom.last().map(String::as_str), Some("Softmax(dim=1)"));
    }
}
