//! Model module
//!
//! - VGG16 built with Burn, laid out like the torchvision network
//! - Loading ImageNet weights and replacing the classifier head

pub mod pretrained;
pub mod vgg;

pub use pretrained::{load_pretrained, BuiltModel, HeadPolicy, ModelBuilder};
pub use vgg::{Classifier, CustomHead, HeadKind, Vgg16, Vgg16Config};

/// Default dropout rate of the classifier
pub const DEFAULT_DROPOUT: f64 = 0.5;

/// torchvision VGG16 ImageNet checkpoint
pub const DEFAULT_WEIGHTS: &str = "weights/vgg16-397923af.pth";
