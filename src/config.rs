//! Pipeline configuration
//!
//! Defaults reproduce the fixed constants of the fine-tuning run; a TOML
//! file may override any subset of them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{HeadPolicy, Vgg16Config, DEFAULT_DROPOUT, DEFAULT_WEIGHTS};
use crate::training::{DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE, DEFAULT_LOG_EVERY};
use crate::utils::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: ModelSettings,
    pub training: TrainingParams,
    pub output: OutputConfig,
}

/// Dataset locations and preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    pub train_dir: String,
    pub val_dir: String,
    pub test_dir: String,
    pub image_size: usize,
    /// Decode every image once up front instead of per batch
    pub cache_images: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            train_dir: "train_data".to_string(),
            val_dir: "val_data".to_string(),
            test_dir: "test_data".to_string(),
            image_size: crate::IMAGE_SIZE,
            cache_images: false,
        }
    }
}

impl DataConfig {
    pub fn train_path(&self) -> PathBuf {
        self.root.join(&self.train_dir)
    }

    pub fn val_path(&self) -> PathBuf {
        self.root.join(&self.val_dir)
    }

    pub fn test_path(&self) -> PathBuf {
        self.root.join(&self.test_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// `None` trains from random initialization
    pub pretrained_weights: Option<PathBuf>,
    pub head_policy: HeadPolicy,
    pub dropout: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            pretrained_weights: Some(PathBuf::from(DEFAULT_WEIGHTS)),
            head_policy: HeadPolicy::default(),
            dropout: DEFAULT_DROPOUT,
        }
    }
}

impl ModelSettings {
    /// Full-size VGG16 configuration
    pub fn vgg_config(&self) -> Vgg16Config {
        Vgg16Config::new().with_dropout(self.dropout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seed of the training shuffle
    pub seed: u64,
    /// Batches between progress lines
    pub log_every: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

/// Artifact locations, relative to `output_dir`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub history_plot: String,
    pub roc_plot: String,
    pub roc_dpi: u32,
    pub report_file: String,
    pub summary_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            history_plot: "training_curves.png".to_string(),
            roc_plot: "ROC.png".to_string(),
            roc_dpi: 600,
            report_file: "training_metrics.txt".to_string(),
            summary_file: "metrics.json".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn path(&self, file: &str) -> PathBuf {
        self.output_dir.join(file)
    }
}

impl PipelineConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.training.epochs == 0 {
            return Err(Error::Config("epochs must be greater than 0".to_string()));
        }
        if self.training.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }
        if self.training.learning_rate.is_nan() || self.training.learning_rate <= 0.0 {
            return Err(Error::Config("learning_rate must be positive".to_string()));
        }
        if self.data.image_size == 0 {
            return Err(Error::Config("image_size must be greater than 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(Error::Config("dropout must be in [0, 1)".to_string()));
        }
        if self.output.roc_dpi == 0 {
            return Err(Error::Config("roc_dpi must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_run_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.training.epochs, 20);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.learning_rate, 1e-4);
        assert_eq!(config.data.image_size, 224);
        assert_eq!(config.data.train_path(), PathBuf::from("data/train_data"));
        assert_eq!(config.output.roc_dpi, 600);
        assert_eq!(config.model.head_policy, HeadPolicy::Overwritten);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.training.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.training.learning_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.training.epochs = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.data.image_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
[training]
epochs = 3

[model]
head_policy = "custom"
pretrained_weights = "weights/vgg16.mpk"
"#,
        )
        .unwrap();

        let config = PipelineConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.model.head_policy, HeadPolicy::Custom);
        assert_eq!(
            config.model.pretrained_weights,
            Some(PathBuf::from("weights/vgg16.mpk"))
        );
        assert_eq!(config.output.roc_plot, "ROC.png");
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let err = PipelineConfig::from_toml_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[training\nepochs = 3").unwrap();
        assert!(matches!(
            PipelineConfig::from_toml_file(&path),
            Err(Error::Config(_))
        ));
    }
}
