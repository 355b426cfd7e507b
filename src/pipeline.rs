//! End-to-end run: load splits, build the model, fine-tune, evaluate,
//! then write plots and reports.

use std::fmt::Write as _;
use std::fs;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::backend_name;
use crate::config::PipelineConfig;
use crate::dataset::{ImageDataset, ImageFolder, Preprocessor};
use crate::evaluation::{collect_scores, predict};
use crate::model::{HeadKind, HeadPolicy, ModelBuilder, Vgg16Config};
use crate::training::{run_training, MetricsHistory};
use crate::utils::charts::{plot_roc_curves, plot_training_history};
use crate::utils::error::{Error, Result};
use crate::utils::metrics::{ClassificationReport, ConfusionMatrix};
use crate::utils::roc::ClassRoc;

/// Area under the ROC curve of one class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassAuc {
    pub class_name: String,
    pub auc: f64,
}

/// Everything a finished run produced, serialized to the summary file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub backend: String,
    pub head_policy: HeadPolicy,
    pub head_kind: HeadKind,
    pub custom_head_discarded: bool,
    pub classes: Vec<String>,
    pub history: MetricsHistory,
    pub test_accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
    pub class_auc: Vec<ClassAuc>,
}

/// Result of training and evaluation, before anything is written
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub summary: RunSummary,
    pub rocs: Vec<ClassRoc>,
}

/// The three splits, sharing one preprocessing transform
pub struct Splits {
    pub classes: Vec<String>,
    pub train: ImageDataset,
    pub val: ImageDataset,
    pub test: ImageDataset,
}

impl Splits {
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let preprocessor = Preprocessor::new(config.data.image_size);
        let cache = config.data.cache_images;

        let train_folder = ImageFolder::new(config.data.train_path())?;
        let val_folder = ImageFolder::new(config.data.val_path())?;
        let test_folder = ImageFolder::new(config.data.test_path())?;

        for (name, folder) in [("validation", &val_folder), ("test", &test_folder)] {
            if folder.classes != train_folder.classes {
                warn!(
                    "{} classes {:?} differ from training classes {:?}",
                    name, folder.classes, train_folder.classes
                );
            }
        }

        info!(
            "Classes: {:?} | train {} / val {} / test {}",
            train_folder.classes,
            train_folder.len(),
            val_folder.len(),
            test_folder.len()
        );

        Ok(Self {
            train: ImageDataset::from_folder(&train_folder, preprocessor, cache)?,
            val: ImageDataset::from_folder(&val_folder, preprocessor, cache)?,
            test: ImageDataset::from_folder(&test_folder, preprocessor, cache)?,
            classes: train_folder.classes,
        })
    }
}

/// Fine-tune and evaluate with the given architecture
pub fn train_and_evaluate<B: AutodiffBackend>(
    config: &PipelineConfig,
    architecture: Vgg16Config,
    device: &B::Device,
) -> Result<Evaluation> {
    let splits = Splits::load(config)?;

    println!("{}", "Building Model...".cyan());
    let builder = ModelBuilder::new(
        architecture,
        config.model.pretrained_weights.clone(),
        config.model.head_policy,
    );
    let built = builder.build::<B>(splits.classes.len(), device)?;
    info!(
        "Head: {} ({} outputs){}",
        built.head_kind,
        built.model.num_outputs(),
        if built.custom_head_discarded {
            ", custom head discarded"
        } else {
            ""
        }
    );

    println!("{}", "Training...".green().bold());
    let (model, history) = run_training(built.model, &splits.train, &splits.val, &config.training, device)?;

    let model = model.valid();
    let batch_size = config.training.batch_size;

    let predictions = predict(&model, &splits.test, batch_size, device)?;
    let test_accuracy = predictions.accuracy();
    println!("Test Accuracy: {:.2}%", test_accuracy);

    let confusion_matrix = predictions.confusion_matrix();
    let report = ClassificationReport::from_confusion_matrix(&confusion_matrix, &splits.classes);
    info!("Confusion matrix:\n{}", confusion_matrix);
    info!("Classification report:\n{}", report);

    let scored = collect_scores(&model, &splits.val, splits.classes.len(), batch_size, device)?;
    let rocs = scored.class_rocs(&splits.classes);
    for roc in &rocs {
        info!("ROC {}", roc.legend());
    }

    let summary = RunSummary {
        timestamp: Local::now().to_rfc3339(),
        backend: backend_name().to_string(),
        head_policy: config.model.head_policy,
        head_kind: built.head_kind,
        custom_head_discarded: built.custom_head_discarded,
        classes: splits.classes,
        history,
        test_accuracy,
        confusion_matrix,
        report,
        class_auc: rocs
            .iter()
            .map(|r| ClassAuc {
                class_name: r.class_name.clone(),
                auc: r.auc,
            })
            .collect(),
    };

    Ok(Evaluation { summary, rocs })
}

/// Plain-text metrics file: history, report, confusion matrix, AUC
pub fn render_report(summary: &RunSummary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Run: {}", summary.timestamp);
    let _ = writeln!(
        out,
        "Head: {} (policy {}, custom head discarded: {})",
        summary.head_kind, summary.head_policy, summary.custom_head_discarded
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Epoch  Train Loss  Train Acc  Val Loss  Val Acc");
    for r in summary.history.records() {
        let _ = writeln!(
            out,
            "{:>5}  {:>10.4}  {:>8.2}%  {:>8.4}  {:>6.2}%",
            r.epoch, r.train_loss, r.train_accuracy, r.val_loss, r.val_accuracy
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Test Accuracy: {:.2}%", summary.test_accuracy);
    let _ = writeln!(out);
    let _ = writeln!(out, "Classification Report:");
    let _ = writeln!(out, "{}", summary.report.render());
    let _ = writeln!(out, "Confusion Matrix:");
    let _ = writeln!(out, "{}", summary.confusion_matrix.display());

    if !summary.class_auc.is_empty() {
        let _ = writeln!(out, "ROC AUC (validation):");
        for entry in &summary.class_auc {
            let _ = writeln!(out, "  {}: {:.4}", entry.class_name, entry.auc);
        }
    }

    out
}

/// Write the text report and the JSON summary
pub fn write_reports(config: &PipelineConfig, summary: &RunSummary) -> Result<()> {
    fs::create_dir_all(&config.output.output_dir)?;

    let report_path = config.output.path(&config.output.report_file);
    fs::write(&report_path, render_report(summary))?;
    info!("Metrics written to {}", report_path.display());

    let summary_path = config.output.path(&config.output.summary_file);
    fs::write(&summary_path, serde_json::to_string_pretty(summary)?)?;
    info!("Summary written to {}", summary_path.display());

    Ok(())
}

/// Render the history and ROC figures
pub fn write_plots(config: &PipelineConfig, evaluation: &Evaluation) -> Result<()> {
    fs::create_dir_all(&config.output.output_dir)?;

    plot_training_history(
        &evaluation.summary.history,
        &config.output.path(&config.output.history_plot),
    )?;

    if evaluation.rocs.is_empty() {
        warn!("No class has a defined ROC curve, skipping {}", config.output.roc_plot);
        return Ok(());
    }
    plot_roc_curves(
        &evaluation.rocs,
        &config.output.path(&config.output.roc_plot),
        config.output.roc_dpi,
    )
}

/// Full run with the full-size VGG16
pub fn run_pipeline<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: &B::Device,
) -> Result<RunSummary> {
    config.validate()?;

    if let Some(weights) = &config.model.pretrained_weights {
        if !weights.exists() {
            return Err(Error::PathNotFound(weights.clone()));
        }
    }

    let evaluation = train_and_evaluate::<B>(config, config.model.vgg_config(), device)?;
    write_artifacts(config, &evaluation)?;

    Ok(evaluation.summary)
}

/// Reports first, so a plotting failure still leaves the metrics on disk
pub fn write_artifacts(config: &PipelineConfig, evaluation: &Evaluation) -> Result<()> {
    write_reports(config, &evaluation.summary)?;
    write_plots(config, evaluation)
}
