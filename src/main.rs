//! J-wave VGG16 fine-tuning CLI
//!
//! Entry point for fine-tuning VGG16 on the folder-labeled J-wave dataset
//! and writing the curves, report, and ROC figure.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use jwave_finetune::backend::{backend_name, default_device, TrainingBackend};
use jwave_finetune::utils::logging::{init_logging, LogConfig};
use jwave_finetune::{run_pipeline, HeadPolicy, ImageFolder, PipelineConfig};

/// Fine-tune a pretrained VGG16 on a folder-labeled image dataset
#[derive(Parser, Debug)]
#[command(name = "jwave_finetune")]
#[command(version = jwave_finetune::VERSION)]
#[command(about = "VGG16 fine-tuning and ROC evaluation with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune, evaluate, and write all artifacts
    Run {
        /// TOML file overriding the default run constants
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding train_data, val_data and test_data
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Directory for plots and reports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Pretrained weights (.pth or Burn record)
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Train from random initialization
        #[arg(long, default_value = "false", conflicts_with = "weights")]
        random_init: bool,

        /// Which classifier head gets trained
        #[arg(long, value_enum)]
        head: Option<HeadPolicy>,
    },

    /// Show per-class sample counts of every split
    Stats {
        /// Directory holding train_data, val_data and test_data
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Run {
            config,
            data_dir,
            output_dir,
            epochs,
            weights,
            random_init,
            head,
        } => {
            let mut run_config = match config {
                Some(path) => PipelineConfig::from_toml_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => PipelineConfig::default(),
            };

            if let Some(dir) = data_dir {
                run_config.data.root = dir;
            }
            if let Some(dir) = output_dir {
                run_config.output.output_dir = dir;
            }
            if let Some(n) = epochs {
                run_config.training.epochs = n;
            }
            if let Some(path) = weights {
                run_config.model.pretrained_weights = Some(path);
            }
            if random_init {
                run_config.model.pretrained_weights = None;
            }
            if let Some(policy) = head {
                run_config.model.head_policy = policy;
            }

            cmd_run(&run_config)
        }
        Commands::Stats { data_dir } => cmd_stats(&data_dir),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   J-wave Classification                                       ║
 ║   VGG16 fine-tuning with Burn + Rust                          ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_run(config: &PipelineConfig) -> Result<()> {
    let device = default_device();
    println!("Using device: {:?}", device);
    info!("Backend: {}", backend_name());
    info!(
        "Data: {} | epochs {} | batch size {} | lr {}",
        config.data.root.display(),
        config.training.epochs,
        config.training.batch_size,
        config.training.learning_rate
    );

    let summary = run_pipeline::<TrainingBackend>(config, &device).context("Fine-tuning run failed")?;

    println!();
    println!("{}", "Run complete".green().bold());
    println!("  Test accuracy: {:.2}%", summary.test_accuracy);
    for entry in &summary.class_auc {
        println!("  AUC {}: {:.4}", entry.class_name, entry.auc);
    }
    println!();
    println!("{}", "Artifacts:".cyan().bold());
    for file in [
        &config.output.history_plot,
        &config.output.roc_plot,
        &config.output.report_file,
        &config.output.summary_file,
    ] {
        println!("  {}", config.output.path(file).display());
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {}", data_dir.display());

    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {}",
            "Error:".red(),
            data_dir.display()
        );
        return Ok(());
    }

    let defaults = PipelineConfig::default().data;
    for split in [&defaults.train_dir, &defaults.val_dir, &defaults.test_dir] {
        let path = data_dir.join(split);
        println!("{}", format!("{}:", split).cyan().bold());

        match ImageFolder::new(&path) {
            Ok(folder) => folder.stats().print(),
            Err(e) => println!("  {} {}", "Unavailable:".yellow(), e),
        }
        println!();
    }

    Ok(())
}
