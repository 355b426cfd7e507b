//! Logging Module
//!
//! Structured logging through `tracing`. The progress lines the training loop
//! prints are plain stdout; everything else (dataset discovery, model
//! construction, artifact paths) goes through the subscriber set up here.

use std::time::{Duration, Instant};

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::training::history::EpochRecord;
use crate::utils::error::{Error, Result};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `jwave_finetune=debug`
    pub filter: String,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output for this crate, with module paths and thread ids
    pub fn verbose() -> Self {
        Self {
            filter: "info,jwave_finetune=debug".to_string(),
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// `RUST_LOG` wins over the configured directive
    fn env_filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter)
                .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", self.filter, e))),
        }
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(config.env_filter()?)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// `42.0s`, `3m 07s`, `1h 02m`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Epoch timing logger
pub struct TrainingLogger {
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log end of an epoch with its record
    pub fn end_epoch(&self, record: &EpochRecord) {
        let elapsed = self.training_start.elapsed();
        let remaining = self.total_epochs.saturating_sub(record.epoch) as u32;
        let eta = elapsed / record.epoch.max(1) as u32 * remaining;

        tracing::info!(
            epoch = record.epoch,
            train_loss = record.train_loss,
            val_loss = record.val_loss,
            "Epoch {}/{} finished in {} | ETA {}",
            record.epoch,
            self.total_epochs,
            format_elapsed(self.epoch_start.elapsed()),
            format_elapsed(eta)
        );
    }

    /// Log training completion
    pub fn log_complete(&self, best_val_accuracy: f64) {
        tracing::info!(
            "Training complete: {} epochs in {} | best validation accuracy {:.2}%",
            self.total_epochs,
            format_elapsed(self.training_start.elapsed()),
            best_val_accuracy
        );
    }
}
