//! Per-epoch training history

use serde::{Deserialize, Serialize};

/// Loss and accuracy of one pass over a split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    /// Mean of the per-batch mean losses
    pub loss: f64,
    /// `100 * correct / total`
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
}

/// Results of one completed epoch (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

impl EpochRecord {
    pub fn new(epoch: usize, train: PhaseMetrics, val: PhaseMetrics) -> Self {
        Self {
            epoch,
            train_loss: train.loss,
            train_accuracy: train.accuracy,
            val_loss: val.loss,
            val_accuracy: val.accuracy,
        }
    }
}

/// One record per completed epoch; the four curves are views of it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsHistory {
    records: Vec<EpochRecord>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    pub fn train_losses(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.train_loss).collect()
    }

    pub fn val_losses(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.val_loss).collect()
    }

    pub fn train_accuracies(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.train_accuracy).collect()
    }

    pub fn val_accuracies(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.val_accuracy).collect()
    }

    /// Highest validation accuracy seen, 0 when empty
    pub fn best_val_accuracy(&self) -> f64 {
        self.records
            .iter()
            .map(|r| r.val_accuracy)
            .fold(0.0, f64::max)
    }
}
