//! Classification metrics for the test report
//!
//! - Confusion matrix over the observed label set (union of true and
//!   predicted labels, sorted)
//! - Per-class precision, recall, F1 and support
//! - Fixed-width classification report with accuracy, macro and weighted
//!   averages
//! - Running accumulators used by the epoch loops

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Confusion matrix for multi-class classification
///
/// Rows are actual labels, columns predicted labels, both indexed by position
/// in `labels`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Sorted class indices covered by the matrix
    pub labels: Vec<usize>,

    /// Matrix data in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Build from ground truth and predictions
    ///
    /// The label set is the sorted union of both sequences, so a prediction
    /// outside the dataset's classes gets its own row and column instead of
    /// being dropped.
    pub fn from_predictions(ground_truth: &[usize], predictions: &[usize]) -> Self {
        debug_assert_eq!(predictions.len(), ground_truth.len());

        let labels: Vec<usize> = ground_truth
            .iter()
            .chain(predictions.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let n = labels.len();
        let mut cm = Self {
            labels,
            matrix: vec![0; n * n],
        };

        for (&actual, &pred) in ground_truth.iter().zip(predictions.iter()) {
            if let (Some(row), Some(col)) = (cm.position(actual), cm.position(pred)) {
                cm.matrix[row * n + col] += 1;
            }
        }

        cm
    }

    /// Number of labels (rows/columns)
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Position of a class index in the label set
    pub fn position(&self, label: usize) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }

    /// Count at (actual position, predicted position)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        let n = self.size();
        if actual < n && predicted < n {
            self.matrix[actual * n + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.size()).map(|i| self.get(i, i)).sum()
    }

    /// Fraction of correct predictions
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Render as text, rows = actual, cols = predicted
    pub fn display(&self) -> String {
        let n = self.size();
        let width = self
            .matrix
            .iter()
            .map(|v| v.to_string().len())
            .chain(self.labels.iter().map(|l| l.to_string().len()))
            .max()
            .unwrap_or(1)
            + 1;

        let mut output = String::new();
        output.push_str(&format!("{:>w$}", "", w = width + 1));
        for label in &self.labels {
            output.push_str(&format!("{:>w$}", label, w = width));
        }
        output.push('\n');

        for row in 0..n {
            output.push_str(&format!("{:>w$} ", self.labels[row], w = width));
            for col in 0..n {
                output.push_str(&format!("{:>w$}", self.get(row, col), w = width));
            }
            output.push('\n');
        }

        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub label: usize,

    /// Display name
    pub name: String,

    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,

    /// TP / (TP + FP), 0 when nothing was predicted as this class
    pub precision: f64,

    /// TP / (TP + FN), 0 when the class never occurs
    pub recall: f64,

    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Metrics for the label at `position` in the confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, position: usize, name: String) -> Self {
        let n = cm.size();
        let true_positives = cm.get(position, position);

        // Predicted as this class but actually another
        let false_positives: usize = (0..n)
            .filter(|&i| i != position)
            .map(|i| cm.get(i, position))
            .sum();

        // Actually this class but predicted as another
        let false_negatives: usize = (0..n)
            .filter(|&i| i != position)
            .map(|i| cm.get(position, i))
            .sum();

        let support = true_positives + false_negatives;
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            label: cm.labels[position],
            name,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Aggregate precision/recall/F1 row
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Text classification report over the observed labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

impl ClassificationReport {
    /// Build a report; `class_names[i]` names class index `i`, indices past
    /// the end are named by number
    pub fn new(ground_truth: &[usize], predictions: &[usize], class_names: &[String]) -> Self {
        let cm = ConfusionMatrix::from_predictions(ground_truth, predictions);
        Self::from_confusion_matrix(&cm, class_names)
    }

    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_names: &[String]) -> Self {
        let classes: Vec<ClassMetrics> = cm
            .labels
            .iter()
            .enumerate()
            .map(|(pos, &label)| {
                let name = class_names
                    .get(label)
                    .cloned()
                    .unwrap_or_else(|| label.to_string());
                ClassMetrics::from_confusion_matrix(cm, pos, name)
            })
            .collect();

        let total = cm.total();
        let n = classes.len().max(1) as f64;

        let macro_avg = AverageMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
            support: total,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
        };

        let weighted_avg = AverageMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Self {
            accuracy: cm.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
            total,
        }
    }

    /// Render with two decimal digits in the usual column layout
    pub fn render(&self) -> String {
        const DIGITS: usize = 2;
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(0)
            .max(DIGITS);

        let row = |name: &str, p: f64, r: f64, f: f64, support: usize| {
            format!(
                "{:>w$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}\n",
                name,
                p,
                r,
                f,
                support,
                w = width,
                d = DIGITS
            )
        };

        let mut out = format!(
            "{:>w$}  {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = width
        );

        for c in &self.classes {
            out.push_str(&row(&c.name, c.precision, c.recall, c.f1, c.support));
        }
        out.push('\n');

        out.push_str(&format!(
            "{:>w$}  {:>9} {:>9} {:>9.d$} {:>9}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total,
            w = width,
            d = DIGITS
        ));

        let m = &self.macro_avg;
        out.push_str(&row("macro avg", m.precision, m.recall, m.f1, m.support));
        let w = &self.weighted_avg;
        out.push_str(&row("weighted avg", w.precision, w.recall, w.f1, w.support));

        out
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Running average for per-batch losses
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Current average, 0 before the first value
    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Correct/total counter reporting percentages
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the outcome of one batch
    pub fn add_counts(&mut self, correct: usize, total: usize) {
        self.correct += correct;
        self.total += total;
    }

    /// Accuracy in percent, 0 before the first batch
    pub fn percent(&self) -> f64 {
        if self.total > 0 {
            100.0 * self.correct as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["J wave".to_string(), "other".to_string()]
    }

    #[test]
    fn test_confusion_matrix() {
        let labels = [1, 1, 0, 2, 0, 1, 2, 2];
        let predicted = [1, 0, 0, 2, 0, 1, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&labels, &predicted);

        assert_eq!(cm.labels, vec![0, 1, 2]);
        assert_eq!(cm.get(0, 0), 2);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.total(), 8);
        assert_eq!(cm.correct(), 6);
        assert!((cm.accuracy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confusion_matrix_includes_unseen_predictions() {
        // A 1000-way head can predict an index the dataset never uses
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 1, 417]);

        assert_eq!(cm.labels, vec![0, 1, 417]);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.total(), 3);
    }

    #[test]
    fn test_class_metrics() {
        let cm = ConfusionMatrix::from_predictions(&[1, 0, 1, 1, 0, 1], &[1, 1, 0, 1, 0, 1]);
        let jwave = ClassMetrics::from_confusion_matrix(&cm, 1, "J wave".to_string());

        assert_eq!(jwave.true_positives, 3);
        assert_eq!(jwave.false_positives, 1);
        assert_eq!(jwave.false_negatives, 1);
        assert_eq!(jwave.support, 4);
        assert!((jwave.precision - 0.75).abs() < 1e-9);
        assert!((jwave.f1 - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_report_averages() {
        let ground_truth = vec![0, 0, 0, 1];
        let predictions = vec![0, 0, 1, 1];

        let report = ClassificationReport::new(&ground_truth, &predictions, &names());

        assert_eq!(report.total, 4);
        assert!((report.accuracy - 0.75).abs() < 1e-9);
        // class 0: p=1, r=2/3; class 1: p=1/2, r=1
        assert!((report.macro_avg.precision - 0.75).abs() < 1e-9);
        assert!((report.macro_avg.recall - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-9);
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_report_render_layout() {
        let report = ClassificationReport::new(&[0, 1, 1], &[0, 1, 1], &names());
        let text = report.render();

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("precision"));
        assert!(lines[0].ends_with("support"));
        assert!(text.contains("      J wave       1.00      1.00      1.00         1"));
        assert!(text.contains("    accuracy                           1.00         3"));
        assert!(text.contains("weighted avg       1.00      1.00      1.00         3"));
    }

    #[test]
    fn test_report_names_unknown_labels_by_index() {
        let report = ClassificationReport::new(&[0, 1], &[0, 999], &names());
        let names: Vec<&str> = report.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["J wave", "other", "999"]);
    }

    #[test]
    fn test_running_average_and_tracker() {
        let mut losses = RunningAverage::new();
        assert_eq!(losses.average(), 0.0);
        for loss in [0.69, 0.41, 0.25, 0.05] {
            losses.add(loss);
        }
        assert_eq!(losses.count(), 4);
        assert!((losses.average() - 0.35).abs() < 1e-9);

        let mut tracker = AccuracyTracker::new();
        tracker.add_counts(2, 3);
        tracker.add_counts(1, 1);
        assert_eq!(tracker.total(), 4);
        assert!((tracker.percent() - 75.0).abs() < 1e-9);
    }
}
