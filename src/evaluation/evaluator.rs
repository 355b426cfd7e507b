//! Test-set and score passes over a trained model

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
    tensor::activation::softmax,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dataset::{BatchPlan, ImageBatch, ImageBatcher, ImageDataset};
use crate::model::{HeadKind, Vgg16};
use crate::utils::error::Result;
use crate::utils::metrics::{ClassificationReport, ConfusionMatrix};
use crate::utils::roc::{roc_curve, ClassRoc, RocCurve};

/// True and predicted labels, index-aligned with the dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Predictions {
    pub labels: Vec<usize>,
    pub predicted: Vec<usize>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn correct(&self) -> usize {
        self.labels
            .iter()
            .zip(&self.predicted)
            .filter(|(a, b)| a == b)
            .count()
    }

    /// Accuracy in percent
    pub fn accuracy(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        100.0 * self.correct() as f64 / self.len() as f64
    }

    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        ConfusionMatrix::from_predictions(&self.labels, &self.predicted)
    }

    pub fn report(&self, class_names: &[String]) -> ClassificationReport {
        ClassificationReport::new(&self.labels, &self.predicted, class_names)
    }
}

/// How a score row is turned into per-class ROC scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// Rows are probabilities; class `c` is scored by column `c`
    #[default]
    OneVsRest,
    /// Rows are raw outputs of a wider head over two classes; class 1 is
    /// scored by column 1 and class 0 by `1 - column 1`
    SecondColumn,
}

impl Scoring {
    /// Scoring used for a model with `head` over `num_classes` classes
    pub fn for_head(head: HeadKind, num_classes: usize) -> Self {
        match head {
            HeadKind::Original if num_classes == 2 => Scoring::SecondColumn,
            _ => Scoring::OneVsRest,
        }
    }
}

/// True labels with one score row per sample
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoredPredictions {
    pub labels: Vec<usize>,
    pub scores: Vec<Vec<f32>>,
    #[serde(default)]
    pub scoring: Scoring,
}

impl ScoredPredictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Score of `row` for `class`
    fn class_score(&self, row: &[f32], class: usize) -> f64 {
        let column = |c: usize| row.get(c).copied().unwrap_or(0.0) as f64;
        match (self.scoring, class) {
            (Scoring::SecondColumn, 0) => 1.0 - column(1),
            (Scoring::SecondColumn, _) => column(1),
            (Scoring::OneVsRest, c) => column(c),
        }
    }

    /// One-vs-rest ROC of `class`, `None` if undefined
    pub fn roc_for_class(&self, class: usize) -> Option<RocCurve> {
        let targets: Vec<bool> = self.labels.iter().map(|&l| l == class).collect();
        let scores: Vec<f64> = self
            .scores
            .iter()
            .map(|row| self.class_score(row, class))
            .collect();
        roc_curve(&targets, &scores)
    }

    /// ROC of every named class; classes without positives or negatives
    /// are skipped
    pub fn class_rocs(&self, class_names: &[String]) -> Vec<ClassRoc> {
        class_names
            .iter()
            .enumerate()
            .filter_map(|(class, name)| match self.roc_for_class(class) {
                Some(curve) => Some(ClassRoc::new(name.clone(), curve)),
                None => {
                    warn!(
                        "ROC undefined for class '{}': needs both positive and negative samples",
                        name
                    );
                    None
                }
            })
            .collect()
    }
}

/// Score rows under `scoring`; the custom head already ends in a softmax
fn score_rows<B: Backend>(model: &Vgg16<B>, output: Tensor<B, 2>, scoring: Scoring) -> Tensor<B, 2> {
    match (scoring, model.head_kind()) {
        (Scoring::SecondColumn, _) | (_, HeadKind::Custom) => output,
        _ => softmax(output, 1),
    }
}

fn rows(output: Tensor<impl Backend, 2>) -> Vec<Vec<f32>> {
    let [_, width] = output.dims();
    let flat: Vec<f32> = output.into_data().iter::<f32>().collect();
    flat.chunks(width.max(1)).map(|row| row.to_vec()).collect()
}

/// Predict every sample of `dataset` in order
pub fn predict<B: Backend>(
    model: &Vgg16<B>,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<Predictions> {
    let batcher = ImageBatcher::new(dataset.image_size());
    let mut predictions = Predictions::default();

    for indices in BatchPlan::sequential(dataset.len(), batch_size).batches() {
        let batch: ImageBatch<B> = batcher.batch(dataset.load_batch(indices)?, device);
        let [n, _, _, _] = batch.images.dims();

        let predicted = model.forward(batch.images).argmax(1).reshape([n]);

        predictions
            .labels
            .extend(batch.targets.into_data().iter::<i64>().map(|l| l as usize));
        predictions
            .predicted
            .extend(predicted.into_data().iter::<i64>().map(|p| p as usize));
    }

    Ok(predictions)
}

/// Collect ROC score rows for every sample of `dataset` in order
///
/// `num_classes` is the number of dataset classes, which picks the
/// [`Scoring`] together with the model's head.
pub fn collect_scores<B: Backend>(
    model: &Vgg16<B>,
    dataset: &ImageDataset,
    num_classes: usize,
    batch_size: usize,
    device: &B::Device,
) -> Result<ScoredPredictions> {
    let batcher = ImageBatcher::new(dataset.image_size());
    let mut scored = ScoredPredictions {
        scoring: Scoring::for_head(model.head_kind(), num_classes),
        ..Default::default()
    };

    for indices in BatchPlan::sequential(dataset.len(), batch_size).batches() {
        let batch: ImageBatch<B> = batcher.batch(dataset.load_batch(indices)?, device);

        let output = score_rows(model, model.forward(batch.images), scored.scoring);

        scored
            .labels
            .extend(batch.targets.into_data().iter::<i64>().map(|l| l as usize));
        scored.scores.extend(rows(output));
    }

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_image_folder;
    use crate::dataset::{ImageFolder, Preprocessor};
    use crate::model::vgg::tests::tiny_config;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn names() -> Vec<String> {
        vec!["J wave".to_string(), "other".to_string()]
    }

    #[test]
    fn test_predictions_accuracy() {
        let predictions = Predictions {
            labels: vec![0, 0, 1, 1],
            predicted: vec![0, 1, 1, 1],
        };
        assert_eq!(predictions.correct(), 3);
        assert!((predictions.accuracy() - 75.0).abs() < 1e-9);
        assert_eq!(predictions.confusion_matrix().get(0, 1), 1);
        assert_eq!(predictions.report(&names()).total, 4);
    }

    #[test]
    fn test_class_rocs_skip_undefined() {
        let scored = ScoredPredictions {
            labels: vec![0, 0, 0],
            scores: vec![vec![0.9, 0.1], vec![0.8, 0.2], vec![0.3, 0.7]],
            scoring: Scoring::OneVsRest,
        };
        assert!(scored.class_rocs(&names()).is_empty());

        let scored = ScoredPredictions {
            labels: vec![0, 0, 1, 1],
            scores: vec![
                vec![0.9, 0.1],
                vec![0.6, 0.4],
                vec![0.65, 0.35],
                vec![0.2, 0.8],
            ],
            scoring: Scoring::OneVsRest,
        };
        let rocs = scored.class_rocs(&names());
        assert_eq!(rocs.len(), 2);
        assert!((rocs[1].auc - 0.75).abs() < 1e-9);
        assert_eq!(rocs[0].class_name, "J wave");
    }

    #[test]
    fn test_passes_cover_every_sample() {
        let tmp = TempDir::new().unwrap();
        write_image_folder(tmp.path(), &["J wave", "other"], &[3, 2]);
        let folder = ImageFolder::new(tmp.path()).unwrap();
        let dataset = ImageDataset::from_folder(&folder, Preprocessor::new(32), false).unwrap();

        let device = NdArrayDevice::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let predictions = predict(&model, &dataset, 2, &device).unwrap();
        assert_eq!(predictions.labels, vec![0, 0, 0, 1, 1]);
        assert_eq!(predictions.predicted.len(), dataset.len());

        let scored = collect_scores(&model, &dataset, 3, 2, &device).unwrap();
        assert_eq!(scored.scoring, Scoring::OneVsRest);
        assert_eq!(scored.len(), 5);
        for row in &scored.scores {
            assert_eq!(row.len(), 6);
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }

        // Two classes on the wide original head keep the raw outputs
        let raw = collect_scores(&model, &dataset, 2, 2, &device).unwrap();
        assert_eq!(raw.scoring, Scoring::SecondColumn);
        assert_eq!(raw.labels, predictions.labels);
        assert_eq!(raw.scores.len(), 5);
    }

    #[test]
    fn test_scoring_follows_head() {
        assert_eq!(Scoring::for_head(HeadKind::Original, 2), Scoring::SecondColumn);
        assert_eq!(Scoring::for_head(HeadKind::Original, 3), Scoring::OneVsRest);
        assert_eq!(Scoring::for_head(HeadKind::Custom, 2), Scoring::OneVsRest);
    }

    #[test]
    fn test_second_column_scores_class_zero_by_complement() {
        // Raw outputs of a 1000-way head, only the first two columns matter
        let row = |a: f32, b: f32| {
            let mut row = vec![0.0; 1000];
            row[0] = a;
            row[1] = b;
            row
        };
        let scored = ScoredPredictions {
            labels: vec![0, 0, 1, 1],
            scores: vec![row(5.0, 0.0), row(4.0, 2.0), row(0.0, -1.0), row(-1.0, -0.5)],
            scoring: Scoring::SecondColumn,
        };

        let rocs = scored.class_rocs(&names());
        assert_eq!(rocs.len(), 2);
        // Column 0 would separate class 0 perfectly; 1 - column 1 does not
        assert!(rocs[0].auc.abs() < 1e-9);
        assert!(rocs[1].auc.abs() < 1e-9);

        let one_vs_rest = ScoredPredictions {
            scoring: Scoring::OneVsRest,
            ..scored
        };
        assert!((one_vs_rest.class_rocs(&names())[0].auc - 1.0).abs() < 1e-9);
    }
}
