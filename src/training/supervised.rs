//! Supervised fine-tuning loop
//!
//! A plain loop over Burn's optimizer API: forward, cross-entropy, backward,
//! Adam step. Validation runs on the inner (non-autodiff) backend.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::TrainingParams;
use crate::dataset::{BatchPlan, ImageBatch, ImageBatcher, ImageDataset};
use crate::model::Vgg16;
use crate::training::history::{EpochRecord, MetricsHistory, PhaseMetrics};
use crate::utils::error::Result;
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, RunningAverage};

/// Position of the current epoch, for progress lines
#[derive(Debug, Clone, Copy)]
pub struct EpochProgress {
    /// 1-based
    pub epoch: usize,
    pub total_epochs: usize,
    /// Print a batch line every this many batches (0 disables)
    pub log_every: usize,
}

/// Number of rows whose argmax equals the target
pub fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = output.dims();
    let predicted = output.argmax(1).reshape([batch_size]);
    let correct: i64 = predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// One optimization pass over `plan`
pub fn train_epoch<B, O>(
    mut model: Vgg16<B>,
    optimizer: &mut O,
    dataset: &ImageDataset,
    plan: &BatchPlan,
    learning_rate: f64,
    progress: EpochProgress,
    device: &B::Device,
) -> Result<(Vgg16<B>, PhaseMetrics)>
where
    B: AutodiffBackend,
    O: Optimizer<Vgg16<B>, B>,
{
    let batcher = ImageBatcher::new(dataset.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let num_batches = plan.num_batches();

    let mut loss_avg = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();

    for (batch_idx, indices) in plan.batches().enumerate() {
        let items = dataset.load_batch(indices)?;
        let batch: ImageBatch<B> = batcher.batch(items, device);
        let batch_size = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());

        let loss_value: f64 = loss.clone().into_scalar().elem();
        loss_avg.add(loss_value);
        accuracy.add_counts(count_correct(output, batch.targets), batch_size);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(learning_rate, model, grads);

        if progress.log_every > 0 && (batch_idx + 1) % progress.log_every == 0 {
            println!(
                "Epoch [{}/{}], Train Batch [{}/{}], Loss: {:.4}, Accuracy: {:.2}%",
                progress.epoch,
                progress.total_epochs,
                batch_idx + 1,
                num_batches,
                loss_value,
                accuracy.percent()
            );
        }
    }

    let metrics = PhaseMetrics {
        loss: loss_avg.average(),
        accuracy: accuracy.percent(),
        correct: accuracy.correct(),
        total: accuracy.total(),
    };

    println!(
        "Epoch [{}/{}], Train Loss: {:.4}, Train Accuracy: {:.2}%",
        progress.epoch, progress.total_epochs, metrics.loss, metrics.accuracy
    );

    Ok((model, metrics))
}

/// Loss and accuracy over `dataset` without gradient tracking
pub fn validate_epoch<B: Backend>(
    model: &Vgg16<B>,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<PhaseMetrics> {
    let batcher = ImageBatcher::new(dataset.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let plan = BatchPlan::sequential(dataset.len(), batch_size);

    let mut loss_avg = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();

    for indices in plan.batches() {
        let items = dataset.load_batch(indices)?;
        let batch: ImageBatch<B> = batcher.batch(items, device);
        let size = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss: f64 = loss_fn
            .forward(output.clone(), batch.targets.clone())
            .into_scalar()
            .elem();

        loss_avg.add(loss);
        accuracy.add_counts(count_correct(output, batch.targets), size);
    }

    Ok(PhaseMetrics {
        loss: loss_avg.average(),
        accuracy: accuracy.percent(),
        correct: accuracy.correct(),
        total: accuracy.total(),
    })
}

/// Alternate training and validation for `params.epochs` epochs
///
/// Training batches are reshuffled every epoch from a generator seeded with
/// `params.seed`; validation batches stay in order.
pub fn run_training<B: AutodiffBackend>(
    model: Vgg16<B>,
    train: &ImageDataset,
    val: &ImageDataset,
    params: &TrainingParams,
    device: &B::Device,
) -> Result<(Vgg16<B>, MetricsHistory)> {
    let mut optimizer = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, Vgg16<B>>();
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut history = MetricsHistory::new();
    let mut logger = TrainingLogger::new(params.epochs);
    let mut model = model;

    for epoch in 1..=params.epochs {
        logger.start_epoch(epoch);
        let progress = EpochProgress {
            epoch,
            total_epochs: params.epochs,
            log_every: params.log_every,
        };

        let plan = BatchPlan::shuffled(train.len(), params.batch_size, &mut rng);
        let (trained, train_metrics) = train_epoch(
            model,
            &mut optimizer,
            train,
            &plan,
            params.learning_rate,
            progress,
            device,
        )?;
        model = trained;

        let val_metrics = validate_epoch(&model.valid(), val, params.batch_size, device)?;
        println!(
            "Epoch [{}/{}], Validation Loss: {:.4}, Validation Accuracy: {:.2}%",
            epoch, params.epochs, val_metrics.loss, val_metrics.accuracy
        );

        let record = EpochRecord::new(epoch, train_metrics, val_metrics);
        logger.end_epoch(&record);
        history.push(record);
    }

    logger.log_complete(history.best_val_accuracy());
    Ok((model, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_image_folder;
    use crate::dataset::{ImageFolder, Preprocessor};
    use crate::model::vgg::tests::tiny_config;
    use burn::backend::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn tiny_dataset(tmp: &TempDir, counts: &[usize]) -> ImageDataset {
        write_image_folder(tmp.path(), &["J wave", "other"], counts);
        let folder = ImageFolder::new(tmp.path()).unwrap();
        ImageDataset::from_folder(&folder, Preprocessor::new(32), true).unwrap()
    }

    #[test]
    fn test_count_correct() {
        let device = NdArrayDevice::default();
        let output = Tensor::<NdArray<f32>, 2>::from_floats(
            [[0.9, 0.1], [0.2, 0.8], [0.6, 0.4]],
            &device,
        );
        let targets = Tensor::<NdArray<f32>, 1, Int>::from_ints([0, 1, 1], &device);
        assert_eq!(count_correct(output, targets), 2);
    }

    #[test]
    fn test_validate_epoch_counts_every_sample() {
        let tmp = TempDir::new().unwrap();
        let dataset = tiny_dataset(&tmp, &[3, 2]);
        let device = NdArrayDevice::default();
        let model = tiny_config().init::<NdArray<f32>>(&device);

        let metrics = validate_epoch(&model, &dataset, 2, &device).unwrap();

        assert_eq!(metrics.total, 5);
        assert!(metrics.loss >= 0.0);
        assert!((0.0..=100.0).contains(&metrics.accuracy));
    }

    #[test]
    fn test_run_training_records_every_epoch() {
        let tmp_train = TempDir::new().unwrap();
        let tmp_val = TempDir::new().unwrap();
        let train = tiny_dataset(&tmp_train, &[3, 3]);
        let val = tiny_dataset(&tmp_val, &[2, 1]);

        let device = NdArrayDevice::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let params = TrainingParams {
            epochs: 2,
            batch_size: 4,
            log_every: 1,
            ..Default::default()
        };

        let (_, history) = run_training(model, &train, &val, &params, &device).unwrap();

        assert_eq!(history.len(), 2);
        for record in history.records() {
            assert!(record.train_loss >= 0.0 && record.val_loss >= 0.0);
            assert!((0.0..=100.0).contains(&record.train_accuracy));
            assert!((0.0..=100.0).contains(&record.val_accuracy));
        }
        assert_eq!(history.records()[1].epoch, 2);
    }
}
