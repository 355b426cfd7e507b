//! ROC curves and AUC
//!
//! Threshold sweep over the distinct scores in descending order. Collinear
//! intermediate points are dropped, a `(0, 0)` point with an infinite
//! threshold is prepended, and the curve always ends at `(1, 1)`.

use serde::{Deserialize, Serialize};

/// A receiver-operating-characteristic curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    /// False positive rates, non-decreasing from 0 to 1
    pub fpr: Vec<f64>,
    /// True positive rates, non-decreasing from 0 to 1
    pub tpr: Vec<f64>,
    /// Decision threshold for each point (first is `+inf`)
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Area under this curve
    pub fn auc(&self) -> f64 {
        auc(&self.fpr, &self.tpr)
    }

    /// Points as `(fpr, tpr)` pairs
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.fpr.iter().copied().zip(self.tpr.iter().copied()).collect()
    }
}

/// ROC curve of one class against the rest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRoc {
    pub class_name: String,
    pub curve: RocCurve,
    pub auc: f64,
}

impl ClassRoc {
    pub fn new(class_name: impl Into<String>, curve: RocCurve) -> Self {
        let auc = curve.auc();
        Self {
            class_name: class_name.into(),
            curve,
            auc,
        }
    }

    /// Legend entry in the form `<class> (area = 0.xxxx)`
    pub fn legend(&self) -> String {
        format!("{} (area = {:.4})", self.class_name, self.auc)
    }
}

/// Compute the ROC curve of `scores` against binary `targets`
///
/// Returns `None` when the targets contain no positives or no negatives,
/// since one of the two rates is then undefined.
pub fn roc_curve(targets: &[bool], scores: &[f64]) -> Option<RocCurve> {
    debug_assert_eq!(targets.len(), scores.len());
    let n = targets.len().min(scores.len());

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let sorted_scores: Vec<f64> = order.iter().map(|&i| scores[i]).collect();
    let sorted_targets: Vec<bool> = order.iter().map(|&i| targets[i]).collect();

    // Last index of every run of equal scores
    let mut threshold_idxs = Vec::new();
    for i in 0..sorted_scores.len() {
        if i + 1 == sorted_scores.len() || sorted_scores[i] != sorted_scores[i + 1] {
            threshold_idxs.push(i);
        }
    }

    let mut cumulative = 0usize;
    let cum_tps: Vec<usize> = sorted_targets
        .iter()
        .map(|&t| {
            cumulative += t as usize;
            cumulative
        })
        .collect();

    let mut tps: Vec<f64> = threshold_idxs.iter().map(|&i| cum_tps[i] as f64).collect();
    let mut fps: Vec<f64> = threshold_idxs
        .iter()
        .map(|&i| (i + 1 - cum_tps[i]) as f64)
        .collect();
    let mut thresholds: Vec<f64> = threshold_idxs.iter().map(|&i| sorted_scores[i]).collect();

    if tps.len() > 2 {
        let keep: Vec<usize> = (0..tps.len())
            .filter(|&i| {
                i == 0
                    || i == tps.len() - 1
                    || second_diff(&fps, i) != 0.0
                    || second_diff(&tps, i) != 0.0
            })
            .collect();
        tps = keep.iter().map(|&i| tps[i]).collect();
        fps = keep.iter().map(|&i| fps[i]).collect();
        thresholds = keep.iter().map(|&i| thresholds[i]).collect();
    }

    tps.insert(0, 0.0);
    fps.insert(0, 0.0);
    thresholds.insert(0, f64::INFINITY);

    let positives = *tps.last()?;
    let negatives = *fps.last()?;
    if positives == 0.0 || negatives == 0.0 {
        return None;
    }

    Some(RocCurve {
        fpr: fps.iter().map(|v| v / negatives).collect(),
        tpr: tps.iter().map(|v| v / positives).collect(),
        thresholds,
    })
}

fn second_diff(values: &[f64], i: usize) -> f64 {
    values[i + 1] - 2.0 * values[i] + values[i - 1]
}

/// Trapezoidal area under a curve given by non-decreasing `x`
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());

    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[1] + ys[0]) / 2.0)
        .sum()
}
