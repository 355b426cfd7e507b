//! Chart rendering with plotters
//!
//! Two figures are produced after training: the loss/accuracy curves and the
//! per-class ROC plot.

use std::path::Path;

use plotters::prelude::*;

use crate::training::history::MetricsHistory;
use crate::utils::error::{plot_err, Result};
use crate::utils::roc::ClassRoc;

/// ROC figure size in inches
pub const FIGURE_INCHES: (f64, f64) = (6.4, 4.8);

/// Reference resolution the ROC font and stroke sizes are given at
pub const BASE_DPI: u32 = 100;

const DARK_ORANGE: RGBColor = RGBColor(255, 140, 0);

/// Train and validation series colours of the history figure
const SERIES_COLORS: [RGBColor; 2] = [RGBColor(31, 119, 180), RGBColor(255, 127, 14)];

/// Pixel size of the ROC figure at `dpi`
pub fn figure_size(dpi: u32) -> (u32, u32) {
    (
        (FIGURE_INCHES.0 * dpi as f64).round() as u32,
        (FIGURE_INCHES.1 * dpi as f64).round() as u32,
    )
}

/// Colour of the `index`-th ROC curve
pub fn curve_color(index: usize) -> RGBColor {
    match index {
        0 => DARK_ORANGE,
        1 => BLUE,
        n => {
            let (r, g, b) = Palette99::pick(n).rgb();
            RGBColor(r, g, b)
        }
    }
}

/// Padded y range covering every value, falling back to `[0, 1]`
fn value_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1e-3);
    ((min - pad).max(0.0), max + pad)
}

/// Save the loss and accuracy curves side by side (10×5 in at 100 dpi)
pub fn plot_training_history(history: &MetricsHistory, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let panels = root.split_evenly((1, 2));
    let epochs = history.len().max(1);

    let train_loss = history.train_losses();
    let val_loss = history.val_losses();
    let train_acc = history.train_accuracies();
    let val_acc = history.val_accuracies();

    let loss_range = value_range(train_loss.iter().chain(val_loss.iter()));
    let acc_range = value_range(train_acc.iter().chain(val_acc.iter()));

    let series = [
        (&panels[0], "loss", loss_range, [("trainloss", &train_loss), ("valloss", &val_loss)]),
        (&panels[1], "acc (%)", acc_range, [("trainacc", &train_acc), ("valacc", &val_acc)]),
    ];

    for (area, y_desc, (y_min, y_max), lines) in series {
        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .x_label_area_size(35)
            .y_label_area_size(50)
            .build_cartesian_2d(1usize..epochs.max(2), y_min..y_max)
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .x_desc("Epochs")
            .y_desc(y_desc)
            .draw()
            .map_err(plot_err)?;

        for ((name, values), color) in lines.into_iter().zip(SERIES_COLORS) {
            let points: Vec<(usize, f64)> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| (i + 1, v))
                .collect();

            chart
                .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                .map_err(plot_err)?
                .label(name)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

            chart
                .draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))
                .map_err(plot_err)?;
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    tracing::info!("Training curves saved to {}", path.display());
    Ok(())
}

/// Save one ROC curve per class plus the chance diagonal
pub fn plot_roc_curves(curves: &[ClassRoc], path: &Path, dpi: u32) -> Result<()> {
    let size = figure_size(dpi);
    let scale = dpi as f64 / BASE_DPI as f64;
    let px = |v: f64| (v * scale).round() as u32;

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(px(10.0))
        .x_label_area_size(px(35.0))
        .y_label_area_size(px(45.0))
        .build_cartesian_2d(0.0f64..1.0, 0.0f64..1.05)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("False Positive Rate")
        .y_desc("True Positive Rate")
        .label_style(("sans-serif", px(10.0)))
        .axis_desc_style(("sans-serif", px(12.0)))
        .draw()
        .map_err(plot_err)?;

    let stroke = px(2.0);
    let legend_len = px(20.0) as i32;
    for (index, roc) in curves.iter().enumerate() {
        let color = curve_color(index);
        let legend_style = color.stroke_width(stroke);

        // First class solid and heavier, the rest dashed
        let annotated = if index == 0 {
            chart
                .draw_series(LineSeries::new(roc.curve.points(), color.stroke_width(px(3.0))))
                .map_err(plot_err)?
        } else {
            chart
                .draw_series(DashedLineSeries::new(
                    roc.curve.points(),
                    px(6.0),
                    px(4.0),
                    color.stroke_width(stroke),
                ))
                .map_err(plot_err)?
        };
        annotated
            .label(roc.legend())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + legend_len, y)], legend_style));
    }

    chart
        .draw_series(DashedLineSeries::new(
            vec![(0.0, 0.0), (1.0, 1.0)],
            px(6.0),
            px(4.0),
            BLACK.stroke_width(stroke),
        ))
        .map_err(plot_err)?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .label_font(("sans-serif", px(10.0)))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    tracing::info!("ROC curves saved to {} ({} dpi)", path.display(), dpi);
    Ok(())
}
