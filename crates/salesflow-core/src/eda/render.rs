use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::eda::aggregate::{CorrelationMatrix, Histogram};
use crate::error::{PipelineError, Result};

const FONT: &str = "sans-serif";
const BAR_COLOR: RGBColor = RGBColor(1, 115, 178);
const POINT_COLOR: RGBColor = RGBColor(222, 143, 5);
const MISSING_CELL: RGBColor = RGBColor(230, 230, 230);

/// Ends of the diverging colour map, mirroring matplotlib's `coolwarm`.
const COOL: (f64, f64, f64) = (59.0, 76.0, 192.0);
const NEUTRAL: (f64, f64, f64) = (221.0, 221.0, 221.0);
const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);

fn render_error(label: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Render {
        label: label.to_string(),
        message: err.to_string(),
    }
}

/// Maps a correlation in [-1, 1] onto the diverging palette.
pub fn coolwarm(value: f64) -> RGBColor {
    let t = value.clamp(-1.0, 1.0);
    let (from, to, weight) = if t < 0.0 {
        (NEUTRAL, COOL, -t)
    } else {
        (NEUTRAL, WARM, t)
    };
    let mix = |a: f64, b: f64| (a + (b - a) * weight).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

pub struct HeatmapOptions<'a> {
    pub title: &'a str,
    pub size: (u32, u32),
    pub decimals: usize,
}

pub fn correlation_heatmap(matrix: &CorrelationMatrix, opts: &HeatmapOptions<'_>) -> Result<String> {
    let err = |e: &dyn std::fmt::Display| render_error(opts.title, e);
    let n = matrix.labels.len() as i32;
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, opts.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(opts.title, (FONT, 24))
            .margin(10)
            .x_label_area_size(110)
            .y_label_area_size(110)
            .build_cartesian_2d(0..n.max(1), n.max(1)..0)
            .map_err(|e| err(&e))?;

        let (plot_w, plot_h) = chart.plotting_area().dim_in_pixel();
        let cell_w = plot_w as i32 / n.max(1);
        let cell_h = plot_h as i32 / n.max(1);
        let label_at = |v: &i32| {
            matrix
                .labels
                .get(*v as usize)
                .cloned()
                .unwrap_or_default()
        };

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(matrix.labels.len() + 1)
            .y_labels(matrix.labels.len() + 1)
            .x_label_offset(cell_w / 2)
            .y_label_offset(cell_h / 2)
            .x_label_formatter(&label_at)
            .y_label_formatter(&label_at)
            .x_label_style((FONT, 12).into_font().transform(FontTransform::Rotate90))
            .y_label_style((FONT, 12))
            .draw()
            .map_err(|e| err(&e))?;

        let cells = matrix.values.iter().enumerate().flat_map(|(row, values)| {
            values
                .iter()
                .enumerate()
                .map(move |(col, value)| (col as i32, row as i32, *value))
        });

        chart
            .draw_series(cells.clone().map(|(x, y, value)| {
                let color = value.map(coolwarm).unwrap_or(MISSING_CELL);
                let mut cell = Rectangle::new([(x, y), (x + 1, y + 1)], color.filled());
                cell.set_margin(1, 1, 1, 1);
                cell
            }))
            .map_err(|e| err(&e))?;

        let annotation = (FONT, 11)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center));
        chart
            .draw_series(cells.filter_map(|(x, y, value)| {
                let text = format!("{:.*}", opts.decimals, value?);
                Some(
                    EmptyElement::at((x, y))
                        + Text::new(text, (cell_w / 2, cell_h / 2), annotation.clone()),
                )
            }))
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
    }
    Ok(svg)
}

pub struct BarOptions<'a> {
    pub title: &'a str,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
    pub size: (u32, u32),
}

/// Vertical bars, one per `(category, value)` in the given order.
pub fn bar_chart(bars: &[(String, f64)], opts: &BarOptions<'_>) -> Result<String> {
    let err = |e: &dyn std::fmt::Display| render_error(opts.title, e);
    let n = bars.len() as i32;
    let (y_min, y_max) = value_bounds(bars.iter().map(|(_, v)| *v));
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, opts.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(opts.title, (FONT, 24))
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(90)
            .build_cartesian_2d((0..n.max(1)).into_segmented(), y_min..y_max)
            .map_err(|e| err(&e))?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(bars.len().max(1))
            .x_label_formatter(&|v| segment_label(bars, v))
            .x_label_style((FONT, 11).into_font().transform(FontTransform::Rotate90))
            .x_desc(opts.x_desc)
            .y_desc(opts.y_desc)
            .draw()
            .map_err(|e| err(&e))?;

        chart
            .draw_series(bars.iter().enumerate().map(|(idx, (_, value))| {
                let idx = idx as i32;
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(idx), 0.0),
                        (SegmentValue::Exact(idx + 1), *value),
                    ],
                    BAR_COLOR.filled(),
                );
                bar.set_margin(0, 0, 2, 2);
                bar
            }))
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
    }
    Ok(svg)
}

pub fn histogram_chart(hist: &Histogram, opts: &BarOptions<'_>) -> Result<String> {
    let err = |e: &dyn std::fmt::Display| render_error(opts.title, e);
    let (x_min, x_max) = match (hist.edges.first(), hist.edges.last()) {
        (Some(&lo), Some(&hi)) if hi > lo => (lo, hi),
        _ => (0.0, 1.0),
    };
    let (_, y_max) = value_bounds(hist.counts.iter().map(|&c| c as f64));
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, opts.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(opts.title, (FONT, 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_min..x_max, 0.0..y_max)
            .map_err(|e| err(&e))?;

        chart
            .configure_mesh()
            .x_desc(opts.x_desc)
            .y_desc(opts.y_desc)
            .x_labels(6)
            .x_label_formatter(&|v| format!("{v:.0}"))
            .draw()
            .map_err(|e| err(&e))?;

        chart
            .draw_series(hist.counts.iter().enumerate().map(|(idx, &count)| {
                Rectangle::new(
                    [(hist.edges[idx], 0.0), (hist.edges[idx + 1], count as f64)],
                    BAR_COLOR.mix(0.7).filled(),
                )
            }))
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
    }
    Ok(svg)
}

/// Markers joined by a line, one per `(category, value)` in the given order.
pub fn point_chart(points: &[(String, f64)], opts: &BarOptions<'_>) -> Result<String> {
    let err = |e: &dyn std::fmt::Display| render_error(opts.title, e);
    let n = points.len() as i32;
    let (y_min, y_max) = value_bounds(points.iter().map(|(_, v)| *v));
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, opts.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(opts.title, (FONT, 24))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(90)
            .build_cartesian_2d((0..n.max(1)).into_segmented(), y_min..y_max)
            .map_err(|e| err(&e))?;

        chart
            .configure_mesh()
            .x_labels(points.len().max(1))
            .x_label_formatter(&|v| segment_label(points, v))
            .x_label_style((FONT, 10).into_font().transform(FontTransform::Rotate90))
            .x_desc(opts.x_desc)
            .y_desc(opts.y_desc)
            .draw()
            .map_err(|e| err(&e))?;

        let coords: Vec<(SegmentValue<i32>, f64)> = points
            .iter()
            .enumerate()
            .map(|(idx, (_, value))| (SegmentValue::CenterOf(idx as i32), *value))
            .collect();

        chart
            .draw_series(LineSeries::new(coords.iter().cloned(), &POINT_COLOR))
            .map_err(|e| err(&e))?;
        chart
            .draw_series(
                coords
                    .iter()
                    .cloned()
                    .map(|coord| Circle::new(coord, 4, POINT_COLOR.filled())),
            )
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
    }
    Ok(svg)
}

fn segment_label(entries: &[(String, f64)], value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(idx) | SegmentValue::Exact(idx) => entries
            .get(*idx as usize)
            .map(|(label, _)| label.clone())
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    }
}

/// Axis range covering zero and every value with a little headroom.
fn value_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = (hi - lo).max(1e-9);
    let lo = if lo < 0.0 { lo - span * 0.05 } else { 0.0 };
    let hi = if hi > 0.0 { hi + span * 0.05 } else { 1.0 };
    (lo, hi)
}
