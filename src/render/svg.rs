//! Lays a [`ChartDescription`] out as a standalone SVG document.
//!
//! Coordinates are in canvas pixels; the canvas size comes from the chart.

use std::fmt::Write;

use super::scale::{categories, epoch_millis, extent, format_tick, nice_ticks, temporal_ticks, LinearScale};
use crate::chart::model::{
    Axis, CanvasSize, ChartDescription, Dash, Heatmap, RenderStrategy, Series, XValues,
};
use crate::color::Color;

const FONT: &str = "Helvetica, Arial, sans-serif";
const PLOT_BG: &str = "#e5ecf6";
const GRID: &str = "#ffffff";
const INK: &str = "#2a3f5f";

const X_TICKS: usize = 8;
const Y_TICKS: usize = 6;
const MAX_CATEGORY_LABELS: usize = 20;
const MARKER_RADIUS: f64 = 3.0;

/// Plot area inside the canvas.
#[derive(Debug, Clone, Copy)]
struct Frame {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Frame {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

pub fn to_svg(chart: &ChartDescription) -> String {
    let size = chart.size();
    let mut out = String::with_capacity(16 * 1024);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{FONT}">"#,
        w = size.width,
        h = size.height,
    );
    let _ = writeln!(
        out,
        r#"<rect x="0" y="0" width="{}" height="{}" fill="white"/>"#,
        size.width, size.height
    );
    write_title(&mut out, chart.title(), size);

    match chart.heatmap() {
        Some(heatmap) => write_heatmap(&mut out, chart, heatmap),
        None => write_series_chart(&mut out, chart),
    }

    out.push_str("</svg>\n");
    out
}

// ---------------------------------------------------------------------------
// Scatter / line charts
// ---------------------------------------------------------------------------

enum XAxis {
    Numeric,
    Temporal,
    Categorical(Vec<String>),
}

fn x_coordinates(x: &XValues) -> (XAxis, Vec<Option<f64>>) {
    match x {
        XValues::Numeric(v) => (XAxis::Numeric, v.clone()),
        XValues::Temporal(v) => (
            XAxis::Temporal,
            v.iter().map(|t| t.as_ref().map(epoch_millis)).collect(),
        ),
        XValues::Categorical(v) => {
            let (labels, slots) = categories(v);
            (XAxis::Categorical(labels), slots)
        }
    }
}

fn write_series_chart(out: &mut String, chart: &ChartDescription) {
    let size = chart.size();
    let series = chart.series();
    let secondary = chart.has_secondary_axis();
    let frame = Frame {
        left: 80.0,
        top: 100.0,
        right: f64::from(size.width) - if secondary { 90.0 } else { 40.0 },
        bottom: f64::from(size.height) - 70.0,
    };
    out.push_str(&format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{PLOT_BG}"/>"#,
        num(frame.left),
        num(frame.top),
        num(frame.width()),
        num(frame.height())
    ));
    out.push('\n');

    let (x_axis, xs) = series
        .first()
        .map(|s| x_coordinates(&s.x))
        .unwrap_or((XAxis::Numeric, Vec::new()));

    // x axis
    let x_scale = match &x_axis {
        XAxis::Numeric => {
            let (lo, hi) = extent(xs.iter().flatten().copied()).unwrap_or((0.0, 1.0));
            let ticks = nice_ticks(lo, hi, X_TICKS);
            let domain = tick_domain(&ticks, (lo, hi));
            let scale = LinearScale::new(domain, (frame.left, frame.right));
            let step = tick_step(&ticks);
            let labelled: Vec<_> = ticks.iter().map(|t| (*t, format_tick(*t, step))).collect();
            write_x_ticks(out, &frame, &scale, &labelled, false);
            scale
        }
        XAxis::Temporal => {
            let (lo, hi) = extent(xs.iter().flatten().copied()).unwrap_or((0.0, 1.0));
            let scale = LinearScale::new((lo, hi), (frame.left, frame.right));
            write_x_ticks(out, &frame, &scale, &temporal_ticks(lo, hi, X_TICKS), false);
            scale
        }
        XAxis::Categorical(labels) => {
            let n = labels.len().max(1);
            let scale = LinearScale::new((-0.5, n as f64 - 0.5), (frame.left, frame.right));
            let every = labels.len().div_ceil(MAX_CATEGORY_LABELS).max(1);
            let labelled: Vec<_> = labels
                .iter()
                .enumerate()
                .step_by(every)
                .map(|(i, l)| (i as f64, l.clone()))
                .collect();
            write_x_ticks(out, &frame, &scale, &labelled, true);
            scale
        }
    };

    // y axes
    let primary = write_y_axis(out, &frame, series, Axis::Primary, true);
    let secondary_scale = if secondary {
        Some(write_y_axis(out, &frame, series, Axis::Secondary, false))
    } else {
        None
    };

    write_axis_titles(out, chart, &frame);

    // marks, clipped to the plot area
    let _ = writeln!(
        out,
        r#"<defs><clipPath id="plot"><rect x="{}" y="{}" width="{}" height="{}"/></clipPath></defs>"#,
        num(frame.left - MARKER_RADIUS),
        num(frame.top - MARKER_RADIUS),
        num(frame.width() + 2.0 * MARKER_RADIUS),
        num(frame.height() + 2.0 * MARKER_RADIUS)
    );
    out.push_str("<g clip-path=\"url(#plot)\">\n");
    for (i, s) in series.iter().enumerate() {
        let y_scale = match (s.axis, &secondary_scale) {
            (Axis::Secondary, Some(scale)) => scale,
            _ => &primary,
        };
        let own_x;
        let x = if i == 0 || s.x == series[0].x {
            &xs
        } else {
            own_x = x_coordinates(&s.x).1;
            &own_x
        };
        write_series(out, s, x, &x_scale, y_scale, chart.strategy());
    }
    out.push_str("</g>\n");

    if chart.layout().legend.visible {
        write_legend(out, chart, &frame);
    }
}

fn tick_domain(ticks: &[f64], fallback: (f64, f64)) -> (f64, f64) {
    match (ticks.first(), ticks.last()) {
        (Some(a), Some(b)) if b > a => (*a, *b),
        _ => fallback,
    }
}

fn tick_step(ticks: &[f64]) -> f64 {
    if ticks.len() >= 2 {
        ticks[1] - ticks[0]
    } else {
        1.0
    }
}

fn write_x_ticks(
    out: &mut String,
    frame: &Frame,
    scale: &LinearScale,
    ticks: &[(f64, String)],
    slanted: bool,
) {
    for (value, label) in ticks {
        let x = scale.map(*value);
        if x < frame.left - 0.5 || x > frame.right + 0.5 {
            continue;
        }
        let _ = writeln!(
            out,
            r#"<line x1="{x}" y1="{}" x2="{x}" y2="{}" stroke="{GRID}" stroke-width="1"/>"#,
            num(frame.top),
            num(frame.bottom),
            x = num(x)
        );
        let y = frame.bottom + 18.0;
        if slanted {
            text(
                out,
                x,
                y,
                11.0,
                "end",
                label,
                &format!(r#" transform="rotate(-30 {} {})""#, num(x), num(y)),
            );
        } else {
            text(out, x, y, 11.0, "middle", label, "");
        }
    }
}

fn write_y_axis(
    out: &mut String,
    frame: &Frame,
    series: &[Series],
    axis: Axis,
    grid: bool,
) -> LinearScale {
    let values = series
        .iter()
        .filter(|s| s.axis == axis)
        .flat_map(|s| s.y.iter().flatten().copied());
    let (lo, hi) = extent(values).unwrap_or((0.0, 1.0));
    let ticks = nice_ticks(lo, hi, Y_TICKS);
    let scale = LinearScale::new(tick_domain(&ticks, (lo, hi)), (frame.bottom, frame.top));
    let step = tick_step(&ticks);
    for t in &ticks {
        let y = scale.map(*t);
        if grid {
            let _ = writeln!(
                out,
                r#"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="{GRID}" stroke-width="1"/>"#,
                num(frame.left),
                num(frame.right),
                y = num(y)
            );
        }
        let (x, anchor) = if axis == Axis::Primary {
            (frame.left - 8.0, "end")
        } else {
            (frame.right + 8.0, "start")
        };
        text(out, x, y + 4.0, 11.0, anchor, &format_tick(*t, step), "");
    }
    scale
}

fn write_axis_titles(out: &mut String, chart: &ChartDescription, frame: &Frame) {
    let cx = frame.left + frame.width() / 2.0;
    let cy = frame.top + frame.height() / 2.0;
    text(out, cx, frame.bottom + 50.0, 14.0, "middle", chart.x_label(), "");
    if let Some(label) = chart.y_label() {
        let x = frame.left - 60.0;
        text(
            out,
            x,
            cy,
            14.0,
            "middle",
            label,
            &format!(r#" transform="rotate(-90 {} {})""#, num(x), num(cy)),
        );
    }
    if let Some(label) = chart.y2_label() {
        let x = frame.right + 70.0;
        text(
            out,
            x,
            cy,
            14.0,
            "middle",
            label,
            &format!(r#" transform="rotate(90 {} {})""#, num(x), num(cy)),
        );
    }
}

fn write_series(
    out: &mut String,
    series: &Series,
    xs: &[Option<f64>],
    x_scale: &LinearScale,
    y_scale: &LinearScale,
    strategy: RenderStrategy,
) {
    // Runs of complete points; a missing x or y breaks the line.
    let mut runs: Vec<Vec<(f64, f64)>> = vec![Vec::new()];
    for (x, y) in xs.iter().zip(&series.y) {
        match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                if let Some(run) = runs.last_mut() {
                    run.push((x_scale.map(*x), y_scale.map(*y)));
                }
            }
            _ => {
                if runs.last().is_some_and(|r| !r.is_empty()) {
                    runs.push(Vec::new());
                }
            }
        }
    }
    if strategy == RenderStrategy::Decimated {
        runs = runs.iter().map(|r| decimate(r)).collect();
    }

    let color = series.color;
    let _ = writeln!(out, r#"<g class="series" data-name="{}">"#, escape_xml(&series.name));
    if series.mode.draws_lines() {
        let dash = match series.dash {
            Dash::Solid => "",
            Dash::Dot => r#" stroke-dasharray="2,4""#,
        };
        for run in runs.iter().filter(|r| r.len() >= 2) {
            let mut d = String::with_capacity(run.len() * 16);
            for (i, (x, y)) in run.iter().enumerate() {
                d.push(if i == 0 { 'M' } else { 'L' });
                d.push_str(&num(*x));
                d.push(' ');
                d.push_str(&num(*y));
            }
            let _ = writeln!(
                out,
                r#"<path d="{d}" fill="none" stroke="{color}" stroke-width="2"{dash}/>"#
            );
        }
    }
    for (x, y) in runs.iter().flatten() {
        let _ = writeln!(
            out,
            r#"<circle cx="{}" cy="{}" r="{MARKER_RADIUS}" fill="{color}"/>"#,
            num(*x),
            num(*y)
        );
    }
    out.push_str("</g>\n");
}

/// Keeps at most first, min, max and last of each run of points that share a
/// pixel column, in their original order.
pub(crate) fn decimate(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut kept = Vec::with_capacity(points.len().min(4096));
    let mut start = 0;
    while start < points.len() {
        let column = points[start].0.floor();
        let mut end = start + 1;
        while end < points.len() && points[end].0.floor() == column {
            end += 1;
        }
        let bucket = &points[start..end];
        let (mut lo, mut hi) = (0, 0);
        for (i, p) in bucket.iter().enumerate() {
            if p.1 < bucket[lo].1 {
                lo = i;
            }
            if p.1 > bucket[hi].1 {
                hi = i;
            }
        }
        let mut picks = [0, lo, hi, bucket.len() - 1];
        picks.sort_unstable();
        let mut last = None;
        for i in picks {
            if last != Some(i) {
                kept.push(bucket[i]);
                last = Some(i);
            }
        }
        start = end;
    }
    kept
}

fn write_legend(out: &mut String, chart: &ChartDescription, frame: &Frame) {
    let legend = &chart.layout().legend;
    let series = chart.series();
    let item_width = |name: &str| 34.0 + 7.0 * name.chars().count() as f64;
    let title_width = legend
        .title
        .as_deref()
        .map(|t| 12.0 + 7.5 * t.chars().count() as f64)
        .unwrap_or(0.0);
    let total: f64 = title_width + series.iter().map(|s| item_width(&s.name)).sum::<f64>();

    let y = frame.top - 16.0;
    let mut x = if legend.above_plot {
        (frame.right - total).max(frame.left)
    } else {
        frame.left
    };
    if let Some(title) = &legend.title {
        text(out, x, y + 4.0, 12.0, "start", title, r#" font-weight="bold""#);
        x += title_width;
    }
    for s in series {
        let dash = if s.dash == Dash::Dot {
            r#" stroke-dasharray="2,4""#
        } else {
            ""
        };
        let _ = writeln!(
            out,
            r#"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="{}" stroke-width="2"{dash}/>"#,
            num(x),
            num(x + 24.0),
            s.color,
            y = num(y)
        );
        let _ = writeln!(
            out,
            r#"<circle cx="{}" cy="{}" r="{MARKER_RADIUS}" fill="{}"/>"#,
            num(x + 12.0),
            num(y),
            s.color
        );
        text(out, x + 28.0, y + 4.0, 12.0, "start", &s.name, "");
        x += item_width(&s.name);
    }
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

fn write_heatmap(out: &mut String, chart: &ChartDescription, heatmap: &Heatmap) {
    let size = chart.size();
    let frame = Frame {
        left: 150.0,
        top: 80.0,
        right: f64::from(size.width) - 140.0,
        bottom: f64::from(size.height) - 150.0,
    };
    let n = heatmap.labels.len();
    if n > 0 {
        let cw = frame.width() / n as f64;
        let ch = frame.height() / n as f64;
        let font = (ch / 3.0).clamp(7.0, 12.0);

        // Row 0 sits at the bottom.
        for (i, row) in heatmap.matrix.iter().enumerate() {
            let y = frame.bottom - (i + 1) as f64 * ch;
            for (j, &value) in row.iter().enumerate() {
                let x = frame.left + j as f64 * cw;
                let fill = heatmap.scale.color_for(value);
                let _ = writeln!(
                    out,
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{fill}"/>"#,
                    num(x),
                    num(y),
                    num(cw),
                    num(ch)
                );
                let label = heatmap.cell_text.get(i).and_then(|r| r.get(j));
                if let Some(label) = label.filter(|l| !l.is_empty()) {
                    let ink = if fill.is_dark() { Color::WHITE } else { Color::rgb(0, 0, 0) };
                    text(
                        out,
                        x + cw / 2.0,
                        y + ch / 2.0 + font / 3.0,
                        font,
                        "middle",
                        label,
                        &format!(r#" fill="{ink}""#),
                    );
                }
            }
        }

        for (k, label) in heatmap.labels.iter().enumerate() {
            let x = frame.left + (k as f64 + 0.5) * cw;
            let y = frame.bottom + 14.0;
            text(
                out,
                x,
                y,
                11.0,
                "end",
                label,
                &format!(r#" transform="rotate(-45 {} {})""#, num(x), num(y)),
            );
            let y = frame.bottom - (k as f64 + 0.5) * ch;
            text(out, frame.left - 8.0, y + 4.0, 11.0, "end", label, "");
        }
    }

    write_colorbar(out, heatmap, &frame);

    let cx = frame.left + frame.width() / 2.0;
    let cy = frame.top + frame.height() / 2.0;
    text(out, cx, f64::from(size.height) - 20.0, 14.0, "middle", chart.x_label(), "");
    if let Some(label) = chart.y_label() {
        let x = 24.0;
        text(
            out,
            x,
            cy,
            14.0,
            "middle",
            label,
            &format!(r#" transform="rotate(-90 {} {})""#, num(x), num(cy)),
        );
    }
}

fn write_colorbar(out: &mut String, heatmap: &Heatmap, frame: &Frame) {
    const STRIPES: usize = 64;
    let x = frame.right + 40.0;
    let width = 20.0;
    let stripe = frame.height() / STRIPES as f64;
    let limit = heatmap.scale.limit;

    for k in 0..STRIPES {
        // Top stripe is +limit.
        let t = 1.0 - (k as f64 + 0.5) / STRIPES as f64;
        let value = -limit + 2.0 * limit * t;
        let _ = writeln!(
            out,
            r#"<rect x="{}" y="{}" width="{width}" height="{}" fill="{}"/>"#,
            num(x),
            num(frame.top + k as f64 * stripe),
            num(stripe + 0.5),
            heatmap.scale.color_for(value)
        );
    }
    for (value, y) in [
        (limit, frame.top),
        (0.0, frame.top + frame.height() / 2.0),
        (-limit, frame.bottom),
    ] {
        text(out, x + width + 6.0, y + 4.0, 11.0, "start", &format!("{value:.2}"), "");
    }
    text(out, x, frame.top - 12.0, 12.0, "start", &heatmap.colorbar_title, "");
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

fn write_title(out: &mut String, title: &str, size: CanvasSize) {
    let cx = f64::from(size.width) / 2.0;
    for (i, line) in title.lines().enumerate() {
        let (y, font) = if i == 0 { (32.0, 20.0) } else { (32.0 + 20.0 * i as f64, 14.0) };
        text(out, cx, y, font, "middle", line, "");
    }
}

fn text(out: &mut String, x: f64, y: f64, size: f64, anchor: &str, content: &str, extra: &str) {
    let fill = if extra.contains("fill=") {
        String::new()
    } else {
        format!(r#" fill="{INK}""#)
    };
    let _ = writeln!(
        out,
        r#"<text x="{}" y="{}" font-size="{}" text-anchor="{anchor}"{fill}{extra}>{}</text>"#,
        num(x),
        num(y),
        num(size),
        escape_xml(content)
    );
}

/// Pixel coordinate with at most two decimals and no trailing zeros.
fn num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e10 {
        return format!("{}", n as i64);
    }
    let s = format!("{:.2}", (n * 100.0).round() / 100.0);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::builder::{build_heatmap, build_single_chart, build_top_correlations, ColumnSelection, SeriesOptions};
    use crate::chart::model::PlotMode;
    use crate::data::model::{Column, ColumnData, Table};

    fn table() -> Table {
        Table::new(vec![
            Column::new(
                "When",
                ColumnData::Text(vec![Some("a".into()), Some("b".into()), Some("c".into()), Some("d".into())]),
            ),
            Column::new(
                "Sales & Co",
                ColumnData::Numeric(vec![Some(1.0), Some(2.0), None, Some(4.0)]),
            ),
            Column::new(
                "Cost",
                ColumnData::Numeric(vec![Some(4.0), Some(3.5), Some(2.0), Some(1.0)]),
            ),
        ])
    }

    #[test]
    fn scatter_svg_has_markers_and_escaped_text() {
        let selection = ColumnSelection::new("When", vec!["Sales & Co".into()]);
        let chart = build_single_chart(&table(), &selection, SeriesOptions::default(), None).unwrap();
        let svg = to_svg(&chart);
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Sales &amp; Co vs When"));
        assert_eq!(svg.matches("<circle").count(), 3 + 1); // 3 points + legend swatch
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn lines_break_at_missing_values() {
        let selection = ColumnSelection::new("When", vec!["Sales & Co".into()]);
        let options = SeriesOptions {
            mode: PlotMode::LinesAndMarkers,
            large_data: false,
        };
        let chart = build_single_chart(&table(), &selection, options, None).unwrap();
        let svg = to_svg(&chart);
        // [a, b] forms a line; [d] alone does not.
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn companion_series_is_dotted() {
        let options = SeriesOptions {
            mode: PlotMode::LinesAndMarkers,
            large_data: false,
        };
        let charts = build_top_correlations(&table(), "When", "Cost", 1, options).unwrap();
        let svg = to_svg(&charts[0]);
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("Correlation: "));
    }

    #[test]
    fn heatmap_cells_and_colorbar() {
        let chart = build_heatmap(&table(), None, None).unwrap();
        let svg = to_svg(&chart);
        assert!(svg.contains(">1.00</text>"));
        assert!(svg.contains(">Correlation</text>"));
        assert!(svg.contains(">Variables</text>"));
    }

    #[test]
    fn decimation_bounds_points_per_pixel() {
        let points: Vec<(f64, f64)> = (0..10_000)
            .map(|i| (i as f64 / 100.0, ((i * 7919) % 1000) as f64))
            .collect();
        let kept = decimate(&points);
        assert!(kept.len() <= 100 * 4);
        assert_eq!(kept.first(), points.first());
        assert_eq!(kept.last(), points.last());
        let max = points.iter().map(|p| p.1).fold(f64::MIN, f64::max);
        assert!(kept.iter().any(|p| p.1 == max));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(num(10.0), "10");
        assert_eq!(num(10.5), "10.5");
        assert_eq!(num(10.123), "10.12");
    }
}
