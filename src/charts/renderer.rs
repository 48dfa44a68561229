//! Static Chart Renderer
//! Draws prepared chart data to SVG files with plotters.
//!
//! Layouts:
//! - Histogram: equal-width bins, frequency on the Y axis
//! - Bars: one bar per value/category, count on the Y axis
//! - Heatmap: correlation matrix, coolwarm scale, coefficients annotated

use crate::charts::plotter::{ChartData, HistogramBin};
use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

type DrawResult = Result<(), Box<dyn Error>>;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;
const HEATMAP_SIZE: u32 = 800;

const BAR: RGBColor = RGBColor(91, 155, 213);
const COOL: RGBColor = RGBColor(59, 76, 192);
const WARM: RGBColor = RGBColor(180, 4, 38);
const UNDEFINED: RGBColor = RGBColor(220, 220, 220);

pub struct StaticChartRenderer;

impl StaticChartRenderer {
    /// Render one chart to `path` (overwritten if present).
    pub fn render_to_file(data: &ChartData, path: &Path) -> DrawResult {
        match data {
            ChartData::Histogram {
                title,
                x_label,
                bins,
            } => Self::draw_histogram(path, title, x_label, bins),
            ChartData::Bars {
                title,
                x_label,
                bars,
            } => Self::draw_bars(path, title, x_label, bars),
            ChartData::Heatmap {
                title,
                labels,
                cells,
            } => Self::draw_heatmap(path, title, labels, cells),
        }
    }

    fn draw_histogram(path: &Path, title: &str, x_label: &str, bins: &[HistogramBin]) -> DrawResult {
        let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
            return Err("no bins to draw".into());
        };
        let y_max = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64 * 1.1 + 1.0;

        let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(first.lower..last.upper, 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(x_label)
            .y_desc("Frequency")
            .draw()?;

        chart.draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.lower, 0.0), (b.upper, b.count as f64)], BAR.mix(0.7).filled())
        }))?;
        chart.draw_series(bins.iter().filter(|b| b.count > 0).map(|b| {
            Rectangle::new([(b.lower, 0.0), (b.upper, b.count as f64)], BLACK.stroke_width(1))
        }))?;

        root.present()?;
        Ok(())
    }

    fn draw_bars(path: &Path, title: &str, x_label: &str, bars: &[(String, usize)]) -> DrawResult {
        if bars.is_empty() {
            return Err("no values to draw".into());
        }
        let labels: Vec<&str> = bars.iter().map(|(l, _)| l.as_str()).collect();
        let max = bars.iter().map(|(_, n)| *n).max().unwrap_or(0);

        let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(60)
            .y_label_area_size(50)
            .build_cartesian_2d((0usize..bars.len()).into_segmented(), 0usize..(max + max / 10 + 1))?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(x_label)
            .y_desc("Count")
            .x_labels(bars.len())
            .x_label_formatter(&|v: &SegmentValue<usize>| match v {
                SegmentValue::CenterOf(i) => labels.get(*i).map(|l| l.to_string()).unwrap_or_default(),
                _ => String::new(),
            })
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(BAR.mix(0.7).filled())
                .margin(8)
                .data(bars.iter().enumerate().map(|(i, (_, n))| (i, *n))),
        )?;

        root.present()?;
        Ok(())
    }

    fn draw_heatmap(path: &Path, title: &str, labels: &[String], cells: &[Vec<Option<f64>>]) -> DrawResult {
        let n = labels.len() as i32;
        if n == 0 {
            return Err("empty correlation matrix".into());
        }
        let cell_px = (HEATMAP_SIZE as i32 - 160) / n;

        let root = SVGBackend::new(path, (HEATMAP_SIZE, HEATMAP_SIZE)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(15)
            .top_x_label_area_size(40)
            .y_label_area_size(110)
            .build_cartesian_2d(0i32..n, n..0i32)?;

        chart
            .configure_mesh()
            .x_labels(n as usize)
            .y_labels(n as usize)
            .x_label_offset(cell_px / 2)
            .y_label_offset(cell_px / 2)
            .disable_x_mesh()
            .disable_y_mesh()
            .x_label_formatter(&|v: &i32| Self::label_at(labels, *v))
            .y_label_formatter(&|v: &i32| Self::label_at(labels, *v))
            .label_style(("sans-serif", 14))
            .draw()?;

        let indexed = || {
            cells.iter().zip(0i32..).flat_map(|(row, y)| {
                row.iter().zip(0i32..).map(move |(value, x)| (x, y, *value))
            })
        };

        chart.draw_series(indexed().map(|(x, y, value)| {
            Rectangle::new([(x, y), (x + 1, y + 1)], Self::coolwarm(value).filled())
        }))?;
        chart.draw_series(indexed().map(|(x, y, value)| {
            let text = value.map(|r| format!("{r:.2}")).unwrap_or_else(|| "n/a".to_string());
            EmptyElement::at((x, y))
                + Text::new(text, (cell_px / 3, cell_px / 2 - 7), ("sans-serif", 14).into_font())
        }))?;

        root.present()?;
        Ok(())
    }

    fn label_at(labels: &[String], v: i32) -> String {
        usize::try_from(v)
            .ok()
            .and_then(|i| labels.get(i))
            .cloned()
            .unwrap_or_default()
    }

    /// Diverging blue-white-red scale over [-1, 1]; grey when undefined.
    fn coolwarm(value: Option<f64>) -> RGBColor {
        let Some(r) = value else {
            return UNDEFINED;
        };
        let r = r.clamp(-1.0, 1.0);
        let (end, t) = if r < 0.0 { (COOL, -r) } else { (WARM, r) };
        let mix = |c: u8| (255.0 + (c as f64 - 255.0) * t).round() as u8;
        RGBColor(mix(end.0), mix(end.1), mix(end.2))
    }
}
