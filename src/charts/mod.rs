//! Charts module - Static chart generation
//!
//! A failed chart is recorded and the rest continue; only an unusable
//! output directory fails the stage.

mod plotter;
mod renderer;

pub use plotter::{
    ChartConfig, ChartData, ChartFailure, ChartKind, ChartPlan, ChartPlotter, HistogramBin,
};
pub use renderer::StaticChartRenderer;

use crate::data::CanonicalTable;
use crate::error::Result;
use crate::output::{Artifact, ArtifactKind, OutputConfig};
use crate::stats::SummaryMetrics;
use tracing::{debug, warn};

/// Charts written plus the ones that were skipped or failed.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<ChartFailure>,
}

/// Plan, prepare and draw every chart for `table` into `output.plots_dir`.
pub fn render(
    table: &CanonicalTable,
    metrics: &SummaryMetrics,
    output: &OutputConfig,
    dataset: &str,
    config: &ChartConfig,
) -> Result<RenderOutcome> {
    output.prepare_plots()?;

    let plan = ChartPlotter::plan(table, config);
    let mut outcome = RenderOutcome {
        artifacts: Vec::with_capacity(plan.charts.len()),
        failures: plan.skipped,
    };

    for kind in &plan.charts {
        let path = output.plot_path(dataset, &kind.file_stem());
        let drawn = ChartPlotter::prepare(kind, table, metrics, config).and_then(|data| {
            StaticChartRenderer::render_to_file(&data, &path).map_err(|e| e.to_string())
        });
        match drawn {
            Ok(()) => {
                debug!(chart = %kind, path = %path.display(), "chart written");
                outcome.artifacts.push(Artifact {
                    kind: ArtifactKind::Chart,
                    title: capitalize(&kind.to_string()),
                    path,
                });
            }
            Err(reason) => {
                warn!(chart = %kind, %reason, "chart failed");
                outcome.failures.push(ChartFailure {
                    chart: kind.to_string(),
                    reason,
                });
            }
        }
    }

    Ok(outcome)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
