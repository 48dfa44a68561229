//! Stats module - Statistical calculations

mod calculator;

pub use calculator::{
    CategoricalStats, ColumnMetrics, ColumnStats, Correlation, CorrelationMatrix, MetricValue,
    NumericStats, StatsCalculator, SummaryMetrics,
};
