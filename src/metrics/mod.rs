//! Métricas de desempenho da IA derivadas do feedback.

mod aggregator;
mod daily;

pub use aggregator::{AggregationReport, MetricsAggregator, SampleGenerationReport};
pub use daily::{DailyMetrics, RecentPerformance};
