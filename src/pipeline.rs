//! Job diário de melhoria contínua.
//!
//! Orquestra mineração, agregação e refresh sobre a mesma base. Cada etapa
//! é independente: uma falha é registrada e a etapa seguinte roda assim mesmo.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::knowledge::{KnowledgeStore, RefreshSummary, TypeSummary};
use crate::metrics::{AggregationReport, MetricsAggregator};
use crate::mining::{MiningReport, PatternMiner};
use crate::types::config::Config;

/// Falha de uma etapa do job.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: String,
}

/// Resultado do job diário.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyReport {
    pub mining: Option<MiningReport>,
    pub aggregation: Option<AggregationReport>,
    pub refresh: Option<RefreshSummary>,
    pub summary: Vec<TypeSummary>,
    pub failures: Vec<StageFailure>,
}

impl DailyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record<T>(&mut self, stage: &'static str, result: crate::FeedloopResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(stage, error = %e, "Etapa do job diário falhou");
                self.failures.push(StageFailure {
                    stage,
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

/// Executa mine → metrics → refresh → resumo com o relógio `now`.
pub fn run_daily(store: &mut KnowledgeStore, config: &Config, now: DateTime<Utc>) -> DailyReport {
    let mut report = DailyReport::default();

    let mining = PatternMiner::new(&config.miner).and_then(|miner| miner.run_window(store, now));
    report.mining = report.record("mine", mining);

    let aggregation = MetricsAggregator::run(store, now.date_naive(), now);
    report.aggregation = report.record("metrics", aggregation);

    let refresh = store.refresh_confidence(&config.refresher, now);
    report.refresh = report.record("refresh", refresh);

    let summary = store.enhancement_summary();
    report.summary = report.record("summary", summary).unwrap_or_default();

    tracing::info!(
        failures = report.failures.len(),
        "Job diário concluído"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::feedback::FeedbackEvent;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_daily_runs_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let now = Utc::now();

        let events: Vec<FeedbackEvent> = (0..3)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": i,
                    "outcome": "rejected",
                    "doctor_comments": "interaction anticoagulant",
                    "diagnostic_relevance": 4,
                    "prescription_relevance": 3,
                    "created_at": now - Duration::hours(i + 1),
                }))
                .unwrap()
            })
            .collect();
        store.ingest_feedback(&events).unwrap();

        let report = run_daily(&mut store, &Config::default_config(), now);
        assert!(report.is_success());
        assert_eq!(report.mining.as_ref().unwrap().created, 2);
        assert_eq!(report.aggregation.as_ref().unwrap().metrics.total_feedback, 3);
        assert_eq!(report.refresh.as_ref().unwrap().active_count, 2);
        assert_eq!(report.summary.len(), 1);
        assert_eq!(report.summary[0].active_count, 2);
    }

    #[test]
    fn test_bad_miner_config_does_not_stop_other_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let mut config = Config::default_config();
        config.miner.dosage_units.clear();

        let report = run_daily(&mut store, &config, Utc::now());
        assert!(!report.is_success());
        assert_eq!(report.failures[0].stage, "mine");
        assert!(report.aggregation.is_some());
        assert!(report.refresh.is_some());
    }
}
