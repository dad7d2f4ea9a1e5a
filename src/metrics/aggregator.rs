//! MetricsAggregator - grava a fotografia diária e gera amostras de aprendizado.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::knowledge::{format_ts, keep_valid, parse_ts, KnowledgeStore};
use crate::training::LearningSample;
use crate::{FeedloopError, FeedloopResult};

use super::daily::DailyMetrics;

/// Resultado da geração de amostras para uma data.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SampleGenerationReport {
    pub created: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Resultado de uma agregação.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub metrics: DailyMetrics,
    /// `true` se a linha da data já existia e foi substituída.
    pub replaced: bool,
    pub samples: SampleGenerationReport,
    /// Eventos ilegíveis ignorados na leitura.
    pub skipped: usize,
}

const METRIC_COLUMNS: &str = "metric_date, total_feedback, validated_count, modified_count, \
     rejected_count, validation_rate, modification_rate, rejection_rate, avg_diagnostic_score, \
     avg_prescription_score, high_efficacy_rate, avg_healing_days, avg_patient_satisfaction, \
     avg_doctor_satisfaction, computed_at";

fn metrics_from_row(row: &Row) -> rusqlite::Result<DailyMetrics> {
    let raw_date: String = row.get(0)?;
    let metric_date = raw_date.parse::<NaiveDate>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DailyMetrics {
        metric_date,
        total_feedback: row.get::<_, i64>(1)? as usize,
        validated_count: row.get::<_, i64>(2)? as usize,
        modified_count: row.get::<_, i64>(3)? as usize,
        rejected_count: row.get::<_, i64>(4)? as usize,
        validation_rate: row.get(5)?,
        modification_rate: row.get(6)?,
        rejection_rate: row.get(7)?,
        avg_diagnostic_score: row.get(8)?,
        avg_prescription_score: row.get(9)?,
        high_efficacy_rate: row.get(10)?,
        avg_healing_days: row.get(11)?,
        avg_patient_satisfaction: row.get(12)?,
        avg_doctor_satisfaction: row.get(13)?,
        computed_at: parse_ts(14, &row.get::<_, String>(14)?)?,
    })
}

impl KnowledgeStore {
    /// Upsert atômico por data. Retorna `true` se a linha já existia.
    pub fn upsert_daily_metrics(&mut self, metrics: &DailyMetrics) -> FeedloopResult<bool> {
        let date = metrics.metric_date.to_string();
        let computed_at = format_ts(&metrics.computed_at);

        self.with_retry("upsert_daily_metrics", |conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let existed = tx
                .query_row(
                    "SELECT 1 FROM daily_metrics WHERE metric_date = ?",
                    params![&date],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            tx.execute(
                "INSERT INTO daily_metrics (metric_date, total_feedback, validated_count,
                     modified_count, rejected_count, validation_rate, modification_rate,
                     rejection_rate, avg_diagnostic_score, avg_prescription_score,
                     high_efficacy_rate, avg_healing_days, avg_patient_satisfaction,
                     avg_doctor_satisfaction, computed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(metric_date) DO UPDATE SET
                     total_feedback = excluded.total_feedback,
                     validated_count = excluded.validated_count,
                     modified_count = excluded.modified_count,
                     rejected_count = excluded.rejected_count,
                     validation_rate = excluded.validation_rate,
                     modification_rate = excluded.modification_rate,
                     rejection_rate = excluded.rejection_rate,
                     avg_diagnostic_score = excluded.avg_diagnostic_score,
                     avg_prescription_score = excluded.avg_prescription_score,
                     high_efficacy_rate = excluded.high_efficacy_rate,
                     avg_healing_days = excluded.avg_healing_days,
                     avg_patient_satisfaction = excluded.avg_patient_satisfaction,
                     avg_doctor_satisfaction = excluded.avg_doctor_satisfaction,
                     computed_at = excluded.computed_at",
                params![
                    &date,
                    metrics.total_feedback as i64,
                    metrics.validated_count as i64,
                    metrics.modified_count as i64,
                    metrics.rejected_count as i64,
                    metrics.validation_rate,
                    metrics.modification_rate,
                    metrics.rejection_rate,
                    metrics.avg_diagnostic_score,
                    metrics.avg_prescription_score,
                    metrics.high_efficacy_rate,
                    metrics.avg_healing_days,
                    metrics.avg_patient_satisfaction,
                    metrics.avg_doctor_satisfaction,
                    &computed_at
                ],
            )?;
            tx.commit()?;
            Ok(existed)
        })
    }

    pub fn daily_metrics(&self, date: NaiveDate) -> FeedloopResult<Option<DailyMetrics>> {
        let sql = format!("SELECT {} FROM daily_metrics WHERE metric_date = ?", METRIC_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![date.to_string()], metrics_from_row)
            .optional()?)
    }

    /// Linhas mais recentes primeiro.
    pub fn metrics_history(&self, limit: usize) -> FeedloopResult<Vec<DailyMetrics>> {
        let sql = format!(
            "SELECT {} FROM daily_metrics ORDER BY metric_date DESC LIMIT ?",
            METRIC_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], metrics_from_row)?;
        Ok(keep_valid(rows, "daily_metrics"))
    }
}

/// Agregador de métricas diárias.
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// Calcula e grava as métricas cumulativas até `date`, e gera as amostras
    /// dos eventos daquele dia com acompanhamento completo.
    pub fn run(
        store: &mut KnowledgeStore,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> FeedloopResult<AggregationReport> {
        let batch = store.feedback_through(date)?;
        let metrics = DailyMetrics::compute(date, &batch.events, now);
        let replaced = store.upsert_daily_metrics(&metrics)?;

        tracing::info!(
            date = %date,
            total = metrics.total_feedback,
            validation_rate = metrics.validation_rate,
            replaced,
            "Métricas diárias calculadas"
        );

        let samples = Self::generate_learning_samples(store, date, now)?;

        Ok(AggregationReport {
            metrics,
            replaced,
            samples,
            skipped: batch.skipped,
        })
    }

    /// Uma amostra por evento; falhas individuais são registradas e ignoradas.
    pub fn generate_learning_samples(
        store: &mut KnowledgeStore,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> FeedloopResult<SampleGenerationReport> {
        let batch = store.feedback_on(date)?;
        let mut report = SampleGenerationReport::default();

        for event in batch.events.iter().filter(|e| e.follow_up_complete) {
            if store.has_learning_sample(event.id)? {
                report.already_present += 1;
                continue;
            }

            let inserted = LearningSample::from_event(event, now)
                .and_then(|sample| store.insert_learning_sample(&sample));
            match inserted {
                Ok(true) => report.created += 1,
                Ok(false) => report.already_present += 1,
                Err(e @ FeedloopError::MalformedRecord(..)) => {
                    tracing::warn!(id = event.id, error = %e, "Amostra de aprendizado não gerada");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(id = event.id, error = %e, "Falha ao gravar amostra");
                    report.failed += 1;
                }
            }
        }

        if report.created > 0 {
            tracing::info!(created = report.created, "Amostras de aprendizado geradas");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::feedback::FeedbackEvent;
    use serde_json::json;

    fn event(id: i64, created_at: &str, follow_up: bool, with_ai: bool) -> FeedbackEvent {
        let mut value = json!({
            "id": id,
            "outcome": "validated_as_is",
            "efficacy": "effective",
            "diagnostic_relevance": 9,
            "prescription_relevance": 8,
            "follow_up_complete": follow_up,
            "created_at": created_at,
            "consultation": { "diagnosis": "Bronchite", "symptoms": "toux" },
        });
        if with_ai {
            value["consultation"]["ai_recommendation"] = json!({
                "diagnosis": "Bronchite aiguë",
                "justification": "auscultation",
                "prescriptions": []
            });
        }
        serde_json::from_value(value).unwrap()
    }

    fn store_with(events: &[FeedbackEvent]) -> (KnowledgeStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        store.ingest_feedback(events).unwrap();
        (store, dir)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn test_cumulative_and_idempotent() {
        let (mut store, _dir) = store_with(&[
            event(1, "2026-10-08T10:00:00Z", false, true),
            event(2, "2026-10-09T10:00:00Z", false, true),
            event(3, "2026-10-11T10:00:00Z", false, true),
        ]);

        let first = MetricsAggregator::run(&mut store, day(9), Utc::now()).unwrap();
        assert_eq!(first.metrics.total_feedback, 2);
        assert!(!first.replaced);

        let second = MetricsAggregator::run(&mut store, day(9), Utc::now()).unwrap();
        assert!(second.replaced);
        assert_eq!(store.metrics_history(10).unwrap().len(), 1);

        let stored = store.daily_metrics(day(9)).unwrap().unwrap();
        assert_eq!(stored.total_feedback, 2);
        assert_eq!(stored.validation_rate, 100.0);
        assert_eq!(stored.avg_doctor_satisfaction, Some(8.5));
    }

    #[test]
    fn test_empty_date_writes_zero_row() {
        let (mut store, _dir) = store_with(&[]);
        let report = MetricsAggregator::run(&mut store, day(1), Utc::now()).unwrap();
        assert_eq!(report.metrics.total_feedback, 0);

        let stored = store.daily_metrics(day(1)).unwrap().unwrap();
        assert_eq!(stored.rejection_rate, 0.0);
        assert!(stored.avg_diagnostic_score.is_none());
    }

    #[test]
    fn test_samples_only_for_completed_events_of_the_day() {
        let (mut store, _dir) = store_with(&[
            event(1, "2026-10-09T08:00:00Z", true, true),
            event(2, "2026-10-09T09:00:00Z", false, true),
            event(3, "2026-10-09T10:00:00Z", true, false),
            event(4, "2026-10-08T10:00:00Z", true, true),
        ]);

        let report = MetricsAggregator::run(&mut store, day(9), Utc::now()).unwrap();
        assert_eq!(report.samples.created, 1);
        assert_eq!(report.samples.failed, 1);

        let again = MetricsAggregator::generate_learning_samples(&mut store, day(9), Utc::now())
            .unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.already_present, 1);
        assert_eq!(store.count_learning_samples(None).unwrap(), 1);
    }
}
