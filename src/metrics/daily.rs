//! Agregação diária de desempenho.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::feedback::{FeedbackEvent, FeedbackOutcome};

/// Fotografia cumulativa do desempenho da IA até uma data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyMetrics {
    pub metric_date: NaiveDate,
    pub total_feedback: usize,
    pub validated_count: usize,
    pub modified_count: usize,
    pub rejected_count: usize,
    /// Percentuais com duas casas.
    pub validation_rate: f64,
    pub modification_rate: f64,
    pub rejection_rate: f64,
    pub avg_diagnostic_score: Option<f64>,
    pub avg_prescription_score: Option<f64>,
    /// Percentual de `very_effective`/`effective` entre os avaliados.
    pub high_efficacy_rate: f64,
    pub avg_healing_days: Option<f64>,
    pub avg_patient_satisfaction: Option<f64>,
    /// Média das médias de diagnóstico e prescrição.
    pub avg_doctor_satisfaction: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl DailyMetrics {
    /// Calcula as métricas sobre `events`, que já devem estar filtrados até `date`.
    pub fn compute(date: NaiveDate, events: &[FeedbackEvent], now: DateTime<Utc>) -> Self {
        let total = events.len();
        let count = |outcome: FeedbackOutcome| events.iter().filter(|e| e.outcome == outcome).count();
        let validated = count(FeedbackOutcome::ValidatedAsIs);
        let modified = count(FeedbackOutcome::Modified);
        let rejected = count(FeedbackOutcome::Rejected);

        let avg_diagnostic = mean(events.iter().map(|e| f64::from(e.diagnostic_relevance)));
        let avg_prescription = mean(events.iter().map(|e| f64::from(e.prescription_relevance)));

        let evaluated: Vec<&FeedbackEvent> =
            events.iter().filter(|e| e.efficacy.is_evaluated()).collect();
        let high = evaluated.iter().filter(|e| e.efficacy.is_high()).count();

        let doctor = mean(avg_diagnostic.into_iter().chain(avg_prescription));

        Self {
            metric_date: date,
            total_feedback: total,
            validated_count: validated,
            modified_count: modified,
            rejected_count: rejected,
            validation_rate: percent(validated, total),
            modification_rate: percent(modified, total),
            rejection_rate: percent(rejected, total),
            avg_diagnostic_score: avg_diagnostic.map(round1),
            avg_prescription_score: avg_prescription.map(round1),
            high_efficacy_rate: percent(high, evaluated.len()),
            avg_healing_days: mean(
                evaluated
                    .iter()
                    .filter_map(|e| e.healing_days)
                    .map(f64::from),
            )
            .map(round1),
            avg_patient_satisfaction: mean(
                events
                    .iter()
                    .filter_map(|e| e.patient_satisfaction)
                    .map(f64::from),
            )
            .map(round1),
            avg_doctor_satisfaction: doctor.map(round1),
            computed_at: now,
        }
    }
}

/// Bloco de desempenho recente exibido no prompt.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecentPerformance {
    pub window_days: i64,
    pub sample_count: usize,
    pub validation_rate: f64,
    pub avg_diagnostic_score: f64,
    pub avg_prescription_score: f64,
}

impl RecentPerformance {
    /// `None` quando a janela não tem eventos.
    pub fn from_events(events: &[FeedbackEvent], window_days: i64) -> Option<Self> {
        if events.is_empty() {
            return None;
        }
        let validated = events
            .iter()
            .filter(|e| e.outcome == FeedbackOutcome::ValidatedAsIs)
            .count();

        Some(Self {
            window_days,
            sample_count: events.len(),
            validation_rate: percent(validated, events.len()),
            avg_diagnostic_score: mean(events.iter().map(|e| f64::from(e.diagnostic_relevance)))
                .map(round1)
                .unwrap_or_default(),
            avg_prescription_score: mean(
                events.iter().map(|e| f64::from(e.prescription_relevance)),
            )
            .map(round1)
            .unwrap_or_default(),
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
