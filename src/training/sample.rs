//! Amostras de aprendizado derivadas de feedback com acompanhamento completo.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::knowledge::{format_ts, keep_valid, KnowledgeStore};
use crate::types::feedback::{AnonymizedPatient, Efficacy, FeedbackEvent};
use crate::types::recommendation::Recommendation;
use crate::{FeedloopError, FeedloopResult};

/// Par (sugestão da IA, decisão do médico) com contexto anonimizado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningSample {
    pub id: String,
    pub feedback_id: i64,
    pub patient: AnonymizedPatient,
    pub ai_diagnosis: String,
    pub ai_recommendation: Recommendation,
    pub doctor_diagnosis: String,
    pub doctor_recommendation: Recommendation,
    #[serde(default)]
    pub modifications: Option<String>,
    pub efficacy: Efficacy,
    #[serde(default)]
    pub side_effects: String,
    #[serde(default)]
    pub healing_days: Option<u32>,
    pub diagnostic_score: u8,
    pub prescription_score: u8,
    #[serde(default)]
    pub patient_satisfaction: Option<u8>,
    #[serde(default)]
    pub consumed_for_training: bool,
    #[serde(default)]
    pub export_batch: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LearningSample {
    /// Converte um evento; falha se a consulta não guardou a sugestão da IA.
    pub fn from_event(event: &FeedbackEvent, now: DateTime<Utc>) -> FeedloopResult<Self> {
        let record = format!("feedback {}", event.id);
        let consultation = &event.consultation;

        let ai_recommendation = consultation
            .ai_recommendation
            .as_ref()
            .ok_or_else(|| FeedloopError::malformed(&record, "consulta sem recomendação da IA"))
            .and_then(|value| {
                Recommendation::from_snapshot(value)
                    .map_err(|e| FeedloopError::malformed(&record, e.to_string()))
            })?;

        let doctor_recommendation = match &consultation.final_recommendation {
            Some(value) => Recommendation::from_snapshot(value)
                .map_err(|e| FeedloopError::malformed(&record, e.to_string()))?,
            None => ai_recommendation.clone(),
        };

        let ai_diagnosis = consultation
            .diagnosis
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| ai_recommendation.diagnosis.clone());
        let doctor_diagnosis = consultation
            .final_diagnosis
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| doctor_recommendation.diagnosis.clone());

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            feedback_id: event.id,
            patient: AnonymizedPatient::from_parts(
                &consultation.patient,
                consultation.symptoms.as_deref(),
                &consultation.vitals,
                now.date_naive(),
            ),
            ai_diagnosis,
            ai_recommendation,
            doctor_diagnosis,
            doctor_recommendation,
            modifications: event
                .modifications_made
                .clone()
                .or_else(|| event.modification_reason.clone()),
            efficacy: event.efficacy,
            side_effects: event.side_effects.clone().unwrap_or_default(),
            healing_days: event.healing_days,
            diagnostic_score: event.diagnostic_relevance,
            prescription_score: event.prescription_relevance,
            patient_satisfaction: event.patient_satisfaction,
            consumed_for_training: false,
            export_batch: None,
            created_at: now,
        })
    }

    pub fn meets_score(&self, min_score: u8) -> bool {
        self.diagnostic_score >= min_score && self.prescription_score >= min_score
    }
}

/// Filtro de seleção para exportação.
#[derive(Debug, Clone, Copy)]
pub struct SampleFilter {
    pub min_score: u8,
    pub since: Option<DateTime<Utc>>,
    pub include_consumed: bool,
}

impl KnowledgeStore {
    /// Grava a amostra se o evento ainda não tiver uma. Retorna `false` se já existia.
    pub fn insert_learning_sample(&mut self, sample: &LearningSample) -> FeedloopResult<bool> {
        let payload = serde_json::to_string(sample)?;
        let created_at = format_ts(&sample.created_at);

        self.with_retry("insert_learning_sample", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM learning_samples WHERE feedback_id = ?",
                    params![sample.feedback_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO learning_samples (id, feedback_id, diagnostic_score, prescription_score,
                                               consumed_for_training, export_batch, created_at, payload)
                 VALUES (?, ?, ?, ?, 0, NULL, ?, ?)",
                params![
                    sample.id,
                    sample.feedback_id,
                    sample.diagnostic_score,
                    sample.prescription_score,
                    &created_at,
                    &payload
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn has_learning_sample(&self, feedback_id: i64) -> FeedloopResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM learning_samples WHERE feedback_id = ?",
            params![feedback_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Amostras selecionadas, mais recentes primeiro.
    pub fn learning_samples(&self, filter: &SampleFilter) -> FeedloopResult<Vec<LearningSample>> {
        let since = filter.since.map(|t| format_ts(&t));
        let mut stmt = self.conn.prepare(
            "SELECT payload, consumed_for_training, export_batch FROM learning_samples
             WHERE diagnostic_score >= ?1 AND prescription_score >= ?1
               AND (?2 = 1 OR consumed_for_training = 0)
               AND (?3 IS NULL OR created_at >= ?3)
             ORDER BY created_at DESC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![filter.min_score, filter.include_consumed, since],
            |row| {
                let payload: String = row.get(0)?;
                let mut sample: LearningSample = serde_json::from_str(&payload).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                sample.consumed_for_training = row.get(1)?;
                sample.export_batch = row.get(2)?;
                Ok(sample)
            },
        )?;

        Ok(keep_valid(rows, "learning_samples"))
    }

    /// Marca as amostras como consumidas, todas na mesma transação.
    pub fn mark_consumed(&mut self, ids: &[String], batch_tag: &str) -> FeedloopResult<usize> {
        self.with_retry("mark_consumed", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut marked = 0;
            for id in ids {
                marked += tx.execute(
                    "UPDATE learning_samples SET consumed_for_training = 1, export_batch = ?
                     WHERE id = ? AND consumed_for_training = 0",
                    params![batch_tag, id],
                )?;
            }
            tx.commit()?;
            Ok(marked)
        })
    }

    pub fn count_learning_samples(&self, consumed: Option<bool>) -> FeedloopResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM learning_samples WHERE (?1 IS NULL OR consumed_for_training = ?1)",
            params![consumed],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recommendation(diagnosis: &str, dosage: &str) -> serde_json::Value {
        json!({
            "diagnosis": diagnosis,
            "justification": "clinique",
            "prescriptions": [{
                "drug_name": "Amoxicilline",
                "dosage": dosage,
                "frequency": "2x/jour",
                "duration": "6 jours",
                "route": "orale",
                "justification": "première intention"
            }]
        })
    }

    fn completed_event(id: i64, with_ai: bool) -> FeedbackEvent {
        let mut consultation = json!({
            "diagnosis": "Angine",
            "symptoms": "fièvre, odynophagie",
            "patient": { "patient_ref": "P-0042", "birth_date": "1990-03-01", "sex": "M" },
            "final_recommendation": recommendation("Angine bactérienne", "500 mg"),
        });
        if with_ai {
            consultation["ai_recommendation"] = recommendation("Angine", "1 g");
        }
        serde_json::from_value(json!({
            "id": id,
            "outcome": "modified",
            "modifications_made": "1 g remplacé par 500 mg",
            "efficacy": "effective",
            "healing_days": 5,
            "diagnostic_relevance": 8,
            "prescription_relevance": 7,
            "follow_up_complete": true,
            "created_at": "2026-10-10T09:00:00Z",
            "consultation": consultation,
        }))
        .unwrap()
    }

    #[test]
    fn test_from_event_anonymizes_and_keeps_both_versions() {
        let now = "2026-10-19T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let sample = LearningSample::from_event(&completed_event(1, true), now).unwrap();

        assert_eq!(sample.patient.age, Some(36));
        assert_ne!(sample.patient.subject_digest.as_deref(), Some("P-0042"));
        assert_eq!(sample.ai_recommendation.prescriptions[0].dosage, "1 g");
        assert_eq!(sample.doctor_recommendation.prescriptions[0].dosage, "500 mg");
        assert_eq!(sample.doctor_diagnosis, "Angine bactérienne");
        assert!(!sample.consumed_for_training);
    }

    #[test]
    fn test_from_event_without_ai_recommendation_fails() {
        let result = LearningSample::from_event(&completed_event(1, false), Utc::now());
        assert!(matches!(result, Err(FeedloopError::MalformedRecord(_, _))));
    }

    #[test]
    fn test_off_schema_ai_recommendation_fails_only_the_sample() {
        let mut event = completed_event(3, true);
        if let Some(serde_json::Value::Object(map)) = event.consultation.ai_recommendation.as_mut() {
            map.insert("confidence".to_string(), json!(0.8));
        }

        assert!(event.validate().is_ok());
        let result = LearningSample::from_event(&event, Utc::now());
        assert!(matches!(result, Err(FeedloopError::MalformedRecord(_, _))));
    }

    #[test]
    fn test_at_most_one_sample_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let event = completed_event(7, true);

        let first = LearningSample::from_event(&event, Utc::now()).unwrap();
        let second = LearningSample::from_event(&event, Utc::now()).unwrap();
        assert!(store.insert_learning_sample(&first).unwrap());
        assert!(!store.insert_learning_sample(&second).unwrap());
        assert_eq!(store.count_learning_samples(None).unwrap(), 1);
        assert!(store.has_learning_sample(7).unwrap());
    }
}
