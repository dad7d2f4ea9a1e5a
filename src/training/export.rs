//! Exportação de amostras de aprendizado para fine-tuning.
//!
//! A seleção é feita uma vez; cada formato é uma transformação pura sobre ela.
//! O arquivo é escrito antes de as amostras serem marcadas como consumidas.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::knowledge::{window_start, KnowledgeStore};
use crate::types::config::{ExportFormat, ExportPeriod};
use crate::FeedloopResult;

use super::sample::{LearningSample, SampleFilter};

/// Parâmetros de uma exportação.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub min_score: u8,
    pub period: ExportPeriod,
    pub format: ExportFormat,
    pub output: PathBuf,
    pub system_persona: String,
    /// Reexporta também amostras já consumidas por lotes anteriores.
    pub include_consumed: bool,
}

/// Resultado de uma exportação.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportReport {
    pub count: usize,
    /// `None` quando nada foi selecionado e nenhum arquivo foi escrito.
    pub output: Option<PathBuf>,
    pub batch_tag: String,
}

/// Tag de lote `"<formato>_<AAAAMMDD>"`.
pub fn batch_tag(format: ExportFormat, now: DateTime<Utc>) -> String {
    format!("{}_{}", format, now.format("%Y%m%d"))
}

/// Serializa a seleção no formato pedido.
pub fn render(format: ExportFormat, samples: &[LearningSample], system_persona: &str) -> FeedloopResult<String> {
    match format {
        ExportFormat::Chat | ExportFormat::ChatSystem => {
            let mut out = String::new();
            for sample in samples {
                let mut messages = Vec::with_capacity(3);
                if format == ExportFormat::ChatSystem {
                    messages.push(json!({ "role": "system", "content": system_persona }));
                }
                messages.push(json!({ "role": "user", "content": sample.patient.render_prompt() }));
                messages.push(json!({
                    "role": "assistant",
                    "content": serde_json::to_string(&sample.doctor_recommendation)?,
                }));

                out.push_str(&serde_json::to_string(&json!({ "messages": messages }))?);
                out.push('\n');
            }
            Ok(out)
        }
        ExportFormat::Flat => {
            let records: Vec<Value> = samples.iter().map(flat_record).collect();
            Ok(serde_json::to_string_pretty(&records)?)
        }
    }
}

fn flat_record(sample: &LearningSample) -> Value {
    json!({
        "id": sample.id,
        "patient_data": {
            "age": sample.patient.age,
            "sex": sample.patient.sex,
            "symptoms": sample.patient.symptoms,
            "history": sample.patient.history,
            "vitals": sample.patient.vitals,
            "allergies": sample.patient.allergies,
        },
        "ai_diagnosis": sample.ai_diagnosis,
        "ai_prescription": sample.ai_recommendation,
        "doctor_diagnosis": sample.doctor_diagnosis,
        "doctor_prescription": sample.doctor_recommendation,
        "modifications": sample.modifications,
        "efficacy": sample.efficacy,
        "scores": {
            "diagnostic": sample.diagnostic_score,
            "prescription": sample.prescription_score,
        },
        "satisfaction": sample.patient_satisfaction,
        "created_at": sample.created_at.to_rfc3339(),
    })
}

/// Exportador de dados de treino.
pub struct TrainingExporter;

impl TrainingExporter {
    /// Amostras elegíveis, mais recentes primeiro. Sem `include_consumed`,
    /// só as que nenhum lote exportou ainda.
    pub fn select(
        store: &KnowledgeStore,
        min_score: u8,
        period: ExportPeriod,
        include_consumed: bool,
        now: DateTime<Utc>,
    ) -> FeedloopResult<Vec<LearningSample>> {
        let since = period.days().map(|d| window_start(now, d)).transpose()?;
        store.learning_samples(&SampleFilter {
            min_score,
            since,
            include_consumed,
        })
    }

    /// Seleciona, escreve o arquivo e marca as amostras como consumidas.
    pub fn export(
        store: &mut KnowledgeStore,
        request: &ExportRequest,
        now: DateTime<Utc>,
    ) -> FeedloopResult<ExportReport> {
        let tag = batch_tag(request.format, now);
        let samples = Self::select(
            store,
            request.min_score,
            request.period,
            request.include_consumed,
            now,
        )?;

        if samples.is_empty() {
            tracing::info!("Nenhuma amostra elegível para exportação");
            return Ok(ExportReport {
                count: 0,
                output: None,
                batch_tag: tag,
            });
        }

        let content = render(request.format, &samples, &request.system_persona)?;
        write_output(&request.output, &content)?;

        let ids: Vec<String> = samples.iter().map(|s| s.id.clone()).collect();
        let marked = store.mark_consumed(&ids, &tag)?;

        tracing::info!(
            path = %request.output.display(),
            format = %request.format,
            samples = marked,
            batch = %tag,
            "Dados de treino exportados"
        );

        Ok(ExportReport {
            count: samples.len(),
            output: Some(request.output.clone()),
            batch_tag: tag,
        })
    }
}

fn write_output(path: &Path, content: &str) -> FeedloopResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::types::feedback::{AnonymizedPatient, Efficacy};
    use crate::types::recommendation::Recommendation;

    fn recommendation(dosage: &str) -> Recommendation {
        serde_json::from_value(json!({
            "diagnosis": "Otite moyenne",
            "justification": "otoscopie",
            "prescriptions": [{
                "drug_name": "Amoxicilline",
                "dosage": dosage,
                "frequency": "3x/jour",
                "duration": "5 jours",
                "route": "orale",
                "justification": "première intention"
            }]
        }))
        .unwrap()
    }

    fn sample(feedback_id: i64, score: u8, created_at: DateTime<Utc>) -> LearningSample {
        LearningSample {
            id: format!("sample-{}", feedback_id),
            feedback_id,
            patient: AnonymizedPatient {
                age: Some(7),
                sex: "F".to_string(),
                symptoms: "otalgie".to_string(),
                ..Default::default()
            },
            ai_diagnosis: "Otite moyenne".to_string(),
            ai_recommendation: recommendation("1 g"),
            doctor_diagnosis: "Otite moyenne".to_string(),
            doctor_recommendation: recommendation("80 mg/kg"),
            modifications: Some("dose pédiatrique".to_string()),
            efficacy: Efficacy::Effective,
            side_effects: String::new(),
            healing_days: Some(4),
            diagnostic_score: score,
            prescription_score: score,
            patient_satisfaction: Some(9),
            consumed_for_training: false,
            export_batch: None,
            created_at,
        }
    }

    #[test]
    fn test_chat_formats() {
        let now = Utc::now();
        let samples = vec![sample(1, 9, now)];

        let chat = render(ExportFormat::Chat, &samples, "persona").unwrap();
        let line: Value = serde_json::from_str(chat.lines().next().unwrap()).unwrap();
        assert_eq!(line["messages"].as_array().unwrap().len(), 2);
        assert_eq!(line["messages"][0]["role"], "user");
        let assistant: Recommendation =
            serde_json::from_str(line["messages"][1]["content"].as_str().unwrap()).unwrap();
        assert_eq!(assistant.prescriptions[0].dosage, "80 mg/kg");

        let with_system = render(ExportFormat::ChatSystem, &samples, "persona").unwrap();
        let line: Value = serde_json::from_str(with_system.trim_end()).unwrap();
        assert_eq!(line["messages"][0]["role"], "system");
        assert_eq!(line["messages"][0]["content"], "persona");
    }

    #[test]
    fn test_flat_format_is_single_array() {
        let now = Utc::now();
        let flat = render(ExportFormat::Flat, &[sample(1, 9, now), sample(2, 8, now)], "").unwrap();
        let records: Vec<Value> = serde_json::from_str(&flat).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["scores"]["diagnostic"], 9);
        assert_eq!(records[0]["ai_prescription"]["prescriptions"][0]["dosage"], "1 g");
    }

    #[test]
    fn test_batch_tag() {
        let now = "2026-10-19T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(batch_tag(ExportFormat::ChatSystem, now), "chat_system_20261019");
    }

    #[test]
    fn test_export_consumes_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let now = Utc::now();

        store.insert_learning_sample(&sample(1, 9, now - Duration::days(2))).unwrap();
        store.insert_learning_sample(&sample(2, 6, now - Duration::days(2))).unwrap();
        store.insert_learning_sample(&sample(3, 9, now - Duration::days(40))).unwrap();

        let request = ExportRequest {
            min_score: 7,
            period: ExportPeriod::Monthly,
            format: ExportFormat::Chat,
            output: dir.path().join("out").join("train.jsonl"),
            system_persona: String::new(),
            include_consumed: false,
        };

        let first = TrainingExporter::export(&mut store, &request, now).unwrap();
        assert_eq!(first.count, 1);
        assert!(request.output.exists());

        let second = TrainingExporter::export(&mut store, &request, now).unwrap();
        assert_eq!(second.count, 0);
        assert!(second.output.is_none());

        let all = TrainingExporter::select(&store, 7, ExportPeriod::All, false, now).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].feedback_id, 3);
    }

    #[test]
    fn test_reexport_requires_include_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let now = Utc::now();
        store.insert_learning_sample(&sample(1, 9, now - Duration::days(1))).unwrap();

        let mut request = ExportRequest {
            min_score: 7,
            period: ExportPeriod::Weekly,
            format: ExportFormat::Flat,
            output: dir.path().join("train.json"),
            system_persona: String::new(),
            include_consumed: false,
        };
        assert_eq!(TrainingExporter::export(&mut store, &request, now).unwrap().count, 1);
        assert_eq!(TrainingExporter::export(&mut store, &request, now).unwrap().count, 0);

        request.include_consumed = true;
        let again = TrainingExporter::export(&mut store, &request, now).unwrap();
        assert_eq!(again.count, 1);
        assert_eq!(store.count_learning_samples(Some(true)).unwrap(), 1);
    }

    #[test]
    fn test_huge_period_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let result =
            TrainingExporter::select(&store, 7, ExportPeriod::Weekly, false, DateTime::<Utc>::MIN_UTC);
        assert!(matches!(result, Err(crate::FeedloopError::Config(_))));
    }
}
