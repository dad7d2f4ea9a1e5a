//! Registros de feedback médico consumidos pelo pipeline.
//!
//! Um [`FeedbackEvent`] corresponde a uma decisão do médico sobre uma sugestão
//! da IA. O núcleo só lê esses registros; quem os cria é a camada CRUD.

use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{FeedloopError, FeedloopResult};

/// Decisão do médico sobre a sugestão.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    /// Validada sem alterações.
    #[serde(alias = "validee_directement")]
    ValidatedAsIs,
    /// Validada com modificações.
    #[serde(alias = "modifiee")]
    Modified,
    /// Rejeitada.
    #[serde(alias = "annulee")]
    Rejected,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackOutcome::ValidatedAsIs => "validated_as_is",
            FeedbackOutcome::Modified => "modified",
            FeedbackOutcome::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedbackOutcome {
    type Err = FeedloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "validated_as_is" | "validee_directement" => Ok(FeedbackOutcome::ValidatedAsIs),
            "modified" | "modifiee" => Ok(FeedbackOutcome::Modified),
            "rejected" | "annulee" => Ok(FeedbackOutcome::Rejected),
            other => Err(FeedloopError::malformed("outcome", other)),
        }
    }
}

/// Eficácia observada do tratamento.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Efficacy {
    #[serde(alias = "tres_efficace")]
    VeryEffective,
    #[serde(alias = "efficace")]
    Effective,
    #[serde(alias = "moyennement_efficace")]
    ModeratelyEffective,
    #[serde(alias = "peu_efficace")]
    SlightlyEffective,
    #[serde(alias = "inefficace")]
    Ineffective,
    #[default]
    #[serde(alias = "non_evalue")]
    NotEvaluated,
}

impl Efficacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Efficacy::VeryEffective => "very_effective",
            Efficacy::Effective => "effective",
            Efficacy::ModeratelyEffective => "moderately_effective",
            Efficacy::SlightlyEffective => "slightly_effective",
            Efficacy::Ineffective => "ineffective",
            Efficacy::NotEvaluated => "not_evaluated",
        }
    }

    /// Houve acompanhamento que avaliou o tratamento.
    pub fn is_evaluated(&self) -> bool {
        !matches!(self, Efficacy::NotEvaluated)
    }

    /// Conta como eficácia elevada nas métricas.
    pub fn is_high(&self) -> bool {
        matches!(self, Efficacy::VeryEffective | Efficacy::Effective)
    }
}

impl std::fmt::Display for Efficacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Perfil do paciente no momento da consulta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientProfile {
    /// Identificador externo (nunca exportado em claro).
    #[serde(default)]
    pub patient_ref: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub diseases: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
}

impl PatientProfile {
    /// Idade em anos completos na data informada.
    pub fn age_at(&self, date: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        let mut age = date.year() - birth.year();
        if (date.month(), date.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    /// Digest SHA256 do identificador externo.
    pub fn reference_digest(&self) -> Option<String> {
        self.patient_ref.as_ref().map(|r| {
            let mut hasher = Sha256::new();
            hasher.update(r.trim().as_bytes());
            hex::encode(hasher.finalize())
        })
    }
}

/// Sinais vitais registrados na consulta.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    #[serde(default)]
    pub blood_pressure: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
}

/// Consulta de origem do feedback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsultationSnapshot {
    /// Diagnóstico inicial sugerido.
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub patient: PatientProfile,
    #[serde(default)]
    pub vitals: Vitals,
    /// Recomendação original da IA, guardada como veio.
    #[serde(default)]
    pub ai_recommendation: Option<serde_json::Value>,
    /// Versão final decidida pelo médico.
    #[serde(default)]
    pub final_recommendation: Option<serde_json::Value>,
    #[serde(default)]
    pub final_diagnosis: Option<String>,
}

/// Decisão do médico sobre uma sugestão da IA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: i64,
    pub outcome: FeedbackOutcome,
    #[serde(default)]
    pub modification_reason: Option<String>,
    /// Descrição livre das modificações (fonte das doses).
    #[serde(default)]
    pub modifications_made: Option<String>,
    #[serde(default)]
    pub doctor_comments: Option<String>,
    #[serde(default)]
    pub efficacy: Efficacy,
    #[serde(default)]
    pub side_effects: Option<String>,
    #[serde(default)]
    pub healing_days: Option<u32>,
    /// Pertinência do diagnóstico (1-10).
    pub diagnostic_relevance: u8,
    /// Pertinência da prescrição (1-10).
    pub prescription_relevance: u8,
    #[serde(default)]
    pub patient_satisfaction: Option<u8>,
    #[serde(default)]
    pub follow_up_complete: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub consultation: ConsultationSnapshot,
}

impl FeedbackEvent {
    /// Verifica as faixas de score.
    pub fn validate(&self) -> FeedloopResult<()> {
        let record = format!("feedback {}", self.id);
        for (name, score) in [
            ("diagnostic_relevance", Some(self.diagnostic_relevance)),
            ("prescription_relevance", Some(self.prescription_relevance)),
            ("patient_satisfaction", self.patient_satisfaction),
        ] {
            if let Some(value) = score {
                if !(1..=10).contains(&value) {
                    return Err(FeedloopError::malformed(
                        &record,
                        format!("{} = {} fora de 1-10", name, value),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Texto que carrega menções de dose.
    pub fn dosage_text(&self) -> Option<&str> {
        nonblank(&self.modifications_made).or_else(|| nonblank(&self.modification_reason))
    }
}

fn nonblank(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.trim().is_empty())
}

/// Contexto usado no enriquecimento contextual do prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientContext {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub symptoms: Option<String>,
}

/// Caso clínico enviado ao serviço de IA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientCase {
    #[serde(default)]
    pub patient: PatientProfile,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub vitals: Vitals,
}

impl PatientCase {
    pub fn context(&self, today: NaiveDate) -> PatientContext {
        PatientContext {
            age: self.patient.age_at(today),
            symptoms: self.symptoms.clone(),
        }
    }

    pub fn anonymize(&self, today: NaiveDate) -> AnonymizedPatient {
        AnonymizedPatient::from_parts(&self.patient, self.symptoms.as_deref(), &self.vitals, today)
    }
}

/// Contexto do paciente sem dados identificadores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnonymizedPatient {
    pub age: Option<u32>,
    pub sex: String,
    pub symptoms: String,
    pub history: String,
    pub allergies: Option<String>,
    pub vitals: Vitals,
    /// SHA256 do identificador externo.
    #[serde(default)]
    pub subject_digest: Option<String>,
}

impl AnonymizedPatient {
    pub fn from_parts(
        patient: &PatientProfile,
        symptoms: Option<&str>,
        vitals: &Vitals,
        today: NaiveDate,
    ) -> Self {
        Self {
            age: patient.age_at(today),
            sex: patient
                .sex
                .clone()
                .unwrap_or_else(|| "unspecified".to_string()),
            symptoms: symptoms.unwrap_or_default().to_string(),
            history: format!(
                "Diseases: {}, Allergies: {}",
                patient.diseases.as_deref().unwrap_or("none"),
                patient.allergies.as_deref().unwrap_or("none")
            ),
            allergies: patient.allergies.clone(),
            vitals: vitals.clone(),
            subject_digest: patient.reference_digest(),
        }
    }

    /// Renderiza o contexto como prompt de usuário.
    pub fn render_prompt(&self) -> String {
        let vitals = serde_json::to_string_pretty(&self.vitals).unwrap_or_default();
        let age = self
            .age
            .map(|a| format!("{} years", a))
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Analyse this patient and provide your recommendations:\n\n\
             PATIENT:\n\
             - Age: {}\n\
             - Sex: {}\n\
             - Symptoms: {}\n\
             - Allergies: {}\n\n\
             HISTORY:\n{}\n\n\
             VITAL SIGNS:\n{}\n\n\
             Provide a diagnosis and detailed prescriptions in JSON format.",
            age,
            self.sex,
            self.symptoms,
            self.allergies.as_deref().unwrap_or("none"),
            self.history,
            vitals
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_json(diag: u8) -> String {
        format!(
            r#"{{
                "id": 1,
                "outcome": "annulee",
                "doctor_comments": "dosage trop élevé",
                "efficacy": "tres_efficace",
                "diagnostic_relevance": {},
                "prescription_relevance": 5,
                "created_at": "2026-10-01T10:00:00Z"
            }}"#,
            diag
        )
    }

    #[test]
    fn test_legacy_aliases_deserialize() {
        let event: FeedbackEvent = serde_json::from_str(&event_json(6)).unwrap();
        assert_eq!(event.outcome, FeedbackOutcome::Rejected);
        assert_eq!(event.efficacy, Efficacy::VeryEffective);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_score() {
        let event: FeedbackEvent = serde_json::from_str(&event_json(11)).unwrap();
        assert!(matches!(
            event.validate(),
            Err(FeedloopError::MalformedRecord(_, _))
        ));
    }

    #[test]
    fn test_outcome_from_str() {
        assert_eq!(
            "modifiee".parse::<FeedbackOutcome>().unwrap(),
            FeedbackOutcome::Modified
        );
        assert!("maybe".parse::<FeedbackOutcome>().is_err());
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let profile = PatientProfile {
            birth_date: NaiveDate::from_ymd_opt(1950, 6, 15),
            ..Default::default()
        };
        let before = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(profile.age_at(before), Some(75));
        assert_eq!(profile.age_at(after), Some(76));
    }

    #[test]
    fn test_anonymized_patient_hides_reference() {
        let profile = PatientProfile {
            patient_ref: Some("1850675123456".to_string()),
            sex: Some("F".to_string()),
            allergies: Some("pénicilline".to_string()),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let anon = AnonymizedPatient::from_parts(&profile, Some("toux"), &Vitals::default(), today);

        let digest = anon.subject_digest.clone().unwrap();
        assert_eq!(digest.len(), 64);
        assert!(!digest.contains("1850675123456"));
        assert!(anon.history.contains("Allergies: pénicilline"));

        let prompt = anon.render_prompt();
        assert!(prompt.contains("Symptoms: toux"));
        assert!(!prompt.contains("1850675123456"));
    }

    #[test]
    fn test_dosage_text_falls_back_to_reason() {
        let mut event: FeedbackEvent = serde_json::from_str(&event_json(6)).unwrap();
        assert!(event.dosage_text().is_none());
        event.modification_reason = Some("500 mg au lieu de 1 g".to_string());
        assert_eq!(event.dosage_text(), Some("500 mg au lieu de 1 g"));
        event.modifications_made = Some("250 mg".to_string());
        assert_eq!(event.dosage_text(), Some("250 mg"));
    }

    #[test]
    fn test_blank_modifications_fall_back_to_reason() {
        let mut event: FeedbackEvent = serde_json::from_str(&event_json(6)).unwrap();
        event.modifications_made = Some("   ".to_string());
        event.modification_reason = Some("passé à 500 mg".to_string());
        assert_eq!(event.dosage_text(), Some("passé à 500 mg"));
    }

    #[test]
    fn test_stored_recommendation_keeps_extra_keys() {
        let event: FeedbackEvent = serde_json::from_value(serde_json::json!({
            "id": 7,
            "outcome": "validated_as_is",
            "diagnostic_relevance": 8,
            "prescription_relevance": 8,
            "created_at": "2026-10-01T10:00:00Z",
            "consultation": {
                "ai_recommendation": {
                    "diagnosis": "Grippe",
                    "justification": "saison",
                    "prescriptions": [],
                    "confidence": 0.8
                }
            }
        }))
        .unwrap();

        let stored = event.consultation.ai_recommendation.unwrap();
        assert_eq!(stored["confidence"], 0.8);
    }
}
