//! Contrato de resposta do serviço de IA generativa.
//!
//! A resposta é validada na fronteira: campos desconhecidos, itens sem
//! medicamento ou diagnóstico vazio são rejeitados, nunca corrigidos.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{FeedloopError, FeedloopResult};

/// Urgência do caso segundo a IA.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Moderate,
    High,
    Emergency,
}

/// Um item de prescrição.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PrescriptionItem {
    pub drug_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub route: String,
    pub justification: String,
    #[serde(default)]
    pub precautions: Vec<String>,
}

/// Bloco de receita formal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FormalPrescription {
    pub lines: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Recomendação completa devolvida pela IA.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Recommendation {
    pub diagnosis: String,
    #[serde(default)]
    pub differential_diagnoses: Vec<String>,
    pub justification: String,
    pub prescriptions: Vec<PrescriptionItem>,
    #[serde(default)]
    pub formal_prescription: Option<FormalPrescription>,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
}

impl Recommendation {
    /// Valida invariantes que o schema JSON não expressa.
    pub fn validate(&self) -> FeedloopResult<()> {
        if self.diagnosis.trim().is_empty() {
            return Err(FeedloopError::InvalidRecommendation(
                "diagnosis vazio".to_string(),
            ));
        }

        for (i, item) in self.prescriptions.iter().enumerate() {
            if item.drug_name.trim().is_empty() {
                return Err(FeedloopError::InvalidRecommendation(format!(
                    "prescriptions[{}].drug_name vazio",
                    i
                )));
            }
            if item.dosage.trim().is_empty() {
                return Err(FeedloopError::InvalidRecommendation(format!(
                    "prescriptions[{}].dosage vazio",
                    i
                )));
            }
        }

        Ok(())
    }

    /// Interpreta um snapshot guardado com a consulta, com o mesmo rigor da
    /// fronteira com o serviço.
    pub fn from_snapshot(value: &Value) -> FeedloopResult<Self> {
        let recommendation: Recommendation = serde_json::from_value(value.clone())
            .map_err(|e| FeedloopError::InvalidRecommendation(e.to_string()))?;
        recommendation.validate()?;
        Ok(recommendation)
    }

    /// Extrai e valida o primeiro objeto JSON da saída do serviço.
    pub fn parse_from_output(output: &str) -> FeedloopResult<Self> {
        let json_start = output.find('{');
        let json_end = output.rfind('}');

        let json_str = match (json_start, json_end) {
            (Some(start), Some(end)) if start < end => &output[start..=end],
            _ => {
                return Err(FeedloopError::InvalidRecommendation(
                    "resposta não contém JSON".to_string(),
                ))
            }
        };

        let recommendation: Recommendation = serde_json::from_str(json_str)
            .map_err(|e| FeedloopError::InvalidRecommendation(e.to_string()))?;
        recommendation.validate()?;
        Ok(recommendation)
    }
}

/// Schema JSON exigido do modelo.
pub fn response_schema() -> Value {
    let string = json!({ "type": "string" });
    let string_list = json!({ "type": "array", "items": { "type": "string" } });

    json!({
        "type": "object",
        "properties": {
            "diagnosis": string,
            "differential_diagnoses": string_list,
            "justification": string,
            "prescriptions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "drug_name": string,
                        "dosage": string,
                        "frequency": string,
                        "duration": string,
                        "route": string,
                        "justification": string,
                        "precautions": string_list
                    },
                    "required": ["drug_name", "dosage", "frequency", "duration", "route", "justification"]
                }
            },
            "formal_prescription": {
                "type": "object",
                "properties": {
                    "lines": string_list,
                    "notes": string
                },
                "required": ["lines"]
            },
            "follow_up": string,
            "urgency": {
                "type": "string",
                "enum": ["low", "moderate", "high", "emergency"]
            }
        },
        "required": ["diagnosis", "justification", "prescriptions"]
    })
}
