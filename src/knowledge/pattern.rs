//! Patterns aprendidos a partir do feedback médico.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FeedloopError;

/// Tipo de pattern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", value(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Motivo recorrente de modificação.
    FrequentModification,
    /// Motivo recorrente de rejeição.
    FrequentRejection,
    /// Diagnóstico bem validado.
    GoodPractice,
    /// Dose preferida pelos médicos.
    DosagePreference,
    DiagnosticError,
    PrescriptionError,
}

impl PatternType {
    /// Todos os tipos, na ordem de exibição.
    pub const ALL: [PatternType; 6] = [
        PatternType::FrequentModification,
        PatternType::FrequentRejection,
        PatternType::GoodPractice,
        PatternType::DosagePreference,
        PatternType::DiagnosticError,
        PatternType::PrescriptionError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::FrequentModification => "frequent_modification",
            PatternType::FrequentRejection => "frequent_rejection",
            PatternType::GoodPractice => "good_practice",
            PatternType::DosagePreference => "dosage_preference",
            PatternType::DiagnosticError => "diagnostic_error",
            PatternType::PrescriptionError => "prescription_error",
        }
    }

    /// Tipos que alimentam a seção de erros a evitar.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            PatternType::FrequentModification
                | PatternType::FrequentRejection
                | PatternType::DiagnosticError
                | PatternType::PrescriptionError
        )
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = FeedloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternType::ALL
            .iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| FeedloopError::malformed("pattern_type", s))
    }
}

/// Nível de confiabilidade exibido ao modelo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Reliability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reliability::Low => write!(f, "low"),
            Reliability::Medium => write!(f, "medium"),
            Reliability::High => write!(f, "high"),
        }
    }
}

/// Um pattern persistido na base de conhecimento.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    pub id: i64,
    pub pattern_type: PatternType,
    pub description: String,
    pub frequency: i64,
    pub confidence: f64,
    pub is_active: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    pub fn reliability(&self) -> Reliability {
        if self.confidence >= 0.8 {
            Reliability::High
        } else if self.confidence >= 0.5 {
            Reliability::Medium
        } else {
            Reliability::Low
        }
    }

    /// Dias inteiros desde a última observação (nunca negativo).
    pub fn days_since_seen(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_days().max(0)
    }

    /// Pattern utilizável no enriquecimento do prompt.
    pub fn is_actionable(&self, min_frequency: i64, min_confidence: f64) -> bool {
        self.is_active && self.frequency >= min_frequency && self.confidence >= min_confidence
    }
}

/// Observação produzida por uma análise em lote.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternObservation {
    pub pattern_type: PatternType,
    pub description: String,
    pub frequency: i64,
    /// Confiança provisória, sobrescrita pelo refresher.
    pub confidence: f64,
}

impl PatternObservation {
    /// `confidence = min(1, ocorrências / tamanho do lote)`.
    pub fn new(
        pattern_type: PatternType,
        description: impl Into<String>,
        occurrences: usize,
        batch_size: usize,
    ) -> Self {
        let confidence = if batch_size == 0 {
            0.0
        } else {
            (occurrences as f64 / batch_size as f64).min(1.0)
        };

        Self {
            pattern_type,
            description: description.into(),
            frequency: occurrences as i64,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pattern(confidence: f64, frequency: i64) -> Pattern {
        let now = Utc::now();
        Pattern {
            id: 1,
            pattern_type: PatternType::FrequentRejection,
            description: "Frequent error causing rejection: élevé".to_string(),
            frequency,
            confidence,
            is_active: true,
            first_seen: now,
            last_seen: now,
        }
    }

    #[test]
    fn test_pattern_type_display_and_parse() {
        for t in PatternType::ALL {
            assert_eq!(t.to_string().parse::<PatternType>().unwrap(), t);
        }
        assert!("anti_pattern".parse::<PatternType>().is_err());
    }

    #[test]
    fn test_error_types() {
        assert!(PatternType::FrequentModification.is_error());
        assert!(PatternType::PrescriptionError.is_error());
        assert!(!PatternType::GoodPractice.is_error());
        assert!(!PatternType::DosagePreference.is_error());
    }

    #[test]
    fn test_reliability_levels() {
        assert_eq!(pattern(0.9, 5).reliability(), Reliability::High);
        assert_eq!(pattern(0.5, 5).reliability(), Reliability::Medium);
        assert_eq!(pattern(0.3, 5).reliability(), Reliability::Low);
    }

    #[test]
    fn test_actionable_threshold() {
        assert!(pattern(0.3, 2).is_actionable(2, 0.3));
        assert!(!pattern(0.2, 9).is_actionable(2, 0.3));
        assert!(!pattern(0.9, 1).is_actionable(2, 0.3));

        let mut inactive = pattern(0.9, 9);
        inactive.is_active = false;
        assert!(!inactive.is_actionable(2, 0.3));
    }

    #[test]
    fn test_days_since_seen_floors() {
        let mut p = pattern(0.5, 3);
        let now = Utc::now();
        p.last_seen = now - Duration::hours(47);
        assert_eq!(p.days_since_seen(now), 1);
        p.last_seen = now + Duration::days(2);
        assert_eq!(p.days_since_seen(now), 0);
    }

    #[test]
    fn test_observation_confidence() {
        let obs = PatternObservation::new(PatternType::GoodPractice, "x", 3, 4);
        assert_eq!(obs.confidence, 0.75);
        assert_eq!(obs.frequency, 3);
        assert_eq!(PatternObservation::new(PatternType::GoodPractice, "x", 3, 0).confidence, 0.0);
    }
}
