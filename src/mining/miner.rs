//! PatternMiner - extrai patterns recorrentes do feedback.
//!
//! Quatro categorias são analisadas de forma independente sobre o mesmo lote:
//! motivos de modificação, comentários de rejeição, diagnósticos bem validados
//! e doses citadas nas modificações.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::knowledge::{
    window_start, KnowledgeStore, PatternObservation, PatternType, UpsertOutcome,
};
use crate::types::config::MinerConfig;
use crate::types::feedback::{FeedbackEvent, FeedbackOutcome};
use crate::FeedloopResult;

use super::dosage::DosageExtractor;
use super::keywords::{KeywordCounter, Tokenizer};

/// Resultado de uma execução do miner.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MiningReport {
    /// Eventos válidos analisados.
    pub events_analyzed: usize,
    /// Eventos descartados por estarem malformados.
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    /// Upserts que falharam mesmo após as novas tentativas.
    pub failed: usize,
}

impl MiningReport {
    pub fn patterns_written(&self) -> usize {
        self.created + self.updated
    }
}

/// Miner de patterns textuais.
pub struct PatternMiner {
    config: MinerConfig,
    tokenizer: Tokenizer,
    dosage: DosageExtractor,
}

impl PatternMiner {
    pub fn new(config: &MinerConfig) -> FeedloopResult<Self> {
        Ok(Self {
            tokenizer: Tokenizer::new(config.min_token_chars, &config.stop_words),
            dosage: DosageExtractor::new(&config.dosage_units)?,
            config: config.clone(),
        })
    }

    /// Analisa um lote sem tocar na base.
    pub fn analyze(&self, events: &[FeedbackEvent]) -> Vec<PatternObservation> {
        let valid: Vec<&FeedbackEvent> = events.iter().filter(|e| e.validate().is_ok()).collect();

        let mut observations = Vec::new();

        let modification_reasons = texts(&valid, |e| {
            (e.outcome == FeedbackOutcome::Modified)
                .then(|| e.modification_reason.as_deref())
                .flatten()
        });
        observations.extend(self.keyword_patterns(
            &modification_reasons,
            self.config.top_modifications,
            PatternType::FrequentModification,
            "Frequent modification related to",
        ));

        let rejection_comments = texts(&valid, |e| {
            (e.outcome == FeedbackOutcome::Rejected)
                .then(|| e.doctor_comments.as_deref())
                .flatten()
        });
        observations.extend(self.keyword_patterns(
            &rejection_comments,
            self.config.top_rejections,
            PatternType::FrequentRejection,
            "Frequent error causing rejection",
        ));

        let min_score = self.config.good_practice_min_score;
        let good_diagnoses = texts(&valid, |e| {
            (e.outcome == FeedbackOutcome::ValidatedAsIs
                && e.diagnostic_relevance >= min_score
                && e.prescription_relevance >= min_score)
                .then(|| e.consultation.diagnosis.as_deref())
                .flatten()
        });
        observations.extend(self.keyword_patterns(
            &good_diagnoses,
            self.config.top_good_practices,
            PatternType::GoodPractice,
            "Well-validated diagnosis",
        ));

        observations.extend(self.dosage_patterns(&valid));

        observations
    }

    /// Analisa o lote e grava cada observação com upsert atômico.
    ///
    /// Uma falha de escrita conta como `failed` e não interrompe o lote.
    pub fn run(
        &self,
        store: &mut KnowledgeStore,
        events: &[FeedbackEvent],
        now: DateTime<Utc>,
    ) -> MiningReport {
        let mut report = MiningReport::default();

        for event in events {
            match event.validate() {
                Ok(()) => report.events_analyzed += 1,
                Err(e) => {
                    tracing::warn!(id = event.id, error = %e, "Evento ignorado pelo miner");
                    report.skipped += 1;
                }
            }
        }

        if report.events_analyzed == 0 {
            tracing::info!("Nenhum feedback para analisar");
            return report;
        }

        for observation in self.analyze(events) {
            match store.upsert_pattern(&observation, self.config.frequency_policy, now) {
                Ok(UpsertOutcome::Created(id)) => {
                    tracing::debug!(id, description = %observation.description, "Pattern criado");
                    report.created += 1;
                }
                Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                Err(e) => {
                    tracing::error!(
                        pattern_type = %observation.pattern_type,
                        description = %observation.description,
                        error = %e,
                        "Falha ao gravar pattern"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            events = report.events_analyzed,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "Mineração de patterns concluída"
        );
        report
    }

    /// Minera a janela móvel configurada terminando em `now`.
    pub fn run_window(
        &self,
        store: &mut KnowledgeStore,
        now: DateTime<Utc>,
    ) -> FeedloopResult<MiningReport> {
        let batch = store.feedback_since(window_start(now, self.config.window_days)?)?;
        let mut report = self.run(store, &batch.events, now);
        report.skipped += batch.skipped;
        Ok(report)
    }

    fn keyword_patterns(
        &self,
        texts: &[&str],
        top_n: usize,
        pattern_type: PatternType,
        label: &str,
    ) -> Vec<PatternObservation> {
        if texts.is_empty() {
            return Vec::new();
        }

        let mut counter = KeywordCounter::new();
        for text in texts {
            counter.extend(self.tokenizer.tokens(text));
        }

        counter
            .top(top_n, self.config.min_support)
            .into_iter()
            .map(|(keyword, count)| {
                PatternObservation::new(
                    pattern_type,
                    format!("{}: {}", label, keyword),
                    count,
                    texts.len(),
                )
            })
            .collect()
    }

    fn dosage_patterns(&self, events: &[&FeedbackEvent]) -> Vec<PatternObservation> {
        let mut counter = KeywordCounter::new();
        let mut mentions = 0;

        for event in events.iter().filter(|e| e.outcome == FeedbackOutcome::Modified) {
            if let Some(text) = event.dosage_text() {
                let found = self.dosage.extract(text);
                mentions += found.len();
                counter.extend(found);
            }
        }

        if counter.is_empty() {
            return Vec::new();
        }

        counter
            .top(self.config.top_dosages, self.config.min_support)
            .into_iter()
            .map(|(dose, count)| {
                PatternObservation::new(
                    PatternType::DosagePreference,
                    format!("Doctor-preferred dosage: {}", dose),
                    count,
                    mentions,
                )
            })
            .collect()
    }
}

fn texts<'a>(
    events: &[&'a FeedbackEvent],
    pick: impl Fn(&'a FeedbackEvent) -> Option<&'a str>,
) -> Vec<&'a str> {
    events
        .iter()
        .filter_map(|e| pick(*e))
        .filter(|t| !t.trim().is_empty())
        .collect()
}
