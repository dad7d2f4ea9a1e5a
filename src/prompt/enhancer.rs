//! PromptEnhancer - enriquece a instrução do modelo com o que foi aprendido.
//!
//! É uma função pura sobre uma fotografia da base: mesma fotografia e mesmos
//! argumentos produzem sempre o mesmo texto. Nenhuma escrita, nenhuma chamada externa.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::knowledge::{window_start, KnowledgeStore, Pattern, PatternType};
use crate::metrics::RecentPerformance;
use crate::types::config::EnhancerConfig;
use crate::types::feedback::PatientContext;
use crate::FeedloopResult;

const SAFETY_REMINDER: &str = "IMPORTANT: use this information to improve your recommendations, \
     but always keep your own clinical judgement as the primary basis. These are aids, not \
     replacements for a physician's decision.";

/// Patterns ativos e desempenho recente, lidos de uma vez.
#[derive(Debug, Clone, Default)]
pub struct EnhancementSnapshot {
    pub patterns: Vec<Pattern>,
    pub recent: Option<RecentPerformance>,
}

impl KnowledgeStore {
    /// Lê a fotografia usada pelo enhancer.
    pub fn enhancement_snapshot(
        &self,
        now: DateTime<Utc>,
        stats_window_days: i64,
    ) -> FeedloopResult<EnhancementSnapshot> {
        let patterns = self.active_patterns()?;
        let recent = self.feedback_since(window_start(now, stats_window_days)?)?;

        Ok(EnhancementSnapshot {
            patterns,
            recent: RecentPerformance::from_events(&recent.events, stats_window_days),
        })
    }
}

/// Enriquecedor de prompts.
pub struct PromptEnhancer {
    config: EnhancerConfig,
}

impl PromptEnhancer {
    pub fn new(config: &EnhancerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Instrução base padrão da configuração.
    pub fn base_instruction(&self) -> &str {
        &self.config.base_instruction
    }

    /// Enriquece `base`. Sem patterns acionáveis, devolve `base` intacta.
    pub fn enhance(
        &self,
        base: &str,
        snapshot: &EnhancementSnapshot,
        context: Option<&PatientContext>,
    ) -> String {
        let mut active: Vec<&Pattern> = snapshot.patterns.iter().filter(|p| p.is_active).collect();
        active.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.id.cmp(&b.id))
        });

        let actionable: Vec<&Pattern> = active
            .iter()
            .copied()
            .filter(|p| p.is_actionable(self.config.min_frequency, self.config.min_confidence))
            .collect();

        if actionable.is_empty() {
            return base.to_string();
        }

        let mut sections = Vec::new();

        let errors: Vec<&Pattern> = actionable
            .iter()
            .copied()
            .filter(|p| p.pattern_type.is_error())
            .take(self.config.max_errors)
            .collect();
        if !errors.is_empty() {
            let mut section =
                String::from("FREQUENT ERRORS TO AVOID (based on physician feedback):\n");
            for p in &errors {
                let _ = writeln!(section, "- {} (reliability: {})", p.description, p.reliability());
            }
            sections.push(section);
        }

        if let Some(section) = list_section(
            "VALIDATED GOOD PRACTICES (positive physician feedback):",
            of_type(&actionable, PatternType::GoodPractice, self.config.max_good_practices),
        ) {
            sections.push(section);
        }

        if let Some(section) = list_section(
            "DOSAGES PREFERRED BY PHYSICIANS:",
            of_type(&actionable, PatternType::DosagePreference, self.config.max_dosages),
        ) {
            sections.push(section);
        }

        if let Some(recent) = &snapshot.recent {
            sections.push(format!(
                "RECENT AI PERFORMANCE:\n\
                 - Direct validation rate over the last {} days: {:.1}%\n\
                 - Mean diagnostic score: {:.1}/10\n\
                 - Mean prescription score: {:.1}/10\n\
                 - Feedback analysed: {}\n",
                recent.window_days,
                recent.validation_rate,
                recent.avg_diagnostic_score,
                recent.avg_prescription_score,
                recent.sample_count
            ));
        }

        if let Some(context) = context {
            sections.extend(self.contextual_sections(&active, context));
        }

        tracing::debug!(
            sections = sections.len(),
            actionable = actionable.len(),
            "Instrução enriquecida"
        );

        let mut enhanced = String::with_capacity(base.len() + 512);
        enhanced.push_str(base);
        enhanced.push_str("\n\n");
        for section in &sections {
            enhanced.push_str(section);
            enhanced.push('\n');
        }
        enhanced.push_str(SAFETY_REMINDER);
        enhanced.push('\n');
        enhanced
    }

    /// Seções por faixa etária e por palavra-chave dos sintomas.
    fn contextual_sections(&self, active: &[&Pattern], context: &PatientContext) -> Vec<String> {
        let mut sections = Vec::new();

        if let Some(age) = context.age {
            let markers = if age < self.config.pediatric_below_age {
                Some(&self.config.pediatric_markers)
            } else if age > self.config.geriatric_above_age {
                Some(&self.config.geriatric_markers)
            } else {
                None
            };

            if let Some(markers) = markers {
                let matched: Vec<&Pattern> = active
                    .iter()
                    .copied()
                    .filter(|p| markers.iter().any(|m| contains_ci(&p.description, m)))
                    .take(self.config.max_age_patterns)
                    .collect();
                if let Some(section) = list_section(
                    &format!("AGE-SPECIFIC CONSIDERATIONS ({} years):", age),
                    matched,
                ) {
                    sections.push(section);
                }
            }
        }

        if let Some(symptoms) = context.symptoms.as_deref() {
            let lowered = symptoms.to_lowercase();
            let keywords = lowered
                .split_whitespace()
                .take(self.config.max_symptom_keywords)
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
                .filter(|w| w.chars().count() > 3);

            for keyword in keywords {
                let matched: Vec<&Pattern> = active
                    .iter()
                    .copied()
                    .filter(|p| contains_ci(&p.description, keyword))
                    .take(self.config.patterns_per_keyword)
                    .collect();
                if let Some(section) = list_section(
                    &format!("PATTERNS FOR '{}':", keyword.to_uppercase()),
                    matched,
                ) {
                    sections.push(section);
                }
            }
        }

        sections
    }
}

fn of_type<'a>(patterns: &[&'a Pattern], pattern_type: PatternType, limit: usize) -> Vec<&'a Pattern> {
    patterns
        .iter()
        .copied()
        .filter(|p| p.pattern_type == pattern_type)
        .take(limit)
        .collect()
}

fn list_section(header: &str, patterns: Vec<&Pattern>) -> Option<String> {
    if patterns.is_empty() {
        return None;
    }
    let mut section = format!("{}\n", header);
    for p in patterns {
        let _ = writeln!(section, "- {}", p.description);
    }
    Some(section)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
