//! Confidence refresher.
//!
//! Desativa patterns sem observação recente e recalcula a confiança dos
//! que continuam ativos. Cada pattern é atualizado em uma única instrução.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::types::config::RefresherConfig;
use crate::FeedloopResult;

use super::store::{format_ts, keep_valid, parse_ts, window_start, KnowledgeStore};

/// Resumo de uma execução do refresher.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RefreshSummary {
    pub deactivated_count: usize,
    pub active_count: usize,
    pub refreshed_at: DateTime<Utc>,
}

/// `min(1, frequency / saturation * max(0, 1 - days / decay_days))`.
pub fn recomputed_confidence(frequency: i64, days_since_seen: i64, config: &RefresherConfig) -> f64 {
    let decay_days = config.decay_days.max(1) as f64;
    let recency = (1.0 - days_since_seen.max(0) as f64 / decay_days).max(0.0);
    let saturation = if config.frequency_saturation > 0.0 {
        config.frequency_saturation
    } else {
        1.0
    };
    ((frequency as f64 / saturation) * recency).clamp(0.0, 1.0)
}

impl KnowledgeStore {
    /// Executa as duas etapas do refresh com o relógio `now`.
    pub fn refresh_confidence(
        &mut self,
        config: &RefresherConfig,
        now: DateTime<Utc>,
    ) -> FeedloopResult<RefreshSummary> {
        let cutoff = format_ts(&window_start(now, config.staleness_days)?);

        let deactivated_count = self.with_retry("deactivate_stale", |conn| {
            Ok(conn.execute(
                "UPDATE patterns SET is_active = 0 WHERE is_active = 1 AND last_seen < ?",
                params![&cutoff],
            )?)
        })?;

        let active: Vec<(i64, i64, DateTime<Utc>)> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id, frequency, last_seen FROM patterns WHERE is_active = 1")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    parse_ts(2, &row.get::<_, String>(2)?)?,
                ))
            })?;
            keep_valid(rows, "patterns")
        };

        for (id, frequency, last_seen) in &active {
            let days = (now - *last_seen).num_days().max(0);
            let confidence = recomputed_confidence(*frequency, days, config);

            self.with_retry("refresh_confidence", |conn| {
                // is_active = 1 evita reativar um pattern desativado entre a leitura e a escrita
                conn.execute(
                    "UPDATE patterns SET confidence = ? WHERE id = ? AND is_active = 1",
                    params![confidence, id],
                )?;
                Ok(())
            })?;
        }

        let summary = RefreshSummary {
            deactivated_count,
            active_count: active.len(),
            refreshed_at: now,
        };

        tracing::info!(
            deactivated = summary.deactivated_count,
            active = summary.active_count,
            "Confiança dos patterns atualizada"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::knowledge::pattern::{PatternObservation, PatternType};
    use crate::types::config::FrequencyPolicy;
    use tempfile::tempdir;

    #[test]
    fn test_confidence_formula_bounds() {
        let config = RefresherConfig::default();
        assert_eq!(recomputed_confidence(10, 0, &config), 1.0);
        assert_eq!(recomputed_confidence(50, 0, &config), 1.0);
        assert_eq!(recomputed_confidence(10, 30, &config), 0.0);
        assert_eq!(recomputed_confidence(100, 45, &config), 0.0);
        assert!((recomputed_confidence(5, 15, &config) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_staleness_boundary() {
        let dir = tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let now = Utc::now();

        let old = store
            .upsert_pattern(
                &PatternObservation::new(PatternType::GoodPractice, "angine", 4, 4),
                FrequencyPolicy::Replace,
                now - Duration::days(31),
            )
            .unwrap();
        let recent = store
            .upsert_pattern(
                &PatternObservation::new(PatternType::GoodPractice, "otite", 4, 4),
                FrequencyPolicy::Replace,
                now - Duration::days(29),
            )
            .unwrap();

        let summary = store
            .refresh_confidence(&RefresherConfig::default(), now)
            .unwrap();
        assert_eq!(summary.deactivated_count, 1);
        assert_eq!(summary.active_count, 1);

        assert!(!store.get_pattern(old.id()).unwrap().is_active);
        let kept = store.get_pattern(recent.id()).unwrap();
        assert!(kept.is_active);
        assert!((kept.confidence - 0.4 * (1.0 / 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_store_is_noop() {
        let dir = tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let summary = store
            .refresh_confidence(&RefresherConfig::default(), Utc::now())
            .unwrap();
        assert_eq!(summary.deactivated_count, 0);
        assert_eq!(summary.active_count, 0);
    }

    #[test]
    fn test_staleness_beyond_calendar_is_config_error() {
        let dir = tempdir().unwrap();
        let mut store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        let config = RefresherConfig {
            staleness_days: i64::MAX,
            ..RefresherConfig::default()
        };
        let result = store.refresh_confidence(&config, Utc::now());
        assert!(matches!(result, Err(crate::FeedloopError::Config(_))));
    }
}
