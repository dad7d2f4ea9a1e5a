//! KnowledgeStore - base de conhecimento persistida em SQLite.
//!
//! Guarda os patterns minerados, os eventos de feedback importados, as
//! métricas diárias e as amostras de aprendizado. Cada escrita de registro
//! roda em sua própria transação IMMEDIATE e é repetida em caso de contenção.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::types::config::{FrequencyPolicy, StoreConfig};
use crate::{FeedloopError, FeedloopResult};

use super::pattern::{Pattern, PatternObservation, PatternType};

/// Base de conhecimento do pipeline.
pub struct KnowledgeStore {
    pub(crate) conn: Connection,
    config: StoreConfig,
}

/// Resultado de um upsert de pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// Filtro de listagem de patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    pub active_only: bool,
    pub pattern_type: Option<PatternType>,
}

impl PatternFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            pattern_type: None,
        }
    }
}

/// Resumo por tipo dos patterns ativos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSummary {
    pub pattern_type: PatternType,
    pub active_count: usize,
    pub latest: Option<Pattern>,
}

const PATTERN_COLUMNS: &str =
    "id, pattern_type, description, frequency, confidence, is_active, first_seen, last_seen";

/// Formata timestamps com largura fixa, para que ordem textual = ordem temporal.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Início de uma janela de `days` dias terminando em `now`.
pub(crate) fn window_start(now: DateTime<Utc>, days: i64) -> FeedloopResult<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| FeedloopError::config(format!("janela de {} dias fora do calendário", days)))
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn pattern_from_row(row: &Row) -> rusqlite::Result<Pattern> {
    let raw_type: String = row.get(1)?;
    let pattern_type = raw_type.parse::<PatternType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Pattern {
        id: row.get(0)?,
        pattern_type,
        description: row.get(2)?,
        frequency: row.get(3)?,
        confidence: row.get(4)?,
        is_active: row.get(5)?,
        first_seen: parse_ts(6, &row.get::<_, String>(6)?)?,
        last_seen: parse_ts(7, &row.get::<_, String>(7)?)?,
    })
}

/// Descarta linhas malformadas, registrando cada uma.
pub(crate) fn keep_valid<T>(rows: impl Iterator<Item = rusqlite::Result<T>>, table: &str) -> Vec<T> {
    rows.filter_map(|r| match r {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(table, error = %e, "Linha malformada ignorada");
            None
        }
    })
    .collect()
}

impl KnowledgeStore {
    /// Cria ou abre a base com configuração padrão.
    pub fn new(db_path: &Path) -> FeedloopResult<Self> {
        Self::open(db_path, &StoreConfig::default())
    }

    /// Cria ou abre a base.
    pub fn open(db_path: &Path, config: &StoreConfig) -> FeedloopResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        // WAL: leitores do enhancer não bloqueiam os jobs em lote
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern_type TEXT NOT NULL,
                description TEXT NOT NULL,
                frequency INTEGER NOT NULL DEFAULT 1,
                confidence REAL NOT NULL DEFAULT 0.0,
                is_active INTEGER NOT NULL DEFAULT 1,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                UNIQUE(pattern_type, description)
            );

            CREATE TABLE IF NOT EXISTS feedback_events (
                id INTEGER PRIMARY KEY,
                outcome TEXT NOT NULL,
                follow_up_complete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_metrics (
                metric_date TEXT PRIMARY KEY,
                total_feedback INTEGER NOT NULL,
                validated_count INTEGER NOT NULL,
                modified_count INTEGER NOT NULL,
                rejected_count INTEGER NOT NULL,
                validation_rate REAL NOT NULL,
                modification_rate REAL NOT NULL,
                rejection_rate REAL NOT NULL,
                avg_diagnostic_score REAL,
                avg_prescription_score REAL,
                high_efficacy_rate REAL NOT NULL,
                avg_healing_days REAL,
                avg_patient_satisfaction REAL,
                avg_doctor_satisfaction REAL,
                computed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS learning_samples (
                id TEXT PRIMARY KEY,
                feedback_id INTEGER NOT NULL UNIQUE,
                diagnostic_score INTEGER NOT NULL,
                prescription_score INTEGER NOT NULL,
                consumed_for_training INTEGER NOT NULL DEFAULT 0,
                export_batch TEXT,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_type ON patterns(pattern_type);
            CREATE INDEX IF NOT EXISTS idx_patterns_active ON patterns(is_active);
            CREATE INDEX IF NOT EXISTS idx_feedback_created ON feedback_events(created_at);
            CREATE INDEX IF NOT EXISTS idx_samples_consumed ON learning_samples(consumed_for_training);
        "#,
        )?;

        Ok(Self {
            conn,
            config: config.clone(),
        })
    }

    /// Executa `op`, repetindo enquanto o SQLite reportar contenção.
    pub(crate) fn with_retry<T>(
        &mut self,
        op: &str,
        mut f: impl FnMut(&mut Connection) -> FeedloopResult<T>,
    ) -> FeedloopResult<T> {
        let mut attempt: u32 = 0;
        loop {
            match f(&mut self.conn) {
                Err(e) if e.is_busy() && attempt < self.config.busy_retries => {
                    attempt += 1;
                    tracing::warn!(op, attempt, "SQLite ocupado, repetindo");
                    std::thread::sleep(Duration::from_millis(25 * u64::from(attempt)));
                }
                Err(e) if e.is_busy() => return Err(FeedloopError::StoreBusy(attempt + 1)),
                other => return other,
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Escrita de patterns
    // ═══════════════════════════════════════════════════════════════════════

    /// Upsert por `(pattern_type, description)` em uma única transação.
    ///
    /// `last_seen` só avança; `is_active` nunca é alterado aqui.
    pub fn upsert_pattern(
        &mut self,
        observation: &PatternObservation,
        policy: FrequencyPolicy,
        now: DateTime<Utc>,
    ) -> FeedloopResult<UpsertOutcome> {
        let now = format_ts(&now);
        let accumulate = policy == FrequencyPolicy::Accumulate;

        self.with_retry("upsert_pattern", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM patterns WHERE pattern_type = ? AND description = ?",
                    params![observation.pattern_type.as_str(), observation.description],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE patterns
                         SET frequency = CASE WHEN ? THEN frequency + ? ELSE ? END,
                             confidence = ?,
                             last_seen = MAX(last_seen, ?)
                         WHERE id = ?",
                        params![
                            accumulate,
                            observation.frequency,
                            observation.frequency,
                            observation.confidence,
                            &now,
                            id
                        ],
                    )?;
                    UpsertOutcome::Updated(id)
                }
                None => {
                    tx.execute(
                        "INSERT INTO patterns (pattern_type, description, frequency, confidence,
                                               is_active, first_seen, last_seen)
                         VALUES (?, ?, ?, ?, 1, ?, ?)",
                        params![
                            observation.pattern_type.as_str(),
                            observation.description,
                            observation.frequency.max(1),
                            observation.confidence,
                            &now,
                            &now
                        ],
                    )?;
                    UpsertOutcome::Created(tx.last_insert_rowid())
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Ativa ou desativa um pattern (administração manual).
    pub fn set_active(&mut self, id: i64, active: bool) -> FeedloopResult<Pattern> {
        let updated = self.with_retry("set_active", |conn| {
            Ok(conn.execute(
                "UPDATE patterns SET is_active = ? WHERE id = ?",
                params![active, id],
            )?)
        })?;

        if updated == 0 {
            return Err(FeedloopError::NotFound(format!("pattern {}", id)));
        }

        tracing::info!(id, active, "Pattern atualizado manualmente");
        self.get_pattern(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Leitura de patterns
    // ═══════════════════════════════════════════════════════════════════════

    /// Busca um pattern pelo ID.
    pub fn get_pattern(&self, id: i64) -> FeedloopResult<Pattern> {
        let sql = format!("SELECT {} FROM patterns WHERE id = ?", PATTERN_COLUMNS);
        self.conn
            .query_row(&sql, params![id], pattern_from_row)
            .optional()?
            .ok_or_else(|| FeedloopError::NotFound(format!("pattern {}", id)))
    }

    /// Busca um pattern pela chave natural.
    pub fn find_pattern(
        &self,
        pattern_type: PatternType,
        description: &str,
    ) -> FeedloopResult<Option<Pattern>> {
        let sql = format!(
            "SELECT {} FROM patterns WHERE pattern_type = ? AND description = ?",
            PATTERN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![pattern_type.as_str(), description], pattern_from_row)
            .optional()?)
    }

    /// Lista patterns ordenados por frequência, confiança e ID.
    pub fn list_patterns(&self, filter: &PatternFilter) -> FeedloopResult<Vec<Pattern>> {
        let sql = format!(
            "SELECT {} FROM patterns
             WHERE (? = 0 OR is_active = 1)
               AND (? IS NULL OR pattern_type = ?)
             ORDER BY frequency DESC, confidence DESC, id ASC",
            PATTERN_COLUMNS
        );
        let type_filter = filter.pattern_type.map(|t| t.as_str());

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![filter.active_only, type_filter, type_filter],
            pattern_from_row,
        )?;

        Ok(keep_valid(rows, "patterns"))
    }

    /// Retorna todos os patterns ativos.
    pub fn active_patterns(&self) -> FeedloopResult<Vec<Pattern>> {
        self.list_patterns(&PatternFilter::active())
    }

    /// Conta patterns, opcionalmente só os ativos.
    pub fn count_patterns(&self, active_only: bool) -> FeedloopResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patterns WHERE (? = 0 OR is_active = 1)",
            params![active_only],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Quantidade de patterns ativos por tipo e o mais recente de cada um.
    pub fn enhancement_summary(&self) -> FeedloopResult<Vec<TypeSummary>> {
        let active = self.active_patterns()?;

        let summary = PatternType::ALL
            .iter()
            .filter_map(|t| {
                let of_type: Vec<&Pattern> =
                    active.iter().filter(|p| p.pattern_type == *t).collect();
                if of_type.is_empty() {
                    return None;
                }
                let latest = of_type
                    .iter()
                    .max_by(|a, b| a.last_seen.cmp(&b.last_seen).then(b.id.cmp(&a.id)))
                    .map(|p| (*p).clone());
                Some(TypeSummary {
                    pattern_type: *t,
                    active_count: of_type.len(),
                    latest,
                })
            })
            .collect();

        Ok(summary)
    }
}
