//! Eventos de feedback importados da camada CRUD.
//!
//! O pipeline só lê esses registros. A importação aceita um array JSON ou
//! JSON Lines e faz upsert pelo ID do evento.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::types::feedback::FeedbackEvent;
use crate::{FeedloopError, FeedloopResult};

use super::store::{format_ts, KnowledgeStore};

/// Resultado de uma importação.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Eventos lidos de uma janela, com a contagem de registros descartados.
#[derive(Debug, Clone, Default)]
pub struct FeedbackBatch {
    pub events: Vec<FeedbackEvent>,
    pub skipped: usize,
}

/// Lê registros de feedback de um arquivo JSON ou JSON Lines.
///
/// Linhas malformadas são descartadas e contadas.
pub fn read_feedback_file(path: &Path) -> FeedloopResult<(Vec<FeedbackEvent>, usize)> {
    let content = std::fs::read_to_string(path)?;
    parse_feedback_records(&content)
}

/// Interpreta o conteúdo como array JSON ou, se não for, como JSON Lines.
pub fn parse_feedback_records(content: &str) -> FeedloopResult<(Vec<FeedbackEvent>, usize)> {
    let mut events = Vec::new();
    let mut skipped = 0;

    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let records: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<FeedbackEvent>(record) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Registro de feedback ignorado");
                    skipped += 1;
                }
            }
        }
        return Ok((events, skipped));
    }

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedbackEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "Registro de feedback ignorado");
                skipped += 1;
            }
        }
    }
    Ok((events, skipped))
}

impl KnowledgeStore {
    /// Importa eventos, com upsert pelo ID.
    pub fn ingest_feedback(&mut self, events: &[FeedbackEvent]) -> FeedloopResult<IngestReport> {
        let mut report = IngestReport::default();

        for event in events {
            if let Err(e) = event.validate() {
                tracing::warn!(id = event.id, error = %e, "Evento de feedback rejeitado");
                report.skipped += 1;
                continue;
            }

            let payload = serde_json::to_string(event)?;
            let created_at = format_ts(&event.created_at);

            let existed = self.with_retry("ingest_feedback", |conn| {
                let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let updated = tx.execute(
                    "UPDATE feedback_events
                     SET outcome = ?, follow_up_complete = ?, created_at = ?, payload = ?
                     WHERE id = ?",
                    params![
                        event.outcome.as_str(),
                        event.follow_up_complete,
                        &created_at,
                        &payload,
                        event.id
                    ],
                )?;
                if updated == 0 {
                    tx.execute(
                        "INSERT INTO feedback_events (id, outcome, follow_up_complete, created_at, payload)
                         VALUES (?, ?, ?, ?, ?)",
                        params![
                            event.id,
                            event.outcome.as_str(),
                            event.follow_up_complete,
                            &created_at,
                            &payload
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(updated > 0)
            })?;

            if existed {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }

        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "Feedback importado"
        );
        Ok(report)
    }

    /// Eventos com `from <= created_at < to`, em ordem cronológica.
    pub fn feedback_between(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> FeedloopResult<FeedbackBatch> {
        let from = from.map(|t| format_ts(&t));
        let to = to.map(|t| format_ts(&t));

        let mut stmt = self.conn.prepare(
            "SELECT id, payload FROM feedback_events
             WHERE (?1 IS NULL OR created_at >= ?1)
               AND (?2 IS NULL OR created_at < ?2)
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![from, to], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut batch = FeedbackBatch::default();
        for row in rows {
            let (id, payload) = row?;
            match serde_json::from_str::<FeedbackEvent>(&payload) {
                Ok(event) => batch.events.push(event),
                Err(e) => {
                    tracing::warn!(id, error = %e, "Evento armazenado ilegível, ignorado");
                    batch.skipped += 1;
                }
            }
        }
        Ok(batch)
    }

    /// Janela móvel terminando em `now`.
    pub fn feedback_since(&self, since: DateTime<Utc>) -> FeedloopResult<FeedbackBatch> {
        self.feedback_between(Some(since), None)
    }

    /// Todos os eventos com data de criação até `date`, inclusive.
    pub fn feedback_through(&self, date: NaiveDate) -> FeedloopResult<FeedbackBatch> {
        self.feedback_between(None, Some(start_of_day(next_day(date)?)?))
    }

    /// Eventos criados no dia `date`.
    pub fn feedback_on(&self, date: NaiveDate) -> FeedloopResult<FeedbackBatch> {
        self.feedback_between(
            Some(start_of_day(date)?),
            Some(start_of_day(next_day(date)?)?),
        )
    }

    pub fn count_feedback(&self) -> FeedloopResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM feedback_events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn next_day(date: NaiveDate) -> FeedloopResult<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| FeedloopError::other(format!("data inválida: {}", date)))
}

fn start_of_day(date: NaiveDate) -> FeedloopResult<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| FeedloopError::other(format!("data inválida: {}", date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::feedback::FeedbackOutcome;
    use tempfile::tempdir;

    fn event(id: i64, created_at: &str, diag: u8) -> FeedbackEvent {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "outcome": "modified",
            "modification_reason": "posologie réduite",
            "diagnostic_relevance": diag,
            "prescription_relevance": 6,
            "created_at": created_at,
        }))
        .unwrap()
    }

    fn create_test_store() -> (KnowledgeStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::new(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_ingest_upserts_by_id() {
        let (mut store, _dir) = create_test_store();

        let report = store
            .ingest_feedback(&[event(1, "2026-10-01T10:00:00Z", 7), event(2, "2026-10-02T10:00:00Z", 7)])
            .unwrap();
        assert_eq!(report.inserted, 2);

        let mut changed = event(1, "2026-10-01T10:00:00Z", 7);
        changed.outcome = FeedbackOutcome::Rejected;
        let report = store.ingest_feedback(&[changed]).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(store.count_feedback().unwrap(), 2);
    }

    #[test]
    fn test_ingest_skips_invalid_scores() {
        let (mut store, _dir) = create_test_store();
        let report = store
            .ingest_feedback(&[event(1, "2026-10-01T10:00:00Z", 0), event(2, "2026-10-01T11:00:00Z", 5)])
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn test_windows() {
        let (mut store, _dir) = create_test_store();
        store
            .ingest_feedback(&[
                event(1, "2026-10-01T23:59:59Z", 7),
                event(2, "2026-10-02T00:00:00Z", 7),
                event(3, "2026-10-03T08:00:00Z", 7),
            ])
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 10, 2).unwrap();
        assert_eq!(store.feedback_on(day).unwrap().events.len(), 1);
        assert_eq!(store.feedback_through(day).unwrap().events.len(), 2);

        let since = "2026-10-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let batch = store.feedback_since(since).unwrap();
        assert_eq!(batch.events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_parse_jsonl_skips_bad_lines() {
        let content = format!(
            "{}\nnot json\n\n{}\n",
            serde_json::to_string(&event(1, "2026-10-01T10:00:00Z", 7)).unwrap(),
            serde_json::to_string(&event(2, "2026-10-01T11:00:00Z", 7)).unwrap()
        );
        let (events, skipped) = parse_feedback_records(&content).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_parse_json_array_skips_bad_element() {
        let mut bad = serde_json::to_value(event(2, "2026-10-01T11:00:00Z", 7)).unwrap();
        bad["diagnostic_relevance"] = serde_json::json!(300);
        let content = serde_json::to_string(&vec![
            serde_json::to_value(event(1, "2026-10-01T10:00:00Z", 7)).unwrap(),
            bad,
            serde_json::to_value(event(3, "2026-10-01T12:00:00Z", 7)).unwrap(),
        ])
        .unwrap();

        let (events, skipped) = parse_feedback_records(&content).unwrap();
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_parse_json_array() {
        let content = serde_json::to_string(&vec![event(1, "2026-10-01T10:00:00Z", 7)]).unwrap();
        let (events, skipped) = parse_feedback_records(&content).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(skipped, 0);
    }
}
