//! Base de conhecimento do feedloop.
//!
//! Guarda os patterns aprendidos do feedback médico e o corpus que os
//! estágios em lote consomem.
//!
//! ## Componentes
//!
//! - **KnowledgeStore**: banco SQLite com patterns, feedback, métricas e amostras
//! - **Refresher**: decaimento de confiança e desativação de patterns antigos
//! - **Feedback**: importação e leitura por janela dos eventos de feedback

mod feedback;
mod pattern;
mod refresh;
mod store;

pub use feedback::{parse_feedback_records, read_feedback_file, FeedbackBatch, IngestReport};
pub use pattern::{Pattern, PatternObservation, PatternType, Reliability};
pub use refresh::{recomputed_confidence, RefreshSummary};
pub use store::{KnowledgeStore, PatternFilter, TypeSummary, UpsertOutcome};

pub(crate) use store::{format_ts, keep_valid, parse_ts, window_start};
