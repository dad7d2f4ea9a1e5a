//! # feedloop
//!
//! Aprendizado por feedback médico e enriquecimento de prompts.
//!
//! O feedloop transforma o feedback dos médicos sobre sugestões de IA em
//! patterns reutilizáveis, métricas diárias e dados de fine-tuning, e usa
//! esses patterns para enriquecer a instrução enviada ao serviço de IA.
//!
//! ## Módulos
//!
//! - [`knowledge`] - Base SQLite de patterns, feedback e refresh de confiança
//! - [`mining`] - Mineração de palavras-chave e doses
//! - [`metrics`] - Métricas diárias e geração de amostras de aprendizado
//! - [`prompt`] - Enriquecimento da instrução do sistema
//! - [`training`] - Exportação de dados de treino
//! - [`ai`] - Cliente do serviço de IA (Gemini CLI)
//! - [`pipeline`] - Job diário
//! - [`cli`] - Interface de linha de comando
//! - [`types`] - Tipos compartilhados

pub mod ai;
#[cfg(feature = "cli")]
pub mod cli;
pub mod knowledge;
pub mod metrics;
pub mod mining;
pub mod pipeline;
pub mod prompt;
pub mod training;
pub mod types;

pub use types::config::Config;
pub use types::errors::{FeedloopError, FeedloopResult};
