//! Fronteira com o serviço de IA generativa.
//!
//! O serviço é tratado como uma função opaca de texto que devolve um
//! documento JSON no schema de [`crate::types::recommendation`].

mod client;
mod gemini;

pub use client::{RecommendationClient, RecommendationRequest};
pub use gemini::GeminiCli;
